//! Maps raw indicator values to qualitative [`Signal`]s.

use crate::indicators::{Macd, Stochastic};
use oxsignal_common::types::Signal;
use serde::{Deserialize, Serialize};

/// Four-level band for bounded oscillators. High levels are checked
/// before low levels, extreme before moderate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub high_extreme: f64,
    pub high_moderate: f64,
    pub low_extreme: f64,
    pub low_moderate: f64,
}

impl Band {
    pub fn classify(&self, value: f64) -> Option<Signal> {
        if value >= self.high_extreme {
            Some(Signal::HighExtreme)
        } else if value >= self.high_moderate {
            Some(Signal::HighModerate)
        } else if value <= self.low_extreme {
            Some(Signal::LowExtreme)
        } else if value <= self.low_moderate {
            Some(Signal::LowModerate)
        } else {
            None
        }
    }
}

fn default_rsi_band() -> Band {
    Band {
        high_extreme: 80.0,
        high_moderate: 70.0,
        low_extreme: 20.0,
        low_moderate: 30.0,
    }
}

fn default_stochastic_band() -> Band {
    Band {
        high_extreme: 90.0,
        high_moderate: 80.0,
        low_extreme: 10.0,
        low_moderate: 20.0,
    }
}

fn default_williams_band() -> Band {
    Band {
        high_extreme: -10.0,
        high_moderate: -20.0,
        low_extreme: -90.0,
        low_moderate: -80.0,
    }
}

fn default_macd_momentum_ratio() -> f64 {
    0.5
}

fn default_roc_multiplier() -> f64 {
    2.0
}

fn default_atr_multiplier() -> f64 {
    1.5
}

/// Classifier thresholds. Defaults are the production values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalThresholds {
    #[serde(default = "default_rsi_band")]
    pub rsi: Band,
    #[serde(default = "default_stochastic_band")]
    pub stochastic: Band,
    #[serde(default = "default_williams_band")]
    pub williams_r: Band,
    /// Histogram must exceed this fraction of the MACD line to count as momentum.
    #[serde(default = "default_macd_momentum_ratio")]
    pub macd_momentum_ratio: f64,
    /// ROC must exceed this multiple of the mean absolute change.
    #[serde(default = "default_roc_multiplier")]
    pub roc_multiplier: f64,
    /// The ATR proxy must exceed this multiple of the mean absolute change.
    #[serde(default = "default_atr_multiplier")]
    pub atr_multiplier: f64,
}

impl Default for SignalThresholds {
    fn default() -> Self {
        Self {
            rsi: default_rsi_band(),
            stochastic: default_stochastic_band(),
            williams_r: default_williams_band(),
            macd_momentum_ratio: default_macd_momentum_ratio(),
            roc_multiplier: default_roc_multiplier(),
            atr_multiplier: default_atr_multiplier(),
        }
    }
}

pub fn classify_rsi(value: f64, t: &SignalThresholds) -> Signal {
    t.rsi.classify(value).unwrap_or(Signal::Neutral)
}

/// Band first; inside the band, %K against %D decides a crossover.
pub fn classify_stochastic(s: &Stochastic, t: &SignalThresholds) -> Signal {
    if let Some(signal) = t.stochastic.classify(s.k) {
        return signal;
    }
    if s.k > s.d && s.k < t.stochastic.high_moderate {
        Signal::RisingCrossover
    } else if s.k < s.d && s.k > t.stochastic.low_moderate {
        Signal::DecliningCrossover
    } else {
        Signal::Neutral
    }
}

pub fn classify_williams_r(value: f64, t: &SignalThresholds) -> Signal {
    t.williams_r.classify(value).unwrap_or(Signal::Neutral)
}

pub fn classify_macd(m: &Macd, t: &SignalThresholds) -> Signal {
    let strong = m.histogram.abs() > t.macd_momentum_ratio * m.line.abs();
    if m.histogram > 0.0 && strong {
        return Signal::RisingMomentum;
    }
    if m.histogram < 0.0 && strong {
        return Signal::DecliningMomentum;
    }

    let spread = m.line - m.signal_line;
    if spread > 0.0 {
        Signal::RisingCrossover
    } else if spread < 0.0 {
        Signal::DecliningCrossover
    } else {
        Signal::Neutral
    }
}

pub fn classify_roc(roc: f64, avg_change: f64, t: &SignalThresholds) -> Signal {
    if roc.abs() > t.roc_multiplier * avg_change {
        if roc > 0.0 {
            Signal::RisingMomentum
        } else {
            Signal::DecliningMomentum
        }
    } else {
        Signal::Neutral
    }
}

pub fn classify_atr(atr: f64, avg_change: f64, t: &SignalThresholds) -> Signal {
    if atr > t.atr_multiplier * avg_change {
        Signal::VolatilitySpike
    } else {
        Signal::Neutral
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t() -> SignalThresholds {
        SignalThresholds::default()
    }

    #[test]
    fn rsi_bands_are_inclusive() {
        assert_eq!(classify_rsi(80.0, &t()), Signal::HighExtreme);
        assert_eq!(classify_rsi(79.9, &t()), Signal::HighModerate);
        assert_eq!(classify_rsi(70.0, &t()), Signal::HighModerate);
        assert_eq!(classify_rsi(50.0, &t()), Signal::Neutral);
        assert_eq!(classify_rsi(30.0, &t()), Signal::LowModerate);
        assert_eq!(classify_rsi(20.0, &t()), Signal::LowExtreme);
    }

    #[test]
    fn williams_bands_are_negative() {
        assert_eq!(classify_williams_r(0.0, &t()), Signal::HighExtreme);
        assert_eq!(classify_williams_r(-15.0, &t()), Signal::HighModerate);
        assert_eq!(classify_williams_r(-50.0, &t()), Signal::Neutral);
        assert_eq!(classify_williams_r(-85.0, &t()), Signal::LowModerate);
        assert_eq!(classify_williams_r(-100.0, &t()), Signal::LowExtreme);
    }

    #[test]
    fn stochastic_crossovers_only_inside_band() {
        let rising = Stochastic { k: 60.0, d: 40.0 };
        assert_eq!(classify_stochastic(&rising, &t()), Signal::RisingCrossover);

        let declining = Stochastic { k: 40.0, d: 60.0 };
        assert_eq!(classify_stochastic(&declining, &t()), Signal::DecliningCrossover);

        let mirrored = Stochastic { k: 55.0, d: 55.0 };
        assert_eq!(classify_stochastic(&mirrored, &t()), Signal::Neutral);

        let overbought = Stochastic { k: 95.0, d: 10.0 };
        assert_eq!(classify_stochastic(&overbought, &t()), Signal::HighExtreme);
    }

    #[test]
    fn macd_scaled_signal_always_reads_as_crossover() {
        let up = Macd {
            line: 2.0,
            signal_line: 1.8,
            histogram: 0.2,
        };
        assert_eq!(classify_macd(&up, &t()), Signal::RisingCrossover);

        let down = Macd {
            line: -2.0,
            signal_line: -1.8,
            histogram: -0.2,
        };
        assert_eq!(classify_macd(&down, &t()), Signal::DecliningCrossover);
    }

    #[test]
    fn macd_strong_histogram_is_momentum() {
        let up = Macd {
            line: 1.0,
            signal_line: 0.2,
            histogram: 0.8,
        };
        assert_eq!(classify_macd(&up, &t()), Signal::RisingMomentum);

        let down = Macd {
            line: -1.0,
            signal_line: -0.2,
            histogram: -0.8,
        };
        assert_eq!(classify_macd(&down, &t()), Signal::DecliningMomentum);

        let flat = Macd {
            line: 0.0,
            signal_line: 0.0,
            histogram: 0.0,
        };
        assert_eq!(classify_macd(&flat, &t()), Signal::Neutral);
    }

    #[test]
    fn roc_compares_against_average_change() {
        assert_eq!(classify_roc(5.0, 2.0, &t()), Signal::RisingMomentum);
        assert_eq!(classify_roc(-5.0, 2.0, &t()), Signal::DecliningMomentum);
        assert_eq!(classify_roc(4.0, 2.0, &t()), Signal::Neutral);
        assert_eq!(classify_roc(0.0, 0.0, &t()), Signal::Neutral);
    }

    #[test]
    fn atr_spike_over_one_and_a_half_times_change() {
        assert_eq!(classify_atr(3.1, 2.0, &t()), Signal::VolatilitySpike);
        assert_eq!(classify_atr(3.0, 2.0, &t()), Signal::Neutral);
    }

    #[test]
    fn thresholds_deserialize_with_partial_overrides() {
        let t: SignalThresholds = serde_json::from_str(r#"{"atr_multiplier": 2.5}"#).unwrap();
        assert_eq!(t.atr_multiplier, 2.5);
        assert_eq!(t.rsi, default_rsi_band());
    }
}

//! Technical indicators over an oldest-first series of metric values.
//!
//! Every function returns `None` when the series is shorter than that
//! indicator's own minimum, so callers can keep whatever is computable.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Windows shorter than this produce no indicators at all.
pub const MIN_WINDOW_LEN: usize = 14;

/// How Stochastic %D is derived from %K.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StochasticD {
    /// %D is reported equal to %K, so the crossover signals never fire.
    #[default]
    MirrorK,
    /// %D is the mean of the last three %K values.
    Sma3,
}

impl FromStr for StochasticD {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mirror_k" => Ok(Self::MirrorK),
            "sma3" => Ok(Self::Sma3),
            _ => Err(format!("unknown stochastic %D mode: {s}")),
        }
    }
}

/// How the MACD signal line is derived from the MACD line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacdSignal {
    /// `signal = line * 0.9`.
    #[default]
    Scaled,
    /// EMA of the MACD line over `macd_signal_period`.
    Ema,
}

impl FromStr for MacdSignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scaled" => Ok(Self::Scaled),
            "ema" => Ok(Self::Ema),
            _ => Err(format!("unknown MACD signal mode: {s}")),
        }
    }
}

/// Periods and derivation modes for the indicator calculator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorParams {
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
    #[serde(default = "default_oscillator_period")]
    pub stochastic_period: usize,
    #[serde(default = "default_oscillator_period")]
    pub williams_period: usize,
    #[serde(default = "default_macd_fast")]
    pub macd_fast: usize,
    #[serde(default = "default_macd_slow")]
    pub macd_slow: usize,
    #[serde(default = "default_macd_signal_period")]
    pub macd_signal_period: usize,
    #[serde(default = "default_roc_period")]
    pub roc_period: usize,
    #[serde(default = "default_atr_period")]
    pub atr_period: usize,
    /// Number of trailing samples used for the mean absolute change that
    /// ROC and the ATR proxy are compared against.
    #[serde(default = "default_change_lookback")]
    pub change_lookback: usize,
    #[serde(default)]
    pub stochastic_d: StochasticD,
    #[serde(default)]
    pub macd_signal: MacdSignal,
}

fn default_rsi_period() -> usize {
    14
}

fn default_oscillator_period() -> usize {
    14
}

fn default_macd_fast() -> usize {
    12
}

fn default_macd_slow() -> usize {
    26
}

fn default_macd_signal_period() -> usize {
    9
}

fn default_roc_period() -> usize {
    10
}

fn default_atr_period() -> usize {
    14
}

fn default_change_lookback() -> usize {
    20
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            rsi_period: default_rsi_period(),
            stochastic_period: default_oscillator_period(),
            williams_period: default_oscillator_period(),
            macd_fast: default_macd_fast(),
            macd_slow: default_macd_slow(),
            macd_signal_period: default_macd_signal_period(),
            roc_period: default_roc_period(),
            atr_period: default_atr_period(),
            change_lookback: default_change_lookback(),
            stochastic_d: StochasticD::default(),
            macd_signal: MacdSignal::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stochastic {
    pub k: f64,
    pub d: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Macd {
    pub line: f64,
    pub signal_line: f64,
    pub histogram: f64,
}

/// Wilder-smoothed relative strength index.
///
/// Needs `period + 1` values: the first `period` deltas seed the averages.
pub fn rsi(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period + 1 {
        return None;
    }

    let deltas: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
    let (seed, rest) = deltas.split_at(period);
    let p = period as f64;

    let mut avg_gain = seed.iter().map(|d| d.max(0.0)).sum::<f64>() / p;
    let mut avg_loss = seed.iter().map(|d| (-d).max(0.0)).sum::<f64>() / p;

    for d in rest {
        avg_gain = (avg_gain * (p - 1.0) + d.max(0.0)) / p;
        avg_loss = (avg_loss * (p - 1.0) + (-d).max(0.0)) / p;
    }

    if avg_loss == 0.0 {
        return Some(100.0);
    }
    Some(100.0 - 100.0 / (1.0 + avg_gain / avg_loss))
}

fn tail(values: &[f64], period: usize) -> Option<&[f64]> {
    if period == 0 || values.len() < period {
        return None;
    }
    Some(&values[values.len() - period..])
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

/// Stochastic %K: position of the latest value inside the recent range.
pub fn stochastic_k(values: &[f64], period: usize) -> Option<f64> {
    let recent = tail(values, period)?;
    let (lowest, highest) = min_max(recent);
    let last = *recent.last()?;
    if highest == lowest {
        return Some(50.0);
    }
    Some((last - lowest) / (highest - lowest) * 100.0)
}

pub fn stochastic(values: &[f64], period: usize, mode: StochasticD) -> Option<Stochastic> {
    let k = stochastic_k(values, period)?;
    let d = match mode {
        StochasticD::MirrorK => k,
        // Falls back to %K until three full %K windows exist.
        StochasticD::Sma3 if values.len() >= period + 2 => {
            let n = values.len();
            let ks: Option<Vec<f64>> = (0..3)
                .map(|offset| stochastic_k(&values[..n - offset], period))
                .collect();
            ks.map(|ks| ks.iter().sum::<f64>() / 3.0).unwrap_or(k)
        }
        StochasticD::Sma3 => k,
    };
    Some(Stochastic { k, d })
}

/// Williams %R in `[-100, 0]`.
pub fn williams_r(values: &[f64], period: usize) -> Option<f64> {
    let recent = tail(values, period)?;
    let (lowest, highest) = min_max(recent);
    let last = *recent.last()?;
    if highest == lowest {
        return Some(-50.0);
    }
    Some((highest - last) / (highest - lowest) * -100.0)
}

/// Running EMA seeded with the first value (not an SMA seed).
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    let Some(&first) = values.first() else {
        return Vec::new();
    };
    let k = 2.0 / (period as f64 + 1.0);
    let mut current = first;
    let mut out = Vec::with_capacity(values.len());
    out.push(current);
    for &v in &values[1..] {
        current = v * k + current * (1.0 - k);
        out.push(current);
    }
    out
}

pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    ema_series(values, period).last().copied()
}

/// MACD line, signal line, and histogram. Needs `macd_slow` values.
pub fn macd(values: &[f64], params: &IndicatorParams) -> Option<Macd> {
    let slow_period = params.macd_slow.max(params.macd_fast);
    if slow_period == 0 || values.len() < slow_period {
        return None;
    }

    let fast = ema_series(values, params.macd_fast);
    let slow = ema_series(values, params.macd_slow);
    let lines: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
    let line = *lines.last()?;

    let signal_line = match params.macd_signal {
        MacdSignal::Scaled => line * 0.9,
        MacdSignal::Ema => ema(&lines[slow_period - 1..], params.macd_signal_period)?,
    };

    Some(Macd {
        line,
        signal_line,
        histogram: line - signal_line,
    })
}

/// Percentage change against the value `period` samples back.
pub fn roc(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period + 1 {
        return None;
    }
    let last = *values.last()?;
    let past = values[values.len() - 1 - period];
    if past == 0.0 {
        return Some(0.0);
    }
    Some((last - past) / past * 100.0)
}

/// Volatility proxy: population standard deviation of the last `period`
/// values. A scalar metric stream has no high/low/close, so dispersion
/// stands in for true range.
pub fn atr_proxy(values: &[f64], period: usize) -> Option<f64> {
    let recent = tail(values, period)?;
    let n = recent.len() as f64;
    let mean = recent.iter().sum::<f64>() / n;
    let variance = recent.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(variance.sqrt())
}

/// Mean absolute sample-to-sample change over the last `lookback` values.
pub fn mean_abs_change(values: &[f64], lookback: usize) -> f64 {
    let start = values.len().saturating_sub(lookback);
    let recent = &values[start..];
    if recent.len() < 2 {
        return 0.0;
    }
    let total: f64 = recent.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
    total / (recent.len() - 1) as f64
}

use crate::indicators::{self, IndicatorParams, Macd, Stochastic, MIN_WINDOW_LEN};
use crate::signal::{self, SignalThresholds};
use oxsignal_common::types::{IndicatorKind, MetricType, MetricWindow, Resolution, Signal};
use serde::Serialize;

/// Indicator-specific values beyond the headline number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndicatorDetail {
    Stochastic(Stochastic),
    Macd(Macd),
}

/// One computed indicator. `value` and `signal` are `None` when the window
/// was too short for this particular indicator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorResult {
    pub kind: IndicatorKind,
    pub value: Option<f64>,
    pub signal: Option<Signal>,
    pub detail: Option<IndicatorDetail>,
}

impl IndicatorResult {
    fn unavailable(kind: IndicatorKind) -> Self {
        Self {
            kind,
            value: None,
            signal: None,
            detail: None,
        }
    }

    fn scalar(kind: IndicatorKind, value: Option<f64>, classify: impl FnOnce(f64) -> Signal) -> Self {
        match value {
            Some(v) => Self {
                kind,
                value: Some(v),
                signal: Some(classify(v)),
                detail: None,
            },
            None => Self::unavailable(kind),
        }
    }

    pub fn is_available(&self) -> bool {
        self.value.is_some()
    }
}

/// Every indicator for one metric window, computed once per evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct IndicatorSet {
    pub agent_id: String,
    pub metric: MetricType,
    pub resolution: Resolution,
    pub sample_count: usize,
    pub latest_value: f64,
    pub rsi: IndicatorResult,
    pub stochastic: IndicatorResult,
    pub williams_r: IndicatorResult,
    pub macd: IndicatorResult,
    pub roc: IndicatorResult,
    pub atr: IndicatorResult,
}

impl IndicatorSet {
    /// Returns `None` when the window holds fewer than
    /// [`MIN_WINDOW_LEN`] samples.
    pub fn compute(
        window: &MetricWindow,
        params: &IndicatorParams,
        thresholds: &SignalThresholds,
    ) -> Option<Self> {
        if window.len() < MIN_WINDOW_LEN {
            return None;
        }
        let values = window.values();
        let latest_value = *values.last()?;
        let avg_change = indicators::mean_abs_change(&values, params.change_lookback);

        let rsi = IndicatorResult::scalar(
            IndicatorKind::Rsi,
            indicators::rsi(&values, params.rsi_period),
            |v| signal::classify_rsi(v, thresholds),
        );

        let stochastic =
            match indicators::stochastic(&values, params.stochastic_period, params.stochastic_d) {
                Some(s) => IndicatorResult {
                    kind: IndicatorKind::Stochastic,
                    value: Some(s.k),
                    signal: Some(signal::classify_stochastic(&s, thresholds)),
                    detail: Some(IndicatorDetail::Stochastic(s)),
                },
                None => IndicatorResult::unavailable(IndicatorKind::Stochastic),
            };

        let williams_r = IndicatorResult::scalar(
            IndicatorKind::WilliamsR,
            indicators::williams_r(&values, params.williams_period),
            |v| signal::classify_williams_r(v, thresholds),
        );

        let macd = match indicators::macd(&values, params) {
            Some(m) => IndicatorResult {
                kind: IndicatorKind::Macd,
                value: Some(m.line),
                signal: Some(signal::classify_macd(&m, thresholds)),
                detail: Some(IndicatorDetail::Macd(m)),
            },
            None => IndicatorResult::unavailable(IndicatorKind::Macd),
        };

        let roc = IndicatorResult::scalar(
            IndicatorKind::Roc,
            indicators::roc(&values, params.roc_period),
            |v| signal::classify_roc(v, avg_change, thresholds),
        );

        let atr = IndicatorResult::scalar(
            IndicatorKind::Atr,
            indicators::atr_proxy(&values, params.atr_period),
            |v| signal::classify_atr(v, avg_change, thresholds),
        );

        Some(Self {
            agent_id: window.agent_id.clone(),
            metric: window.metric,
            resolution: window.resolution,
            sample_count: values.len(),
            latest_value,
            rsi,
            stochastic,
            williams_r,
            macd,
            roc,
            atr,
        })
    }

    pub fn get(&self, kind: IndicatorKind) -> &IndicatorResult {
        match kind {
            IndicatorKind::Rsi => &self.rsi,
            IndicatorKind::Stochastic => &self.stochastic,
            IndicatorKind::WilliamsR => &self.williams_r,
            IndicatorKind::Macd => &self.macd,
            IndicatorKind::Roc => &self.roc,
            IndicatorKind::Atr => &self.atr,
        }
    }

    pub fn results(&self) -> impl Iterator<Item = &IndicatorResult> {
        IndicatorKind::ALL.into_iter().map(move |kind| self.get(kind))
    }
}

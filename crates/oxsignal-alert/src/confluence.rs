//! Matches an [`IndicatorSet`] against alert configurations.

use crate::configuration::AlertConfiguration;
use crate::indicator_set::IndicatorSet;
use chrono::{DateTime, Utc};
use oxsignal_common::types::{
    AlertRecord, AlertType, ContributingIndicator, IndicatorKind, MetricSnapshot, MetricType,
    NotificationRouting, Severity, Signal,
};

/// A configuration that found enough agreeing indicators. Consumed by the
/// debounce gate right after evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertCandidate {
    pub configuration_id: String,
    pub configuration_name: String,
    pub alert_type: AlertType,
    pub metric: MetricType,
    pub severity: Severity,
    pub indicators: Vec<ContributingIndicator>,
    pub notifications: NotificationRouting,
}

/// Whether `signal` from indicator `kind` supports `alert_type`, and if so
/// whether it counts as extreme.
pub fn match_signal(alert_type: AlertType, kind: IndicatorKind, signal: Signal) -> Option<bool> {
    let matched = match alert_type {
        AlertType::HighUtilization => signal.is_high(),
        AlertType::LowUtilization => signal.is_low(),
        AlertType::RisingTrend => match kind {
            IndicatorKind::Stochastic => signal == Signal::RisingCrossover,
            IndicatorKind::Macd | IndicatorKind::Roc => signal.is_rising(),
            _ => false,
        },
        AlertType::DecliningTrend => match kind {
            IndicatorKind::Stochastic => signal == Signal::DecliningCrossover,
            IndicatorKind::Macd | IndicatorKind::Roc => signal.is_declining(),
            _ => false,
        },
        AlertType::VolatilitySpike => {
            kind == IndicatorKind::Atr && signal == Signal::VolatilitySpike
        }
    };
    if !matched {
        return None;
    }

    let extreme = match alert_type {
        AlertType::HighUtilization => signal == Signal::HighExtreme,
        AlertType::LowUtilization => signal == Signal::LowExtreme,
        AlertType::VolatilitySpike => true,
        AlertType::RisingTrend | AlertType::DecliningTrend => false,
    };
    Some(extreme)
}

/// Every enabled, available indicator whose signal supports the
/// configuration's alert type.
pub fn matching_signals(set: &IndicatorSet, config: &AlertConfiguration) -> Vec<ContributingIndicator> {
    set.results()
        .filter(|r| config.indicator_enabled(r.kind))
        .filter_map(|r| {
            let value = r.value?;
            let signal = r.signal?;
            let is_extreme = match_signal(config.alert_type, r.kind, signal)?;
            Some(ContributingIndicator {
                indicator: r.kind,
                value,
                signal,
                is_extreme,
            })
        })
        .collect()
}

/// Step function on the number of agreeing indicators.
pub fn severity_for_count(count: usize) -> Severity {
    match count {
        n if n >= 5 => Severity::Critical,
        4 => Severity::High,
        3 => Severity::Medium,
        _ => Severity::Low,
    }
}

pub fn should_alert(signals: &[ContributingIndicator], config: &AlertConfiguration) -> bool {
    signals.len() >= config.min_indicator_count
        || (signals.len() == 1
            && config.require_extreme_for_single
            && signals.iter().any(|s| s.is_extreme))
}

/// Evaluates a single configuration. Disabled configurations, other
/// metrics, and configurations with no agreeing indicator yield `None`.
pub fn evaluate_configuration(
    set: &IndicatorSet,
    config: &AlertConfiguration,
) -> Option<AlertCandidate> {
    if !config.enabled || config.metric != set.metric {
        return None;
    }

    let signals = matching_signals(set, config);
    if signals.is_empty() || !should_alert(&signals, config) {
        return None;
    }

    Some(AlertCandidate {
        configuration_id: config.id.clone(),
        configuration_name: config.name.clone(),
        alert_type: config.alert_type,
        metric: config.metric,
        severity: severity_for_count(signals.len()),
        indicators: signals,
        notifications: config.notifications,
    })
}

/// Evaluates every configuration independently against one metric's
/// indicators. Configurations are expected to be validated already.
pub fn analyze_confluence(set: &IndicatorSet, configs: &[AlertConfiguration]) -> Vec<AlertCandidate> {
    configs
        .iter()
        .filter_map(|config| evaluate_configuration(set, config))
        .collect()
}

impl AlertCandidate {
    pub fn message(&self, agent_id: &str) -> String {
        let parts: Vec<String> = self
            .indicators
            .iter()
            .map(|i| format!("{}={:.1}", i.indicator, i.value))
            .collect();
        format!(
            "{} {} confluence on {}: {} indicators ({})",
            self.metric,
            self.alert_type,
            agent_id,
            self.indicators.len(),
            parts.join(", "),
        )
    }

    /// Builds the record handed to alert history.
    pub fn into_record(
        self,
        agent_id: &str,
        snapshot: &MetricSnapshot,
        now: DateTime<Utc>,
    ) -> AlertRecord {
        let message = self.message(agent_id);
        AlertRecord {
            id: oxsignal_common::id::next_id(),
            agent_id: agent_id.to_string(),
            configuration_id: self.configuration_id,
            configuration_name: self.configuration_name,
            alert_type: self.alert_type,
            metric: self.metric,
            severity: self.severity,
            message,
            indicators: self.indicators,
            notifications: self.notifications,
            snapshot: *snapshot,
            created_at: now,
        }
    }
}

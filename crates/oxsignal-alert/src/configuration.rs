use crate::error::ConfigError;
use oxsignal_common::types::{AlertType, IndicatorKind, MetricType, NotificationRouting};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// An operator-defined confluence rule.
///
/// Stored as JSON; omitted fields take the defaults below (all indicators
/// enabled, `min_indicator_count = 2`, every agent).
///
/// # Examples
///
/// ```
/// use oxsignal_alert::configuration::AlertConfiguration;
/// use oxsignal_common::types::{AlertType, MetricType};
///
/// let cfg: AlertConfiguration = serde_json::from_str(r#"{
///     "id": "cpu-hot",
///     "name": "CPU running hot",
///     "alert_type": "high_utilization",
///     "metric_type": "cpu"
/// }"#).unwrap();
/// assert_eq!(cfg.alert_type, AlertType::HighUtilization);
/// assert_eq!(cfg.metric, MetricType::Cpu);
/// assert_eq!(cfg.min_indicator_count, 2);
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfiguration {
    pub id: String,
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub alert_type: AlertType,
    #[serde(rename = "metric_type")]
    pub metric: MetricType,
    /// Glob over agent ids, e.g. `"prod-*"`.
    #[serde(default = "default_agent_pattern")]
    pub agent_pattern: String,
    #[serde(default)]
    pub rsi_settings: IndicatorSettings,
    #[serde(default)]
    pub stochastic_settings: IndicatorSettings,
    #[serde(default)]
    pub williams_r_settings: IndicatorSettings,
    #[serde(default)]
    pub macd_settings: IndicatorSettings,
    #[serde(default)]
    pub roc_settings: IndicatorSettings,
    #[serde(default)]
    pub atr_settings: IndicatorSettings,
    #[serde(default = "default_min_indicator_count")]
    pub min_indicator_count: usize,
    /// Lets a single extreme signal alert on its own.
    #[serde(default)]
    pub require_extreme_for_single: bool,
    #[serde(default)]
    pub notifications: NotificationRouting,
}

fn default_enabled() -> bool {
    true
}

fn default_agent_pattern() -> String {
    "*".to_string()
}

fn default_min_indicator_count() -> usize {
    2
}

/// Whether an indicator is capable of producing a signal that the alert
/// type looks for.
pub fn can_contribute(alert_type: AlertType, kind: IndicatorKind) -> bool {
    use IndicatorKind::*;
    match alert_type {
        AlertType::HighUtilization | AlertType::LowUtilization => {
            matches!(kind, Rsi | Stochastic | WilliamsR)
        }
        AlertType::RisingTrend | AlertType::DecliningTrend => matches!(kind, Stochastic | Macd | Roc),
        AlertType::VolatilitySpike => kind == Atr,
    }
}

impl AlertConfiguration {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn settings(&self, kind: IndicatorKind) -> &IndicatorSettings {
        match kind {
            IndicatorKind::Rsi => &self.rsi_settings,
            IndicatorKind::Stochastic => &self.stochastic_settings,
            IndicatorKind::WilliamsR => &self.williams_r_settings,
            IndicatorKind::Macd => &self.macd_settings,
            IndicatorKind::Roc => &self.roc_settings,
            IndicatorKind::Atr => &self.atr_settings,
        }
    }

    pub fn indicator_enabled(&self, kind: IndicatorKind) -> bool {
        self.settings(kind).enabled
    }

    pub fn applies_to(&self, agent_id: &str) -> bool {
        self.agent_pattern == "*" || glob_match::glob_match(&self.agent_pattern, agent_id)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::MissingField("id"));
        }
        if self.agent_pattern.trim().is_empty() {
            return Err(ConfigError::MissingField("agent_pattern"));
        }
        if self.min_indicator_count == 0 {
            return Err(ConfigError::ZeroMinIndicatorCount);
        }

        let enabled: Vec<IndicatorKind> = IndicatorKind::ALL
            .into_iter()
            .filter(|k| self.indicator_enabled(*k))
            .collect();
        if enabled.is_empty() {
            return Err(ConfigError::NoIndicatorsEnabled);
        }
        if !enabled.iter().any(|k| can_contribute(self.alert_type, *k)) {
            return Err(ConfigError::UnreachableAlertType {
                alert_type: self.alert_type,
            });
        }
        Ok(())
    }
}

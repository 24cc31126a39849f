use oxsignal_alert::configuration::AlertConfiguration;
use oxsignal_alert::detector::DetectorSettings;
use oxsignal_alert::indicators::{IndicatorParams, MIN_WINDOW_LEN};
use oxsignal_alert::signal::SignalThresholds;
use oxsignal_common::types::Resolution;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Maximum number of points fetched per metric window.
    #[serde(default = "default_lookback_samples")]
    pub lookback_samples: usize,
    /// Upper bound on every window, configuration and history call.
    #[serde(default = "default_io_timeout_secs")]
    pub io_timeout_secs: u64,
    /// Debounce window per (agent, configuration).
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: i64,
    /// Window resolution for agents without an override.
    #[serde(default)]
    pub default_resolution: Resolution,
    /// Insert the built-in configurations when the table is empty.
    #[serde(default = "default_seed_defaults")]
    pub seed_default_configurations: bool,

    #[serde(default)]
    pub indicators: IndicatorParams,
    #[serde(default)]
    pub thresholds: SignalThresholds,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            lookback_samples: default_lookback_samples(),
            io_timeout_secs: default_io_timeout_secs(),
            cooldown_minutes: default_cooldown_minutes(),
            default_resolution: Resolution::default(),
            seed_default_configurations: default_seed_defaults(),
            indicators: IndicatorParams::default(),
            thresholds: SignalThresholds::default(),
        }
    }
}

// ---- Rules seed file types (used by `init-rules` CLI subcommand) ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesSeedFile {
    #[serde(default)]
    pub configurations: Vec<AlertConfiguration>,
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_lookback_samples() -> usize {
    100
}

fn default_io_timeout_secs() -> u64 {
    10
}

fn default_cooldown_minutes() -> i64 {
    15
}

fn default_seed_defaults() -> bool {
    true
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config '{}': {}", path, e))?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.lookback_samples < MIN_WINDOW_LEN {
            anyhow::bail!(
                "lookback_samples must be at least {MIN_WINDOW_LEN}, got {}",
                self.lookback_samples
            );
        }
        if self.io_timeout_secs == 0 {
            anyhow::bail!("io_timeout_secs must be positive");
        }
        if self.cooldown_minutes <= 0 {
            anyhow::bail!("cooldown_minutes must be positive");
        }
        let p = &self.indicators;
        if p.macd_fast >= p.macd_slow {
            anyhow::bail!(
                "indicators.macd_fast ({}) must be shorter than macd_slow ({})",
                p.macd_fast,
                p.macd_slow
            );
        }
        Ok(())
    }

    pub fn detector_settings(&self) -> DetectorSettings {
        DetectorSettings {
            lookback: self.lookback_samples,
            io_timeout: Duration::from_secs(self.io_timeout_secs),
            cooldown: chrono::Duration::minutes(self.cooldown_minutes),
            params: self.indicators.clone(),
            thresholds: self.thresholds.clone(),
        }
    }
}

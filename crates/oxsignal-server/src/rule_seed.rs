use crate::config::RulesSeedFile;
use oxsignal_alert::configuration::AlertConfiguration;
use oxsignal_storage::SqliteStore;

/// Default confluence configurations for first-time startup.
struct ConfigDef {
    name: &'static str,
    config_json: &'static str,
}

const DEFAULT_CONFIGURATIONS: &[ConfigDef] = &[
    // ---- CPU ----
    ConfigDef {
        name: "cpu-high-utilization",
        config_json: r#"{
            "id": "cpu-high-utilization",
            "name": "CPU utilization confluence",
            "alert_type": "high_utilization",
            "metric_type": "cpu",
            "min_indicator_count": 2,
            "notifications": {"email": true, "websocket": true}
        }"#,
    },
    ConfigDef {
        name: "cpu-rising-trend",
        config_json: r#"{
            "id": "cpu-rising-trend",
            "name": "CPU rising trend",
            "alert_type": "rising_trend",
            "metric_type": "cpu",
            "min_indicator_count": 2,
            "notifications": {"websocket": true}
        }"#,
    },
    ConfigDef {
        name: "cpu-volatility",
        config_json: r#"{
            "id": "cpu-volatility",
            "name": "CPU volatility spike",
            "alert_type": "volatility_spike",
            "metric_type": "cpu",
            "min_indicator_count": 2,
            "require_extreme_for_single": true,
            "notifications": {"websocket": true, "browser": true}
        }"#,
    },
    // ---- Memory ----
    ConfigDef {
        name: "memory-high-utilization",
        config_json: r#"{
            "id": "memory-high-utilization",
            "name": "Memory utilization confluence",
            "alert_type": "high_utilization",
            "metric_type": "memory",
            "min_indicator_count": 2,
            "notifications": {"email": true, "websocket": true}
        }"#,
    },
    ConfigDef {
        name: "memory-rising-trend",
        config_json: r#"{
            "id": "memory-rising-trend",
            "name": "Memory rising trend",
            "alert_type": "rising_trend",
            "metric_type": "memory",
            "min_indicator_count": 2,
            "notifications": {"websocket": true}
        }"#,
    },
    // ---- Disk ----
    ConfigDef {
        name: "disk-high-utilization",
        config_json: r#"{
            "id": "disk-high-utilization",
            "name": "Disk utilization confluence",
            "alert_type": "high_utilization",
            "metric_type": "disk",
            "min_indicator_count": 2,
            "notifications": {"email": true, "sms": true}
        }"#,
    },
];

/// Insert the default configurations if the table is empty.
///
/// Only seeds when `count_configurations() == 0`, so operator edits and
/// deletions survive restarts.
pub fn init_default_configurations(store: &SqliteStore) -> anyhow::Result<usize> {
    let count = store.count_configurations()?;
    if count > 0 {
        tracing::debug!(
            existing = count,
            "Alert configurations already exist, skipping seed initialization"
        );
        return Ok(0);
    }

    let mut inserted = 0usize;
    for def in DEFAULT_CONFIGURATIONS {
        let config = match AlertConfiguration::from_json(def.config_json) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(name = %def.name, error = %e, "Invalid default configuration");
                continue;
            }
        };
        match store.upsert_configuration(&config) {
            Ok(()) => {
                inserted += 1;
                tracing::info!(name = %def.name, alert_type = %config.alert_type, "Seeded alert configuration");
            }
            Err(e) => {
                tracing::warn!(name = %def.name, error = %e, "Failed to seed alert configuration");
            }
        }
    }

    tracing::info!(
        inserted,
        total = DEFAULT_CONFIGURATIONS.len(),
        "Default alert configurations initialized"
    );
    Ok(inserted)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedOutcome {
    pub upserted: usize,
    pub invalid: usize,
    pub failed: usize,
}

/// Upserts every valid configuration from a seed file. Invalid entries are
/// logged and counted, never written.
pub fn apply_seed(store: &SqliteStore, seed: &RulesSeedFile) -> SeedOutcome {
    let mut outcome = SeedOutcome::default();
    for config in &seed.configurations {
        if let Err(e) = config.validate() {
            tracing::warn!(configuration_id = %config.id, error = %e, "Skipping invalid configuration");
            outcome.invalid += 1;
            continue;
        }
        match store.upsert_configuration(config) {
            Ok(()) => {
                tracing::info!(configuration_id = %config.id, name = %config.name, "Alert configuration upserted");
                outcome.upserted += 1;
            }
            Err(e) => {
                tracing::error!(configuration_id = %config.id, error = %e, "Failed to upsert alert configuration");
                outcome.failed += 1;
            }
        }
    }
    outcome
}

/// Reads and parses a `{"configurations": [...]}` seed file.
pub fn read_seed_file(path: &str) -> anyhow::Result<RulesSeedFile> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read seed file '{}': {}", path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse seed file '{}': {}", path, e))
}

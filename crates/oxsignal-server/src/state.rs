use crate::config::ServerConfig;
use crate::rule_seed;
use oxsignal_alert::detector::AlertDetector;
use oxsignal_storage::SqliteStore;
use std::path::Path;
use std::sync::Arc;

/// Shared handles for report processing. Cheap to clone; one per task.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SqliteStore>,
    pub detector: Arc<AlertDetector>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Opens the store under `config.data_dir`, seeds default
    /// configurations when enabled, and wires the detector to the store.
    pub fn open(config: ServerConfig) -> anyhow::Result<Self> {
        let store = Arc::new(SqliteStore::open(
            Path::new(&config.data_dir),
            config.default_resolution,
        )?);

        if config.seed_default_configurations {
            rule_seed::init_default_configurations(&store)?;
        }

        let detector = Arc::new(AlertDetector::new(
            store.clone(),
            store.clone(),
            store.clone(),
            config.detector_settings(),
        ));

        Ok(Self {
            store,
            detector,
            config: Arc::new(config),
        })
    }
}

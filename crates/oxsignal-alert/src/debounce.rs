use crate::error::{DetectError, Result};
use crate::AlertHistory;
use oxsignal_common::types::AlertRecord;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub(crate) async fn bounded<T>(
    operation: &'static str,
    limit: Duration,
    fut: impl Future<Output = anyhow::Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(DetectError::Source {
            operation,
            message: format!("{e:#}"),
        }),
        Err(_) => Err(DetectError::Timeout {
            operation,
            timeout: limit,
        }),
    }
}

/// Suppresses repeat alerts for the same `(agent, configuration)` pair
/// within the cooldown. Holds no state of its own; the history store
/// decides.
pub struct DebounceGate {
    history: Arc<dyn AlertHistory>,
    cooldown: chrono::Duration,
    io_timeout: Duration,
}

impl DebounceGate {
    pub fn new(history: Arc<dyn AlertHistory>, cooldown: chrono::Duration, io_timeout: Duration) -> Self {
        Self {
            history,
            cooldown,
            io_timeout,
        }
    }

    pub async fn is_suppressed(&self, agent_id: &str, configuration_id: &str) -> Result<bool> {
        bounded(
            "check recent alerts",
            self.io_timeout,
            self.history
                .has_recent_similar_alert(agent_id, configuration_id, self.cooldown),
        )
        .await
    }

    /// Persists `record` unless the pair fired within the cooldown.
    ///
    /// Only this conditional insert guarantees one alert per pair per
    /// cooldown under concurrent reports; [`Self::is_suppressed`] may pass
    /// for both.
    pub async fn persist(&self, record: &AlertRecord) -> Result<Option<AlertRecord>> {
        bounded(
            "persist alert",
            self.io_timeout,
            self.history.save_alert_if_absent(record, self.cooldown),
        )
        .await
    }
}

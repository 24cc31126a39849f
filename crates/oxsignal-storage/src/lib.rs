//! SQLite persistence for the confluence alert engine.
//!
//! [`SqliteStore`] keeps raw metric samples, per-agent resolution
//! overrides, alert configurations (as JSON bodies) and alert history in a
//! single WAL-mode database, and implements the three collaborator traits
//! the detector depends on. Candle windows are aggregated on read from raw
//! samples ([`candles`]).

pub mod candles;
pub mod engine;
pub mod error;


pub use engine::SqliteStore;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Duration;
use oxsignal_alert::configuration::AlertConfiguration;
use oxsignal_alert::{AlertHistory, ConfigurationSource, MetricWindowProvider};
use oxsignal_common::types::{AlertRecord, MetricType, MetricWindow, Resolution};

impl SqliteStore {
    /// Runs `f` on the blocking pool so callers can time out while the
    /// connection is busy.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&SqliteStore) -> error::Result<T> + Send + 'static,
    {
        let store = self.clone();
        Ok(tokio::task::spawn_blocking(move || f(&store)).await??)
    }
}

#[async_trait]
impl MetricWindowProvider for SqliteStore {
    async fn effective_resolution(&self, agent_id: &str) -> Result<Resolution> {
        let agent_id = agent_id.to_owned();
        self.blocking(move |store| store.agent_resolution(&agent_id))
            .await
    }

    async fn window(
        &self,
        agent_id: &str,
        metric: MetricType,
        resolution: Resolution,
        lookback: usize,
    ) -> Result<MetricWindow> {
        let agent_id = agent_id.to_owned();
        self.blocking(move |store| store.load_window(&agent_id, metric, resolution, lookback))
            .await
    }
}

#[async_trait]
impl ConfigurationSource for SqliteStore {
    async fn enabled_configurations(&self) -> Result<Vec<AlertConfiguration>> {
        self.blocking(|store| store.list_configurations(true)).await
    }
}

#[async_trait]
impl AlertHistory for SqliteStore {
    async fn has_recent_similar_alert(
        &self,
        agent_id: &str,
        configuration_id: &str,
        window: Duration,
    ) -> Result<bool> {
        let agent_id = agent_id.to_owned();
        let configuration_id = configuration_id.to_owned();
        self.blocking(move |store| store.has_recent_alert(&agent_id, &configuration_id, window))
            .await
    }

    async fn save_alert(&self, record: &AlertRecord) -> Result<AlertRecord> {
        let record = record.clone();
        self.blocking(move |store| store.insert_alert(&record).map(|()| record))
            .await
    }

    async fn save_alert_if_absent(
        &self,
        record: &AlertRecord,
        window: Duration,
    ) -> Result<Option<AlertRecord>> {
        let record = record.clone();
        self.blocking(move |store| {
            let inserted = store.insert_alert_if_absent(&record, window)?;
            Ok(inserted.then_some(record))
        })
        .await
    }
}

//! Confluence alert engine for agent health metrics.
//!
//! A metric window is turned into an [`indicator_set::IndicatorSet`] of six
//! technical indicators, each classified into a qualitative signal. Every
//! enabled [`configuration::AlertConfiguration`] is then matched against
//! those signals; configurations with enough agreeing indicators become
//! alert candidates, which pass through a history-backed debounce gate
//! before being persisted.
//!
//! Everything stateful lives behind the collaborator traits below, so an
//! [`detector::AlertDetector`] holds no mutable state between calls.

pub mod configuration;
pub mod confluence;
pub mod debounce;
pub mod detector;
pub mod error;
pub mod indicator_set;
pub mod indicators;
pub mod signal;

#[cfg(test)]
mod tests;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Duration;
use configuration::AlertConfiguration;
use oxsignal_common::types::{AlertRecord, MetricType, MetricWindow, Resolution};

/// Source of historical metric windows (raw samples or candles).
#[async_trait]
pub trait MetricWindowProvider: Send + Sync {
    /// The resolution windows for this agent should be fetched at.
    async fn effective_resolution(&self, agent_id: &str) -> Result<Resolution>;

    /// Up to `lookback` points for one metric, oldest first.
    async fn window(
        &self,
        agent_id: &str,
        metric: MetricType,
        resolution: Resolution,
        lookback: usize,
    ) -> Result<MetricWindow>;
}

/// Source of the active rule set.
#[async_trait]
pub trait ConfigurationSource: Send + Sync {
    async fn enabled_configurations(&self) -> Result<Vec<AlertConfiguration>>;
}

/// Persisted alert history, the single source of truth for debouncing.
///
/// Implementations must make [`AlertHistory::save_alert_if_absent`] atomic
/// per `(agent_id, configuration_id)`: two concurrent calls for the same
/// pair inside one window persist at most one record.
#[async_trait]
pub trait AlertHistory: Send + Sync {
    /// Whether an alert for this pair was persisted within `window`.
    async fn has_recent_similar_alert(
        &self,
        agent_id: &str,
        configuration_id: &str,
        window: Duration,
    ) -> Result<bool>;

    /// Unconditionally persists `record`.
    async fn save_alert(&self, record: &AlertRecord) -> Result<AlertRecord>;

    /// Persists `record` unless an alert for the same pair exists within
    /// `window`. Returns `None` when the record was suppressed.
    async fn save_alert_if_absent(
        &self,
        record: &AlertRecord,
        window: Duration,
    ) -> Result<Option<AlertRecord>>;
}

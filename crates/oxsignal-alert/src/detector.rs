use crate::configuration::AlertConfiguration;
use crate::confluence::{analyze_confluence, AlertCandidate};
use crate::debounce::{bounded, DebounceGate};
use crate::error::Result;
use crate::indicator_set::IndicatorSet;
use crate::indicators::IndicatorParams;
use crate::signal::SignalThresholds;
use crate::{AlertHistory, ConfigurationSource, MetricWindowProvider};
use chrono::Utc;
use oxsignal_common::types::{AlertSummary, MetricSnapshot, MetricType};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// Maximum number of points requested per metric window.
    pub lookback: usize,
    /// Upper bound on every collaborator call.
    pub io_timeout: Duration,
    pub cooldown: chrono::Duration,
    pub params: IndicatorParams,
    pub thresholds: SignalThresholds,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            lookback: 100,
            io_timeout: Duration::from_secs(10),
            cooldown: chrono::Duration::minutes(15),
            params: IndicatorParams::default(),
            thresholds: SignalThresholds::default(),
        }
    }
}

/// Entry point of the pipeline: window → indicators → confluence →
/// debounce → history.
pub struct AlertDetector {
    windows: Arc<dyn MetricWindowProvider>,
    configurations: Arc<dyn ConfigurationSource>,
    gate: DebounceGate,
    settings: DetectorSettings,
}

impl AlertDetector {
    pub fn new(
        windows: Arc<dyn MetricWindowProvider>,
        configurations: Arc<dyn ConfigurationSource>,
        history: Arc<dyn AlertHistory>,
        settings: DetectorSettings,
    ) -> Self {
        let gate = DebounceGate::new(history, settings.cooldown, settings.io_timeout);
        Self {
            windows,
            configurations,
            gate,
            settings,
        }
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    /// Evaluates every applicable configuration for `agent_id` and persists
    /// the alerts that pass the debounce gate.
    ///
    /// Never fails: a configuration, window or history error (or timeout)
    /// is logged and yields an empty list, and the next report retries.
    pub async fn detect_and_create_alerts(
        &self,
        agent_id: &str,
        snapshot: &MetricSnapshot,
    ) -> Vec<AlertSummary> {
        let candidates = match self.evaluate(agent_id).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(agent_id, error = %e, "Alert evaluation aborted");
                return Vec::new();
            }
        };

        match self.admit(agent_id, snapshot, candidates).await {
            Ok(summaries) => summaries,
            Err(e) => {
                tracing::error!(agent_id, error = %e, "Alert history unavailable, no alerts emitted");
                Vec::new()
            }
        }
    }

    /// Checks every candidate against the cooldown before persisting any,
    /// then saves the survivors. Stops at the first history error.
    async fn admit(
        &self,
        agent_id: &str,
        snapshot: &MetricSnapshot,
        candidates: Vec<AlertCandidate>,
    ) -> Result<Vec<AlertSummary>> {
        let mut pending = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if self
                .gate
                .is_suppressed(agent_id, &candidate.configuration_id)
                .await?
            {
                tracing::debug!(
                    agent_id,
                    configuration_id = %candidate.configuration_id,
                    "Alert suppressed (cooldown)"
                );
                continue;
            }
            pending.push(candidate.into_record(agent_id, snapshot, Utc::now()));
        }

        let mut summaries = Vec::with_capacity(pending.len());
        for record in pending {
            match self.gate.persist(&record).await? {
                Some(saved) => {
                    tracing::info!(
                        agent_id,
                        configuration_id = %saved.configuration_id,
                        alert_id = %saved.id,
                        severity = %saved.severity,
                        indicators = saved.indicators.len(),
                        "Confluence alert created"
                    );
                    summaries.push(AlertSummary::from(&saved));
                }
                None => tracing::debug!(
                    agent_id,
                    configuration_id = %record.configuration_id,
                    "Alert suppressed (cooldown)"
                ),
            }
        }
        Ok(summaries)
    }

    /// Fetches configurations and windows and runs the confluence analysis
    /// without touching alert history.
    pub async fn evaluate(&self, agent_id: &str) -> Result<Vec<AlertCandidate>> {
        let limit = self.settings.io_timeout;

        let configs: Vec<AlertConfiguration> = bounded(
            "fetch configurations",
            limit,
            self.configurations.enabled_configurations(),
        )
        .await?
        .into_iter()
        .filter(|c| c.enabled && c.applies_to(agent_id))
        .filter(|c| match c.validate() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    configuration_id = %c.id,
                    configuration_name = %c.name,
                    error = %e,
                    "Skipping invalid alert configuration"
                );
                false
            }
        })
        .collect();

        if configs.is_empty() {
            tracing::debug!(agent_id, "No alert configurations apply");
            return Ok(Vec::new());
        }

        let resolution = bounded(
            "fetch resolution",
            limit,
            self.windows.effective_resolution(agent_id),
        )
        .await?;

        let metrics: BTreeSet<MetricType> = configs.iter().map(|c| c.metric).collect();

        // Every window is fetched before any candidate is produced, so a
        // failure part-way leaves nothing half-evaluated.
        let mut sets = Vec::with_capacity(metrics.len());
        for metric in metrics {
            let window = bounded(
                "fetch metric window",
                limit,
                self.windows
                    .window(agent_id, metric, resolution, self.settings.lookback),
            )
            .await?;

            match IndicatorSet::compute(&window, &self.settings.params, &self.settings.thresholds) {
                Some(set) => sets.push(set),
                None => tracing::debug!(
                    agent_id,
                    metric = %metric,
                    samples = window.len(),
                    "Insufficient data for indicators"
                ),
            }
        }

        Ok(sets
            .iter()
            .flat_map(|set| analyze_confluence(set, &configs))
            .collect())
    }
}

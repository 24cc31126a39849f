use crate::state::AppState;
use chrono::{DateTime, Utc};
use oxsignal_common::types::{AlertSummary, MetricSnapshot};
use serde::{Deserialize, Serialize};

/// One periodic health report from an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReport {
    pub agent_id: String,
    /// Defaults to the time the report is processed.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportResponse {
    pub agent_id: String,
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub alerts: Vec<AlertSummary>,
}

impl AgentReport {
    pub fn validate(&self) -> Result<(), String> {
        if self.agent_id.trim().is_empty() {
            return Err("agent_id is required".to_string());
        }
        for (name, value) in [
            ("cpu_percent", self.cpu_percent),
            ("memory_percent", self.memory_percent),
            ("disk_percent", self.disk_percent),
        ] {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(format!("{name} must be within 0..=100, got {value}"));
            }
        }
        Ok(())
    }

    pub fn snapshot(&self) -> MetricSnapshot {
        MetricSnapshot {
            cpu_percent: self.cpu_percent,
            memory_percent: self.memory_percent,
            disk_percent: self.disk_percent,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        }
    }
}

/// Stores the report's samples and runs alert detection for the agent.
///
/// A rejected or unstorable report comes back with `success = false`;
/// detection itself never fails the report.
pub async fn process_report(state: &AppState, report: AgentReport) -> ReportResponse {
    if let Err(message) = report.validate() {
        tracing::warn!(agent_id = %report.agent_id, reason = %message, "Rejected agent report");
        return ReportResponse {
            agent_id: report.agent_id,
            success: false,
            message,
            alerts: Vec::new(),
        };
    }

    let snapshot = report.snapshot();
    if let Err(e) = state.store.record_snapshot(&report.agent_id, &snapshot) {
        tracing::error!(agent_id = %report.agent_id, error = %e, "Failed to write agent report");
        return ReportResponse {
            agent_id: report.agent_id,
            success: false,
            message: format!("storage error: {e}"),
            alerts: Vec::new(),
        };
    }

    let alerts = state
        .detector
        .detect_and_create_alerts(&report.agent_id, &snapshot)
        .await;

    tracing::debug!(
        agent_id = %report.agent_id,
        alerts = alerts.len(),
        "Report processed"
    );

    ReportResponse {
        agent_id: report.agent_id,
        success: true,
        message: "ok".to_string(),
        alerts,
    }
}

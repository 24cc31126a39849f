use oxsignal_common::types::AlertType;
use std::time::Duration;

/// Reasons an alert configuration is rejected before evaluation.
///
/// # Examples
///
/// ```rust
/// use oxsignal_alert::error::ConfigError;
///
/// let err = ConfigError::MissingField("id");
/// assert!(err.to_string().contains("'id'"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required string field is empty.
    #[error("Config: missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Config: min_indicator_count must be at least 1")]
    ZeroMinIndicatorCount,

    #[error("Config: no indicators are enabled")]
    NoIndicatorsEnabled,

    /// None of the enabled indicators can ever produce a signal of the
    /// kind this alert type looks for.
    #[error("Config: alert type '{alert_type}' cannot match any enabled indicator")]
    UnreachableAlertType { alert_type: AlertType },

    /// The stored JSON body could not be decoded.
    #[error("Config: invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures that abort one detection run. All of them are retryable: the
/// next metric report for the agent triggers a fresh evaluation.
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("Detect: {operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// A collaborator returned an error.
    #[error("Detect: {operation} failed: {message}")]
    Source {
        operation: &'static str,
        message: String,
    },
}

/// Convenience `Result` alias for detection operations.
pub type Result<T> = std::result::Result<T, DetectError>;

//! Error types for MLR Watch.
//!
//! This module provides structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Recoverability hints for automation
//! - Remediation suggestions for humans
//!
//! Only [`Error::DataSourceUnavailable`] aborts a run. Unknown benefit codes,
//! zero denominators and notification failures degrade gracefully and are
//! surfaced as markers in the run report rather than as errors.
//!
//! # Agent-Facing Output
//!
//! Errors serialize to structured JSON:
//! ```json
//! {
//!   "code": 20,
//!   "category": "source",
//!   "message": "data source unavailable: claims.csv: No such file or directory",
//!   "recoverable": true,
//!   "suggested_action": "retry",
//!   "context": { "source": "claims.csv" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for MLR Watch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration and reference-table errors.
    Config,
    /// Data source and ingestion errors.
    Source,
    /// Ratio computation errors.
    Computation,
    /// Notification delivery errors.
    Notify,
    /// Alert ledger persistence errors.
    Ledger,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Source => write!(f, "source"),
            ErrorCategory::Computation => write!(f, "computation"),
            ErrorCategory::Notify => write!(f, "notify"),
            ErrorCategory::Ledger => write!(f, "ledger"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Suggested actions for automation reacting to errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Retry the operation (possibly with backoff).
    Retry,
    /// Run `check` to validate configuration.
    RunCheck,
    /// Fix the input data and rerun.
    FixInput,
    /// Skip this item and continue.
    Skip,
    /// Abort the operation.
    Abort,
    /// Manual intervention required.
    ManualIntervention,
}

impl std::fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuggestedAction::Retry => write!(f, "retry"),
            SuggestedAction::RunCheck => write!(f, "run_check"),
            SuggestedAction::FixInput => write!(f, "fix_input"),
            SuggestedAction::Skip => write!(f, "skip"),
            SuggestedAction::Abort => write!(f, "abort"),
            SuggestedAction::ManualIntervention => write!(f, "manual_intervention"),
        }
    }
}

/// Unified error type for MLR Watch.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid threshold bands: {0}")]
    InvalidThresholds(String),

    #[error("invalid benefit reference: {0}")]
    InvalidReference(String),

    // Source errors (20-29)
    #[error("data source unavailable: {source_name}: {reason}")]
    DataSourceUnavailable { source_name: String, reason: String },

    #[error("malformed record at row {row}: {reason}")]
    MalformedRecord { row: usize, reason: String },

    #[error("invalid date window: from {from} is after to {to}")]
    InvalidDateWindow { from: String, to: String },

    // Computation errors (30-39)
    #[error("computation failed: {0}")]
    Computation(String),

    // Notification errors (40-49)
    #[error("notification delivery failed via {channel}: {reason}")]
    NotificationDeliveryFailed { channel: String, reason: String },

    #[error("notification via {channel} timed out after {seconds}s")]
    NotificationTimeout { channel: String, seconds: u64 },

    // Ledger errors (50-59)
    #[error("alert ledger error: {0}")]
    Ledger(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Source errors
    /// - 30-39: Computation errors
    /// - 40-49: Notification errors
    /// - 50-59: Ledger errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidThresholds(_) => 11,
            Error::InvalidReference(_) => 12,
            Error::DataSourceUnavailable { .. } => 20,
            Error::MalformedRecord { .. } => 21,
            Error::InvalidDateWindow { .. } => 22,
            Error::Computation(_) => 30,
            Error::NotificationDeliveryFailed { .. } => 40,
            Error::NotificationTimeout { .. } => 41,
            Error::Ledger(_) => 50,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::InvalidThresholds(_) | Error::InvalidReference(_) => {
                ErrorCategory::Config
            }

            Error::DataSourceUnavailable { .. }
            | Error::MalformedRecord { .. }
            | Error::InvalidDateWindow { .. } => ErrorCategory::Source,

            Error::Computation(_) => ErrorCategory::Computation,

            Error::NotificationDeliveryFailed { .. } | Error::NotificationTimeout { .. } => {
                ErrorCategory::Notify
            }

            Error::Ledger(_) => ErrorCategory::Ledger,

            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Returns whether this error is fatal to a computation run.
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            Error::DataSourceUnavailable { .. }
                | Error::InvalidDateWindow { .. }
                | Error::Config(_)
                | Error::InvalidThresholds(_)
                | Error::InvalidReference(_)
        )
    }

    /// Returns whether this error is potentially recoverable.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Config(_) => true,
            Error::InvalidThresholds(_) => true,
            Error::InvalidReference(_) => true,

            // Source may come back; malformed rows need fixing upstream
            Error::DataSourceUnavailable { .. } => true,
            Error::MalformedRecord { .. } => false,
            Error::InvalidDateWindow { .. } => true,

            Error::Computation(_) => false,

            Error::NotificationDeliveryFailed { .. } => true,
            Error::NotificationTimeout { .. } => true,

            Error::Ledger(_) => true,

            Error::Io(_) => true,
            Error::Json(_) => true,
        }
    }

    /// Returns the suggested action for automation.
    pub fn suggested_action(&self) -> SuggestedAction {
        match self {
            Error::Config(_) => SuggestedAction::RunCheck,
            Error::InvalidThresholds(_) => SuggestedAction::RunCheck,
            Error::InvalidReference(_) => SuggestedAction::FixInput,

            Error::DataSourceUnavailable { .. } => SuggestedAction::Retry,
            Error::MalformedRecord { .. } => SuggestedAction::Skip,
            Error::InvalidDateWindow { .. } => SuggestedAction::FixInput,

            Error::Computation(_) => SuggestedAction::ManualIntervention,

            Error::NotificationDeliveryFailed { .. } => SuggestedAction::Retry,
            Error::NotificationTimeout { .. } => SuggestedAction::Retry,

            Error::Ledger(_) => SuggestedAction::ManualIntervention,

            Error::Io(_) => SuggestedAction::Retry,
            Error::Json(_) => SuggestedAction::FixInput,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) => {
                "Run 'mlr-core check' to validate configuration, or check syntax in mlr.toml."
            }
            Error::InvalidThresholds(_) => {
                "Threshold bands need unique, non-negative lower bounds and unique labels."
            }
            Error::InvalidReference(_) => {
                "The benefit reference must be a CSV with benefit_group,procedure_code columns or a JSON object of code to category."
            }

            Error::DataSourceUnavailable { .. } => {
                "Check that the claims/PA extract exists and is readable, then rerun. No partial results were computed."
            }
            Error::MalformedRecord { .. } => {
                "The row was quarantined. Fix the amount, date or entity_type column in the source extract."
            }
            Error::InvalidDateWindow { .. } => "Pass a --from date that is on or before --to.",

            Error::Computation(_) => "Internal computation error. Report with the run report attached.",

            Error::NotificationDeliveryFailed { .. } => {
                "Check channel credentials and connectivity. Other alerts in the run were still attempted."
            }
            Error::NotificationTimeout { .. } => {
                "The channel did not answer in time. Raise notify.timeout_secs or check the endpoint."
            }

            Error::Ledger(_) => {
                "The persisted alert ledger could not be read or written. Remove or repair the ledger file."
            }

            Error::Io(_) => "Check disk space and permissions, then retry the operation.",
            Error::Json(_) => "Invalid JSON. Check syntax with 'jq .' or restore from backup.",
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::InvalidThresholds(_) => "Invalid Threshold Bands",
            Error::InvalidReference(_) => "Invalid Benefit Reference",
            Error::DataSourceUnavailable { .. } => "Data Source Unavailable",
            Error::MalformedRecord { .. } => "Malformed Record",
            Error::InvalidDateWindow { .. } => "Invalid Date Window",
            Error::Computation(_) => "Computation Error",
            Error::NotificationDeliveryFailed { .. } => "Notification Delivery Failed",
            Error::NotificationTimeout { .. } => "Notification Timeout",
            Error::Ledger(_) => "Alert Ledger Error",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Error",
        }
    }

    /// Format for a terminal: headline, reason, fix.
    pub fn format_human(&self) -> String {
        format!(
            "✗ {}\n  Reason: {}\n  Fix: {}",
            self.headline(),
            self,
            self.remediation()
        )
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error is potentially recoverable.
    pub recoverable: bool,

    /// Suggested action for automation.
    pub suggested_action: SuggestedAction,

    /// Additional structured context (e.g., source path, channel).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::DataSourceUnavailable { source_name, .. } => {
                context.insert("source".to_string(), serde_json::json!(source_name));
            }
            Error::MalformedRecord { row, .. } => {
                context.insert("row".to_string(), serde_json::json!(row));
            }
            Error::InvalidDateWindow { from, to } => {
                context.insert("from".to_string(), serde_json::json!(from));
                context.insert("to".to_string(), serde_json::json!(to));
            }
            Error::NotificationDeliveryFailed { channel, .. } => {
                context.insert("channel".to_string(), serde_json::json!(channel));
            }
            Error::NotificationTimeout { channel, seconds } => {
                context.insert("channel".to_string(), serde_json::json!(channel));
                context.insert("timeout_seconds".to_string(), serde_json::json!(seconds));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            suggested_action: err.suggested_action(),
            context,
        }
    }
}

impl StructuredError {
    /// Add additional context to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }

    /// Serialize to pretty JSON string.
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| self.to_json())
    }
}

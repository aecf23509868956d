//! Typed `mlr.toml` configuration.
//!
//! Every section carries `#[serde(default)]`, so an empty file is the
//! builtin default configuration.

use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::thresholds::ThresholdBands;
use crate::validate::ValidationError;

/// Complete configuration for one MLR Watch deployment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct MlrConfig {
    /// Alert severity tiers.
    pub thresholds: ThresholdBands,

    /// Numerator loadings applied before ratios are computed.
    pub ratio: RatioAdjustments,

    /// Notification delivery.
    pub notify: NotifyConfig,

    /// Data source defaults.
    pub source: SourceConfig,
}

impl MlrConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ValidationError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self, ValidationError> {
        toml::from_str(content)
            .map_err(|e| ValidationError::ParseError(format!("Invalid TOML: {}", e)))
    }

    /// Render the configuration back to TOML.
    pub fn to_toml(&self) -> Result<String, ValidationError> {
        toml::to_string_pretty(self)
            .map_err(|e| ValidationError::ParseError(format!("Cannot render TOML: {}", e)))
    }
}

/// The `[ratio]` section.
///
/// numerator = amount_paid × `pa_cost_multiplier` (PA rows only)
///           + amount_billed × `commission_rate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RatioAdjustments {
    /// Loading applied to PA approved amounts to estimate eventual cost.
    pub pa_cost_multiplier: f64,

    /// Share of premium added to the numerator as commission.
    pub commission_rate: f64,
}

impl Default for RatioAdjustments {
    fn default() -> Self {
        Self {
            pa_cost_multiplier: 1.0,
            commission_rate: 0.0,
        }
    }
}

impl RatioAdjustments {
    /// Whether these adjustments leave the plain paid/billed ratio untouched.
    pub fn is_identity(&self) -> bool {
        self.pa_cost_multiplier == 1.0 && self.commission_rate == 0.0
    }
}

/// Notification transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Emit alerts as log events only.
    #[default]
    Log,
    /// Append alerts to a JSON Lines outbox file.
    Outbox,
    /// POST alerts to a mail API endpoint.
    Webhook,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelKind::Log => write!(f, "log"),
            ChannelKind::Outbox => write!(f, "outbox"),
            ChannelKind::Webhook => write!(f, "webhook"),
        }
    }
}

/// The `[notify]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct NotifyConfig {
    pub enabled: bool,
    pub channel: ChannelKind,
    pub sender: String,
    pub recipients: Vec<String>,

    /// Upper bound on a single delivery attempt.
    pub timeout_secs: u64,

    /// Prepended verbatim to every subject line.
    pub subject_prefix: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub outbox_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,

    /// Name of the environment variable holding the API token.
    pub webhook_token_env: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel: ChannelKind::Log,
            sender: "mlr-watch@localhost".to_string(),
            recipients: vec!["mlr-alerts@localhost".to_string()],
            timeout_secs: 30,
            subject_prefix: String::new(),
            outbox_path: None,
            webhook_url: None,
            webhook_token_env: "MLR_WEBHOOK_TOKEN".to_string(),
        }
    }
}

/// The `[source]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SourceConfig {
    /// Default window start (inclusive), `YYYY-MM-DD`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<NaiveDate>,

    /// Default window end (inclusive), `YYYY-MM-DD`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<NaiveDate>,

    /// How many quarantined rows the run report keeps verbatim.
    pub quarantine_sample_limit: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            quarantine_sample_limit: 20,
        }
    }
}

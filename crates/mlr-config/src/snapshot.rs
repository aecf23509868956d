//! Configuration snapshots for run reports and reproducibility.
//!
//! A snapshot captures the exact configuration in force when a run started,
//! so an alert can be traced back to the bands and loadings that produced it.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::resolve::{ConfigSource, ResolvedPath};
use crate::settings::MlrConfig;
use crate::thresholds::ThresholdBand;

/// A frozen snapshot of configuration state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConfigSnapshot {
    /// When this snapshot was taken.
    pub timestamp: DateTime<Utc>,

    /// Schema version of the configuration.
    pub schema_version: String,

    /// Path the configuration was loaded from.
    #[serde(default)]
    pub path: Option<String>,

    /// Source of the configuration.
    pub source: String,

    /// SHA-256 of the file content, when a file was loaded.
    #[serde(default)]
    pub content_hash: Option<String>,

    /// SHA-256 of the effective configuration (for quick comparison).
    pub effective_hash: String,

    /// Key configuration values for quick reference.
    pub summary: ConfigSummary,
}

/// Summary of key configuration values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConfigSummary {
    pub bands: Vec<ThresholdBand>,
    pub pa_cost_multiplier: f64,
    pub commission_rate: f64,
    pub notify_enabled: bool,
    pub channel: String,
    pub recipient_count: usize,
    pub timeout_secs: u64,
}

impl ConfigSnapshot {
    /// Create a new snapshot from loaded configuration.
    pub fn new(config: &MlrConfig, resolved: &ResolvedPath, content: Option<&str>) -> Self {
        ConfigSnapshot {
            timestamp: Utc::now(),
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            path: resolved.path.as_ref().map(|p| p.display().to_string()),
            source: resolved.source.to_string(),
            content_hash: content.map(hash_content),
            effective_hash: effective_hash(config),
            summary: ConfigSummary::from_config(config),
        }
    }

    /// Create a snapshot with only defaults (no config file loaded).
    pub fn defaults_only() -> Self {
        let config = MlrConfig::default();
        ConfigSnapshot {
            timestamp: Utc::now(),
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            path: None,
            source: ConfigSource::BuiltinDefault.to_string(),
            content_hash: None,
            effective_hash: effective_hash(&config),
            summary: ConfigSummary::from_config(&config),
        }
    }

    /// Serialize snapshot to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize snapshot from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Check if this snapshot describes the same effective configuration.
    pub fn matches(&self, other: &ConfigSnapshot) -> bool {
        self.effective_hash == other.effective_hash
    }

    /// Get a short identifier for this snapshot (first 12 chars of hash).
    pub fn short_id(&self) -> &str {
        &self.effective_hash[..12.min(self.effective_hash.len())]
    }
}

impl ConfigSummary {
    fn from_config(config: &MlrConfig) -> Self {
        ConfigSummary {
            bands: config.thresholds.bands.clone(),
            pa_cost_multiplier: config.ratio.pa_cost_multiplier,
            commission_rate: config.ratio.commission_rate,
            notify_enabled: config.notify.enabled,
            channel: config.notify.channel.to_string(),
            recipient_count: config.notify.recipients.len(),
            timeout_secs: config.notify.timeout_secs,
        }
    }
}

/// Hash of the canonical JSON rendering of a configuration.
fn effective_hash(config: &MlrConfig) -> String {
    let canonical = serde_json::to_string(config).unwrap_or_default();
    hash_content(&canonical)
}

/// Hash content with SHA-256 and return hex string.
fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

//! MLR Watch configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for `mlr.toml`
//! - Config resolution (CLI → env → XDG → system → defaults)
//! - Semantic validation of threshold bands and ratio adjustments
//! - Config snapshots for run reports

pub mod resolve;
pub mod settings;
pub mod snapshot;
pub mod thresholds;
pub mod validate;

pub use resolve::{resolve_config, ConfigSource, ResolvedPath};
pub use settings::{ChannelKind, MlrConfig, NotifyConfig, RatioAdjustments, SourceConfig};
pub use snapshot::ConfigSnapshot;
pub use thresholds::{ThresholdBand, ThresholdBands};
pub use validate::{validate_config, ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";

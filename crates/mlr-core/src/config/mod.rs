//! Configuration loading for mlr-core.
//!
//! This module handles:
//! - Config resolution (CLI > `MLR_CONFIG` > `MLR_CONFIG_DIR` > XDG > /etc > defaults)
//! - TOML parsing via mlr-config
//! - Semantic validation
//! - Snapshot generation for run reports

pub use mlr_config::{
    ChannelKind, ConfigSnapshot, ConfigSource, MlrConfig, NotifyConfig, RatioAdjustments,
    ResolvedPath, SourceConfig, ThresholdBand, ThresholdBands, ValidationError,
};

use std::path::{Path, PathBuf};

use mlr_common::Error;
use mlr_config::{resolve_config, validate_config};
use thiserror::Error;
use tracing::{debug, info};

use crate::logging::event_names;

/// Errors that can occur during config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {path} (from {source_kind})")]
    NotFound {
        path: PathBuf,
        source_kind: ConfigSource,
    },

    #[error("I/O error reading {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration in {origin}: {error}")]
    Invalid {
        origin: String,
        error: ValidationError,
    },
}

impl ConfigError {
    /// Stable error code (see [`mlr_common::Error::code`]).
    pub fn code(&self) -> u32 {
        match self {
            ConfigError::NotFound { .. } => 10,
            ConfigError::IoError { .. } => 60,
            ConfigError::Invalid { error, .. } => error.code(),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        let code = err.code();
        match err {
            ConfigError::IoError { source, .. } => Error::Io(source),
            other if code == 11 => Error::InvalidThresholds(other.to_string()),
            other => Error::Config(other.to_string()),
        }
    }
}

/// Effective configuration with provenance.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: MlrConfig,
    pub resolved: ResolvedPath,
    pub snapshot: ConfigSnapshot,
}

/// Resolve, read, parse and validate the configuration.
///
/// An explicitly named file (CLI or `MLR_CONFIG`) that does not exist is an
/// error; when nothing is found the builtin defaults are used.
pub fn load_config(cli_path: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    let resolved = resolve_config(cli_path);

    let Some(path) = resolved.path.clone() else {
        info!(
            target: event_names::CONFIG_DEFAULT_USED,
            "no configuration file found; using builtin defaults"
        );
        let config = MlrConfig::default();
        validate(&config, "builtin defaults")?;
        let snapshot = ConfigSnapshot::new(&config, &resolved, None);
        return Ok(LoadedConfig {
            config,
            resolved,
            snapshot,
        });
    };

    if !path.exists() {
        return Err(ConfigError::NotFound {
            path,
            source_kind: resolved.source,
        });
    }

    let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::IoError {
        path: path.clone(),
        source,
    })?;
    let origin = path.display().to_string();
    let config = MlrConfig::parse_toml(&content).map_err(|error| ConfigError::Invalid {
        origin: origin.clone(),
        error,
    })?;
    validate(&config, &origin)?;

    let snapshot = ConfigSnapshot::new(&config, &resolved, Some(&content));
    info!(
        target: event_names::CONFIG_LOADED,
        path = %origin,
        source = %resolved.source,
        hash = %snapshot.short_id(),
        "configuration loaded"
    );
    debug!(bands = config.thresholds.len(), "threshold bands");

    Ok(LoadedConfig {
        config,
        resolved,
        snapshot,
    })
}

fn validate(config: &MlrConfig, origin: &str) -> Result<(), ConfigError> {
    validate_config(config).map_err(|error| ConfigError::Invalid {
        origin: origin.to_string(),
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn explicit_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("missing.toml"))).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::NotFound {
                source_kind: ConfigSource::CliArgument,
                ..
            }
        ));
        assert_eq!(err.code(), 10);
    }

    #[test]
    fn explicit_file_is_loaded_and_hashed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mlr.toml");
        std::fs::write(
            &path,
            "[notify]\nrecipients = [\"ops@example.com\"]\nsubject_prefix = \"[t] \"\n",
        )
        .unwrap();
        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.config.notify.subject_prefix, "[t] ");
        assert_eq!(loaded.resolved.source, ConfigSource::CliArgument);
        assert!(loaded.snapshot.content_hash.is_some());
    }

    #[test]
    fn bad_thresholds_map_to_threshold_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mlr.toml");
        std::fs::write(
            &path,
            "[[thresholds.bands]]\nlower_bound = 70.0\nlabel = \"a\"\n\n\
             [[thresholds.bands]]\nlower_bound = 70.0\nlabel = \"b\"\n",
        )
        .unwrap();
        let err = load_config(Some(&path)).unwrap_err();
        assert_eq!(err.code(), 11);
        assert!(matches!(Error::from(err), Error::InvalidThresholds(_)));
    }

    #[test]
    fn unparseable_file_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mlr.toml");
        std::fs::write(&path, "thresholds = [[[").unwrap();
        let err = load_config(Some(&path)).unwrap_err();
        assert!(matches!(Error::from(err), Error::Config(_)));
    }
}

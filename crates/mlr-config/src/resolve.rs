//! Locating `mlr.toml`.
//!
//! First match wins: CLI argument, `MLR_CONFIG`, `MLR_CONFIG_DIR`,
//! `$XDG_CONFIG_HOME/mlr-watch`, `/etc/mlr-watch`, then builtin defaults.

use std::path::{Path, PathBuf};

/// Environment variable naming a config file directly.
pub const ENV_CONFIG_PATH: &str = "MLR_CONFIG";

/// Environment variable naming a directory that holds `mlr.toml`.
pub const ENV_CONFIG_DIR: &str = "MLR_CONFIG_DIR";

pub const CONFIG_FILENAME: &str = "mlr.toml";

const APP_NAME: &str = "mlr-watch";

/// The config file chosen for this process, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPath {
    /// `None` means builtin defaults.
    pub path: Option<PathBuf>,
    pub source: ConfigSource,
}

/// Which lookup step produced the path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    CliArgument,
    /// `MLR_CONFIG` or `MLR_CONFIG_DIR`.
    Environment,
    XdgConfig,
    SystemConfig,
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ConfigSource::CliArgument => "CLI argument",
            ConfigSource::Environment => "environment variable",
            ConfigSource::XdgConfig => "XDG config",
            ConfigSource::SystemConfig => "system config",
            ConfigSource::BuiltinDefault => "builtin default",
        })
    }
}

impl ResolvedPath {
    fn found(path: PathBuf, source: ConfigSource) -> Self {
        ResolvedPath {
            path: Some(path),
            source,
        }
    }
}

/// Pick the config file.
///
/// Explicit paths (CLI, `MLR_CONFIG`) are returned whether or not they
/// exist so the loader can report a missing file. Directory lookups only
/// match an existing `mlr.toml`.
pub fn resolve_config(cli_path: Option<&Path>) -> ResolvedPath {
    if let Some(path) = cli_path {
        return ResolvedPath::found(path.to_path_buf(), ConfigSource::CliArgument);
    }

    let explicit =
        std::env::var_os(ENV_CONFIG_PATH).filter(|v| !v.to_string_lossy().trim().is_empty());
    if let Some(path) = explicit {
        return ResolvedPath::found(PathBuf::from(path), ConfigSource::Environment);
    }

    let directories = [
        (
            std::env::var_os(ENV_CONFIG_DIR).map(PathBuf::from),
            ConfigSource::Environment,
        ),
        (xdg_config_dir(), ConfigSource::XdgConfig),
        (Some(system_config_dir()), ConfigSource::SystemConfig),
    ];
    directories
        .into_iter()
        .filter_map(|(dir, source)| Some((dir?.join(CONFIG_FILENAME), source)))
        .find(|(candidate, _)| candidate.is_file())
        .map(|(path, source)| ResolvedPath::found(path, source))
        .unwrap_or_default()
}

/// `mlr-watch` under the platform config directory.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

pub fn system_config_dir() -> PathBuf {
    Path::new("/etc").join(APP_NAME)
}

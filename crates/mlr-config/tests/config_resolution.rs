//! Configuration resolution and validation against real files.
//!
//! Covers:
//! - Resolution order (CLI > MLR_CONFIG > MLR_CONFIG_DIR > XDG)
//! - Loading and validating full and partial mlr.toml files
//! - Snapshot hashing of file content

use mlr_config::resolve::{resolve_config, ConfigSource, ENV_CONFIG_DIR, ENV_CONFIG_PATH};
use mlr_config::{validate_config, ChannelKind, ConfigSnapshot, MlrConfig, ValidationError};
use std::env;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use tempfile::TempDir;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

struct EnvGuard {
    keys: Vec<String>,
    saved: Vec<Option<String>>,
}

impl EnvGuard {
    fn new(keys: &[&str]) -> Self {
        let mut saved = Vec::with_capacity(keys.len());
        for key in keys {
            saved.push(env::var(key).ok());
        }
        Self {
            keys: keys.iter().map(|k| k.to_string()).collect(),
            saved,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (idx, key) in self.keys.iter().enumerate() {
            match self.saved.get(idx).and_then(|v| v.as_ref()) {
                Some(val) => env::set_var(key, val),
                None => env::remove_var(key),
            }
        }
    }
}

fn with_env_lock<T>(f: impl FnOnce() -> T) -> T {
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    f()
}

const FULL_CONFIG: &str = r#"
[[thresholds.bands]]
lower_bound = 65.0
label = "watch"

[[thresholds.bands]]
lower_bound = 75.0
label = "warning"

[[thresholds.bands]]
lower_bound = 85.0
label = "critical"

[ratio]
pa_cost_multiplier = 1.4
commission_rate = 0.1

[notify]
enabled = true
channel = "outbox"
sender = "alerts@clinic.example"
recipients = ["finance@clinic.example", "medical@clinic.example"]
timeout_secs = 10
subject_prefix = "[MLR] "
outbox_path = "/var/spool/mlr/outbox.jsonl"

[source]
from = "2025-01-01"
to = "2025-06-30"
quarantine_sample_limit = 5
"#;

fn write_config(dir: &Path, content: &str) -> std::path::PathBuf {
    fs::create_dir_all(dir).expect("create config dir");
    let path = dir.join("mlr.toml");
    fs::write(&path, content).expect("write config");
    path
}

#[test]
fn full_config_loads_and_validates() {
    let tmp = TempDir::new().expect("tempdir");
    let path = write_config(tmp.path(), FULL_CONFIG);

    let config = MlrConfig::from_file(&path).expect("load config");
    validate_config(&config).expect("valid config");

    assert_eq!(config.ratio.pa_cost_multiplier, 1.4);
    assert_eq!(config.ratio.commission_rate, 0.1);
    assert_eq!(config.notify.channel, ChannelKind::Outbox);
    assert_eq!(config.notify.recipients.len(), 2);
    assert_eq!(config.source.quarantine_sample_limit, 5);
}

#[test]
fn invalid_bands_fail_validation() {
    let tmp = TempDir::new().expect("tempdir");
    let path = write_config(
        tmp.path(),
        r#"
[[thresholds.bands]]
lower_bound = 80.0
label = "warning"

[[thresholds.bands]]
lower_bound = 80.0
label = "critical"
"#,
    );

    let config = MlrConfig::from_file(&path).expect("parse config");
    let err = validate_config(&config).unwrap_err();
    assert!(matches!(err, ValidationError::InvalidValue { .. }));
    assert_eq!(err.code(), 11);
}

#[test]
fn missing_file_is_io_error() {
    let err = MlrConfig::from_file(Path::new("/nonexistent/mlr-watch/mlr.toml")).unwrap_err();
    assert!(matches!(err, ValidationError::IoError(_)));
}

#[test]
fn snapshot_hash_tracks_file_content() {
    let tmp = TempDir::new().expect("tempdir");
    let path = write_config(tmp.path(), FULL_CONFIG);
    let resolved = resolve_config(Some(&path));
    let config = MlrConfig::from_file(&path).expect("load");

    let a = ConfigSnapshot::new(&config, &resolved, Some(FULL_CONFIG));
    let b = ConfigSnapshot::new(&config, &resolved, Some(FULL_CONFIG));
    assert_eq!(a.content_hash, b.content_hash);
    assert!(a.matches(&b));
    assert!(!a.matches(&ConfigSnapshot::defaults_only()));
    assert_eq!(a.source, "CLI argument");
}

#[test]
fn env_path_beats_config_dir() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(&[ENV_CONFIG_PATH, ENV_CONFIG_DIR]);
        let tmp = TempDir::new().expect("tempdir");
        let direct = write_config(&tmp.path().join("direct"), "");
        let dir = tmp.path().join("dir");
        write_config(&dir, "");

        env::set_var(ENV_CONFIG_PATH, &direct);
        env::set_var(ENV_CONFIG_DIR, &dir);

        let resolved = resolve_config(None);
        assert_eq!(resolved.source, ConfigSource::Environment);
        assert_eq!(resolved.path.as_deref(), Some(direct.as_path()));
    });
}

#[test]
fn config_dir_used_when_no_direct_path() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(&[ENV_CONFIG_PATH, ENV_CONFIG_DIR]);
        let tmp = TempDir::new().expect("tempdir");
        let expected = write_config(tmp.path(), "");

        env::remove_var(ENV_CONFIG_PATH);
        env::set_var(ENV_CONFIG_DIR, tmp.path());

        let resolved = resolve_config(None);
        assert_eq!(resolved.source, ConfigSource::Environment);
        assert_eq!(resolved.path, Some(expected));
    });
}

#[test]
fn cli_path_beats_environment() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(&[ENV_CONFIG_PATH]);
        let tmp = TempDir::new().expect("tempdir");
        let cli = write_config(&tmp.path().join("cli"), "");
        env::set_var(ENV_CONFIG_PATH, tmp.path().join("env.toml"));

        let resolved = resolve_config(Some(&cli));
        assert_eq!(resolved.source, ConfigSource::CliArgument);
        assert_eq!(resolved.path, Some(cli));
    });
}

#[cfg(target_os = "linux")]
#[test]
fn xdg_config_home_is_searched() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(&[ENV_CONFIG_PATH, ENV_CONFIG_DIR, "XDG_CONFIG_HOME"]);
        let tmp = TempDir::new().expect("tempdir");
        let expected = write_config(&tmp.path().join("mlr-watch"), "");

        env::remove_var(ENV_CONFIG_PATH);
        env::remove_var(ENV_CONFIG_DIR);
        env::set_var("XDG_CONFIG_HOME", tmp.path());

        let resolved = resolve_config(None);
        assert_eq!(resolved.source, ConfigSource::XdgConfig);
        assert_eq!(resolved.path, Some(expected));
    });
}

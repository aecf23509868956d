//! Alert ledger: which subjects have already been alerted, and at what band.
//!
//! A ledger is owned by one run. It can optionally be loaded from and saved
//! to a JSON file so that suppression carries over between runs.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use mlr_common::{Error, SCHEMA_VERSION};
use mlr_config::ThresholdBand;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::alert::AlertSubject;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("ledger file {path} is not valid: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("ledger schema {found} is not supported (expected {expected})")]
    SchemaMismatch { found: String, expected: String },
}

impl From<LedgerError> for Error {
    fn from(err: LedgerError) -> Self {
        Error::Ledger(err.to_string())
    }
}

/// Highest band dispatched for one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub band_label: String,
    pub lower_bound: f64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertLedger {
    #[serde(default)]
    entries: BTreeMap<String, LedgerEntry>,
}

#[derive(Serialize, Deserialize)]
struct LedgerFile {
    schema_version: String,
    updated_at: DateTime<Utc>,
    #[serde(flatten)]
    ledger: AlertLedger,
}

impl AlertLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// True unless this subject was already dispatched at `band` or higher.
    pub fn should_dispatch(&self, subject: &AlertSubject, band: &ThresholdBand) -> bool {
        match self.entries.get(&subject.ledger_key()) {
            None => true,
            Some(entry) => band.lower_bound > entry.lower_bound,
        }
    }

    /// Record a dispatch. Only the highest band reached is kept.
    pub fn record(&mut self, subject: &AlertSubject, band: &ThresholdBand, at: DateTime<Utc>) {
        let key = subject.ledger_key();
        if let Some(existing) = self.entries.get(&key) {
            if existing.lower_bound >= band.lower_bound {
                return;
            }
        }
        self.entries.insert(
            key,
            LedgerEntry {
                band_label: band.label.clone(),
                lower_bound: band.lower_bound,
                recorded_at: at,
            },
        );
    }

    pub fn get(&self, subject: &AlertSubject) -> Option<&LedgerEntry> {
        self.entries.get(&subject.ledger_key())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load a persisted ledger. A missing file is an empty ledger.
    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(source) => {
                return Err(LedgerError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        let file: LedgerFile =
            serde_json::from_str(&content).map_err(|source| LedgerError::Json {
                path: path.display().to_string(),
                source,
            })?;
        let major = |v: &str| v.split('.').next().unwrap_or("").to_string();
        if major(&file.schema_version) != major(SCHEMA_VERSION) {
            return Err(LedgerError::SchemaMismatch {
                found: file.schema_version,
                expected: SCHEMA_VERSION.to_string(),
            });
        }
        Ok(file.ledger)
    }

    /// Persist atomically: write a sibling temp file, then rename over.
    pub fn save(&self, path: &Path) -> Result<(), LedgerError> {
        let io_err = |source| LedgerError::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        let file = LedgerFile {
            schema_version: SCHEMA_VERSION.to_string(),
            updated_at: Utc::now(),
            ledger: self.clone(),
        };
        let json = serde_json::to_vec_pretty(&file).map_err(|source| LedgerError::Json {
            path: path.display().to_string(),
            source,
        })?;
        let tmp_path = path.with_extension("json.tmp");
        {
            let mut out = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)
                .map_err(io_err)?;
            out.write_all(&json).map_err(io_err)?;
            out.flush().map_err(io_err)?;
        }
        fs::rename(&tmp_path, path).map_err(io_err)?;
        Ok(())
    }
}

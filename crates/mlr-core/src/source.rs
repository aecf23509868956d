//! Data sources for claim and PA rows.
//!
//! The engine only depends on receiving validated [`ClaimRecord`]s for a
//! date window; [`FileSource`] reads CSV or JSON Lines extracts and
//! [`MemorySource`] serves records already in memory. Rows that fail
//! validation are quarantined, never aggregated.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use mlr_common::{ClaimRecord, EntityType, Error, RawClaimRow, Result, RowDefect};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Inclusive date range filter. Open ends are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DateWindow {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateWindow {
    /// Build a window, rejecting `from > to`.
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<Self> {
        if let (Some(f), Some(t)) = (from, to) {
            if f > t {
                return Err(Error::InvalidDateWindow {
                    from: f.to_string(),
                    to: t.to_string(),
                });
            }
        }
        Ok(Self { from, to })
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Whether `date` falls inside the window (both ends inclusive).
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |f| date >= f) && self.to.map_or(true, |t| date <= t)
    }
}

impl std::fmt::Display for DateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let from = self.from.map(|d| d.to_string()).unwrap_or_else(|| "…".to_string());
        let to = self.to.map(|d| d.to_string()).unwrap_or_else(|| "…".to_string());
        write!(f, "{} to {}", from, to)
    }
}

/// A row rejected at ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QuarantinedRow {
    /// Source the row came from.
    pub source: String,
    /// 1-based data row (header excluded) or line number.
    pub row: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub defect: RowDefect,
}

/// Everything a source produced for one window.
#[derive(Debug, Clone, Default)]
pub struct SourceBatch {
    pub records: Vec<ClaimRecord>,
    pub quarantined: Vec<QuarantinedRow>,
    /// Rows read, valid or not.
    pub rows_read: usize,
    /// Valid rows dropped by the date window.
    pub outside_window: usize,
}

impl SourceBatch {
    /// Append another batch.
    pub fn extend(&mut self, other: SourceBatch) {
        self.records.extend(other.records);
        self.quarantined.extend(other.quarantined);
        self.rows_read += other.rows_read;
        self.outside_window += other.outside_window;
    }

    fn admit(
        &mut self,
        source: &str,
        row: usize,
        raw: RawClaimRow,
        default_entity: Option<EntityType>,
        window: &DateWindow,
    ) {
        self.rows_read += 1;
        let id = raw.id.clone().filter(|s| !s.trim().is_empty());
        match raw.into_record(row, default_entity) {
            Ok(record) if window.contains(record.date) => self.records.push(record),
            Ok(_) => self.outside_window += 1,
            Err(defect) => self.quarantined.push(QuarantinedRow {
                source: source.to_string(),
                row,
                id,
                defect,
            }),
        }
    }

    fn reject(&mut self, source: &str, row: usize, message: String) {
        self.rows_read += 1;
        self.quarantined.push(QuarantinedRow {
            source: source.to_string(),
            row,
            id: None,
            defect: RowDefect::Unparseable { message },
        });
    }
}

/// Supplier of claim/PA rows for a date window.
pub trait DataSource {
    /// Name used in logs, errors and quarantine entries.
    fn name(&self) -> String;

    /// Fetch every row in `window`. An `Err` means the dataset is
    /// unavailable and the run must not aggregate anything.
    fn fetch(&self, window: &DateWindow) -> Result<SourceBatch>;
}

/// Fetch from several sources, failing if any one is unavailable.
pub fn fetch_all(sources: &[Box<dyn DataSource>], window: &DateWindow) -> Result<SourceBatch> {
    let mut batch = SourceBatch::default();
    for source in sources {
        batch.extend(source.fetch(window)?);
    }
    Ok(batch)
}

/// On-disk extract format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    JsonLines,
}

impl FileFormat {
    /// Guess from the extension: `.jsonl`/`.ndjson` are JSON Lines,
    /// everything else is CSV.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("jsonl") | Some("ndjson") => FileFormat::JsonLines,
            _ => FileFormat::Csv,
        }
    }
}

/// Accepted header names per field, first match wins.
const COLUMN_ALIASES: &[(&str, &[&str])] = &[
    ("id", &["id", "claim_id", "pa_number", "panumber"]),
    ("benefit_code", &["benefit_code", "procedure_code", "code"]),
    ("amount_paid", &["amount_paid", "paid", "approved_amount", "granted"]),
    ("amount_billed", &["amount_billed", "billed", "premium", "debit_amount"]),
    ("date", &["date", "service_date", "request_date", "encounter_date"]),
    ("entity_type", &["entity_type", "entity", "type"]),
    ("group_name", &["group_name", "group", "groupname"]),
    ("member_id", &["member_id", "enrollee_id", "iid"]),
    ("provider_id", &["provider_id", "provider"]),
];

const REQUIRED_COLUMNS: &[&str] = &["amount_paid", "amount_billed", "date"];

/// Reads a CSV or JSON Lines extract.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    format: FileFormat,
    default_entity: Option<EntityType>,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = FileFormat::from_path(&path);
        Self {
            path,
            format,
            default_entity: None,
        }
    }

    /// Entity type for rows that do not carry one.
    pub fn with_default_entity(mut self, entity: EntityType) -> Self {
        self.default_entity = Some(entity);
        self
    }

    pub fn with_format(mut self, format: FileFormat) -> Self {
        self.format = format;
        self
    }

    fn unavailable(&self, reason: impl ToString) -> Error {
        Error::DataSourceUnavailable {
            source_name: self.path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    fn fetch_csv(&self, file: File, window: &DateWindow) -> Result<SourceBatch> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(file);

        let headers = reader.headers().map_err(|e| self.unavailable(e))?.clone();
        let columns: Vec<(&str, Option<usize>)> = COLUMN_ALIASES
            .iter()
            .map(|(field, aliases)| {
                let idx = headers
                    .iter()
                    .position(|h| aliases.iter().any(|a| h.eq_ignore_ascii_case(a)));
                (*field, idx)
            })
            .collect();

        for required in REQUIRED_COLUMNS {
            if columns.iter().any(|(f, idx)| f == required && idx.is_none()) {
                return Err(self.unavailable(format!("missing required column {}", required)));
            }
        }

        let name = self.name();
        let mut batch = SourceBatch::default();
        for (idx, row) in reader.records().enumerate() {
            let row_number = idx + 1;
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    batch.reject(&name, row_number, e.to_string());
                    continue;
                }
            };
            let cell = |field: &str| -> Option<String> {
                columns
                    .iter()
                    .find(|(f, _)| *f == field)
                    .and_then(|(_, idx)| idx.and_then(|i| row.get(i)))
                    .map(str::to_string)
            };
            let raw = RawClaimRow {
                id: cell("id"),
                benefit_code: cell("benefit_code"),
                amount_paid: cell("amount_paid"),
                amount_billed: cell("amount_billed"),
                date: cell("date"),
                entity_type: cell("entity_type"),
                group_name: cell("group_name"),
                member_id: cell("member_id"),
                provider_id: cell("provider_id"),
            };
            batch.admit(&name, row_number, raw, self.default_entity, window);
        }
        Ok(batch)
    }

    fn fetch_jsonl(&self, file: File, window: &DateWindow) -> Result<SourceBatch> {
        let name = self.name();
        let mut batch = SourceBatch::default();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line_number = idx + 1;
            let line = line.map_err(|e| self.unavailable(e))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RawClaimRow>(&line) {
                Ok(raw) => batch.admit(&name, line_number, raw, self.default_entity, window),
                Err(e) => batch.reject(&name, line_number, e.to_string()),
            }
        }
        Ok(batch)
    }
}

impl DataSource for FileSource {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    fn fetch(&self, window: &DateWindow) -> Result<SourceBatch> {
        let file = File::open(&self.path).map_err(|e| self.unavailable(e))?;
        match self.format {
            FileFormat::Csv => self.fetch_csv(file, window),
            FileFormat::JsonLines => self.fetch_jsonl(file, window),
        }
    }
}

/// Serves records already in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    name: String,
    records: Vec<ClaimRecord>,
    unavailable: Option<String>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, records: Vec<ClaimRecord>) -> Self {
        Self {
            name: name.into(),
            records,
            unavailable: None,
        }
    }

    /// A source whose every fetch fails with `reason`.
    pub fn unavailable(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Vec::new(),
            unavailable: Some(reason.into()),
        }
    }
}

impl DataSource for MemorySource {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn fetch(&self, window: &DateWindow) -> Result<SourceBatch> {
        if let Some(reason) = &self.unavailable {
            return Err(Error::DataSourceUnavailable {
                source_name: self.name.clone(),
                reason: reason.clone(),
            });
        }
        let mut batch = SourceBatch {
            rows_read: self.records.len(),
            ..SourceBatch::default()
        };
        for record in &self.records {
            if window.contains(record.date) {
                batch.records.push(record.clone());
            } else {
                batch.outside_window += 1;
            }
        }
        Ok(batch)
    }
}

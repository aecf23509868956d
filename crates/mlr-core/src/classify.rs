//! Benefit classification.
//!
//! A [`BenefitReference`] maps procedure/benefit codes onto [`Category`]
//! values. It is loaded once per run and shared read-only by every
//! classification; unknown codes fall back to [`Category::Other`].

use std::collections::{BTreeSet, HashMap};
use std::io::Read;
use std::path::Path;

use mlr_common::{Category, ClaimRecord, Error, Result};
use serde::{Deserialize, Serialize};

/// Reference table of benefit code → category.
#[derive(Debug, Clone, Default)]
pub struct BenefitReference {
    codes: HashMap<String, Category>,
    conflicts: usize,
}

/// Canonical form of a code for lookup: trimmed and case-folded.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_lowercase()
}

impl BenefitReference {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mapping. The first mapping of a code wins; a later mapping to a
    /// different category is counted as a conflict and ignored.
    ///
    /// Returns `false` when the entry was ignored.
    pub fn insert(&mut self, code: &str, category: Category) -> bool {
        let key = normalize_code(code);
        if key.is_empty() {
            return false;
        }
        match self.codes.get(&key) {
            Some(existing) if *existing == category => false,
            Some(_) => {
                self.conflicts += 1;
                false
            }
            None => {
                self.codes.insert(key, category);
                true
            }
        }
    }

    /// Build from `(code, category)` pairs.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, Category)>) -> Self {
        let mut reference = Self::new();
        for (code, category) in pairs {
            reference.insert(code, category);
        }
        reference
    }

    /// Load a reference from disk. `.json` files are read as a JSON object of
    /// code → group label; anything else is read as CSV.
    ///
    /// A missing or unreadable file is [`Error::DataSourceUnavailable`];
    /// a readable file with the wrong shape is [`Error::InvalidReference`].
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read(path).map_err(|e| Error::DataSourceUnavailable {
            source_name: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            let text = String::from_utf8(content)
                .map_err(|e| Error::InvalidReference(format!("{}: {}", path.display(), e)))?;
            Self::from_json_str(&text)
        } else {
            Self::from_csv_reader(content.as_slice())
        }
    }

    /// Parse a CSV with `benefit_group` and `procedure_code` columns.
    ///
    /// Header names are matched case-insensitively; `category`/`group` and
    /// `benefit_code`/`code` are accepted as aliases.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let headers = csv_reader
            .headers()
            .map_err(|e| Error::InvalidReference(format!("cannot read header row: {}", e)))?
            .clone();

        let group_idx = find_column(&headers, &["benefit_group", "category", "group"])
            .ok_or_else(|| {
                Error::InvalidReference("missing benefit_group column".to_string())
            })?;
        let code_idx = find_column(&headers, &["procedure_code", "benefit_code", "code"])
            .ok_or_else(|| {
                Error::InvalidReference("missing procedure_code column".to_string())
            })?;

        let mut reference = Self::new();
        for (line, row) in csv_reader.records().enumerate() {
            let row = row.map_err(|e| {
                Error::InvalidReference(format!("row {}: {}", line + 2, e))
            })?;
            let code = row.get(code_idx).unwrap_or("");
            let group = row.get(group_idx).unwrap_or("");
            reference.insert(code, Category::from_group_label(group));
        }
        Ok(reference)
    }

    /// Parse a JSON object `{ "code": "group label", ... }`.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)
            .map_err(|e| Error::InvalidReference(format!("expected a JSON object: {}", e)))?;

        let mut reference = Self::new();
        let mut entries: Vec<(&String, &serde_json::Value)> = map.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        for (code, label) in entries {
            let label = label.as_str().ok_or_else(|| {
                Error::InvalidReference(format!("label for code {:?} is not a string", code))
            })?;
            reference.insert(code, Category::from_group_label(label));
        }
        Ok(reference)
    }

    /// Category for a code, if the reference knows it.
    pub fn lookup(&self, code: &str) -> Option<Category> {
        self.codes.get(&normalize_code(code)).copied()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Number of codes that were listed under more than one category.
    pub fn conflicts(&self) -> usize {
        self.conflicts
    }
}

fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
}

/// Map a benefit code to its category. Never fails.
pub fn classify(code: &str, reference: &BenefitReference) -> Category {
    reference.lookup(code).unwrap_or(Category::Other)
}

/// A record tagged with its derived category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedRecord {
    pub record: ClaimRecord,
    pub category: Category,
}

/// Outcome of classifying a batch.
#[derive(Debug, Clone, Default)]
pub struct ClassifyOutcome {
    pub records: Vec<ClassifiedRecord>,

    /// Records whose code the reference did not know.
    pub unknown_count: usize,

    /// Distinct unknown codes (normalized), for the report.
    pub unknown_codes: BTreeSet<String>,
}

/// Tag every record with exactly one category.
pub fn classify_records(records: Vec<ClaimRecord>, reference: &BenefitReference) -> ClassifyOutcome {
    let mut outcome = ClassifyOutcome {
        records: Vec::with_capacity(records.len()),
        ..ClassifyOutcome::default()
    };

    for record in records {
        let category = match reference.lookup(&record.benefit_code) {
            Some(category) => category,
            None => {
                outcome.unknown_count += 1;
                outcome
                    .unknown_codes
                    .insert(normalize_code(&record.benefit_code));
                Category::Other
            }
        };
        outcome.records.push(ClassifiedRecord { record, category });
    }

    outcome
}

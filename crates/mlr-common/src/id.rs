//! Run identity.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

const SUFFIX_ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

/// Identifier of one end-to-end computation run: `mlr-YYYYMMDD-HHMMSS-xxxx`,
/// UTC start time plus four lowercase base32 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        let random = uuid::Uuid::new_v4().as_u128();
        let suffix: String = (0..4)
            .map(|i| SUFFIX_ALPHABET[((random >> (i * 5)) & 0x1F) as usize] as char)
            .collect();
        RunId(format!(
            "mlr-{}-{}",
            chrono::Utc::now().format("%Y%m%d-%H%M%S"),
            suffix
        ))
    }

    /// Accepts only the exact shape produced by [`RunId::new`].
    pub fn parse(s: &str) -> Option<Self> {
        let rest = s.strip_prefix("mlr-")?;
        let mut parts = rest.split('-');
        let (date, time, suffix) = (parts.next()?, parts.next()?, parts.next()?);
        let well_formed = parts.next().is_none()
            && date.len() == 8
            && date.bytes().all(|b| b.is_ascii_digit())
            && time.len() == 6
            && time.bytes().all(|b| b.is_ascii_digit())
            && suffix.len() == 4
            && suffix.bytes().all(|b| SUFFIX_ALPHABET.contains(&b));
        well_formed.then(|| RunId(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//! Benefit category taxonomy.
//!
//! Every claim or PA line is tagged with exactly one [`Category`]. Codes the
//! benefit reference does not know fall into [`Category::Other`].
//!
//! Ratios are reported per category and for the [`AggregateKey::Overall`]
//! roll-up, which sums across all categories of one entity type.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Semantic benefit categories tracked by the engine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Chronic disease management (chronic medication refills, monitoring).
    Chronic,
    /// Surgical procedures.
    Surgery,
    /// Antenatal, delivery and postnatal care.
    Maternity,
    /// Dentistry.
    Dental,
    /// Ophthalmic care, lenses and frames.
    Optical,
    /// Anything not mapped by the benefit reference.
    Other,
}

impl Category {
    /// All categories in reporting order.
    pub fn all() -> &'static [Category] {
        &[
            Category::Chronic,
            Category::Surgery,
            Category::Maternity,
            Category::Dental,
            Category::Optical,
            Category::Other,
        ]
    }

    /// Stable machine label.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Chronic => "chronic",
            Category::Surgery => "surgery",
            Category::Maternity => "maternity",
            Category::Dental => "dental",
            Category::Optical => "optical",
            Category::Other => "other",
        }
    }

    /// Human-readable name used in alert messages and reports.
    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Chronic => "Chronic Disease",
            Category::Surgery => "Surgery",
            Category::Maternity => "Maternity",
            Category::Dental => "Dental",
            Category::Optical => "Optical",
            Category::Other => "Other",
        }
    }

    /// Map a benefit-group label from a reference table onto a category.
    ///
    /// Accepts the machine labels plus the group names used by the benefit
    /// reference exports (`chronic medication`, `surgeries`, `dentistry`,
    /// `ophthalmic care`). Unrecognised labels map to [`Category::Other`].
    pub fn from_group_label(label: &str) -> Category {
        let normalized = label.trim().to_lowercase();
        match normalized.as_str() {
            "chronic" | "chronic medication" | "chronic disease" | "chronic diseases" => {
                Category::Chronic
            }
            "surgery" | "surgeries" => Category::Surgery,
            "maternity" => Category::Maternity,
            "dental" | "dentistry" => Category::Dental,
            "optical" | "ophthalmic care" | "ophthalmology" => Category::Optical,
            _ => Category::Other,
        }
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::Other
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::all()
            .iter()
            .copied()
            .find(|c| c.label() == s.trim().to_lowercase())
            .ok_or_else(|| format!("unknown category: {}", s))
    }
}

/// Key of one aggregate within an entity type's result set.
///
/// Serialises as a plain string: `"overall"` or the category label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum AggregateKey {
    /// Roll-up across every category.
    Overall,
    /// A single category.
    Category(Category),
}

impl AggregateKey {
    /// Stable machine label (`overall` or the category label).
    pub fn label(&self) -> &'static str {
        match self {
            AggregateKey::Overall => "overall",
            AggregateKey::Category(c) => c.label(),
        }
    }

    /// Human-readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            AggregateKey::Overall => "Overall",
            AggregateKey::Category(c) => c.display_name(),
        }
    }

    /// The overall key followed by every category key.
    pub fn all() -> Vec<AggregateKey> {
        std::iter::once(AggregateKey::Overall)
            .chain(Category::all().iter().copied().map(AggregateKey::Category))
            .collect()
    }
}

impl From<Category> for AggregateKey {
    fn from(category: Category) -> Self {
        AggregateKey::Category(category)
    }
}

impl fmt::Display for AggregateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl From<AggregateKey> for String {
    fn from(key: AggregateKey) -> Self {
        key.label().to_string()
    }
}

impl TryFrom<String> for AggregateKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.trim().eq_ignore_ascii_case("overall") {
            return Ok(AggregateKey::Overall);
        }
        value.parse::<Category>().map(AggregateKey::Category)
    }
}

impl JsonSchema for AggregateKey {
    fn schema_name() -> Cow<'static, str> {
        "AggregateKey".into()
    }

    fn json_schema(_generator: &mut schemars::SchemaGenerator) -> schemars::Schema {
        schemars::json_schema!({
            "type": "string",
            "enum": ["overall", "chronic", "surgery", "maternity", "dental", "optical", "other"]
        })
    }
}

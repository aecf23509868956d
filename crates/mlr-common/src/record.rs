//! Claim and pre-authorization record types.
//!
//! Rows arrive from a data source as loosely typed [`RawClaimRow`] values.
//! They are validated once, at ingestion, into immutable [`ClaimRecord`]s;
//! rows that cannot be validated are reported as a [`RowDefect`] and
//! quarantined by the caller instead of failing deep inside aggregation.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;

/// Kind of record: a pre-authorization request or a finalized claim.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// Pre-authorization line (granted amount is the payout).
    Pa,
    /// Adjudicated claim line (approved amount is the payout).
    Claim,
}

impl EntityType {
    /// Both entity types in reporting order.
    pub fn all() -> &'static [EntityType] {
        &[EntityType::Pa, EntityType::Claim]
    }

    /// Stable machine label.
    pub fn label(&self) -> &'static str {
        match self {
            EntityType::Pa => "pa",
            EntityType::Claim => "claim",
        }
    }

    /// Human-readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            EntityType::Pa => "PA",
            EntityType::Claim => "Claims",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pa" | "preauth" | "pre-auth" | "pre-authorization" | "preauthorization" => {
                Ok(EntityType::Pa)
            }
            "claim" | "claims" => Ok(EntityType::Claim),
            _ => Err(format!("unknown entity type: {}", s)),
        }
    }
}

/// A validated claim or PA line.
///
/// Immutable once ingested. The benefit category is derived later by the
/// classifier and carried alongside the record, not inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClaimRecord {
    /// Source identifier (PA number or claim line id).
    pub id: String,

    /// Procedure / benefit code as supplied by the source.
    pub benefit_code: String,

    /// Amount paid, granted or approved. Never negative.
    pub amount_paid: f64,

    /// Premium / revenue base attributed to this line. Never negative.
    pub amount_billed: f64,

    /// Service, request or encounter date.
    pub date: NaiveDate,

    /// PA or Claim.
    pub entity_type: EntityType,

    /// Client group (employer scheme) the member belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,

    /// Enrollee identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_id: Option<String>,

    /// Provider identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
}

impl ClaimRecord {
    /// Create a record with the required fields.
    pub fn new(
        id: impl Into<String>,
        benefit_code: impl Into<String>,
        amount_paid: f64,
        amount_billed: f64,
        date: NaiveDate,
        entity_type: EntityType,
    ) -> Self {
        ClaimRecord {
            id: id.into(),
            benefit_code: benefit_code.into(),
            amount_paid,
            amount_billed,
            date,
            entity_type,
            group_name: None,
            member_id: None,
            provider_id: None,
        }
    }

    /// Set the client group.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group_name = Some(group.into());
        self
    }

    /// Set the member.
    pub fn with_member(mut self, member: impl Into<String>) -> Self {
        self.member_id = Some(member.into());
        self
    }

    /// Set the provider.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider_id = Some(provider.into());
        self
    }
}

/// Why a raw row was rejected at ingestion.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowDefect {
    #[error("missing required field: {field}")]
    MissingField { field: String },

    #[error("invalid amount in {field}: {value:?}")]
    InvalidAmount { field: String, value: String },

    #[error("negative amount in {field}: {value}")]
    NegativeAmount { field: String, value: f64 },

    #[error("invalid date: {value:?}")]
    InvalidDate { value: String },

    #[error("unknown entity type: {value:?}")]
    UnknownEntityType { value: String },

    #[error("unparseable row: {message}")]
    Unparseable { message: String },
}

/// An unvalidated row as read from CSV or JSON Lines.
///
/// Every field is optional text; numeric JSON values are accepted and
/// stringified so both formats share one validation path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawClaimRow {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub benefit_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub amount_paid: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub amount_billed: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub entity_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub group_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub member_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub provider_id: Option<String>,
}

impl RawClaimRow {
    /// Validate this row into a [`ClaimRecord`].
    ///
    /// `row` is the 1-based position in the source and names rows that carry
    /// no id. `default_entity` applies when the row has no entity type column.
    /// An absent or null amount is a [`RowDefect::MissingField`]; an amount
    /// that is present but blank counts as zero. A missing benefit code
    /// becomes the empty code, which the classifier maps to `other`.
    pub fn into_record(
        self,
        row: usize,
        default_entity: Option<EntityType>,
    ) -> Result<ClaimRecord, RowDefect> {
        let entity_type = match non_empty(self.entity_type) {
            Some(value) => value
                .parse::<EntityType>()
                .map_err(|_| RowDefect::UnknownEntityType { value })?,
            None => default_entity.ok_or_else(|| RowDefect::MissingField {
                field: "entity_type".to_string(),
            })?,
        };

        let date = match non_empty(self.date) {
            Some(value) => parse_date(&value).ok_or(RowDefect::InvalidDate { value })?,
            None => {
                return Err(RowDefect::MissingField {
                    field: "date".to_string(),
                })
            }
        };

        let amount_paid = parse_amount("amount_paid", self.amount_paid)?;
        let amount_billed = parse_amount("amount_billed", self.amount_billed)?;

        Ok(ClaimRecord {
            id: non_empty(self.id).unwrap_or_else(|| format!("row-{}", row)),
            benefit_code: self.benefit_code.map(|c| c.trim().to_string()).unwrap_or_default(),
            amount_paid,
            amount_billed,
            date,
            entity_type,
            group_name: non_empty(self.group_name),
            member_id: non_empty(self.member_id),
            provider_id: non_empty(self.provider_id),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_amount(field: &str, value: Option<String>) -> Result<f64, RowDefect> {
    let raw = value.ok_or_else(|| RowDefect::MissingField {
        field: field.to_string(),
    })?;
    let text = raw.trim();
    if text.is_empty() {
        return Ok(0.0);
    }
    let cleaned: String = text.chars().filter(|c| *c != ',').collect();
    let amount = cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| RowDefect::InvalidAmount {
            field: field.to_string(),
            value: text.to_string(),
        })?;
    if amount < 0.0 {
        return Err(RowDefect::NegativeAmount {
            field: field.to_string(),
            value: amount,
        });
    }
    Ok(amount)
}

/// Parse a date in `YYYY-MM-DD`, SQL datetime, or RFC 3339 form.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(d) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(d);
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt.date());
        }
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.date_naive())
}

/// Accept a string, number, bool or null and produce optional text.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct LenientVisitor;

    impl<'de> serde::de::Visitor<'de> for LenientVisitor {
        type Value = Option<String>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "a string, number, or null")
        }

        fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_string<E: serde::de::Error>(self, v: String) -> Result<Self::Value, E> {
            Ok(Some(v))
        }

        fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_bool<E: serde::de::Error>(self, v: bool) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_none<E: serde::de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D2>(self, deserializer: D2) -> Result<Self::Value, D2::Error>
        where
            D2: Deserializer<'de>,
        {
            deserializer.deserialize_any(LenientVisitor)
        }
    }

    deserializer.deserialize_any(LenientVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(paid: &str, billed: &str, date: &str, entity: &str) -> RawClaimRow {
        RawClaimRow {
            id: Some("PA-1".to_string()),
            benefit_code: Some(" DEN001 ".to_string()),
            amount_paid: Some(paid.to_string()),
            amount_billed: Some(billed.to_string()),
            date: Some(date.to_string()),
            entity_type: Some(entity.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn valid_row_becomes_record() {
        let rec = raw("90", "100", "2025-03-01", "PA").into_record(1, None).unwrap();
        assert_eq!(rec.id, "PA-1");
        assert_eq!(rec.benefit_code, "DEN001");
        assert_eq!(rec.amount_paid, 90.0);
        assert_eq!(rec.amount_billed, 100.0);
        assert_eq!(rec.entity_type, EntityType::Pa);
        assert_eq!(rec.date, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
    }

    #[test]
    fn thousands_separators_are_accepted() {
        let rec = raw("1,250.50", "2,000", "2025-03-01", "claim")
            .into_record(1, None)
            .unwrap();
        assert_eq!(rec.amount_paid, 1250.5);
        assert_eq!(rec.amount_billed, 2000.0);
    }

    #[test]
    fn blank_amounts_are_zero() {
        let rec = raw("", " ", "2025-03-01", "claim").into_record(1, None).unwrap();
        assert_eq!(rec.amount_paid, 0.0);
        assert_eq!(rec.amount_billed, 0.0);
    }

    #[test]
    fn absent_amount_is_a_missing_field() {
        let mut row = raw("90", "", "2025-03-01", "claim");
        row.amount_billed = None;
        assert_eq!(
            row.into_record(1, None).unwrap_err(),
            RowDefect::MissingField {
                field: "amount_billed".to_string()
            }
        );

        let row: RawClaimRow = serde_json::from_str(
            r#"{"id": "c9", "benefit_code": "D100", "amount_paid": 90, "date": "2025-01-05"}"#,
        )
        .unwrap();
        assert!(matches!(
            row.into_record(1, Some(EntityType::Claim)),
            Err(RowDefect::MissingField { field }) if field == "amount_billed"
        ));
    }

    #[test]
    fn negative_amount_is_a_defect() {
        let err = raw("-5", "100", "2025-03-01", "claim")
            .into_record(1, None)
            .unwrap_err();
        assert!(matches!(err, RowDefect::NegativeAmount { .. }));
    }

    #[test]
    fn non_numeric_amount_is_a_defect() {
        let err = raw("abc", "100", "2025-03-01", "claim")
            .into_record(1, None)
            .unwrap_err();
        assert!(matches!(err, RowDefect::InvalidAmount { .. }));

        let err = raw("NaN", "100", "2025-03-01", "claim")
            .into_record(1, None)
            .unwrap_err();
        assert!(matches!(err, RowDefect::InvalidAmount { .. }));
    }

    #[test]
    fn bad_date_is_a_defect() {
        let err = raw("1", "1", "03/01/2025", "claim")
            .into_record(1, None)
            .unwrap_err();
        assert!(matches!(err, RowDefect::InvalidDate { .. }));
    }

    #[test]
    fn sql_datetime_is_accepted() {
        let rec = raw("1", "1", "2025-03-01 14:22:05", "claim")
            .into_record(1, None)
            .unwrap();
        assert_eq!(rec.date, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());

        let rec = raw("1", "1", "2025-03-01T14:22:05Z", "claim")
            .into_record(1, None)
            .unwrap();
        assert_eq!(rec.date, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
    }

    #[test]
    fn entity_type_falls_back_to_default() {
        let mut row = raw("1", "1", "2025-03-01", "");
        row.entity_type = None;
        assert!(matches!(
            row.clone().into_record(1, None),
            Err(RowDefect::MissingField { .. })
        ));
        let rec = row.into_record(1, Some(EntityType::Claim)).unwrap();
        assert_eq!(rec.entity_type, EntityType::Claim);
    }

    #[test]
    fn unknown_entity_type_is_a_defect() {
        let err = raw("1", "1", "2025-03-01", "invoice")
            .into_record(1, None)
            .unwrap_err();
        assert_eq!(
            err,
            RowDefect::UnknownEntityType {
                value: "invoice".to_string()
            }
        );
    }

    #[test]
    fn missing_id_uses_row_number() {
        let mut row = raw("1", "1", "2025-03-01", "pa");
        row.id = None;
        let rec = row.into_record(17, None).unwrap();
        assert_eq!(rec.id, "row-17");
    }

    #[test]
    fn json_numbers_are_accepted() {
        let row: RawClaimRow = serde_json::from_str(
            r#"{"id": 7, "benefit_code": "SUR010", "amount_paid": 70, "amount_billed": 100.5,
                "date": "2025-01-09", "entity_type": "claim", "member_id": null}"#,
        )
        .unwrap();
        assert_eq!(row.id.as_deref(), Some("7"));
        assert_eq!(row.amount_billed.as_deref(), Some("100.5"));
        assert_eq!(row.member_id, None);
        let rec = row.into_record(1, None).unwrap();
        assert_eq!(rec.amount_paid, 70.0);
    }

    #[test]
    fn entity_type_aliases() {
        assert_eq!("Pre-Authorization".parse::<EntityType>().unwrap(), EntityType::Pa);
        assert_eq!("CLAIMS".parse::<EntityType>().unwrap(), EntityType::Claim);
    }
}

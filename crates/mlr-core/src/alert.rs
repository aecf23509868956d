//! Alert events and their lifecycle.
//!
//! Each event starts `evaluated` and ends in exactly one terminal state:
//! `suppressed`, `sent` or `failed`.

use chrono::{DateTime, Utc};
use mlr_common::{AggregateKey, EntityType};
use mlr_config::{ThresholdBand, ThresholdBands};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::aggregate::{AggregateSet, CategoryAggregate};
use crate::threshold::evaluate;

/// What an alert is about: one aggregate of one entity type, or the
/// roll-up of one client group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
pub struct AlertSubject {
    pub entity_type: EntityType,
    /// `overall` for group subjects.
    pub key: AggregateKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl AlertSubject {
    pub fn new(entity_type: EntityType, key: impl Into<AggregateKey>) -> Self {
        Self {
            entity_type,
            key: key.into(),
            group: None,
        }
    }

    /// The roll-up of one client group.
    pub fn for_group(entity_type: EntityType, group: &str) -> Self {
        Self {
            entity_type,
            key: AggregateKey::Overall,
            group: Some(group.trim().to_string()),
        }
    }

    /// Stable key used by the alert ledger: `claim:dental`,
    /// `pa:group:Acme Ltd`.
    pub fn ledger_key(&self) -> String {
        match &self.group {
            Some(group) => format!("{}:group:{}", self.entity_type.label(), group),
            None => format!("{}:{}", self.entity_type.label(), self.key.label()),
        }
    }

    /// What is being measured within the entity type: `Dental`, `group Acme Ltd`.
    pub fn scope_name(&self) -> String {
        match &self.group {
            Some(group) => format!("group {}", group),
            None => self.key.display_name().to_string(),
        }
    }

    /// Human-readable name, e.g. `Claims Dental`.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.entity_type.display_name(), self.scope_name())
    }
}

impl fmt::Display for AlertSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ledger_key())
    }
}

/// Where an alert event ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AlertStatus {
    /// Crossed a band; not yet deduplicated or dispatched.
    Evaluated,
    /// Already alerted at this or a higher band.
    Suppressed,
    /// Delivered by the notification channel.
    Sent,
    /// Delivery attempted and failed.
    Failed { reason: String },
}

impl AlertStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AlertStatus::Evaluated)
    }

    pub fn label(&self) -> &'static str {
        match self {
            AlertStatus::Evaluated => "evaluated",
            AlertStatus::Suppressed => "suppressed",
            AlertStatus::Sent => "sent",
            AlertStatus::Failed { .. } => "failed",
        }
    }
}

/// A ratio that crossed a threshold band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AlertEvent {
    pub subject: AlertSubject,
    /// Percentage that triggered the alert.
    pub ratio: f64,
    pub band_label: String,
    pub band_lower_bound: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub status: AlertStatus,
}

impl AlertEvent {
    pub fn new(subject: AlertSubject, ratio: f64, band: &ThresholdBand, timestamp: DateTime<Utc>) -> Self {
        Self {
            subject,
            ratio,
            band_label: band.label.clone(),
            band_lower_bound: band.lower_bound,
            timestamp,
            status: AlertStatus::Evaluated,
        }
    }

    /// The band this event fired for.
    pub fn band(&self) -> ThresholdBand {
        ThresholdBand::new(self.band_lower_bound, self.band_label.clone())
    }

    /// Same subject, band and ratio; timestamps and status ignored.
    pub fn same_finding(&self, other: &AlertEvent) -> bool {
        self.subject == other.subject
            && self.band_label == other.band_label
            && self.ratio == other.ratio
    }
}

/// Evaluate one aggregate for `subject`. Indeterminate aggregates never alert.
pub fn evaluate_aggregate(
    subject: AlertSubject,
    aggregate: &CategoryAggregate,
    bands: &ThresholdBands,
    timestamp: DateTime<Utc>,
) -> Option<AlertEvent> {
    if aggregate.indeterminate {
        return None;
    }
    evaluate(aggregate.ratio, bands)
        .map(|band| AlertEvent::new(subject, aggregate.ratio, band, timestamp))
}

/// Evaluate every aggregate of both entity types (PA first, overall before
/// categories), then every client group. At most one event per subject.
pub fn evaluate_all(
    aggregates: &AggregateSet,
    bands: &ThresholdBands,
    timestamp: DateTime<Utc>,
) -> Vec<AlertEvent> {
    let scopes = aggregates
        .iter()
        .map(|(entity, aggregate)| (AlertSubject::new(entity, aggregate.key), aggregate));
    let groups = aggregates
        .iter_groups()
        .map(|(entity, group, aggregate)| (AlertSubject::for_group(entity, group), aggregate));
    scopes
        .chain(groups)
        .filter_map(|(subject, aggregate)| evaluate_aggregate(subject, aggregate, bands, timestamp))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::classify::ClassifiedRecord;
    use chrono::NaiveDate;
    use mlr_common::{Category, ClaimRecord};
    use mlr_config::RatioAdjustments;

    fn classified(category: Category, paid: f64, billed: f64) -> ClassifiedRecord {
        let date = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
        ClassifiedRecord {
            record: ClaimRecord::new("x", "c", paid, billed, date, EntityType::Claim),
            category,
        }
    }

    #[test]
    fn one_event_per_subject_at_highest_band() {
        let records = vec![classified(Category::Dental, 90.0, 100.0)];
        let set = aggregate(&records, &RatioAdjustments::default());
        let events = evaluate_all(&set, &ThresholdBands::default(), Utc::now());

        // claims overall and claims dental both sit at 90%
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.band_label == "critical"));
        assert_eq!(events[0].subject, AlertSubject::new(EntityType::Claim, AggregateKey::Overall));
        assert_eq!(events[1].subject, AlertSubject::new(EntityType::Claim, Category::Dental));
        assert!(events.iter().all(|e| e.status == AlertStatus::Evaluated));
    }

    #[test]
    fn indeterminate_aggregates_do_not_alert() {
        let records = vec![classified(Category::Optical, 500.0, 0.0)];
        let set = aggregate(&records, &RatioAdjustments::default());
        assert!(evaluate_all(&set, &ThresholdBands::default(), Utc::now()).is_empty());
    }

    #[test]
    fn subject_keys_and_names() {
        let subject = AlertSubject::new(EntityType::Pa, Category::Chronic);
        assert_eq!(subject.ledger_key(), "pa:chronic");
        assert_eq!(subject.display_name(), "PA Chronic Disease");

        let group = AlertSubject::for_group(EntityType::Claim, " Acme Ltd ");
        assert_eq!(group.ledger_key(), "claim:group:Acme Ltd");
        assert_eq!(group.display_name(), "Claims group Acme Ltd");
        let overall = AlertSubject::new(EntityType::Claim, AggregateKey::Overall);
        assert_ne!(group.ledger_key(), overall.ledger_key());
        let json = serde_json::to_value(&group).unwrap();
        assert_eq!(json["group"], "Acme Ltd");
        assert!(serde_json::to_value(&subject).unwrap().get("group").is_none());
    }

    #[test]
    fn groups_are_evaluated_after_scopes() {
        let mut acme = classified(Category::Dental, 20.0, 100.0);
        acme.record = acme.record.with_group("Acme Ltd");
        let mut globex = classified(Category::Dental, 70.0, 100.0);
        globex.record = globex.record.with_group("Globex");
        let set = aggregate(&[acme, globex], &RatioAdjustments::default());
        let events = evaluate_all(&set, &ThresholdBands::default(), Utc::now());

        // 90/200 overall and dental stay below every band
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].subject, AlertSubject::for_group(EntityType::Claim, "Globex"));
        assert_eq!(events[0].band_label, "watch");
    }

    #[test]
    fn status_serializes_flat() {
        let band = ThresholdBand::new(85.0, "critical");
        let mut event = AlertEvent::new(
            AlertSubject::new(EntityType::Claim, Category::Dental),
            90.0,
            &band,
            Utc::now(),
        );
        event.status = AlertStatus::Failed {
            reason: "timeout".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "timeout");
        assert_eq!(json["subject"]["key"], "dental");
        assert_eq!(json["subject"]["entity_type"], "claim");
    }
}

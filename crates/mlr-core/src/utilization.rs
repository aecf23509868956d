//! Utilization metrics alongside the loss ratios.
//!
//! Computed from the same classified records as the aggregates, in one pass,
//! using the raw paid amounts (no ratio adjustments).

use std::collections::{BTreeMap, BTreeSet};

use mlr_common::{Category, EntityType};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::classify::{normalize_code, ClassifiedRecord};

/// Number of codes kept in [`UtilizationMetrics::top_codes`].
pub const TOP_CODES: usize = 5;

/// Spend on one procedure code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CodeSpend {
    pub code: String,
    pub paid: f64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UtilizationMetrics {
    pub record_count: u64,
    pub total_paid: f64,
    /// 0 when there are no records.
    pub average_paid: f64,
    pub distinct_members: usize,
    pub distinct_providers: usize,
    /// Paid amount per `YYYY-MM`.
    pub monthly_paid: BTreeMap<String, f64>,
    pub top_codes: Vec<CodeSpend>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EntityUtilization {
    pub entity_type: EntityType,
    pub overall: UtilizationMetrics,
    pub categories: BTreeMap<Category, UtilizationMetrics>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UtilizationReport {
    pub pa: EntityUtilization,
    pub claims: EntityUtilization,
    /// Distinct group names across both entity types.
    pub distinct_groups: usize,
}

#[derive(Debug, Clone, Default)]
struct Accumulator {
    count: u64,
    paid: f64,
    members: BTreeSet<String>,
    providers: BTreeSet<String>,
    monthly: BTreeMap<String, f64>,
    codes: BTreeMap<String, (f64, u64)>,
}

impl Accumulator {
    fn add(&mut self, record: &ClassifiedRecord) {
        let r = &record.record;
        self.count += 1;
        self.paid += r.amount_paid;
        if let Some(member) = non_blank(&r.member_id) {
            self.members.insert(member.to_string());
        }
        if let Some(provider) = non_blank(&r.provider_id) {
            self.providers.insert(provider.to_string());
        }
        *self
            .monthly
            .entry(r.date.format("%Y-%m").to_string())
            .or_insert(0.0) += r.amount_paid;
        let code = normalize_code(&r.benefit_code);
        if !code.is_empty() {
            let entry = self.codes.entry(code).or_insert((0.0, 0));
            entry.0 += r.amount_paid;
            entry.1 += 1;
        }
    }

    fn merge(&mut self, other: &Accumulator) {
        self.count += other.count;
        self.paid += other.paid;
        self.members.extend(other.members.iter().cloned());
        self.providers.extend(other.providers.iter().cloned());
        for (month, paid) in &other.monthly {
            *self.monthly.entry(month.clone()).or_insert(0.0) += paid;
        }
        for (code, (paid, count)) in &other.codes {
            let entry = self.codes.entry(code.clone()).or_insert((0.0, 0));
            entry.0 += paid;
            entry.1 += count;
        }
    }

    fn finish(&self) -> UtilizationMetrics {
        let mut top: Vec<CodeSpend> = self
            .codes
            .iter()
            .map(|(code, (paid, count))| CodeSpend {
                code: code.clone(),
                paid: *paid,
                count: *count,
            })
            .collect();
        // BTreeMap iteration is already code-ordered; a stable sort keeps
        // that order among equal amounts.
        top.sort_by(|a, b| b.paid.total_cmp(&a.paid));
        top.truncate(TOP_CODES);

        UtilizationMetrics {
            record_count: self.count,
            total_paid: self.paid,
            average_paid: if self.count == 0 {
                0.0
            } else {
                self.paid / self.count as f64
            },
            distinct_members: self.members.len(),
            distinct_providers: self.providers.len(),
            monthly_paid: self.monthly.clone(),
            top_codes: top,
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Compute utilization for both entity types.
pub fn utilization(records: &[ClassifiedRecord]) -> UtilizationReport {
    let mut partials: BTreeMap<(EntityType, Category), Accumulator> = BTreeMap::new();
    let mut groups = BTreeSet::new();

    for record in records {
        partials
            .entry((record.record.entity_type, record.category))
            .or_default()
            .add(record);
        if let Some(group) = non_blank(&record.record.group_name) {
            groups.insert(group.to_lowercase());
        }
    }

    let finish_entity = |entity: EntityType| {
        let mut overall = Accumulator::default();
        let mut categories = BTreeMap::new();
        for category in Category::all() {
            let acc = partials
                .get(&(entity, *category))
                .cloned()
                .unwrap_or_default();
            overall.merge(&acc);
            categories.insert(*category, acc.finish());
        }
        EntityUtilization {
            entity_type: entity,
            overall: overall.finish(),
            categories,
        }
    };

    UtilizationReport {
        pa: finish_entity(EntityType::Pa),
        claims: finish_entity(EntityType::Claim),
        distinct_groups: groups.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use mlr_common::ClaimRecord;

    fn rec(code: &str, paid: f64, month: u32, member: &str) -> ClassifiedRecord {
        let date = NaiveDate::from_ymd_opt(2025, month, 3).unwrap();
        ClassifiedRecord {
            record: ClaimRecord::new("id", code, paid, paid * 2.0, date, EntityType::Claim)
                .with_member(member)
                .with_provider("hosp-1")
                .with_group("Acme Ltd"),
            category: Category::Dental,
        }
    }

    #[test]
    fn counts_totals_and_series() {
        let records = vec![
            rec("D1", 100.0, 1, "m1"),
            rec("D2", 50.0, 1, "m2"),
            rec("D1", 30.0, 2, "m1"),
        ];
        let report = utilization(&records);
        let dental = &report.claims.categories[&Category::Dental];
        assert_eq!(dental.record_count, 3);
        assert_eq!(dental.total_paid, 180.0);
        assert_eq!(dental.average_paid, 60.0);
        assert_eq!(dental.distinct_members, 2);
        assert_eq!(dental.distinct_providers, 1);
        assert_eq!(dental.monthly_paid["2025-01"], 150.0);
        assert_eq!(dental.monthly_paid["2025-02"], 30.0);
        assert_eq!(dental.top_codes[0].code, "d1");
        assert_eq!(dental.top_codes[0].paid, 130.0);
        assert_eq!(dental.top_codes[0].count, 2);

        assert_eq!(report.claims.overall, *dental);
        assert_eq!(report.distinct_groups, 1);
    }

    #[test]
    fn empty_categories_average_zero() {
        let report = utilization(&[]);
        assert_eq!(report.pa.overall.record_count, 0);
        assert_eq!(report.pa.overall.average_paid, 0.0);
        assert_eq!(report.pa.categories.len(), Category::all().len());
    }

    #[test]
    fn top_codes_are_capped_and_ties_ordered_by_code() {
        let records: Vec<_> = ["f", "e", "d", "c", "b", "a"]
            .iter()
            .map(|code| rec(code, 10.0, 1, "m"))
            .collect();
        let report = utilization(&records);
        let codes: Vec<_> = report.claims.overall.top_codes.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["a", "b", "c", "d", "e"]);
    }
}

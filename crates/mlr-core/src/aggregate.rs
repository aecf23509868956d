//! Ratio aggregation.
//!
//! A single order-independent pass sums numerator and denominator per
//! `(entity type, category)`. The overall aggregate of an entity type is the
//! merge of its category partials, so per-category sums always add up to the
//! overall sums.
//!
//! Rows that name a client group are also summed per `(entity type, group)`
//! into a group roll-up, the scope the alert ledger tracks per scheme.
//!
//! Ratios are percentages: `numerator_sum / denominator_sum × 100`. A zero
//! denominator, or a sum that overflowed to infinity, yields ratio 0 flagged
//! `indeterminate`.

use std::collections::BTreeMap;

use mlr_common::{AggregateKey, Category, ClaimRecord, EntityType};
use mlr_config::RatioAdjustments;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::classify::ClassifiedRecord;

/// Finalized sums and ratio for one aggregate key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CategoryAggregate {
    pub key: AggregateKey,
    pub numerator_sum: f64,
    pub denominator_sum: f64,
    pub record_count: u64,
    /// Records that contributed nothing to the denominator.
    pub zero_billed_count: u64,
    /// Percentage; 0 when indeterminate.
    pub ratio: f64,
    /// True when `denominator_sum` is 0 or either sum is not finite.
    pub indeterminate: bool,
    /// A sum overflowed; the amounts are implausible rather than absent.
    #[serde(default)]
    pub non_finite: bool,
}

impl CategoryAggregate {
    /// Ratio rounded to two decimals for display.
    pub fn ratio_display(&self) -> f64 {
        round2(self.ratio)
    }
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Running sums for one aggregate key.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateAccumulator {
    key: AggregateKey,
    numerator_sum: f64,
    denominator_sum: f64,
    record_count: u64,
    zero_billed_count: u64,
}

impl AggregateAccumulator {
    pub fn new(key: AggregateKey) -> Self {
        Self {
            key,
            numerator_sum: 0.0,
            denominator_sum: 0.0,
            record_count: 0,
            zero_billed_count: 0,
        }
    }

    /// Add one record's contribution.
    pub fn add(&mut self, numerator: f64, denominator: f64) {
        self.numerator_sum += numerator;
        self.denominator_sum += denominator;
        self.record_count += 1;
        if denominator == 0.0 {
            self.zero_billed_count += 1;
        }
    }

    /// Fold another partial into this one.
    pub fn merge(&mut self, other: &AggregateAccumulator) {
        self.numerator_sum += other.numerator_sum;
        self.denominator_sum += other.denominator_sum;
        self.record_count += other.record_count;
        self.zero_billed_count += other.zero_billed_count;
    }

    pub fn finalize(&self) -> CategoryAggregate {
        let non_finite = !(self.numerator_sum.is_finite() && self.denominator_sum.is_finite());
        let indeterminate = non_finite || self.denominator_sum <= 0.0;
        let ratio = if indeterminate {
            0.0
        } else {
            self.numerator_sum / self.denominator_sum * 100.0
        };
        CategoryAggregate {
            key: self.key,
            numerator_sum: self.numerator_sum,
            denominator_sum: self.denominator_sum,
            record_count: self.record_count,
            zero_billed_count: self.zero_billed_count,
            ratio,
            indeterminate,
            non_finite,
        }
    }
}

/// Numerator and denominator contributed by one record.
pub fn contribution(record: &ClaimRecord, adjustments: &RatioAdjustments) -> (f64, f64) {
    let paid = match record.entity_type {
        EntityType::Pa => record.amount_paid * adjustments.pa_cost_multiplier,
        EntityType::Claim => record.amount_paid,
    };
    let numerator = paid + record.amount_billed * adjustments.commission_rate;
    (numerator, record.amount_billed)
}

/// All aggregates of one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EntityAggregates {
    pub entity_type: EntityType,
    pub overall: CategoryAggregate,
    /// Every category is present, even when it saw no records.
    pub categories: BTreeMap<Category, CategoryAggregate>,
    /// Roll-up per client group (key `overall`), only for groups with rows.
    /// Rows without a group count toward `overall` and categories only.
    #[serde(default)]
    pub groups: BTreeMap<String, CategoryAggregate>,
}

impl EntityAggregates {
    /// Look up an aggregate by key.
    pub fn get(&self, key: AggregateKey) -> Option<&CategoryAggregate> {
        match key {
            AggregateKey::Overall => Some(&self.overall),
            AggregateKey::Category(c) => self.categories.get(&c),
        }
    }

    pub fn group(&self, name: &str) -> Option<&CategoryAggregate> {
        self.groups.get(name.trim())
    }

    /// Overall first, then categories in reporting order. Groups excluded.
    pub fn iter(&self) -> impl Iterator<Item = &CategoryAggregate> {
        std::iter::once(&self.overall).chain(self.categories.values())
    }
}

/// The two parallel result sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AggregateSet {
    pub pa: EntityAggregates,
    pub claims: EntityAggregates,
}

impl AggregateSet {
    pub fn for_entity(&self, entity: EntityType) -> &EntityAggregates {
        match entity {
            EntityType::Pa => &self.pa,
            EntityType::Claim => &self.claims,
        }
    }

    /// Every `(entity, aggregate)` pair, PA first.
    pub fn iter(&self) -> impl Iterator<Item = (EntityType, &CategoryAggregate)> {
        self.pa
            .iter()
            .map(|a| (EntityType::Pa, a))
            .chain(self.claims.iter().map(|a| (EntityType::Claim, a)))
    }

    /// Every `(entity, group, aggregate)`, PA first, groups by name.
    pub fn iter_groups(&self) -> impl Iterator<Item = (EntityType, &str, &CategoryAggregate)> {
        [EntityType::Pa, EntityType::Claim]
            .into_iter()
            .flat_map(move |entity| {
                self.for_entity(entity)
                    .groups
                    .iter()
                    .map(move |(name, agg)| (entity, name.as_str(), agg))
            })
    }
}

/// Incremental aggregator keyed by entity type then category, with a
/// parallel per-group tally.
#[derive(Debug, Clone)]
pub struct Aggregator {
    adjustments: RatioAdjustments,
    partials: BTreeMap<(EntityType, Category), AggregateAccumulator>,
    groups: BTreeMap<(EntityType, String), AggregateAccumulator>,
}

impl Aggregator {
    pub fn new(adjustments: RatioAdjustments) -> Self {
        let mut partials = BTreeMap::new();
        for entity in EntityType::all() {
            for category in Category::all() {
                partials.insert(
                    (*entity, *category),
                    AggregateAccumulator::new(AggregateKey::Category(*category)),
                );
            }
        }
        Self {
            adjustments,
            partials,
            groups: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, record: &ClassifiedRecord) {
        let (numerator, denominator) = contribution(&record.record, &self.adjustments);
        if let Some(acc) = self
            .partials
            .get_mut(&(record.record.entity_type, record.category))
        {
            acc.add(numerator, denominator);
        }
        let group = record.record.group_name.as_deref().map(str::trim);
        if let Some(group) = group.filter(|g| !g.is_empty()) {
            self.groups
                .entry((record.record.entity_type, group.to_string()))
                .or_insert_with(|| AggregateAccumulator::new(AggregateKey::Overall))
                .add(numerator, denominator);
        }
    }

    /// Fold another aggregator's partials into this one.
    pub fn merge(&mut self, other: &Aggregator) {
        for (key, theirs) in &other.partials {
            if let Some(ours) = self.partials.get_mut(key) {
                ours.merge(theirs);
            }
        }
        for (key, theirs) in &other.groups {
            self.groups
                .entry(key.clone())
                .or_insert_with(|| AggregateAccumulator::new(AggregateKey::Overall))
                .merge(theirs);
        }
    }

    pub fn finish(&self) -> AggregateSet {
        AggregateSet {
            pa: self.finish_entity(EntityType::Pa),
            claims: self.finish_entity(EntityType::Claim),
        }
    }

    fn finish_entity(&self, entity: EntityType) -> EntityAggregates {
        let mut overall = AggregateAccumulator::new(AggregateKey::Overall);
        let mut categories = BTreeMap::new();
        for category in Category::all() {
            if let Some(acc) = self.partials.get(&(entity, *category)) {
                overall.merge(acc);
                categories.insert(*category, acc.finalize());
            }
        }
        let groups = self
            .groups
            .iter()
            .filter(|((e, _), _)| *e == entity)
            .map(|((_, name), acc)| (name.clone(), acc.finalize()))
            .collect();
        EntityAggregates {
            entity_type: entity,
            overall: overall.finalize(),
            categories,
            groups,
        }
    }
}

/// Aggregate a classified record set in one pass.
pub fn aggregate(records: &[ClassifiedRecord], adjustments: &RatioAdjustments) -> AggregateSet {
    let mut aggregator = Aggregator::new(adjustments.clone());
    for record in records {
        aggregator.add(record);
    }
    aggregator.finish()
}

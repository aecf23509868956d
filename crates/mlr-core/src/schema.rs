//! JSON Schema generation for report and configuration types.
//!
//! ```bash
//! mlr-core schema --list
//! mlr-core schema RunReport
//! mlr-core schema --all
//! ```

use schemars::schema_for;
use serde_json::Value;
use std::collections::BTreeMap;

pub use crate::aggregate::{AggregateSet, CategoryAggregate, EntityAggregates};
pub use crate::alert::{AlertEvent, AlertStatus, AlertSubject};
pub use crate::report::{QuarantineSummary, RunMarker, RunReport, RunSummary};
pub use crate::utilization::UtilizationReport;
pub use mlr_common::{AggregateKey, Category, ClaimRecord, EntityType, RowDefect, RunId};
pub use mlr_config::{ConfigSnapshot, MlrConfig};

/// Available schema types with their descriptions.
pub fn available_schemas() -> Vec<(&'static str, &'static str)> {
    vec![
        ("RunReport", "Complete result of one computation run"),
        ("RunSummary", "Counts of records and alert outcomes"),
        ("RunMarker", "Degraded condition surfaced in a run"),
        ("QuarantineSummary", "Rejected rows with a bounded sample"),
        ("AggregateSet", "PA and claims aggregates"),
        ("EntityAggregates", "Aggregates of one entity type"),
        ("CategoryAggregate", "Sums and ratio for one scope"),
        ("AlertEvent", "Threshold crossing with its final status"),
        ("AlertSubject", "Entity type and scope an alert is about"),
        ("AlertStatus", "Alert lifecycle state"),
        ("UtilizationReport", "Utilization metrics per entity type"),
        ("ClaimRecord", "Validated claim or PA line"),
        ("RowDefect", "Reason a row was quarantined"),
        ("Category", "Benefit category"),
        ("AggregateKey", "Overall or a category"),
        ("EntityType", "PA or claim"),
        ("RunId", "Run identifier"),
        ("ConfigSnapshot", "Configuration provenance embedded in reports"),
        ("MlrConfig", "Configuration file (mlr.toml)"),
    ]
}

/// Generate JSON Schema for a type by name, or `None` if unknown.
pub fn generate_schema(type_name: &str) -> Option<Value> {
    let schema = match type_name {
        "RunReport" => schema_for!(RunReport),
        "RunSummary" => schema_for!(RunSummary),
        "RunMarker" => schema_for!(RunMarker),
        "QuarantineSummary" => schema_for!(QuarantineSummary),
        "AggregateSet" => schema_for!(AggregateSet),
        "EntityAggregates" => schema_for!(EntityAggregates),
        "CategoryAggregate" => schema_for!(CategoryAggregate),
        "AlertEvent" => schema_for!(AlertEvent),
        "AlertSubject" => schema_for!(AlertSubject),
        "AlertStatus" => schema_for!(AlertStatus),
        "UtilizationReport" => schema_for!(UtilizationReport),
        "ClaimRecord" => schema_for!(ClaimRecord),
        "RowDefect" => schema_for!(RowDefect),
        "Category" => schema_for!(Category),
        "AggregateKey" => schema_for!(AggregateKey),
        "EntityType" => schema_for!(EntityType),
        "RunId" => schema_for!(RunId),
        "ConfigSnapshot" => schema_for!(ConfigSnapshot),
        "MlrConfig" => schema_for!(MlrConfig),
        _ => return None,
    };
    serde_json::to_value(schema).ok()
}

/// Every schema keyed by type name.
pub fn generate_all_schemas() -> BTreeMap<String, Value> {
    available_schemas()
        .into_iter()
        .filter_map(|(name, _)| generate_schema(name).map(|s| (name.to_string(), s)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_listed_schemas_generate() {
        for (name, _desc) in available_schemas() {
            assert!(generate_schema(name).is_some(), "schema for {name}");
        }
        assert_eq!(generate_all_schemas().len(), available_schemas().len());
    }

    #[test]
    fn unknown_schema_returns_none() {
        assert!(generate_schema("Plan").is_none());
        assert!(generate_schema("").is_none());
    }

    #[test]
    fn run_report_schema_lists_top_level_fields() {
        let schema = generate_schema("RunReport").unwrap();
        let props = schema["properties"].as_object().unwrap();
        for field in ["run_id", "aggregates", "alerts", "markers", "summary", "config"] {
            assert!(props.contains_key(field), "missing {field}");
        }
    }
}

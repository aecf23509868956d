//! Run report: the structured result handed to presentation.
//!
//! Everything a dashboard or scheduler needs is computed before the report is
//! built; renderers only format.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use mlr_common::{AggregateKey, EntityType, OutputFormat, RunId, SCHEMA_VERSION};
use mlr_config::ConfigSnapshot;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::aggregate::{round2, AggregateSet, CategoryAggregate};
use crate::alert::{AlertEvent, AlertStatus, AlertSubject};
use crate::exit_codes::ExitCode;
use crate::source::{DateWindow, QuarantinedRow};
use crate::utilization::UtilizationReport;

/// Degraded-but-successful conditions surfaced to the reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunMarker {
    /// Records whose benefit code the reference did not know; counted as `other`.
    UnknownBenefitCodes { count: usize, codes: Vec<String> },
    /// An aggregate with a zero denominator; ratio reported as 0.
    Indeterminate {
        entity_type: EntityType,
        key: AggregateKey,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        group: Option<String>,
        record_count: u64,
    },
    /// Amounts so large their sum overflowed; the ratio is reported as 0 and
    /// never alerts.
    NonFiniteSums {
        entity_type: EntityType,
        key: AggregateKey,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        group: Option<String>,
        record_count: u64,
    },
    /// An alert could not be delivered.
    DeliveryFailed { subject: AlertSubject, reason: String },
    /// Rows rejected at ingestion.
    QuarantinedRows { count: usize },
    /// Codes listed under more than one benefit group in the reference.
    ReferenceConflicts { count: usize },
}

impl RunMarker {
    pub fn describe(&self) -> String {
        match self {
            RunMarker::UnknownBenefitCodes { count, codes } => format!(
                "{} record(s) with unknown benefit codes counted as other ({} distinct)",
                count,
                codes.len()
            ),
            RunMarker::Indeterminate {
                entity_type,
                key,
                group,
                record_count,
            } => format!(
                "{} {} has no billed amount ({} records); ratio is indeterminate",
                entity_type.display_name(),
                scope_label(*key, group.as_deref()),
                record_count
            ),
            RunMarker::NonFiniteSums {
                entity_type,
                key,
                group,
                record_count,
            } => format!(
                "{} {} amounts overflowed ({} records); ratio is indeterminate",
                entity_type.display_name(),
                scope_label(*key, group.as_deref()),
                record_count
            ),
            RunMarker::DeliveryFailed { subject, reason } => {
                format!("alert for {} was not delivered: {}", subject, reason)
            }
            RunMarker::QuarantinedRows { count } => {
                format!("{} malformed row(s) quarantined", count)
            }
            RunMarker::ReferenceConflicts { count } => {
                format!("{} benefit code(s) mapped to more than one group", count)
            }
        }
    }
}

impl RunMarker {
    /// Marker for an aggregate that cannot produce a ratio, if any.
    pub fn for_aggregate(
        entity_type: EntityType,
        group: Option<&str>,
        aggregate: &CategoryAggregate,
    ) -> Option<RunMarker> {
        let group = group.map(str::to_string);
        if aggregate.non_finite {
            Some(RunMarker::NonFiniteSums {
                entity_type,
                key: aggregate.key,
                group,
                record_count: aggregate.record_count,
            })
        } else if aggregate.indeterminate && aggregate.record_count > 0 {
            Some(RunMarker::Indeterminate {
                entity_type,
                key: aggregate.key,
                group,
                record_count: aggregate.record_count,
            })
        } else {
            None
        }
    }
}

fn scope_label(key: AggregateKey, group: Option<&str>) -> String {
    match group {
        Some(group) => format!("group {}", group),
        None => key.display_name().to_string(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QuarantineSummary {
    pub count: usize,
    /// Bounded sample of rejected rows.
    pub sample: Vec<QuarantinedRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RunSummary {
    pub rows_read: usize,
    pub records_ingested: usize,
    pub records_quarantined: usize,
    pub records_outside_window: usize,
    pub unknown_code_records: usize,
    pub alerts_evaluated: usize,
    pub alerts_sent: usize,
    pub alerts_suppressed: usize,
    pub alerts_failed: usize,
    pub channel: String,
}

impl RunSummary {
    /// Tally alert statuses.
    pub fn count_alerts(&mut self, alerts: &[AlertEvent]) {
        self.alerts_evaluated = alerts.len();
        self.alerts_sent = 0;
        self.alerts_suppressed = 0;
        self.alerts_failed = 0;
        for alert in alerts {
            match alert.status {
                AlertStatus::Sent => self.alerts_sent += 1,
                AlertStatus::Suppressed => self.alerts_suppressed += 1,
                AlertStatus::Failed { .. } => self.alerts_failed += 1,
                AlertStatus::Evaluated => {}
            }
        }
    }
}

/// Complete result of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RunReport {
    pub schema_version: String,
    pub run_id: RunId,
    pub generated_at: DateTime<Utc>,
    pub window: DateWindow,
    pub config: ConfigSnapshot,
    pub aggregates: AggregateSet,
    /// Every evaluated alert with its final status.
    pub alerts: Vec<AlertEvent>,
    pub utilization: UtilizationReport,
    pub quarantine: QuarantineSummary,
    pub markers: Vec<RunMarker>,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn new(
        run_id: RunId,
        window: DateWindow,
        config: ConfigSnapshot,
        aggregates: AggregateSet,
        utilization: UtilizationReport,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            run_id,
            generated_at: Utc::now(),
            window,
            config,
            aggregates,
            alerts: Vec::new(),
            utilization,
            quarantine: QuarantineSummary::default(),
            markers: Vec::new(),
            summary: RunSummary::default(),
        }
    }

    /// Exit code for a completed run.
    pub fn exit_code(&self) -> ExitCode {
        if self.summary.alerts_failed > 0 {
            ExitCode::PartialNotifyFail
        } else if self.summary.alerts_sent > 0 {
            ExitCode::AlertsDispatched
        } else {
            ExitCode::Clean
        }
    }

    pub fn render(&self, format: OutputFormat) -> Result<String, serde_json::Error> {
        match format {
            OutputFormat::Json => serde_json::to_string_pretty(self),
            OutputFormat::Jsonl => render_jsonl(self),
            OutputFormat::Md => Ok(render_markdown(self)),
            OutputFormat::Summary => Ok(render_summary(self)),
        }
    }
}

/// One line per alert, then one summary line.
pub fn render_jsonl(report: &RunReport) -> Result<String, serde_json::Error> {
    let mut out = String::new();
    for alert in &report.alerts {
        let line = serde_json::json!({
            "type": "alert",
            "run_id": report.run_id,
            "alert": alert,
        });
        out.push_str(&serde_json::to_string(&line)?);
        out.push('\n');
    }
    let summary = serde_json::json!({
        "type": "summary",
        "run_id": report.run_id,
        "generated_at": report.generated_at,
        "exit_code": report.exit_code().as_i32(),
        "summary": report.summary,
        "markers": report.markers,
    });
    out.push_str(&serde_json::to_string(&summary)?);
    out.push('\n');
    Ok(out)
}

/// Single human-readable line.
pub fn render_summary(report: &RunReport) -> String {
    let s = &report.summary;
    let mut line = format!(
        "{}: {} records ({} quarantined), claims {}, pa {}, alerts {} sent / {} suppressed / {} failed",
        report.run_id,
        s.records_ingested,
        s.records_quarantined,
        percent(&report.aggregates.claims.overall),
        percent(&report.aggregates.pa.overall),
        s.alerts_sent,
        s.alerts_suppressed,
        s.alerts_failed,
    );
    if !report.markers.is_empty() {
        let _ = write!(line, ", {} marker(s)", report.markers.len());
    }
    line.push('\n');
    line
}

fn ratio_cell(aggregate: &CategoryAggregate) -> String {
    if aggregate.indeterminate {
        "n/a".to_string()
    } else {
        format!("{:.2}", round2(aggregate.ratio))
    }
}

fn percent(aggregate: &CategoryAggregate) -> String {
    if aggregate.indeterminate {
        "n/a".to_string()
    } else {
        format!("{:.2}%", round2(aggregate.ratio))
    }
}

fn band_for(report: &RunReport, entity: EntityType, key: AggregateKey, group: Option<&str>) -> String {
    report
        .alerts
        .iter()
        .find(|a| {
            a.subject.entity_type == entity
                && a.subject.key == key
                && a.subject.group.as_deref() == group
        })
        .map(|a| format!("{} ({})", a.band_label, a.status.label()))
        .unwrap_or_else(|| "-".to_string())
}

/// Markdown tables for humans.
pub fn render_markdown(report: &RunReport) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# MLR run {}", report.run_id);
    let _ = writeln!(md);
    let _ = writeln!(
        md,
        "Generated {} for window {}.",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        report.window
    );
    let _ = writeln!(md);

    for entity in EntityType::all() {
        let aggregates = report.aggregates.for_entity(*entity);
        let _ = writeln!(md, "## {} loss ratios", entity.display_name());
        let _ = writeln!(md);
        let _ = writeln!(md, "| Scope | Paid | Billed | Records | Ratio % | Band |");
        let _ = writeln!(md, "|---|---:|---:|---:|---:|---|");
        for aggregate in aggregates.iter() {
            let _ = writeln!(
                md,
                "| {} | {:.2} | {:.2} | {} | {} | {} |",
                aggregate.key.display_name(),
                aggregate.numerator_sum,
                aggregate.denominator_sum,
                aggregate.record_count,
                ratio_cell(aggregate),
                band_for(report, *entity, aggregate.key, None),
            );
        }
        let _ = writeln!(md);

        if !aggregates.groups.is_empty() {
            let _ = writeln!(md, "| Group | Paid | Billed | Records | Ratio % | Band |");
            let _ = writeln!(md, "|---|---:|---:|---:|---:|---|");
            for (group, aggregate) in &aggregates.groups {
                let _ = writeln!(
                    md,
                    "| {} | {:.2} | {:.2} | {} | {} | {} |",
                    group,
                    aggregate.numerator_sum,
                    aggregate.denominator_sum,
                    aggregate.record_count,
                    ratio_cell(aggregate),
                    band_for(report, *entity, aggregate.key, Some(group)),
                );
            }
            let _ = writeln!(md);
        }
    }

    let _ = writeln!(md, "## Alerts");
    let _ = writeln!(md);
    if report.alerts.is_empty() {
        let _ = writeln!(md, "No ratio crossed a threshold band.");
    } else {
        let _ = writeln!(md, "| Subject | Ratio % | Band | Status |");
        let _ = writeln!(md, "|---|---:|---|---|");
        for alert in &report.alerts {
            let status = match &alert.status {
                AlertStatus::Failed { reason } => format!("failed: {}", reason),
                other => other.label().to_string(),
            };
            let _ = writeln!(
                md,
                "| {} | {:.2} | {} | {} |",
                alert.subject.display_name(),
                round2(alert.ratio),
                alert.band_label,
                status
            );
        }
    }
    let _ = writeln!(md);

    if !report.markers.is_empty() {
        let _ = writeln!(md, "## Notes");
        let _ = writeln!(md);
        for marker in &report.markers {
            let _ = writeln!(md, "- {}", marker.describe());
        }
        let _ = writeln!(md);
    }

    let s = &report.summary;
    let _ = writeln!(
        md,
        "{} rows read, {} ingested, {} quarantined, {} outside the window.",
        s.rows_read, s.records_ingested, s.records_quarantined, s.records_outside_window
    );
    md
}

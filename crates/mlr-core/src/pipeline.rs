//! One computation run, end to end.
//!
//! fetch → classify → aggregate → evaluate → deduplicate → dispatch → report.
//!
//! Only an unavailable data source fails the run, and it does so before any
//! aggregation. Unknown codes, zero denominators, quarantined rows and failed
//! deliveries become [`RunMarker`]s on an otherwise complete report.

use chrono::Utc;
use mlr_common::{Result, RunId};
use mlr_config::{ConfigSnapshot, MlrConfig};

use crate::aggregate::aggregate;
use crate::alert::{evaluate_all, AlertEvent, AlertStatus};
use crate::classify::{classify_records, BenefitReference};
use crate::ledger::AlertLedger;
use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};
use crate::notify::{DispatchResult, Dispatcher};
use crate::report::{QuarantineSummary, RunMarker, RunReport};
use crate::source::{fetch_all, DataSource, DateWindow};
use crate::utilization::utilization;

/// Distinct unknown codes listed in the marker.
const UNKNOWN_CODE_SAMPLE: usize = 20;

/// Move each evaluated event to a terminal state.
///
/// Events the ledger has already seen at the same or a higher band are
/// suppressed. The rest are dispatched; only successful deliveries are
/// recorded, so a failed alert is retried by the next evaluation. A dry-run
/// dispatcher never records.
pub fn deduplicate_and_dispatch(
    events: Vec<AlertEvent>,
    ledger: &mut AlertLedger,
    dispatcher: &Dispatcher,
    recipients: &[String],
    ctx: &LogContext,
) -> Vec<AlertEvent> {
    events
        .into_iter()
        .map(|mut event| {
            let band = event.band();
            if !ledger.should_dispatch(&event.subject, &band) {
                event.status = AlertStatus::Suppressed;
                log_event!(
                    ctx,
                    DEBUG,
                    event_names::ALERT_SUPPRESSED,
                    Stage::Dispatch,
                    "alert already dispatched at this or a higher band",
                    subject = %event.subject,
                    band = event.band_label.as_str()
                );
                return event;
            }

            match dispatcher.dispatch(&event, recipients) {
                DispatchResult::Sent => {
                    if !dispatcher.is_dry_run() {
                        ledger.record(&event.subject, &band, Utc::now());
                    }
                    event.status = AlertStatus::Sent;
                    log_event!(
                        ctx,
                        INFO,
                        event_names::DISPATCH_SENT,
                        Stage::Dispatch,
                        "alert sent",
                        subject = %event.subject,
                        band = event.band_label.as_str(),
                        channel = dispatcher.channel_name()
                    );
                }
                DispatchResult::Failed(reason) => {
                    log_event!(
                        ctx,
                        WARN,
                        event_names::DISPATCH_FAILED,
                        Stage::Dispatch,
                        "alert delivery failed",
                        subject = %event.subject,
                        band = event.band_label.as_str(),
                        reason = reason.as_str()
                    );
                    event.status = AlertStatus::Failed { reason };
                }
            }
            event
        })
        .collect()
}

/// Everything needed to run, shared read-only across runs.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: MlrConfig,
    snapshot: ConfigSnapshot,
    reference: BenefitReference,
    dispatcher: Dispatcher,
}

impl Pipeline {
    pub fn new(
        config: MlrConfig,
        snapshot: ConfigSnapshot,
        reference: BenefitReference,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            config,
            snapshot,
            reference,
            dispatcher,
        }
    }

    pub fn config(&self) -> &MlrConfig {
        &self.config
    }

    /// Execute one run against `ledger`.
    pub fn run(
        &self,
        run_id: RunId,
        sources: &[Box<dyn DataSource>],
        window: &DateWindow,
        ledger: &mut AlertLedger,
    ) -> Result<RunReport> {
        let ctx = LogContext::new(run_id.as_str());
        log_event!(
            ctx,
            INFO,
            event_names::RUN_STARTED,
            Stage::Init,
            "starting run",
            window = %window,
            sources = sources.len(),
            reference_codes = self.reference.len()
        );

        let batch = match fetch_all(sources, window) {
            Ok(batch) => batch,
            Err(e) => {
                log_event!(
                    ctx,
                    ERROR,
                    event_names::RUN_FINISHED,
                    Stage::Ingest,
                    "data source unavailable; run aborted",
                    error = %e
                );
                return Err(e);
            }
        };
        log_event!(
            ctx,
            INFO,
            event_names::SOURCE_LOADED,
            Stage::Ingest,
            "rows loaded",
            rows_read = batch.rows_read,
            records = batch.records.len(),
            outside_window = batch.outside_window
        );
        if !batch.quarantined.is_empty() {
            log_event!(
                ctx,
                WARN,
                event_names::SOURCE_QUARANTINED,
                Stage::Ingest,
                "malformed rows quarantined",
                count = batch.quarantined.len()
            );
        }

        let rows_read = batch.rows_read;
        let outside_window = batch.outside_window;
        let quarantined = batch.quarantined;
        let classified = classify_records(batch.records, &self.reference);
        log_event!(
            ctx,
            INFO,
            event_names::CLASSIFY_FINISHED,
            Stage::Classify,
            "records classified",
            records = classified.records.len(),
            unknown = classified.unknown_count
        );

        let aggregates = aggregate(&classified.records, &self.config.ratio);
        let usage = utilization(&classified.records);
        log_event!(
            ctx,
            INFO,
            event_names::AGGREGATE_FINISHED,
            Stage::Aggregate,
            "aggregates computed",
            claims_ratio = aggregates.claims.overall.ratio_display(),
            pa_ratio = aggregates.pa.overall.ratio_display()
        );

        let evaluated = evaluate_all(&aggregates, &self.config.thresholds, Utc::now());
        for event in &evaluated {
            log_event!(
                ctx,
                INFO,
                event_names::EVALUATE_BAND_CROSSED,
                Stage::Evaluate,
                "ratio crossed a threshold band",
                subject = %event.subject,
                ratio = event.ratio,
                band = event.band_label.as_str()
            );
        }

        let alerts = deduplicate_and_dispatch(
            evaluated,
            ledger,
            &self.dispatcher,
            &self.config.notify.recipients,
            &ctx,
        );

        let mut report = RunReport::new(
            run_id,
            *window,
            self.snapshot.clone(),
            aggregates,
            usage,
        );

        let mut markers = Vec::new();
        if classified.unknown_count > 0 {
            markers.push(RunMarker::UnknownBenefitCodes {
                count: classified.unknown_count,
                codes: classified
                    .unknown_codes
                    .iter()
                    .take(UNKNOWN_CODE_SAMPLE)
                    .cloned()
                    .collect(),
            });
        }
        if self.reference.conflicts() > 0 {
            markers.push(RunMarker::ReferenceConflicts {
                count: self.reference.conflicts(),
            });
        }
        if !quarantined.is_empty() {
            markers.push(RunMarker::QuarantinedRows {
                count: quarantined.len(),
            });
        }
        let scopes = report.aggregates.iter().map(|(e, a)| (e, None, a));
        let groups = report.aggregates.iter_groups().map(|(e, g, a)| (e, Some(g), a));
        markers.extend(
            scopes
                .chain(groups)
                .filter_map(|(entity, group, agg)| RunMarker::for_aggregate(entity, group, agg)),
        );
        for alert in &alerts {
            if let AlertStatus::Failed { reason } = &alert.status {
                markers.push(RunMarker::DeliveryFailed {
                    subject: alert.subject.clone(),
                    reason: reason.clone(),
                });
            }
        }

        report.summary.rows_read = rows_read;
        report.summary.records_ingested = classified.records.len();
        report.summary.records_quarantined = quarantined.len();
        report.summary.records_outside_window = outside_window;
        report.summary.unknown_code_records = classified.unknown_count;
        report.summary.channel = self.dispatcher.channel_name().to_string();
        report.summary.count_alerts(&alerts);
        report.quarantine = QuarantineSummary {
            count: quarantined.len(),
            sample: quarantined
                .into_iter()
                .take(self.config.source.quarantine_sample_limit)
                .collect(),
        };
        report.alerts = alerts;
        report.markers = markers;

        log_event!(
            ctx,
            INFO,
            event_names::RUN_FINISHED,
            Stage::Report,
            "run finished",
            alerts_sent = report.summary.alerts_sent,
            alerts_suppressed = report.summary.alerts_suppressed,
            alerts_failed = report.summary.alerts_failed,
            markers = report.markers.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{FailingChannel, RecordingChannel};
    use crate::source::MemorySource;
    use chrono::NaiveDate;
    use mlr_common::{AggregateKey, Category, ClaimRecord, EntityType, Error};
    use std::sync::Arc;
    use std::time::Duration;

    fn reference() -> BenefitReference {
        BenefitReference::from_pairs([("D1", Category::Dental), ("S1", Category::Surgery)])
    }

    fn record(id: &str, code: &str, paid: f64, billed: f64) -> ClaimRecord {
        let date = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        ClaimRecord::new(id, code, paid, billed, date, EntityType::Claim)
    }

    fn pipeline(dispatcher: Dispatcher) -> Pipeline {
        Pipeline::new(
            MlrConfig::default(),
            ConfigSnapshot::defaults_only(),
            reference(),
            dispatcher,
        )
    }

    fn sources(records: Vec<ClaimRecord>) -> Vec<Box<dyn DataSource>> {
        vec![Box::new(MemorySource::new("memory", records))]
    }

    #[test]
    fn unknown_codes_become_other_with_marker() {
        let channel = Arc::new(RecordingChannel::new());
        let p = pipeline(Dispatcher::new(channel, Duration::from_secs(5)));
        let report = p
            .run(
                RunId::new(),
                &sources(vec![record("1", "ZZZ", 10.0, 100.0)]),
                &DateWindow::unbounded(),
                &mut AlertLedger::new(),
            )
            .unwrap();
        let other = report.aggregates.claims.get(Category::Other.into()).unwrap();
        assert_eq!(other.record_count, 1);
        assert!(matches!(
            report.markers[0],
            RunMarker::UnknownBenefitCodes { count: 1, .. }
        ));
        assert!(report.alerts.is_empty());
    }

    #[test]
    fn unavailable_source_aborts() {
        let p = pipeline(Dispatcher::new(
            Arc::new(RecordingChannel::new()),
            Duration::from_secs(5),
        ));
        let sources: Vec<Box<dyn DataSource>> = vec![
            Box::new(MemorySource::new("ok", vec![record("1", "D1", 90.0, 100.0)])),
            Box::new(MemorySource::unavailable("db", "connection refused")),
        ];
        let mut ledger = AlertLedger::new();
        let err = p
            .run(RunId::new(), &sources, &DateWindow::unbounded(), &mut ledger)
            .unwrap_err();
        assert!(matches!(err, Error::DataSourceUnavailable { .. }));
        assert!(ledger.is_empty());
    }

    #[test]
    fn failed_delivery_is_recorded_not_fatal() {
        let p = pipeline(Dispatcher::new(
            Arc::new(FailingChannel::new("relay down")),
            Duration::from_secs(5),
        ));
        let mut ledger = AlertLedger::new();
        let report = p
            .run(
                RunId::new(),
                &sources(vec![record("1", "D1", 90.0, 100.0)]),
                &DateWindow::unbounded(),
                &mut ledger,
            )
            .unwrap();
        assert_eq!(report.alerts.len(), 2);
        assert!(report
            .alerts
            .iter()
            .all(|a| matches!(a.status, AlertStatus::Failed { .. })));
        assert_eq!(report.summary.alerts_failed, 2);
        assert!(ledger.is_empty());
        assert_eq!(
            report
                .markers
                .iter()
                .filter(|m| matches!(m, RunMarker::DeliveryFailed { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn indeterminate_marker_only_for_populated_scopes() {
        let p = pipeline(Dispatcher::new(
            Arc::new(RecordingChannel::new()),
            Duration::from_secs(5),
        ));
        let report = p
            .run(
                RunId::new(),
                &sources(vec![record("1", "S1", 40.0, 0.0)]),
                &DateWindow::unbounded(),
                &mut AlertLedger::new(),
            )
            .unwrap();
        let indeterminate: Vec<_> = report
            .markers
            .iter()
            .filter(|m| matches!(m, RunMarker::Indeterminate { .. }))
            .collect();
        // claims overall and claims surgery
        assert_eq!(indeterminate.len(), 2);
        assert!(report.alerts.is_empty());
    }

    #[test]
    fn overflowing_amounts_never_alert() {
        let channel = Arc::new(RecordingChannel::new());
        let p = pipeline(Dispatcher::new(channel.clone(), Duration::from_secs(5)));
        let report = p
            .run(
                RunId::new(),
                &sources(vec![
                    record("1", "D1", 1e308, 100.0).with_group("Acme"),
                    record("2", "D1", 1e308, 100.0).with_group("Acme"),
                ]),
                &DateWindow::unbounded(),
                &mut AlertLedger::new(),
            )
            .unwrap();
        let overflowed: Vec<_> = report
            .markers
            .iter()
            .filter_map(|m| match m {
                RunMarker::NonFiniteSums { key, group, .. } => Some((*key, group.clone())),
                _ => None,
            })
            .collect();
        // claims overall, dental and the Acme group
        assert_eq!(overflowed.len(), 3);
        assert!(overflowed.contains(&(AggregateKey::Overall, Some("Acme".to_string()))));
        assert!(report.alerts.is_empty());
        assert!(channel.messages().is_empty());
    }
}

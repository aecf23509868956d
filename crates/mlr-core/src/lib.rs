//! MLR Watch Core Library
//!
//! This library computes medical loss ratios and raises threshold alerts:
//! - Benefit classification of claim and PA lines
//! - Data sources with row validation and quarantine
//! - Single-pass ratio aggregation per entity type and category
//! - Threshold band evaluation, alert deduplication and notification
//! - Utilization metrics and the run report
//!
//! The binary entry point is in `main.rs`.

pub mod aggregate;
pub mod alert;
pub mod classify;
pub mod config;
pub mod exit_codes;
pub mod ledger;
pub mod logging;
pub mod notify;
pub mod pipeline;
pub mod report;
pub mod schema;
pub mod source;
pub mod threshold;
pub mod utilization;

pub use aggregate::{aggregate, AggregateSet, CategoryAggregate};
pub use alert::{evaluate_all, AlertEvent, AlertStatus, AlertSubject};
pub use classify::{classify, classify_records, BenefitReference, ClassifiedRecord};
pub use ledger::AlertLedger;
pub use notify::{Dispatcher, DispatchResult, NotificationChannel};
pub use pipeline::{deduplicate_and_dispatch, Pipeline};
pub use report::{RunMarker, RunReport};
pub use source::{DataSource, DateWindow, FileSource, MemorySource};
pub use threshold::evaluate;

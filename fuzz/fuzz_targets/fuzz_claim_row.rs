//! Fuzz target for claim row validation.
//!
//! Tests that `RawClaimRow::into_record` handles arbitrary cell contents
//! without panicking and never admits a row with a negative or non-finite
//! amount.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use mlr_common::{EntityType, RawClaimRow};

#[derive(Debug, Arbitrary)]
struct Row {
    id: Option<String>,
    benefit_code: Option<String>,
    amount_paid: Option<String>,
    amount_billed: Option<String>,
    date: Option<String>,
    entity_type: Option<String>,
    pa_default: bool,
}

fuzz_target!(|row: Row| {
    let raw = RawClaimRow {
        id: row.id,
        benefit_code: row.benefit_code,
        amount_paid: row.amount_paid,
        amount_billed: row.amount_billed,
        date: row.date,
        entity_type: row.entity_type,
        ..RawClaimRow::default()
    };
    let default_entity = if row.pa_default {
        EntityType::Pa
    } else {
        EntityType::Claim
    };
    if let Ok(record) = raw.into_record(1, Some(default_entity)) {
        assert!(record.amount_paid.is_finite() && record.amount_paid >= 0.0);
        assert!(record.amount_billed.is_finite() && record.amount_billed >= 0.0);
    }
});

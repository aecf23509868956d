//! Fuzz target for benefit reference parsing.
//!
//! Tests that both the CSV and the JSON reference readers handle arbitrary
//! input without panicking, and that classification of any code against a
//! parsed reference is total.

#![no_main]

use libfuzzer_sys::fuzz_target;
use mlr_core::classify::{classify, BenefitReference};

fuzz_target!(|data: &[u8]| {
    if let Ok(reference) = BenefitReference::from_csv_reader(data) {
        let _ = classify("D100", &reference);
    }
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(reference) = BenefitReference::from_json_str(text) {
            let _ = classify(text, &reference);
        }
    }
});

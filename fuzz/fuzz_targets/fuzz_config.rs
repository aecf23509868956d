//! Fuzz target for mlr.toml parsing and validation.
//!
//! Tests that TOML parsing and semantic validation handle arbitrary input
//! without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use mlr_config::{validate_config, MlrConfig};

fuzz_target!(|data: &str| {
    if let Ok(config) = MlrConfig::parse_toml(data) {
        let _ = validate_config(&config);
    }
});

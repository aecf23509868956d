//! MLR Watch common types, IDs, and errors.
//!
//! This crate provides foundational types shared across the workspace:
//! - Claim/PA record types and row validation
//! - Benefit categories and aggregate keys
//! - Run identifiers
//! - Common error types
//! - Output format specifications

pub mod category;
pub mod error;
pub mod id;
pub mod output;
pub mod record;

pub use category::{AggregateKey, Category};
pub use error::{Error, ErrorCategory, Result, StructuredError, SuggestedAction};
pub use id::RunId;
pub use output::OutputFormat;
pub use record::{ClaimRecord, EntityType, RawClaimRow, RowDefect};

/// Schema version for run reports and persisted ledgers.
pub const SCHEMA_VERSION: &str = "1.0.0";

//! Event vocabulary shared by the pipeline and the JSONL layer.
//!
//! Every line carries the run ID and the stage that produced it; the
//! event name travels as the tracing target.

use serde::{Deserialize, Serialize};

/// Step of one computation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Init,
    /// Claims/PA rows and the benefit reference.
    Ingest,
    Classify,
    Aggregate,
    /// Ratios against threshold bands, then ledger dedup.
    Evaluate,
    Dispatch,
    Report,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Init,
        Stage::Ingest,
        Stage::Classify,
        Stage::Aggregate,
        Stage::Evaluate,
        Stage::Dispatch,
        Stage::Report,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::Ingest => "ingest",
            Stage::Classify => "classify",
            Stage::Aggregate => "aggregate",
            Stage::Evaluate => "evaluate",
            Stage::Dispatch => "dispatch",
            Stage::Report => "report",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable event names. Log shippers key on these; do not rename.
pub mod event_names {
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";

    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_DEFAULT_USED: &str = "config.default_used";

    pub const SOURCE_LOADED: &str = "source.loaded";
    pub const SOURCE_QUARANTINED: &str = "source.quarantined";
    pub const REFERENCE_LOADED: &str = "reference.loaded";

    pub const CLASSIFY_FINISHED: &str = "classify.finished";
    pub const AGGREGATE_FINISHED: &str = "aggregate.finished";

    pub const EVALUATE_BAND_CROSSED: &str = "evaluate.band_crossed";
    pub const ALERT_SUPPRESSED: &str = "alert.suppressed";

    pub const DISPATCH_SENT: &str = "dispatch.sent";
    pub const DISPATCH_FAILED: &str = "dispatch.failed";

    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// Per-run values stamped onto every `log_event!`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogContext {
    pub run_id: String,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_display_matches_serde() {
        for stage in Stage::ALL {
            let json = serde_json::to_string(&stage).unwrap();
            assert_eq!(json, format!("\"{}\"", stage));
        }
    }

    #[test]
    fn event_names_are_dotted_by_stage() {
        let names = [
            event_names::SOURCE_LOADED,
            event_names::CLASSIFY_FINISHED,
            event_names::AGGREGATE_FINISHED,
            event_names::DISPATCH_FAILED,
        ];
        for name in names {
            let (prefix, rest) = name.split_once('.').unwrap();
            assert!(!prefix.is_empty() && !rest.is_empty(), "{name}");
        }
    }
}

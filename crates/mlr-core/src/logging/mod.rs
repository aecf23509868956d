//! Logging for mlr-core.
//!
//! stdout belongs to the run report, so every log line goes to stderr,
//! either through the `tracing-subscriber` fmt layer ([`LogFormat::Human`])
//! or as JSONL ([`LogFormat::Jsonl`]) for schedulers and log shippers.
//!
//! ```ignore
//! let config = LogConfig::from_env(LogLevel::from_verbosity(1, false), None);
//! init_logging(&config);
//!
//! let ctx = LogContext::new(run_id.as_str());
//! log_event!(ctx, INFO, event_names::RUN_STARTED, Stage::Init, "starting run");
//! ```

pub mod config;
pub mod events;
pub mod layer;

pub use config::{LogConfig, LogFormat, LogLevel};
pub use events::{event_names, LogContext, Stage};
pub use layer::JsonlLayer;

use std::io::IsTerminal;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Build the filter: `MLR_LOG` directives, else `RUST_LOG`, else the level.
fn build_filter(config: &LogConfig) -> EnvFilter {
    let builder =
        EnvFilter::builder().with_default_directive(LevelFilter::from(config.level).into());
    match &config.directives {
        Some(directives) => builder.parse_lossy(directives),
        None => builder.from_env_lossy(),
    }
}

/// Install the global subscriber. Later calls leave the first one in place.
pub fn init_logging(config: &LogConfig) {
    let registry = tracing_subscriber::registry().with(build_filter(config));
    let _ = match config.format {
        LogFormat::Human => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(std::io::stderr().is_terminal()),
            )
            .try_init(),
        LogFormat::Jsonl => registry.with(JsonlLayer::stderr()).try_init(),
    };
}

/// Emit an event stamped with the run ID and stage.
///
/// The level is one of `TRACE`, `DEBUG`, `INFO`, `WARN`, `ERROR`; the event
/// name becomes the tracing target. Extra fields follow the message:
///
/// ```ignore
/// log_event!(ctx, INFO, event_names::SOURCE_LOADED, Stage::Ingest, "loaded rows",
///     rows = 120, source = %path.display());
/// ```
#[macro_export]
macro_rules! log_event {
    ($ctx:expr, $level:ident, $event:expr, $stage:expr, $msg:expr $(, $($field:tt)+)?) => {
        tracing::event!(
            target: $event,
            tracing::Level::$level,
            run_id = %$ctx.run_id,
            stage = %$stage,
            $($($field)+,)?
            message = %$msg,
        )
    };
}

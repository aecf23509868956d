//! MLR Watch Core - loss-ratio computation and threshold alerting
//!
//! The main entry point for mlr-core, handling:
//! - Full computation runs over claim and PA extracts
//! - Configuration checks and inspection
//! - JSON Schema output for report consumers

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use mlr_common::{EntityType, Error, OutputFormat, RunId, StructuredError, SCHEMA_VERSION};
use mlr_core::classify::BenefitReference;
use mlr_core::config::{load_config, LoadedConfig};
use mlr_core::exit_codes::ExitCode;
use mlr_core::ledger::AlertLedger;
use mlr_core::log_event;
use mlr_core::logging::{event_names, init_logging, LogConfig, LogContext, LogLevel, Stage};
use mlr_core::notify::build_dispatcher;
use mlr_core::pipeline::Pipeline;
use mlr_core::schema::{available_schemas, generate_all_schemas, generate_schema};
use mlr_core::source::{DataSource, DateWindow, FileSource};

/// MLR Watch Core - medical loss ratio monitoring
#[derive(Parser)]
#[command(name = "mlr-core")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Path to mlr.toml (overrides MLR_CONFIG and config directories)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute ratios, evaluate thresholds and dispatch alerts
    Run(RunArgs),

    /// Resolve, load and validate configuration
    Check,

    /// Configuration management
    Config(ConfigArgs),

    /// Print JSON Schemas of report types
    Schema(SchemaArgs),

    /// Print version information
    Version,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Claims extract (CSV or JSON Lines); rows default to entity type `claim`
    #[arg(long, value_name = "FILE", required_unless_present = "pa")]
    claims: Vec<PathBuf>,

    /// PA extract (CSV or JSON Lines); rows default to entity type `pa`
    #[arg(long, value_name = "FILE")]
    pa: Vec<PathBuf>,

    /// Benefit reference (CSV `benefit_group,procedure_code` or JSON object)
    #[arg(long, value_name = "FILE")]
    reference: PathBuf,

    /// First day of the window (inclusive)
    #[arg(long, value_name = "DATE", value_parser = parse_date_arg)]
    from: Option<NaiveDate>,

    /// Last day of the window (inclusive)
    #[arg(long, value_name = "DATE", value_parser = parse_date_arg)]
    to: Option<NaiveDate>,

    /// Evaluate and report but only log alerts; the ledger is read, never written
    #[arg(long)]
    no_notify: bool,

    /// Persist the alert ledger here for cross-run suppression
    #[arg(long, value_name = "FILE")]
    ledger: Option<PathBuf>,

    /// Append alerts to this JSONL outbox instead of the configured channel
    #[arg(long, value_name = "FILE")]
    outbox: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show the effective configuration and its snapshot
    Show,
}

#[derive(Args, Debug)]
struct SchemaArgs {
    /// Type name (default: RunReport)
    type_name: Option<String>,

    /// List available schema types
    #[arg(long)]
    list: bool,

    /// Print every schema
    #[arg(long, conflicts_with = "type_name")]
    all: bool,
}

fn parse_date_arg(value: &str) -> Result<NaiveDate, String> {
    mlr_common::record::parse_date(value)
        .ok_or_else(|| format!("invalid date {:?} (expected YYYY-MM-DD)", value))
}

fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::from_env(
        LogLevel::from_verbosity(cli.global.verbose, cli.global.quiet),
        None,
    );
    init_logging(&log_config);

    let exit_code = match &cli.command {
        Commands::Run(args) => run_pipeline(&cli.global, args),
        Commands::Check => run_check(&cli.global),
        Commands::Config(args) => match args.command {
            ConfigCommands::Show => run_config_show(&cli.global),
        },
        Commands::Schema(args) => run_schema(args),
        Commands::Version => {
            print_version(&cli.global);
            ExitCode::Clean
        }
    };

    std::process::exit(exit_code.as_i32());
}

// ============================================================================
// Command implementations
// ============================================================================

fn run_pipeline(global: &GlobalOpts, args: &RunArgs) -> ExitCode {
    let run_id = RunId::new();
    let ctx = LogContext::new(run_id.as_str());

    let loaded = match load(global) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    let config = &loaded.config;

    let window = match DateWindow::new(
        args.from.or(config.source.from),
        args.to.or(config.source.to),
    ) {
        Ok(window) => window,
        Err(e) => return fail(global, &e),
    };

    let reference = match BenefitReference::load(&args.reference) {
        Ok(reference) => reference,
        Err(e) => return fail(global, &e),
    };
    log_event!(
        ctx,
        INFO,
        event_names::REFERENCE_LOADED,
        Stage::Ingest,
        "benefit reference loaded",
        path = %args.reference.display(),
        codes = reference.len(),
        conflicts = reference.conflicts()
    );

    let dispatcher = match build_dispatcher(&config.notify, !args.no_notify, args.outbox.as_deref())
    {
        Ok(dispatcher) => dispatcher,
        Err(e) => return fail(global, &Error::Config(e.to_string())),
    };

    let dry_run = dispatcher.is_dry_run();
    let mut ledger = match args.ledger.as_deref().map(AlertLedger::load) {
        None => AlertLedger::new(),
        Some(Ok(ledger)) => ledger,
        Some(Err(e)) => return fail(global, &Error::from(e)),
    };

    let sources = build_sources(args);
    let pipeline = Pipeline::new(
        config.clone(),
        loaded.snapshot.clone(),
        reference,
        dispatcher,
    );
    let report = match pipeline.run(run_id, &sources, &window, &mut ledger) {
        Ok(report) => report,
        Err(e) => return fail(global, &e),
    };

    let mut exit_code = report.exit_code();
    if let Some(path) = args.ledger.as_ref().filter(|_| !dry_run) {
        if let Err(e) = ledger.save(path) {
            log_event!(
                ctx,
                ERROR,
                event_names::INTERNAL_ERROR,
                Stage::Report,
                "could not persist alert ledger",
                path = %path.display(),
                error = %e
            );
            exit_code = ExitCode::IoError;
        }
    }

    match report.render(global.format) {
        Ok(rendered) => print!("{}", ensure_newline(rendered)),
        Err(e) => return fail(global, &Error::Json(e)),
    }
    exit_code
}

fn build_sources(args: &RunArgs) -> Vec<Box<dyn DataSource>> {
    let claims = args
        .claims
        .iter()
        .map(|p| (p, EntityType::Claim));
    let pa = args.pa.iter().map(|p| (p, EntityType::Pa));
    claims
        .chain(pa)
        .map(|(path, entity)| {
            Box::new(FileSource::new(path.clone()).with_default_entity(entity)) as Box<dyn DataSource>
        })
        .collect()
}

fn run_check(global: &GlobalOpts) -> ExitCode {
    let loaded = match load(global) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    let snapshot = &loaded.snapshot;
    match global.format {
        OutputFormat::Json | OutputFormat::Jsonl => {
            let output = serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "status": "ok",
                "source": snapshot.source,
                "path": snapshot.path,
                "effective_hash": snapshot.effective_hash,
                "bands": snapshot.summary.bands,
                "channel": snapshot.summary.channel,
                "notify_enabled": snapshot.summary.notify_enabled,
            });
            print_json(global, &output);
        }
        _ => {
            println!(
                "config ok: {} ({}), {} band(s), channel {}",
                snapshot.path.as_deref().unwrap_or("builtin defaults"),
                snapshot.source,
                snapshot.summary.bands.len(),
                snapshot.summary.channel
            );
        }
    }
    ExitCode::Clean
}

fn run_config_show(global: &GlobalOpts) -> ExitCode {
    let loaded = match load(global) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    match global.format {
        OutputFormat::Json | OutputFormat::Jsonl => {
            let output = serde_json::json!({
                "config": loaded.config,
                "snapshot": loaded.snapshot,
            });
            print_json(global, &output);
        }
        _ => match loaded.config.to_toml() {
            Ok(toml) => {
                println!("# source: {}", loaded.snapshot.source);
                print!("{}", ensure_newline(toml));
            }
            Err(e) => return fail(global, &Error::Config(e.to_string())),
        },
    }
    ExitCode::Clean
}

fn run_schema(args: &SchemaArgs) -> ExitCode {
    if args.list {
        for (name, description) in available_schemas() {
            println!("{:<20} {}", name, description);
        }
        return ExitCode::Clean;
    }
    let value = if args.all {
        match serde_json::to_value(generate_all_schemas()) {
            Ok(value) => value,
            Err(e) => {
                eprintln!("mlr-core schema: {}", e);
                return ExitCode::InternalError;
            }
        }
    } else {
        let name = args.type_name.as_deref().unwrap_or("RunReport");
        match generate_schema(name) {
            Some(value) => value,
            None => {
                eprintln!(
                    "mlr-core schema: unknown type {:?} (see --list)",
                    name
                );
                return ExitCode::ArgsError;
            }
        }
    };
    match serde_json::to_string_pretty(&value) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::Clean
        }
        Err(e) => {
            eprintln!("mlr-core schema: {}", e);
            ExitCode::InternalError
        }
    }
}

fn print_version(global: &GlobalOpts) {
    let version_info = serde_json::json!({
        "schema_version": SCHEMA_VERSION,
        "mlr_core_version": env!("CARGO_PKG_VERSION"),
        "webhook": cfg!(feature = "webhook"),
    });

    match global.format {
        OutputFormat::Json | OutputFormat::Jsonl => print_json(global, &version_info),
        _ => {
            println!("mlr-core {}", env!("CARGO_PKG_VERSION"));
            println!("schema version: {}", SCHEMA_VERSION);
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn load(global: &GlobalOpts) -> Result<LoadedConfig, ExitCode> {
    load_config(global.config.as_deref()).map_err(|e| fail(global, &Error::from(e)))
}

/// Report an error and map it to an exit code.
///
/// Machine formats get a structured error on stdout; everything else gets the
/// human rendering on stderr.
fn fail(global: &GlobalOpts, err: &Error) -> ExitCode {
    tracing::error!(target: event_names::INTERNAL_ERROR, code = err.code(), error = %err, "command failed");
    if global.format.is_machine() {
        let structured = StructuredError::from(err);
        match global.format {
            OutputFormat::Jsonl => println!("{}", structured.to_json()),
            _ => println!("{}", structured.to_json_pretty()),
        }
    } else {
        eprintln!("{}", err.format_human());
    }
    ExitCode::for_error(err)
}

fn print_json(global: &GlobalOpts, value: &serde_json::Value) {
    let rendered = match global.format {
        OutputFormat::Jsonl => serde_json::to_string(value),
        _ => serde_json::to_string_pretty(value),
    };
    match rendered {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("mlr-core: cannot render output: {}", e),
    }
}

fn ensure_newline(mut text: String) -> String {
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

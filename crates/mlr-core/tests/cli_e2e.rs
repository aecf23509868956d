//! End-to-end CLI tests for mlr-core.
//!
//! Every test writes its own config, reference and extracts into a temp
//! directory and passes `--config` explicitly so no host configuration
//! leaks in.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

/// Get a Command for mlr-core binary.
fn mlr_core() -> Command {
    let mut cmd = Command::cargo_bin("mlr-core").expect("mlr-core binary should exist");
    cmd.env_remove("MLR_CONFIG")
        .env_remove("MLR_CONFIG_DIR")
        .env_remove("MLR_LOG");
    cmd
}

const REFERENCE_CSV: &str = "\
benefit_group,procedure_code
dentistry,D100
surgeries,SRG-10
chronic medication,CHR001
";

/// Dental 90/100 (critical), surgery 20/30 (watch), overall 110/130 (warning).
const CLAIMS_CSV: &str = "\
id,benefit_code,amount_paid,amount_billed,date
c1,D100,90,100,2025-01-05
c2,SRG-10,20,30,2025-01-06
";

const CONFIG_TOML: &str = "\
[notify]
enabled = true
channel = \"log\"
recipients = [\"ops@example.com\"]
subject_prefix = \"[test] \"
";

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let fixture = Self {
            dir: TempDir::new().expect("tempdir"),
        };
        fixture.write("mlr.toml", CONFIG_TOML);
        fixture.write("reference.csv", REFERENCE_CSV);
        fixture.write("claims.csv", CLAIMS_CSV);
        fixture
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path(name);
        fs::write(&path, content).expect("write fixture");
        path
    }

    /// `mlr-core --config <tmp>/mlr.toml run --claims ... --reference ...`
    fn run(&self) -> Command {
        let mut cmd = mlr_core();
        cmd.arg("--config")
            .arg(self.path("mlr.toml"))
            .arg("run")
            .arg("--claims")
            .arg(self.path("claims.csv"))
            .arg("--reference")
            .arg(self.path("reference.csv"));
        cmd
    }
}

fn parse_report(stdout: &[u8]) -> Value {
    serde_json::from_slice(stdout).expect("stdout should be a JSON report")
}

fn outbox_lines(path: &Path) -> Vec<Value> {
    fs::read_to_string(path)
        .expect("outbox should exist")
        .lines()
        .map(|l| serde_json::from_str(l).expect("outbox line is JSON"))
        .collect()
}

// ============================================================================
// run
// ============================================================================

mod run {
    use super::*;

    #[test]
    fn crossing_bands_dispatches_to_outbox_and_exits_one() {
        let fx = Fixture::new();
        let outbox = fx.path("outbox.jsonl");

        let output = fx
            .run()
            .arg("--outbox")
            .arg(&outbox)
            .assert()
            .code(1)
            .get_output()
            .stdout
            .clone();

        let report = parse_report(&output);
        assert_eq!(report["summary"]["alerts_sent"], 3);
        assert_eq!(report["summary"]["alerts_failed"], 0);
        assert_eq!(report["summary"]["records_ingested"], 2);

        let dental = &report["aggregates"]["claims"]["categories"]["dental"];
        assert_eq!(dental["ratio"].as_f64(), Some(90.0));
        assert_eq!(dental["indeterminate"], false);
        assert_eq!(report["aggregates"]["pa"]["overall"]["indeterminate"], true);

        let lines = outbox_lines(&outbox);
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|l| l["to"][0] == "ops@example.com"));
        assert!(lines
            .iter()
            .any(|l| l["subject"].as_str().unwrap_or("").starts_with("[test] MLR Alert:")));
    }

    #[test]
    fn ledger_suppresses_repeat_alerts_across_runs() {
        let fx = Fixture::new();
        let ledger = fx.path("state/ledger.json");
        let outbox = fx.path("outbox.jsonl");

        fx.run()
            .arg("--ledger")
            .arg(&ledger)
            .arg("--outbox")
            .arg(&outbox)
            .assert()
            .code(1);
        assert!(ledger.exists());

        let output = fx
            .run()
            .arg("--ledger")
            .arg(&ledger)
            .arg("--outbox")
            .arg(&outbox)
            .assert()
            .code(0)
            .get_output()
            .stdout
            .clone();

        let report = parse_report(&output);
        assert_eq!(report["summary"]["alerts_sent"], 0);
        assert_eq!(report["summary"]["alerts_suppressed"], 3);
        assert_eq!(outbox_lines(&outbox).len(), 3);
    }

    #[test]
    fn without_ledger_every_run_dispatches_again() {
        let fx = Fixture::new();
        let outbox = fx.path("outbox.jsonl");
        for _ in 0..2 {
            fx.run().arg("--outbox").arg(&outbox).assert().code(1);
        }
        assert_eq!(outbox_lines(&outbox).len(), 6);
    }

    #[test]
    fn no_notify_logs_alerts_without_writing_outbox() {
        let fx = Fixture::new();
        let outbox = fx.path("outbox.jsonl");
        let output = fx
            .run()
            .arg("--no-notify")
            .arg("--outbox")
            .arg(&outbox)
            .assert()
            .code(1)
            .get_output()
            .stdout
            .clone();

        let report = parse_report(&output);
        assert_eq!(report["summary"]["channel"], "log");
        assert!(!outbox.exists());
    }

    #[test]
    fn no_notify_run_leaves_ledger_for_the_real_run() {
        let fx = Fixture::new();
        let ledger = fx.path("ledger.json");
        let outbox = fx.path("outbox.jsonl");

        fx.run()
            .arg("--no-notify")
            .arg("--ledger")
            .arg(&ledger)
            .assert()
            .code(1);
        assert!(!ledger.exists());

        let output = fx
            .run()
            .arg("--outbox")
            .arg(&outbox)
            .arg("--ledger")
            .arg(&ledger)
            .assert()
            .code(1)
            .get_output()
            .stdout
            .clone();

        let report = parse_report(&output);
        assert_eq!(report["summary"]["alerts_sent"], 3);
        assert_eq!(report["summary"]["alerts_suppressed"], 0);
        assert_eq!(outbox_lines(&outbox).len(), 3);
        assert!(ledger.exists());
    }

    #[test]
    fn window_excludes_rows_outside_range() {
        let fx = Fixture::new();
        let output = fx
            .run()
            .args(["--from", "2025-01-06", "--to", "2025-01-31", "--no-notify"])
            .assert()
            .get_output()
            .stdout
            .clone();

        let report = parse_report(&output);
        assert_eq!(report["summary"]["records_ingested"], 1);
        assert_eq!(report["summary"]["records_outside_window"], 1);
        assert_eq!(
            report["aggregates"]["claims"]["categories"]["dental"]["indeterminate"],
            true
        );
    }

    #[test]
    fn unknown_codes_are_reported_not_fatal() {
        let fx = Fixture::new();
        fx.write(
            "claims.csv",
            "id,benefit_code,amount_paid,amount_billed,date\n\
             c1,ZZZ9,10,100,2025-01-05\n",
        );
        let output = fx
            .run()
            .arg("--no-notify")
            .assert()
            .code(0)
            .get_output()
            .stdout
            .clone();

        let report = parse_report(&output);
        assert_eq!(report["summary"]["unknown_code_records"], 1);
        let markers = report["markers"].as_array().expect("markers array");
        assert!(markers
            .iter()
            .any(|m| m["kind"] == "unknown_benefit_codes" && m["count"] == 1));
    }

    #[test]
    fn malformed_rows_are_quarantined() {
        let fx = Fixture::new();
        fx.write(
            "claims.csv",
            "id,benefit_code,amount_paid,amount_billed,date\n\
             c1,D100,90,100,2025-01-05\n\
             c2,D100,lots,100,2025-01-05\n",
        );
        let output = fx
            .run()
            .arg("--no-notify")
            .assert()
            .code(1)
            .get_output()
            .stdout
            .clone();

        let report = parse_report(&output);
        assert_eq!(report["quarantine"]["count"], 1);
        assert_eq!(report["summary"]["records_quarantined"], 1);
        assert_eq!(report["summary"]["records_ingested"], 1);
    }

    #[test]
    fn summary_format_is_one_line() {
        let fx = Fixture::new();
        fx.run()
            .args(["--no-notify", "--format", "summary"])
            .assert()
            .code(1)
            .stdout(predicate::str::contains("claims 84.62%"))
            .stdout(predicate::str::contains("pa n/a"));
    }

    #[test]
    fn markdown_format_has_tables() {
        let fx = Fixture::new();
        fx.run()
            .args(["--no-notify", "--format", "md"])
            .assert()
            .code(1)
            .stdout(predicate::str::contains("## Claims loss ratios"))
            .stdout(predicate::str::contains("| Dental | 90.00 | 100.00 |"));
    }

    #[test]
    fn jsonl_format_ends_with_summary_line() {
        let fx = Fixture::new();
        let output = fx
            .run()
            .args(["--no-notify", "--format", "jsonl"])
            .assert()
            .code(1)
            .get_output()
            .stdout
            .clone();

        let text = String::from_utf8(output).expect("utf8");
        let lines: Vec<Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).expect("jsonl line"))
            .collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[..3].iter().all(|l| l["type"] == "alert"));
        assert_eq!(lines[3]["type"], "summary");
        assert_eq!(lines[3]["exit_code"], 1);
    }
}

// ============================================================================
// Failures
// ============================================================================

mod failures {
    use super::*;

    #[test]
    fn missing_claims_file_exits_source_unavailable() {
        let fx = Fixture::new();
        let output = mlr_core()
            .arg("--config")
            .arg(fx.path("mlr.toml"))
            .arg("run")
            .arg("--claims")
            .arg(fx.path("nope.csv"))
            .arg("--reference")
            .arg(fx.path("reference.csv"))
            .assert()
            .code(11)
            .get_output()
            .stdout
            .clone();

        let err: Value = serde_json::from_slice(&output).expect("structured error");
        assert_eq!(err["code"], 20);
        assert_eq!(err["category"], "source");
    }

    #[test]
    fn inverted_window_exits_args_error() {
        let fx = Fixture::new();
        fx.run()
            .args(["--from", "2025-02-01", "--to", "2025-01-01"])
            .assert()
            .code(10);
    }

    #[test]
    fn bad_date_is_rejected_by_parser() {
        let fx = Fixture::new();
        fx.run()
            .args(["--from", "01/02/2025"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("invalid date"));
    }

    #[test]
    fn missing_config_file_exits_args_error() {
        let fx = Fixture::new();
        mlr_core()
            .arg("--config")
            .arg(fx.path("absent.toml"))
            .arg("check")
            .assert()
            .code(10);
    }

    #[test]
    fn overlapping_bands_are_rejected() {
        let fx = Fixture::new();
        fx.write(
            "mlr.toml",
            "[[thresholds.bands]]\nlower_bound = 70.0\nlabel = \"a\"\n\n\
             [[thresholds.bands]]\nlower_bound = 70.0\nlabel = \"b\"\n",
        );
        fx.run().assert().code(10);
    }

    #[test]
    fn missing_required_column_is_source_unavailable() {
        let fx = Fixture::new();
        fx.write("claims.csv", "id,benefit_code,amount_paid\nc1,D100,90\n");
        fx.run().arg("--no-notify").assert().code(11);
    }

    #[test]
    fn human_format_errors_go_to_stderr() {
        let fx = Fixture::new();
        mlr_core()
            .arg("--config")
            .arg(fx.path("mlr.toml"))
            .args(["--format", "summary", "run", "--claims"])
            .arg(fx.path("nope.csv"))
            .arg("--reference")
            .arg(fx.path("reference.csv"))
            .assert()
            .code(11)
            .stdout(predicate::str::is_empty())
            .stderr(predicate::str::contains("nope.csv"));
    }
}

// ============================================================================
// Other commands
// ============================================================================

mod commands {
    use super::*;

    #[test]
    fn check_reports_effective_config() {
        let fx = Fixture::new();
        let output = mlr_core()
            .arg("--config")
            .arg(fx.path("mlr.toml"))
            .arg("check")
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        let value: Value = serde_json::from_slice(&output).expect("json");
        assert_eq!(value["status"], "ok");
        assert_eq!(value["channel"], "log");
        assert_eq!(value["bands"].as_array().map(|b| b.len()), Some(3));
    }

    #[test]
    fn config_show_prints_toml_in_md_format() {
        let fx = Fixture::new();
        mlr_core()
            .arg("--config")
            .arg(fx.path("mlr.toml"))
            .args(["--format", "md", "config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("# source:"))
            .stdout(predicate::str::contains("subject_prefix = \"[test] \""));
    }

    #[test]
    fn schema_defaults_to_run_report() {
        mlr_core()
            .arg("schema")
            .assert()
            .success()
            .stdout(predicate::str::contains("RunReport"));
    }

    #[test]
    fn schema_list_names_types() {
        mlr_core()
            .args(["schema", "--list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("AlertEvent"));
    }

    #[test]
    fn schema_unknown_type_fails() {
        mlr_core().args(["schema", "Nope"]).assert().code(10);
    }

    #[test]
    fn version_reports_schema_version() {
        mlr_core()
            .arg("version")
            .assert()
            .success()
            .stdout(predicate::str::contains("schema_version"));
    }
}

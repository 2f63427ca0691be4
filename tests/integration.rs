//! End-to-end integration tests for the dmf CLI
//!
//! These tests run the `dmf` binary against `mock_kit`, which stands in for
//! both the Kit application and pytest, and verify:
//! 1. Exit codes of `dmf run`
//! 2. The statuses recorded in `report.json`
//! 3. Retry, iteration and freeze handling end to end

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::Value;

/// Test context with paths and cleanup
struct TestContext {
    /// Temporary directory for this test
    temp_dir: PathBuf,
    /// Path to the dmf binary
    dmf_bin: PathBuf,
    /// Path to dmf_config.toml for this test
    config_path: PathBuf,
    /// Results directory named in generated suites
    results_dir: PathBuf,
}

impl TestContext {
    /// Create a new test context
    fn new(test_name: &str) -> Self {
        let temp_dir = env::temp_dir().join("dmf-tests").join(test_name);

        // Clean up any previous test artifacts
        let _ = fs::remove_dir_all(&temp_dir);
        fs::create_dir_all(temp_dir.join("scripts")).expect("Failed to create temp dir");

        let mock = PathBuf::from(env!("CARGO_BIN_EXE_mock_kit"));
        let config_path = temp_dir.join("dmf_config.toml");
        fs::write(
            &config_path,
            format!(
                r#"
[timeouts]
launch_secs = 10
shutdown_secs = 10

[tools]
pytest = ["{mock}", "--pytest"]

[components.DSRS]
executable = "{mock}"
kit_file = ""
process_name = "mock_kit"
"#,
                mock = toml_path(&mock)
            ),
        )
        .expect("Failed to write config");

        Self {
            results_dir: temp_dir.join("results"),
            temp_dir,
            dmf_bin: PathBuf::from(env!("CARGO_BIN_EXE_dmf")),
            config_path,
        }
    }

    /// Create an (empty) scenario script
    fn script(&self, name: &str) {
        fs::write(
            self.temp_dir.join("scripts").join(name),
            "def test_open():\n    pass\n",
        )
        .expect("Failed to write script");
    }

    /// Write a suite file with the given [[tests]] tables
    fn suite(&self, tests: &str) -> PathBuf {
        let path = self.temp_dir.join("suite.toml");
        fs::write(
            &path,
            format!(
                r#"
[suite]
name = "integration"
description = "mock kit suite"

[environment]
results_dir = "results"
scripts_dir = "scripts"

[flags]
kill_existing = false

{}
"#,
                tests
            ),
        )
        .expect("Failed to write suite");
        path
    }

    /// Run dmf with the test config
    fn run(&self, args: &[&str]) -> DmfOutput {
        let output = Command::new(&self.dmf_bin)
            .args(args)
            .arg("--config")
            .arg(&self.config_path)
            .env("RUST_LOG", "dmf=debug")
            .env("NO_COLOR", "1")
            .output()
            .expect("Failed to run dmf");

        DmfOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            code: output.status.code(),
        }
    }

    /// Run a suite for DSRS with extra arguments
    fn run_suite(&self, suite: &Path, extra: &[&str]) -> DmfOutput {
        let suite = suite.display().to_string();
        let mut args = vec!["run", suite.as_str(), "--component", "dsrs"];
        args.extend_from_slice(extra);
        self.run(&args)
    }

    /// The single run directory created under the results directory
    fn run_dir(&self) -> PathBuf {
        let mut dirs: Vec<PathBuf> = fs::read_dir(&self.results_dir)
            .expect("No results directory")
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_dir())
            .collect();
        assert_eq!(dirs.len(), 1, "expected one run directory: {:?}", dirs);
        dirs.remove(0)
    }

    fn report(&self) -> Value {
        let path = self.run_dir().join("report.json");
        serde_json::from_slice(&fs::read(&path).expect("report.json missing"))
            .expect("Invalid report.json")
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        if env::var("PRESERVE_DMF_TEST_ARTIFACTS").is_err() {
            let _ = fs::remove_dir_all(&self.temp_dir);
        }
    }
}

struct DmfOutput {
    stdout: String,
    stderr: String,
    code: Option<i32>,
}

impl DmfOutput {
    fn assert_code(&self, code: i32) {
        assert_eq!(
            self.code,
            Some(code),
            "stdout:\n{}\nstderr:\n{}",
            self.stdout,
            self.stderr
        );
    }
}

/// Path formatted for a TOML basic string
fn toml_path(path: &Path) -> String {
    path.display().to_string().replace('\\', "\\\\")
}

fn statuses(report: &Value) -> Vec<(String, String)> {
    report["tests"]
        .as_array()
        .expect("tests array")
        .iter()
        .map(|t| {
            (
                t["test"]["name"].as_str().unwrap().to_string(),
                t["result"]["status"].as_str().unwrap().to_string(),
            )
        })
        .collect()
}

fn pairs(expected: &[(&str, &str)]) -> Vec<(String, String)> {
    expected
        .iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect()
}

#[test]
fn test_passing_suite() {
    let ctx = TestContext::new("passing_suite");
    ctx.script("test_open_stage.py");
    let suite = ctx.suite(
        r#"
[[tests]]
name = "boot"
kind = "launch"

[[tests]]
name = "open_stage"
kind = "ui"
script = "test_open_stage.py"
"#,
    );

    let output = ctx.run_suite(&suite, &[]);
    output.assert_code(0);
    assert!(output.stdout.contains("PASSED"));

    let report = ctx.report();
    assert_eq!(report["passed"], true);
    assert_eq!(report["component"], "DSRS");
    assert_eq!(report["summary"]["completed"], 2);
    assert_eq!(
        statuses(&report),
        pairs(&[("boot", "COMPLETED"), ("open_stage", "COMPLETED")])
    );

    let ui = &report["tests"][1]["result"];
    assert_eq!(ui["verdicts"]["launch"], true);
    assert_eq!(ui["verdicts"]["scenario"], true);
    assert_eq!(ui["metrics"]["pytest"]["passed"], 2);
    assert!(ui["verdicts"]["log-warnings"].as_u64().unwrap() >= 1);

    let run_dir = ctx.run_dir();
    assert!(run_dir.join("report.txt").exists());
    assert!(run_dir.join("dmf.log").exists());
    let test_dir = run_dir.join("02_open_stage");
    assert!(test_dir.join("test_report.json").exists());
    assert!(test_dir.join("kit.log").exists());
    let scenario = fs::read_to_string(test_dir.join("scenario.log")).unwrap();
    assert!(scenario.contains("automation endpoint http://127.0.0.1:8211"));
}

#[test]
fn test_failing_scenario_is_retried() {
    let ctx = TestContext::new("failing_scenario");
    ctx.script("test_fail_save.py");
    let suite = ctx.suite(
        r#"
[[tests]]
name = "save_stage"
kind = "ui"
script = "test_fail_save.py"
"#,
    );

    let output = ctx.run_suite(&suite, &[]);
    output.assert_code(1);

    let report = ctx.report();
    assert_eq!(report["passed"], false);
    assert_eq!(
        statuses(&report),
        pairs(&[
            ("save_stage", "RETRY"),
            ("save_stage", "RETRY"),
            ("save_stage", "FAILED"),
        ])
    );
    let attempts: Vec<u64> = report["tests"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["test"]["attempt"].as_u64().unwrap())
        .collect();
    assert_eq!(attempts, vec![1, 2, 3]);
    assert!(ctx.run_dir().join("03_save_stage_attempt3").exists());

    let text = fs::read_to_string(ctx.run_dir().join("report.txt")).unwrap();
    assert!(text.contains("1 failed, 1 passed") || text.contains("1 passed, 1 failed"));
}

#[test]
fn test_freeze_skips_rest_of_block() {
    let ctx = TestContext::new("freeze_block");
    let suite = ctx.suite(
        r#"
[[tests]]
name = "hang"
kind = "launch"
block = "stage"
timeout_secs = 2
app_args = ["--mode", "hang"]

[[tests]]
name = "after_hang"
kind = "launch"
block = "stage"

[[tests]]
name = "other_block"
kind = "launch"
"#,
    );

    let output = ctx.run_suite(&suite, &[]);
    output.assert_code(1);

    let report = ctx.report();
    assert_eq!(
        statuses(&report),
        pairs(&[
            ("hang", "FAILED"),
            ("after_hang", "SKIPPED"),
            ("other_block", "COMPLETED"),
        ])
    );
    assert!(report["tests"][1]["result"]["error"]
        .as_str()
        .unwrap()
        .contains("froze"));
    assert_eq!(report["passed"], false);
    assert_eq!(report["summary"]["retried"], 0);
}

#[test]
fn test_suite_loading_warnings_are_logged() {
    let ctx = TestContext::new("loading_warnings");
    let suite = ctx.suite(
        r#"
[credentials]
username_env = "DMF_INTEGRATION_UNSET_USER"

[[tests]]
name = "boot"
kind = "launch"
"#,
    );

    let output = ctx.run_suite(&suite, &[]);
    output.assert_code(0);
    assert!(
        output
            .stderr
            .contains("Credential variable DMF_INTEGRATION_UNSET_USER is not set"),
        "stderr:\n{}",
        output.stderr
    );
}

#[test]
fn test_crash_marker_fails_launch() {
    let ctx = TestContext::new("crash_marker");
    let suite = ctx.suite(
        r#"
[[tests]]
name = "crash"
kind = "launch"
app_args = ["--mode", "crash"]

[tests.flags]
retry_on_failure = false
"#,
    );

    ctx.run_suite(&suite, &[]).assert_code(1);
    let result = &ctx.report()["tests"][0]["result"];
    assert_eq!(result["verdicts"]["launch"], false);
    assert!(result["error"].as_str().unwrap().contains("simulated crash"));
}

#[test]
fn test_iterate_and_only() {
    let ctx = TestContext::new("iterate_only");
    ctx.script("test_a.py");
    let suite = ctx.suite(
        r#"
[[tests]]
name = "first"
kind = "cli"
script = "test_a.py"

[[tests]]
name = "second"
kind = "cli"
script = "test_a.py"
"#,
    );

    ctx.run_suite(&suite, &["--iterate", "3", "--only", "second"])
        .assert_code(0);

    let report = ctx.report();
    assert_eq!(report["iterate"], 3);
    let iterations: Vec<u64> = report["tests"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["test"]["iteration"].as_u64().unwrap())
        .collect();
    assert_eq!(iterations, vec![1, 2, 3]);
    assert!(statuses(&report).iter().all(|(name, _)| name == "second"));
    assert!(ctx.run_dir().join("03_second_iter3").exists());
}

#[test]
fn test_unknown_only_name_is_an_error() {
    let ctx = TestContext::new("unknown_only");
    let suite = ctx.suite("[[tests]]\nname = \"boot\"\nkind = \"launch\"\n");

    let output = ctx.run_suite(&suite, &["--only", "missing"]);
    output.assert_code(1);
    assert!(output.stderr.contains("missing"));
    assert!(!ctx.results_dir.exists());
}

#[test]
fn test_validate() {
    let ctx = TestContext::new("validate");
    ctx.script("test_open.py");
    let suite = ctx.suite(
        r#"
[[tests]]
name = "open_stage"
kind = "ui"
script = "test_open.py"

[tests.flags]
collect_vram = true
"#,
    );
    let suite_arg = suite.display().to_string();

    let output = ctx.run(&["validate", &suite_arg, "--component", "DSRS"]);
    output.assert_code(0);
    assert!(output.stdout.contains("open_stage"));
    assert!(output.stdout.contains("vram"));

    let broken = ctx.suite(
        "[[tests]]\nname = \"broken\"\nkind = \"ui\"\nscript = \"missing.py\"\n",
    );
    let broken_arg = broken.display().to_string();
    let output = ctx.run(&["validate", &broken_arg, "--component", "DSRS"]);
    output.assert_code(1);
    assert!(output.stderr.contains("broken"));
}

#[test]
fn test_classify() {
    let ctx = TestContext::new("classify");
    let log = ctx.temp_dir.join("kit.log");
    fs::write(
        &log,
        "[Info] start\n[Error] [omni.physx] failed to cook mesh\n[Warning] slow frame\n",
    )
    .unwrap();
    let log_arg = log.display().to_string();

    let output = ctx.run(&["classify", &log_arg]);
    output.assert_code(0);
    assert!(output.stdout.contains("3 lines, 1 errors, 1 warnings"));
    assert!(output.stdout.contains("failed to cook mesh"));
}

//! Suite execution
//!
//! Loads a suite, optionally installs the build, then drains the iteration
//! controller one test at a time and writes the reports.

mod execute;

use std::path::PathBuf;

use chrono::Local;
use colored::Colorize;

use crate::common::paths::{self, TestPaths};
use crate::common::{logging, Component, Config, Error, Result};
use crate::install;
use crate::queue::{FollowUp, IterationController, QueueSummary, TestOutcome, TestStatus};
use crate::report::{self, HostInfo, SuiteReport, TestReport};
use crate::suite::{load_suite, LoadedSuite, TestCase};

pub use execute::{execute_test, RunContext};

/// Whether to install the suite's build before running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstallMode {
    #[default]
    Skip,
    /// Install unless the same version is already installed
    Install,
    /// Remove the install directory and reinstall
    Force,
}

/// Parameters of a suite run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub suite: PathBuf,
    pub component: Component,
    pub config: Config,
    pub install: InstallMode,
    pub iterate: Option<u32>,
    pub only: Vec<String>,
    /// Install the run-directory log subscriber once the directory exists
    pub log_to_run_dir: bool,
}

/// Result of a suite run
#[derive(Debug, Clone)]
pub struct SuiteOutcome {
    pub run_dir: PathBuf,
    pub summary: QueueSummary,
    /// No final result failed and the run was not interrupted
    pub passed: bool,
    pub interrupted: bool,
    pub report_json: PathBuf,
    pub report_text: PathBuf,
}

async fn install_build(ctx: &RunContext, mode: InstallMode) -> Result<()> {
    let env = &ctx.suite.environment;
    let build = env
        .build
        .as_deref()
        .ok_or_else(|| Error::Config("--install requires environment.build in the suite".to_string()))?;
    let install_dir = env.install_dir.as_deref().ok_or_else(|| {
        Error::Config("--install requires environment.install_dir in the suite".to_string())
    })?;

    println!("{} {}", "Installing".blue().bold(), build);
    let outcome = install::install_build(build, install_dir, mode == InstallMode::Force).await?;
    if outcome.installed {
        println!("  {} installed {}", "✓".green(), outcome.version);
    } else {
        println!("  {} {} already installed", "✓".green(), outcome.version);
    }
    Ok(())
}

fn print_start(test: &TestCase, index: usize) {
    println!(
        "\n{} {} {}",
        format!("[{}]", index + 1).dimmed(),
        test.label().white().bold(),
        format!("({})", test.kind.as_str()).dimmed()
    );
    if let Some(desc) = &test.description {
        println!("  {}", desc.dimmed());
    }
}

fn print_outcome(test: &TestCase, outcome: &TestOutcome, follow_up: FollowUp) {
    let secs = (outcome.finished_at - outcome.started_at).num_milliseconds() as f64 / 1000.0;
    if outcome.passed {
        println!("  {} {} ({:.1}s)", "✓".green(), "passed".green(), secs);
    } else {
        println!(
            "  {} {}: {}",
            "✗".red(),
            "failed".red(),
            outcome.error.as_deref().unwrap_or("see report")
        );
    }
    for message in &outcome.verdicts.process_specific_errors {
        println!("  {} {}", "!".yellow(), message.yellow());
    }
    if let FollowUp::Retry { attempt } = follow_up {
        println!("  {} retrying {} (attempt {})", "↻".yellow(), test.name, attempt);
    }
}

/// Run a suite end to end
pub async fn run_suite(options: RunOptions) -> Result<SuiteOutcome> {
    let RunOptions {
        suite: suite_path,
        component,
        config,
        install,
        iterate,
        only,
        log_to_run_dir,
    } = options;

    if iterate == Some(0) {
        return Err(Error::Config("--iterate must be at least 1".to_string()));
    }

    let load = || -> Result<LoadedSuite> {
        let mut suite = load_suite(&suite_path, component, &config)?;
        suite.retain_only(&only)?;
        Ok(suite)
    };
    let suite = if log_to_run_dir {
        logging::with_cli(load)?
    } else {
        load()?
    };

    let started_at = Local::now();
    let run_dir = paths::create_run_dir(&suite.environment.results_dir, &suite.name, started_at)
        .map_err(|e| Error::FileWrite {
            path: suite.environment.results_dir.display().to_string(),
            error: e.to_string(),
        })?;
    let _log_guard = log_to_run_dir.then(|| logging::init_run(&run_dir));

    tracing::info!(
        "Running suite {} ({} tests) for {} in {}",
        suite.name,
        suite.tests.len(),
        component,
        run_dir.display()
    );
    println!(
        "{} {} {}",
        "Running Suite:".blue().bold(),
        suite.name.white().bold(),
        format!("[{}]", component).dimmed()
    );
    println!("  {}", run_dir.display().to_string().dimmed());

    let ctx = RunContext::new(config, suite);
    if install != InstallMode::Skip {
        install_build(&ctx, install).await?;
    }

    let mut controller = IterationController::new(ctx.suite.tests.clone(), iterate);
    let mut interrupted = false;

    while let Some(index) = controller.next_pending() {
        let Some(entry) = controller.entry_mut(index) else {
            break;
        };
        let dir_name = paths::test_dir_name(
            index + 1,
            &entry.test.name,
            entry.test.iteration,
            iterate.unwrap_or(1),
            entry.test.attempt,
        );
        let test_paths = TestPaths::new(run_dir.join(dir_name));
        entry.test.paths = Some(test_paths.clone());
        let test = entry.test.clone();

        print_start(&test, index);
        tracing::info!("Starting {}", test.label());

        // Dropping the test future kills its child processes
        let outcome = tokio::select! {
            outcome = execute_test(&ctx, &test, &test_paths) => outcome,
            _ = tokio::signal::ctrl_c() => {
                interrupted = true;
                TestOutcome::failed("Interrupted", Local::now())
            }
        };

        let ends_block = outcome.froze && test.flags.skip_block_on_freeze;
        let printed = outcome.clone();
        let follow_up = if interrupted || ends_block {
            controller.complete_final(index, outcome)
        } else {
            controller.complete(index, outcome)
        };
        print_outcome(&test, &printed, follow_up);

        if let Some(entry) = controller.entry(index) {
            let report = TestReport {
                suite: &ctx.suite.name,
                component,
                test: &entry.test,
                result: &entry.result,
                duration_secs: entry.result.duration_secs(),
            };
            if let Err(e) = report::write_test_report(&test_paths.report, &report) {
                tracing::warn!("Failed to write test report: {}", e);
            }
            tracing::info!("{} finished: {}", test.label(), entry.result.status);
        }

        if interrupted {
            let skipped = controller.skip_pending("Run interrupted");
            println!("\n{} ({} tests skipped)", "Interrupted".red().bold(), skipped);
            break;
        }

        if ends_block {
            let reason = format!("Skipped: application froze during {}", test.label());
            let skipped = controller.skip_block(&test.block, &reason);
            if skipped > 0 {
                tracing::warn!("Skipping {} remaining test(s) of block {}", skipped, test.block);
                println!(
                    "  {} skipping {} remaining test(s) of block '{}'",
                    "!".yellow(),
                    skipped,
                    test.block
                );
            }
        }
    }

    let summary = controller.summary();
    let passed = summary.all_passed() && !interrupted;
    let entries = controller.into_entries();
    let suite_report = SuiteReport {
        suite: ctx.suite.name.clone(),
        description: ctx.suite.description.clone(),
        component,
        suite_file: ctx.suite.path.clone(),
        run_dir: run_dir.clone(),
        host: HostInfo::current(),
        iterate: iterate.unwrap_or(1),
        started_at,
        finished_at: Local::now(),
        summary,
        passed,
        tests: SuiteReport::entries_from(&entries),
    };
    let (report_json, report_text) = report::write_suite_report(&run_dir, &suite_report)?;

    print_summary(&summary, passed, &entries_failed(&entries));
    println!("  Report: {}", report_text.display().to_string().dimmed());
    tracing::info!(
        "Suite {} finished: {} completed, {} failed, {} skipped",
        ctx.suite.name,
        summary.completed,
        summary.failed,
        summary.skipped
    );

    Ok(SuiteOutcome {
        run_dir,
        summary,
        passed,
        interrupted,
        report_json,
        report_text,
    })
}

fn entries_failed(entries: &[crate::queue::QueueEntry]) -> Vec<String> {
    entries
        .iter()
        .filter(|e| e.result.status == TestStatus::Failed)
        .map(|e| e.test.label())
        .collect()
}

fn print_summary(summary: &QueueSummary, passed: bool, failed: &[String]) {
    println!();
    println!(
        "{} {} completed, {} failed, {} retried, {} skipped",
        "Summary:".bold(),
        summary.completed.to_string().green(),
        summary.failed.to_string().red(),
        summary.retried,
        summary.skipped
    );
    for label in failed {
        println!("  {} {}", "✗".red(), label);
    }
    if passed {
        println!("{}", "PASSED".green().bold());
    } else {
        println!("{}", "FAILED".red().bold());
    }
}

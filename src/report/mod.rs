//! Test and suite reports
//!
//! Every test directory gets a `test_report.json`; the run directory gets
//! `report.json` (everything, machine-readable) and `report.txt` (a table
//! for humans).

mod text;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::common::{Component, Error, Result};
use crate::queue::{QueueEntry, QueueSummary, TestResult};
use crate::suite::TestCase;

pub use text::render_text;

pub const SUITE_REPORT_JSON: &str = "report.json";
pub const SUITE_REPORT_TEXT: &str = "report.txt";

/// Machine the suite ran on
#[derive(Debug, Clone, Serialize)]
pub struct HostInfo {
    pub os: String,
    pub os_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

impl HostInfo {
    pub fn current() -> Self {
        let info = os_info::get();
        Self {
            os: info.os_type().to_string(),
            os_version: info.version().to_string(),
            architecture: info.architecture().map(str::to_string),
            hostname: std::env::var("COMPUTERNAME")
                .or_else(|_| std::env::var("HOSTNAME"))
                .ok(),
        }
    }
}

/// Content of a per-test `test_report.json`
#[derive(Debug, Serialize)]
pub struct TestReport<'a> {
    pub suite: &'a str,
    pub component: Component,
    pub test: &'a TestCase,
    pub result: &'a TestResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

/// One queue entry in the suite report
#[derive(Debug, Clone, Serialize)]
pub struct EntryReport {
    /// 1-based position in the queue
    pub ordinal: usize,
    pub test: TestCase,
    pub result: TestResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

/// Content of the suite `report.json`
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub suite: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub component: Component,
    pub suite_file: PathBuf,
    pub run_dir: PathBuf,
    pub host: HostInfo,
    pub iterate: u32,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub summary: QueueSummary,
    pub passed: bool,
    pub tests: Vec<EntryReport>,
}

impl SuiteReport {
    pub fn entries_from(entries: &[QueueEntry]) -> Vec<EntryReport> {
        entries
            .iter()
            .enumerate()
            .map(|(i, entry)| EntryReport {
                ordinal: i + 1,
                test: entry.test.clone(),
                result: entry.result.clone(),
                duration_secs: entry.result.duration_secs(),
            })
            .collect()
    }

    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds().max(0) as f64 / 1000.0
    }
}

fn write_file(path: &Path, content: &[u8]) -> Result<()> {
    std::fs::write(path, content).map_err(|e| Error::FileWrite {
        path: path.display().to_string(),
        error: e.to_string(),
    })
}

/// Write a test's `test_report.json`
pub fn write_test_report(path: &Path, report: &TestReport<'_>) -> Result<()> {
    write_file(path, &serde_json::to_vec_pretty(report)?)
}

/// Write `report.json` and `report.txt`; returns their paths
pub fn write_suite_report(run_dir: &Path, report: &SuiteReport) -> Result<(PathBuf, PathBuf)> {
    let json_path = run_dir.join(SUITE_REPORT_JSON);
    write_file(&json_path, &serde_json::to_vec_pretty(report)?)?;

    let text_path = run_dir.join(SUITE_REPORT_TEXT);
    write_file(&text_path, render_text(report).as_bytes())?;

    tracing::info!("Reports written to {}", run_dir.display());
    Ok((json_path, text_path))
}

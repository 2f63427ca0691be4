//! Test status and result records

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Lifecycle state of a queued test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    /// Failed, and a further attempt was queued
    Retry,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Pending => "PENDING",
            TestStatus::Running => "RUNNING",
            TestStatus::Completed => "COMPLETED",
            TestStatus::Failed => "FAILED",
            TestStatus::Skipped => "SKIPPED",
            TestStatus::Retry => "RETRY",
        }
    }

    pub fn is_finished(&self) -> bool {
        !matches!(self, TestStatus::Pending | TestStatus::Running)
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Individual pass/fail findings of a test run
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Verdicts {
    /// Application reported ready (`None` if not launched)
    pub launch: Option<bool>,
    /// Scenario script passed (`None` if no scenario)
    pub scenario: Option<bool>,
    pub log_errors: usize,
    pub log_warnings: usize,
    /// Failures of the harness around the test (telemetry, recording, cleanup)
    pub process_specific_errors: Vec<String>,
}

impl Verdicts {
    pub fn add_process_error(&mut self, message: impl Into<String>) {
        self.process_specific_errors.push(message.into());
    }

    /// `process-specific-errors` as a single line for text reports
    pub fn process_errors_line(&self) -> String {
        self.process_specific_errors.join("; ")
    }
}

/// Files produced by a test run
#[derive(Debug, Clone, Default, Serialize)]
pub struct Artifacts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<PathBuf>,
}

/// Outcome of one execution, produced by the runner
#[derive(Debug, Clone)]
pub struct TestOutcome {
    pub passed: bool,
    pub error: Option<String>,
    pub verdicts: Verdicts,
    pub metrics: BTreeMap<String, serde_json::Value>,
    pub artifacts: Artifacts,
    /// The application froze during launch
    pub froze: bool,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}

impl TestOutcome {
    /// A failed outcome with nothing but an error message
    pub fn failed(error: impl Into<String>, started_at: DateTime<Local>) -> Self {
        Self {
            passed: false,
            error: Some(error.into()),
            verdicts: Verdicts::default(),
            metrics: BTreeMap::new(),
            artifacts: Artifacts::default(),
            froze: false,
            started_at,
            finished_at: Local::now(),
        }
    }
}

/// Result record stored alongside each queued test
#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub status: TestStatus,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub verdicts: Verdicts,
    pub metrics: BTreeMap<String, serde_json::Value>,
    pub artifacts: Artifacts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Local>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Local>>,
}

impl Default for TestResult {
    fn default() -> Self {
        Self {
            status: TestStatus::Pending,
            attempts: 0,
            error: None,
            verdicts: Verdicts::default(),
            metrics: BTreeMap::new(),
            artifacts: Artifacts::default(),
            started_at: None,
            finished_at: None,
        }
    }
}

impl TestResult {
    /// Wall-clock duration in seconds, once finished
    pub fn duration_secs(&self) -> Option<f64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => {
                Some((end - start).num_milliseconds().max(0) as f64 / 1000.0)
            }
            _ => None,
        }
    }

    pub(crate) fn record(&mut self, outcome: TestOutcome) {
        self.status = if outcome.passed {
            TestStatus::Completed
        } else {
            TestStatus::Failed
        };
        self.error = outcome.error;
        self.verdicts = outcome.verdicts;
        self.metrics = outcome.metrics;
        self.artifacts = outcome.artifacts;
        self.started_at = Some(outcome.started_at);
        self.finished_at = Some(outcome.finished_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_upper_case() {
        let json = serde_json::to_string(&TestStatus::Retry).unwrap();
        assert_eq!(json, "\"RETRY\"");
        assert!(!TestStatus::Running.is_finished());
        assert!(TestStatus::Skipped.is_finished());
    }

    #[test]
    fn test_verdicts_use_kebab_case_keys() {
        let mut verdicts = Verdicts::default();
        verdicts.add_process_error("vram: nvidia-smi not found");
        verdicts.add_process_error("recording: ffmpeg exited");

        let json = serde_json::to_value(&verdicts).unwrap();
        assert_eq!(json["process-specific-errors"].as_array().unwrap().len(), 2);
        assert_eq!(
            verdicts.process_errors_line(),
            "vram: nvidia-smi not found; recording: ffmpeg exited"
        );
    }

    #[test]
    fn test_record_outcome() {
        let mut result = TestResult::default();
        let started = Local::now();
        result.record(TestOutcome::failed("boom", started));
        assert_eq!(result.status, TestStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert!(result.duration_secs().unwrap() >= 0.0);
    }
}

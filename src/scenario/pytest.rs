//! pytest session summary parsing

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// `... in 12.34s ...`
static DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bin (\d+(?:\.\d+)?)s\b").expect("valid regex"));

/// `3 passed`, `1 error`, `2 warnings`
static COUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+) (passed|failed|errors?|skipped|xfailed|xpassed|deselected|warnings?)\b")
        .expect("valid regex")
});

/// pytest exit code for "no tests were collected"
pub const NO_TESTS_COLLECTED: i32 = 5;

/// Counts from the final pytest summary line
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PytestSummary {
    pub passed: u32,
    pub failed: u32,
    pub errors: u32,
    pub skipped: u32,
    pub xfailed: u32,
    pub xpassed: u32,
    pub deselected: u32,
    pub warnings: u32,
    pub duration_secs: Option<f64>,
}

impl PytestSummary {
    /// Parse the last summary line found in `lines`
    ///
    /// Matches both the verbose form (`==== 2 passed in 1.2s ====`) and the
    /// quiet form (`2 passed in 1.2s`).
    pub fn parse<S: AsRef<str>>(lines: &[S]) -> Option<Self> {
        lines.iter().rev().find_map(|line| Self::parse_line(line.as_ref()))
    }

    fn parse_line(line: &str) -> Option<Self> {
        let duration = DURATION_RE.captures(line)?;
        let is_summary = COUNT_RE.is_match(line) || line.contains("no tests ran");
        if !is_summary {
            return None;
        }

        let mut summary = Self {
            duration_secs: duration[1].parse().ok(),
            ..Default::default()
        };
        for caps in COUNT_RE.captures_iter(line) {
            let count: u32 = caps[1].parse().unwrap_or(0);
            match &caps[2] {
                "passed" => summary.passed += count,
                "failed" => summary.failed += count,
                "error" | "errors" => summary.errors += count,
                "skipped" => summary.skipped += count,
                "xfailed" => summary.xfailed += count,
                "xpassed" => summary.xpassed += count,
                "deselected" => summary.deselected += count,
                "warning" | "warnings" => summary.warnings += count,
                _ => {}
            }
        }
        Some(summary)
    }

    /// One-line description, e.g. `3 passed, 1 failed`
    pub fn describe(&self) -> String {
        let parts: Vec<String> = [
            (self.passed, "passed"),
            (self.failed, "failed"),
            (self.errors, "errors"),
            (self.skipped, "skipped"),
        ]
        .iter()
        .filter(|(count, _)| *count > 0)
        .map(|(count, label)| format!("{} {}", count, label))
        .collect();
        if parts.is_empty() {
            "no tests ran".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Decide a scenario verdict; `Err` carries the failure reason
pub fn judge(exit_code: Option<i32>, summary: Option<&PytestSummary>) -> Result<(), String> {
    if exit_code == Some(NO_TESTS_COLLECTED) {
        return Err("no tests were collected".to_string());
    }
    let Some(summary) = summary else {
        return Err(match exit_code {
            Some(code) => format!("no pytest summary found (exit code {})", code),
            None => "no pytest summary found (terminated by signal)".to_string(),
        });
    };
    if summary.failed > 0 || summary.errors > 0 {
        return Err(summary.describe());
    }
    if summary.passed == 0 {
        return Err(format!("no tests passed ({})", summary.describe()));
    }
    match exit_code {
        Some(0) => Ok(()),
        Some(code) => Err(format!("pytest exited with code {}", code)),
        None => Err("pytest terminated by signal".to_string()),
    }
}

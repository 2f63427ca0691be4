//! Plain-text suite report

use std::fmt::Write;

use crate::queue::TestStatus;

use super::SuiteReport;

const NAME_WIDTH: usize = 32;

fn verdict(value: Option<bool>) -> &'static str {
    match value {
        Some(true) => "pass",
        Some(false) => "FAIL",
        None => "-",
    }
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(width - 1).collect();
        out.push('~');
        out
    }
}

/// Render `report.txt`
pub fn render_text(report: &SuiteReport) -> String {
    let mut out = String::new();
    let s = &report.summary;

    // Writing to a String cannot fail
    let _ = writeln!(out, "Suite:     {}", report.suite);
    if let Some(description) = &report.description {
        let _ = writeln!(out, "           {}", description);
    }
    let _ = writeln!(out, "Component: {}", report.component);
    let _ = writeln!(
        out,
        "Host:      {} {}{}",
        report.host.os,
        report.host.os_version,
        report
            .host
            .hostname
            .as_deref()
            .map(|h| format!(" ({})", h))
            .unwrap_or_default()
    );
    let _ = writeln!(
        out,
        "Started:   {}",
        report.started_at.format("%Y-%m-%d %H:%M:%S")
    );
    let _ = writeln!(out, "Duration:  {:.1}s", report.duration_secs());
    if report.iterate > 1 {
        let _ = writeln!(out, "Iterations: {}", report.iterate);
    }
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "{:>3}  {:<width$}  {:>4}  {:>3}  {:<9}  {:>8}  {:<6}  {:<8}  {:>6}  {:>8}",
        "#",
        "Test",
        "Iter",
        "Try",
        "Status",
        "Duration",
        "Launch",
        "Scenario",
        "Errors",
        "Warnings",
        width = NAME_WIDTH
    );
    let _ = writeln!(out, "{}", "-".repeat(NAME_WIDTH + 73));

    for entry in &report.tests {
        let r = &entry.result;
        let duration = entry
            .duration_secs
            .map(|d| format!("{:.1}s", d))
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "{:>3}  {:<width$}  {:>4}  {:>3}  {:<9}  {:>8}  {:<6}  {:<8}  {:>6}  {:>8}",
            entry.ordinal,
            truncate(&entry.test.name, NAME_WIDTH),
            entry.test.iteration,
            entry.test.attempt,
            r.status.as_str(),
            duration,
            verdict(r.verdicts.launch),
            verdict(r.verdicts.scenario),
            r.verdicts.log_errors,
            r.verdicts.log_warnings,
            width = NAME_WIDTH
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Total: {}  Completed: {}  Failed: {}  Retried: {}  Skipped: {}",
        s.total, s.completed, s.failed, s.retried, s.skipped
    );
    let _ = writeln!(
        out,
        "Result: {}",
        if report.passed { "PASSED" } else { "FAILED" }
    );

    let problems: Vec<_> = report
        .tests
        .iter()
        .filter(|e| {
            matches!(
                e.result.status,
                TestStatus::Failed | TestStatus::Retry | TestStatus::Skipped
            ) || !e.result.verdicts.process_specific_errors.is_empty()
        })
        .collect();

    if !problems.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Details:");
        for entry in problems {
            let _ = writeln!(
                out,
                "  [{}] {} ({})",
                entry.ordinal,
                entry.test.label(),
                entry.result.status
            );
            if let Some(error) = &entry.result.error {
                let _ = writeln!(out, "      error: {}", error);
            }
            if !entry.result.verdicts.process_specific_errors.is_empty() {
                let _ = writeln!(
                    out,
                    "      process-specific-errors: {}",
                    entry.result.verdicts.process_errors_line()
                );
            }
            if let Some(dir) = &entry.result.artifacts.dir {
                let _ = writeln!(out, "      artifacts: {}", dir.display());
            }
        }
    }

    out
}

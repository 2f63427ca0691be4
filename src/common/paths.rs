//! Configuration lookup and results directory layout
//!
//! A run produces:
//!
//! ```text
//! <results_dir>/<suite>_<YYYYmmdd_HHMMSS>/
//!     dmf.log
//!     report.json
//!     report.txt
//!     01_<test>/
//!         stdout.log, kit.log, scenario.log, test_report.json, ...
//! ```

use chrono::{DateTime, Local};
use std::io;
use std::path::{Path, PathBuf};

/// Name used for the configuration directory
const APP_NAME: &str = "dmf";

/// Configuration file name
pub const CONFIG_FILE: &str = "dmf_config.toml";

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/dmf/`
/// - macOS: `~/Library/Application Support/dmf/`
/// - Windows: `%APPDATA%\dmf\`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join(CONFIG_FILE))
}

/// Replace anything outside `[A-Za-z0-9_.-]` with `_`
pub fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Directory name for a suite run started at `started`
pub fn run_dir_name(suite: &str, started: DateTime<Local>) -> String {
    format!("{}_{}", sanitize(suite), started.format("%Y%m%d_%H%M%S"))
}

/// Directory name for one scheduled test
///
/// `ordinal` is the 1-based execution order within the run.
pub fn test_dir_name(ordinal: usize, test: &str, iteration: u32, iterate: u32, attempt: u32) -> String {
    let mut name = format!("{:02}_{}", ordinal, sanitize(test));
    if iterate > 1 {
        name.push_str(&format!("_iter{}", iteration));
    }
    if attempt > 1 {
        name.push_str(&format!("_attempt{}", attempt));
    }
    name
}

/// Create a run directory, appending a counter if it already exists
pub fn create_run_dir(results_dir: &Path, suite: &str, started: DateTime<Local>) -> io::Result<PathBuf> {
    let base = run_dir_name(suite, started);
    let mut candidate = results_dir.join(&base);
    let mut counter = 1;
    while candidate.exists() {
        counter += 1;
        candidate = results_dir.join(format!("{}_{}", base, counter));
    }
    std::fs::create_dir_all(&candidate)?;
    Ok(candidate)
}

/// Paths derived for a scheduled test
#[derive(Debug, Clone, serde::Serialize)]
pub struct TestPaths {
    pub dir: PathBuf,
    /// Application stdout/stderr transcript
    pub stdout_log: PathBuf,
    /// Kit log file (`--/log/file`)
    pub kit_log: PathBuf,
    /// Scenario (pytest) transcript
    pub scenario_log: PathBuf,
    pub report: PathBuf,
}

impl TestPaths {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            stdout_log: dir.join("stdout.log"),
            kit_log: dir.join("kit.log"),
            scenario_log: dir.join("scenario.log"),
            report: dir.join("test_report.json"),
            dir,
        }
    }
}

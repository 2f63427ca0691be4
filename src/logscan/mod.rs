//! Log classification
//!
//! Lines are classified by substring word lists from `dmf_config.toml`.
//! Ignore words win over error words, error words over warning words.

use std::path::Path;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::common::config::LogClassification;
use crate::common::{find_marker, Error, Result};

/// Class of a single log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    Ignored,
    Error,
    Warning,
    Info,
}

/// Errors and warnings found in one or more logs
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct LogSummary {
    pub lines: usize,
    pub errors: usize,
    pub warnings: usize,
    /// First error lines, capped at `max_reported_lines`
    pub error_lines: Vec<String>,
    /// First warning lines, capped at `max_reported_lines`
    pub warning_lines: Vec<String>,
}

impl LogSummary {
    /// Fold another summary into this one, keeping the line caps
    pub fn merge(&mut self, other: LogSummary, cap: usize) {
        self.lines += other.lines;
        self.errors += other.errors;
        self.warnings += other.warnings;
        let room = cap.saturating_sub(self.error_lines.len());
        self.error_lines.extend(other.error_lines.into_iter().take(room));
        let room = cap.saturating_sub(self.warning_lines.len());
        self.warning_lines.extend(other.warning_lines.into_iter().take(room));
    }
}

/// Word-list based line classifier
#[derive(Debug, Clone)]
pub struct LogClassifier {
    error_words: Vec<String>,
    warning_words: Vec<String>,
    ignore_words: Vec<String>,
    max_lines: usize,
}

impl LogClassifier {
    pub fn from_config(config: &LogClassification) -> Self {
        Self {
            error_words: config.error_words.clone(),
            warning_words: config.warning_words.clone(),
            ignore_words: config.ignore_words.clone(),
            max_lines: config.max_reported_lines,
        }
    }

    pub fn max_lines(&self) -> usize {
        self.max_lines
    }

    pub fn classify_line(&self, line: &str) -> LineClass {
        if find_marker(line, &self.ignore_words).is_some() {
            LineClass::Ignored
        } else if find_marker(line, &self.error_words).is_some() {
            LineClass::Error
        } else if find_marker(line, &self.warning_words).is_some() {
            LineClass::Warning
        } else {
            LineClass::Info
        }
    }

    /// Classify a sequence of lines
    pub fn scan_lines<'a>(&self, lines: impl IntoIterator<Item = &'a str>) -> LogSummary {
        let mut summary = LogSummary::default();
        for line in lines {
            self.observe(&mut summary, line);
        }
        summary
    }

    fn observe(&self, summary: &mut LogSummary, line: &str) {
        summary.lines += 1;
        match self.classify_line(line) {
            LineClass::Error => {
                summary.errors += 1;
                if summary.error_lines.len() < self.max_lines {
                    summary.error_lines.push(line.trim_end().to_string());
                }
            }
            LineClass::Warning => {
                summary.warnings += 1;
                if summary.warning_lines.len() < self.max_lines {
                    summary.warning_lines.push(line.trim_end().to_string());
                }
            }
            LineClass::Ignored | LineClass::Info => {}
        }
    }

    /// Classify a log file; a missing file yields an empty summary
    ///
    /// Invalid UTF-8 is replaced rather than rejected; Kit logs occasionally
    /// contain raw bytes from native plugins.
    pub async fn scan_file(&self, path: &Path) -> Result<LogSummary> {
        let file = match tokio::fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Log {} does not exist", path.display());
                return Ok(LogSummary::default());
            }
            Err(e) => {
                return Err(Error::FileRead {
                    path: path.display().to_string(),
                    error: e.to_string(),
                })
            }
        };

        let mut reader = BufReader::new(file);
        let mut summary = LogSummary::default();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = reader.read_until(b'\n', &mut buf).await?;
            if read == 0 {
                break;
            }
            self.observe(&mut summary, &String::from_utf8_lossy(&buf));
        }
        Ok(summary)
    }
}

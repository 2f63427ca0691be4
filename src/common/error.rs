//! Error types for the DMF harness
//!
//! Messages name the offending file, test or tool so a failed nightly run can
//! be diagnosed from the report alone.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file '{path}': {message}")]
    ConfigParse { path: String, message: String },

    // === Suite Errors ===
    #[error("Invalid test suite '{path}': {message}")]
    SuiteParse { path: String, message: String },

    #[error("Test '{test}': {message}")]
    InvalidTest { test: String, message: String },

    #[error("Unknown test '{0}'. Use 'dmf validate' to list the tests in a suite")]
    UnknownTest(String),

    // === Launch Errors ===
    #[error("Failed to launch '{program}': {reason}")]
    LaunchFailed { program: String, reason: String },

    #[error("Application did not report ready within {0} seconds")]
    LaunchTimeout(u64),

    #[error("Application reported a failure during startup: {0}")]
    LaunchAborted(String),

    #[error("Application exited before reporting ready")]
    AppExited,

    // === Scenario Errors ===
    #[error("Scenario '{script}' failed: {reason}")]
    ScenarioFailed { script: String, reason: String },

    #[error("Scenario timed out after {0} seconds")]
    ScenarioTimeout(u64),

    // === Tool Errors ===
    #[error("Required tool '{0}' not found on PATH")]
    ToolNotFound(String),

    #[error("'{tool}' failed: {message}")]
    ToolFailed { tool: String, message: String },

    // === Telemetry Errors ===
    #[error("Monitor '{monitor}' failed: {message}")]
    Monitor { monitor: String, message: String },

    // === Install Errors ===
    #[error("Installation failed: {0}")]
    Install(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    #[error("Failed to write file '{path}': {error}")]
    FileWrite { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an invalid test error
    pub fn invalid_test(test: &str, message: impl Into<String>) -> Self {
        Self::InvalidTest {
            test: test.to_string(),
            message: message.into(),
        }
    }

    /// Create a launch failed error
    pub fn launch_failed(program: &str, reason: impl Into<String>) -> Self {
        Self::LaunchFailed {
            program: program.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a tool failed error
    pub fn tool_failed(tool: &str, message: impl Into<String>) -> Self {
        Self::ToolFailed {
            tool: tool.to_string(),
            message: message.into(),
        }
    }

    /// Create a monitor error
    pub fn monitor(monitor: &str, message: impl Into<String>) -> Self {
        Self::Monitor {
            monitor: monitor.to_string(),
            message: message.into(),
        }
    }

    /// Create a scenario failed error
    pub fn scenario_failed(script: &str, reason: impl Into<String>) -> Self {
        Self::ScenarioFailed {
            script: script.to_string(),
            reason: reason.into(),
        }
    }

}

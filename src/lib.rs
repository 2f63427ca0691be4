//! DMF - test harness for Kit-based simulation applications
//!
//! This library holds the harness: suite loading, application launch and
//! readiness verification, scenario execution, telemetry, log
//! classification, the retry/iteration queue and reporting.

pub mod cli;
pub mod commands;
pub mod common;
pub mod install;
pub mod launch;
pub mod logscan;
pub mod process;
pub mod queue;
pub mod report;
pub mod runner;
pub mod scenario;
pub mod suite;
pub mod telemetry;

// Re-export commonly used types for tests
pub use common::{Component, Config, Error, Result};

//! Application launch and verification
//!
//! The application is spawned with its output piped into an
//! [`OutputWatcher`]; readiness is decided by marker lines raced against a
//! timeout.

mod app;
mod command;
mod watcher;

pub use app::{AppSession, LaunchVerdict};
pub use command::LaunchSpec;
pub use watcher::{CapturedOutput, Markers, OutputWatcher, Signal, Source, WatchOutcome, WatchState};

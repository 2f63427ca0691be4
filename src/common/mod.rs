//! Common utilities shared by all commands

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use config::{Component, ComponentSettings, Config};
pub use error::{Error, Result};

/// Return the first needle contained in `line`
pub fn find_marker<'a>(line: &str, needles: &'a [String]) -> Option<&'a str> {
    needles
        .iter()
        .find(|needle| !needle.is_empty() && line.contains(needle.as_str()))
        .map(String::as_str)
}

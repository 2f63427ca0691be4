//! CLI command definitions
//!
//! Defines the clap commands for the dmf CLI.

use clap::Subcommand;
use std::path::PathBuf;

use crate::common::Component;

#[derive(Subcommand)]
pub enum Commands {
    /// Run a test suite against a component
    Run {
        /// Path to the suite file (TOML)
        suite: PathBuf,

        /// Application under test
        #[arg(long, short = 'c', value_enum, ignore_case = true)]
        component: Component,

        /// Install the suite's build first (skipped if already installed)
        #[arg(long, conflicts_with = "force_install")]
        install: bool,

        /// Remove the install directory and reinstall the build
        #[arg(long)]
        force_install: bool,

        /// Run every test N times back to back
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        iterate: Option<u32>,

        /// Only run the named test(s)
        /// Can be specified multiple times: --only open_stage --only save_stage
        #[arg(long)]
        only: Vec<String>,

        /// Configuration file (default: dmf_config.toml in the config directory)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Load a suite and print the expanded test list
    Validate {
        /// Path to the suite file (TOML)
        suite: PathBuf,

        /// Application under test
        #[arg(long, short = 'c', value_enum, ignore_case = true)]
        component: Component,

        /// Configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Classify a log file with the configured word lists
    Classify {
        /// Log file to scan
        log: PathBuf,

        /// Configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Kill running instances of a component
    Kill {
        /// Application to kill
        #[arg(long, short = 'c', value_enum, ignore_case = true)]
        component: Component,

        /// Configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

//! Test suite file types
//!
//! Defines the data structures for deserializing TOML test suites.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A complete test suite loaded from a TOML file
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct SuiteFile {
    pub suite: SuiteHeader,
    #[serde(default)]
    pub environment: EnvironmentConfig,
    /// Suite-wide flag defaults
    #[serde(default)]
    pub flags: FlagOverrides,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub tests: Vec<TestEntry>,
}

#[derive(Deserialize, Debug)]
pub struct SuiteHeader {
    pub name: String,
    pub description: Option<String>,
}

/// Paths describing where the application lives and where results go
#[derive(Deserialize, Debug, Default)]
pub struct EnvironmentConfig {
    /// Directory the application is (or will be) installed into
    pub install_dir: Option<PathBuf>,
    /// Package to install from: a local archive path or an http(s) URL
    pub build: Option<String>,
    /// Root directory for run results (default: `dmf_results`)
    pub results_dir: Option<PathBuf>,
    /// Base directory for scenario scripts (default: the suite's directory)
    pub scripts_dir: Option<PathBuf>,
    /// Executable override, bypassing the component settings
    pub executable: Option<PathBuf>,
}

/// Names of environment variables holding the automation credentials
#[derive(Deserialize, Debug, Default)]
pub struct CredentialsConfig {
    pub username_env: Option<String>,
    pub password_env: Option<String>,
}

/// What a test does with the application
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    /// Launch the application and verify it reports ready
    Launch,
    /// Launch the application, then drive it with a scenario script
    Ui,
    /// Run a scenario script without launching the application
    Cli,
}

impl TestKind {
    pub fn launches_app(&self) -> bool {
        matches!(self, TestKind::Launch | TestKind::Ui)
    }

    pub fn runs_scenario(&self) -> bool {
        matches!(self, TestKind::Ui | TestKind::Cli)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TestKind::Launch => "launch",
            TestKind::Ui => "ui",
            TestKind::Cli => "cli",
        }
    }
}

/// A single `[[tests]]` entry
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct TestEntry {
    pub name: String,
    pub kind: TestKind,
    pub description: Option<String>,
    /// Tests sharing a block are skipped together when the app freezes
    pub block: Option<String>,
    /// Scenario script, relative to `scripts_dir`
    pub script: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub app_args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub flags: FlagOverrides,
}

/// Behaviour switches for a test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TestFlags {
    /// Re-run a failed test, up to three attempts in total
    pub retry_on_failure: bool,
    /// Capture the screen with ffmpeg while the test runs
    pub record_screen: bool,
    /// Sample GPU memory with nvidia-smi
    pub collect_vram: bool,
    /// Sample the application's resident memory
    pub collect_memory: bool,
    /// Kill stray application instances before launching
    pub kill_existing: bool,
    /// Fail the test when the screen recording cannot be made
    pub recording_required: bool,
    /// Skip the remaining tests of the block when the app freezes on launch
    pub skip_block_on_freeze: bool,
}

impl Default for TestFlags {
    fn default() -> Self {
        Self {
            retry_on_failure: true,
            record_screen: false,
            collect_vram: false,
            collect_memory: false,
            kill_existing: true,
            recording_required: false,
            skip_block_on_freeze: true,
        }
    }
}

/// Partial flags as written in a suite file
#[derive(Deserialize, Debug, Default, Clone, Copy)]
#[serde(deny_unknown_fields)]
pub struct FlagOverrides {
    pub retry_on_failure: Option<bool>,
    pub record_screen: Option<bool>,
    pub collect_vram: Option<bool>,
    pub collect_memory: Option<bool>,
    pub kill_existing: Option<bool>,
    pub recording_required: Option<bool>,
    pub skip_block_on_freeze: Option<bool>,
}

impl FlagOverrides {
    /// Apply these overrides on top of `base`
    pub fn apply(&self, base: TestFlags) -> TestFlags {
        TestFlags {
            retry_on_failure: self.retry_on_failure.unwrap_or(base.retry_on_failure),
            record_screen: self.record_screen.unwrap_or(base.record_screen),
            collect_vram: self.collect_vram.unwrap_or(base.collect_vram),
            collect_memory: self.collect_memory.unwrap_or(base.collect_memory),
            kill_existing: self.kill_existing.unwrap_or(base.kill_existing),
            recording_required: self.recording_required.unwrap_or(base.recording_required),
            skip_block_on_freeze: self
                .skip_block_on_freeze
                .unwrap_or(base.skip_block_on_freeze),
        }
    }
}

//! Harness configuration (`dmf_config.toml`) handling

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::paths::config_path;
use super::{Error, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Word lists used to classify application log lines
    #[serde(default)]
    pub log_classification: LogClassification,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Telemetry sampling settings
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// External tool locations
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Per-component overrides, keyed by component name (DSRS, MAP2SIM)
    #[serde(default)]
    pub components: HashMap<String, ComponentConfig>,
}

/// Application under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
pub enum Component {
    #[serde(rename = "DSRS")]
    #[value(name = "DSRS")]
    Dsrs,
    #[serde(rename = "MAP2SIM")]
    #[value(name = "MAP2SIM")]
    Map2sim,
}

impl Component {
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Dsrs => "DSRS",
            Component::Map2sim => "MAP2SIM",
        }
    }

    fn default_kit_file(&self) -> &'static str {
        match self {
            Component::Dsrs => "apps/dsrs.kit",
            Component::Map2sim => "apps/map2sim.kit",
        }
    }

    fn default_automation_port(&self) -> u16 {
        match self {
            Component::Dsrs => 8211,
            Component::Map2sim => 8212,
        }
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log classification word lists
#[derive(Debug, Deserialize, Clone)]
pub struct LogClassification {
    /// Substrings marking a line as an error
    #[serde(default = "default_error_words")]
    pub error_words: Vec<String>,

    /// Substrings marking a line as a warning
    #[serde(default = "default_warning_words")]
    pub warning_words: Vec<String>,

    /// Substrings that exclude a line from classification (known noise)
    #[serde(default)]
    pub ignore_words: Vec<String>,

    /// Fail a test when its logs contain error lines
    #[serde(default)]
    pub fail_on_error: bool,

    /// Maximum number of matching lines kept per class in reports
    #[serde(default = "default_max_reported_lines")]
    pub max_reported_lines: usize,
}

impl Default for LogClassification {
    fn default() -> Self {
        Self {
            error_words: default_error_words(),
            warning_words: default_warning_words(),
            ignore_words: Vec::new(),
            fail_on_error: false,
            max_reported_lines: default_max_reported_lines(),
        }
    }
}

fn default_error_words() -> Vec<String> {
    vec!["[Error]".to_string(), "[Fatal]".to_string(), "Traceback".to_string()]
}

fn default_warning_words() -> Vec<String> {
    vec!["[Warning]".to_string()]
}

fn default_max_reported_lines() -> usize {
    20
}

/// Timeout settings in seconds
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// Time allowed for the application to report ready
    #[serde(default = "default_launch")]
    pub launch_secs: u64,

    /// Default time allowed for a scenario script
    #[serde(default = "default_scenario")]
    pub scenario_secs: u64,

    /// Time allowed for the application to exit after being killed
    #[serde(default = "default_shutdown")]
    pub shutdown_secs: u64,

    /// Time allowed for ffmpeg to finalize a recording
    #[serde(default = "default_recording_stop")]
    pub recording_stop_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            launch_secs: default_launch(),
            scenario_secs: default_scenario(),
            shutdown_secs: default_shutdown(),
            recording_stop_secs: default_recording_stop(),
        }
    }
}

fn default_launch() -> u64 {
    300
}
fn default_scenario() -> u64 {
    1800
}
fn default_shutdown() -> u64 {
    30
}
fn default_recording_stop() -> u64 {
    10
}

/// Telemetry sampling settings
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_sample_interval")]
    pub sample_interval_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: default_sample_interval(),
        }
    }
}

fn default_sample_interval() -> u64 {
    1000
}

/// External tool locations
#[derive(Debug, Deserialize, Clone)]
pub struct ToolsConfig {
    #[serde(default = "default_nvidia_smi")]
    pub nvidia_smi: String,

    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,

    /// Command line used to run scenario scripts; the script path is appended
    #[serde(default = "default_pytest")]
    pub pytest: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            nvidia_smi: default_nvidia_smi(),
            ffmpeg: default_ffmpeg(),
            pytest: default_pytest(),
        }
    }
}

fn default_nvidia_smi() -> String {
    "nvidia-smi".to_string()
}
fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}
fn default_pytest() -> Vec<String> {
    vec!["python".to_string(), "-m".to_string(), "pytest".to_string()]
}

/// Per-component overrides; unset fields use the component defaults
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ComponentConfig {
    /// Executable, relative to the install directory unless absolute
    pub executable: Option<PathBuf>,
    /// `.kit` file passed as first argument, relative to the install directory
    pub kit_file: Option<PathBuf>,
    /// Image name used to kill stray instances
    pub process_name: Option<String>,
    pub ready_markers: Option<Vec<String>>,
    pub failure_markers: Option<Vec<String>>,
    pub automation_port: Option<u16>,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

/// Fully resolved component settings
#[derive(Debug, Clone)]
pub struct ComponentSettings {
    pub component: Component,
    pub executable: PathBuf,
    /// `None` when explicitly disabled with an empty string
    pub kit_file: Option<PathBuf>,
    pub process_name: String,
    pub ready_markers: Vec<String>,
    pub failure_markers: Vec<String>,
    pub automation_port: u16,
    pub extra_args: Vec<String>,
}

impl ComponentSettings {
    /// Resolve a path setting against the install directory
    pub fn resolve(&self, install_dir: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            install_dir.join(path)
        }
    }
}

fn default_executable() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from("kit/kit.exe")
    } else {
        PathBuf::from("kit/kit")
    }
}

fn default_process_name() -> String {
    if cfg!(windows) {
        "kit.exe".to_string()
    } else {
        "kit".to_string()
    }
}

impl Config {
    /// Load configuration from an explicit path, or the default config file
    ///
    /// Returns default configuration if no file exists
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content).map_err(|message| Error::ConfigParse {
            path: path.display().to_string(),
            message,
        })
    }

    fn parse(content: &str) -> std::result::Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Get the resolved settings for a component
    pub fn component(&self, component: Component) -> ComponentSettings {
        let overrides = self
            .components
            .get(component.as_str())
            .cloned()
            .unwrap_or_default();

        let kit_file = match overrides.kit_file {
            Some(path) if path.as_os_str().is_empty() => None,
            Some(path) => Some(path),
            None => Some(PathBuf::from(component.default_kit_file())),
        };

        ComponentSettings {
            component,
            executable: overrides.executable.unwrap_or_else(default_executable),
            kit_file,
            process_name: overrides.process_name.unwrap_or_else(default_process_name),
            ready_markers: overrides
                .ready_markers
                .unwrap_or_else(|| vec!["app ready".to_string()]),
            failure_markers: overrides.failure_markers.unwrap_or_else(|| {
                vec![
                    "[Fatal]".to_string(),
                    "[carb.crashreporter-breakpad.plugin]".to_string(),
                ]
            }),
            automation_port: overrides
                .automation_port
                .unwrap_or_else(|| component.default_automation_port()),
            extra_args: overrides.extra_args,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.timeouts.launch_secs, 300);
        assert_eq!(config.tools.pytest, vec!["python", "-m", "pytest"]);
        assert!(config.log_classification.error_words.contains(&"[Error]".to_string()));
    }

    #[test]
    fn test_component_overrides() {
        let config = Config::parse(
            r#"
[components.MAP2SIM]
executable = "bin/map2sim.exe"
kit_file = ""
ready_markers = ["MAP2SIM ready"]
extra_args = ["--no-window"]
"#,
        )
        .unwrap();

        let settings = config.component(Component::Map2sim);
        assert_eq!(settings.executable, PathBuf::from("bin/map2sim.exe"));
        assert!(settings.kit_file.is_none());
        assert_eq!(settings.ready_markers, vec!["MAP2SIM ready"]);
        assert_eq!(settings.automation_port, 8212);
        assert_eq!(settings.extra_args, vec!["--no-window"]);

        let dsrs = config.component(Component::Dsrs);
        assert_eq!(dsrs.kit_file, Some(PathBuf::from("apps/dsrs.kit")));
        assert_eq!(dsrs.ready_markers, vec!["app ready"]);
    }

    #[test]
    fn test_invalid_config_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dmf_config.toml");
        std::fs::write(&path, "[timeouts]\nlaunch_secs = \"soon\"\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
        assert!(err.to_string().contains("dmf_config.toml"));
    }

    #[test]
    fn test_example_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("dmf_config.example.toml");
        let config = Config::load_from(&path).unwrap();
        let defaults = Config::default();
        assert_eq!(config.timeouts.launch_secs, defaults.timeouts.launch_secs);
        assert_eq!(config.tools.pytest, defaults.tools.pytest);
        assert_eq!(
            config.log_classification.error_words,
            defaults.log_classification.error_words
        );
        assert_eq!(config.component(Component::Map2sim).automation_port, 8212);
    }
}

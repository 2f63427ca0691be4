//! Suite loading: parse, resolve paths, merge flags, validate

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::common::paths::TestPaths;
use crate::common::{Component, ComponentSettings, Config, Error, Result};

use super::config::{SuiteFile, TestEntry, TestFlags, TestKind};
use super::credentials::Credentials;

const DEFAULT_RESULTS_DIR: &str = "dmf_results";

/// One schedulable test: suite entry merged with suite defaults
#[derive(Debug, Clone, Serialize)]
pub struct TestCase {
    pub name: String,
    pub kind: TestKind,
    pub block: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    pub app_args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub flags: TestFlags,
    /// 1-based iteration number
    pub iteration: u32,
    /// 1-based attempt number within the iteration
    pub attempt: u32,
    /// Assigned when the test is scheduled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paths: Option<TestPaths>,
}

impl TestCase {
    /// Copy of this test for a later run; derived paths are cleared
    pub fn next_run(&self, iteration: u32, attempt: u32) -> Self {
        Self {
            iteration,
            attempt,
            paths: None,
            ..self.clone()
        }
    }

    /// Display label including iteration/attempt when relevant
    pub fn label(&self) -> String {
        let mut label = self.name.clone();
        if self.iteration > 1 {
            label.push_str(&format!(" #{}", self.iteration));
        }
        if self.attempt > 1 {
            label.push_str(&format!(" (attempt {})", self.attempt));
        }
        label
    }
}

/// Resolved environment section
#[derive(Debug, Clone)]
pub struct Environment {
    pub install_dir: Option<PathBuf>,
    pub build: Option<String>,
    pub results_dir: PathBuf,
    pub scripts_dir: PathBuf,
    executable_override: Option<PathBuf>,
}

/// A parsed and validated suite
#[derive(Debug, Clone)]
pub struct LoadedSuite {
    pub path: PathBuf,
    pub name: String,
    pub description: Option<String>,
    pub component: Component,
    pub settings: ComponentSettings,
    pub environment: Environment,
    pub credentials: Credentials,
    pub tests: Vec<TestCase>,
}

impl LoadedSuite {
    /// Path of the application executable, if one can be determined
    pub fn executable(&self) -> Option<PathBuf> {
        if let Some(exe) = &self.environment.executable_override {
            return Some(exe.clone());
        }
        if self.settings.executable.is_absolute() {
            return Some(self.settings.executable.clone());
        }
        self.environment
            .install_dir
            .as_ref()
            .map(|dir| self.settings.resolve(dir, &self.settings.executable))
    }

    /// Path of the `.kit` file passed to the executable
    pub fn kit_file(&self) -> Option<PathBuf> {
        let kit = self.settings.kit_file.as_ref()?;
        match &self.environment.install_dir {
            Some(dir) => Some(self.settings.resolve(dir, kit)),
            None => Some(kit.clone()),
        }
    }

    /// Keep only the named tests, in suite order
    pub fn retain_only(&mut self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        for name in names {
            if !self.tests.iter().any(|t| &t.name == name) {
                return Err(Error::UnknownTest(name.clone()));
            }
        }
        self.tests.retain(|t| names.contains(&t.name));
        Ok(())
    }
}

fn resolve_against(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Load a suite file for the given component
pub fn load_suite(path: &Path, component: Component, config: &Config) -> Result<LoadedSuite> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;

    let file: SuiteFile = toml::from_str(&content).map_err(|e| Error::SuiteParse {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let base_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    build_suite(file, path, &base_dir, component, config)
}

fn build_suite(
    file: SuiteFile,
    path: &Path,
    base_dir: &Path,
    component: Component,
    config: &Config,
) -> Result<LoadedSuite> {
    let env = &file.environment;
    let environment = Environment {
        install_dir: env.install_dir.as_ref().map(|p| resolve_against(base_dir, p)),
        build: env.build.as_ref().map(|b| {
            if is_url(b) {
                b.clone()
            } else {
                resolve_against(base_dir, Path::new(b)).display().to_string()
            }
        }),
        results_dir: resolve_against(
            base_dir,
            env.results_dir
                .as_deref()
                .unwrap_or_else(|| Path::new(DEFAULT_RESULTS_DIR)),
        ),
        scripts_dir: env
            .scripts_dir
            .as_ref()
            .map(|p| resolve_against(base_dir, p))
            .unwrap_or_else(|| base_dir.to_path_buf()),
        executable_override: env.executable.as_ref().map(|p| resolve_against(base_dir, p)),
    };

    if file.tests.is_empty() {
        return Err(Error::SuiteParse {
            path: path.display().to_string(),
            message: "suite defines no [[tests]]".to_string(),
        });
    }

    let suite_flags = file.flags.apply(TestFlags::default());
    let mut seen = HashSet::new();
    let mut tests = Vec::with_capacity(file.tests.len());

    for entry in file.tests {
        if !seen.insert(entry.name.clone()) {
            return Err(Error::invalid_test(&entry.name, "duplicate test name"));
        }
        tests.push(build_test(entry, suite_flags, &environment.scripts_dir)?);
    }

    let suite = LoadedSuite {
        path: path.to_path_buf(),
        name: file.suite.name,
        description: file.suite.description,
        component,
        settings: config.component(component),
        environment,
        credentials: Credentials::from_env(&file.credentials),
        tests,
    };

    if suite.executable().is_none() {
        if let Some(test) = suite.tests.iter().find(|t| t.kind.launches_app()) {
            return Err(Error::invalid_test(
                &test.name,
                "cannot resolve the application executable; set environment.install_dir or environment.executable",
            ));
        }
    }

    Ok(suite)
}

fn build_test(entry: TestEntry, suite_flags: TestFlags, scripts_dir: &Path) -> Result<TestCase> {
    let script = match (&entry.script, entry.kind.runs_scenario()) {
        (Some(script), _) => {
            let resolved = resolve_against(scripts_dir, script);
            if !resolved.is_file() {
                return Err(Error::invalid_test(
                    &entry.name,
                    format!("script '{}' not found", resolved.display()),
                ));
            }
            Some(resolved)
        }
        (None, true) => {
            return Err(Error::invalid_test(
                &entry.name,
                format!("{} tests require a 'script'", entry.kind.as_str()),
            ));
        }
        (None, false) => None,
    };

    Ok(TestCase {
        block: entry.block.unwrap_or_else(|| entry.name.clone()),
        flags: entry.flags.apply(suite_flags),
        name: entry.name,
        kind: entry.kind,
        description: entry.description,
        script,
        timeout_secs: entry.timeout_secs,
        app_args: entry.app_args,
        env: entry.env,
        iteration: 1,
        attempt: 1,
        paths: None,
    })
}

//! Kit application command line

use std::path::PathBuf;

use crate::common::paths::TestPaths;
use crate::common::{Error, Result};
use crate::suite::{LoadedSuite, TestCase, TestKind};

/// Extension setting that selects the port of the HTTP service the UI
/// automation scripts connect to
const AUTOMATION_PORT_SETTING: &str = "/exts/omni.services.transport.server.http/port";

/// Everything needed to spawn the application for one test
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub working_dir: Option<PathBuf>,
}

impl LaunchSpec {
    /// Build the launch command for `test`
    pub fn for_test(suite: &LoadedSuite, test: &TestCase, paths: &TestPaths) -> Result<Self> {
        let program = suite.executable().ok_or_else(|| {
            Error::invalid_test(&test.name, "cannot resolve the application executable")
        })?;

        let mut args = Vec::new();
        if let Some(kit_file) = suite.kit_file() {
            args.push(kit_file.display().to_string());
        }
        args.push(format!("--/log/file={}", paths.kit_log.display()));
        args.push("--/log/level=info".to_string());
        if test.kind == TestKind::Ui {
            args.push(format!(
                "--{}={}",
                AUTOMATION_PORT_SETTING, suite.settings.automation_port
            ));
        }
        args.extend(suite.settings.extra_args.iter().cloned());
        args.extend(test.app_args.iter().cloned());

        let mut env: Vec<(String, String)> = suite
            .credentials
            .env_vars()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        env.push(("DMF_TEST_DIR".to_string(), paths.dir.display().to_string()));
        env.extend(test.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        Ok(Self {
            working_dir: program.parent().map(PathBuf::from),
            program,
            args,
            env,
        })
    }

    /// Command line as a single string, for logs and reports
    pub fn command_line(&self) -> String {
        let mut parts = vec![quote(&self.program.display().to_string())];
        parts.extend(self.args.iter().map(|a| quote(a)));
        parts.join(" ")
    }
}

fn quote(arg: &str) -> String {
    if arg.contains(' ') {
        format!("\"{}\"", arg)
    } else {
        arg.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Component, Config};
    use crate::suite::load_suite;

    fn load(dir: &std::path::Path) -> LoadedSuite {
        std::fs::write(dir.join("test_ui.py"), "").unwrap();
        let path = dir.join("suite.toml");
        std::fs::write(
            &path,
            r#"
[suite]
name = "s"

[environment]
install_dir = "install"

[[tests]]
name = "boot"
kind = "launch"
app_args = ["--/app/fastShutdown=true"]

[[tests]]
name = "ui"
kind = "ui"
script = "test_ui.py"
env = { STAGE = "city" }
"#,
        )
        .unwrap();
        load_suite(&path, Component::Dsrs, &Config::default()).unwrap()
    }

    #[test]
    fn test_launch_args() {
        let dir = tempfile::tempdir().unwrap();
        let suite = load(dir.path());
        let paths = TestPaths::new(dir.path().join("run/01_boot"));

        let spec = LaunchSpec::for_test(&suite, &suite.tests[0], &paths).unwrap();
        assert!(spec.program.starts_with(dir.path().join("install")));
        assert!(spec.args[0].ends_with("dsrs.kit"));
        assert!(spec.args.iter().any(|a| a.starts_with("--/log/file=") && a.ends_with("kit.log")));
        assert!(!spec.args.iter().any(|a| a.contains(AUTOMATION_PORT_SETTING)));
        assert_eq!(spec.args.last().map(String::as_str), Some("--/app/fastShutdown=true"));
        assert!(spec.env.iter().any(|(k, _)| k == "DMF_TEST_DIR"));
    }

    #[test]
    fn test_ui_tests_enable_automation_port() {
        let dir = tempfile::tempdir().unwrap();
        let suite = load(dir.path());
        let paths = TestPaths::new(dir.path().join("run/02_ui"));

        let spec = LaunchSpec::for_test(&suite, &suite.tests[1], &paths).unwrap();
        assert!(spec
            .args
            .contains(&format!("--{}=8211", AUTOMATION_PORT_SETTING)));
        assert!(spec.env.contains(&("STAGE".to_string(), "city".to_string())));
    }

    #[test]
    fn test_command_line_quotes_spaces() {
        let spec = LaunchSpec {
            program: PathBuf::from("C:/Program Files/kit.exe"),
            args: vec!["--a".to_string()],
            env: Vec::new(),
            working_dir: None,
        };
        assert_eq!(spec.command_line(), "\"C:/Program Files/kit.exe\" --a");
    }
}

//! Scenario script execution

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::process::Command;

use crate::common::paths::TestPaths;
use crate::common::{Config, Error, Result};
use crate::launch::{Markers, OutputWatcher, Source};
use crate::process;
use crate::suite::{LoadedSuite, TestCase, TestKind};

use super::pytest::{judge, PytestSummary};

/// Command line for one scenario run
#[derive(Debug, Clone)]
pub struct ScenarioCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub script: PathBuf,
    pub working_dir: Option<PathBuf>,
}

impl ScenarioCommand {
    /// Build the pytest invocation for `test`
    pub fn for_test(
        config: &Config,
        suite: &LoadedSuite,
        test: &TestCase,
        paths: &TestPaths,
    ) -> Result<Self> {
        let script = test
            .script
            .clone()
            .ok_or_else(|| Error::invalid_test(&test.name, "no scenario script"))?;
        let (program, base_args) = config
            .tools
            .pytest
            .split_first()
            .ok_or_else(|| Error::Config("tools.pytest must not be empty".to_string()))?;

        let mut args = base_args.to_vec();
        args.push(script.display().to_string());
        args.extend(
            ["-rA", "--tb=short", "-p", "no:cacheprovider"]
                .iter()
                .map(|s| s.to_string()),
        );

        let mut env = vec![
            ("DMF_TEST_DIR".to_string(), paths.dir.display().to_string()),
            ("DMF_COMPONENT".to_string(), suite.component.to_string()),
            ("PYTHONUNBUFFERED".to_string(), "1".to_string()),
        ];
        if test.kind == TestKind::Ui {
            env.push((
                "DMF_AUTOMATION_URL".to_string(),
                format!("http://127.0.0.1:{}", suite.settings.automation_port),
            ));
        }
        env.extend(
            suite
                .credentials
                .env_vars()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v)),
        );
        env.extend(test.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        Ok(Self {
            program: program.clone(),
            args,
            env,
            working_dir: script.parent().map(PathBuf::from),
            script,
        })
    }
}

/// Verdict of a scenario run
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioOutcome {
    pub passed: bool,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<PytestSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub duration_secs: f64,
}

/// Run a scenario to completion, killing it after `timeout`
pub async fn run_scenario(
    cmd: &ScenarioCommand,
    transcript: &std::path::Path,
    timeout: Duration,
) -> Result<ScenarioOutcome> {
    tracing::info!("Running scenario {}", cmd.script.display());

    let mut command = Command::new(&cmd.program);
    command
        .args(&cmd.args)
        .envs(cmd.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &cmd.working_dir {
        command.current_dir(dir);
    }

    let mut child = command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::ToolNotFound(cmd.program.clone())
        } else {
            Error::tool_failed(&cmd.program, e.to_string())
        }
    })?;

    let mut sources: Vec<Source> = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        sources.push(Box::new(stdout));
    }
    if let Some(stderr) = child.stderr.take() {
        sources.push(Box::new(stderr));
    }
    let mut watcher = OutputWatcher::spawn(
        sources,
        Markers::default(),
        Some(transcript.to_path_buf()),
    );

    let started = Instant::now();
    // Output may close long before the process exits, so both share the timeout
    let finished = tokio::time::timeout(timeout, async {
        watcher.wait_closed(timeout).await;
        child.wait().await
    })
    .await;

    let status = match finished {
        Ok(status) => status?,
        Err(_) => {
            tracing::warn!(
                "Scenario {} timed out after {}s",
                cmd.script.display(),
                timeout.as_secs()
            );
            if let Some(pid) = child.id() {
                if let Err(e) = process::kill_tree(pid).await {
                    tracing::warn!("Failed to kill scenario process {}: {}", pid, e);
                }
            }
            let _ = child.start_kill();
            let _ = child.wait().await;
            if let Err(e) = watcher.stop().await {
                tracing::warn!("Scenario transcript incomplete: {}", e);
            }
            return Ok(ScenarioOutcome {
                passed: false,
                exit_code: None,
                timed_out: true,
                summary: None,
                reason: Some(Error::ScenarioTimeout(timeout.as_secs()).to_string()),
                duration_secs: started.elapsed().as_secs_f64(),
            });
        }
    };

    let captured = watcher.finish().await?;
    let summary = PytestSummary::parse(&captured.tail);
    let verdict = judge(status.code(), summary.as_ref());

    let outcome = ScenarioOutcome {
        passed: verdict.is_ok(),
        exit_code: status.code(),
        timed_out: false,
        summary,
        reason: verdict.err(),
        duration_secs: started.elapsed().as_secs_f64(),
    };

    match &outcome.reason {
        None => tracing::info!("Scenario {} passed", cmd.script.display()),
        Some(reason) => tracing::warn!("Scenario {} failed: {}", cmd.script.display(), reason),
    }

    Ok(outcome)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str) -> ScenarioCommand {
        ScenarioCommand {
            program: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            env: Vec::new(),
            script: PathBuf::from("test_scenario.py"),
            working_dir: None,
        }
    }

    #[tokio::test]
    async fn test_passing_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let transcript = dir.path().join("scenario.log");
        let outcome = run_scenario(
            &shell("echo 'test_a PASSED'; echo '==== 1 passed in 0.10s ===='"),
            &transcript,
            Duration::from_secs(10),
        )
        .await
        .unwrap();

        assert!(outcome.passed, "{:?}", outcome.reason);
        assert_eq!(outcome.summary.unwrap().passed, 1);
        assert!(std::fs::read_to_string(&transcript).unwrap().contains("1 passed"));
    }

    #[tokio::test]
    async fn test_failing_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = run_scenario(
            &shell("echo '==== 1 failed, 1 passed in 0.10s ===='; exit 1"),
            &dir.path().join("scenario.log"),
            Duration::from_secs(10),
        )
        .await
        .unwrap();

        assert!(!outcome.passed);
        assert_eq!(outcome.exit_code, Some(1));
        assert_eq!(outcome.reason.as_deref(), Some("1 passed, 1 failed"));
    }

    #[tokio::test]
    async fn test_scenario_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = run_scenario(
            &shell("exec sleep 30"),
            &dir.path().join("scenario.log"),
            Duration::from_millis(300),
        )
        .await
        .unwrap();

        assert!(outcome.timed_out);
        assert!(!outcome.passed);
    }

    #[tokio::test]
    async fn test_timeout_applies_after_output_closes() {
        let dir = tempfile::tempdir().unwrap();
        let started = Instant::now();
        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            run_scenario(
                &shell("echo starting; exec >/dev/null 2>&1; sleep 20"),
                &dir.path().join("scenario.log"),
                Duration::from_millis(500),
            ),
        )
        .await
        .expect("scenario timeout was not enforced")
        .unwrap();

        assert!(outcome.timed_out);
        assert!(!outcome.passed);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("scenario.log")).unwrap(),
            "starting\n"
        );
    }

    #[tokio::test]
    async fn test_missing_tool() {
        let dir = tempfile::tempdir().unwrap();
        let mut cmd = shell("");
        cmd.program = "/nonexistent/pytest".to_string();
        let err = run_scenario(&cmd, &dir.path().join("scenario.log"), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolNotFound(_)));
    }
}

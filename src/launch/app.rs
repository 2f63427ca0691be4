//! Running application session

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};

use crate::common::{Error, Result};
use crate::process;

use super::command::LaunchSpec;
use super::watcher::{CapturedOutput, Markers, OutputWatcher, Source, WatchOutcome};

/// Result of waiting for the application to become ready
#[derive(Debug, Clone)]
pub struct LaunchVerdict {
    pub outcome: WatchOutcome,
    pub elapsed: Duration,
    /// Timed out with the process still running
    pub frozen: bool,
}

impl LaunchVerdict {
    pub fn is_ready(&self) -> bool {
        matches!(self.outcome, WatchOutcome::Ready { .. })
    }

    /// Convert a non-ready verdict into the matching error
    pub fn into_result(self, timeout: Duration) -> Result<Duration> {
        match self.outcome {
            WatchOutcome::Ready { .. } => Ok(self.elapsed),
            WatchOutcome::Failed { line } => Err(Error::LaunchAborted(line)),
            WatchOutcome::Exited => Err(Error::AppExited),
            WatchOutcome::TimedOut => Err(Error::LaunchTimeout(timeout.as_secs())),
        }
    }
}

/// A launched application and the watcher on its output
pub struct AppSession {
    child: Child,
    pid: Option<u32>,
    watcher: OutputWatcher,
    launched_at: Instant,
    program: String,
}

impl AppSession {
    /// Spawn the application described by `spec`
    pub fn launch(spec: &LaunchSpec, markers: Markers, transcript: &Path) -> Result<Self> {
        let program = spec.program.display().to_string();
        if !spec.program.exists() {
            return Err(Error::launch_failed(&program, "executable does not exist"));
        }

        tracing::info!("Launching {}", spec.command_line());

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::launch_failed(&program, e.to_string()))?;

        let mut sources: Vec<Source> = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            sources.push(Box::new(stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            sources.push(Box::new(stderr));
        }

        let pid = child.id();
        tracing::debug!("{} started with pid {:?}", program, pid);

        Ok(Self {
            watcher: OutputWatcher::spawn(sources, markers, Some(transcript.to_path_buf())),
            child,
            pid,
            launched_at: Instant::now(),
            program,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the process has not exited yet
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Wait for a ready marker, a failure marker, EOF or the timeout
    pub async fn wait_ready(&mut self, timeout: Duration) -> LaunchVerdict {
        let outcome = self.watcher.wait(timeout).await;
        let elapsed = self.launched_at.elapsed();
        let frozen = outcome == WatchOutcome::TimedOut && self.is_running();

        match &outcome {
            WatchOutcome::Ready { .. } => {
                tracing::info!("{} ready after {:.1}s", self.program, elapsed.as_secs_f64())
            }
            WatchOutcome::Failed { line } => {
                tracing::warn!("{} reported a failure: {}", self.program, line)
            }
            WatchOutcome::Exited => tracing::warn!("{} exited before ready", self.program),
            WatchOutcome::TimedOut => tracing::warn!(
                "{} not ready after {}s{}",
                self.program,
                timeout.as_secs(),
                if frozen { " (frozen)" } else { "" }
            ),
        }

        LaunchVerdict {
            outcome,
            elapsed,
            frozen,
        }
    }

    /// Terminate the application and collect its output
    pub async fn close(mut self, timeout: Duration) -> Result<CapturedOutput> {
        if self.is_running() {
            if let Some(pid) = self.pid {
                if let Err(e) = process::kill_tree(pid).await {
                    tracing::warn!("Failed to kill process tree {}: {}", pid, e);
                }
            }
            if self.is_running() {
                let _ = self.child.start_kill();
            }
        }

        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => tracing::debug!("{} exited with {}", self.program, status),
            Ok(Err(e)) => tracing::warn!("Failed to wait for {}: {}", self.program, e),
            Err(_) => {
                return Err(Error::launch_failed(
                    &self.program,
                    format!("process did not exit within {}s", timeout.as_secs()),
                ))
            }
        }

        // Grandchildren may still hold the pipes open
        if !self.watcher.wait_closed(timeout).await {
            tracing::warn!("Output of {} still open after exit", self.program);
            return self.watcher.stop().await;
        }
        self.watcher.finish().await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn shell_spec(script: &str) -> LaunchSpec {
        LaunchSpec {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), script.to_string()],
            env: Vec::new(),
            working_dir: None,
        }
    }

    fn markers() -> Markers {
        Markers {
            ready: vec!["app ready".to_string()],
            failure: vec!["[Fatal]".to_string()],
        }
    }

    #[tokio::test]
    async fn test_ready_then_close() {
        let dir = tempfile::tempdir().unwrap();
        let transcript = dir.path().join("stdout.log");
        let mut app = AppSession::launch(
            &shell_spec("echo booting; echo app ready; exec sleep 30"),
            markers(),
            &transcript,
        )
        .unwrap();

        let verdict = app.wait_ready(Duration::from_secs(10)).await;
        assert!(verdict.is_ready());
        assert!(!verdict.frozen);

        let captured = app.close(Duration::from_secs(10)).await.unwrap();
        assert_eq!(captured.lines, 2);
        assert!(std::fs::read_to_string(&transcript).unwrap().contains("app ready"));
    }

    #[tokio::test]
    async fn test_close_with_inherited_pipes_keeps_output() {
        let dir = tempfile::tempdir().unwrap();
        let transcript = dir.path().join("stdout.log");
        let mut app = AppSession::launch(
            &shell_spec("echo booting; echo app ready; (sleep 5 &); exit 0"),
            markers(),
            &transcript,
        )
        .unwrap();
        assert!(app.wait_ready(Duration::from_secs(10)).await.is_ready());

        let captured = app.close(Duration::from_millis(500)).await.unwrap();
        assert_eq!(captured.lines, 2);
        assert_eq!(captured.transcript.as_deref(), Some(transcript.as_path()));
        assert_eq!(
            std::fs::read_to_string(&transcript).unwrap(),
            "booting\napp ready\n"
        );
    }

    #[tokio::test]
    async fn test_frozen_application() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = AppSession::launch(
            &shell_spec("echo booting; exec sleep 30"),
            markers(),
            &dir.path().join("stdout.log"),
        )
        .unwrap();

        let verdict = app.wait_ready(Duration::from_millis(300)).await;
        assert!(verdict.frozen);
        assert!(matches!(
            verdict.into_result(Duration::from_secs(1)),
            Err(Error::LaunchTimeout(1))
        ));
        app.close(Duration::from_secs(10)).await.unwrap();
    }

    #[tokio::test]
    async fn test_exit_without_marker() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = AppSession::launch(
            &shell_spec("echo nothing to see"),
            markers(),
            &dir.path().join("stdout.log"),
        )
        .unwrap();

        let verdict = app.wait_ready(Duration::from_secs(10)).await;
        assert_eq!(verdict.outcome, WatchOutcome::Exited);
        assert!(!verdict.frozen);
    }

    #[test]
    fn test_missing_executable() {
        let spec = LaunchSpec {
            program: PathBuf::from("/definitely/not/here/kit"),
            args: Vec::new(),
            env: Vec::new(),
            working_dir: None,
        };
        let err = AppSession::launch(&spec, markers(), Path::new("/tmp/unused.log"))
            .err()
            .unwrap();
        assert!(matches!(err, Error::LaunchFailed { .. }));
    }
}

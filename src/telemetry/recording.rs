//! Desktop screen recording with ffmpeg

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};

use crate::common::{Error, Result};

use super::{locate_tool, Monitor, MonitorContext, MonitorReport};

pub const RECORDING_FILE: &str = "recording.mp4";
pub const RECORDER_LOG_FILE: &str = "ffmpeg.log";

/// Grace period in which a broken ffmpeg setup is expected to exit
const STARTUP_CHECK: Duration = Duration::from_millis(500);

/// ffmpeg arguments capturing the whole desktop into `output`
pub fn recording_args(output: &Path) -> Vec<String> {
    let (grabber, input) = if cfg!(windows) {
        ("gdigrab", "desktop".to_string())
    } else {
        ("x11grab", std::env::var("DISPLAY").unwrap_or_else(|_| ":0".to_string()))
    };
    [
        "-y",
        "-f",
        grabber,
        "-framerate",
        "15",
        "-i",
        &input,
        "-c:v",
        "libx264",
        "-preset",
        "ultrafast",
        "-pix_fmt",
        "yuv420p",
    ]
    .iter()
    .map(|s| s.to_string())
    .chain(std::iter::once(output.display().to_string()))
    .collect()
}

/// Records the screen for the duration of a test
pub struct ScreenRecorder {
    tool: String,
    stop_timeout: Duration,
    child: Option<Child>,
    output: Option<PathBuf>,
    started: Option<Instant>,
}

impl ScreenRecorder {
    pub fn new(tool: impl Into<String>, stop_timeout: Duration) -> Self {
        Self {
            tool: tool.into(),
            stop_timeout,
            child: None,
            output: None,
            started: None,
        }
    }
}

#[async_trait]
impl Monitor for ScreenRecorder {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn start(&mut self, ctx: &MonitorContext) -> Result<()> {
        let program = locate_tool(&self.tool)?;
        let output = ctx.dir.join(RECORDING_FILE);
        let log_path = ctx.dir.join(RECORDER_LOG_FILE);
        let log = std::fs::File::create(&log_path).map_err(|e| Error::FileWrite {
            path: log_path.display().to_string(),
            error: e.to_string(),
        })?;

        let mut child = Command::new(&program)
            .args(recording_args(&output))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::from(log))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::monitor(self.name(), e.to_string()))?;

        tokio::time::sleep(STARTUP_CHECK).await;
        if let Ok(Some(status)) = child.try_wait() {
            return Err(Error::monitor(
                self.name(),
                format!("ffmpeg exited with {} (see {})", status, log_path.display()),
            ));
        }

        tracing::debug!("Recording screen to {}", output.display());
        self.child = Some(child);
        self.output = Some(output);
        self.started = Some(Instant::now());
        Ok(())
    }

    async fn stop(&mut self) -> Result<MonitorReport> {
        let Some(mut child) = self.child.take() else {
            return Ok(MonitorReport::default());
        };

        // `q` makes ffmpeg finalize the container
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(b"q\n").await {
                tracing::debug!("Failed to ask ffmpeg to stop: {}", e);
            }
        }

        match tokio::time::timeout(self.stop_timeout, child.wait()).await {
            Ok(Ok(status)) => tracing::debug!("ffmpeg exited with {}", status),
            Ok(Err(e)) => tracing::warn!("Failed to wait for ffmpeg: {}", e),
            Err(_) => {
                tracing::warn!(
                    "ffmpeg did not stop within {}s, killing it",
                    self.stop_timeout.as_secs()
                );
                let _ = child.kill().await;
            }
        }

        let mut report = MonitorReport::default();
        if let Some(started) = self.started.take() {
            report.metrics.insert(
                "recording_secs".to_string(),
                serde_json::json!(started.elapsed().as_secs_f64()),
            );
        }
        let output = self.output.take();
        let written = match &output {
            Some(path) => tokio::fs::metadata(path)
                .await
                .map(|m| m.len() > 0)
                .unwrap_or(false),
            None => false,
        };
        if !written {
            return Err(Error::monitor(self.name(), "no recording was written"));
        }
        report.artifact = output;
        Ok(report)
    }
}

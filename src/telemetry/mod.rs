//! Auxiliary telemetry collected while a test runs
//!
//! Each monitor is started around the test and stopped afterwards; stopping
//! writes the monitor's artifact into the test directory and returns summary
//! metrics for the report.

mod memory;
mod recording;
mod sampler;
mod vram;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::common::{Error, Result};

pub use memory::{parse_proc_status_rss_kib, MemoryMonitor};
pub use recording::{recording_args, ScreenRecorder};
pub use sampler::{Sample, Sampler};
pub use vram::{parse_nvidia_smi, GpuMemory, VramMonitor};

/// What a monitor needs to know about the test
#[derive(Debug, Clone)]
pub struct MonitorContext {
    /// Application pid, when the test launched one
    pub pid: Option<u32>,
    /// Test directory for artifacts
    pub dir: PathBuf,
    pub interval: Duration,
}

/// Artifact and metrics produced by a stopped monitor
#[derive(Debug, Clone, Default)]
pub struct MonitorReport {
    pub artifact: Option<PathBuf>,
    pub metrics: BTreeMap<String, serde_json::Value>,
}

/// A background collector started and stopped around a test
#[async_trait]
pub trait Monitor: Send {
    /// Short name used in logs and process-specific errors
    fn name(&self) -> &'static str;

    /// Begin collecting
    async fn start(&mut self, ctx: &MonitorContext) -> Result<()>;

    /// Stop collecting and write the artifact
    async fn stop(&mut self) -> Result<MonitorReport>;
}

/// Write a JSON artifact, pretty-printed
pub(crate) async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, json)
        .await
        .map_err(|e| Error::FileWrite {
            path: path.display().to_string(),
            error: e.to_string(),
        })
}

/// Locate a tool on PATH, or accept an explicit path
pub(crate) fn locate_tool(tool: &str) -> Result<PathBuf> {
    let path = Path::new(tool);
    if path.components().count() > 1 {
        return if path.exists() {
            Ok(path.to_path_buf())
        } else {
            Err(Error::ToolNotFound(tool.to_string()))
        };
    }
    which::which(tool).map_err(|_| Error::ToolNotFound(tool.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_missing_tool() {
        assert!(matches!(
            locate_tool("definitely-not-a-real-tool-dmf"),
            Err(Error::ToolNotFound(_))
        ));
        assert!(matches!(
            locate_tool("/no/such/dir/ffmpeg"),
            Err(Error::ToolNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_json(&path, &serde_json::json!({"peak": 3})).await.unwrap();
        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(value["peak"], 3);
    }
}

//! Resident memory sampling of the application process

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;

use crate::common::{Error, Result};

use super::sampler::{Sample, Sampler};
use super::{write_json, Monitor, MonitorContext, MonitorReport};

pub const MEMORY_FILE: &str = "process_memory.json";

#[derive(Debug, Serialize)]
struct MemoryReading {
    rss_kib: u64,
}

#[derive(Serialize)]
struct MemoryArtifact<'a> {
    pid: u32,
    samples: &'a [Sample<MemoryReading>],
    peak_rss_kib: Option<u64>,
}

/// `VmRSS` from the contents of `/proc/<pid>/status`, in KiB
pub fn parse_proc_status_rss_kib(status: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kib| kib.parse().ok())
}

#[cfg(windows)]
async fn read_rss_kib(pid: u32) -> Result<u64> {
    let cmd = crate::process::tasklist_command(pid);
    let output = cmd.output().await?;
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|line| crate::process::tasklist_pid(line) == Some(pid))
        .find_map(crate::process::tasklist_memory_kib)
        .ok_or_else(|| Error::monitor("memory", format!("process {} not found", pid)))
}

#[cfg(not(windows))]
async fn read_rss_kib(pid: u32) -> Result<u64> {
    let path = format!("/proc/{}/status", pid);
    let status = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| Error::monitor("memory", format!("{}: {}", path, e)))?;
    parse_proc_status_rss_kib(&status)
        .ok_or_else(|| Error::monitor("memory", format!("no VmRSS in {}", path)))
}

/// Samples the resident set size of the launched application
#[derive(Default)]
pub struct MemoryMonitor {
    pid: Option<u32>,
    sampler: Option<Sampler<MemoryReading>>,
    artifact: Option<PathBuf>,
}

impl MemoryMonitor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Monitor for MemoryMonitor {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn start(&mut self, ctx: &MonitorContext) -> Result<()> {
        let pid = ctx
            .pid
            .ok_or_else(|| Error::monitor(self.name(), "no application process to sample"))?;
        read_rss_kib(pid).await?;

        self.sampler = Some(Sampler::spawn("memory", ctx.interval, move || async move {
            read_rss_kib(pid).await.map(|rss_kib| MemoryReading { rss_kib })
        }));
        self.pid = Some(pid);
        self.artifact = Some(ctx.dir.join(MEMORY_FILE));
        Ok(())
    }

    async fn stop(&mut self) -> Result<MonitorReport> {
        let (Some(pid), Some(mut sampler), Some(path)) =
            (self.pid.take(), self.sampler.take(), self.artifact.take())
        else {
            return Ok(MonitorReport::default());
        };
        let samples = sampler.stop().await?;
        let peak_rss_kib = samples.iter().map(|s| s.value.rss_kib).max();

        write_json(
            &path,
            &MemoryArtifact {
                pid,
                samples: &samples,
                peak_rss_kib,
            },
        )
        .await?;

        let mut report = MonitorReport {
            artifact: Some(path),
            ..Default::default()
        };
        if let Some(kib) = peak_rss_kib {
            report
                .metrics
                .insert("peak_memory_mib".to_string(), (kib / 1024).into());
        }
        Ok(report)
    }
}

//! GPU memory sampling through nvidia-smi

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;

use crate::common::{Error, Result};
use crate::process::ToolCommand;

use super::sampler::{Sample, Sampler};
use super::{locate_tool, write_json, Monitor, MonitorContext, MonitorReport};

pub const VRAM_FILE: &str = "vram.json";

const QUERY_ARGS: &[&str] = &[
    "--query-gpu=index,name,memory.used,memory.total",
    "--format=csv,noheader,nounits",
];

/// Memory usage of one GPU
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpuMemory {
    pub index: u32,
    pub name: String,
    pub used_mib: u64,
    pub total_mib: u64,
}

#[derive(Debug, Serialize)]
struct GpuReading {
    gpus: Vec<GpuMemory>,
}

#[derive(Serialize)]
struct VramArtifact<'a> {
    samples: &'a [Sample<GpuReading>],
    /// Peak used MiB per GPU index
    peak_used_mib: BTreeMap<u32, u64>,
}

/// Parse `index, name, used, total` rows
pub fn parse_nvidia_smi(output: &str) -> Vec<GpuMemory> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() < 4 {
                return None;
            }
            // GPU names may themselves contain commas
            let n = fields.len();
            Some(GpuMemory {
                index: fields[0].parse().ok()?,
                name: fields[1..n - 2].join(","),
                used_mib: fields[n - 2].parse().ok()?,
                total_mib: fields[n - 1].parse().ok()?,
            })
        })
        .collect()
}

async fn query(cmd: &ToolCommand) -> Result<Vec<GpuMemory>> {
    let output = cmd.output().await?;
    if !output.status.success() {
        return Err(Error::tool_failed(
            &cmd.program,
            String::from_utf8_lossy(&output.stdout).trim().to_string(),
        ));
    }
    let gpus = parse_nvidia_smi(&String::from_utf8_lossy(&output.stdout));
    if gpus.is_empty() {
        return Err(Error::tool_failed(&cmd.program, "no GPUs reported"));
    }
    Ok(gpus)
}

/// Samples VRAM usage of every GPU in the system
pub struct VramMonitor {
    tool: String,
    sampler: Option<Sampler<GpuReading>>,
    artifact: Option<PathBuf>,
}

impl VramMonitor {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            sampler: None,
            artifact: None,
        }
    }
}

#[async_trait]
impl Monitor for VramMonitor {
    fn name(&self) -> &'static str {
        "vram"
    }

    async fn start(&mut self, ctx: &MonitorContext) -> Result<()> {
        let program = locate_tool(&self.tool)?;
        let cmd = ToolCommand::new(&program.display().to_string(), QUERY_ARGS);

        // Fail fast when the driver is unavailable
        let gpus = query(&cmd)
            .await
            .map_err(|e| Error::monitor(self.name(), e.to_string()))?;
        tracing::debug!("Sampling VRAM of {} GPU(s)", gpus.len());

        self.sampler = Some(Sampler::spawn("vram", ctx.interval, move || {
            let cmd = cmd.clone();
            async move { query(&cmd).await.map(|gpus| GpuReading { gpus }) }
        }));
        self.artifact = Some(ctx.dir.join(VRAM_FILE));
        Ok(())
    }

    async fn stop(&mut self) -> Result<MonitorReport> {
        let (Some(mut sampler), Some(path)) = (self.sampler.take(), self.artifact.take()) else {
            return Ok(MonitorReport::default());
        };
        let samples = sampler.stop().await?;

        let mut peak_used_mib: BTreeMap<u32, u64> = BTreeMap::new();
        for gpu in samples.iter().flat_map(|s| &s.value.gpus) {
            let peak = peak_used_mib.entry(gpu.index).or_default();
            *peak = (*peak).max(gpu.used_mib);
        }
        let peak = peak_used_mib.values().copied().max();

        write_json(
            &path,
            &VramArtifact {
                samples: &samples,
                peak_used_mib,
            },
        )
        .await?;

        let mut report = MonitorReport {
            artifact: Some(path),
            ..Default::default()
        };
        report
            .metrics
            .insert("vram_samples".to_string(), samples.len().into());
        if let Some(peak) = peak {
            report.metrics.insert("peak_vram_mib".to_string(), peak.into());
        }
        Ok(report)
    }
}

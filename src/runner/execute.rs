//! Execution of a single test

use std::time::Duration;

use chrono::Local;

use crate::common::paths::TestPaths;
use crate::common::{Config, Error};
use crate::launch::{AppSession, LaunchSpec, Markers};
use crate::logscan::{LogClassifier, LogSummary};
use crate::process;
use crate::queue::{Artifacts, TestOutcome, Verdicts};
use crate::scenario::{run_scenario, ScenarioCommand};
use crate::suite::{LoadedSuite, TestCase, TestKind};
use crate::telemetry::{
    MemoryMonitor, Monitor, MonitorContext, ScreenRecorder, VramMonitor,
};

/// Shared state for every test of a run
pub struct RunContext {
    pub config: Config,
    pub suite: LoadedSuite,
    pub classifier: LogClassifier,
}

impl RunContext {
    pub fn new(config: Config, suite: LoadedSuite) -> Self {
        Self {
            classifier: LogClassifier::from_config(&config.log_classification),
            config,
            suite,
        }
    }

    fn markers(&self) -> Markers {
        Markers {
            ready: self.suite.settings.ready_markers.clone(),
            failure: self.suite.settings.failure_markers.clone(),
        }
    }

    fn launch_timeout(&self, test: &TestCase) -> Duration {
        let secs = match (test.kind, test.timeout_secs) {
            (TestKind::Launch, Some(secs)) => secs,
            _ => self.config.timeouts.launch_secs,
        };
        Duration::from_secs(secs)
    }

    fn scenario_timeout(&self, test: &TestCase) -> Duration {
        Duration::from_secs(test.timeout_secs.unwrap_or(self.config.timeouts.scenario_secs))
    }
}

/// A started monitor and whether its failure fails the test
struct Running {
    monitor: Box<dyn Monitor>,
    required: bool,
}

/// Accumulates findings while a test executes
struct Findings {
    error: Option<String>,
    verdicts: Verdicts,
    metrics: std::collections::BTreeMap<String, serde_json::Value>,
    artifacts: Artifacts,
    froze: bool,
}

impl Findings {
    /// Keep the first error; later ones are usually consequences
    fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        if self.error.is_none() {
            self.error = Some(message);
        }
    }

    fn process_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.verdicts.add_process_error(message);
    }

    fn metric(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.metrics.insert(key.to_string(), value.into());
    }
}

async fn start_monitor(
    rec: &mut Findings,
    running: &mut Vec<Running>,
    mut monitor: Box<dyn Monitor>,
    ctx: &MonitorContext,
    required: bool,
) {
    match monitor.start(ctx).await {
        Ok(()) => running.push(Running { monitor, required }),
        Err(e) => {
            let message = format!("{}: {}", monitor.name(), e);
            if required {
                rec.fail(message);
            } else {
                rec.process_error(message);
            }
        }
    }
}

async fn stop_monitors(rec: &mut Findings, running: Vec<Running>) {
    for Running {
        mut monitor,
        required,
    } in running.into_iter().rev()
    {
        match monitor.stop().await {
            Ok(report) => {
                rec.metrics.extend(report.metrics);
                rec.artifacts.files.extend(report.artifact);
            }
            Err(e) => {
                let message = format!("{}: {}", monitor.name(), e);
                if required {
                    rec.fail(message);
                } else {
                    rec.process_error(message);
                }
            }
        }
    }
}

/// Run one test end to end
///
/// Never returns an error: every failure is folded into the outcome so one
/// test cannot abort the suite.
pub async fn execute_test(ctx: &RunContext, test: &TestCase, paths: &TestPaths) -> TestOutcome {
    let started_at = Local::now();
    if let Err(e) = tokio::fs::create_dir_all(&paths.dir).await {
        return TestOutcome::failed(
            format!("Failed to create {}: {}", paths.dir.display(), e),
            started_at,
        );
    }

    let settings = &ctx.suite.settings;
    let interval = Duration::from_millis(ctx.config.telemetry.sample_interval_ms.max(10));
    let mut rec = Findings {
        error: None,
        verdicts: Verdicts::default(),
        metrics: Default::default(),
        artifacts: Artifacts {
            dir: Some(paths.dir.clone()),
            files: Vec::new(),
        },
        froze: false,
    };
    let mut running: Vec<Running> = Vec::new();

    if test.flags.kill_existing && test.kind.launches_app() {
        if let Err(e) = process::kill_by_name(&settings.process_name).await {
            rec.process_error(format!("kill {}: {}", settings.process_name, e));
        }
    }

    if test.flags.record_screen {
        let recorder = ScreenRecorder::new(
            ctx.config.tools.ffmpeg.clone(),
            Duration::from_secs(ctx.config.timeouts.recording_stop_secs),
        );
        let monitor_ctx = MonitorContext {
            pid: None,
            dir: paths.dir.clone(),
            interval,
        };
        start_monitor(
            &mut rec,
            &mut running,
            Box::new(recorder),
            &monitor_ctx,
            test.flags.recording_required,
        )
        .await;
    }

    // A required recording that failed to start fails the test before launch
    let mut session = None;
    if rec.error.is_none() && test.kind.launches_app() {
        match LaunchSpec::for_test(&ctx.suite, test, paths)
            .and_then(|launch| AppSession::launch(&launch, ctx.markers(), &paths.stdout_log))
        {
            Ok(app) => session = Some(app),
            Err(e) => {
                rec.verdicts.launch = Some(false);
                rec.fail(e.to_string());
            }
        }
    }

    let monitor_ctx = MonitorContext {
        pid: session.as_ref().and_then(|s| s.pid()),
        dir: paths.dir.clone(),
        interval,
    };
    if rec.error.is_none() && test.flags.collect_vram {
        let vram = VramMonitor::new(ctx.config.tools.nvidia_smi.clone());
        start_monitor(&mut rec, &mut running, Box::new(vram), &monitor_ctx, false).await;
    }
    if rec.error.is_none() && test.flags.collect_memory {
        if monitor_ctx.pid.is_some() {
            start_monitor(
                &mut rec,
                &mut running,
                Box::new(MemoryMonitor::new()),
                &monitor_ctx,
                false,
            )
            .await;
        } else {
            tracing::debug!("{}: no application process, memory not sampled", test.name);
        }
    }

    let mut ready = !test.kind.launches_app();
    if let Some(app) = session.as_mut() {
        let timeout = ctx.launch_timeout(test);
        let verdict = app.wait_ready(timeout).await;
        rec.metric("launch_secs", verdict.elapsed.as_secs_f64());
        rec.froze = verdict.frozen;
        ready = verdict.is_ready();
        rec.verdicts.launch = Some(ready);
        if let Err(e) = verdict.into_result(timeout) {
            rec.fail(e.to_string());
        }
    }

    if ready && test.kind.runs_scenario() {
        let timeout = ctx.scenario_timeout(test);
        let result = match ScenarioCommand::for_test(&ctx.config, &ctx.suite, test, paths) {
            Ok(cmd) => run_scenario(&cmd, &paths.scenario_log, timeout).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(outcome) => {
                rec.verdicts.scenario = Some(outcome.passed);
                rec.metric("scenario_secs", outcome.duration_secs);
                if let Some(summary) = &outcome.summary {
                    if let Ok(value) = serde_json::to_value(summary) {
                        rec.metric("pytest", value);
                    }
                }
                if let Some(reason) = outcome.reason {
                    let script = test
                        .script
                        .as_ref()
                        .map(|s| s.display().to_string())
                        .unwrap_or_default();
                    rec.fail(Error::scenario_failed(&script, reason).to_string());
                }
            }
            Err(e) => {
                rec.verdicts.scenario = Some(false);
                rec.fail(e.to_string());
            }
        }

        if test.kind == TestKind::Ui {
            if let Some(app) = session.as_mut() {
                if !app.is_running() {
                    rec.fail("Application exited during the scenario");
                }
            }
        }
    }

    stop_monitors(&mut rec, std::mem::take(&mut running)).await;

    if let Some(app) = session.take() {
        match app
            .close(Duration::from_secs(ctx.config.timeouts.shutdown_secs))
            .await
        {
            Ok(captured) => rec.metric("stdout_lines", captured.lines),
            Err(e) => rec.process_error(format!("shutdown: {}", e)),
        }
    }

    let logs = classify_logs(&ctx.classifier, paths).await;
    rec.verdicts.log_errors = logs.errors;
    rec.verdicts.log_warnings = logs.warnings;
    if !logs.error_lines.is_empty() {
        rec.metric("log_error_lines", logs.error_lines.clone());
    }
    if ctx.config.log_classification.fail_on_error && logs.errors > 0 {
        rec.fail(format!("{} error line(s) in application logs", logs.errors));
    }

    for path in [&paths.stdout_log, &paths.kit_log, &paths.scenario_log] {
        if path.exists() {
            rec.artifacts.files.push(path.clone());
        }
    }

    let passed = rec.error.is_none()
        && rec.verdicts.launch != Some(false)
        && rec.verdicts.scenario != Some(false);

    TestOutcome {
        passed,
        error: rec.error,
        verdicts: rec.verdicts,
        metrics: rec.metrics,
        artifacts: rec.artifacts,
        froze: rec.froze,
        started_at,
        finished_at: Local::now(),
    }
}

async fn classify_logs(classifier: &LogClassifier, paths: &TestPaths) -> LogSummary {
    let mut summary = LogSummary::default();
    for path in [&paths.kit_log, &paths.stdout_log, &paths.scenario_log] {
        match classifier.scan_file(path).await {
            Ok(found) => summary.merge(found, classifier.max_lines()),
            Err(e) => tracing::warn!("Failed to scan {}: {}", path.display(), e),
        }
    }
    summary
}

//! Logging and tracing configuration
//!
//! Console logging for every command. A suite run additionally writes a
//! detailed `dmf.log` into its run directory.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Name of the per-run log file
pub const RUN_LOG_FILE: &str = "dmf.log";

fn default_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

fn cli_subscriber() -> impl tracing::Subscriber + Send + Sync + 'static {
    tracing_subscriber::registry()
        .with(default_filter("dmf=info,warn"))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
}

/// Initialize tracing for the CLI (stderr logging)
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate, WARN for dependencies.
pub fn init_cli() {
    cli_subscriber().init();
}

/// Run `f` with stderr logging before the global subscriber exists
///
/// A suite run installs its subscriber only once the run directory is known;
/// config and suite loading happen earlier.
pub fn with_cli<T>(f: impl FnOnce() -> T) -> T {
    tracing::subscriber::with_default(cli_subscriber(), f)
}

/// Initialize tracing for a suite run (stderr + run log file)
///
/// The returned guard flushes the file writer when dropped and must be kept
/// alive for the duration of the run.
pub fn init_run(run_dir: &Path) -> WorkerGuard {
    let appender = tracing_appender::rolling::never(run_dir, RUN_LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(default_filter("dmf=debug,info"));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .with_filter(default_filter("dmf=info,warn"));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .init();

    guard
}

//! Output watcher
//!
//! Reader tasks forward the lines of a child's stdout/stderr into one watcher
//! task. The watcher writes the transcript, keeps a tail of recent lines and
//! publishes readiness/failure on a `watch` channel. Callers race that channel
//! against a timeout. The watcher keeps draining after a decision so the child
//! never blocks on a full pipe.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::common::{find_marker, Error, Result};

/// Number of trailing lines kept in memory
const TAIL_LINES: usize = 200;

/// A byte stream to read lines from
pub type Source = Box<dyn AsyncRead + Send + Unpin>;

/// Marker strings the watcher looks for
#[derive(Debug, Clone, Default)]
pub struct Markers {
    pub ready: Vec<String>,
    pub failure: Vec<String>,
}

/// First decisive marker seen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Pending,
    Ready { line: String },
    Failed { line: String },
}

/// State published by the watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchState {
    pub signal: Signal,
    /// All sources reached EOF
    pub closed: bool,
}

impl WatchState {
    fn is_decided(&self) -> bool {
        self.closed || self.signal != Signal::Pending
    }

    fn outcome(&self) -> WatchOutcome {
        match &self.signal {
            Signal::Ready { line } => WatchOutcome::Ready { line: line.clone() },
            Signal::Failed { line } => WatchOutcome::Failed { line: line.clone() },
            Signal::Pending => WatchOutcome::Exited,
        }
    }
}

/// Result of waiting on the watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// A ready marker appeared
    Ready { line: String },
    /// A failure marker appeared
    Failed { line: String },
    /// Output ended without a marker
    Exited,
    /// Neither happened before the timeout
    TimedOut,
}

/// What the watcher saw over the child's lifetime
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    pub lines: usize,
    pub tail: Vec<String>,
    pub transcript: Option<PathBuf>,
}

/// Handle to a running watcher
pub struct OutputWatcher {
    state: watch::Receiver<WatchState>,
    stop: oneshot::Sender<()>,
    task: JoinHandle<CapturedOutput>,
}

impl OutputWatcher {
    /// Start watching `sources`, writing every line to `transcript`
    pub fn spawn(sources: Vec<Source>, markers: Markers, transcript: Option<PathBuf>) -> Self {
        let (line_tx, line_rx) = mpsc::unbounded_channel();
        for source in sources {
            tokio::spawn(forward_lines(source, line_tx.clone()));
        }
        drop(line_tx);

        let (state_tx, state_rx) = watch::channel(WatchState {
            signal: Signal::Pending,
            closed: false,
        });
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(watch_lines(line_rx, stop_rx, state_tx, markers, transcript));

        Self {
            state: state_rx,
            stop: stop_tx,
            task,
        }
    }

    /// Current state without waiting
    pub fn state(&self) -> WatchState {
        self.state.borrow().clone()
    }

    /// Wait for a ready/failure marker or EOF, whichever comes first
    pub async fn wait(&mut self, timeout: Duration) -> WatchOutcome {
        let waited = tokio::time::timeout(timeout, self.state.wait_for(WatchState::is_decided))
            .await
            .map(|r| r.map(|state| state.outcome()));
        match waited {
            Ok(Ok(outcome)) => return outcome,
            Ok(Err(_)) => {}
            Err(_) => return WatchOutcome::TimedOut,
        }
        // The watcher task is gone, so output has ended
        self.state.borrow().outcome()
    }

    /// Wait until every source reached EOF; false on timeout
    pub async fn wait_closed(&mut self, timeout: Duration) -> bool {
        matches!(
            tokio::time::timeout(timeout, self.state.wait_for(|s| s.closed)).await,
            Ok(Ok(_)) | Ok(Err(_))
        )
    }

    /// Wait for the watcher to drain and return what it captured
    pub async fn finish(self) -> Result<CapturedOutput> {
        self.task
            .await
            .map_err(|e| Error::Internal(format!("Output watcher failed: {}", e)))
    }

    /// Stop reading while sources are still open and return what was captured
    ///
    /// Lines already received are kept and the transcript is flushed.
    pub async fn stop(self) -> Result<CapturedOutput> {
        let Self { stop, task, .. } = self;
        let _ = stop.send(());
        task.await
            .map_err(|e| Error::Internal(format!("Output watcher failed: {}", e)))
    }
}

async fn forward_lines(source: Source, tx: mpsc::UnboundedSender<String>) {
    let mut reader = BufReader::new(source);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                if tx.send(line).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!("Output stream error: {}", e);
                break;
            }
        }
    }
}

async fn open_transcript(path: &Path) -> Option<BufWriter<tokio::fs::File>> {
    match tokio::fs::File::create(path).await {
        Ok(file) => Some(BufWriter::new(file)),
        Err(e) => {
            tracing::warn!("Cannot write transcript {}: {}", path.display(), e);
            None
        }
    }
}

/// Running totals of the watcher task
struct Capture {
    writer: Option<BufWriter<tokio::fs::File>>,
    tail: VecDeque<String>,
    lines: usize,
    decided: bool,
}

impl Capture {
    async fn record(&mut self, line: String, markers: &Markers, state: &watch::Sender<WatchState>) {
        self.lines += 1;

        if let Some(w) = self.writer.as_mut() {
            let written = async {
                w.write_all(line.as_bytes()).await?;
                w.write_all(b"\n").await
            }
            .await;
            if let Err(e) = written {
                tracing::warn!("Transcript write failed, disabling: {}", e);
                self.writer = None;
            }
        }

        if !self.decided {
            let signal = if let Some(marker) = find_marker(&line, &markers.failure) {
                tracing::debug!("Failure marker '{}' seen", marker);
                Some(Signal::Failed { line: line.clone() })
            } else if let Some(marker) = find_marker(&line, &markers.ready) {
                tracing::debug!("Ready marker '{}' seen", marker);
                Some(Signal::Ready { line: line.clone() })
            } else {
                None
            };
            if let Some(signal) = signal {
                self.decided = true;
                state.send_modify(|s| s.signal = signal);
            }
        }

        if self.tail.len() == TAIL_LINES {
            self.tail.pop_front();
        }
        self.tail.push_back(line);
    }
}

async fn watch_lines(
    mut rx: mpsc::UnboundedReceiver<String>,
    mut stop: oneshot::Receiver<()>,
    state: watch::Sender<WatchState>,
    markers: Markers,
    transcript: Option<PathBuf>,
) -> CapturedOutput {
    let mut capture = Capture {
        writer: match &transcript {
            Some(path) => open_transcript(path).await,
            None => None,
        },
        tail: VecDeque::with_capacity(TAIL_LINES),
        lines: 0,
        decided: false,
    };
    // A dropped handle is not a stop request
    let mut stop_armed = true;

    loop {
        let line = tokio::select! {
            line = rx.recv() => line,
            requested = &mut stop, if stop_armed => {
                if requested.is_ok() {
                    tracing::debug!("Output watcher stopped with sources still open");
                    while let Ok(line) = rx.try_recv() {
                        capture.record(line, &markers, &state).await;
                    }
                    break;
                }
                stop_armed = false;
                continue;
            }
        };
        match line {
            Some(line) => capture.record(line, &markers, &state).await,
            None => break,
        }
    }

    if let Some(mut w) = capture.writer {
        if let Err(e) = w.flush().await {
            tracing::warn!("Transcript flush failed: {}", e);
        }
    }
    state.send_modify(|s| s.closed = true);

    CapturedOutput {
        lines: capture.lines,
        tail: capture.tail.into(),
        transcript,
    }
}

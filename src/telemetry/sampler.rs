//! Periodic sampling task

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::common::{Error, Result};

/// One timestamped reading
#[derive(Debug, Clone, Serialize)]
pub struct Sample<T> {
    pub timestamp: DateTime<Local>,
    #[serde(flatten)]
    pub value: T,
}

/// Handle to a task that samples at a fixed interval until stopped
pub struct Sampler<T> {
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Vec<Sample<T>>>>,
}

impl<T: Send + 'static> Sampler<T> {
    /// Spawn the sampling loop; failed readings are logged and skipped
    pub fn spawn<F, Fut>(name: &'static str, interval: Duration, mut read: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send,
    {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let mut samples = Vec::new();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        match read().await {
                            Ok(value) => samples.push(Sample { timestamp: Local::now(), value }),
                            Err(e) => tracing::debug!("{} sample failed: {}", name, e),
                        }
                    }
                }
            }
            samples
        });

        Self {
            stop_tx: Some(stop_tx),
            task: Some(task),
        }
    }

    /// Stop sampling and return everything collected
    pub async fn stop(&mut self) -> Result<Vec<Sample<T>>> {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| Error::Internal(format!("Sampler task failed: {}", e))),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_sampler_collects_until_stopped() {
        let counter = Arc::new(AtomicU32::new(0));
        let reads = counter.clone();
        let mut sampler = Sampler::spawn("test", Duration::from_millis(10), move || {
            let n = reads.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 1 {
                    Err(Error::Internal("flaky".to_string()))
                } else {
                    Ok(n)
                }
            }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        let samples = sampler.stop().await.unwrap();
        assert!(samples.len() >= 2);
        assert!(samples.iter().all(|s| s.value != 1));

        // Stopping twice is harmless
        assert!(sampler.stop().await.unwrap().is_empty());
    }
}

//! Launching workers
//!
//! A [`WorkerLauncher`] turns a [`WorkerConfig`] into a running, supervised
//! worker. [`TaskLauncher`] runs a [`ScanEntry`] inside this process; the
//! process-based launcher lives in [`super::process`].

use crate::stats::CountSender;
use crate::worker::config::WorkerConfig;
use crate::worker::handle::WorkerHandle;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to spawn {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{name} has no {pipe} pipe")]
    MissingPipe { name: String, pipe: &'static str },
    #[error("failed to encode worker config: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("invalid count event '{0}'")]
    BadEvent(String),
}

/// Starts one isolated worker per configuration bundle
pub trait WorkerLauncher: Send + Sync {
    /// Launch a worker that reports onto `events` and stops once `shutdown`
    /// fires. Must be called from within a Tokio runtime.
    fn launch(
        &self,
        config: WorkerConfig,
        events: CountSender,
        shutdown: CancellationToken,
    ) -> Result<WorkerHandle, WorkerError>;
}

/// The scan logic run by an in-process worker
#[async_trait]
pub trait ScanEntry: Send + Sync + 'static {
    async fn scan(
        &self,
        config: WorkerConfig,
        events: CountSender,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()>;
}

/// Runs each worker as a Tokio task
#[derive(Clone)]
pub struct TaskLauncher {
    entry: Arc<dyn ScanEntry>,
}

impl TaskLauncher {
    pub fn new<E: ScanEntry>(entry: E) -> Self {
        Self {
            entry: Arc::new(entry),
        }
    }
}

impl WorkerLauncher for TaskLauncher {
    fn launch(
        &self,
        config: WorkerConfig,
        events: CountSender,
        shutdown: CancellationToken,
    ) -> Result<WorkerHandle, WorkerError> {
        let entry = Arc::clone(&self.entry);
        let index = config.index;
        let name = config.name.clone();
        let worker = name.clone();

        Ok(WorkerHandle::spawn(index, name, None, async move {
            info!(worker = %worker, proxies = config.proxies.len(), ids = config.id_count(), "Worker started");
            tokio::select! {
                result = entry.scan(config, events, shutdown.clone()) => match result {
                    Ok(()) => info!(worker = %worker, "Worker finished"),
                    Err(e) => warn!(worker = %worker, error = %e, "Worker failed"),
                },
                _ = shutdown.cancelled() => debug!(worker = %worker, "Worker cancelled"),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::stats::{count_channel, CountEvent};
    use std::time::Duration;

    struct CountIds;

    #[async_trait]
    impl ScanEntry for CountIds {
        async fn scan(
            &self,
            config: WorkerConfig,
            events: CountSender,
            _shutdown: CancellationToken,
        ) -> anyhow::Result<()> {
            events.send(CountEvent::now(config.id_count()))?;
            Ok(())
        }
    }

    struct Forever;

    #[async_trait]
    impl ScanEntry for Forever {
        async fn scan(
            &self,
            _config: WorkerConfig,
            _events: CountSender,
            _shutdown: CancellationToken,
        ) -> anyhow::Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl ScanEntry for Failing {
        async fn scan(
            &self,
            _config: WorkerConfig,
            _events: CountSender,
            _shutdown: CancellationToken,
        ) -> anyhow::Result<()> {
            anyhow::bail!("webhook unreachable")
        }
    }

    fn bundle() -> WorkerConfig {
        let config = ControllerConfig::new().with_ranges(vec!["0-12".parse().unwrap()]);
        WorkerConfig::for_index(&config, &[], 0)
    }

    #[tokio::test]
    async fn test_task_worker_reports_counts() {
        let (tx, mut rx) = count_channel();
        let mut handle = TaskLauncher::new(CountIds)
            .launch(bundle(), tx, CancellationToken::new())
            .unwrap();

        handle.join().await;
        assert!(!handle.is_alive());
        assert_eq!(rx.recv().await.map(|e| e.count), Some(12));
        // The worker's sender is gone with it.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_task_worker_stops_on_shutdown() {
        let (tx, _rx) = count_channel();
        let shutdown = CancellationToken::new();
        let mut handle = TaskLauncher::new(Forever)
            .launch(bundle(), tx, shutdown.clone())
            .unwrap();

        assert!(handle.is_alive());
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .unwrap();
        assert!(!handle.is_alive());
    }

    #[tokio::test]
    async fn test_task_worker_failure_is_not_alive() {
        let (tx, _rx) = count_channel();
        let mut handle = TaskLauncher::new(Failing)
            .launch(bundle(), tx, CancellationToken::new())
            .unwrap();
        handle.join().await;
        assert!(!handle.is_alive());
    }
}

//! Worker pool lifecycle

use crate::config::ControllerConfig;
use crate::proxy::ProxyEndpoint;
use crate::stats::CountSender;
use crate::worker::config::WorkerConfig;
use crate::worker::handle::{PoolLiveness, WorkerHandle};
use crate::worker::launcher::WorkerLauncher;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// The set of workers launched for one scan
#[derive(Debug)]
pub struct WorkerPool {
    handles: Vec<WorkerHandle>,
    liveness: PoolLiveness,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// Build every worker's bundle and launch them all
    ///
    /// Returns as soon as the last worker has been launched. A worker that
    /// fails to launch is logged and counted as dead; the rest still start.
    pub fn start<L>(
        launcher: &L,
        config: &ControllerConfig,
        proxies: &[ProxyEndpoint],
        events: &CountSender,
        shutdown: CancellationToken,
    ) -> Self
    where
        L: WorkerLauncher + ?Sized,
    {
        let bundles: Vec<WorkerConfig> = (0..config.workers)
            .map(|index| WorkerConfig::for_index(config, proxies, index))
            .collect();

        let handles: Vec<WorkerHandle> = bundles
            .into_iter()
            .map(|bundle| {
                let (index, name) = (bundle.index, bundle.name.clone());
                launcher
                    .launch(bundle, events.clone(), shutdown.child_token())
                    .unwrap_or_else(|e| {
                        error!(worker = %name, error = %e, "Failed to launch worker");
                        WorkerHandle::dead(index, name)
                    })
            })
            .collect();

        let liveness = PoolLiveness::new(handles.iter().map(WorkerHandle::alive_flag).collect());
        info!(
            workers = handles.len(),
            alive = liveness.alive_count(),
            "Workers launched"
        );

        Self {
            handles,
            liveness,
            shutdown,
        }
    }

    pub fn handles(&self) -> &[WorkerHandle] {
        &self.handles
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Liveness view that outlives borrows of the pool
    pub fn liveness(&self) -> PoolLiveness {
        self.liveness.clone()
    }

    pub fn any_alive(&self) -> bool {
        self.liveness.any_alive()
    }

    pub fn alive_count(&self) -> usize {
        self.liveness.alive_count()
    }

    /// Wait until every worker has terminated, in whatever order they finish
    pub async fn join(&mut self) {
        join_all(self.handles.iter_mut().map(|handle| handle.join())).await;
        info!(workers = self.handles.len(), "All workers finished");
    }

    /// Ask every worker to stop
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::IdRange;
    use crate::stats::{count_channel, CountEvent};
    use crate::worker::handle::AliveFlag;
    use crate::worker::launcher::WorkerError;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::oneshot;

    /// Launcher double: records bundles and lets the test decide when each
    /// worker exits
    #[derive(Default)]
    struct ScriptedLauncher {
        bundles: Mutex<Vec<WorkerConfig>>,
        exits: Mutex<HashMap<usize, oneshot::Sender<()>>>,
        fail_index: Option<usize>,
    }

    impl ScriptedLauncher {
        fn failing_at(index: usize) -> Self {
            Self {
                fail_index: Some(index),
                ..Self::default()
            }
        }

        fn finish(&self, index: usize) {
            if let Some(tx) = self.exits.lock().unwrap().remove(&index) {
                let _ = tx.send(());
            }
        }

        fn bundles(&self) -> Vec<WorkerConfig> {
            self.bundles.lock().unwrap().clone()
        }
    }

    impl WorkerLauncher for ScriptedLauncher {
        fn launch(
            &self,
            config: WorkerConfig,
            events: CountSender,
            shutdown: CancellationToken,
        ) -> Result<WorkerHandle, WorkerError> {
            if self.fail_index == Some(config.index) {
                return Err(WorkerError::BadEvent("refused".to_string()));
            }
            let (tx, rx) = oneshot::channel();
            self.exits.lock().unwrap().insert(config.index, tx);
            self.bundles.lock().unwrap().push(config.clone());

            Ok(WorkerHandle::spawn(config.index, config.name.clone(), None, async move {
                tokio::select! {
                    _ = rx => {
                        let _ = events.send(CountEvent::now(config.proxies.len() as u64));
                    }
                    _ = shutdown.cancelled() => {}
                }
            }))
        }
    }

    fn proxies(n: usize) -> Vec<ProxyEndpoint> {
        (0..n).map(|i| ProxyEndpoint::new(format!("p{i}"), 1000 + i as u16)).collect()
    }

    async fn wait_until_dead(flag: AliveFlag) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while flag.is_alive() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_start_launches_all_workers_with_disjoint_slices() {
        let launcher = ScriptedLauncher::default();
        let config = ControllerConfig::new()
            .with_workers(3)
            .with_ranges(vec![IdRange::new(0, 90).unwrap()]);
        let (tx, _rx) = count_channel();

        let pool = WorkerPool::start(&launcher, &config, &proxies(7), &tx, CancellationToken::new());
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.alive_count(), 3);

        let bundles = launcher.bundles();
        let rejoined: Vec<ProxyEndpoint> = bundles.iter().flat_map(|b| b.proxies.clone()).collect();
        assert_eq!(rejoined, proxies(7));
        assert_eq!(bundles[1].ranges, vec![IdRange { start: 30, end: 60 }]);
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_more_workers_than_proxies() {
        let launcher = ScriptedLauncher::default();
        let config = ControllerConfig::new().with_workers(5);
        let (tx, _rx) = count_channel();

        let pool = WorkerPool::start(&launcher, &config, &proxies(2), &tx, CancellationToken::new());
        let empty = launcher.bundles().iter().filter(|b| b.proxies.is_empty()).count();
        assert_eq!(empty, 3);
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_no_proxies_gives_every_worker_an_empty_slice() {
        let launcher = ScriptedLauncher::default();
        let config = ControllerConfig::new().with_workers(4);
        let (tx, _rx) = count_channel();

        let pool = WorkerPool::start(&launcher, &config, &[], &tx, CancellationToken::new());
        assert!(launcher.bundles().iter().all(|b| b.proxies.is_empty()));
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_liveness_follows_worker_exits() {
        let launcher = ScriptedLauncher::default();
        let config = ControllerConfig::new().with_workers(2);
        let (tx, mut rx) = count_channel();

        let mut pool = WorkerPool::start(&launcher, &config, &proxies(4), &tx, CancellationToken::new());
        drop(tx);
        let liveness = pool.liveness();

        launcher.finish(1);
        wait_until_dead(pool.handles()[1].alive_flag()).await;
        assert!(liveness.any_alive());
        assert_eq!(pool.alive_count(), 1);

        launcher.finish(0);
        pool.join().await;
        assert!(!liveness.any_alive());

        let mut counts = vec![rx.recv().await.unwrap().count, rx.recv().await.unwrap().count];
        counts.sort();
        assert_eq!(counts, vec![2, 2]);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_launch_failure_counts_as_dead_worker() {
        let launcher = ScriptedLauncher::failing_at(1);
        let config = ControllerConfig::new().with_workers(3);
        let (tx, _rx) = count_channel();

        let mut pool = WorkerPool::start(&launcher, &config, &[], &tx, CancellationToken::new());
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.alive_count(), 2);
        assert!(!pool.handles()[1].is_alive());

        pool.shutdown();
        tokio::time::timeout(Duration::from_secs(5), pool.join())
            .await
            .unwrap();
        assert!(!pool.any_alive());
    }
}

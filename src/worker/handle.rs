//! Worker handles and liveness tracking

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Shared "still running" flag of one worker
#[derive(Debug, Clone)]
pub struct AliveFlag(Arc<AtomicBool>);

impl AliveFlag {
    /// A flag that starts out alive
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    /// A flag for a worker that never started
    pub fn dead() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// Guard that clears the flag when dropped, including during a panic
    pub fn guard(&self) -> AliveGuard {
        AliveGuard(self.clone())
    }
}

impl Default for AliveFlag {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct AliveGuard(AliveFlag);

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.0.clear();
    }
}

/// Read-only view over the liveness of every worker in a pool
#[derive(Debug, Clone, Default)]
pub struct PoolLiveness {
    flags: Arc<Vec<AliveFlag>>,
}

impl PoolLiveness {
    pub fn new(flags: Vec<AliveFlag>) -> Self {
        Self {
            flags: Arc::new(flags),
        }
    }

    /// Whether at least one worker is still running
    pub fn any_alive(&self) -> bool {
        self.flags.iter().any(AliveFlag::is_alive)
    }

    pub fn alive_count(&self) -> usize {
        self.flags.iter().filter(|f| f.is_alive()).count()
    }
}

/// A launched worker as seen by the pool
#[derive(Debug)]
pub struct WorkerHandle {
    index: usize,
    name: String,
    pid: Option<u32>,
    alive: AliveFlag,
    task: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Supervise `worker` on its own task; the handle stays alive until the
    /// future completes or panics
    pub fn spawn<F>(index: usize, name: String, pid: Option<u32>, worker: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let alive = AliveFlag::new();
        let guard = alive.guard();
        let task = tokio::spawn(async move {
            let _guard = guard;
            worker.await;
        });

        Self {
            index,
            name,
            pid,
            alive,
            task: Some(task),
        }
    }

    /// Handle for a worker that failed to launch
    pub fn dead(index: usize, name: String) -> Self {
        Self {
            index,
            name,
            pid: None,
            alive: AliveFlag::dead(),
            task: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// OS process id when the worker is a child process
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_alive(&self) -> bool {
        self.alive.is_alive()
    }

    pub fn alive_flag(&self) -> AliveFlag {
        self.alive.clone()
    }

    /// Wait for the worker to finish. A crashed worker is logged, not propagated.
    pub async fn join(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        match task.await {
            Ok(()) => debug!(worker = %self.name, "Worker joined"),
            Err(e) if e.is_panic() => error!(worker = %self.name, "Worker crashed: {e}"),
            Err(e) => debug!(worker = %self.name, "Worker task cancelled: {e}"),
        }
    }
}

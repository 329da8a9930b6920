//! Scan controller
//!
//! Loads the proxy pool, launches one worker per configured slot and runs the
//! rate aggregator until the workers are done.

use crate::config::ControllerConfig;
use crate::proxy::{ProxyEndpoint, ProxyLoader};
use crate::stats::{count_channel, RateAggregator, StatsSink};
use crate::worker::{WorkerLauncher, WorkerPool};
use crate::Result;
use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Outcome of a finished run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub workers: usize,
    /// Count events consumed by the aggregator
    pub events: u64,
}

pub struct Controller {
    proxies: Vec<ProxyEndpoint>,
    pool: WorkerPool,
    aggregator: Option<JoinHandle<RateAggregator>>,
    shutdown: CancellationToken,
}

impl Controller {
    /// Load proxies, launch every worker and start the stats task
    pub fn start<L>(config: ControllerConfig, launcher: &L, sink: Arc<dyn StatsSink>) -> Result<Self>
    where
        L: WorkerLauncher + ?Sized,
    {
        config.validate()?;
        let proxies = ProxyLoader::load_optional(config.proxy_file.as_ref())?;
        Self::start_with_proxies(config, proxies, launcher, sink)
    }

    /// Same as [`Controller::start`] with an already loaded proxy list
    pub fn start_with_proxies<L>(
        config: ControllerConfig,
        proxies: Vec<ProxyEndpoint>,
        launcher: &L,
        sink: Arc<dyn StatsSink>,
    ) -> Result<Self>
    where
        L: WorkerLauncher + ?Sized,
    {
        config.validate()?;
        info!(
            workers = config.workers,
            threads = config.threads,
            proxies = proxies.len(),
            ranges = config.range.len(),
            "Starting scan"
        );

        let shutdown = CancellationToken::new();
        let (events, receiver) = count_channel();
        let pool = WorkerPool::start(launcher, &config, &proxies, &events, shutdown.child_token());
        // Only workers hold senders from here on, so the channel closes with
        // the last of them.
        drop(events);

        let aggregator =
            RateAggregator::new(sink).spawn(receiver, pool.liveness(), shutdown.child_token());

        Ok(Self {
            proxies,
            pool,
            aggregator: Some(aggregator),
            shutdown,
        })
    }

    pub fn proxies(&self) -> &[ProxyEndpoint] {
        &self.proxies
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Token that stops workers and the aggregator when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Wait for all workers, then for the aggregator to drain
    pub async fn join(&mut self) -> Result<RunSummary> {
        self.pool.join().await;

        let events = match self.aggregator.take() {
            Some(handle) => handle.await.context("stats task failed")?.processed(),
            None => 0,
        };

        let summary = RunSummary {
            workers: self.pool.len(),
            events,
        };
        info!(workers = summary.workers, events = summary.events, "Scan finished");
        Ok(summary)
    }
}

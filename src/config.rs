//! Controller configuration

use crate::partition::IdRange;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default number of worker processes
const DEFAULT_WORKERS: usize = 1;

/// Default scan concurrency inside each worker
const DEFAULT_THREADS: usize = 1;

/// Default number of ids a worker requests per batch
const DEFAULT_CHUNK_SIZE: u64 = 100;

/// Default per-request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("worker count must be at least 1")]
    NoWorkers,
    #[error("thread count must be at least 1")]
    NoThreads,
    #[error("chunk size must be at least 1")]
    ZeroChunkSize,
    #[error("timeout must be greater than zero")]
    ZeroTimeout,
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
}

/// Configuration for the scan controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Optional `host:port` proxy list
    pub proxy_file: Option<PathBuf>,
    /// Number of worker processes
    pub workers: usize,
    /// Scan concurrency inside each worker
    pub threads: usize,
    /// Id ranges distributed across workers
    pub range: Vec<IdRange>,
    /// Stop condition passed through to workers
    pub cut_off: Option<u64>,
    /// Batch size passed through to workers
    pub chunk_size: u64,
    /// Result notification target, opaque to the controller
    pub webhook_url: Option<String>,
    /// Per-request timeout passed through to workers
    pub timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            proxy_file: None,
            workers: DEFAULT_WORKERS,
            threads: DEFAULT_THREADS,
            range: Vec::new(),
            cut_off: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            webhook_url: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ControllerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_proxy_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.proxy_file = Some(path.into());
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_ranges(mut self, ranges: Vec<IdRange>) -> Self {
        self.range = ranges;
        self
    }

    pub fn with_cut_off(mut self, cut_off: u64) -> Self {
        self.cut_off = Some(cut_off);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_webhook_url(mut self, url: String) -> Self {
        self.webhook_url = Some(url);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reject settings no worker could run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.threads == 0 {
            return Err(ConfigError::NoThreads);
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

/// Convert a timeout given in (possibly fractional) seconds
pub fn timeout_from_secs(secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::InvalidTimeout(e.to_string()))
}

//! Scan Controller - parallel ID range scanning through a proxy pool
//!
//! This splits a set of ID ranges and a proxy list across isolated scan
//! workers and reports their combined throughput as counts per minute.

pub mod config;
pub mod controller;
pub mod partition;
pub mod proxy;
pub mod stats;
pub mod worker;

pub use config::{ConfigError, ControllerConfig};
pub use controller::{Controller, RunSummary};
pub use partition::{plan, slice_list, slice_range, IdRange, WorkerSlice};
pub use proxy::*;
pub use stats::{ConsoleSink, CountEvent, RateAggregator, StatsSink, TracingSink};
pub use worker::{ProcessLauncher, TaskLauncher, WorkerConfig, WorkerLauncher, WorkerPool};

/// Application result type
pub type Result<T> = anyhow::Result<T>;

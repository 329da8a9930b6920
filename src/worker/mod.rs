//! Worker module for launching and supervising scan workers
//!
//! This module provides functionality for:
//! - Building each worker's configuration bundle from the partitioned inputs
//! - Launching workers as child processes or in-process tasks
//! - Tracking worker liveness and joining the pool

pub mod config;
pub mod handle;
pub mod launcher;
pub mod pool;
pub mod process;

pub use config::{worker_name, WorkerConfig};
pub use handle::{AliveFlag, AliveGuard, PoolLiveness, WorkerHandle};
pub use launcher::{ScanEntry, TaskLauncher, WorkerError, WorkerLauncher};
pub use pool::WorkerPool;
pub use process::{parse_count_line, ProcessLauncher};

//! Workers as child processes
//!
//! Each worker is an external scan program. It receives its
//! [`WorkerConfig`] as one JSON document on stdin and reports progress on
//! stdout, one event per line: either `{"timestamp": <secs>, "count": <n>}`
//! or a bare integer count stamped on arrival.

use crate::stats::{CountEvent, CountSender};
use crate::worker::config::WorkerConfig;
use crate::worker::handle::WorkerHandle;
use crate::worker::launcher::{WorkerError, WorkerLauncher};
use std::ffi::OsString;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Environment variable carrying the worker index to the child
pub const WORKER_INDEX_ENV: &str = "SCAN_WORKER_INDEX";

/// Environment variable carrying the worker name to the child
pub const WORKER_NAME_ENV: &str = "SCAN_WORKER_NAME";

/// Launches every worker as a separate OS process
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: OsString,
    args: Vec<OsString>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    fn command(&self, config: &WorkerConfig) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env(WORKER_INDEX_ENV, config.index.to_string())
            .env(WORKER_NAME_ENV, &config.name)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        command
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(
        &self,
        config: WorkerConfig,
        events: CountSender,
        shutdown: CancellationToken,
    ) -> Result<WorkerHandle, WorkerError> {
        let payload = serde_json::to_vec(&config)?;
        let name = config.name.clone();

        let mut child = self
            .command(&config)
            .spawn()
            .map_err(|source| WorkerError::Spawn {
                name: name.clone(),
                source,
            })?;
        let pid = child.id();

        let stdout = child.stdout.take().ok_or_else(|| WorkerError::MissingPipe {
            name: name.clone(),
            pipe: "stdout",
        })?;
        if let Some(mut stdin) = child.stdin.take() {
            let worker = name.clone();
            // The child may fill stdout before it drains stdin.
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&payload).await {
                    warn!(worker = %worker, error = %e, "Failed to hand config to worker");
                }
            });
        }

        info!(worker = %name, pid = ?pid, proxies = config.proxies.len(), ids = config.id_count(), "Worker process started");
        let supervisor = supervise(name.clone(), child, stdout, events, shutdown);
        Ok(WorkerHandle::spawn(config.index, name, pid, supervisor))
    }
}

/// Forward the child's events until it exits or shutdown is requested
async fn supervise(
    name: String,
    mut child: Child,
    stdout: ChildStdout,
    events: CountSender,
    shutdown: CancellationToken,
) {
    let mut lines = BufReader::new(stdout).lines();
    let mut stopping = false;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                stopping = true;
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => match parse_count_line(&line) {
                    Ok(Some(event)) => {
                        // The aggregator may already be stopped; the worker keeps going.
                        let _ = events.send(event);
                    }
                    Ok(None) => {}
                    Err(e) => warn!(worker = %name, error = %e, "Ignoring worker output"),
                },
                Ok(None) => break,
                Err(e) => {
                    warn!(worker = %name, error = %e, "Lost worker output");
                    break;
                }
            },
        }
    }

    // A child can close stdout and keep running.
    let exited = if stopping {
        None
    } else {
        tokio::select! {
            status = child.wait() => Some(status),
            _ = shutdown.cancelled() => None,
        }
    };
    let status = match exited {
        Some(status) => status,
        None => {
            debug!(worker = %name, "Stopping worker process");
            if let Err(e) = child.kill().await {
                warn!(worker = %name, error = %e, "Failed to kill worker process");
            }
            child.wait().await
        }
    };

    match status {
        Ok(status) if status.success() => info!(worker = %name, "Worker process exited"),
        Ok(status) => warn!(worker = %name, %status, "Worker process exited abnormally"),
        Err(e) => error!(worker = %name, error = %e, "Failed to wait for worker process"),
    }
}

/// Decode one stdout line into a count event
pub fn parse_count_line(line: &str) -> Result<Option<CountEvent>, WorkerError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if line.starts_with('{') {
        return serde_json::from_str(line)
            .map(Some)
            .map_err(|_| WorkerError::BadEvent(line.to_string()));
    }
    line.parse::<u64>()
        .map(|count| Some(CountEvent::now(count)))
        .map_err(|_| WorkerError::BadEvent(line.to_string()))
}

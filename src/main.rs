use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use scan_controller::{
    config::timeout_from_secs, plan, ConsoleSink, Controller, ControllerConfig, IdRange,
    ProcessLauncher, ProxyLoader, StatsSink, TracingSink,
    worker::worker_name,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Partition ID ranges and proxies across parallel scan workers
#[derive(Parser)]
#[command(name = "scan-controller")]
#[command(about = "Partition ID ranges and proxies across parallel scan workers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the workers and report CPM until they finish
    Run {
        #[command(flatten)]
        scan: ScanArgs,
        /// Scan program started once per worker
        #[arg(long)]
        worker_cmd: PathBuf,
        /// Rewrite a single console line instead of logging each rate
        #[arg(long)]
        console: bool,
        /// Extra arguments for the scan program
        #[arg(last = true)]
        worker_args: Vec<String>,
    },
    /// Show how proxies and ranges would be split, without launching anything
    Plan {
        #[command(flatten)]
        scan: ScanArgs,
    },
    /// Load a proxy file and print the deduplicated list
    Proxies {
        /// File containing host:port lines
        input: PathBuf,
    },
}

#[derive(Args)]
struct ScanArgs {
    /// File containing host:port proxy lines
    #[arg(short, long)]
    proxy_file: Option<PathBuf>,
    /// Number of worker processes
    #[arg(short, long, default_value = "1")]
    workers: usize,
    /// Scan concurrency inside each worker
    #[arg(short = 'n', long, default_value = "1")]
    threads: usize,
    /// ID range to scan, as START-END (end exclusive) or a single ID; repeatable
    #[arg(short, long = "range")]
    range: Vec<IdRange>,
    /// Stop condition passed through to workers
    #[arg(long)]
    cut_off: Option<u64>,
    /// Batch size passed through to workers
    #[arg(long, default_value = "100")]
    chunk_size: u64,
    /// Webhook notified by workers
    #[arg(long)]
    webhook_url: Option<String>,
    /// Per-request timeout in seconds
    #[arg(long, default_value = "10")]
    timeout: f64,
}

impl ScanArgs {
    fn into_config(self) -> Result<ControllerConfig> {
        let config = ControllerConfig {
            proxy_file: self.proxy_file,
            workers: self.workers,
            threads: self.threads,
            range: self.range,
            cut_off: self.cut_off,
            chunk_size: self.chunk_size,
            webhook_url: self.webhook_url,
            timeout: timeout_from_secs(self.timeout)?,
        };
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Run {
            scan,
            worker_cmd,
            console,
            worker_args,
        } => {
            let config = scan.into_config()?;
            let launcher = ProcessLauncher::new(worker_cmd).with_args(worker_args);
            let sink: Arc<dyn StatsSink> = if console {
                Arc::new(ConsoleSink)
            } else {
                Arc::new(TracingSink)
            };

            let mut controller = Controller::start(config, &launcher, sink)?;

            let shutdown = controller.shutdown_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, stopping workers");
                    shutdown.cancel();
                }
            });

            let summary = controller.join().await?;
            if console {
                println!();
            }
            println!(
                "Finished: {} workers, {} count events",
                summary.workers, summary.events
            );
        }
        Commands::Plan { scan } => {
            let config = scan.into_config()?;
            let proxies = ProxyLoader::load_optional(config.proxy_file.as_ref())?;

            println!(
                "{} proxies, {} ranges, {} workers",
                proxies.len(),
                config.range.len(),
                config.workers
            );
            for slice in plan(&proxies, &config.range, config.workers) {
                let ranges: Vec<String> = slice.ranges.iter().map(ToString::to_string).collect();
                println!(
                    "  {}: {} proxies, ranges [{}]",
                    worker_name(slice.index),
                    slice.proxies.len(),
                    ranges.join(", ")
                );
            }
        }
        Commands::Proxies { input } => {
            let (proxies, report) = ProxyLoader::load_file_with_report(&input)?;

            for proxy in &proxies {
                println!("{}", proxy.to_simple_string());
            }
            eprintln!(
                "Loaded {} proxies from {:?} ({} duplicates, {} malformed)",
                report.accepted, input, report.duplicates, report.malformed
            );
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, quiet: bool) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = log_filter(verbose, quiet, rust_log.as_deref());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

/// `-q` and `-v` win over `RUST_LOG`, which falls back to `info` when unset or invalid
fn log_filter(verbose: bool, quiet: bool, rust_log: Option<&str>) -> EnvFilter {
    if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        rust_log
            .filter(|directives| !directives.trim().is_empty())
            .and_then(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::new("info"))
    }
}

//! nminetd daemon entry point.
//!
//! Reads interface snapshots as JSON lines, one snapshot per line, and
//! feeds them to the worker until end of input or Ctrl-C.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use nminetd::{
    decode_snapshot, JsonLinesSink, LogSink, LoggingDriver, NetMgrConfig, NetMgrWorker,
    NotificationSink, DEFAULT_CONFIG_PATH,
};

/// Network port redundancy and alarm daemon
#[derive(Parser, Debug)]
#[command(name = "nminetd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Interface snapshots, one JSON object per line ("-" for stdin)
    #[arg(short = 'i', long, default_value = "-")]
    input: String,

    /// Write notifications as JSON lines to this file instead of the log
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

/// Initialize tracing/logging. `RUST_LOG` wins over `--log-level`.
fn init_logging(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

fn open_sink(output: Option<&PathBuf>) -> Result<Box<dyn NotificationSink>> {
    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            Ok(Box::new(JsonLinesSink::new(BufWriter::new(file))))
        }
        None => Ok(Box::new(LogSink)),
    }
}

async fn open_input(input: &str) -> Result<Box<dyn AsyncRead + Unpin + Send>> {
    if input == "-" {
        return Ok(Box::new(tokio::io::stdin()));
    }
    let file = tokio::fs::File::open(input)
        .await
        .with_context(|| format!("Failed to open {}", input))?;
    Ok(Box::new(file))
}

async fn run(args: Args) -> Result<()> {
    let config = NetMgrConfig::load_or_default(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    info!(
        chassis = %config.platform.chassis,
        revert_timeout_secs = config.redundancy.revert_timeout_secs,
        queue_depth = config.worker.queue_depth,
        "Configuration loaded"
    );

    let sink = open_sink(args.output.as_ref())?;
    let (worker, handle) = NetMgrWorker::new(&config, sink, Box::new(LoggingDriver));
    let worker_task = tokio::spawn(worker.run());

    let mut lines = BufReader::new(open_input(&args.input).await?).lines();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut line_no = 0usize;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Received SIGINT");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read snapshot input")? else {
                    info!(lines = line_no, "End of input");
                    break;
                };
                line_no += 1;
                if line.trim().is_empty() {
                    continue;
                }
                match decode_snapshot(&line) {
                    Ok(snapshot) => handle.post_interfaces(snapshot).await?,
                    Err(e) => warn!(line = line_no, error = %e, "Skipping invalid snapshot"),
                }
            }
        }
    }

    handle.stop().await?;
    worker_task.await.context("Worker task failed")?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(&args.log_level) {
        eprintln!("nminetd: {:#}", e);
        return ExitCode::FAILURE;
    }

    info!("--- Starting nminetd ---");

    match run(args).await {
        Ok(()) => {
            info!("nminetd exiting normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("nminetd error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

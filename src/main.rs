use anyhow::Context;
use clap::Parser;
use loghub::{LogHub, LogSettings};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Development harness for the log core: reads lines from stdin and ingests
/// them for a single application.
#[derive(Parser)]
#[command(name = "loghub", about = "Log ingestion and persistence core")]
struct Args {
    /// Settings file (.toml or .json); defaults applied when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log root directory (ignored when --config is given)
    #[arg(long, default_value = "/tmp/loghub")]
    log_dir: PathBuf,

    /// Application code to ingest under
    #[arg(long, default_value = "demo")]
    app_code: String,

    /// Version string for the ingested records
    #[arg(long, default_value = "dev")]
    version: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let settings = match &args.config {
        Some(path) => LogSettings::from_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => LogSettings::with_logs_dir(&args.log_dir),
    };

    let hub = Arc::new(LogHub::new(settings)?);
    hub.spawn_background_tasks();
    hub.begin_session(&args.app_code, &args.version).await?;

    info!(app_code = %args.app_code, "Ingesting lines from stdin, ctrl-c to stop");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => hub.submit_lines(&args.app_code, &args.version, [line.as_str()]),
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    hub.shutdown().await;
    Ok(())
}

mod cli;
mod commands;

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use queuectl_core::{Config, JobManager, SystemClock};
use queuectl_store::FileStore;

use crate::cli::{Cli, Command};

/// `RUST_LOG` wins if set; otherwise the persisted/`--log-level` default.
/// Logs go to stderr (for interactive use) and, best-effort, to
/// `config.log_file` so a backgrounded `worker start` leaves a trail.
///
/// `quiet` (from `enqueue --quiet`) mutes only the stderr layer, so a
/// caller scraping `enqueue --quiet`'s JSON stdout line never sees a stray
/// `tracing::warn!` interleaved on stderr; the file log is unaffected.
fn init_logging(config: &Config, quiet: bool) -> tracing_appender::non_blocking::WorkerGuard {
    let directive = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.to_lowercase());

    let log_dir = config
        .log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let _ = std::fs::create_dir_all(log_dir);
    let log_file_name = config
        .log_file
        .file_name()
        .unwrap_or_else(|| OsStr::new("queuectl.log"));
    let file_appender = tracing_appender::rolling::never(log_dir, log_file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let stderr_filter = if quiet {
        EnvFilter::new("off")
    } else {
        EnvFilter::new(&directive)
    };
    let file_filter = EnvFilter::new(&directive);

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_filter(stderr_filter))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config_path);
    let quiet = matches!(&cli.command, Command::Enqueue(args) if args.quiet);
    let _log_guard = init_logging(&config, quiet);

    let db_path = cli.db_path.clone().unwrap_or_else(|| config.db_path.clone());
    if let Some(dir) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }

    let store = Arc::new(FileStore::new(db_path));
    let manager = Arc::new(JobManager::new(store, Arc::new(SystemClock)));

    commands::dispatch(cli.command, manager, &config, &cli.config_path).await
}

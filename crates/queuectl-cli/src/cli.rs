use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "queuectl", version, about = "A persistent, priority- and schedule-aware job queue")]
pub struct Cli {
    /// Overrides the configured/default path to the JSON document backing the queue.
    #[arg(long, global = true, env = "QUEUECTL_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Path to the persisted config file (canonical keys only).
    #[arg(long, global = true, env = "QUEUECTL_CONFIG_PATH", default_value = "data/config.json")]
    pub config_path: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Enqueue a shell command to run.
    Enqueue(EnqueueArgs),
    /// Worker process management.
    Worker(WorkerArgs),
    /// Print aggregate queue statistics.
    Status,
    /// List jobs, newest first, optionally filtered by state.
    List(ListArgs),
    /// Print a single job's full record as JSON.
    Get { id: Uuid },
    /// Cancel a job that hasn't started running yet.
    Cancel { id: Uuid },
    /// Inspect and retry dead-lettered jobs.
    Dlq(DlqArgs),
    /// Delete completed jobs from the store.
    Purge {
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
    /// Serve the read-only HTTP dashboard.
    Dashboard {
        #[arg(long, default_value = "127.0.0.1:8787")]
        bind: SocketAddr,
    },
    /// Read or write persisted configuration.
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct EnqueueArgs {
    /// The shell command to run, e.g. "echo hi" or "./backup.sh".
    pub command: String,
    /// Higher runs first; ties broken oldest-enqueued-first.
    #[arg(long, default_value_t = 0)]
    pub priority: i64,
    /// Overrides the configured default_max_retries for this job only.
    #[arg(long)]
    pub max_retries: Option<u32>,
    /// Seconds after which a running instance of this job is treated as failed.
    #[arg(long)]
    pub timeout: Option<i64>,
    /// RFC3339 timestamp; the job stays `scheduled` until this time passes.
    #[arg(long)]
    pub run_at: Option<String>,
    /// Print only `{"id": "..."}` instead of a human-readable line.
    #[arg(long)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// One of pending, scheduled, running, completed, failed, dlq, cancelled.
    #[arg(long)]
    pub state: Option<String>,
    #[arg(long, default_value_t = 50)]
    pub limit: usize,
}

#[derive(Debug, Args)]
pub struct WorkerArgs {
    #[command(subcommand)]
    pub command: WorkerCommand,
}

#[derive(Debug, Subcommand)]
pub enum WorkerCommand {
    /// Spawn a pool of worker processes and block until they exit or a shutdown signal arrives.
    Start {
        /// Number of worker processes to run.
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
    },
    /// Run a single worker's claim/execute loop in the current process.
    ///
    /// This is the target `worker start` re-execs the binary into, once per
    /// worker slot — it is not meant to be run by hand, though nothing stops
    /// you from doing so for a one-off foreground worker.
    #[command(hide = true, name = "run-one")]
    RunOne {
        #[arg(long)]
        worker_id: String,
        #[arg(long)]
        poll_interval: f64,
        #[arg(long)]
        backoff_base: i64,
    },
}

#[derive(Debug, Args)]
pub struct DlqArgs {
    #[command(subcommand)]
    pub command: DlqCommand,
}

#[derive(Debug, Subcommand)]
pub enum DlqCommand {
    /// List dead-lettered jobs.
    List,
    /// Move a dead-lettered (or failed) job back to pending with attempts reset.
    Retry { id: Uuid },
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print one key's persisted value, or every persisted key if omitted.
    Get { key: Option<String> },
    /// Persist a value under key's canonical name.
    Set { key: String, value: String },
}

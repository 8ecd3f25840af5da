use std::path::PathBuf;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time::Instant;

/// Settings for spawning and supervising a pool of `worker run-one`
/// processes. Everything here becomes a CLI flag on the child invocation —
/// the pool and its children share no memory, so this is the entire
/// handoff.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub worker_count: usize,
    pub db_path: PathBuf,
    pub poll_interval_secs: f64,
    pub backoff_base: i64,
    pub shutdown_grace: Duration,
}

/// Spawns `worker_count` copies of the current executable, each running
/// `worker run-one`, and waits for either all of them to exit or a Ctrl-C.
/// On Ctrl-C every child gets `SIGTERM`; any still running once
/// `shutdown_grace` elapses is force-killed.
pub struct WorkerPool {
    config: PoolConfig,
}

impl WorkerPool {
    pub fn new(config: PoolConfig) -> Self {
        WorkerPool { config }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let exe = std::env::current_exe()?;
        let mut children: Vec<Child> = Vec::with_capacity(self.config.worker_count);

        for index in 0..self.config.worker_count {
            let worker_id = format!("worker-{}", index + 1);
            let child = Command::new(&exe)
                .arg("worker")
                .arg("run-one")
                .arg("--worker-id")
                .arg(&worker_id)
                .arg("--db-path")
                .arg(&self.config.db_path)
                .arg("--poll-interval")
                .arg(self.config.poll_interval_secs.to_string())
                .arg("--backoff-base")
                .arg(self.config.backoff_base.to_string())
                .spawn()?;
            tracing::info!(worker_id = %worker_id, pid = ?child.id(), "spawned worker process");
            children.push(child);
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received; stopping worker pool");
            }
            _ = wait_all(&mut children) => {
                tracing::info!("all worker processes exited on their own");
                return Ok(());
            }
        }

        for child in &children {
            if let Some(pid) = child.id() {
                // SAFETY: pid came from a child we just spawned and still hold a handle to.
                unsafe {
                    libc::kill(pid as libc::pid_t, libc::SIGTERM);
                }
            }
        }

        let deadline = Instant::now() + self.config.shutdown_grace;
        for child in &mut children {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, child.wait()).await {
                Ok(_) => {}
                Err(_) => {
                    tracing::warn!(pid = ?child.id(), "worker did not exit within grace period; killing");
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                }
            }
        }

        Ok(())
    }
}

async fn wait_all(children: &mut [Child]) {
    for child in children.iter_mut() {
        let _ = child.wait().await;
    }
}

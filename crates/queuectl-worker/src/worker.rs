use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use queuectl_core::{Categorizable, Job, JobManager, QueueError};

/// Per-worker settings. `poll_interval` and `backoff_base` come from the
/// pool's `--poll-interval`/`--backoff-base` flags (or their config-file/env
/// defaults); `worker_id` is assigned by the pool supervisor.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub poll_interval: Duration,
    pub backoff_base: i64,
}

/// Runs the claim/execute loop for one worker slot against a shared
/// [`JobManager`]. `run` returns once `shutdown` is observed true; it
/// finishes whatever job it is currently executing before checking again,
/// rather than aborting a running command.
pub struct Worker {
    manager: Arc<JobManager>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(manager: Arc<JobManager>, config: WorkerConfig) -> Self {
        Worker { manager, config }
    }

    pub async fn run(&self, shutdown: Arc<AtomicBool>) -> Result<(), QueueError> {
        tracing::info!(
            worker_id = %self.config.worker_id,
            poll_interval_secs = self.config.poll_interval.as_secs_f64(),
            backoff_base = self.config.backoff_base,
            "worker starting"
        );

        loop {
            if shutdown.load(Ordering::SeqCst) {
                tracing::info!(worker_id = %self.config.worker_id, "shutdown observed, stopping");
                return Ok(());
            }

            self.promote_retryable().await?;

            match self.manager.claim(&self.config.worker_id).await? {
                Some(job) => self.execute(job).await?,
                None => tokio::time::sleep(self.config.poll_interval).await,
            }
        }
    }

    /// Moves any `failed` job whose backoff has elapsed back to `pending`
    /// so the next `claim` can pick it up. Every worker does this before
    /// its own claim attempt rather than relying on a separate maintenance
    /// task, since the store's transaction already serializes it safely.
    async fn promote_retryable(&self) -> Result<(), QueueError> {
        for job in self.manager.get_retryable_jobs().await? {
            self.manager.reset_for_retry(job.id).await?;
        }
        Ok(())
    }

    async fn execute(&self, job: Job) -> Result<(), QueueError> {
        tracing::info!(
            job_id = %job.id,
            worker_id = %self.config.worker_id,
            command = %job.command,
            attempt = job.attempts,
            "claimed job"
        );

        let start = Instant::now();
        let command = job.command.clone();
        let run = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&command)
            .kill_on_drop(true)
            .output();

        let timeout = job
            .timeout
            .filter(|secs| *secs > 0)
            .map(|secs| Duration::from_secs(secs as u64));

        let outcome = match timeout {
            Some(dur) => tokio::time::timeout(dur, run).await,
            None => Ok(run.await),
        };
        let elapsed = start.elapsed().as_secs_f64();

        match outcome {
            Err(_elapsed) => {
                let kind = QueueError::execution("timed out").classify();
                tracing::warn!(job_id = %job.id, worker_id = %self.config.worker_id, failure_kind = ?kind, "job timed out");
                self.manager
                    .mark_failed(job.id, "timed out".to_string(), self.config.backoff_base)
                    .await?;
            }
            Ok(Err(io_err)) => {
                let kind = QueueError::execution(io_err.to_string()).classify();
                tracing::warn!(job_id = %job.id, worker_id = %self.config.worker_id, error = %io_err, failure_kind = ?kind, "failed to spawn command");
                self.manager
                    .mark_failed(
                        job.id,
                        format!("failed to start command: {io_err}"),
                        self.config.backoff_base,
                    )
                    .await?;
            }
            Ok(Ok(output)) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
                let stdout = if stdout.is_empty() {
                    "Command executed successfully".to_string()
                } else {
                    stdout
                };
                tracing::info!(
                    job_id = %job.id,
                    worker_id = %self.config.worker_id,
                    execution_time = elapsed,
                    "job completed"
                );
                self.manager.mark_completed(job.id, stdout, elapsed).await?;
            }
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                let code = output
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "terminated by signal".to_string());
                let message = if stderr.is_empty() {
                    format!("Command exited with code {code}")
                } else {
                    format!("Command exited with code {code}: {stderr}")
                };
                let kind = QueueError::execution(message.clone()).classify();
                tracing::warn!(
                    job_id = %job.id,
                    worker_id = %self.config.worker_id,
                    exit_code = %code,
                    failure_kind = ?kind,
                    "job failed"
                );
                self.manager
                    .mark_failed(job.id, message, self.config.backoff_base)
                    .await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use queuectl_testing::{InMemoryStore, TestClock};

    use super::*;

    fn worker(config: WorkerConfig) -> (Worker, Arc<JobManager>) {
        let clock = Arc::new(TestClock::default());
        let store = Arc::new(InMemoryStore::new());
        let manager = Arc::new(JobManager::new(store, clock));
        (Worker::new(manager.clone(), config), manager)
    }

    fn cfg() -> WorkerConfig {
        WorkerConfig {
            worker_id: "worker-test".to_string(),
            poll_interval: Duration::from_millis(10),
            backoff_base: 2,
        }
    }

    #[tokio::test]
    async fn a_successful_command_marks_the_job_completed() {
        let (worker, manager) = worker(cfg());
        let id = manager
            .enqueue("echo hello".to_string(), 3, 0, None, None)
            .await
            .unwrap();

        let job = manager.claim("worker-test").await.unwrap().unwrap();
        worker.execute(job).await.unwrap();

        let job = manager.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.state, queuectl_core::JobState::Completed);
        assert!(job.output.contains("hello"));
    }

    #[tokio::test]
    async fn stdout_is_trimmed_to_exactly_match_the_command_output() {
        let (worker, manager) = worker(cfg());
        let id = manager
            .enqueue("echo hi".to_string(), 3, 0, None, None)
            .await
            .unwrap();

        let job = manager.claim("worker-test").await.unwrap().unwrap();
        worker.execute(job).await.unwrap();

        let job = manager.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.output, "hi");
    }

    #[tokio::test]
    async fn empty_stdout_falls_back_to_a_success_message() {
        let (worker, manager) = worker(cfg());
        let id = manager
            .enqueue("true".to_string(), 3, 0, None, None)
            .await
            .unwrap();

        let job = manager.claim("worker-test").await.unwrap().unwrap();
        worker.execute(job).await.unwrap();

        let job = manager.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.output, "Command executed successfully");
    }

    #[tokio::test]
    async fn empty_stderr_falls_back_to_a_plain_exit_code_message() {
        let (worker, manager) = worker(cfg());
        let id = manager
            .enqueue("exit 1".to_string(), 3, 0, None, None)
            .await
            .unwrap();

        let job = manager.claim("worker-test").await.unwrap().unwrap();
        worker.execute(job).await.unwrap();

        let job = manager.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.error, "Command exited with code 1");
    }

    #[tokio::test]
    async fn a_failing_command_marks_the_job_failed_with_backoff() {
        let (worker, manager) = worker(cfg());
        let id = manager
            .enqueue("exit 1".to_string(), 3, 0, None, None)
            .await
            .unwrap();

        let job = manager.claim("worker-test").await.unwrap().unwrap();
        worker.execute(job).await.unwrap();

        let job = manager.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.state, queuectl_core::JobState::Failed);
        assert_eq!(job.attempts, 1);
        assert!(job.retry_after.is_some());
    }

    #[tokio::test]
    async fn a_command_that_exceeds_its_timeout_is_marked_failed() {
        let (worker, manager) = worker(cfg());
        let id = manager
            .enqueue("sleep 2".to_string(), 3, 0, Some(1), None)
            .await
            .unwrap();

        let job = manager.claim("worker-test").await.unwrap().unwrap();
        worker.execute(job).await.unwrap();

        let job = manager.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.state, queuectl_core::JobState::Failed);
        assert!(job.error.contains("timed out"));
    }
}

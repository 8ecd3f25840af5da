use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Utc;
use uuid::Uuid;

use queuectl_core::{Config, Job, JobManager, JobState};
use queuectl_worker::{PoolConfig, Worker, WorkerConfig, WorkerPool};

use crate::cli::{Command, ConfigCommand, DlqCommand, EnqueueArgs, ListArgs, WorkerCommand};

pub async fn dispatch(
    command: Command,
    manager: Arc<JobManager>,
    config: &Config,
    config_path: &Path,
) -> Result<()> {
    match command {
        Command::Enqueue(args) => enqueue(manager, config, args).await,
        Command::Worker(worker_args) => worker(manager, config, worker_args.command).await,
        Command::Status => status(manager).await,
        Command::List(args) => list(manager, args).await,
        Command::Get { id } => get(manager, id).await,
        Command::Cancel { id } => cancel(manager, id).await,
        Command::Dlq(dlq_args) => dlq(manager, dlq_args.command).await,
        Command::Purge { yes } => purge(manager, yes).await,
        Command::Dashboard { bind } => queuectl_dashboard::serve(manager, bind).await,
        Command::Config(config_args) => config_cmd(config_path, config_args.command),
    }
}

async fn enqueue(manager: Arc<JobManager>, config: &Config, args: EnqueueArgs) -> Result<()> {
    let max_retries = args.max_retries.unwrap_or(config.default_max_retries);
    let id = manager
        .enqueue(
            args.command,
            max_retries,
            args.priority,
            args.timeout,
            args.run_at.as_deref(),
        )
        .await?;

    if args.quiet {
        println!("{}", serde_json::json!({ "id": id }));
    } else {
        println!("enqueued job {id}");
    }
    Ok(())
}

async fn worker(manager: Arc<JobManager>, config: &Config, command: WorkerCommand) -> Result<()> {
    match command {
        WorkerCommand::Start { count } => {
            if count == 0 {
                bail!("--count must be at least 1");
            }
            let pool = WorkerPool::new(PoolConfig {
                worker_count: count,
                db_path: config.db_path.clone(),
                poll_interval_secs: config.poll_interval,
                backoff_base: config.backoff_base,
                shutdown_grace: Duration::from_secs(30),
            });
            pool.run().await
        }
        WorkerCommand::RunOne {
            worker_id,
            poll_interval,
            backoff_base,
        } => {
            let shutdown = Arc::new(AtomicBool::new(false));
            let shutdown_watch = shutdown.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                shutdown_watch.store(true, Ordering::SeqCst);
            });

            let worker = Worker::new(
                manager,
                WorkerConfig {
                    worker_id,
                    poll_interval: Duration::from_secs_f64(poll_interval.max(0.05)),
                    backoff_base,
                },
            );
            worker.run(shutdown).await?;
            Ok(())
        }
    }
}

/// `worker start` sends `SIGTERM` to its children, and either `Ctrl-C` or
/// `SIGTERM` should end a `run-one` cleanly — the latter is how the pool
/// supervisor asks it to stop.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn status(manager: Arc<JobManager>) -> Result<()> {
    let stats = manager.get_stats().await?;
    println!("pending             {}", stats.pending);
    println!("scheduled           {}", stats.scheduled);
    println!("running             {}", stats.running);
    println!("completed           {}", stats.completed);
    println!("failed              {}", stats.failed);
    println!("dlq                 {}", stats.dlq);
    println!("cancelled           {}", stats.cancelled);
    println!("total               {}", stats.total);
    println!("success_rate        {:.1}%", stats.success_rate);
    println!("avg_execution_time  {:.3}s", stats.avg_execution_time);
    Ok(())
}

async fn list(manager: Arc<JobManager>, args: ListArgs) -> Result<()> {
    let state = args.state.as_deref().map(parse_state).transpose()?;
    let jobs = manager.list_jobs(state, args.limit).await?;
    print_job_table(&jobs);
    Ok(())
}

fn parse_state(raw: &str) -> Result<JobState> {
    Ok(match raw {
        "pending" => JobState::Pending,
        "scheduled" => JobState::Scheduled,
        "running" => JobState::Running,
        "completed" => JobState::Completed,
        "failed" => JobState::Failed,
        "dlq" => JobState::Dlq,
        "cancelled" => JobState::Cancelled,
        other => bail!("unknown state {other:?}; expected one of pending/scheduled/running/completed/failed/dlq/cancelled"),
    })
}

fn print_job_table(jobs: &[Job]) {
    let now = Utc::now();
    println!(
        "{:<36}  {:<10}  {:>8}  {:>8}  {:>12}  command",
        "id", "state", "priority", "attempts", "age"
    );
    for job in jobs {
        let age = job.age(now).num_seconds();
        let age_label = if job.is_terminal() {
            format!("{age}s (done)")
        } else {
            format!("{age}s")
        };
        println!(
            "{:<36}  {:<10}  {:>8}  {:>8}  {:>12}  {}",
            job.id, job.state, job.priority, job.attempts, age_label, job.command
        );
    }
}

async fn get(manager: Arc<JobManager>, id: Uuid) -> Result<()> {
    match manager.get_job(id).await? {
        Some(job) => {
            let age = job.age(Utc::now()).num_seconds();
            println!("age: {age}s  terminal: {}", job.is_terminal());
            println!("{}", serde_json::to_string_pretty(&job)?);
            Ok(())
        }
        None => bail!("no such job: {id}"),
    }
}

async fn cancel(manager: Arc<JobManager>, id: Uuid) -> Result<()> {
    if manager.cancel_job(id).await? {
        println!("cancelled {id}");
        Ok(())
    } else {
        bail!("job {id} is not pending/scheduled, or does not exist");
    }
}

async fn dlq(manager: Arc<JobManager>, command: DlqCommand) -> Result<()> {
    match command {
        DlqCommand::List => {
            let jobs = manager.list_jobs(Some(JobState::Dlq), 100).await?;
            print_job_table(&jobs);
            Ok(())
        }
        DlqCommand::Retry { id } => {
            if manager.retry_job(id).await? {
                println!("requeued {id}");
                Ok(())
            } else {
                bail!("job {id} is not failed/dlq, or does not exist");
            }
        }
    }
}

async fn purge(manager: Arc<JobManager>, yes: bool) -> Result<()> {
    if !yes {
        use std::io::Write as _;
        print!("this deletes every completed job permanently; continue? [y/N] ");
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if !matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
            println!("aborted");
            return Ok(());
        }
    }
    let removed = manager.purge_completed().await?;
    println!("purged {removed} completed job(s)");
    Ok(())
}

fn config_cmd(path: &Path, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Get { key: Some(key) } => {
            match queuectl_core::config_get(path, &key)? {
                Some(value) => println!("{value}"),
                None => println!("(unset)"),
            }
            Ok(())
        }
        ConfigCommand::Get { key: None } => {
            for (key, value) in queuectl_core::config_get_all(path)? {
                println!("{key} = {value}");
            }
            Ok(())
        }
        ConfigCommand::Set { key, value } => {
            queuectl_core::config_set(path, &key, &value)?;
            println!("{key} = {value}");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use queuectl_testing::{InMemoryStore, TestClock};

    use super::*;

    fn manager() -> Arc<JobManager> {
        Arc::new(JobManager::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(TestClock::default()),
        ))
    }

    #[test]
    fn parse_state_rejects_unknown_values() {
        assert!(parse_state("pending").is_ok());
        assert!(parse_state("not-a-state").is_err());
    }

    #[tokio::test]
    async fn cancel_refuses_a_job_that_is_already_running() {
        let manager = manager();
        let id = manager
            .enqueue("echo hi".to_string(), 3, 0, None, None)
            .await
            .unwrap();
        manager.claim("worker-1").await.unwrap();

        assert!(cancel(manager, id).await.is_err());
    }

    #[tokio::test]
    async fn dlq_retry_requeues_a_dead_lettered_job() {
        let manager = manager();
        let id = manager
            .enqueue("false".to_string(), 1, 0, None, None)
            .await
            .unwrap();
        manager.claim("worker-1").await.unwrap();
        manager
            .mark_failed(id, "boom".to_string(), 2)
            .await
            .unwrap();

        dlq(manager.clone(), DlqCommand::Retry { id }).await.unwrap();
        let job = manager.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Pending);
    }
}

use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::QueueError;
use crate::job::{Job, JobState};
use crate::store::Store;

/// Aggregate counts returned by `get_stats` / served at `GET /api/stats`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stats {
    pub pending: usize,
    pub scheduled: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub dlq: usize,
    pub cancelled: usize,
    pub total: usize,
    pub success_rate: f64,
    pub avg_execution_time: f64,
}

/// Thin layer above [`Store`] enforcing every invariant from the data model.
/// Holds no state of its own beyond the store handle and the clock; every
/// method is a full read (or read-modify-write) of the document.
pub struct JobManager {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl JobManager {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        JobManager { store, clock }
    }

    /// Generates a fresh id and enqueues `command`. An unparseable `run_at`
    /// is silently dropped (job falls back to `pending`) per spec — a
    /// warning is logged rather than the enqueue failing.
    pub async fn enqueue(
        &self,
        command: String,
        max_retries: u32,
        priority: i64,
        timeout: Option<i64>,
        run_at: Option<&str>,
    ) -> Result<Uuid, QueueError> {
        let now = self.clock.now();
        let mut job = Job::new(command, max_retries, priority, timeout, now);

        if let Some(raw) = run_at {
            match DateTime::parse_from_rfc3339(raw) {
                Ok(parsed) => {
                    job.run_at = Some(parsed.with_timezone(&Utc));
                    job.state = JobState::Scheduled;
                }
                Err(err) => {
                    tracing::warn!(raw_run_at = raw, error = %err, "could not parse run_at; enqueuing without a schedule");
                }
            }
        }

        let id = job.id;
        self.store
            .with_transaction(Box::new(move |doc| {
                doc.jobs.insert(id, job);
            }))
            .await?;
        Ok(id)
    }

    pub async fn get_job(&self, id: Uuid) -> Result<Option<Job>, QueueError> {
        let doc = self.store.load().await?;
        Ok(doc.jobs.get(&id).cloned())
    }

    /// Sorted `(-priority, created_at)` descending: highest priority first,
    /// newest first among equals. This is the *display* ordering; the claim
    /// path uses the same key without reversing the tie-break (oldest first)
    /// so that priority ties are served FIFO — see `claim`.
    pub async fn list_jobs(
        &self,
        state_filter: Option<JobState>,
        limit: usize,
    ) -> Result<Vec<Job>, QueueError> {
        let doc = self.store.load().await?;
        let mut jobs: Vec<Job> = doc
            .jobs
            .into_values()
            .filter(|job| state_filter.map_or(true, |s| job.state == s))
            .collect();
        jobs.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        jobs.truncate(limit);
        Ok(jobs)
    }

    /// The atomic dequeue. Promotes any due `scheduled` job to `pending` in
    /// the same transaction, selects the oldest highest-priority pending
    /// job, and transitions it to `running`. All of this happens under the
    /// store's cross-process lock, so two workers racing this call can never
    /// both win the same job.
    pub async fn claim(&self, worker_id: &str) -> Result<Option<Job>, QueueError> {
        let now = self.clock.now();
        let worker_id = worker_id.to_string();
        let claimed: Arc<StdMutex<Option<Job>>> = Arc::new(StdMutex::new(None));
        let claimed_slot = claimed.clone();

        self.store
            .with_transaction(Box::new(move |doc| {
                let due: Vec<Uuid> = doc
                    .jobs
                    .iter()
                    .filter(|(_, job)| {
                        job.state == JobState::Scheduled
                            && job.run_at.is_some_and(|run_at| run_at <= now)
                    })
                    .map(|(id, _)| *id)
                    .collect();
                for id in &due {
                    if let Some(job) = doc.jobs.get_mut(id) {
                        job.state = JobState::Pending;
                        job.updated_at = now;
                    }
                }

                let mut candidates: Vec<Uuid> = doc
                    .jobs
                    .iter()
                    .filter(|(_, job)| job.state == JobState::Pending)
                    .map(|(id, _)| *id)
                    .collect();
                candidates.sort_by(|a, b| {
                    let ja = &doc.jobs[a];
                    let jb = &doc.jobs[b];
                    jb.priority
                        .cmp(&ja.priority)
                        .then_with(|| ja.created_at.cmp(&jb.created_at))
                });

                if let Some(id) = candidates.into_iter().next() {
                    if let Some(job) = doc.jobs.get_mut(&id) {
                        job.state = JobState::Running;
                        job.worker_id = Some(worker_id.clone());
                        job.started_at = Some(now);
                        job.updated_at = now;
                        *claimed_slot.lock().expect("claim lock poisoned") = Some(job.clone());
                    }
                }
            }))
            .await?;

        let result = claimed.lock().expect("claim lock poisoned").clone();
        Ok(result)
    }

    pub async fn mark_completed(
        &self,
        id: Uuid,
        output: String,
        execution_time: f64,
    ) -> Result<(), QueueError> {
        let now = self.clock.now();
        self.store
            .with_transaction(Box::new(move |doc| {
                if let Some(job) = doc.jobs.get_mut(&id) {
                    job.state = JobState::Completed;
                    job.output = output;
                    job.completed_at = Some(now);
                    job.execution_time = Some(execution_time);
                    job.updated_at = now;
                }
            }))
            .await?;
        Ok(())
    }

    /// `backoff_base` is a worker-pool setting (`--backoff-base`), not part
    /// of the Job record, so it is threaded through here rather than stored
    /// on `JobManager`.
    pub async fn mark_failed(
        &self,
        id: Uuid,
        error: String,
        backoff_base: i64,
    ) -> Result<(), QueueError> {
        let now = self.clock.now();
        self.store
            .with_transaction(Box::new(move |doc| {
                if let Some(job) = doc.jobs.get_mut(&id) {
                    job.attempts += 1;
                    job.error = error;
                    if job.attempts >= job.max_retries {
                        job.state = JobState::Dlq;
                        job.dlq_at = Some(now);
                    } else {
                        job.state = JobState::Failed;
                        let delay = backoff_base.max(1).pow(job.attempts);
                        job.retry_after = Some(now + ChronoDuration::seconds(delay));
                    }
                    job.updated_at = now;
                }
            }))
            .await?;
        Ok(())
    }

    pub async fn get_retryable_jobs(&self) -> Result<Vec<Job>, QueueError> {
        let now = self.clock.now();
        let doc = self.store.load().await?;
        Ok(doc
            .jobs
            .into_values()
            .filter(|job| {
                job.state == JobState::Failed
                    && job.retry_after.is_some_and(|retry_after| retry_after <= now)
            })
            .collect())
    }

    pub async fn reset_for_retry(&self, id: Uuid) -> Result<(), QueueError> {
        let now = self.clock.now();
        self.store
            .with_transaction(Box::new(move |doc| {
                if let Some(job) = doc.jobs.get_mut(&id) {
                    if job.state == JobState::Failed {
                        job.state = JobState::Pending;
                        job.error.clear();
                        job.retry_after = None;
                        job.updated_at = now;
                    }
                }
            }))
            .await?;
        Ok(())
    }

    /// Admin reset from `failed`/`dlq` back to `pending` with `attempts`
    /// cleared. Returns `false` (no mutation) from any other state.
    pub async fn retry_job(&self, id: Uuid) -> Result<bool, QueueError> {
        let now = self.clock.now();
        let changed = Arc::new(StdMutex::new(false));
        let changed_slot = changed.clone();
        self.store
            .with_transaction(Box::new(move |doc| {
                if let Some(job) = doc.jobs.get_mut(&id) {
                    if matches!(job.state, JobState::Failed | JobState::Dlq) {
                        job.state = JobState::Pending;
                        job.attempts = 0;
                        job.error.clear();
                        job.retry_after = None;
                        job.updated_at = now;
                        *changed_slot.lock().expect("retry lock poisoned") = true;
                    }
                }
            }))
            .await?;
        Ok(*changed.lock().expect("retry lock poisoned"))
    }

    /// Valid only from `pending`/`scheduled`; a claimed job cannot be
    /// cancelled. Returns `false` otherwise.
    pub async fn cancel_job(&self, id: Uuid) -> Result<bool, QueueError> {
        let now = self.clock.now();
        let changed = Arc::new(StdMutex::new(false));
        let changed_slot = changed.clone();
        self.store
            .with_transaction(Box::new(move |doc| {
                if let Some(job) = doc.jobs.get_mut(&id) {
                    if matches!(job.state, JobState::Pending | JobState::Scheduled) {
                        job.state = JobState::Cancelled;
                        job.cancelled_at = Some(now);
                        job.updated_at = now;
                        *changed_slot.lock().expect("cancel lock poisoned") = true;
                    }
                }
            }))
            .await?;
        Ok(*changed.lock().expect("cancel lock poisoned"))
    }

    pub async fn get_stats(&self) -> Result<Stats, QueueError> {
        let doc = self.store.load().await?;
        let mut stats = Stats::default();
        let mut exec_sum = 0.0;
        let mut exec_count = 0usize;

        for job in doc.jobs.values() {
            match job.state {
                JobState::Pending => stats.pending += 1,
                JobState::Scheduled => stats.scheduled += 1,
                JobState::Running => stats.running += 1,
                JobState::Completed => {
                    stats.completed += 1;
                    if let Some(t) = job.execution_time {
                        exec_sum += t;
                        exec_count += 1;
                    }
                }
                JobState::Failed => stats.failed += 1,
                JobState::Dlq => stats.dlq += 1,
                JobState::Cancelled => stats.cancelled += 1,
            }
        }

        stats.total = doc.jobs.len();
        stats.success_rate = if stats.total > 0 {
            stats.completed as f64 / stats.total as f64 * 100.0
        } else {
            0.0
        };
        stats.avg_execution_time = if exec_count > 0 {
            exec_sum / exec_count as f64
        } else {
            0.0
        };

        Ok(stats)
    }

    pub async fn purge_completed(&self) -> Result<usize, QueueError> {
        let removed = Arc::new(StdMutex::new(0usize));
        let removed_slot = removed.clone();
        self.store
            .with_transaction(Box::new(move |doc| {
                let before = doc.jobs.len();
                doc.jobs.retain(|_, job| job.state != JobState::Completed);
                *removed_slot.lock().expect("purge lock poisoned") = before - doc.jobs.len();
            }))
            .await?;
        Ok(*removed.lock().expect("purge lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration as ChronoDuration;
    use queuectl_testing::{InMemoryStore, TestClock};

    use super::*;

    fn manager() -> (JobManager, TestClock) {
        let clock = TestClock::default();
        let store = Arc::new(InMemoryStore::new());
        (JobManager::new(store, Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn claim_returns_jobs_oldest_first_within_a_priority() {
        let (mgr, clock) = manager();
        let first = mgr.enqueue("echo 1".into(), 3, 0, None, None).await.unwrap();
        clock.advance(ChronoDuration::seconds(1));
        let _second = mgr.enqueue("echo 2".into(), 3, 0, None, None).await.unwrap();

        let claimed = mgr.claim("worker-1").await.unwrap().expect("a job to claim");
        assert_eq!(claimed.id, first);
        assert_eq!(claimed.state, JobState::Running);
    }

    #[tokio::test]
    async fn claim_prefers_higher_priority_even_if_newer() {
        let (mgr, clock) = manager();
        let _low = mgr.enqueue("echo low".into(), 3, 0, None, None).await.unwrap();
        clock.advance(ChronoDuration::seconds(1));
        let high = mgr.enqueue("echo high".into(), 3, 10, None, None).await.unwrap();

        let claimed = mgr.claim("worker-1").await.unwrap().expect("a job to claim");
        assert_eq!(claimed.id, high);
    }

    #[tokio::test]
    async fn no_two_claims_return_the_same_job() {
        let (mgr, _clock) = manager();
        mgr.enqueue("echo only".into(), 3, 0, None, None).await.unwrap();

        let a = mgr.claim("worker-a").await.unwrap();
        let b = mgr.claim("worker-b").await.unwrap();
        assert!(a.is_some());
        assert!(b.is_none());
    }

    #[tokio::test]
    async fn scheduled_job_is_not_claimable_before_run_at() {
        let (mgr, clock) = manager();
        let now = clock.now();
        let run_at = (now + ChronoDuration::minutes(5)).to_rfc3339();
        mgr.enqueue("echo later".into(), 3, 0, None, Some(&run_at))
            .await
            .unwrap();

        assert!(mgr.claim("worker-1").await.unwrap().is_none());

        clock.advance(ChronoDuration::minutes(6));
        let claimed = mgr.claim("worker-1").await.unwrap();
        assert!(claimed.is_some());
    }

    #[tokio::test]
    async fn failed_job_below_max_retries_gets_a_backoff_and_stays_out_of_dlq() {
        let (mgr, _clock) = manager();
        let id = mgr.enqueue("false".into(), 3, 0, None, None).await.unwrap();
        mgr.claim("worker-1").await.unwrap();

        mgr.mark_failed(id, "boom".into(), 2).await.unwrap();
        let job = mgr.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempts, 1);
        assert!(job.retry_after.is_some());
    }

    #[tokio::test]
    async fn failed_job_at_max_retries_moves_to_dlq() {
        let (mgr, _clock) = manager();
        let id = mgr.enqueue("false".into(), 1, 0, None, None).await.unwrap();
        mgr.claim("worker-1").await.unwrap();

        mgr.mark_failed(id, "boom".into(), 2).await.unwrap();
        let job = mgr.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Dlq);
        assert!(job.dlq_at.is_some());
    }

    #[tokio::test]
    async fn retry_job_resets_attempts_from_dlq() {
        let (mgr, _clock) = manager();
        let id = mgr.enqueue("false".into(), 1, 0, None, None).await.unwrap();
        mgr.claim("worker-1").await.unwrap();
        mgr.mark_failed(id, "boom".into(), 2).await.unwrap();

        let changed = mgr.retry_job(id).await.unwrap();
        assert!(changed);
        let job = mgr.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempts, 0);
    }

    #[tokio::test]
    async fn cancel_job_refuses_a_running_job() {
        let (mgr, _clock) = manager();
        let id = mgr.enqueue("echo hi".into(), 3, 0, None, None).await.unwrap();
        mgr.claim("worker-1").await.unwrap();

        let changed = mgr.cancel_job(id).await.unwrap();
        assert!(!changed);
        let job = mgr.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Running);
    }

    #[tokio::test]
    async fn purge_completed_is_idempotent() {
        let (mgr, _clock) = manager();
        let id = mgr.enqueue("echo hi".into(), 3, 0, None, None).await.unwrap();
        mgr.claim("worker-1").await.unwrap();
        mgr.mark_completed(id, "hi".into(), 0.01).await.unwrap();

        let removed_first = mgr.purge_completed().await.unwrap();
        assert_eq!(removed_first, 1);
        let removed_second = mgr.purge_completed().await.unwrap();
        assert_eq!(removed_second, 0);
    }

    #[tokio::test]
    async fn stats_reflect_every_bucket() {
        let (mgr, _clock) = manager();
        let completed = mgr.enqueue("echo 1".into(), 3, 0, None, None).await.unwrap();
        let _pending = mgr.enqueue("echo 2".into(), 3, 0, None, None).await.unwrap();
        mgr.claim("worker-1").await.unwrap();
        mgr.mark_completed(completed, "ok".into(), 1.5).await.unwrap();

        let stats = mgr.get_stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.success_rate, 50.0);
        assert_eq!(stats.avg_execution_time, 1.5);
    }
}

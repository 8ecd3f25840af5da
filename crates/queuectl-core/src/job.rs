use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a [`Job`]. The sole mutable field driving every
/// invariant in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Scheduled,
    Running,
    Completed,
    Failed,
    Dlq,
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Scheduled => "scheduled",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Dlq => "dlq",
            JobState::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single unit of work: a shell command plus scheduling/retry metadata.
///
/// `state` is the only field ever mutated after `enqueue`, except through the
/// explicit `retry_job` admin action that resets a terminal job back to
/// `pending`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub command: String,
    pub state: JobState,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub attempts: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dlq_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,

    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub error: String,
}

impl Job {
    /// Build a freshly enqueued job. `state` is left `Pending`; callers that
    /// resolved a `run_at` move it to `Scheduled` themselves (see
    /// `JobManager::enqueue`), keeping the "state follows run_at" invariant
    /// in one place.
    pub fn new(
        command: String,
        max_retries: u32,
        priority: i64,
        timeout: Option<i64>,
        now: DateTime<Utc>,
    ) -> Self {
        Job {
            id: Uuid::new_v4(),
            command,
            state: JobState::Pending,
            priority,
            attempts: 0,
            max_retries,
            created_at: now,
            updated_at: now,
            timeout,
            run_at: None,
            started_at: None,
            completed_at: None,
            dlq_at: None,
            cancelled_at: None,
            retry_after: None,
            execution_time: None,
            worker_id: None,
            output: String::new(),
            error: String::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            JobState::Completed | JobState::Dlq | JobState::Cancelled
        )
    }

    /// Wall-clock age since `created_at`, for display only (`list`/`get`/the
    /// dashboard) — never part of the persisted document.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }
}

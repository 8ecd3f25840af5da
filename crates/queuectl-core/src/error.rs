use thiserror::Error;

/// Error kinds for the job lifecycle engine. Mirrors the semantic split from
/// the system design: malformed requests never mutate state, execution
/// failures drive the retry/DLQ machine, store failures are logged and
/// swallowed at the boundary that owns the document.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("execution failure: {0}")]
    Execution(String),

    #[error("store failure: {0}")]
    Store(String),

    #[error("shutdown requested")]
    Shutdown,
}

impl QueueError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        QueueError::Store(err.to_string())
    }
}

impl From<std::io::Error> for QueueError {
    fn from(err: std::io::Error) -> Self {
        QueueError::Store(err.to_string())
    }
}

/// Whether a failure should re-enter the backoff/DLQ countdown or is purely
/// informational. The attempt-count bookkeeping in `mark_failed` is the same
/// either way; this classification only shapes logging and the `error`
/// field's presentation, matching the `FailureKind` split the teacher's
/// PostgreSQL job store uses to decide between a retry and an immediate
/// dead-letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Retryable,
    NonRetryable,
}

pub trait Categorizable {
    fn classify(&self) -> FailureKind;
}

impl Categorizable for QueueError {
    fn classify(&self) -> FailureKind {
        match self {
            QueueError::InvalidInput(_) => FailureKind::NonRetryable,
            QueueError::Execution(_) => FailureKind::Retryable,
            QueueError::Store(_) => FailureKind::Retryable,
            QueueError::Shutdown => FailureKind::NonRetryable,
        }
    }
}

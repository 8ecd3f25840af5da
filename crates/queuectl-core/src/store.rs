use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::QueueError;
use crate::job::Job;

/// The single persisted document: a keyed mapping of job id to [`Job`].
/// Authoritative — any in-memory view is derived from this.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub jobs: HashMap<Uuid, Job>,
}

/// Durable, atomically-updated keyed collection of [`Job`] records.
///
/// `load`/`save` give callers a full snapshot; `with_transaction` is the
/// read-modify-write primitive every mutating `JobManager` operation goes
/// through. It must hold a cross-process lock for the duration of the
/// closure so that two worker processes can never interleave a claim (or any
/// other mutation) against the same document. The closure is synchronous —
/// decision logic never needs to await — which keeps `Store` object-safe and
/// lets `InMemoryStore` use a plain `std::sync::Mutex` while `FileStore`
/// holds an OS advisory file lock.
#[async_trait]
pub trait Store: Send + Sync {
    async fn load(&self) -> Result<Document, QueueError>;

    async fn save(&self, document: &Document) -> Result<(), QueueError>;

    async fn with_transaction(
        &self,
        mutate: Box<dyn FnOnce(&mut Document) + Send>,
    ) -> Result<Document, QueueError>;
}

//! Test doubles for [`queuectl_core::Clock`] and [`queuectl_core::Store`].
//!
//! `InMemoryStore` gives every `JobManager`/worker test a store with the same
//! read-modify-write semantics as `queuectl-store`'s file-backed one, minus
//! the disk, so invariant tests can run fast and in parallel without
//! colliding on a shared path. `TestClock` lets a test advance time
//! deterministically instead of sleeping.

use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use queuectl_core::{Clock, Document, Job, QueueError, Store};

/// A clock whose `now()` is set explicitly and advanced by the test, rather
/// than tracking the wall clock.
#[derive(Clone)]
pub struct TestClock {
    now: Arc<StdMutex<DateTime<Utc>>>,
}

impl TestClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        TestClock {
            now: Arc::new(StdMutex::new(start)),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().expect("test clock poisoned") = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().expect("test clock poisoned");
        *guard += by;
    }
}

impl Default for TestClock {
    fn default() -> Self {
        TestClock::new(Utc::now())
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("test clock poisoned")
    }
}

/// A [`Store`] backed by a plain `std::sync::Mutex`, standing in for the
/// cross-process file lock `FileStore` holds. Good enough for tests because
/// every caller in a test process shares the same `InMemoryStore` handle —
/// there is no second process to race against.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    document: Arc<StdMutex<Document>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore::default()
    }

    pub fn seeded(jobs: impl IntoIterator<Item = Job>) -> Self {
        let store = InMemoryStore::new();
        {
            let mut doc = store.document.lock().expect("store lock poisoned");
            for job in jobs {
                doc.jobs.insert(job.id, job);
            }
        }
        store
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn load(&self) -> Result<Document, QueueError> {
        Ok(self.document.lock().expect("store lock poisoned").clone())
    }

    async fn save(&self, document: &Document) -> Result<(), QueueError> {
        *self.document.lock().expect("store lock poisoned") = document.clone();
        Ok(())
    }

    async fn with_transaction(
        &self,
        mutate: Box<dyn FnOnce(&mut Document) + Send>,
    ) -> Result<Document, QueueError> {
        let mut guard = self.document.lock().expect("store lock poisoned");
        mutate(&mut guard);
        Ok(guard.clone())
    }
}

/// Builds a job ready to insert straight into an [`InMemoryStore`] fixture,
/// skipping the `JobManager::enqueue` round trip when a test only cares
/// about downstream state.
pub fn fixture_job(command: &str, priority: i64, max_retries: u32, now: DateTime<Utc>) -> Job {
    Job::new(command.to_string(), max_retries, priority, None, now)
}

pub fn fixture_job_id(job: &Job) -> Uuid {
    job.id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_store_round_trips_a_transaction() {
        let store = InMemoryStore::new();
        let job = fixture_job("echo hi", 0, 3, Utc::now());
        let id = job.id;
        store
            .with_transaction(Box::new(move |doc| {
                doc.jobs.insert(id, job);
            }))
            .await
            .unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.jobs.len(), 1);
        assert!(loaded.jobs.contains_key(&id));
    }

    #[test]
    fn test_clock_advances_deterministically() {
        let start = Utc::now();
        let clock = TestClock::new(start);
        clock.advance(Duration::seconds(30));
        assert_eq!(clock.now(), start + Duration::seconds(30));
    }
}

//! File-backed [`Store`] for queuectl.
//!
//! The document lives at a single JSON file (`data/jobs.json` by default).
//! Every mutation goes through an OS advisory write lock held on a sibling
//! `.lock` file for the duration of the read-modify-write, so two worker
//! processes (or a worker and the CLI) racing `claim`/`enqueue`/`cancel`
//! never interleave. The write itself is "write to a temp file, then
//! rename" so a crash mid-write can never leave `jobs.json` truncated or
//! partially written.
//!
//! All of the blocking file I/O and locking runs on `spawn_blocking`, since
//! `fd_lock`'s guard is not `Send` across an `.await` and std file I/O would
//! otherwise stall the async runtime.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fd_lock::RwLock as FileLock;

use queuectl_core::{Document, QueueError, Store};

/// Durable store backed by a single JSON file plus an advisory lock file.
pub struct FileStore {
    data_path: PathBuf,
    lock_path: PathBuf,
}

impl FileStore {
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        let data_path = data_path.into();
        let lock_path = sibling_with_suffix(&data_path, "lock");
        FileStore { data_path, lock_path }
    }

    fn open_lock_file(&self) -> Result<File, QueueError> {
        ensure_parent_dir(&self.data_path)?;
        OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&self.lock_path)
            .map_err(QueueError::from)
    }

    fn read_document(&self) -> Result<Document, QueueError> {
        match std::fs::read_to_string(&self.data_path) {
            Ok(raw) if raw.trim().is_empty() => Ok(Document::default()),
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(doc) => Ok(doc),
                Err(err) => {
                    tracing::warn!(
                        path = %self.data_path.display(),
                        error = %err,
                        "failed to parse job store; treating as an empty document"
                    );
                    Ok(Document::default())
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Document::default()),
            Err(err) => Err(err.into()),
        }
    }

    fn write_document(&self, document: &Document) -> Result<(), QueueError> {
        use std::io::Write as _;

        ensure_parent_dir(&self.data_path)?;
        let dir = self
            .data_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let json = serde_json::to_string_pretty(document)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.data_path)
            .map_err(|err| QueueError::store(err.to_string()))?;
        Ok(())
    }
}

fn ensure_parent_dir(path: &Path) -> Result<(), QueueError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    Ok(())
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

#[async_trait]
impl Store for FileStore {
    async fn load(&self) -> Result<Document, QueueError> {
        let data_path = self.data_path.clone();
        let lock_path = self.lock_path.clone();
        tokio::task::spawn_blocking(move || {
            let store = FileStore { data_path, lock_path };
            let lock_file = store.open_lock_file()?;
            let mut lock = FileLock::new(lock_file);
            let _guard = lock.read().map_err(|err| QueueError::store(err.to_string()))?;
            store.read_document()
        })
        .await
        .map_err(|err| QueueError::store(format!("store task panicked: {err}")))?
    }

    async fn save(&self, document: &Document) -> Result<(), QueueError> {
        let data_path = self.data_path.clone();
        let lock_path = self.lock_path.clone();
        let document = document.clone();
        tokio::task::spawn_blocking(move || {
            let store = FileStore { data_path, lock_path };
            let lock_file = store.open_lock_file()?;
            let mut lock = FileLock::new(lock_file);
            let _guard = lock.write().map_err(|err| QueueError::store(err.to_string()))?;
            store.write_document(&document)
        })
        .await
        .map_err(|err| QueueError::store(format!("store task panicked: {err}")))?
    }

    async fn with_transaction(
        &self,
        mutate: Box<dyn FnOnce(&mut Document) + Send>,
    ) -> Result<Document, QueueError> {
        let data_path = self.data_path.clone();
        let lock_path = self.lock_path.clone();
        tokio::task::spawn_blocking(move || {
            let store = FileStore { data_path, lock_path };
            let lock_file = store.open_lock_file()?;
            let mut lock = FileLock::new(lock_file);
            let _guard = lock.write().map_err(|err| QueueError::store(err.to_string()))?;
            let mut document = store.read_document()?;
            mutate(&mut document);
            store.write_document(&document)?;
            Ok(document)
        })
        .await
        .map_err(|err| QueueError::store(format!("store task panicked: {err}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queuectl_core::JobState;

    fn temp_path(name: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("queuectl-store-test-{name}-{}.json", uuid::Uuid::new_v4()));
        p
    }

    #[tokio::test]
    async fn load_on_missing_file_yields_empty_document() {
        let store = FileStore::new(temp_path("missing"));
        let doc = store.load().await.unwrap();
        assert!(doc.jobs.is_empty());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let path = temp_path("roundtrip");
        let store = FileStore::new(&path);
        let job = queuectl_core::Job::new("echo hi".to_string(), 3, 0, None, chrono::Utc::now());
        let id = job.id;
        let mut doc = Document::default();
        doc.jobs.insert(id, job);
        store.save(&doc).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.jobs.len(), 1);
        assert_eq!(loaded.jobs[&id].state, JobState::Pending);

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(sibling_with_suffix(&path, "lock"));
    }

    #[tokio::test]
    async fn with_transaction_persists_mutation() {
        let path = temp_path("txn");
        let store = FileStore::new(&path);
        let job = queuectl_core::Job::new("echo hi".to_string(), 3, 0, None, chrono::Utc::now());
        let id = job.id;
        store
            .with_transaction(Box::new(move |doc| {
                doc.jobs.insert(id, job);
            }))
            .await
            .unwrap();

        store
            .with_transaction(Box::new(move |doc| {
                doc.jobs.get_mut(&id).unwrap().state = JobState::Cancelled;
            }))
            .await
            .unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.jobs[&id].state, JobState::Cancelled);

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(sibling_with_suffix(&path, "lock"));
    }
}

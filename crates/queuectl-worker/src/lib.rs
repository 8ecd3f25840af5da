//! The worker side of queuectl: a single worker's claim/execute loop
//! ([`Worker`]) and the process supervisor that runs several of them
//! ([`WorkerPool`]).
//!
//! A worker does not know or care whether the store behind its
//! [`JobManager`] is a file on disk or an in-memory double — it only talks
//! to the manager. `WorkerPool`, on the other hand, never touches a
//! `JobManager` at all: it re-invokes the current binary as `worker
//! run-one` once per worker slot, so each worker runs as its own OS
//! process and a crash in one shell command can never take the others (or
//! the pool supervisor) down with it.

mod pool;
mod worker;

pub use pool::{PoolConfig, WorkerPool};
pub use worker::{Worker, WorkerConfig};

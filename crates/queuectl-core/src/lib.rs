//! # queuectl-core
//!
//! The job lifecycle engine: the durable [`Job`] record, the [`Store`] trait
//! that gives it atomic, cross-process durability, the priority+schedule
//! claim protocol, and the retry/backoff/DLQ state machine.
//!
//! Everything in this crate is synchronous decision logic plus a thin async
//! seam (`Store`) for I/O. Presentation (CLI output, HTTP), process
//! orchestration (the worker pool), and the concrete file-backed store live
//! in sibling crates.

mod clock;
mod config;
mod error;
mod job;
mod manager;
mod store;

pub use clock::{Clock, SystemClock};
pub use config::{config_get, config_get_all, config_set, Config, ConfigKey, CONFIG_KEYS};
pub use error::{Categorizable, FailureKind, QueueError};
pub use job::{Job, JobState};
pub use manager::{JobManager, Stats};
pub use store::{Document, Store};

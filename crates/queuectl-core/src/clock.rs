use chrono::{DateTime, Utc};

/// Injectable time source. Production code uses [`SystemClock`]; tests use
/// `queuectl-testing`'s `TestClock` to drive `run_at`/`retry_after` windows
/// deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock [`Clock`] backed by `Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

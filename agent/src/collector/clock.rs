//! Time sources

use anrwatch_shared::utils::time::{monotonic_millis, system_time_millis};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Source of time for heartbeat bookkeeping and sample timestamps
pub trait Clock: Send + Sync {
    /// Monotonic milliseconds, used to measure heartbeat gaps
    fn now_ms(&self) -> u64;

    /// Wall-clock milliseconds since UNIX epoch, stamped on samples
    fn wall_ms(&self) -> i64 {
        system_time_millis()
    }
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }

    fn wall_ms(&self) -> i64 {
        (**self).wall_ms()
    }
}

/// The process monotonic clock
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        monotonic_millis()
    }
}

/// A clock that only moves when told to. Both readings return the same value.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(start_ms),
        }
    }

    pub fn set(&self, ms: u64) {
        self.now_ms.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    fn wall_ms(&self) -> i64 {
        self.now_ms() as i64
    }
}

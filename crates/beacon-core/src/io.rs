//! Time abstraction
//!
//! TigerStyle: All wall-clock reads go through `TimeProvider`.
//!
//! Registration timestamps are taken from an injected provider so that tests
//! can pin them. Production code uses [`WallClockTime`]; tests use
//! [`ManualClock`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Time provider abstraction
pub trait TimeProvider: Send + Sync + std::fmt::Debug {
    /// Current time in milliseconds since the Unix epoch (UTC)
    fn now_ms(&self) -> u64;
}

/// Production time provider using the system clock
#[derive(Debug, Clone, Default)]
pub struct WallClockTime;

impl WallClockTime {
    /// Create a new wall clock time provider
    pub fn new() -> Self {
        Self
    }
}

impl TimeProvider for WallClockTime {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Manually set clock for tests
#[derive(Debug)]
pub struct ManualClock {
    time_ms: AtomicU64,
}

impl ManualClock {
    /// Create a clock starting at `initial_ms`
    pub fn new(initial_ms: u64) -> Self {
        Self {
            time_ms: AtomicU64::new(initial_ms),
        }
    }

    /// Advance time by `ms`
    pub fn advance(&self, ms: u64) {
        self.time_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl TimeProvider for ManualClock {
    fn now_ms(&self) -> u64 {
        self.time_ms.load(Ordering::SeqCst)
    }
}

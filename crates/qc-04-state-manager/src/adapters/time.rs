//! Time Provider Adapters

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::ports::TimeProvider;

/// Wall clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Manually driven clock for deterministic tests.
///
/// # Example
///
/// ```rust
/// use qc_04_state_manager::adapters::ArtificialTimeProvider;
/// use qc_04_state_manager::TimeProvider;
/// use std::time::Duration;
///
/// let time = ArtificialTimeProvider::new();
/// let start = time.now();
/// time.advance(Duration::from_secs(3));
/// assert_eq!(time.now(), start + Duration::from_secs(3));
/// ```
#[derive(Debug)]
pub struct ArtificialTimeProvider {
    now: Mutex<SystemTime>,
}

impl ArtificialTimeProvider {
    /// Starts at an arbitrary fixed instant well after the epoch.
    pub fn new() -> Self {
        Self::starting_at(UNIX_EPOCH + Duration::from_secs(1_700_000_000))
    }

    pub fn starting_at(now: SystemTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    pub fn set(&self, now: SystemTime) {
        *self.now.lock() = now;
    }
}

impl Default for ArtificialTimeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeProvider for ArtificialTimeProvider {
    fn now(&self) -> SystemTime {
        *self.now.lock()
    }
}

/// Wall clock driven by the tokio timer.
///
/// Follows `tokio::time::Instant`, so it advances together with a paused
/// test runtime while keeping `SystemTime` values.
#[derive(Debug, Clone)]
pub struct TokioTimeProvider {
    origin: SystemTime,
    started: tokio::time::Instant,
}

impl TokioTimeProvider {
    pub fn new() -> Self {
        Self {
            origin: SystemTime::now(),
            started: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioTimeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeProvider for TokioTimeProvider {
    fn now(&self) -> SystemTime {
        self.origin + self.started.elapsed()
    }
}

//! Clock capability used by the shutdown ladder and the redraw timer.
//!
//! Time is injected rather than read ambiently so the escalation tiers
//! and tick coalescing can be tested with a deterministic clock instead
//! of real sleeps.

use std::sync::Mutex;
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    /// Milliseconds elapsed on this clock's own monotonic timeline.
    fn now_ms(&self) -> u64;

    /// Block the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by [`Instant`] and [`std::thread::sleep`].
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Deterministic clock: `sleep` advances time instead of blocking.
///
/// Used by the shutdown and dispatch tests to walk through the tier
/// timeouts without waiting them out.
pub struct ManualClock {
    now_ms: Mutex<u64>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            now_ms: Mutex::new(0),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.now_ms.lock().expect("lock poisoned");
        *now += u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        *self.now_ms.lock().expect("lock poisoned")
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

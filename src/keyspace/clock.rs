//! Clock abstraction for key expiry
//!
//! Expiry decisions never read wall time directly; they go through a
//! `Clock` so tests can move time forward by hundreds of seconds without
//! sleeping.
//!
//! - `SystemClock`: wall time, anchored once at construction
//! - `SimulatedClock`: only moves when told to; clones share one timeline

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Point in time in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ClockTime(pub u64);

impl ClockTime {
    pub const ZERO: ClockTime = ClockTime(0);
}

impl std::ops::Add<Duration> for ClockTime {
    type Output = ClockTime;

    fn add(self, rhs: Duration) -> Self::Output {
        let ms = u64::try_from(rhs.as_millis()).unwrap_or(u64::MAX);
        ClockTime(self.0.saturating_add(ms))
    }
}

pub trait Clock: Send + Sync + Clone + 'static {
    fn now(&self) -> ClockTime;
}

/// Wall-clock time source
#[derive(Clone)]
pub struct SystemClock {
    start: Instant,
    start_millis: u64,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        // A clock set before 1970 just starts the timeline at zero.
        let start_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        SystemClock {
            start: Instant::now(),
            start_millis,
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> ClockTime {
        let elapsed = self.start.elapsed().as_millis() as u64;
        ClockTime(self.start_millis + elapsed)
    }
}

/// Manually driven clock for deterministic tests
#[derive(Clone)]
pub struct SimulatedClock {
    time_ms: Arc<AtomicU64>,
}

impl Default for SimulatedClock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl SimulatedClock {
    pub fn new(start_ms: u64) -> Self {
        SimulatedClock {
            time_ms: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, ms: u64) {
        self.time_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for SimulatedClock {
    fn now(&self) -> ClockTime {
        ClockTime(self.time_ms.load(Ordering::SeqCst))
    }
}

//! Wall-clock abstraction for frame timestamps.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Source of capture timestamps in unix seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        Utc::now().timestamp_micros() as f64 / 1_000_000.0
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    micros: Arc<AtomicU64>,
}

impl ManualClock {
    /// Start the clock at `unix_secs`.
    pub fn starting_at(unix_secs: f64) -> Self {
        Self {
            micros: Arc::new(AtomicU64::new((unix_secs * 1_000_000.0).round() as u64)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.micros
            .fetch_add(by.as_micros() as u64, Ordering::SeqCst);
    }

    /// Current time in unix microseconds.
    pub fn now_micros(&self) -> u64 {
        self.micros.load(Ordering::SeqCst)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.micros.load(Ordering::SeqCst) as f64 / 1_000_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_recent() {
        // 2023-01-01T00:00:00Z
        assert!(SystemClock.now() > 1_672_531_200.0);
    }

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::starting_at(100.0);
        let other = clock.clone();
        clock.advance(Duration::from_millis(20));
        assert!((other.now() - 100.02).abs() < 1e-9);
    }
}

//! Motion adapter fed by the platform's accelerometer/gyroscope driver.

use super::{Availability, MotionSource, SourceError};
use crate::frame::MotionSample;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug)]
struct MotionState {
    availability: Availability,
    active: AtomicBool,
    interval_micros: AtomicU64,
    latest: Mutex<Option<MotionSample>>,
}

/// Motion adapter holding the newest sample pushed by a [`MotionFeed`].
#[derive(Debug, Clone)]
pub struct PushedMotion {
    state: Arc<MotionState>,
}

impl PushedMotion {
    /// Create an inactive motion adapter.
    pub fn new(availability: Availability) -> Self {
        Self {
            state: Arc::new(MotionState {
                availability,
                active: AtomicBool::new(false),
                interval_micros: AtomicU64::new(0),
                latest: Mutex::new(None),
            }),
        }
    }

    /// A motion adapter backed by working hardware.
    pub fn available() -> Self {
        Self::new(Availability::Available)
    }

    /// Handle for the driver side to push readings.
    pub fn feed(&self) -> MotionFeed {
        MotionFeed {
            state: self.state.clone(),
        }
    }

    /// Check if motion updates are running.
    pub fn is_active(&self) -> bool {
        self.state.active.load(Ordering::SeqCst)
    }

    /// Update interval requested by the last activation.
    pub fn update_interval(&self) -> Duration {
        Duration::from_micros(self.state.interval_micros.load(Ordering::SeqCst))
    }
}

impl MotionSource for PushedMotion {
    fn activate(&self, interval: Duration) -> Result<(), SourceError> {
        self.state.availability.check("motion sensor")?;
        self.state
            .interval_micros
            .store(interval.as_micros() as u64, Ordering::SeqCst);
        self.state.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn deactivate(&self) {
        self.state.active.store(false, Ordering::SeqCst);
        *self
            .state
            .latest
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn latest_motion(&self) -> MotionSample {
        if !self.is_active() {
            return MotionSample::default();
        }
        self.state
            .latest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .unwrap_or_default()
    }
}

/// Writer handle for motion readings.
#[derive(Debug, Clone)]
pub struct MotionFeed {
    state: Arc<MotionState>,
}

impl MotionFeed {
    /// Record a reading. Ignored while the adapter is not active, and
    /// non-finite readings are dropped so the previous one stays current.
    pub fn push(&self, sample: MotionSample) {
        if !self.state.active.load(Ordering::SeqCst) {
            return;
        }
        if !sample.is_finite() {
            tracing::debug!(?sample, "dropping non-finite motion sample");
            return;
        }
        *self
            .state
            .latest
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(sample);
    }

    /// Requested update interval, for drivers that honour it.
    pub fn update_interval(&self) -> Duration {
        Duration::from_micros(self.state.interval_micros.load(Ordering::SeqCst))
    }
}

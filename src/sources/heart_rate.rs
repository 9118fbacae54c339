//! Heart rate adapter backed by a standing health-data subscription.

use super::{AtomicF64, Availability, HeartRateSource, SourceError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct HeartRateState {
    availability: Availability,
    active: AtomicBool,
    bpm: AtomicF64,
}

/// Keeps the last heart rate delivered by the health platform.
#[derive(Debug, Clone)]
pub struct HeartRateSubscription {
    state: Arc<HeartRateState>,
}

impl HeartRateSubscription {
    /// Create an inactive subscription.
    pub fn new(availability: Availability) -> Self {
        Self {
            state: Arc::new(HeartRateState {
                availability,
                active: AtomicBool::new(false),
                bpm: AtomicF64::default(),
            }),
        }
    }

    /// A subscription with health-data access granted.
    pub fn available() -> Self {
        Self::new(Availability::Available)
    }

    /// Handle for the health platform callback.
    pub fn feed(&self) -> HeartRateFeed {
        HeartRateFeed {
            state: self.state.clone(),
        }
    }

    /// Check if the subscription is open.
    pub fn is_active(&self) -> bool {
        self.state.active.load(Ordering::SeqCst)
    }
}

impl HeartRateSource for HeartRateSubscription {
    fn activate(&self) -> Result<(), SourceError> {
        self.state.availability.check("heart rate")?;
        self.state.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn deactivate(&self) {
        self.state.active.store(false, Ordering::SeqCst);
        self.state.bpm.store(0.0);
    }

    fn latest_heart_rate(&self) -> f64 {
        self.state.bpm.load()
    }
}

/// Delivery handle for the health platform's update callback.
#[derive(Debug, Clone)]
pub struct HeartRateFeed {
    state: Arc<HeartRateState>,
}

impl HeartRateFeed {
    /// Deliver a new reading in beats per minute.
    pub fn push(&self, bpm: f64) {
        if self.state.active.load(Ordering::SeqCst) && bpm.is_finite() && bpm >= 0.0 {
            self.state.bpm.store(bpm);
        }
    }
}

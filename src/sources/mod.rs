//! Sample source adapters for the wrist relay.
//!
//! Each adapter exposes the most recent value of one sensor subsystem. The
//! platform side pushes readings through a feed handle (a single writer per
//! field); the assembler tick only ever reads. Adapters never fail a read:
//! an unavailable or unauthorized sensor reads as zero.

pub mod audio;
pub mod heart_rate;
pub mod motion;
pub mod simulated;

use crate::frame::MotionSample;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub use audio::{AudioFeed, AudioPeakMeter};
pub use heart_rate::{HeartRateFeed, HeartRateSubscription};
pub use motion::{MotionFeed, PushedMotion};
pub use simulated::{SimulatedWrist, SimulationConfig};

/// Whether the hardware behind an adapter can be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Available,
    /// The device has no such sensor
    Unavailable,
    /// The user declined access
    PermissionDenied,
}

impl Availability {
    fn check(self, sensor: &'static str) -> Result<(), SourceError> {
        match self {
            Availability::Available => Ok(()),
            Availability::Unavailable => Err(SourceError::Unavailable(sensor)),
            Availability::PermissionDenied => Err(SourceError::PermissionDenied(sensor)),
        }
    }
}

/// Errors reported when activating a source.
///
/// These never abort a session; the caller logs them and reads zeros.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    Unavailable(&'static str),
    PermissionDenied(&'static str),
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Unavailable(sensor) => write!(f, "{sensor} is not available"),
            SourceError::PermissionDenied(sensor) => {
                write!(f, "{sensor} access was not granted")
            }
        }
    }
}

impl std::error::Error for SourceError {}

/// Poll-style motion adapter.
pub trait MotionSource: Send + Sync {
    /// Open the motion subscription at the requested update interval.
    fn activate(&self, interval: Duration) -> Result<(), SourceError>;
    fn deactivate(&self);
    /// Latest accelerometer and gyroscope reading, zeros when none.
    fn latest_motion(&self) -> MotionSample;
}

/// Push-fed heart rate adapter.
pub trait HeartRateSource: Send + Sync {
    fn activate(&self) -> Result<(), SourceError>;
    fn deactivate(&self);
    /// Last delivered beats per minute, 0 before the first delivery.
    fn latest_heart_rate(&self) -> f64;
}

/// Frame-based audio amplitude adapter.
pub trait AudioSource: Send + Sync {
    fn activate(&self) -> Result<(), SourceError>;
    fn deactivate(&self);
    /// Peak absolute amplitude of the last completed frame, 0 when inactive.
    fn audio_peak(&self) -> f64;
}

/// The three adapters a session reads from.
#[derive(Clone)]
pub struct SensorSources {
    pub motion: Arc<dyn MotionSource>,
    pub heart_rate: Arc<dyn HeartRateSource>,
    pub audio: Arc<dyn AudioSource>,
}

impl SensorSources {
    pub fn new(
        motion: Arc<dyn MotionSource>,
        heart_rate: Arc<dyn HeartRateSource>,
        audio: Arc<dyn AudioSource>,
    ) -> Self {
        Self {
            motion,
            heart_rate,
            audio,
        }
    }
}

/// An `f64` stored as bits so one writer and many readers need no lock.
#[derive(Debug, Default)]
pub(crate) struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub(crate) fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_f64_default_is_zero() {
        let value = AtomicF64::default();
        assert_eq!(value.load(), 0.0);
        value.store(-1.25);
        assert_eq!(value.load(), -1.25);
    }

    #[test]
    fn test_availability_errors() {
        assert!(Availability::Available.check("gyroscope").is_ok());
        assert_eq!(
            Availability::PermissionDenied.check("microphone"),
            Err(SourceError::PermissionDenied("microphone"))
        );
        let msg = SourceError::Unavailable("accelerometer").to_string();
        assert!(msg.contains("accelerometer"));
    }
}

//! Fallback repetition detector.
//!
//! A deliberately simple check run on every assembled frame: a potential rep
//! is flagged when the absolute vertical-axis acceleration exceeds a fixed
//! threshold. Pattern matching against a learned signature happens on the
//! companion device, not here.
//!
//! An optional refractory period suppresses repeated signals from a single
//! lift. With the default of zero the detector keeps no state between
//! frames.

use crate::frame::{Axis, SensorFrame};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Threshold used by the reference detector, in g.
pub const DEFAULT_THRESHOLD_G: f64 = 1.5;

/// Detector tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub threshold_g: f64,
    /// Axis treated as vertical
    pub axis: Axis,
    /// Minimum time between two signals
    #[serde(with = "crate::config::millis_serde")]
    pub refractory: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold_g: DEFAULT_THRESHOLD_G,
            axis: Axis::Y,
            refractory: Duration::ZERO,
        }
    }
}

/// A flagged frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RepSignal {
    /// Absolute vertical acceleration that crossed the threshold
    pub magnitude: f64,
}

#[derive(Debug, Clone)]
pub struct RepDetector {
    config: DetectorConfig,
    last_signal_at: Option<f64>,
}

impl RepDetector {
    /// Create a detector with the given tuning.
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            last_signal_at: None,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Check one frame. O(1); never blocks.
    pub fn inspect(&mut self, frame: &SensorFrame) -> Option<RepSignal> {
        let magnitude = frame.accel.component(self.config.axis).abs();
        // Negated crossing so a NaN threshold flags nothing either.
        if !magnitude.is_finite() || !(magnitude > self.config.threshold_g) {
            return None;
        }

        if let Some(last) = self.last_signal_at {
            let since = frame.timestamp - last;
            if since >= 0.0 && since < self.config.refractory.as_secs_f64() {
                return None;
            }
        }
        self.last_signal_at = Some(frame.timestamp);

        tracing::info!(
            target: "wrist_relay::detector",
            timestamp = frame.timestamp,
            magnitude,
            "potential rep"
        );
        Some(RepSignal { magnitude })
    }

    /// Forget refractory state between sessions.
    pub fn reset(&mut self) {
        self.last_signal_at = None;
    }
}

impl Default for RepDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{MotionSample, Vector3};

    fn frame_with_y(timestamp: f64, y: f64) -> SensorFrame {
        SensorFrame::new(
            timestamp,
            MotionSample::new(Vector3::new(0.0, y, 0.0), Vector3::ZERO),
            0.0,
            None,
        )
    }

    #[test]
    fn test_threshold() {
        let mut detector = RepDetector::default();
        assert!(detector.inspect(&frame_with_y(0.0, 2.0)).is_some());
        assert!(detector.inspect(&frame_with_y(0.02, 1.0)).is_none());
        assert!(detector.inspect(&frame_with_y(0.04, -2.0)).is_some());
        assert!(detector.inspect(&frame_with_y(0.06, 1.5)).is_none());
    }

    #[test]
    fn test_non_finite_reading_is_not_a_rep() {
        let mut detector = RepDetector::default();
        assert!(detector.inspect(&frame_with_y(0.0, f64::NAN)).is_none());
        assert!(detector.inspect(&frame_with_y(0.02, f64::INFINITY)).is_none());
        assert!(detector.inspect(&frame_with_y(0.04, f64::NEG_INFINITY)).is_none());
        assert!(detector.inspect(&frame_with_y(0.06, 2.0)).is_some());
    }

    #[test]
    fn test_uses_configured_axis() {
        let mut detector = RepDetector::new(DetectorConfig {
            axis: Axis::Z,
            ..DetectorConfig::default()
        });
        assert!(detector.inspect(&frame_with_y(0.0, 3.0)).is_none());

        let frame = SensorFrame::new(
            0.1,
            MotionSample::new(Vector3::new(0.0, 0.0, 1.8), Vector3::ZERO),
            0.0,
            None,
        );
        let signal = detector.inspect(&frame).unwrap();
        assert!((signal.magnitude - 1.8).abs() < 1e-9);
    }

    #[test]
    fn test_refractory_period() {
        let mut detector = RepDetector::new(DetectorConfig {
            refractory: Duration::from_millis(500),
            ..DetectorConfig::default()
        });
        assert!(detector.inspect(&frame_with_y(10.0, 2.0)).is_some());
        assert!(detector.inspect(&frame_with_y(10.2, 2.0)).is_none());
        assert!(detector.inspect(&frame_with_y(10.6, 2.0)).is_some());

        detector.reset();
        assert!(detector.inspect(&frame_with_y(10.61, 2.0)).is_some());
    }
}

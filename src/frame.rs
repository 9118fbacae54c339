//! Multi-sensor frame types for the wrist relay.
//!
//! A [`SensorFrame`] is one synchronized reading taken at a single assembler
//! tick. Frames are immutable once built and serialize with the camelCase
//! field names the companion receiver expects.

use serde::{Deserialize, Serialize};

/// A three-axis reading (acceleration in g, rotation rate in rad/s).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// True when no component is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Euclidean magnitude of the vector.
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Component along the given axis.
    pub fn component(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }
}

/// Device axis selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

/// One motion reading: accelerometer plus gyroscope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    pub accel: Vector3,
    pub gyro: Vector3,
}

impl MotionSample {
    pub fn new(accel: Vector3, gyro: Vector3) -> Self {
        Self { accel, gyro }
    }

    /// Only finite samples can be encoded on the wire.
    pub fn is_finite(&self) -> bool {
        self.accel.is_finite() && self.gyro.is_finite()
    }
}

/// One frame captured at an assembler tick.
///
/// `audio_peak` is present only for frames captured during a mapping session
/// and is omitted from the wire form otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorFrame {
    /// Capture time in unix seconds
    pub timestamp: f64,
    pub accel: Vector3,
    pub gyro: Vector3,
    /// Beats per minute, 0 when unknown
    pub heart_rate: f64,
    /// Absolute audio peak in 0..=1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_peak: Option<f64>,
}

impl SensorFrame {
    pub fn new(
        timestamp: f64,
        motion: MotionSample,
        heart_rate: f64,
        audio_peak: Option<f64>,
    ) -> Self {
        Self {
            timestamp,
            accel: motion.accel,
            gyro: motion.gyro,
            heart_rate,
            audio_peak,
        }
    }

    /// Motion part of the frame.
    pub fn motion(&self) -> MotionSample {
        MotionSample::new(self.accel, self.gyro)
    }
}

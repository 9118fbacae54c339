//! Audio amplitude adapter.
//!
//! The microphone tap delivers sample buffers of arbitrary length. Samples
//! are grouped into fixed-size frames; when a frame completes its absolute
//! peak becomes the published value and the running peak starts over.

use super::{AtomicF64, Availability, AudioSource, SourceError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Samples per peak frame used by the reference tap.
pub const DEFAULT_FRAME_SIZE: usize = 1024;

#[derive(Debug, Default)]
struct FrameAccumulator {
    filled: usize,
    running_peak: f64,
}

#[derive(Debug)]
struct AudioState {
    availability: Availability,
    frame_size: usize,
    active: AtomicBool,
    peak: AtomicF64,
    pending: Mutex<FrameAccumulator>,
}

/// Publishes the peak absolute amplitude of each completed audio frame.
#[derive(Debug, Clone)]
pub struct AudioPeakMeter {
    state: Arc<AudioState>,
}

impl AudioPeakMeter {
    /// Create an inactive meter with `frame_size` samples per frame.
    pub fn new(availability: Availability, frame_size: usize) -> Self {
        Self {
            state: Arc::new(AudioState {
                availability,
                frame_size: frame_size.max(1),
                active: AtomicBool::new(false),
                peak: AtomicF64::default(),
                pending: Mutex::new(FrameAccumulator::default()),
            }),
        }
    }

    /// A meter with microphone access and the default frame size.
    pub fn available() -> Self {
        Self::new(Availability::Available, DEFAULT_FRAME_SIZE)
    }

    /// Handle for the audio tap callback.
    pub fn feed(&self) -> AudioFeed {
        AudioFeed {
            state: self.state.clone(),
        }
    }

    pub fn frame_size(&self) -> usize {
        self.state.frame_size
    }

    /// Check if audio capture is running.
    pub fn is_active(&self) -> bool {
        self.state.active.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        *self
            .state
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = FrameAccumulator::default();
        self.state.peak.store(0.0);
    }
}

impl AudioSource for AudioPeakMeter {
    fn activate(&self) -> Result<(), SourceError> {
        self.state.availability.check("microphone")?;
        self.reset();
        self.state.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn deactivate(&self) {
        self.state.active.store(false, Ordering::SeqCst);
        self.reset();
    }

    fn audio_peak(&self) -> f64 {
        if !self.is_active() {
            return 0.0;
        }
        self.state.peak.load()
    }
}

/// Handle for the audio tap callback.
#[derive(Debug, Clone)]
pub struct AudioFeed {
    state: Arc<AudioState>,
}

impl AudioFeed {
    /// Feed a buffer of samples in -1..=1.
    pub fn push_samples(&self, samples: &[f32]) {
        if !self.state.active.load(Ordering::SeqCst) {
            return;
        }
        let mut pending = self
            .state
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        for sample in samples {
            // A non-finite sample still fills its slot but adds no amplitude.
            let amplitude = if sample.is_finite() {
                f64::from(sample.abs()).min(1.0)
            } else {
                0.0
            };
            if amplitude > pending.running_peak {
                pending.running_peak = amplitude;
            }
            pending.filled += 1;

            if pending.filled == self.state.frame_size {
                self.state.peak.store(pending.running_peak);
                *pending = FrameAccumulator::default();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_published_per_completed_frame() {
        let meter = AudioPeakMeter::new(Availability::Available, 4);
        let feed = meter.feed();
        meter.activate().unwrap();

        feed.push_samples(&[0.1, -0.6, 0.2]);
        assert_eq!(meter.audio_peak(), 0.0);

        feed.push_samples(&[0.3]);
        assert!((meter.audio_peak() - 0.6).abs() < 1e-6);

        // Next frame is quieter; its peak replaces the previous one.
        feed.push_samples(&[0.05, -0.1, 0.0, 0.02]);
        assert!((meter.audio_peak() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_peak_is_clamped() {
        let meter = AudioPeakMeter::new(Availability::Available, 2);
        let feed = meter.feed();
        meter.activate().unwrap();
        feed.push_samples(&[1.7, 0.0]);
        assert_eq!(meter.audio_peak(), 1.0);
    }

    #[test]
    fn test_non_finite_samples_add_no_amplitude() {
        let meter = AudioPeakMeter::new(Availability::Available, 3);
        let feed = meter.feed();
        meter.activate().unwrap();
        feed.push_samples(&[0.2, f32::NAN, f32::INFINITY]);
        assert!((meter.audio_peak() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_inactive_reads_zero() {
        let meter = AudioPeakMeter::new(Availability::Available, 2);
        let feed = meter.feed();
        meter.activate().unwrap();
        feed.push_samples(&[0.5, 0.5]);
        meter.deactivate();
        assert_eq!(meter.audio_peak(), 0.0);
    }

    #[test]
    fn test_denied_microphone() {
        let meter = AudioPeakMeter::new(Availability::PermissionDenied, DEFAULT_FRAME_SIZE);
        assert!(meter.activate().is_err());
        assert_eq!(meter.audio_peak(), 0.0);
    }
}

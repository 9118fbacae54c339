//! Frame assembly from the sample sources.

use crate::clock::Clock;
use crate::frame::SensorFrame;
use crate::sources::SensorSources;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Kind of collection session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Calibration session that also records audio amplitude
    Mapping,
    /// Regular workout without audio
    Normal,
}

impl SessionMode {
    /// Whether frames in this mode carry an audio peak.
    pub fn captures_audio(&self) -> bool {
        matches!(self, SessionMode::Mapping)
    }
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionMode::Mapping => write!(f, "mapping"),
            SessionMode::Normal => write!(f, "normal"),
        }
    }
}

impl std::str::FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mapping" => Ok(SessionMode::Mapping),
            "normal" => Ok(SessionMode::Normal),
            other => Err(format!("unknown session mode '{other}'")),
        }
    }
}

/// Settings fixed for the lifetime of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub mode: SessionMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerState {
    Idle,
    Running(SessionConfig),
}

/// Builds one [`SensorFrame`] per tick from the latest adapter values.
pub struct FrameAssembler {
    sources: SensorSources,
    clock: Arc<dyn Clock>,
    sample_interval: Duration,
    state: AssemblerState,
}

impl FrameAssembler {
    /// Create an idle assembler reading from `sources`.
    pub fn new(sources: SensorSources, clock: Arc<dyn Clock>, sample_interval: Duration) -> Self {
        Self {
            sources,
            clock,
            sample_interval,
            state: AssemblerState::Idle,
        }
    }

    /// Current assembler state.
    pub fn state(&self) -> AssemblerState {
        self.state
    }

    /// Check if the assembler is running.
    pub fn is_running(&self) -> bool {
        matches!(self.state, AssemblerState::Running(_))
    }

    /// Tick interval requested from the motion adapter.
    pub fn sample_interval(&self) -> Duration {
        self.sample_interval
    }

    /// Open the motion and heart rate subscriptions and enter Running.
    ///
    /// Returns false (and changes nothing) when already running. Sources
    /// that fail to activate are logged and read as zero.
    pub fn start(&mut self, config: SessionConfig) -> bool {
        if let AssemblerState::Running(current) = self.state {
            tracing::warn!(mode = %current.mode, "assembler already running, start ignored");
            return false;
        }

        if let Err(e) = self.sources.motion.activate(self.sample_interval) {
            tracing::warn!(error = %e, "motion unavailable, recording zero motion");
        }
        if let Err(e) = self.sources.heart_rate.activate() {
            tracing::warn!(error = %e, "heart rate unavailable, recording 0 bpm");
        }

        self.state = AssemblerState::Running(config);
        true
    }

    /// Close the subscriptions and return to Idle.
    pub fn stop(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.sources.motion.deactivate();
        self.sources.heart_rate.deactivate();
        self.state = AssemblerState::Idle;
        true
    }

    /// Read every adapter and stamp a frame. `None` while Idle.
    pub fn capture(&self) -> Option<SensorFrame> {
        let AssemblerState::Running(config) = self.state else {
            return None;
        };

        let motion = self.sources.motion.latest_motion();
        let heart_rate = self.sources.heart_rate.latest_heart_rate();
        let audio_peak = config
            .mode
            .captures_audio()
            .then(|| self.sources.audio.audio_peak());

        Some(SensorFrame::new(
            self.clock.now(),
            motion,
            heart_rate,
            audio_peak,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::frame::{MotionSample, Vector3};
    use crate::sources::{
        AudioPeakMeter, AudioSource, Availability, HeartRateSubscription, PushedMotion,
    };

    struct Rig {
        motion: PushedMotion,
        heart_rate: HeartRateSubscription,
        audio: AudioPeakMeter,
        assembler: FrameAssembler,
    }

    fn rig(motion: PushedMotion) -> Rig {
        let heart_rate = HeartRateSubscription::available();
        let audio = AudioPeakMeter::new(Availability::Available, 2);
        let sources = SensorSources::new(
            Arc::new(motion.clone()),
            Arc::new(heart_rate.clone()),
            Arc::new(audio.clone()),
        );
        let assembler = FrameAssembler::new(
            sources,
            Arc::new(ManualClock::starting_at(1_000.0)),
            Duration::from_millis(20),
        );
        Rig {
            motion,
            heart_rate,
            audio,
            assembler,
        }
    }

    #[test]
    fn test_idle_assembler_captures_nothing() {
        let rig = rig(PushedMotion::available());
        assert_eq!(rig.assembler.state(), AssemblerState::Idle);
        assert!(rig.assembler.capture().is_none());
    }

    #[test]
    fn test_capture_reads_all_sources() {
        let mut rig = rig(PushedMotion::available());
        assert!(rig.assembler.start(SessionConfig {
            mode: SessionMode::Mapping
        }));
        rig.audio.activate().unwrap();

        rig.motion.feed().push(MotionSample::new(
            Vector3::new(0.0, -1.2, 0.0),
            Vector3::new(0.3, 0.0, 0.0),
        ));
        rig.heart_rate.feed().push(101.0);
        rig.audio.feed().push_samples(&[0.4, -0.2]);

        let frame = rig.assembler.capture().unwrap();
        assert_eq!(frame.timestamp, 1_000.0);
        assert_eq!(frame.accel.y, -1.2);
        assert_eq!(frame.gyro.x, 0.3);
        assert_eq!(frame.heart_rate, 101.0);
        assert!((frame.audio_peak.unwrap() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_normal_mode_has_no_audio_peak() {
        let mut rig = rig(PushedMotion::available());
        rig.assembler.start(SessionConfig {
            mode: SessionMode::Normal,
        });
        assert_eq!(rig.assembler.capture().unwrap().audio_peak, None);
    }

    #[test]
    fn test_restart_while_running_is_ignored() {
        let mut rig = rig(PushedMotion::available());
        assert!(rig.assembler.start(SessionConfig {
            mode: SessionMode::Normal
        }));
        assert!(!rig.assembler.start(SessionConfig {
            mode: SessionMode::Mapping
        }));
        assert_eq!(
            rig.assembler.state(),
            AssemblerState::Running(SessionConfig {
                mode: SessionMode::Normal
            })
        );

        assert!(rig.assembler.stop());
        assert!(!rig.assembler.stop());
        assert!(!rig.motion.is_active());
        assert!(!rig.heart_rate.is_active());
    }

    #[test]
    fn test_missing_hardware_degrades_to_zero() {
        let mut rig = rig(PushedMotion::new(Availability::Unavailable));
        assert!(rig.assembler.start(SessionConfig {
            mode: SessionMode::Normal
        }));
        let frame = rig.assembler.capture().unwrap();
        assert_eq!(frame.motion(), MotionSample::default());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Mapping".parse::<SessionMode>(), Ok(SessionMode::Mapping));
        assert!("sprint".parse::<SessionMode>().is_err());
    }
}

//! Simulated wrist hardware.
//!
//! Drives the push side of the adapters from a background thread so the
//! pipeline can run on machines without motion, health, or microphone
//! hardware. The motion trace repeats a lift every `rep_period`, peaking
//! above the fallback detector threshold on the Y axis.

use super::{AudioFeed, HeartRateFeed, MotionFeed};
use crate::frame::{MotionSample, Vector3};
use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Shape of the generated signals.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Motion push period until an activation requests one
    pub motion_interval: Duration,
    /// Time between simulated lifts
    pub rep_period: Duration,
    /// Peak Y acceleration of a lift, in g
    pub rep_peak_g: f64,
    pub resting_bpm: f64,
    /// Samples per pushed audio buffer
    pub audio_chunk: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            motion_interval: Duration::from_millis(10),
            rep_period: Duration::from_secs(2),
            rep_peak_g: 2.0,
            resting_bpm: 96.0,
            audio_chunk: 256,
        }
    }
}

/// Background driver feeding motion, heart rate, and audio.
pub struct SimulatedWrist {
    config: SimulationConfig,
    motion: MotionFeed,
    heart_rate: HeartRateFeed,
    audio: AudioFeed,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl SimulatedWrist {
    /// Create a stopped driver for the given feeds.
    pub fn new(
        config: SimulationConfig,
        motion: MotionFeed,
        heart_rate: HeartRateFeed,
        audio: AudioFeed,
    ) -> Self {
        Self {
            config,
            motion,
            heart_rate,
            audio,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }

    /// Start pushing readings. A second call while running is ignored.
    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let running = self.running.clone();
        let config = self.config.clone();
        let motion = self.motion.clone();
        let heart_rate = self.heart_rate.clone();
        let audio = self.audio.clone();

        self.thread_handle = Some(thread::spawn(move || {
            run_driver(config, running, motion, heart_rate, audio);
        }));
    }

    /// Stop the driver thread and wait for it to exit.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    /// Check if the driver is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for SimulatedWrist {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Motion at `t` seconds into the trace.
pub fn motion_at(config: &SimulationConfig, t: f64) -> MotionSample {
    let period = config.rep_period.as_secs_f64().max(f64::EPSILON);
    let phase = (t % period) / period;
    // Gravity on -Y at rest, a raised-cosine lift in the first half of each period.
    let lift = if phase < 0.5 {
        (1.0 - (phase * 2.0 * TAU).cos()) / 2.0
    } else {
        0.0
    };
    let accel = Vector3::new(
        0.05 * (t * 3.1).sin(),
        -1.0 - lift * (config.rep_peak_g - 1.0),
        0.05 * (t * 2.3).cos(),
    );
    let gyro = Vector3::new(lift * 1.5, 0.1 * (t * 1.7).sin(), 0.0);
    MotionSample::new(accel, gyro)
}

/// Period between motion pushes: the interval requested by the last
/// activation, or the configured fallback before any activation.
fn motion_period(motion: &MotionFeed, config: &SimulationConfig) -> Duration {
    let requested = motion.update_interval();
    if requested.is_zero() {
        config.motion_interval
    } else {
        requested
    }
}

fn run_driver(
    config: SimulationConfig,
    running: Arc<AtomicBool>,
    motion: MotionFeed,
    heart_rate: HeartRateFeed,
    audio: AudioFeed,
) {
    let started = Instant::now();
    let mut last_heart_rate = None::<Instant>;
    let mut audio_phase = 0.0f64;
    let audio_chunk = config.audio_chunk.max(1);
    let mut samples = vec![0.0f32; audio_chunk];

    while running.load(Ordering::SeqCst) {
        let t = started.elapsed().as_secs_f64();
        let sample = motion_at(&config, t);
        motion.push(sample);

        if last_heart_rate.map_or(true, |at| at.elapsed() >= Duration::from_secs(1)) {
            heart_rate.push(config.resting_bpm + 6.0 * (t / 15.0).sin());
            last_heart_rate = Some(Instant::now());
        }

        // Louder audio while the wrist is moving.
        let loudness = (sample.gyro.x.abs() / 1.5).clamp(0.02, 0.9);
        for value in samples.iter_mut() {
            audio_phase += 440.0 * TAU / 16_000.0;
            *value = (loudness * audio_phase.sin()) as f32;
        }
        audio.push_samples(&samples);

        thread::sleep(motion_period(&motion, &config));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{
        AudioPeakMeter, HeartRateSource, HeartRateSubscription, MotionSource, PushedMotion,
    };

    #[test]
    fn test_trace_crosses_threshold_once_per_period() {
        let config = SimulationConfig::default();
        let peak = (0..200)
            .map(|i| motion_at(&config, i as f64 * 0.01).accel.y.abs())
            .fold(0.0, f64::max);
        assert!(peak > 1.5);

        let rest = motion_at(&config, 1.5).accel.y;
        assert!((rest + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_motion_period_follows_activation() {
        let config = SimulationConfig::default();
        let motion = PushedMotion::available();
        let feed = motion.feed();
        assert_eq!(motion_period(&feed, &config), config.motion_interval);

        motion.activate(Duration::from_millis(20)).unwrap();
        assert_eq!(motion_period(&feed, &config), Duration::from_millis(20));
    }

    #[test]
    fn test_driver_feeds_adapters() {
        let motion = PushedMotion::available();
        let heart_rate = HeartRateSubscription::available();
        let audio = AudioPeakMeter::available();
        motion.activate(Duration::from_millis(20)).unwrap();
        heart_rate.activate().unwrap();

        let mut wrist = SimulatedWrist::new(
            SimulationConfig::default(),
            motion.feed(),
            heart_rate.feed(),
            audio.feed(),
        );
        wrist.start();
        assert!(wrist.is_running());
        thread::sleep(Duration::from_millis(50));
        wrist.stop();

        assert!(!wrist.is_running());
        assert!(heart_rate.latest_heart_rate() > 0.0);
        assert!(motion.latest_motion().accel.y <= -1.0);
    }
}

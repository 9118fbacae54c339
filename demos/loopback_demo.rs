//! Loopback demo: a short mapping session on the simulated wrist, with the
//! companion side played by an in-process channel.
//!
//! Run with: cargo run --example loopback_demo

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use wrist_relay::link::{LinkMessage, LinkTransport, MemoryChannel};
use wrist_relay::sources::{
    AudioPeakMeter, HeartRateSubscription, PushedMotion, SensorSources, SimulatedWrist,
    SimulationConfig,
};
use wrist_relay::CollectionService;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let motion = PushedMotion::available();
    let heart_rate = HeartRateSubscription::available();
    let audio = AudioPeakMeter::available();
    let mut wrist = SimulatedWrist::new(
        SimulationConfig::default(),
        motion.feed(),
        heart_rate.feed(),
        audio.feed(),
    );
    let sources = SensorSources::new(Arc::new(motion), Arc::new(heart_rate), Arc::new(audio));

    let channel = MemoryChannel::new();
    let service =
        CollectionService::builder(sources, LinkTransport::new(Arc::new(channel.clone())))
            .build()
            .expect("Default config is valid");

    wrist.start();
    service.start_mapping_session();
    thread::sleep(Duration::from_secs(3));
    service.stop_session();
    wrist.stop();

    for message in channel.sent_messages() {
        match message {
            LinkMessage::SensorData(frames) => {
                let peak_y = frames.iter().map(|f| f.accel.y.abs()).fold(0.0, f64::max);
                println!(
                    "sensorData: {} frames, peak |y| {:.2}g, hr {:.0}",
                    frames.len(),
                    peak_y,
                    frames.last().map(|f| f.heart_rate).unwrap_or_default()
                );
            }
            other => println!("{}", other.message_type()),
        }
    }

    println!();
    println!("{}", service.stats().summary());
}

//! Wrist Relay CLI
//!
//! Runs a collection session on simulated wrist hardware, or acts as the
//! companion receiver for one.

use clap::{Parser, Subcommand};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use wrist_relay::{
    config::Config,
    link::{Channel, LinkMessage, LinkTransport, MemoryChannel, TcpChannel},
    sources::{
        AudioPeakMeter, Availability, HeartRateSubscription, PushedMotion, SensorSources,
        SimulatedWrist, SimulationConfig,
    },
    CollectionService, SessionEvent, SessionMode, VERSION,
};

#[derive(Parser)]
#[command(name = "wrist-relay")]
#[command(version = VERSION)]
#[command(about = "Stream wrist sensor frames to a companion device", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a collection session on simulated sensors
    Run {
        /// Session mode (mapping or normal)
        #[arg(long, default_value = "normal")]
        mode: SessionMode,

        /// Stop after this many seconds (runs until Ctrl+C otherwise)
        #[arg(long)]
        seconds: Option<u64>,

        /// Companion address (overrides the config file)
        #[arg(long)]
        companion: Option<String>,

        /// Use an in-process link instead of TCP
        #[arg(long)]
        loopback: bool,
    },

    /// Receive a session as the companion device
    Companion {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:7878")]
        listen: String,

        /// Ask the watch to start a session of this mode once connected
        #[arg(long)]
        mode: Option<SessionMode>,

        /// Send stopSession after this many seconds
        #[arg(long)]
        seconds: Option<u64>,
    },

    /// Show configuration
    Config,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            mode,
            seconds,
            companion,
            loopback,
        } => {
            cmd_run(mode, seconds, companion, loopback);
        }
        Commands::Companion {
            listen,
            mode,
            seconds,
        } => {
            cmd_companion(&listen, mode, seconds);
        }
        Commands::Config => {
            cmd_config();
        }
    }
}

fn load_config() -> Config {
    Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config, using defaults: {e}");
        Config::default()
    })
}

fn cmd_run(mode: SessionMode, seconds: Option<u64>, companion: Option<String>, loopback: bool) {
    println!("Wrist Relay v{VERSION}");
    println!();

    let mut config = load_config();
    if let Some(addr) = companion {
        config.companion = addr;
    }

    println!("Starting {mode} session...");
    println!(
        "  Sampling: every {}ms, dispatch every {}ms",
        config.sample_interval.as_millis(),
        config.dispatch_interval.as_millis()
    );
    println!(
        "  Link: {}",
        if loopback {
            "loopback".to_string()
        } else {
            config.companion.clone()
        }
    );

    let motion = PushedMotion::available();
    let heart_rate = HeartRateSubscription::available();
    let audio = AudioPeakMeter::new(Availability::Available, config.audio_frame_size);
    let mut wrist = SimulatedWrist::new(
        SimulationConfig::default(),
        motion.feed(),
        heart_rate.feed(),
        audio.feed(),
    );
    let sources = SensorSources::new(Arc::new(motion), Arc::new(heart_rate), Arc::new(audio));

    let loopback_channel = loopback.then(MemoryChannel::new);
    let channel: Arc<dyn Channel> = match &loopback_channel {
        Some(channel) => Arc::new(channel.clone()),
        None => match TcpChannel::new(config.companion.clone()) {
            Ok(channel) => Arc::new(channel),
            Err(e) => {
                eprintln!("Error creating link: {e}");
                std::process::exit(1);
            }
        },
    };

    let service = match CollectionService::builder(sources, LinkTransport::new(channel))
        .config(config)
        .build()
    {
        Ok(service) => service,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = service.activate_link() {
        eprintln!("Warning: Companion link unavailable: {e}");
        eprintln!("Continuing; batches will be dropped.");
    }

    let events = service.subscribe();
    thread::spawn(move || {
        for event in events {
            match event {
                SessionEvent::CollectionStarted { session_id, mode } => {
                    println!("[{session_id}] Collection started ({mode})");
                }
                SessionEvent::CollectionStopped { session_id } => {
                    println!("[{session_id}] Collection stopped");
                }
            }
        }
    });

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    println!();
    println!("Press Ctrl+C to stop");
    println!();

    wrist.start();
    service.start_session(mode);

    let started = Instant::now();
    let deadline = seconds.map(Duration::from_secs);
    while running.load(Ordering::SeqCst) {
        if deadline.is_some_and(|d| started.elapsed() >= d) {
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }

    println!();
    println!("Stopping collection...");
    service.stop_session();
    wrist.stop();

    if let Some(channel) = loopback_channel {
        let batches = channel
            .sent_messages()
            .iter()
            .filter(|m| matches!(m, LinkMessage::SensorData(_)))
            .count();
        println!("Loopback received {batches} sensorData messages");
    }

    println!();
    println!("{}", service.stats().summary());
}

fn cmd_companion(listen: &str, mode: Option<SessionMode>, seconds: Option<u64>) {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error creating runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run_companion(listen, mode, seconds)) {
        eprintln!("Companion error: {e}");
        std::process::exit(1);
    }
}

async fn run_companion(
    listen: &str,
    mode: Option<SessionMode>,
    seconds: Option<u64>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(listen).await?;
    println!("Companion listening on {}", listener.local_addr()?);

    let (stream, peer) = listener.accept().await?;
    println!("Watch connected from {peer}");
    let (read_half, mut write_half) = stream.into_split();

    if let Some(mode) = mode {
        let command = match mode {
            SessionMode::Mapping => LinkMessage::StartMapping,
            SessionMode::Normal => LinkMessage::StartNormal,
        };
        send_line(&mut write_half, &command).await?;
    }

    let stop_after = async {
        match seconds {
            Some(s) => tokio::time::sleep(Duration::from_secs(s)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(stop_after);

    let mut lines = BufReader::new(read_half).lines();
    let mut frames_received = 0usize;
    loop {
        tokio::select! {
            _ = &mut stop_after => {
                send_line(&mut write_half, &LinkMessage::StopSession).await?;
                println!("Sent stopSession");
                // Give the watch a moment to flush its stop message.
                tokio::time::sleep(Duration::from_millis(200)).await;
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    println!("Watch disconnected");
                    break;
                };
                match LinkMessage::from_json(&line) {
                    Ok(LinkMessage::SensorData(frames)) => {
                        frames_received += frames.len();
                        let peak_y = frames.iter().map(|f| f.accel.y.abs()).fold(0.0, f64::max);
                        let with_audio = frames.iter().filter(|f| f.audio_peak.is_some()).count();
                        println!(
                            "Batch: {} frames | peak |y|: {:.2}g | audio: {}/{}",
                            frames.len(),
                            peak_y,
                            with_audio,
                            frames.len()
                        );
                    }
                    Ok(other) => println!("Message: {}", other.message_type()),
                    Err(e) => eprintln!("Warning: {e}"),
                }
            }
        }
    }

    println!("Received {frames_received} frames");
    Ok(())
}

async fn send_line(
    writer: &mut tokio::net::tcp::OwnedWriteHalf,
    message: &LinkMessage,
) -> std::io::Result<()> {
    let mut line = message
        .to_json()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await
}

fn cmd_config() {
    let config = load_config();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: Could not set Ctrl+C handler: {e}");
    }
}

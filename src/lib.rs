//! Wrist Relay - fixed-rate wrist sensor capture streamed to a companion device.
//!
//! The relay samples motion, heart rate, and (in mapping sessions) audio
//! amplitude at a fixed cadence, buffers the assembled frames, and ships
//! them in small batches over a best-effort link to a paired device that
//! does the heavy analysis.
//!
//! # Delivery Guarantees
//!
//! - **At most once**: a batch that cannot be sent is dropped, never retried
//! - **No persistence**: frames live only in the transfer buffer until sent
//! - **Discard on stop**: frames still buffered when a session stops are not sent
//! - **Graceful degradation**: missing sensors or permissions read as zero
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                         Wrist Relay                           │
//! ├───────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐  20 ms  ┌───────────┐  100 ms  ┌────────────┐  │
//! │  │  Sources  │───────▶│ Assembler │────────▶│ Dispatcher │  │
//! │  │ motion/hr │  tick   │ + buffer  │  tick    │            │  │
//! │  │  /audio   │         └───────────┘          └────────────┘  │
//! │  └───────────┘               │                      │         │
//! │                              ▼                      ▼         │
//! │                       ┌───────────┐          ┌────────────┐   │
//! │                       │ Detector  │          │    Link    │◀──┼── commands
//! │                       └───────────┘          └────────────┘   │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wrist_relay::link::{LinkTransport, TcpChannel};
//! use wrist_relay::sources::{AudioPeakMeter, HeartRateSubscription, PushedMotion, SensorSources};
//! use wrist_relay::CollectionService;
//!
//! let sources = SensorSources::new(
//!     Arc::new(PushedMotion::available()),
//!     Arc::new(HeartRateSubscription::available()),
//!     Arc::new(AudioPeakMeter::available()),
//! );
//! let channel = TcpChannel::new("127.0.0.1:7878").expect("Failed to create link");
//! let service = CollectionService::builder(sources, LinkTransport::new(Arc::new(channel)))
//!     .build()
//!     .expect("Invalid configuration");
//!
//! service.activate_link().expect("Companion not listening");
//! service.start_mapping_session();
//! ```

pub mod assembler;
pub mod buffer;
pub mod clock;
pub mod config;
pub mod detector;
pub mod dispatcher;
pub mod frame;
pub mod link;
pub mod scheduler;
pub mod session;
pub mod sources;
pub mod stats;

// Re-export key types at crate root for convenience
pub use assembler::{FrameAssembler, SessionConfig, SessionMode};
pub use buffer::TransferBuffer;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ConfigError};
pub use detector::{DetectorConfig, RepDetector, RepSignal};
pub use frame::{Axis, MotionSample, SensorFrame, Vector3};
pub use link::{LinkError, LinkMessage, LinkTransport, MessageType, SendOutcome};
pub use scheduler::{ManualScheduler, Scheduler, ThreadScheduler, TimerHandle};
pub use session::{CollectionService, CollectionServiceBuilder, CollectionState, SessionEvent};
pub use stats::{PipelineStats, SharedStats, StatsSnapshot};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

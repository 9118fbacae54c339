//! Bidirectional link to the companion device.
//!
//! A [`Channel`] moves JSON envelopes; [`LinkTransport`] sits on top of it,
//! checking reachability before every send, swallowing send errors, and
//! routing inbound messages to a single registered handler.

pub mod memory;
pub mod message;
pub mod tcp;
pub mod transport;

use serde_json::Value;
use std::sync::Weak;

pub use memory::MemoryChannel;
pub use message::{LinkMessage, MessageError, MessageType};
pub use tcp::TcpChannel;
pub use transport::{LinkTransport, MessageHandler, SendOutcome};

/// Receives events a channel produces on its own schedule.
pub trait ChannelListener: Send + Sync {
    /// An envelope arrived from the companion.
    fn on_inbound(&self, envelope: Value);
    /// A send accepted earlier failed in the background.
    fn on_send_error(&self, error: LinkError);
}

/// Raw message channel to the companion device.
pub trait Channel: Send + Sync {
    /// Open the channel. Calling it again once open does nothing.
    fn activate(&self) -> Result<(), LinkError>;
    /// Whether a send would currently reach the companion.
    fn is_reachable(&self) -> bool;
    /// Queue an envelope without waiting for delivery.
    fn send(&self, envelope: Value) -> Result<(), LinkError>;
    /// Install the listener for inbound messages and late send failures.
    fn set_listener(&self, listener: Weak<dyn ChannelListener>);
}

/// Link errors. None of these reach session callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    Unreachable,
    /// Outbound queue is full
    QueueFull,
    Closed,
    Io(String),
}

impl std::fmt::Display for LinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkError::Unreachable => write!(f, "companion is not reachable"),
            LinkError::QueueFull => write!(f, "outbound queue is full"),
            LinkError::Closed => write!(f, "link is closed"),
            LinkError::Io(e) => write!(f, "link I/O error: {e}"),
        }
    }
}

impl std::error::Error for LinkError {}

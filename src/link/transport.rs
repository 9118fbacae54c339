//! Fire-and-forget messaging over a [`Channel`].

use super::{Channel, ChannelListener, LinkError, LinkMessage};
use crate::stats::{PipelineStats, SharedStats};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

/// Callback for inbound messages.
pub type MessageHandler = Box<dyn Fn(LinkMessage) + Send + Sync>;

/// What happened to a send attempt. Never an error for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to the channel; delivery is not confirmed
    Sent,
    /// Dropped because the companion was not reachable
    Unreachable,
    /// Dropped because the channel refused it
    Failed,
}

struct TransportInner {
    channel: Arc<dyn Channel>,
    handler: OnceLock<MessageHandler>,
    activated: AtomicBool,
    stats: SharedStats,
}

impl ChannelListener for TransportInner {
    fn on_inbound(&self, envelope: Value) {
        let message = match LinkMessage::from_value(&envelope) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "dropping inbound message");
                return;
            }
        };

        match self.handler.get() {
            Some(handler) => handler(message),
            None => tracing::debug!(
                message_type = %message.message_type(),
                "no inbound handler registered, dropping message"
            ),
        }
    }

    fn on_send_error(&self, error: LinkError) {
        tracing::warn!(error = %error, "link send failed");
        self.stats.record_send_failure();
    }
}

/// Cheap-to-clone handle to the companion link.
#[derive(Clone)]
pub struct LinkTransport {
    inner: Arc<TransportInner>,
}

impl LinkTransport {
    /// Create a transport with its own stats counters.
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        Self::with_stats(channel, Arc::new(PipelineStats::new()))
    }

    /// Build a transport that records send failures into `stats`.
    pub fn with_stats(channel: Arc<dyn Channel>, stats: SharedStats) -> Self {
        let inner = Arc::new(TransportInner {
            channel,
            handler: OnceLock::new(),
            activated: AtomicBool::new(false),
            stats,
        });
        let weak: Weak<TransportInner> = Arc::downgrade(&inner);
        let listener: Weak<dyn ChannelListener> = weak;
        inner.channel.set_listener(listener);
        Self { inner }
    }

    /// Open the underlying channel. A no-op while the channel is activated
    /// and reachable; a lost channel is reopened.
    pub fn activate(&self) -> Result<(), LinkError> {
        if self.inner.activated.swap(true, Ordering::SeqCst) && self.inner.channel.is_reachable() {
            return Ok(());
        }
        if let Err(e) = self.inner.channel.activate() {
            self.inner.activated.store(false, Ordering::SeqCst);
            tracing::warn!(error = %e, "link activation failed");
            return Err(e);
        }
        tracing::info!("companion link activated");
        Ok(())
    }

    /// Check if `activate` has succeeded.
    pub fn is_activated(&self) -> bool {
        self.inner.activated.load(Ordering::SeqCst)
    }

    /// Check if the companion is reachable right now.
    pub fn is_reachable(&self) -> bool {
        self.inner.channel.is_reachable()
    }

    /// Register the inbound handler. Only the first registration takes effect.
    pub fn on_message(&self, handler: MessageHandler) -> bool {
        if self.inner.handler.set(handler).is_err() {
            tracing::warn!("inbound handler already registered, ignoring");
            return false;
        }
        true
    }

    /// Send without waiting. Reachability is checked on every call.
    pub fn send_message(&self, message: &LinkMessage) -> SendOutcome {
        let message_type = message.message_type();

        if !self.inner.channel.is_reachable() {
            tracing::debug!(%message_type, "companion not reachable, message dropped");
            return SendOutcome::Unreachable;
        }

        let envelope = match message.to_value() {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(%message_type, error = %e, "could not encode message");
                self.inner.stats.record_send_failure();
                return SendOutcome::Failed;
            }
        };

        match self.inner.channel.send(envelope) {
            Ok(()) => SendOutcome::Sent,
            Err(LinkError::Unreachable) => {
                tracing::debug!(%message_type, "companion became unreachable, message dropped");
                SendOutcome::Unreachable
            }
            Err(e) => {
                tracing::warn!(%message_type, error = %e, "link send failed");
                self.inner.stats.record_send_failure();
                SendOutcome::Failed
            }
        }
    }

    /// Counters this transport records into.
    pub fn stats(&self) -> SharedStats {
        self.inner.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::MemoryChannel;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_unreachable_send_is_dropped() {
        let channel = MemoryChannel::new();
        let transport = LinkTransport::new(Arc::new(channel.clone()));
        channel.set_reachable(false);

        assert_eq!(
            transport.send_message(&LinkMessage::StopSession),
            SendOutcome::Unreachable
        );
        assert!(channel.sent().is_empty());
    }

    #[test]
    fn test_send_reaches_channel() {
        let channel = MemoryChannel::new();
        let transport = LinkTransport::new(Arc::new(channel.clone()));

        assert_eq!(
            transport.send_message(&LinkMessage::StartNormal),
            SendOutcome::Sent
        );
        assert_eq!(channel.sent(), vec![json!({"messageType": "startNormal"})]);
    }

    #[test]
    fn test_async_failure_is_counted_not_raised() {
        let channel = MemoryChannel::new();
        let transport = LinkTransport::new(Arc::new(channel.clone()));
        channel.set_fail_sends(true);

        assert_eq!(
            transport.send_message(&LinkMessage::StopSession),
            SendOutcome::Sent
        );
        assert_eq!(transport.stats().snapshot().send_failures, 1);
    }

    #[test]
    fn test_channel_reports_into_transport() {
        let channel = MemoryChannel::new();
        let stats = Arc::new(PipelineStats::new());
        let transport = LinkTransport::with_stats(Arc::new(channel.clone()), stats.clone());
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        transport.on_message(Box::new(move |m| sink.lock().unwrap().push(m)));

        channel.deliver(json!({"messageType": "startNormal"}));
        channel.set_fail_sends(true);
        transport.send_message(&LinkMessage::StopSession);

        assert_eq!(*received.lock().unwrap(), vec![LinkMessage::StartNormal]);
        assert_eq!(stats.snapshot().send_failures, 1);

        // The channel holds the transport weakly.
        drop(transport);
        channel.deliver(json!({"messageType": "stopSession"}));
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_activation_is_idempotent() {
        let channel = MemoryChannel::new();
        let transport = LinkTransport::new(Arc::new(channel.clone()));
        transport.activate().unwrap();
        transport.activate().unwrap();
        assert_eq!(channel.activation_count(), 1);
        assert!(transport.is_activated());
    }

    #[test]
    fn test_inbound_routing() {
        let channel = MemoryChannel::new();
        let transport = LinkTransport::new(Arc::new(channel.clone()));
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();

        assert!(transport.on_message(Box::new(move |m| sink.lock().unwrap().push(m))));
        assert!(!transport.on_message(Box::new(|_| {})));

        channel.deliver(json!({"messageType": "startMapping"}));
        channel.deliver(json!({"messageType": "selfDestruct"}));
        channel.deliver(json!({"messageType": "stopSession", "payload": {}}));

        assert_eq!(
            *received.lock().unwrap(),
            vec![LinkMessage::StartMapping, LinkMessage::StopSession]
        );
    }
}

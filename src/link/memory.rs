//! In-process channel for tests and the loopback demo.

use super::{Channel, ChannelListener, LinkError, LinkMessage};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

#[derive(Default)]
struct MemoryState {
    reachable: AtomicBool,
    fail_sends: AtomicBool,
    activations: AtomicUsize,
    sent: Mutex<Vec<Value>>,
    listener: Mutex<Option<Weak<dyn ChannelListener>>>,
}

/// A channel that records outbound envelopes and lets the test side inject
/// inbound ones. Clones share state.
#[derive(Clone)]
pub struct MemoryChannel {
    state: Arc<MemoryState>,
}

impl MemoryChannel {
    /// A reachable channel.
    pub fn new() -> Self {
        let state = MemoryState::default();
        state.reachable.store(true, Ordering::SeqCst);
        Self {
            state: Arc::new(state),
        }
    }

    /// Simulate the companion coming and going.
    pub fn set_reachable(&self, reachable: bool) {
        self.state.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Accept sends but report each one as failed through the listener.
    pub fn set_fail_sends(&self, fail: bool) {
        self.state.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Number of times `activate` reached this channel.
    pub fn activation_count(&self) -> usize {
        self.state.activations.load(Ordering::SeqCst)
    }

    /// Envelopes sent so far.
    pub fn sent(&self) -> Vec<Value> {
        self.state
            .sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Sent envelopes decoded back into messages.
    pub fn sent_messages(&self) -> Vec<LinkMessage> {
        self.sent()
            .iter()
            .filter_map(|v| LinkMessage::from_value(v).ok())
            .collect()
    }

    /// Simulate an envelope arriving from the companion.
    pub fn deliver(&self, envelope: Value) {
        if let Some(listener) = self.listener() {
            listener.on_inbound(envelope);
        }
    }

    fn listener(&self) -> Option<Arc<dyn ChannelListener>> {
        self.state
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .and_then(Weak::upgrade)
    }
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl Channel for MemoryChannel {
    fn activate(&self) -> Result<(), LinkError> {
        self.state.activations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_reachable(&self) -> bool {
        self.state.reachable.load(Ordering::SeqCst)
    }

    fn send(&self, envelope: Value) -> Result<(), LinkError> {
        if self.state.fail_sends.load(Ordering::SeqCst) {
            if let Some(listener) = self.listener() {
                listener.on_send_error(LinkError::Io("injected send failure".to_string()));
            }
            return Ok(());
        }
        self.state
            .sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(envelope);
        Ok(())
    }

    fn set_listener(&self, listener: Weak<dyn ChannelListener>) {
        *self
            .state
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(listener);
    }
}

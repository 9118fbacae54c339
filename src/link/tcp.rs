//! Newline-delimited JSON channel over TCP.
//!
//! The channel owns a small tokio runtime so it can be driven from the
//! synchronous tick threads. One connection is made on activation; if it
//! drops, the channel reports unreachable until it is activated again.

use super::{Channel, ChannelListener, LinkError};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

/// Envelopes that may wait for the socket before sends start failing.
const OUTBOUND_QUEUE: usize = 256;

#[derive(Default)]
struct TcpState {
    connected: AtomicBool,
    // Bumped per connection, always while holding `outbound`.
    generation: AtomicU64,
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    listener: Mutex<Option<Weak<dyn ChannelListener>>>,
}

impl TcpState {
    fn listener(&self) -> Option<Arc<dyn ChannelListener>> {
        self.listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .and_then(Weak::upgrade)
    }

    /// Install the sender for a new connection and return its generation.
    fn connect(&self, sender: mpsc::Sender<String>) -> u64 {
        let mut outbound = self.outbound.lock().unwrap_or_else(|e| e.into_inner());
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *outbound = Some(sender);
        self.connected.store(true, Ordering::SeqCst);
        generation
    }

    /// Tear down connection `generation`. A no-op once a newer one exists.
    fn disconnect(&self, generation: u64) {
        let mut outbound = self.outbound.lock().unwrap_or_else(|e| e.into_inner());
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        self.connected.store(false, Ordering::SeqCst);
        outbound.take();
    }
}

/// TCP link to a companion listening at `addr`.
pub struct TcpChannel {
    addr: String,
    runtime: Runtime,
    state: Arc<TcpState>,
}

impl TcpChannel {
    /// Create an unconnected channel. Nothing is dialed until `activate`.
    pub fn new(addr: impl Into<String>) -> Result<Self, LinkError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("wrist-relay-link")
            .enable_all()
            .build()
            .map_err(|e| LinkError::Io(format!("Failed to create runtime: {e}")))?;

        Ok(Self {
            addr: addr.into(),
            runtime,
            state: Arc::new(TcpState::default()),
        })
    }
}

impl Channel for TcpChannel {
    fn activate(&self) -> Result<(), LinkError> {
        if self.state.connected.load(Ordering::SeqCst) {
            return Ok(());
        }

        let stream = self
            .runtime
            .block_on(TcpStream::connect(&self.addr))
            .map_err(|e| LinkError::Io(format!("connect to {}: {e}", self.addr)))?;
        let _ = stream.set_nodelay(true);
        let (read_half, mut write_half) = stream.into_split();

        let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);
        let generation = self.state.connect(tx);

        let writer_state = self.state.clone();
        self.runtime.spawn(async move {
            while let Some(mut line) = rx.recv().await {
                line.push('\n');
                if let Err(e) = write_half.write_all(line.as_bytes()).await {
                    writer_state.disconnect(generation);
                    if let Some(listener) = writer_state.listener() {
                        listener.on_send_error(LinkError::Io(e.to_string()));
                    }
                    break;
                }
            }
        });

        let reader_state = self.state.clone();
        self.runtime.spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => match serde_json::from_str::<Value>(&line) {
                        Ok(envelope) => {
                            if let Some(listener) = reader_state.listener() {
                                listener.on_inbound(envelope);
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "ignoring unparsable line"),
                    },
                    Ok(None) => {
                        tracing::info!("companion closed the link");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "link read failed");
                        break;
                    }
                }
            }
            reader_state.disconnect(generation);
        });

        Ok(())
    }

    fn is_reachable(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    fn send(&self, envelope: Value) -> Result<(), LinkError> {
        let guard = self
            .state
            .outbound
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let sender = guard.as_ref().ok_or(LinkError::Unreachable)?;

        sender
            .try_send(envelope.to_string())
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => LinkError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => LinkError::Closed,
            })
    }

    fn set_listener(&self, listener: Weak<dyn ChannelListener>) {
        *self
            .state
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(listener);
    }
}

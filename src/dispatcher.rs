//! Hands drained batches to the companion link.

use crate::frame::SensorFrame;
use crate::link::{LinkMessage, LinkTransport, SendOutcome};
use crate::stats::SharedStats;

pub struct Dispatcher {
    link: LinkTransport,
    stats: SharedStats,
    target_batch_size: usize,
}

impl Dispatcher {
    /// Create a dispatcher sending through `link`.
    pub fn new(link: LinkTransport, stats: SharedStats, target_batch_size: usize) -> Self {
        Self {
            link,
            stats,
            target_batch_size,
        }
    }

    /// Send one batch as a single `sensorData` message.
    ///
    /// Empty batches are skipped. Frames of a batch that cannot be sent are
    /// lost; nothing is re-queued.
    pub fn dispatch(&self, batch: Vec<SensorFrame>) -> Option<SendOutcome> {
        if batch.is_empty() {
            return None;
        }

        let frames = batch.len();
        if frames > self.target_batch_size {
            tracing::debug!(
                frames,
                target = self.target_batch_size,
                "batch larger than target"
            );
        }

        let outcome = self.link.send_message(&LinkMessage::SensorData(batch));
        match outcome {
            SendOutcome::Sent => self.stats.record_batch_sent(frames),
            SendOutcome::Unreachable | SendOutcome::Failed => {
                self.stats.record_batch_dropped(frames)
            }
        }
        Some(outcome)
    }
}

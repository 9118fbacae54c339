//! Pipeline transparency counters.
//!
//! Tracks what the relay captured, sent, and lost, without retaining any
//! sensor data. Counters are lock-free so ticks can record from any thread.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug)]
pub struct PipelineStats {
    /// Frames built by the assembler
    frames_captured: AtomicU64,
    /// `sensorData` messages handed to the link
    batches_sent: AtomicU64,
    frames_sent: AtomicU64,
    /// Batches dropped because the companion was unreachable
    batches_dropped: AtomicU64,
    frames_dropped: AtomicU64,
    /// Sends the transport reported as failed
    send_failures: AtomicU64,
    /// Frames still buffered when a session stopped
    frames_discarded: AtomicU64,
    potential_reps: AtomicU64,
    sessions_started: AtomicU64,
    created_at: DateTime<Utc>,
}

impl PipelineStats {
    /// Create a new set of zeroed counters.
    pub fn new() -> Self {
        Self {
            frames_captured: AtomicU64::new(0),
            batches_sent: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            batches_dropped: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            frames_discarded: AtomicU64::new(0),
            potential_reps: AtomicU64::new(0),
            sessions_started: AtomicU64::new(0),
            created_at: Utc::now(),
        }
    }

    /// Record a frame appended to the buffer.
    pub fn record_frame_captured(&self) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a batch handed to the link.
    pub fn record_batch_sent(&self, frames: usize) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
        self.frames_sent.fetch_add(frames as u64, Ordering::Relaxed);
    }

    /// Record a batch lost to an unreachable or failing link.
    pub fn record_batch_dropped(&self, frames: usize) {
        self.batches_dropped.fetch_add(1, Ordering::Relaxed);
        self.frames_dropped.fetch_add(frames as u64, Ordering::Relaxed);
    }

    /// Record a transport send error.
    pub fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record frames cleared from the buffer on stop.
    pub fn record_frames_discarded(&self, frames: usize) {
        self.frames_discarded
            .fetch_add(frames as u64, Ordering::Relaxed);
    }

    /// Record a detector signal.
    pub fn record_potential_rep(&self) {
        self.potential_reps.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session start.
    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            batches_dropped: self.batches_dropped.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            frames_discarded: self.frames_discarded.load(Ordering::Relaxed),
            potential_reps: self.potential_reps.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            uptime_secs: (Utc::now() - self.created_at).num_seconds().max(0) as u64,
        }
    }

    /// Human-readable summary for the CLI.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Relay Statistics:\n\
             - Sessions started: {}\n\
             - Frames captured: {}\n\
             - Frames sent: {} in {} batches\n\
             - Frames dropped (companion unreachable): {} in {} batches\n\
             - Send failures: {}\n\
             - Frames discarded on stop: {}\n\
             - Potential reps flagged: {}\n\
             - Uptime: {} seconds",
            stats.sessions_started,
            stats.frames_captured,
            stats.frames_sent,
            stats.batches_sent,
            stats.frames_dropped,
            stats.batches_dropped,
            stats.send_failures,
            stats.frames_discarded,
            stats.potential_reps,
            stats.uptime_secs
        )
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub frames_captured: u64,
    pub batches_sent: u64,
    pub frames_sent: u64,
    pub batches_dropped: u64,
    pub frames_dropped: u64,
    pub send_failures: u64,
    pub frames_discarded: u64,
    pub potential_reps: u64,
    pub sessions_started: u64,
    pub uptime_secs: u64,
}

/// Thread-safe shared counters.
pub type SharedStats = Arc<PipelineStats>;

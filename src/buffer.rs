//! Transfer buffer between the assembler and the dispatcher.
//!
//! Capacity is not bounded: the dispatcher cadence keeps batches near the
//! target size under normal load, and a slow link produces larger batches
//! rather than dropped frames. Flushing always takes everything.

use crate::frame::SensorFrame;

#[derive(Debug, Default)]
pub struct TransferBuffer {
    frames: Vec<SensorFrame>,
}

impl TransferBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a frame at the end, in capture order.
    pub fn append(&mut self, frame: SensorFrame) {
        self.frames.push(frame);
    }

    /// Take every buffered frame, leaving the buffer empty.
    pub fn flush(&mut self) -> Vec<SensorFrame> {
        std::mem::take(&mut self.frames)
    }

    /// Drop every buffered frame. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.frames.len();
        self.frames.clear();
        dropped
    }

    /// Most recently appended frame.
    pub fn last(&self) -> Option<&SensorFrame> {
        self.frames.last()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::MotionSample;

    fn frame(timestamp: f64) -> SensorFrame {
        SensorFrame::new(timestamp, MotionSample::default(), 0.0, None)
    }

    #[test]
    fn test_flush_preserves_order() {
        let mut buffer = TransferBuffer::new();
        for i in 0..5 {
            buffer.append(frame(i as f64));
        }
        let batch = buffer.flush();
        let stamps: Vec<f64> = batch.iter().map(|f| f.timestamp).collect();
        assert_eq!(stamps, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_second_flush_is_empty() {
        let mut buffer = TransferBuffer::new();
        buffer.append(frame(1.0));
        assert_eq!(buffer.flush().len(), 1);
        assert!(buffer.flush().is_empty());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_clear_reports_dropped() {
        let mut buffer = TransferBuffer::new();
        buffer.append(frame(1.0));
        buffer.append(frame(2.0));
        assert_eq!(buffer.clear(), 2);
        assert_eq!(buffer.len(), 0);
    }
}

//! Frame snapshot and packet types

use std::sync::Arc;

use crate::channels::TelemetrySample;

/// An owned copy of one data buffer and the tick it was copied at.
///
/// Only the frame reader writes into a snapshot, and only after the copy was
/// confirmed against an unchanged tick count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameSnapshot {
    pub(crate) data: Vec<u8>,
    pub(crate) tick: i32,
}

impl FrameSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot with storage preallocated for `buf_len` bytes.
    pub fn with_capacity(buf_len: usize) -> Self {
        Self { data: Vec::with_capacity(buf_len), tick: 0 }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn tick(&self) -> i32 {
        self.tick
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.data.clear();
        self.tick = 0;
    }
}

/// A published frame, shareable across tasks.
#[derive(Debug, Clone)]
pub struct FramePacket {
    /// Telemetry data buffer (zero-copy via Arc)
    pub data: Arc<[u8]>,

    /// Producer tick the buffer was written at
    pub tick: i32,

    /// Session metadata counter at the time of the frame
    pub session_update: i32,

    /// Standard channels decoded from `data`
    pub sample: TelemetrySample,
}

impl FramePacket {
    pub fn new(snapshot: &FrameSnapshot, session_update: i32, sample: TelemetrySample) -> Self {
        Self { data: Arc::from(snapshot.data()), tick: snapshot.tick(), session_update, sample }
    }
}

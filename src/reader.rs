//! Frame reader
//!
//! Picks the freshest of the producer's rotating buffers and copies it out
//! without ever blocking the producer. Consistency comes from reading the
//! slot's tick count before and after the copy: if the producer touched the
//! slot in between, the copy is thrown away.
//!
//! The reader remembers the last tick it accepted. That marker is *unknown*
//! right after attach and after every disconnect, so the first observation
//! only synchronises and the next tick is the first reported frame.
//!
//! ```rust
//! use ira_telemetry::reader::{FrameReader, PollOutcome};
//! use ira_telemetry::region::{MemoryProducer, SharedRegion};
//! use ira_telemetry::types::{FrameSnapshot, VariableType};
//!
//! let producer = MemoryProducer::builder()
//!     .variable("Speed", VariableType::Float32, 1)
//!     .build();
//! producer.set_connected(true);
//! producer.publish_frame(5, |_| {});
//!
//! let mut region = producer.region();
//! region.open();
//!
//! let mut reader = FrameReader::new();
//! let mut snapshot = FrameSnapshot::new();
//! assert!(!reader.poll(&region, Some(&mut snapshot)).unwrap());
//!
//! producer.publish_frame(6, |_| {});
//! assert!(reader.poll(&region, Some(&mut snapshot)).unwrap());
//! assert_eq!(snapshot.tick(), 6);
//! ```

use crate::region::{SharedRegion, WaitResult};
use crate::schema::tick_count_offset;
use crate::types::FrameSnapshot;
use crate::{Result, TelemetryError};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// What one poll observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// A frame newer than the marker was accepted.
    NewFrame { tick: i32 },
    /// Nothing newer than the marker.
    Unchanged,
    /// The marker was unknown and has been set to the current tick.
    Synchronized { tick: i32 },
    /// The producer's connected bit is clear.
    Disconnected,
    /// The latest tick went backwards: the producer restarted.
    Restarted { previous: i32, current: i32 },
    /// Both copy attempts raced a producer write; retry on the next poll.
    Torn { tick: i32 },
    /// The region is not open.
    Unavailable,
}

impl PollOutcome {
    pub fn is_new_frame(&self) -> bool {
        matches!(self, PollOutcome::NewFrame { .. })
    }

    /// Outcomes that make `wait` return without blocking.
    pub fn ends_wait(&self) -> bool {
        matches!(self, PollOutcome::NewFrame { .. } | PollOutcome::Restarted { .. })
    }
}

/// Counters kept across polls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub frames: u64,
    pub torn_reads: u64,
    pub restarts: u64,
}

/// Optimistic snapshot read, retries once.
///
/// Reads the tick count of `slot`, copies `buf_len` bytes from `buf_offset`
/// into `dest`, then reads the tick count again. Equal ticks mean the
/// producer did not write the slot during the copy and the copy is accepted.
///
/// A mismatch means the producer was writing this slot. The producer spends
/// a full tick on the other slots before it returns here, so a second
/// attempt started right away normally completes inside that window. If it
/// does not, the producer is outrunning the copy and the call returns
/// `Ok(None)` instead of spinning; the next poll will see a newer tick.
///
/// On `Ok(None)` the contents of `dest` are unspecified.
pub fn read_snapshot<R: SharedRegion + ?Sized>(
    region: &R,
    slot: usize,
    buf_offset: usize,
    buf_len: usize,
    dest: &mut FrameSnapshot,
) -> Result<Option<i32>> {
    let tick_at = tick_count_offset(slot);
    dest.data.resize(buf_len, 0);

    for attempt in 1..=2 {
        let before = region.read_i32(tick_at)?;
        region.copy_buffer(buf_offset, &mut dest.data)?;
        let after = region.read_i32(tick_at)?;

        if before == after {
            dest.tick = before;
            return Ok(Some(before));
        }
        debug!(slot, attempt, before, after, "Buffer rewritten during copy");
    }

    Ok(None)
}

/// Tracks the last accepted tick and reads new frames.
#[derive(Debug, Default)]
pub struct FrameReader {
    last_tick: Option<i32>,
    scratch: FrameSnapshot,
    stats: ReaderStats,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last accepted tick, or `None` while unknown.
    pub fn last_tick(&self) -> Option<i32> {
        self.last_tick
    }

    /// Forget the marker. The next poll only synchronises.
    pub fn reset(&mut self) {
        if let Some(tick) = self.last_tick.take() {
            debug!(tick, "Frame reader marker reset");
        }
    }

    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    /// Whether a frame newer than the last one seen was accepted.
    ///
    /// With a destination the frame is copied into it; `dest` is only
    /// modified when this returns true.
    pub fn poll<R: SharedRegion + ?Sized>(
        &mut self,
        region: &R,
        dest: Option<&mut FrameSnapshot>,
    ) -> Result<bool> {
        self.poll_outcome(region, dest).map(|outcome| outcome.is_new_frame())
    }

    /// Like [`poll`](Self::poll), reporting what was observed.
    pub fn poll_outcome<R: SharedRegion + ?Sized>(
        &mut self,
        region: &R,
        dest: Option<&mut FrameSnapshot>,
    ) -> Result<PollOutcome> {
        if !region.is_ready() {
            return Ok(PollOutcome::Unavailable);
        }

        let header = region.header()?;
        if !header.is_connected() {
            self.reset();
            return Ok(PollOutcome::Disconnected);
        }

        let (slot, latest) = header.latest_buffer().ok_or_else(|| {
            TelemetryError::parse_error(
                "Frame reader",
                format!("header lists {} buffers", header.num_buf),
            )
        })?;
        let tick = latest.tick_count;

        let Some(marker) = self.last_tick else {
            self.last_tick = Some(tick);
            trace!(tick, slot, "Frame reader synchronised");
            return Ok(PollOutcome::Synchronized { tick });
        };

        if tick < marker {
            self.last_tick = Some(tick);
            self.stats.restarts += 1;
            debug!(previous = marker, current = tick, "Tick count went backwards");
            return Ok(PollOutcome::Restarted { previous: marker, current: tick });
        }

        if tick == marker {
            return Ok(PollOutcome::Unchanged);
        }

        let Some(dest) = dest else {
            self.last_tick = Some(tick);
            self.stats.frames += 1;
            return Ok(PollOutcome::NewFrame { tick });
        };

        let buf_offset = usize::try_from(latest.buf_offset)
            .map_err(|_| TelemetryError::memory_access_error(0))?;
        let buf_len = header.buffer_len().ok_or_else(|| {
            TelemetryError::parse_error("Frame reader", format!("buffer length {}", header.buf_len))
        })?;

        match read_snapshot(region, slot, buf_offset, buf_len, &mut self.scratch)? {
            Some(accepted) => {
                std::mem::swap(dest, &mut self.scratch);
                self.last_tick = Some(accepted);
                self.stats.frames += 1;
                trace!(tick = accepted, slot, buf_len, "Accepted frame");
                Ok(PollOutcome::NewFrame { tick: accepted })
            }
            None => {
                self.stats.torn_reads += 1;
                warn!(tick, slot, "Frame copy raced the producer twice, deferring");
                Ok(PollOutcome::Torn { tick })
            }
        }
    }

    /// Poll, block on the producer's signal for at most `timeout`, poll again.
    ///
    /// When the region is not open this sleeps for `timeout` and returns
    /// [`PollOutcome::Unavailable`] so callers never spin.
    pub fn wait<R: SharedRegion + ?Sized>(
        &mut self,
        region: &R,
        timeout: Duration,
        mut dest: Option<&mut FrameSnapshot>,
    ) -> Result<PollOutcome> {
        if !region.is_ready() {
            std::thread::sleep(timeout);
            return Ok(PollOutcome::Unavailable);
        }

        let first = self.poll_outcome(region, dest.as_deref_mut())?;
        if first.ends_wait() {
            return Ok(first);
        }

        match region.wait_for_signal(timeout) {
            Ok(WaitResult::Signaled) => trace!("Data-valid signal"),
            Ok(WaitResult::Timeout) => trace!(?timeout, "Signal wait timed out"),
            Err(err) => {
                warn!(%err, "Signal wait failed, sleeping instead");
                std::thread::sleep(timeout);
            }
        }

        let second = self.poll_outcome(region, dest)?;
        if first == PollOutcome::Disconnected && !second.is_new_frame() {
            return Ok(PollOutcome::Disconnected);
        }
        Ok(second)
    }
}

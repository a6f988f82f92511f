//! Shared region handles
//!
//! A region is the read-only view of the simulator's shared memory plus the
//! event it signals after each buffer write. [`SharedRegion`] is the seam
//! between the acquisition logic and the operating system:
//!
//! - `WindowsRegion` (Windows only) maps the real iRacing objects
//! - [`MemoryRegion`] is fed in-process by a [`MemoryProducer`] and is used
//!   for tests, benchmarks and demos on any platform
//!
//! Absence of the producer is the normal waiting condition: `open()` simply
//! returns false and is retried by the caller.

pub mod memory;

pub use memory::{FrameWriter, MemoryProducer, MemoryProducerBuilder, MemoryRegion, ProducerView};

use crate::{Result, TelemetryError};
use crate::schema::{HEADER_SIZE, SharedHeader};
use std::time::Duration;

/// Result of waiting for the data-valid signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    Signaled,
    Timeout,
}

/// Read-only access to a producer's shared memory and data-valid signal.
pub trait SharedRegion: Send {
    /// Acquire the mapping, the view and the signal.
    ///
    /// Returns true when all three are held. A failed attempt releases
    /// whatever it acquired, so no partial state survives between calls.
    fn open(&mut self) -> bool;

    /// Release every resource. Safe to call when nothing is held.
    fn close(&mut self);

    /// Whether the mapping, the view and the signal are all held.
    fn is_ready(&self) -> bool;

    /// Length of the mapped view in bytes (0 when closed).
    fn mapped_len(&self) -> usize;

    /// Fails with a memory error unless `offset..offset + len` lies inside the view.
    ///
    /// Header fields can be garbage mid-write, so sizes taken from them are
    /// checked here before anything is allocated.
    fn check_range(&self, offset: usize, len: usize) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.mapped_len() => Ok(()),
            _ => Err(TelemetryError::memory_access_error(offset)),
        }
    }

    /// Copy `dest.len()` bytes starting at `offset`.
    fn read_bytes(&self, offset: usize, dest: &mut [u8]) -> Result<()>;

    /// Read one aligned 32-bit word, in the header's byte order.
    fn read_i32(&self, offset: usize) -> Result<i32> {
        let mut word = [0u8; 4];
        self.read_bytes(offset, &mut word)?;
        Ok(i32::from_ne_bytes(word))
    }

    /// Copy a whole data buffer. This is the copy raced against the producer.
    fn copy_buffer(&self, offset: usize, dest: &mut [u8]) -> Result<()> {
        self.read_bytes(offset, dest)
    }

    /// Block until the producer signals new data or `timeout` elapses.
    fn wait_for_signal(&self, timeout: Duration) -> Result<WaitResult>;

    /// Read the header as it is right now.
    fn header(&self) -> Result<SharedHeader> {
        let mut bytes = [0u8; HEADER_SIZE];
        self.read_bytes(0, &mut bytes)?;
        SharedHeader::parse_from_memory(&bytes)
    }
}

impl<R: SharedRegion + ?Sized> SharedRegion for Box<R> {
    fn open(&mut self) -> bool {
        (**self).open()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn mapped_len(&self) -> usize {
        (**self).mapped_len()
    }

    fn read_bytes(&self, offset: usize, dest: &mut [u8]) -> Result<()> {
        (**self).read_bytes(offset, dest)
    }

    fn read_i32(&self, offset: usize) -> Result<i32> {
        (**self).read_i32(offset)
    }

    fn copy_buffer(&self, offset: usize, dest: &mut [u8]) -> Result<()> {
        (**self).copy_buffer(offset, dest)
    }

    fn wait_for_signal(&self, timeout: Duration) -> Result<WaitResult> {
        (**self).wait_for_signal(timeout)
    }

    fn header(&self) -> Result<SharedHeader> {
        (**self).header()
    }
}

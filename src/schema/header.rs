//! Shared header parsing
//!
//! The header sits at offset 0 of the shared region and follows the C layout
//! from the iRacing SDK:
//! ```c
//! typedef struct irsdk_header
//! {
//!     int ver;                    // api version, 2 for current clients
//!     int status;                 // bitfield, bit 0 = connected
//!     int tickRate;               // ticks per second (60 or 360)
//!     int sessionInfoUpdate;      // incremented when session info changes
//!     int sessionInfoLen;         // length in bytes of session info string
//!     int sessionInfoOffset;      // offset to session info string
//!     int numVars;                // length of varHeader array
//!     int varHeaderOffset;        // offset to varHeader[0]
//!     int numBuf;                 // number of rotating buffers (<= 4)
//!     int bufLen;                 // length in bytes of each buffer
//!     int pad1[2];
//!     irsdk_varBuf varBuf[4];     // tick_count, buf_offset, pad[2]
//! } irsdk_header;
//! ```
//!
//! The header is 112 bytes; each buffer descriptor is 16 bytes and the
//! descriptor array starts at byte 48. The producer rewrites tick counts in
//! place, so every value read here is a point-in-time observation. Offsets
//! derived from it are re-validated by whoever uses them.

use crate::{Result, TelemetryError};
use std::mem;
use tracing::{trace, warn};

/// The expected iRacing SDK version
pub const IRSDK_VER: i32 = 2;

/// Status flag indicating that the simulator is actively publishing telemetry
pub const IRSDK_STATUS_CONNECTED: i32 = 0x1;

/// Maximum number of rotating data buffers
pub const IRSDK_MAX_BUFS: usize = 4;

/// Size of the header in bytes
pub const HEADER_SIZE: usize = mem::size_of::<SharedHeader>();

/// Byte offset of the buffer descriptor array within the header
pub const VAR_BUF_OFFSET: usize = mem::offset_of!(SharedHeader, var_buf);

/// Size of one buffer descriptor in bytes
pub const VAR_BUF_SIZE: usize = mem::size_of::<BufferDescriptor>();

/// Shared header structure that matches the C SDK layout
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedHeader {
    /// API version (expect 2 for current SDK)
    pub ver: i32,
    /// Status bitfield
    pub status: i32,
    /// Ticks per second
    pub tick_rate: i32,
    /// Incremented when session info changes
    pub session_info_update: i32,
    /// Length in bytes of session info string
    pub session_info_len: i32,
    /// Offset to session info string
    pub session_info_offset: i32,
    /// Number of variable descriptors
    pub num_vars: i32,
    /// Offset to variable descriptor array
    pub var_header_offset: i32,
    /// Number of buffers in use
    pub num_buf: i32,
    /// Length in bytes for each buffer
    pub buf_len: i32,
    /// Padding (matches C struct pad1\[2\])
    pub pad1: [i32; 2],
    /// Rotating buffer descriptors
    pub var_buf: [BufferDescriptor; IRSDK_MAX_BUFS],
}

/// One slot of the buffer rotation
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferDescriptor {
    /// Tick count when buffer was last written
    pub tick_count: i32,
    /// Offset from region start to buffer start
    pub buf_offset: i32,
    /// Padding to maintain alignment
    pub pad: [i32; 2],
}

impl Default for SharedHeader {
    fn default() -> Self {
        Self {
            ver: IRSDK_VER,
            status: 0,
            tick_rate: 60,
            session_info_update: 0,
            session_info_len: 0,
            session_info_offset: 0,
            num_vars: 0,
            var_header_offset: 0,
            num_buf: 0,
            buf_len: 0,
            pad1: [0, 0],
            var_buf: [BufferDescriptor::default(); IRSDK_MAX_BUFS],
        }
    }
}

/// Byte offset of `slot`'s tick count within the region.
pub const fn tick_count_offset(slot: usize) -> usize {
    VAR_BUF_OFFSET + slot * VAR_BUF_SIZE
}

fn non_negative(value: i32, what: &str) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| TelemetryError::parse_error("Header validation", format!("Invalid {what}: {value}")))
}

impl SharedHeader {
    /// Read the header from the first [`HEADER_SIZE`] bytes of `memory`.
    ///
    /// Only the length is checked. Use [`validate`](Self::validate) before
    /// trusting the offsets.
    pub fn parse_from_memory(memory: &[u8]) -> Result<Self> {
        if memory.len() < HEADER_SIZE {
            return Err(TelemetryError::Memory { offset: memory.len(), source: None });
        }

        // Safety: length checked above; SharedHeader is plain i32 data, valid for any bit pattern.
        let header = unsafe { std::ptr::read_unaligned(memory.as_ptr() as *const SharedHeader) };

        trace!(
            status = header.status,
            session_info_update = header.session_info_update,
            num_buf = header.num_buf,
            "Read shared header"
        );
        Ok(header)
    }

    /// Raw bytes of the header in the producer's layout.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        // Safety: SharedHeader is repr(C) with only i32 fields and no padding bytes.
        unsafe {
            std::ptr::copy_nonoverlapping(
                self as *const SharedHeader as *const u8,
                bytes.as_mut_ptr(),
                HEADER_SIZE,
            );
        }
        bytes
    }

    /// Check layout fields for values that can be used as offsets.
    ///
    /// The version is not checked here; see [`check_version`](Self::check_version).
    pub fn validate(&self) -> Result<()> {
        if self.tick_rate <= 0 || self.tick_rate > 1000 {
            return Err(TelemetryError::parse_error(
                "Header validation",
                format!("Invalid tick rate: {}", self.tick_rate),
            ));
        }

        if !(1..=IRSDK_MAX_BUFS as i32).contains(&self.num_buf) {
            return Err(TelemetryError::parse_error(
                "Header validation",
                format!("Expected 1-{} buffers, found {}", IRSDK_MAX_BUFS, self.num_buf),
            ));
        }

        if self.buf_len <= 0 {
            return Err(TelemetryError::parse_error(
                "Header validation",
                format!("Invalid buffer length: {}", self.buf_len),
            ));
        }

        non_negative(self.num_vars, "num_vars")?;
        non_negative(self.var_header_offset, "var header offset")?;
        non_negative(self.session_info_len, "session info length")?;
        non_negative(self.session_info_offset, "session info offset")?;

        for (i, buf) in self.active_buffers().iter().enumerate() {
            if buf.buf_offset < 0 || buf.buf_offset.checked_add(self.buf_len).is_none() {
                return Err(TelemetryError::parse_error(
                    "Buffer validation",
                    format!("Buffer {} has invalid offset: {}", i, buf.buf_offset),
                ));
            }
        }

        Ok(())
    }

    /// Compare the version field with [`IRSDK_VER`].
    ///
    /// Variables are resolved by name, so callers treat a mismatch as a
    /// warning rather than a reason to refuse the region.
    pub fn check_version(&self) -> Result<()> {
        if self.ver != IRSDK_VER {
            warn!(expected = IRSDK_VER, found = self.ver, "Unexpected SDK header version");
            return Err(TelemetryError::Version {
                expected: IRSDK_VER as u32,
                found: self.ver as u32,
            });
        }
        Ok(())
    }

    /// Returns true when iRacing reports the shared memory is live
    pub fn is_connected(&self) -> bool {
        (self.status & IRSDK_STATUS_CONNECTED) != 0
    }

    /// Descriptors of the buffers in use, or an empty slice when `num_buf`
    /// is out of range.
    pub fn active_buffers(&self) -> &[BufferDescriptor] {
        match usize::try_from(self.num_buf) {
            Ok(n) if (1..=IRSDK_MAX_BUFS).contains(&n) => &self.var_buf[..n],
            _ => &[],
        }
    }

    /// The slot holding the highest tick count, with its descriptor.
    ///
    /// Ties go to the lowest slot index.
    pub fn latest_buffer(&self) -> Option<(usize, BufferDescriptor)> {
        let buffers = self.active_buffers();
        let mut best = (0usize, *buffers.first()?);
        for (index, candidate) in buffers.iter().enumerate().skip(1) {
            if candidate.tick_count > best.1.tick_count {
                best = (index, *candidate);
            }
        }
        Some(best)
    }

    /// Check if session info has been updated since last check
    pub fn session_info_changed(&self, last_update: i32) -> bool {
        self.session_info_update != last_update
    }

    /// Buffer length as a usize, if positive.
    pub fn buffer_len(&self) -> Option<usize> {
        usize::try_from(self.buf_len).ok().filter(|&len| len > 0)
    }
}

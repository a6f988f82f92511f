//! In-process shared region
//!
//! [`MemoryProducer`] lays out a header, a descriptor table, a session text
//! block and rotating data buffers exactly like the simulator does, and
//! [`MemoryRegion`] reads them through the same [`SharedRegion`] contract as
//! the Windows mapping. The producer can also disappear, come back, and
//! inject a write into the middle of a consumer's buffer copy, which is how
//! torn reads are reproduced deterministically.
//!
//! ```rust
//! use ira_telemetry::region::{MemoryProducer, SharedRegion};
//! use ira_telemetry::types::VariableType;
//!
//! let producer = MemoryProducer::builder()
//!     .variable("Speed", VariableType::Float32, 1)
//!     .build();
//! producer.set_connected(true);
//! producer.publish_frame(1, |frame| {
//!     frame.set_f32("Speed", 31.5);
//! });
//!
//! let mut region = producer.region();
//! assert!(region.open());
//! assert!(region.header().unwrap().is_connected());
//! ```

use super::{SharedRegion, WaitResult};
use crate::schema::{
    BufferDescriptor, HEADER_SIZE, IRSDK_MAX_BUFS, IRSDK_STATUS_CONNECTED, IRSDK_VER,
    SharedHeader, VAR_HEADER_SIZE, VarHeader,
};
use crate::types::{BitField, VariableInfo, VariableType};
use crate::{Result, TelemetryError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, trace, warn};

type Tear = Box<dyn FnOnce(&mut ProducerView<'_>) + Send>;

#[derive(Debug)]
struct Layout {
    num_buf: usize,
    buf_len: usize,
    session_offset: usize,
    session_capacity: usize,
    variables: Vec<VariableInfo>,
}

struct State {
    bytes: Vec<u8>,
    header: SharedHeader,
    layout: Layout,
    present: bool,
    epoch: u64,
    signals: u64,
    pending_tears: VecDeque<Tear>,
}

struct Shared {
    state: Mutex<State>,
    signal: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn align_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

enum Descriptor {
    Typed { name: String, data_type: VariableType, count: usize },
    Raw(VarHeader),
}

/// Builder for a [`MemoryProducer`].
pub struct MemoryProducerBuilder {
    version: i32,
    tick_rate: i32,
    num_buf: usize,
    session_capacity: usize,
    descriptors: Vec<Descriptor>,
}

impl Default for MemoryProducerBuilder {
    fn default() -> Self {
        Self {
            version: IRSDK_VER,
            tick_rate: 60,
            num_buf: 3,
            session_capacity: 4096,
            descriptors: Vec::new(),
        }
    }
}

impl MemoryProducerBuilder {
    pub fn version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    pub fn tick_rate(mut self, tick_rate: i32) -> Self {
        self.tick_rate = tick_rate;
        self
    }

    /// Number of rotating buffers, clamped to 1..=4.
    pub fn buffers(mut self, num_buf: usize) -> Self {
        self.num_buf = num_buf.clamp(1, IRSDK_MAX_BUFS);
        self
    }

    /// Bytes reserved for the session text, including its terminating NUL.
    pub fn session_capacity(mut self, capacity: usize) -> Self {
        self.session_capacity = capacity.max(1);
        self
    }

    /// Declare a variable; its offset is assigned at build time with natural alignment.
    pub fn variable(mut self, name: &str, data_type: VariableType, count: usize) -> Self {
        self.descriptors.push(Descriptor::Typed {
            name: name.to_string(),
            data_type,
            count: count.max(1),
        });
        self
    }

    /// Append a descriptor verbatim, without reserving buffer space for it.
    pub fn raw_variable(mut self, header: VarHeader) -> Self {
        self.descriptors.push(Descriptor::Raw(header));
        self
    }

    pub fn build(self) -> MemoryProducer {
        let mut cursor = 0usize;
        let mut variables = Vec::new();
        let mut table = Vec::with_capacity(self.descriptors.len() * VAR_HEADER_SIZE);

        for descriptor in &self.descriptors {
            match descriptor {
                Descriptor::Typed { name, data_type, count } => {
                    let offset = align_up(cursor, data_type.size());
                    cursor = offset + data_type.size() * count;
                    let info = VariableInfo {
                        name: name.clone(),
                        data_type: *data_type,
                        offset,
                        count: *count,
                        count_as_time: false,
                        units: String::new(),
                        description: String::new(),
                    };
                    table.extend_from_slice(&VarHeader::from_info(&info).to_bytes());
                    variables.push(info);
                }
                Descriptor::Raw(header) => table.extend_from_slice(&header.to_bytes()),
            }
        }

        let buf_len = align_up(cursor.max(1), 16);
        let var_header_offset = HEADER_SIZE;
        let session_offset = var_header_offset + table.len();
        let first_buffer = align_up(session_offset + self.session_capacity, 16);
        let total_len = first_buffer + self.num_buf * buf_len;

        let mut header = SharedHeader {
            ver: self.version,
            status: 0,
            tick_rate: self.tick_rate,
            session_info_update: 0,
            session_info_len: self.session_capacity as i32,
            session_info_offset: session_offset as i32,
            num_vars: self.descriptors.len() as i32,
            var_header_offset: var_header_offset as i32,
            num_buf: self.num_buf as i32,
            buf_len: buf_len as i32,
            ..SharedHeader::default()
        };
        for slot in 0..self.num_buf {
            header.var_buf[slot] = BufferDescriptor {
                tick_count: 0,
                buf_offset: (first_buffer + slot * buf_len) as i32,
                pad: [0, 0],
            };
        }

        let mut bytes = vec![0u8; total_len];
        bytes[..HEADER_SIZE].copy_from_slice(&header.to_bytes());
        bytes[var_header_offset..session_offset].copy_from_slice(&table);

        debug!(
            num_vars = header.num_vars,
            num_buf = self.num_buf,
            buf_len,
            total_len,
            "Built in-memory producer region"
        );

        let layout = Layout {
            num_buf: self.num_buf,
            buf_len,
            session_offset,
            session_capacity: self.session_capacity,
            variables,
        };

        MemoryProducer {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    bytes,
                    header,
                    layout,
                    present: true,
                    epoch: 0,
                    signals: 0,
                    pending_tears: VecDeque::new(),
                }),
                signal: Condvar::new(),
            }),
        }
    }
}

/// Writes variable values into one data buffer by name.
pub struct FrameWriter<'a> {
    data: &'a mut [u8],
    variables: &'a [VariableInfo],
}

impl FrameWriter<'_> {
    fn put(&mut self, name: &str, index: usize, data_type: VariableType, bytes: &[u8]) {
        let Some(info) = self.variables.iter().find(|v| v.name == name) else {
            warn!(name, "Frame writer: unknown variable");
            return;
        };
        if info.data_type.size() != data_type.size() || index >= info.count {
            warn!(name, index, ?data_type, "Frame writer: value does not fit variable");
            return;
        }
        let start = info.offset + index * bytes.len();
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
    }

    pub fn set_f32(&mut self, name: &str, value: f32) -> &mut Self {
        self.set_f32_at(name, 0, value)
    }

    pub fn set_f32_at(&mut self, name: &str, index: usize, value: f32) -> &mut Self {
        self.put(name, index, VariableType::Float32, &value.to_le_bytes());
        self
    }

    pub fn set_f64(&mut self, name: &str, value: f64) -> &mut Self {
        self.put(name, 0, VariableType::Float64, &value.to_le_bytes());
        self
    }

    pub fn set_i32(&mut self, name: &str, value: i32) -> &mut Self {
        self.set_i32_at(name, 0, value)
    }

    pub fn set_i32_at(&mut self, name: &str, index: usize, value: i32) -> &mut Self {
        self.put(name, index, VariableType::Int32, &value.to_le_bytes());
        self
    }

    pub fn set_bool(&mut self, name: &str, value: bool) -> &mut Self {
        self.put(name, 0, VariableType::Bool, &[u8::from(value)]);
        self
    }

    pub fn set_bitfield(&mut self, name: &str, value: BitField) -> &mut Self {
        self.put(name, 0, VariableType::BitField, &value.value().to_le_bytes());
        self
    }

    /// Overwrite the whole buffer with `byte`.
    pub fn fill(&mut self, byte: u8) -> &mut Self {
        self.data.fill(byte);
        self
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.data
    }
}

/// Mutable access to the producer side of the region.
pub struct ProducerView<'a> {
    bytes: &'a mut [u8],
    header: &'a mut SharedHeader,
    layout: &'a Layout,
    wrote_frame: bool,
}

impl ProducerView<'_> {
    fn sync_header(&mut self) {
        self.bytes[..HEADER_SIZE].copy_from_slice(&self.header.to_bytes());
    }

    /// Write a frame into `slot`, then publish `tick` for it.
    pub fn write_frame(&mut self, slot: usize, tick: i32, fill: impl FnOnce(&mut FrameWriter<'_>)) {
        if slot >= self.layout.num_buf {
            warn!(slot, num_buf = self.layout.num_buf, "Frame write to unknown slot");
            return;
        }
        let start = self.header.var_buf[slot].buf_offset as usize;
        let end = start + self.layout.buf_len;
        let mut writer =
            FrameWriter { data: &mut self.bytes[start..end], variables: &self.layout.variables };
        fill(&mut writer);
        self.header.var_buf[slot].tick_count = tick;
        self.sync_header();
        self.wrote_frame = true;
        trace!(slot, tick, "Producer wrote frame");
    }

    /// Change a slot's tick without touching its data.
    pub fn set_tick(&mut self, slot: usize, tick: i32) {
        if slot < self.layout.num_buf {
            self.header.var_buf[slot].tick_count = tick;
            self.sync_header();
        }
    }

    pub fn set_connected(&mut self, connected: bool) {
        if connected {
            self.header.status |= IRSDK_STATUS_CONNECTED;
        } else {
            self.header.status &= !IRSDK_STATUS_CONNECTED;
        }
        self.sync_header();
    }

    pub fn num_buf(&self) -> usize {
        self.layout.num_buf
    }
}

/// Producer side of an in-process region. Cheap to clone.
#[derive(Clone)]
pub struct MemoryProducer {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for MemoryProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("MemoryProducer")
            .field("header", &state.header)
            .field("present", &state.present)
            .finish()
    }
}

impl MemoryProducer {
    pub fn builder() -> MemoryProducerBuilder {
        MemoryProducerBuilder::default()
    }

    /// A new, unopened consumer handle.
    pub fn region(&self) -> MemoryRegion {
        MemoryRegion { shared: Arc::clone(&self.shared), opened_epoch: None, seen_signals: AtomicU64::new(0) }
    }

    /// Run `f` against the producer view; signals consumers if a frame was written.
    pub fn with_view<T>(&self, f: impl FnOnce(&mut ProducerView<'_>) -> T) -> T {
        let mut guard = self.shared.lock();
        let state = &mut *guard;
        let mut view = ProducerView {
            bytes: &mut state.bytes,
            header: &mut state.header,
            layout: &state.layout,
            wrote_frame: false,
        };
        let result = f(&mut view);
        if view.wrote_frame {
            state.signals += 1;
            self.shared.signal.notify_all();
        }
        result
    }

    pub fn set_connected(&self, connected: bool) {
        self.with_view(|view| view.set_connected(connected));
    }

    /// Write a frame into slot `tick % num_buf` and publish `tick`.
    pub fn publish_frame(&self, tick: i32, fill: impl FnOnce(&mut FrameWriter<'_>)) {
        self.with_view(|view| {
            let slot = tick.rem_euclid(view.num_buf() as i32) as usize;
            view.write_frame(slot, tick, fill);
        });
    }

    pub fn write_frame(&self, slot: usize, tick: i32, fill: impl FnOnce(&mut FrameWriter<'_>)) {
        self.with_view(|view| view.write_frame(slot, tick, fill));
    }

    pub fn set_tick(&self, slot: usize, tick: i32) {
        self.with_view(|view| view.set_tick(slot, tick));
    }

    pub fn set_version(&self, version: i32) {
        self.with_view(|view| {
            view.header.ver = version;
            view.sync_header();
        });
    }

    /// Replace the session text and bump the update counter.
    pub fn set_session_info(&self, text: &str) -> Result<()> {
        let mut state = self.shared.lock();
        let capacity = state.layout.session_capacity;
        if text.len() >= capacity {
            return Err(TelemetryError::Memory { offset: text.len(), source: None });
        }
        let start = state.layout.session_offset;
        let block = &mut state.bytes[start..start + capacity];
        block.fill(0);
        block[..text.len()].copy_from_slice(text.as_bytes());
        state.header.session_info_update = state.header.session_info_update.wrapping_add(1);
        let header = state.header.to_bytes();
        state.bytes[..HEADER_SIZE].copy_from_slice(&header);
        debug!(
            update = state.header.session_info_update,
            bytes = text.len(),
            "Producer published session info"
        );
        Ok(())
    }

    /// Apply `tear` in the middle of the next consumer buffer copy.
    pub fn tear_next_copy(&self, tear: impl FnOnce(&mut ProducerView<'_>) + Send + 'static) {
        self.shared.lock().pending_tears.push_back(Box::new(tear));
    }

    /// Number of queued tears not yet applied.
    pub fn pending_tears(&self) -> usize {
        self.shared.lock().pending_tears.len()
    }

    /// The producer exits: open handles stop being ready and new opens fail.
    pub fn disappear(&self) {
        let mut state = self.shared.lock();
        state.present = false;
        state.epoch += 1;
        state.header.status = 0;
        let header = state.header.to_bytes();
        state.bytes[..HEADER_SIZE].copy_from_slice(&header);
        self.shared.signal.notify_all();
        debug!(epoch = state.epoch, "Producer disappeared");
    }

    /// The producer publishes its region again; the connected bit stays clear.
    pub fn reappear(&self) {
        let mut state = self.shared.lock();
        state.present = true;
        debug!(epoch = state.epoch, "Producer reappeared");
    }

    pub fn header(&self) -> SharedHeader {
        self.shared.lock().header
    }

    pub fn buffer_len(&self) -> usize {
        self.shared.lock().layout.buf_len
    }

    pub fn variables(&self) -> Vec<VariableInfo> {
        self.shared.lock().layout.variables.clone()
    }
}

/// Consumer side of an in-process region.
pub struct MemoryRegion {
    shared: Arc<Shared>,
    opened_epoch: Option<u64>,
    seen_signals: AtomicU64,
}

impl MemoryRegion {
    fn ready_in(&self, state: &State) -> bool {
        state.present && self.opened_epoch == Some(state.epoch)
    }

    fn ready_state(&self) -> Result<MutexGuard<'_, State>> {
        let state = self.shared.lock();
        if !self.ready_in(&state) {
            return Err(TelemetryError::connection_failed("shared memory region is not open"));
        }
        Ok(state)
    }
}

fn checked_range(offset: usize, len: usize, total: usize) -> Result<std::ops::Range<usize>> {
    match offset.checked_add(len) {
        Some(end) if end <= total => Ok(offset..end),
        _ => Err(TelemetryError::Memory { offset, source: None }),
    }
}

impl SharedRegion for MemoryRegion {
    fn open(&mut self) -> bool {
        let state = self.shared.lock();
        if self.ready_in(&state) {
            return true;
        }
        if !state.present {
            trace!("In-memory producer not present");
            return false;
        }
        self.opened_epoch = Some(state.epoch);
        self.seen_signals.store(state.signals, Ordering::Release);
        debug!(epoch = state.epoch, "Opened in-memory region");
        true
    }

    fn close(&mut self) {
        if self.opened_epoch.take().is_some() {
            debug!("Closed in-memory region");
        }
    }

    fn is_ready(&self) -> bool {
        self.ready_in(&self.shared.lock())
    }

    fn mapped_len(&self) -> usize {
        let state = self.shared.lock();
        if self.ready_in(&state) { state.bytes.len() } else { 0 }
    }

    fn read_bytes(&self, offset: usize, dest: &mut [u8]) -> Result<()> {
        let state = self.ready_state()?;
        let range = checked_range(offset, dest.len(), state.bytes.len())?;
        dest.copy_from_slice(&state.bytes[range]);
        Ok(())
    }

    fn copy_buffer(&self, offset: usize, dest: &mut [u8]) -> Result<()> {
        let mut guard = self.ready_state()?;
        let range = checked_range(offset, dest.len(), guard.bytes.len())?;
        let half = dest.len() / 2;
        dest[..half].copy_from_slice(&guard.bytes[range.start..range.start + half]);

        if let Some(tear) = guard.pending_tears.pop_front() {
            let state = &mut *guard;
            let mut view = ProducerView {
                bytes: &mut state.bytes,
                header: &mut state.header,
                layout: &state.layout,
                wrote_frame: false,
            };
            tear(&mut view);
            if view.wrote_frame {
                state.signals += 1;
                self.shared.signal.notify_all();
            }
            trace!(offset, "Applied producer write mid-copy");
        }

        dest[half..].copy_from_slice(&guard.bytes[range.start + half..range.end]);
        Ok(())
    }

    fn wait_for_signal(&self, timeout: Duration) -> Result<WaitResult> {
        let guard = self.ready_state()?;
        let seen = self.seen_signals.load(Ordering::Acquire);
        let (guard, _) = self
            .shared
            .signal
            .wait_timeout_while(guard, timeout, |state| state.present && state.signals == seen)
            .unwrap_or_else(PoisonError::into_inner);

        if guard.signals != seen {
            self.seen_signals.store(guard.signals, Ordering::Release);
            Ok(WaitResult::Signaled)
        } else {
            Ok(WaitResult::Timeout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{VariableDirectory, tick_count_offset};
    use crate::types::read_float;
    use std::time::Instant;

    fn producer() -> MemoryProducer {
        MemoryProducer::builder()
            .buffers(2)
            .variable("Gear", VariableType::Int32, 1)
            .variable("Speed", VariableType::Float32, 1)
            .variable("SessionTime", VariableType::Float64, 1)
            .variable("IsOnTrack", VariableType::Bool, 1)
            .build()
    }

    #[test]
    fn layout_aligns_variables_and_buffers() {
        let producer = producer();
        let vars = producer.variables();
        let offsets: Vec<usize> = vars.iter().map(|v| v.offset).collect();
        assert_eq!(offsets, vec![0, 4, 8, 16]);
        assert_eq!(producer.buffer_len(), 32);

        let header = producer.header();
        assert!(header.validate().is_ok());
        assert_eq!(header.var_header_offset as usize, HEADER_SIZE);
        assert_eq!(header.var_buf[0].buf_offset % 16, 0);
        assert_eq!(header.var_buf[1].buf_offset - header.var_buf[0].buf_offset, 32);
    }

    #[test]
    fn region_reads_what_the_producer_wrote() {
        let producer = producer();
        producer.set_connected(true);
        producer.write_frame(1, 12, |w| {
            w.set_f32("Speed", 55.5).set_i32("Gear", 4);
        });

        let mut region = producer.region();
        assert!(!region.is_ready());
        assert!(region.open());
        let header = region.header().unwrap();
        assert!(header.is_connected());
        assert_eq!(region.read_i32(tick_count_offset(1)).unwrap(), 12);

        let dir = VariableDirectory::load(&region, &header).unwrap();
        let mut data = vec![0u8; header.buf_len as usize];
        region.copy_buffer(header.var_buf[1].buf_offset as usize, &mut data).unwrap();
        assert_eq!(read_float(&data, dir.offset_of("Speed").unwrap(), 0), Some(55.5));
    }

    #[test]
    fn reads_outside_the_region_fail() {
        let producer = producer();
        let mut region = producer.region();
        assert!(region.open());
        let mut dest = [0u8; 8];
        let len = region.mapped_len();
        assert!(matches!(region.read_bytes(len - 4, &mut dest), Err(TelemetryError::Memory { .. })));
        assert!(region.read_bytes(usize::MAX, &mut dest).is_err());
    }

    #[test]
    fn disappearance_invalidates_open_handles() {
        let producer = producer();
        let mut region = producer.region();
        assert!(region.open());
        producer.disappear();
        assert!(!region.is_ready());
        assert_eq!(region.mapped_len(), 0);
        assert!(region.header().is_err());
        assert!(!region.open());

        producer.reappear();
        assert!(region.open());
        assert!(!region.header().unwrap().is_connected());
    }

    #[test]
    fn tear_is_applied_between_copy_halves() {
        let producer = producer();
        producer.write_frame(0, 1, |w| {
            w.fill(0xAA);
        });
        producer.tear_next_copy(|view| {
            view.write_frame(0, 2, |w| {
                w.fill(0xBB);
            })
        });

        let mut region = producer.region();
        assert!(region.open());
        let header = region.header().unwrap();
        let mut data = vec![0u8; header.buf_len as usize];
        region.copy_buffer(header.var_buf[0].buf_offset as usize, &mut data).unwrap();

        assert!(data[..16].iter().all(|&b| b == 0xAA));
        assert!(data[16..].iter().all(|&b| b == 0xBB));
        assert_eq!(region.read_i32(tick_count_offset(0)).unwrap(), 2);
        assert_eq!(producer.pending_tears(), 0);
    }

    #[test]
    fn signal_wakes_waiters_and_times_out_otherwise() {
        let producer = producer();
        let mut region = producer.region();
        assert!(region.open());

        let start = Instant::now();
        assert_eq!(region.wait_for_signal(Duration::from_millis(20)).unwrap(), WaitResult::Timeout);
        assert!(start.elapsed() >= Duration::from_millis(15));

        producer.publish_frame(1, |_| {});
        assert_eq!(region.wait_for_signal(Duration::from_millis(20)).unwrap(), WaitResult::Signaled);

        let writer = producer.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            writer.publish_frame(2, |_| {});
        });
        assert_eq!(region.wait_for_signal(Duration::from_secs(5)).unwrap(), WaitResult::Signaled);
        handle.join().unwrap();
    }

    #[test]
    fn session_info_must_leave_room_for_terminator() {
        let producer = MemoryProducer::builder().session_capacity(8).build();
        assert!(producer.set_session_info("1234567").is_ok());
        assert!(producer.set_session_info("12345678").is_err());
        assert_eq!(producer.header().session_info_update, 1);
    }

    #[test]
    fn frame_writer_ignores_unknown_and_misfit_values() {
        let producer = producer();
        producer.write_frame(0, 1, |w| {
            w.set_f32("Nope", 1.0).set_f64("Speed", 2.0).set_f32_at("Speed", 1, 3.0);
            w.set_bool("IsOnTrack", true);
        });
        let mut region = producer.region();
        assert!(region.open());
        let header = region.header().unwrap();
        let mut data = vec![0u8; header.buf_len as usize];
        region.copy_buffer(header.var_buf[0].buf_offset as usize, &mut data).unwrap();
        assert_eq!(read_float(&data, 4, 0), Some(0.0));
        assert_eq!(data[16], 1);
    }
}

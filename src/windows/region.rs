//! The simulator's shared memory, mapped read-only.

use crate::config::ClientConfig;
use crate::region::{SharedRegion, WaitResult};
use crate::schema::HEADER_SIZE;
use crate::{Result, TelemetryError};
use std::ptr::NonNull;
use std::time::Duration;
use tracing::{debug, trace, warn};
use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT};
use windows::Win32::System::Memory::{
    FILE_MAP_READ, MEMORY_BASIC_INFORMATION, MEMORY_MAPPED_VIEW_ADDRESS, MapViewOfFile,
    OpenFileMappingW, UnmapViewOfFile, VirtualQuery,
};
use windows::Win32::System::Threading::{
    OpenEventW, SYNCHRONIZATION_ACCESS_RIGHTS, WaitForSingleObject,
};
use windows::core::PCWSTR;

/// SYNCHRONIZE access right; all a waiter needs.
const SYNCHRONIZE: u32 = 0x0010_0000;

/// Everything `open()` acquired. Dropping it releases whatever is held.
struct Handles {
    mapping: HANDLE,
    view: Option<NonNull<u8>>,
    len: usize,
    event: Option<HANDLE>,
}

impl Handles {
    fn view(&self) -> Option<NonNull<u8>> {
        self.view.filter(|_| self.event.is_some())
    }
}

impl Drop for Handles {
    fn drop(&mut self) {
        unsafe {
            if let Some(event) = self.event.take() {
                let _ = CloseHandle(event);
            }
            if let Some(view) = self.view.take() {
                let _ = UnmapViewOfFile(MEMORY_MAPPED_VIEW_ADDRESS { Value: view.as_ptr().cast() });
            }
            let _ = CloseHandle(self.mapping);
        }
    }
}

/// Read-only handle on the named mapping and data-valid event.
pub struct WindowsRegion {
    mapping_name: Vec<u16>,
    event_name: Vec<u16>,
    handles: Option<Handles>,
}

// SAFETY: the handles are process-wide kernel objects and the view is only
// ever read through bounds-checked copies.
unsafe impl Send for WindowsRegion {}

impl WindowsRegion {
    /// Region using the well-known iRacing object names.
    pub fn new() -> Self {
        Self::from_config(&ClientConfig::default())
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::with_names(&config.mapping_name, &config.event_name)
    }

    pub fn with_names(mapping_name: &str, event_name: &str) -> Self {
        Self {
            mapping_name: wide_string(mapping_name),
            event_name: wide_string(event_name),
            handles: None,
        }
    }

    fn acquire(&self) -> Result<Handles> {
        let mapping = unsafe {
            OpenFileMappingW(FILE_MAP_READ.0, false, PCWSTR::from_raw(self.mapping_name.as_ptr()))
                .map_err(|e| TelemetryError::windows_api_error("OpenFileMappingW", e))?
        };
        let mut handles = Handles { mapping, view: None, len: 0, event: None };

        let view = unsafe { MapViewOfFile(mapping, FILE_MAP_READ, 0, 0, 0) };
        let base = NonNull::new(view.Value.cast::<u8>()).ok_or_else(|| {
            TelemetryError::windows_api_error("MapViewOfFile", windows::core::Error::from_thread())
        })?;
        handles.view = Some(base);

        let mut info = MEMORY_BASIC_INFORMATION::default();
        let written = unsafe {
            VirtualQuery(
                Some(base.as_ptr().cast_const().cast()),
                &mut info,
                std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
            )
        };
        if written == 0 {
            return Err(TelemetryError::windows_api_error(
                "VirtualQuery",
                windows::core::Error::from_thread(),
            ));
        }
        handles.len = info.RegionSize;
        if handles.len < HEADER_SIZE {
            return Err(TelemetryError::memory_access_error(handles.len));
        }

        let event = unsafe {
            OpenEventW(
                SYNCHRONIZATION_ACCESS_RIGHTS(SYNCHRONIZE),
                false,
                PCWSTR::from_raw(self.event_name.as_ptr()),
            )
            .map_err(|e| TelemetryError::windows_api_error("OpenEventW", e))?
        };
        handles.event = Some(event);

        Ok(handles)
    }

    fn checked_ptr(&self, offset: usize, len: usize) -> Result<*const u8> {
        let handles = self.handles.as_ref().ok_or_else(|| {
            TelemetryError::connection_failed("shared memory region is not open")
        })?;
        let base = handles.view().ok_or_else(|| TelemetryError::memory_access_error(offset))?;
        match offset.checked_add(len) {
            Some(end) if end <= handles.len => Ok(unsafe { base.as_ptr().add(offset).cast_const() }),
            _ => Err(TelemetryError::memory_access_error(offset)),
        }
    }
}

impl Default for WindowsRegion {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedRegion for WindowsRegion {
    fn open(&mut self) -> bool {
        if self.handles.is_some() {
            return true;
        }
        match self.acquire() {
            Ok(handles) => {
                debug!(len = handles.len, "Opened iRacing shared memory");
                self.handles = Some(handles);
                true
            }
            Err(e) => {
                trace!(error = %e, "Shared memory not available");
                false
            }
        }
    }

    fn close(&mut self) {
        if self.handles.take().is_some() {
            debug!("Closed iRacing shared memory");
        }
    }

    fn is_ready(&self) -> bool {
        self.handles.as_ref().is_some_and(|h| h.view().is_some())
    }

    fn mapped_len(&self) -> usize {
        self.handles.as_ref().map_or(0, |h| h.len)
    }

    fn read_bytes(&self, offset: usize, dest: &mut [u8]) -> Result<()> {
        let src = self.checked_ptr(offset, dest.len())?;
        // SAFETY: range checked against the mapped length above.
        unsafe { std::ptr::copy_nonoverlapping(src, dest.as_mut_ptr(), dest.len()) };
        Ok(())
    }

    fn read_i32(&self, offset: usize) -> Result<i32> {
        let src = self.checked_ptr(offset, 4)?;
        if src.align_offset(std::mem::align_of::<i32>()) != 0 {
            let mut word = [0u8; 4];
            self.read_bytes(offset, &mut word)?;
            return Ok(i32::from_ne_bytes(word));
        }
        // The producer rewrites this word concurrently; always go to memory.
        Ok(unsafe { std::ptr::read_volatile(src.cast::<i32>()) })
    }

    fn wait_for_signal(&self, timeout: Duration) -> Result<WaitResult> {
        let event = self
            .handles
            .as_ref()
            .and_then(|h| h.event)
            .ok_or_else(|| TelemetryError::connection_failed("data-valid event is not open"))?;
        let ms = timeout.as_millis().min(u32::MAX as u128) as u32;

        match unsafe { WaitForSingleObject(event, ms) } {
            WAIT_OBJECT_0 => Ok(WaitResult::Signaled),
            WAIT_TIMEOUT => Ok(WaitResult::Timeout),
            other => {
                warn!(result = other.0, "Unexpected wait result");
                Err(TelemetryError::windows_api_error(
                    "WaitForSingleObject",
                    windows::core::Error::from_thread(),
                ))
            }
        }
    }
}

impl std::fmt::Debug for WindowsRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowsRegion")
            .field("mapping_name", &String::from_utf16_lossy(&self.mapping_name))
            .field("ready", &self.is_ready())
            .field("mapped_len", &self.mapped_len())
            .finish()
    }
}

/// Convert string to null-terminated wide string for Windows APIs
pub(crate) fn wide_string(s: &str) -> Vec<u16> {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    OsStr::new(s).encode_wide().chain(std::iter::once(0)).collect()
}

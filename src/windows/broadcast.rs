//! Broadcast delivery through the window message queue.

use super::region::wide_string;
use crate::broadcast::{BroadcastMessage, BroadcastSink};
use crate::config::ClientConfig;
use crate::{Result, TelemetryError};
use tracing::{debug, trace};
use windows::Win32::Foundation::{LPARAM, WPARAM};
use windows::Win32::UI::WindowsAndMessaging::{
    HWND_BROADCAST, RegisterWindowMessageW, SendNotifyMessageW,
};
use windows::core::PCWSTR;

/// Posts broadcasts to every top-level window under a registered message id.
#[derive(Debug, Clone, Copy)]
pub struct WindowBroadcaster {
    message_id: u32,
}

impl WindowBroadcaster {
    /// Register the default `IRSDK_BROADCASTMSG` message.
    pub fn new() -> Result<Self> {
        Self::from_config(&ClientConfig::default())
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::register(&config.broadcast_message_name)
    }

    pub fn register(message_name: &str) -> Result<Self> {
        let wide = wide_string(message_name);
        let message_id = unsafe { RegisterWindowMessageW(PCWSTR::from_raw(wide.as_ptr())) };
        if message_id == 0 {
            return Err(TelemetryError::Broadcast {
                reason: format!(
                    "RegisterWindowMessageW({message_name}) failed: {}",
                    windows::core::Error::from_thread()
                ),
            });
        }
        debug!(message_name, message_id, "Registered broadcast message");
        Ok(Self { message_id })
    }

    pub fn message_id(&self) -> u32 {
        self.message_id
    }
}

impl BroadcastSink for WindowBroadcaster {
    fn send(&self, message: &BroadcastMessage) -> Result<()> {
        trace!(msg = ?message.msg, var1 = message.var1, var2 = message.var2, "Sending broadcast");
        unsafe {
            SendNotifyMessageW(
                HWND_BROADCAST,
                self.message_id,
                WPARAM(message.wparam()),
                LPARAM(message.lparam()),
            )
        }
        .map_err(|e| TelemetryError::windows_api_error("SendNotifyMessageW", e))
    }
}

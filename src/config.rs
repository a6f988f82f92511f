//! Client configuration
//!
//! Every field has a default, so an empty document (or no file at all) yields
//! a working configuration for a stock iRacing install.
//!
//! ```rust
//! use ira_telemetry::ClientConfig;
//!
//! let config = ClientConfig::from_yaml_str("frame_timeout_ms: 33\n").unwrap();
//! assert_eq!(config.frame_timeout_ms, 33);
//! assert_eq!(config.required_channels, ["Speed", "RPM", "Gear"]);
//! ```

use crate::{Result, TelemetryError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Well-known name of the telemetry memory mapping.
pub const DEFAULT_MAPPING_NAME: &str = "Local\\IRSDKMemMapFileName";
/// Well-known name of the "new data" event.
pub const DEFAULT_EVENT_NAME: &str = "Local\\IRSDKDataValidEvent";
/// Registered window message used for remote control broadcasts.
pub const DEFAULT_BROADCAST_MESSAGE_NAME: &str = "IRSDK_BROADCASTMSG";

/// Configuration for a [`TelemetryClient`](crate::TelemetryClient).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Name of the shared memory mapping published by the simulator
    #[serde(default = "default_mapping_name")]
    pub mapping_name: String,
    /// Name of the event signalled after each buffer write
    #[serde(default = "default_event_name")]
    pub event_name: String,
    /// Registered message name for outbound broadcasts
    #[serde(default = "default_broadcast_message_name")]
    pub broadcast_message_name: String,
    /// Upper bound for a single frame wait
    #[serde(default = "default_frame_timeout_ms")]
    pub frame_timeout_ms: u64,
    /// How long to wait for the connected bit once the mapping is open
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Delay between attempts to open the mapping
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    /// Time without a valid frame after which the producer is treated as gone
    #[serde(default = "default_liveness_window_ms")]
    pub liveness_window_ms: u64,
    /// Channels that must resolve before a session is considered live
    #[serde(default = "default_required_channels")]
    pub required_channels: Vec<String>,
    /// Channels resolved when present
    #[serde(default = "default_optional_channels")]
    pub optional_channels: Vec<String>,
}

fn default_mapping_name() -> String {
    DEFAULT_MAPPING_NAME.to_string()
}
fn default_event_name() -> String {
    DEFAULT_EVENT_NAME.to_string()
}
fn default_broadcast_message_name() -> String {
    DEFAULT_BROADCAST_MESSAGE_NAME.to_string()
}
fn default_frame_timeout_ms() -> u64 {
    16
}
fn default_connect_timeout_ms() -> u64 {
    1000
}
fn default_reconnect_interval_ms() -> u64 {
    1000
}
fn default_liveness_window_ms() -> u64 {
    30_000
}
fn default_required_channels() -> Vec<String> {
    ["Speed", "RPM", "Gear"].into_iter().map(String::from).collect()
}
fn default_optional_channels() -> Vec<String> {
    [
        "Throttle",
        "Brake",
        "Clutch",
        "Lap",
        "LapDistPct",
        "SessionTime",
        "FuelLevel",
        "IsOnTrack",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            mapping_name: default_mapping_name(),
            event_name: default_event_name(),
            broadcast_message_name: default_broadcast_message_name(),
            frame_timeout_ms: default_frame_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            liveness_window_ms: default_liveness_window_ms(),
            required_channels: default_required_channels(),
            optional_channels: default_optional_channels(),
        }
    }
}

impl ClientConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self =
            if yaml.trim().is_empty() { Self::default() } else { serde_yaml_ng::from_str(yaml)? };
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| TelemetryError::file_error(path.to_path_buf(), e))?;
        debug!(path = %path.display(), bytes = content.len(), "Loaded client configuration");
        Self::from_yaml_str(&content)
    }

    /// Check timeouts and channel lists for consistency.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("frame_timeout_ms", self.frame_timeout_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("reconnect_interval_ms", self.reconnect_interval_ms),
            ("liveness_window_ms", self.liveness_window_ms),
        ] {
            if value == 0 {
                return Err(TelemetryError::config_error(format!("{name} must be positive")));
            }
        }

        if self.liveness_window_ms < self.frame_timeout_ms {
            return Err(TelemetryError::config_error(
                "liveness_window_ms must not be shorter than frame_timeout_ms",
            ));
        }

        if self.mapping_name.is_empty() || self.event_name.is_empty() {
            return Err(TelemetryError::config_error("region object names must not be empty"));
        }

        if self.required_channels.is_empty() {
            return Err(TelemetryError::config_error("at least one required channel is needed"));
        }

        let mut seen = HashSet::new();
        for name in self.required_channels.iter().chain(&self.optional_channels) {
            if name.is_empty() {
                return Err(TelemetryError::config_error("channel names must not be empty"));
            }
            if !seen.insert(name.as_str()) {
                return Err(TelemetryError::config_error(format!(
                    "channel '{name}' is listed more than once"
                )));
            }
        }

        Ok(())
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn liveness_window(&self) -> Duration {
        Duration::from_millis(self.liveness_window_ms)
    }
}

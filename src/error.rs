//! Error types for telemetry acquisition.
//!
//! Most of the conditions the acquisition loop meets are not errors at all: a
//! missing simulator is the normal waiting condition, a torn buffer copy is
//! retried, and a missing metadata path yields a default value. The
//! [`TelemetryError`] type covers what is left: resource failures at the OS
//! boundary, malformed layouts, configuration problems and unresolved
//! required channels.
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use ira_telemetry::TelemetryError;
//!
//! let error = TelemetryError::connection_failed("iRacing not running");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

#[cfg(windows)]
use windows_core as core;

/// Result type alias for telemetry operations.
pub type Result<T, E = TelemetryError> = std::result::Result<T, E>;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for telemetry operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TelemetryError {
    #[error("Telemetry connection failed: {reason}")]
    Connection {
        reason: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("Cannot read {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Header version {found} does not match supported version {expected}")]
    Version { expected: u32, found: u32 },

    #[error("Read outside the shared region at offset {offset:#x}")]
    Memory {
        offset: usize,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("Malformed {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Required telemetry channels not available: {}", names.join(", "))]
    MissingChannels { names: Vec<String> },

    #[error("Variable decode failed: {details}")]
    TypeConversion { details: String },

    #[error("{feature} is only available on {required_platform}")]
    UnsupportedPlatform { feature: String, required_platform: String },

    #[error("Invalid configuration: {reason}")]
    Config {
        reason: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("Broadcast failed: {reason}")]
    Broadcast { reason: String },

    #[error("Windows API error: {operation}")]
    #[cfg(windows)]
    WindowsApi {
        operation: String,
        #[source]
        source: core::Error,
    },
}

impl TelemetryError {
    /// Whether waiting and trying again can succeed.
    ///
    /// Layout, configuration and platform problems stay the same no matter
    /// how often they are retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            TelemetryError::Connection { .. }
            | TelemetryError::Memory { .. }
            | TelemetryError::MissingChannels { .. }
            | TelemetryError::Broadcast { .. } => true,
            #[cfg(windows)]
            TelemetryError::WindowsApi { .. } => true,
            _ => false,
        }
    }

    /// Things an operator can check, most likely first.
    pub fn recovery_suggestions(&self) -> &'static [&'static str] {
        match self {
            TelemetryError::Connection { .. } => &[
                "Start iRacing and load into a session",
                "Run this process as the same user as iRacing",
            ],
            TelemetryError::File { .. } => &["Check the path exists and is readable"],
            TelemetryError::Version { .. } => &[
                "Update iRacing",
                "Update ira-telemetry to a release that supports this header version",
            ],
            TelemetryError::Memory { .. } => &[
                "Wait for the simulator to finish loading",
                "Reattach to the shared memory region",
            ],
            TelemetryError::Parse { .. } => &[
                "Restart iRacing to republish the shared region",
                "Report the header contents if the problem persists",
            ],
            TelemetryError::MissingChannels { .. } => &[
                "Wait for iRacing to finish loading the session",
                "Move rarely published channels to the optional list",
            ],
            TelemetryError::TypeConversion { .. } => &[
                "Read the variable with the type its descriptor declares",
            ],
            TelemetryError::UnsupportedPlatform { .. } => &[
                "Run on Windows alongside the simulator",
                "Use the in-memory region for cross-platform testing",
            ],
            TelemetryError::Config { .. } => &[
                "Check the configuration file syntax",
                "Remove the offending key to fall back to the default",
            ],
            TelemetryError::Broadcast { .. } => &[
                "Ensure iRacing is running",
                "Check the broadcast message parameters",
            ],
            #[cfg(windows)]
            TelemetryError::WindowsApi { .. } => &[
                "Check the object names in the configuration",
                "Check that the process may open iRacing's named objects",
            ],
        }
    }

    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        TelemetryError::File { path, source }
    }

    pub fn connection_failed(reason: impl Into<String>) -> Self {
        TelemetryError::Connection { reason: reason.into(), source: None }
    }

    pub fn connection_failed_with_source(reason: impl Into<String>, source: BoxedSource) -> Self {
        TelemetryError::Connection { reason: reason.into(), source: Some(source) }
    }

    /// A read that would leave the mapped view.
    pub fn memory_access_error(offset: usize) -> Self {
        TelemetryError::Memory { offset, source: None }
    }

    pub fn parse_error(context: impl Into<String>, details: impl Into<String>) -> Self {
        TelemetryError::Parse { context: context.into(), details: details.into() }
    }

    pub fn config_error(reason: impl Into<String>) -> Self {
        TelemetryError::Config { reason: reason.into(), source: None }
    }

    #[cfg(windows)]
    pub fn windows_api_error(operation: impl Into<String>, source: core::Error) -> Self {
        TelemetryError::WindowsApi { operation: operation.into(), source }
    }

    pub fn unsupported_platform(
        feature: impl Into<String>,
        required_platform: impl Into<String>,
    ) -> Self {
        TelemetryError::UnsupportedPlatform {
            feature: feature.into(),
            required_platform: required_platform.into(),
        }
    }
}

impl From<std::io::Error> for TelemetryError {
    fn from(err: std::io::Error) -> Self {
        TelemetryError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}

impl From<serde_yaml_ng::Error> for TelemetryError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        TelemetryError::Config { reason: err.to_string(), source: Some(Box::new(err)) }
    }
}

#[cfg(windows)]
impl From<core::Error> for TelemetryError {
    fn from(err: core::Error) -> Self {
        TelemetryError::WindowsApi { operation: "Windows call".to_string(), source: err }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::error::Error as _;

    proptest! {
        #[test]
        fn messages_carry_their_context(
            reason in ".*",
            offset in 0usize..0x10000usize,
            found in 0u32..10u32,
        ) {
            prop_assert!(TelemetryError::connection_failed(reason.clone()).to_string().contains(&reason));
            prop_assert!(TelemetryError::config_error(reason.clone()).to_string().contains(&reason));

            let memory = TelemetryError::memory_access_error(offset).to_string();
            let hex = format!("{offset:#x}");
            prop_assert!(memory.contains(&hex));

            let version = TelemetryError::Version { expected: 2, found }.to_string();
            prop_assert!(version.contains(&found.to_string()));
        }

        #[test]
        fn missing_channel_message_lists_every_name(
            names in prop::collection::vec("[A-Z][A-Za-z]{1,12}", 1..6)
        ) {
            let message = TelemetryError::MissingChannels { names: names.clone() }.to_string();
            for name in &names {
                prop_assert!(message.contains(name.as_str()));
            }
        }
    }

    #[test]
    fn io_errors_keep_their_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let converted: TelemetryError = io_err.into();
        assert!(matches!(converted, TelemetryError::File { .. }));
        assert_eq!(converted.source().unwrap().to_string(), "gone");

        let with_path = TelemetryError::file_error(
            PathBuf::from("/etc/ira.yaml"),
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(with_path.to_string(), "Cannot read /etc/ira.yaml");
    }

    #[test]
    fn parse_errors_name_the_structure() {
        let err = TelemetryError::parse_error("header", "num_buf 9");
        assert_eq!(err.to_string(), "Malformed header: num_buf 9");
    }

    #[test]
    fn errors_are_send_sync_static() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<TelemetryError>();
    }

    #[test]
    fn retry_classification() {
        let retryable = [
            TelemetryError::connection_failed("not running"),
            TelemetryError::MissingChannels { names: vec!["Gear".to_string()] },
            TelemetryError::memory_access_error(0x70),
            TelemetryError::Broadcast { reason: "no window".to_string() },
        ];
        let permanent = [
            TelemetryError::Version { expected: 2, found: 1 },
            TelemetryError::config_error("bad"),
            TelemetryError::parse_error("descriptor", "type 9"),
            TelemetryError::unsupported_platform("Live telemetry", "Windows"),
        ];

        for error in retryable.iter() {
            assert!(error.is_retryable(), "{error}");
        }
        for error in permanent.iter() {
            assert!(!error.is_retryable(), "{error}");
        }
        for error in retryable.iter().chain(permanent.iter()) {
            assert!(!error.recovery_suggestions().is_empty(), "{error}");
        }
    }

    #[test]
    fn yaml_errors_become_config_errors() {
        let yaml_err = serde_yaml_ng::from_str::<u32>("not: [a number").unwrap_err();
        let converted: TelemetryError = yaml_err.into();
        assert!(matches!(converted, TelemetryError::Config { source: Some(_), .. }));
    }
}

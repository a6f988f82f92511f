//! Tear-safe acquisition of iRacing shared-memory telemetry.
//!
//! The simulator publishes telemetry into a named shared memory region: a
//! fixed header, a table of variable descriptors, a YAML-like session
//! metadata block and a small ring of data buffers rewritten at the tick
//! rate. This crate attaches to that region, copies the freshest buffer
//! without ever blocking the producer, resolves variables by name, answers
//! path queries against the metadata, and survives the simulator starting,
//! stopping and restarting underneath it.
//!
//! # Layers
//!
//! - [`region`]: the [`SharedRegion`] seam, with an in-memory producer for
//!   tests and a Windows mapping behind `cfg(windows)`
//! - [`reader`]: the optimistic double-read frame reader
//! - [`schema`] and [`channels`]: header, descriptor table and channel resolution
//! - [`session`]: metadata path queries, identity extraction and change tracking
//! - [`state`]: the pure connection state machine
//! - [`client`]: the acquisition loop tying the above together
//! - [`connection`]: an async [`LiveConnection`] over the loop
//! - [`broadcast`]: outbound remote-control messages
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use ira_telemetry::LiveConnection;
//!
//! #[tokio::main]
//! async fn main() -> ira_telemetry::Result<()> {
//!     let connection = LiveConnection::connect().await?;
//!     let mut frames = Box::pin(connection.frames());
//!
//!     while let Some(frame) = frames.next().await {
//!         println!("tick {} speed {:?}", frame.tick, frame.sample.speed);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Without an async runtime
//!
//! ```rust
//! use ira_telemetry::{ClientConfig, ConnectionState, MemoryProducer, TelemetryClient};
//! use ira_telemetry::types::VariableType;
//!
//! let producer = MemoryProducer::builder()
//!     .variable("Speed", VariableType::Float32, 1)
//!     .build();
//! producer.set_connected(true);
//!
//! let config = ClientConfig {
//!     required_channels: vec!["Speed".into()],
//!     optional_channels: vec![],
//!     frame_timeout_ms: 5,
//!     ..ClientConfig::default()
//! };
//! let mut client = TelemetryClient::new(producer.region(), config).unwrap();
//! assert!(matches!(client.step(&mut ()), ConnectionState::Connected { .. }));
//! ```

pub mod broadcast;
pub mod channels;
pub mod client;
pub mod config;
pub mod connection;
mod error;
pub mod reader;
pub mod region;
pub mod schema;
pub mod session;
pub mod state;
pub mod types;

#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;

// Platform-specific modules
#[cfg(windows)]
pub mod windows;

// Core exports
pub use error::*;

pub use broadcast::{BroadcastMessage, BroadcastMsg, BroadcastSink};
pub use channels::{Channel, ChannelTable, TelemetrySample};
pub use client::{FrameContext, ShutdownSignal, TelemetryClient, TelemetryObserver};
pub use config::ClientConfig;
pub use connection::LiveConnection;
pub use reader::{FrameReader, PollOutcome, ReaderStats, read_snapshot};
pub use region::{MemoryProducer, MemoryRegion, SharedRegion, WaitResult};
pub use schema::{SharedHeader, VariableDirectory};
pub use session::{SessionIdentity, SessionMetadata, SessionTracker};
pub use state::{ConnectionEvent, ConnectionState, LivenessTimer, StateChange, transition};
pub use types::{FramePacket, FrameSnapshot, VarBinding, VariableInfo, VariableType};

#[cfg(windows)]
pub use windows::{WindowBroadcaster, WindowsRegion};

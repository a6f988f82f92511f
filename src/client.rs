//! The acquisition loop
//!
//! [`TelemetryClient`] owns one region handle and everything derived from it:
//! the frame reader, the variable directory, the resolved channels and the
//! session metadata cache. Each [`step`](TelemetryClient::step) performs at
//! most one bounded wait, turns what it saw into a
//! [`ConnectionEvent`], and feeds that through [`transition`].
//!
//! Consumers plug in through [`TelemetryObserver`]. They are told about
//! phase changes, every frame delivered while in session, and every new
//! version of the session metadata.

use crate::channels::{ChannelTable, TelemetrySample};
use crate::config::ClientConfig;
use crate::reader::{FrameReader, PollOutcome, ReaderStats};
use crate::region::SharedRegion;
use crate::schema::VariableDirectory;
use crate::session::{SessionMetadata, SessionTracker};
use crate::state::{ConnectionEvent, ConnectionState, LivenessTimer, StateChange, transition};
use crate::types::FrameSnapshot;
use crate::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// A cooperative stop flag checked between steps.
pub trait ShutdownSignal {
    fn is_shutdown(&self) -> bool;
}

impl ShutdownSignal for AtomicBool {
    fn is_shutdown(&self) -> bool {
        self.load(Ordering::Acquire)
    }
}

impl ShutdownSignal for CancellationToken {
    fn is_shutdown(&self) -> bool {
        self.is_cancelled()
    }
}

impl<T: ShutdownSignal + ?Sized> ShutdownSignal for Arc<T> {
    fn is_shutdown(&self) -> bool {
        (**self).is_shutdown()
    }
}

/// One delivered frame with everything needed to interpret it.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext<'a> {
    pub snapshot: &'a FrameSnapshot,
    pub directory: &'a VariableDirectory,
    pub channels: &'a ChannelTable,
    /// Session metadata counter current when the frame was delivered
    pub session_update: i32,
}

impl FrameContext<'_> {
    pub fn tick(&self) -> i32 {
        self.snapshot.tick()
    }

    pub fn data(&self) -> &[u8] {
        self.snapshot.data()
    }

    /// The standard channels of this frame.
    pub fn sample(&self) -> TelemetrySample {
        self.channels.sample(self.snapshot.data(), self.snapshot.tick())
    }
}

/// Receives client notifications. Every method defaults to doing nothing.
pub trait TelemetryObserver {
    /// The client moved to a different phase.
    fn on_state_change(&mut self, _change: &StateChange) {}

    /// A frame was accepted while in session.
    fn on_frame(&mut self, _frame: &FrameContext<'_>) {}

    /// A new version of the session metadata was read.
    fn on_session_metadata(&mut self, _metadata: &Arc<SessionMetadata>) {}
}

impl TelemetryObserver for () {}

impl<O: TelemetryObserver + ?Sized> TelemetryObserver for &mut O {
    fn on_state_change(&mut self, change: &StateChange) {
        (**self).on_state_change(change)
    }

    fn on_frame(&mut self, frame: &FrameContext<'_>) {
        (**self).on_frame(frame)
    }

    fn on_session_metadata(&mut self, metadata: &Arc<SessionMetadata>) {
        (**self).on_session_metadata(metadata)
    }
}

/// Drives one region through Waiting, Connected and InSession.
pub struct TelemetryClient<R: SharedRegion> {
    region: R,
    config: ClientConfig,
    state: ConnectionState,
    reader: FrameReader,
    snapshot: FrameSnapshot,
    directory: Option<VariableDirectory>,
    channels: Option<ChannelTable>,
    session: SessionTracker,
    liveness: LivenessTimer,
    missing_reported: bool,
}

impl<R: SharedRegion> TelemetryClient<R> {
    /// Create a client in the `Waiting` state. The configuration is validated here.
    pub fn new(region: R, config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let liveness = LivenessTimer::new(config.liveness_window());
        Ok(Self {
            region,
            config,
            state: ConnectionState::Waiting,
            reader: FrameReader::new(),
            snapshot: FrameSnapshot::new(),
            directory: None,
            channels: None,
            session: SessionTracker::new(),
            liveness,
            missing_reported: false,
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn region(&self) -> &R {
        &self.region
    }

    pub fn directory(&self) -> Option<&VariableDirectory> {
        self.directory.as_ref()
    }

    pub fn channels(&self) -> Option<&ChannelTable> {
        self.channels.as_ref()
    }

    /// The last accepted frame. Empty while waiting.
    pub fn snapshot(&self) -> &FrameSnapshot {
        &self.snapshot
    }

    pub fn session(&self) -> Option<&Arc<SessionMetadata>> {
        self.session.current()
    }

    pub fn reader_stats(&self) -> ReaderStats {
        self.reader.stats()
    }

    /// Run steps until `shutdown` is raised, then detach.
    pub fn run(&mut self, observer: &mut impl TelemetryObserver, shutdown: &impl ShutdownSignal) {
        info!(
            mapping = %self.config.mapping_name,
            required = ?self.config.required_channels,
            "Telemetry client started"
        );
        while !shutdown.is_shutdown() {
            self.step(observer);
        }
        self.shutdown(observer);
        info!(stats = ?self.reader.stats(), "Telemetry client stopped");
    }

    /// Perform one bounded unit of work and return the resulting state.
    pub fn step(&mut self, observer: &mut impl TelemetryObserver) -> ConnectionState {
        match self.state {
            ConnectionState::Waiting => self.step_waiting(observer),
            ConnectionState::Connected { .. } | ConnectionState::InSession => {
                self.step_attached(observer)
            }
        }
        self.state
    }

    /// Return to `Waiting` and release the region.
    pub fn shutdown(&mut self, observer: &mut impl TelemetryObserver) {
        if self.state.is_waiting() {
            self.region.close();
        } else {
            self.apply(ConnectionEvent::ClientShutdown, observer);
        }
    }

    fn step_waiting(&mut self, observer: &mut impl TelemetryObserver) {
        if !self.region.is_ready() && !self.region.open() {
            trace!("Producer region not available");
            std::thread::sleep(self.config.reconnect_interval());
            return;
        }

        let header = match self.region.header() {
            Ok(header) => header,
            Err(err) => {
                warn!(%err, "Failed to read shared header");
                self.region.close();
                std::thread::sleep(self.config.reconnect_interval());
                return;
            }
        };

        if header.is_connected() {
            // Variables resolve by name, so a version mismatch does not stop the attach.
            if let Err(err) = header.check_version() {
                debug!(%err, "Attaching despite header version mismatch");
            }
            self.liveness.touch(Instant::now());
            self.apply(ConnectionEvent::ProducerAvailable, observer);
            return;
        }

        trace!("Region open, producer not connected");
        if let Err(err) = self.region.wait_for_signal(self.config.connect_timeout()) {
            warn!(%err, "Signal wait failed while waiting for producer");
            std::thread::sleep(self.config.connect_timeout());
        }
    }

    fn step_attached(&mut self, observer: &mut impl TelemetryObserver) {
        let outcome = match self.reader.wait(
            &self.region,
            self.config.frame_timeout(),
            Some(&mut self.snapshot),
        ) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(%err, "Frame read failed");
                PollOutcome::Unavailable
            }
        };
        let now = Instant::now();

        match outcome {
            PollOutcome::NewFrame { .. } => {
                self.liveness.touch(now);
                self.apply(ConnectionEvent::FrameReceived, observer);
                if matches!(self.state, ConnectionState::Connected { .. }) {
                    self.resolve_channels(observer);
                }
                if self.state.is_in_session() {
                    self.deliver_frame(observer);
                }
            }
            PollOutcome::Disconnected => self.apply(ConnectionEvent::ProducerDisconnected, observer),
            PollOutcome::Restarted { previous, current } => {
                info!(previous, current, "Producer restarted");
                self.apply(ConnectionEvent::ProducerRestarted, observer);
            }
            PollOutcome::Unavailable => self.apply(ConnectionEvent::RegionLost, observer),
            PollOutcome::Synchronized { .. } | PollOutcome::Unchanged | PollOutcome::Torn { .. } => {
                if self.liveness.expired_at(now) {
                    warn!(window = ?self.liveness.window(), "No valid frame within liveness window");
                    self.apply(ConnectionEvent::LivenessExpired, observer);
                }
            }
        }
    }

    fn load_channels(&self) -> Result<(VariableDirectory, ChannelTable)> {
        let header = self.region.header()?;
        header.validate()?;
        let directory = VariableDirectory::load(&self.region, &header)?;
        let channels = ChannelTable::resolve(
            &directory,
            self.config.required_channels.as_slice(),
            self.config.optional_channels.as_slice(),
        )?;
        Ok((directory, channels))
    }

    fn resolve_channels(&mut self, observer: &mut impl TelemetryObserver) {
        match self.load_channels() {
            Ok((directory, channels)) => {
                info!(
                    variables = directory.len(),
                    resolved = channels.resolved_count(),
                    buf_len = directory.buffer_len(),
                    "Channels resolved"
                );
                self.directory = Some(directory);
                self.channels = Some(channels);
                self.missing_reported = false;
                self.apply(ConnectionEvent::OffsetsResolved, observer);
            }
            Err(err) => {
                if self.missing_reported {
                    debug!(%err, "Channels still unresolved");
                } else {
                    warn!(%err, "Channels unresolved, will retry");
                    self.missing_reported = true;
                }
                self.apply(ConnectionEvent::OffsetsMissing, observer);
            }
        }
    }

    fn deliver_frame(&mut self, observer: &mut impl TelemetryObserver) {
        match self.region.header() {
            Ok(header) => match self.session.refresh(&self.region, &header) {
                Ok(Some(metadata)) => observer.on_session_metadata(&metadata),
                Ok(None) => {}
                Err(err) => warn!(%err, "Failed to read session metadata"),
            },
            Err(err) => warn!(%err, "Failed to read shared header"),
        }

        let (Some(directory), Some(channels)) = (&self.directory, &self.channels) else {
            return;
        };
        let frame = FrameContext {
            snapshot: &self.snapshot,
            directory,
            channels,
            session_update: self.session.last_update().unwrap_or(0),
        };
        observer.on_frame(&frame);
    }

    fn apply(&mut self, event: ConnectionEvent, observer: &mut impl TelemetryObserver) {
        let from = self.state;
        let to = transition(from, event);
        self.state = to;

        if to.is_waiting() && !from.is_waiting() {
            self.enter_waiting(event);
        }

        if !from.same_phase(&to) {
            info!(%from, %to, ?event, "Connection state changed");
            observer.on_state_change(&StateChange { from, to, event });
        }
    }

    fn enter_waiting(&mut self, event: ConnectionEvent) {
        self.directory = None;
        self.channels = None;
        self.reader.reset();
        self.session.reset();
        self.snapshot.clear();
        self.liveness.stop();
        self.missing_reported = false;

        if event != ConnectionEvent::ProducerDisconnected {
            self.region.close();
        }
    }
}

impl<R: SharedRegion> std::fmt::Debug for TelemetryClient<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryClient")
            .field("state", &self.state)
            .field("ready", &self.region.is_ready())
            .field("last_tick", &self.reader.last_tick())
            .field("variables", &self.directory.as_ref().map(VariableDirectory::len))
            .finish()
    }
}

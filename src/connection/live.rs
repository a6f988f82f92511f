//! Live telemetry connection
//!
//! A [`LiveConnection`] runs a [`TelemetryClient`] on tokio's blocking pool
//! and republishes what it observes through watch channels. Watch channels
//! keep only the latest value, so a slow consumer of [`frames`] skips frames
//! rather than queueing them.
//!
//! [`frames`]: LiveConnection::frames

use crate::client::{FrameContext, TelemetryClient, TelemetryObserver};
use crate::config::ClientConfig;
use crate::region::SharedRegion;
use crate::session::SessionMetadata;
use crate::state::{ConnectionState, StateChange};
use crate::types::FramePacket;
use crate::{Result, TelemetryError};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Observer that forwards client notifications into watch channels.
struct WatchPublisher {
    state: watch::Sender<ConnectionState>,
    changes: watch::Sender<Option<StateChange>>,
    frames: watch::Sender<Option<Arc<FramePacket>>>,
    sessions: watch::Sender<Option<Arc<SessionMetadata>>>,
}

impl TelemetryObserver for WatchPublisher {
    fn on_state_change(&mut self, change: &StateChange) {
        self.state.send_replace(change.to);
        self.changes.send_replace(Some(*change));
    }

    fn on_frame(&mut self, frame: &FrameContext<'_>) {
        let packet = FramePacket::new(frame.snapshot, frame.session_update, frame.sample());
        self.frames.send_replace(Some(Arc::new(packet)));
    }

    fn on_session_metadata(&mut self, metadata: &Arc<SessionMetadata>) {
        self.sessions.send_replace(Some(Arc::clone(metadata)));
    }
}

/// Background acquisition with async accessors.
pub struct LiveConnection {
    state: watch::Receiver<ConnectionState>,
    changes: watch::Receiver<Option<StateChange>>,
    frames: watch::Receiver<Option<Arc<FramePacket>>>,
    sessions: watch::Receiver<Option<Arc<SessionMetadata>>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl LiveConnection {
    /// Connect to the simulator using the default configuration.
    ///
    /// Returns immediately; the connection waits in the background for the
    /// simulator to start a session.
    pub async fn connect() -> Result<Self> {
        Self::connect_with(ClientConfig::default()).await
    }

    /// Connect to the simulator's shared memory named in `config`.
    #[cfg(windows)]
    pub async fn connect_with(config: ClientConfig) -> Result<Self> {
        info!(mapping = %config.mapping_name, "Connecting to iRacing live telemetry");
        let region = crate::windows::WindowsRegion::from_config(&config);
        Self::spawn(region, config)
    }

    /// Live telemetry needs the simulator's Windows shared memory.
    ///
    /// Use [`LiveConnection::spawn`] with a
    /// [`MemoryRegion`](crate::region::MemoryRegion) elsewhere.
    #[cfg(not(windows))]
    pub async fn connect_with(_config: ClientConfig) -> Result<Self> {
        Err(TelemetryError::unsupported_platform("Live telemetry", "Windows"))
    }

    /// Run a client over `region` on the blocking pool.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<R>(region: R, config: ClientConfig) -> Result<Self>
    where
        R: SharedRegion + 'static,
    {
        let mut client = TelemetryClient::new(region, config)?;

        let (state_tx, state) = watch::channel(client.state());
        let (changes_tx, changes) = watch::channel(None);
        let (frames_tx, frames) = watch::channel(None);
        let (sessions_tx, sessions) = watch::channel(None);
        let mut publisher = WatchPublisher {
            state: state_tx,
            changes: changes_tx,
            frames: frames_tx,
            sessions: sessions_tx,
        };

        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        let task = tokio::task::spawn_blocking(move || {
            client.run(&mut publisher, &shutdown);
        });

        debug!("Live connection task spawned");
        Ok(Self { state, changes, frames, sessions, cancel, task: Some(task) })
    }

    /// The client's phase as last published.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Most recent session metadata, if any has been read.
    pub fn current_session(&self) -> Option<Arc<SessionMetadata>> {
        self.sessions.borrow().clone()
    }

    /// Most recent frame, if any has been delivered.
    pub fn latest_frame(&self) -> Option<Arc<FramePacket>> {
        self.frames.borrow().clone()
    }

    /// Wait until the published state satisfies `predicate`.
    pub async fn wait_for_state(
        &self,
        mut predicate: impl FnMut(&ConnectionState) -> bool,
    ) -> Result<ConnectionState> {
        let mut state = self.state.clone();
        let current = state
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| TelemetryError::connection_failed("telemetry client stopped"))?;
        Ok(*current)
    }

    /// Frames delivered while in session, latest value first.
    ///
    /// Ends when the client stops.
    pub fn frames(&self) -> impl Stream<Item = Arc<FramePacket>> + 'static {
        WatchStream::new(self.frames.clone()).filter_map(|opt| async move { opt })
    }

    /// Phase transitions from now on.
    pub fn state_changes(&self) -> impl Stream<Item = StateChange> + 'static {
        let mut changes = self.changes.clone();
        changes.mark_unchanged();
        WatchStream::from_changes(changes).filter_map(|opt| async move { opt })
    }

    /// The current session metadata (if any), then every new version.
    pub fn session_updates(&self) -> impl Stream<Item = Arc<SessionMetadata>> + 'static {
        WatchStream::new(self.sessions.clone()).filter_map(|opt| async move { opt })
    }

    /// Stop the client and wait for it to release the region.
    pub async fn shutdown(mut self) -> Result<()> {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.await.map_err(|e| {
                TelemetryError::connection_failed_with_source("telemetry client task failed", Box::new(e))
            })?;
        }
        info!("Live connection shut down");
        Ok(())
    }
}

impl Drop for LiveConnection {
    fn drop(&mut self) {
        debug!("Dropping live connection");
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for LiveConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveConnection")
            .field("state", &self.state())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

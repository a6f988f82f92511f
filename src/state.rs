//! Connection state machine
//!
//! [`transition`] is a pure function of the current state and one event.
//! The client turns region, reader and directory results into
//! [`ConnectionEvent`]s and feeds them through it, so the rules below can be
//! tested without any shared memory at all.
//!
//! ```text
//! Waiting --ProducerAvailable--> Connected{frame_seen: false}
//! Connected --FrameReceived--> Connected{frame_seen: true}
//! Connected{frame_seen: true} --OffsetsResolved--> InSession
//! Connected/InSession --any loss event--> Waiting
//! ```

use serde::Serialize;
use std::time::{Duration, Instant};

/// Where the client is in its attach cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ConnectionState {
    /// No usable producer.
    #[default]
    Waiting,
    /// Region open and producer connected; channels not resolved yet.
    Connected { frame_seen: bool },
    /// Required channels resolved; frames are being delivered.
    InSession,
}

impl ConnectionState {
    pub fn is_waiting(&self) -> bool {
        matches!(self, ConnectionState::Waiting)
    }

    pub fn is_in_session(&self) -> bool {
        matches!(self, ConnectionState::InSession)
    }

    /// Same variant, ignoring `frame_seen`.
    pub fn same_phase(&self, other: &ConnectionState) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConnectionState::Waiting => "waiting",
            ConnectionState::Connected { .. } => "connected",
            ConnectionState::InSession => "in_session",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Something the client observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionEvent {
    /// The region opened and the producer's connected bit is set.
    ProducerAvailable,
    /// The reader accepted a frame.
    FrameReceived,
    /// Every required channel resolved.
    OffsetsResolved,
    /// At least one required channel is missing; keep trying.
    OffsetsMissing,
    /// The connected bit went clear.
    ProducerDisconnected,
    /// The tick count went backwards.
    ProducerRestarted,
    /// The region handle stopped being usable.
    RegionLost,
    /// No valid frame within the liveness window.
    LivenessExpired,
    /// The client loop is stopping.
    ClientShutdown,
}

impl ConnectionEvent {
    /// Events that always return the machine to [`ConnectionState::Waiting`].
    pub fn is_loss(&self) -> bool {
        matches!(
            self,
            ConnectionEvent::ProducerDisconnected
                | ConnectionEvent::ProducerRestarted
                | ConnectionEvent::RegionLost
                | ConnectionEvent::LivenessExpired
                | ConnectionEvent::ClientShutdown
        )
    }
}

/// Apply one event.
pub fn transition(state: ConnectionState, event: ConnectionEvent) -> ConnectionState {
    use ConnectionEvent as E;
    use ConnectionState as S;

    if event.is_loss() {
        return S::Waiting;
    }

    match (state, event) {
        (S::Waiting, E::ProducerAvailable) => S::Connected { frame_seen: false },
        (S::Connected { .. }, E::FrameReceived) => S::Connected { frame_seen: true },
        (S::Connected { frame_seen: true }, E::OffsetsResolved) => S::InSession,
        (state, _) => state,
    }
}

/// A transition that changed the phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateChange {
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub event: ConnectionEvent,
}

/// Staleness timer independent of tick counts.
#[derive(Debug, Clone, Copy)]
pub struct LivenessTimer {
    window: Duration,
    last_valid: Option<Instant>,
}

impl LivenessTimer {
    pub fn new(window: Duration) -> Self {
        Self { window, last_valid: None }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Start or restart the window at `now`.
    pub fn touch(&mut self, now: Instant) {
        self.last_valid = Some(now);
    }

    pub fn stop(&mut self) {
        self.last_valid = None;
    }

    pub fn is_running(&self) -> bool {
        self.last_valid.is_some()
    }

    /// Whether more than the window has passed since the last touch. A
    /// stopped timer never expires.
    pub fn expired_at(&self, now: Instant) -> bool {
        self.last_valid
            .is_some_and(|last| now.saturating_duration_since(last) > self.window)
    }
}

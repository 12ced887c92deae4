//! Configuration, phases, and command/event enums for the session peers.

use crate::media::RemoteStream;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Where to find the relay hub. The endpoint is handed to peers out of
/// band; deployment decides what goes here.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket endpoint of the relay hub.
    pub signal_url: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            signal_url: "ws://127.0.0.1:3001".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

/// Sharer-side session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPhase {
    Idle,
    /// Consent requested, waiting for the host's accept/reject.
    Requesting,
    /// Host said yes; capture and transport are being stood up.
    Accepted,
    /// Host said no. Display state; a new request clears it.
    Rejected,
    Negotiating,
    Active,
}

/// Viewer-side session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPhase {
    Idle,
    /// A client asked to share; waiting for the local accept/reject.
    Notified,
    Negotiating,
    Active,
}

// ---------------------------------------------------------------------------
// Commands & Events
// ---------------------------------------------------------------------------

/// User actions on the sharer side.
#[derive(Debug)]
pub enum ClientCommand {
    RequestShare,
    StopShare,
}

/// User actions on the viewer side.
#[derive(Debug)]
pub enum HostCommand {
    Accept,
    Reject,
    StopViewing,
}

/// Events the sharer-side negotiator emits for the view layer.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    PhaseChanged(ClientPhase),
    /// Non-fatal failure to surface to the user. The session stays where
    /// it is; recovery is a manual stop/restart.
    Error(String),
}

/// Events the viewer-side negotiator emits for the view layer.
#[derive(Debug, Clone)]
pub enum HostEvent {
    PhaseChanged(HostPhase),
    /// Incoming media attached; hand this to the video element.
    RemoteStream(RemoteStream),
    Error(String),
}

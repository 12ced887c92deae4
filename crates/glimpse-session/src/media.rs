//! Capability traits for the embedder-provided media collaborators.
//!
//! The negotiators own these handles exclusively and consume their events
//! over a plain channel, so there is no shared mutable state between a
//! collaborator and its negotiator beyond the handle itself. Nothing in
//! this crate implements actual capture or transport.

use async_trait::async_trait;
use glimpse_common::MediaError;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Screen capture
// ---------------------------------------------------------------------------

/// A live local capture track, attachable to a transport.
#[async_trait]
pub trait LocalTrack: Send + Sync {
    fn id(&self) -> &str;

    /// Release the underlying capture.
    async fn stop(&mut self);
}

/// An in-progress capture: the track plus the channel that fires when the
/// user ends the capture from OS chrome.
pub struct Capture {
    pub track: Box<dyn LocalTrack>,
    pub ended: mpsc::Receiver<()>,
}

/// Begins capturing the local display.
#[async_trait]
pub trait ScreenCapture: Send + Sync {
    async fn begin_capture(&self) -> Result<Capture, MediaError>;
}

// ---------------------------------------------------------------------------
// Media transport
// ---------------------------------------------------------------------------

/// Opaque handle to incoming remote media, handed to the view layer.
#[derive(Debug, Clone)]
pub struct RemoteStream {
    pub id: String,
}

/// Events a media transport emits while a session is up.
#[derive(Debug)]
pub enum MediaEvent {
    /// A locally discovered connectivity candidate to relay to the peer.
    /// Zero to many of these arrive, over an unbounded interval.
    LocalCandidate(serde_json::Value),
    /// The transport wants a fresh offer (sharer side reacts).
    RenegotiationNeeded,
    /// Remote media arrived (viewer side reacts).
    RemoteTrack(RemoteStream),
    /// Media is flowing.
    Connected,
    /// The transport closed underneath us.
    Closed,
}

/// The peer-to-peer media transport capability. Descriptions and
/// candidates are opaque JSON, whatever the two transports agreed on.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    async fn add_track(&mut self, track: &dyn LocalTrack) -> Result<(), MediaError>;
    async fn create_offer(&mut self) -> Result<serde_json::Value, MediaError>;
    async fn create_answer(&mut self) -> Result<serde_json::Value, MediaError>;
    async fn set_remote_description(&mut self, sdp: serde_json::Value) -> Result<(), MediaError>;
    async fn add_candidate(&mut self, candidate: serde_json::Value) -> Result<(), MediaError>;
    async fn close(&mut self);
}

/// Creates a transport and the channel its events arrive on.
#[async_trait]
pub trait MediaTransportFactory: Send + Sync {
    async fn create(
        &self,
    ) -> Result<(Box<dyn MediaTransport>, mpsc::Receiver<MediaEvent>), MediaError>;
}

/// Receive from an optional channel; a missing channel never yields.
pub(crate) async fn recv_opt<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

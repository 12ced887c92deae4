//! Session negotiators for glimpse screen sharing.
//!
//! Each peer runs one negotiator: the client (sharer) asks for consent and
//! produces offers; the host (viewer) accepts or rejects and answers. Both
//! speak `glimpse_common::Envelope` through the relay hub and drive an
//! embedder-provided media transport for everything after consent; the
//! negotiators never touch media themselves.

pub mod client;
pub mod host;
pub mod link;
pub mod media;
pub mod types;

pub use client::ClientSession;
pub use host::HostSession;
pub use link::SignalingLink;
pub use media::{
    Capture, LocalTrack, MediaEvent, MediaTransport, MediaTransportFactory, RemoteStream,
    ScreenCapture,
};
pub use types::{
    ClientCommand, ClientEvent, ClientPhase, HostCommand, HostEvent, HostPhase, SessionConfig,
};

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid envelope: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Failures reported by the embedder-provided media collaborators. None of
/// these roll a session back; they surface as display messages and the
/// state machine stays where it is.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("screen capture failed: {0}")]
    Capture(String),

    #[error("negotiation failed: {0}")]
    Negotiation(String),

    #[error("media transport closed")]
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("signaling link error: {0}")]
    Link(String),

    #[error("signaling link closed")]
    LinkClosed,
}

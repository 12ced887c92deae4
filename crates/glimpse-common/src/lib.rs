pub mod errors;
pub mod id;
pub mod protocol;

pub use errors::{MediaError, ProtocolError, SessionError};
pub use id::ConnId;
pub use protocol::{Envelope, EnvelopeKind, Role};

pub type Result<T> = std::result::Result<T, SessionError>;

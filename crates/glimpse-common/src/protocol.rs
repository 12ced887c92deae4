//! Signaling wire protocol shared by the relay hub and the session peers.
//!
//! One flat JSON object per WebSocket text frame. The hub routes on `type`
//! and `role` only; `sdp` and `candidate` are opaque blobs that must reach
//! the other peer unmodified.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Wire enums
// ---------------------------------------------------------------------------

/// Envelope discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvelopeKind {
    /// Claims a role slot. A bare `{"role": ...}` with no `type` field is
    /// also a valid announcement: binding keys off `role`, not `type`.
    RoleAnnounce,
    /// Client: "I want to share my screen". Hub → host: informational ping.
    Notify,
    /// Opaque negotiation payload (session description or candidate).
    Signal,
    Accept,
    Reject,
    Stop,
    /// Hub → sender reply for unparseable frames.
    Error,
    /// Unrecognized `type` strings. Role binding still applies to these.
    Unknown,
}

impl<'de> Deserialize<'de> for EnvelopeKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let tag = String::deserialize(deserializer)?;
        Ok(match tag.as_str() {
            "role-announce" => Self::RoleAnnounce,
            "notify" => Self::Notify,
            "signal" => Self::Signal,
            "accept" => Self::Accept,
            "reject" => Self::Reject,
            "stop" => Self::Stop,
            "error" => Self::Error,
            // Unrecognized types are ignored downstream, not an error.
            _ => Self::Unknown,
        })
    }
}

/// The two peer roles of a session pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Screen owner, offers to share.
    Client,
    /// Viewer, accepts or rejects.
    Host,
}

impl Role {
    /// The role on the other end of the relay.
    pub fn peer(self) -> Role {
        match self {
            Role::Client => Role::Host,
            Role::Host => Role::Client,
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// One signaling message. Every field is optional on the wire; which ones
/// are present depends on `type` (see the relay's routing table).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<EnvelopeKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Envelope {
    /// A minimal envelope carrying only `type`, the shape the hub relays
    /// for accept/reject/stop.
    pub fn of_kind(kind: EnvelopeKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// An envelope carrying `type` and `role`, the shape peers send for
    /// consent and teardown messages.
    pub fn with_role(kind: EnvelopeKind, role: Role) -> Self {
        Self {
            kind: Some(kind),
            role: Some(role),
            ..Self::default()
        }
    }

    /// Explicit role announcement, sent as the first frame on a link.
    pub fn role_announce(role: Role) -> Self {
        Self::with_role(EnvelopeKind::RoleAnnounce, role)
    }

    /// A `signal` envelope carrying a session description.
    pub fn signal_sdp(role: Role, sdp: serde_json::Value) -> Self {
        Self {
            sdp: Some(sdp),
            ..Self::with_role(EnvelopeKind::Signal, role)
        }
    }

    /// A `signal` envelope carrying a connectivity candidate.
    pub fn signal_candidate(role: Role, candidate: serde_json::Value) -> Self {
        Self {
            candidate: Some(candidate),
            ..Self::with_role(EnvelopeKind::Signal, role)
        }
    }

    /// Informational `notify` with a display message (hub → host).
    pub fn notify_message(text: &str) -> Self {
        Self {
            message: Some(text.to_string()),
            ..Self::of_kind(EnvelopeKind::Notify)
        }
    }

    /// Error reply (hub → sender).
    pub fn error(text: &str) -> Self {
        Self {
            message: Some(text.to_string()),
            ..Self::of_kind(EnvelopeKind::Error)
        }
    }

    /// The `type` field of an attached session description, if any.
    /// Viewers use this to tell offers from answers.
    pub fn sdp_type(&self) -> Option<&str> {
        self.sdp.as_ref()?.get("type")?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_role_announce_parses() {
        let env: Envelope = serde_json::from_str(r#"{"role":"client"}"#).unwrap();
        assert_eq!(env.kind, None);
        assert_eq!(env.role, Some(Role::Client));
    }

    #[test]
    fn explicit_role_announce_round_trips() {
        let json = serde_json::to_string(&Envelope::role_announce(Role::Host)).unwrap();
        assert_eq!(json, r#"{"type":"role-announce","role":"host"}"#);
        let env: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(env.kind, Some(EnvelopeKind::RoleAnnounce));
        assert_eq!(env.role, Some(Role::Host));
    }

    #[test]
    fn unknown_type_still_carries_role() {
        let env: Envelope =
            serde_json::from_str(r#"{"type":"wibble","role":"host"}"#).unwrap();
        assert_eq!(env.kind, Some(EnvelopeKind::Unknown));
        assert_eq!(env.role, Some(Role::Host));
    }

    #[test]
    fn minimal_accept_omits_absent_fields() {
        let json = serde_json::to_string(&Envelope::of_kind(EnvelopeKind::Accept)).unwrap();
        assert_eq!(json, r#"{"type":"accept"}"#);
    }

    #[test]
    fn error_reply_shape() {
        let json = serde_json::to_string(&Envelope::error("Invalid JSON")).unwrap();
        assert_eq!(json, r#"{"type":"error","message":"Invalid JSON"}"#);
    }

    #[test]
    fn signal_preserves_opaque_sdp() {
        let sdp = serde_json::json!({"type": "offer", "sdp": "v=0\r\no=- 46117 2"});
        let env = Envelope::signal_sdp(Role::Client, sdp.clone());
        let json = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sdp, Some(sdp));
        assert_eq!(back.candidate, None);
    }

    #[test]
    fn sdp_type_detects_offer() {
        let env = Envelope::signal_sdp(Role::Client, serde_json::json!({"type": "offer"}));
        assert_eq!(env.sdp_type(), Some("offer"));

        let env = Envelope::signal_sdp(Role::Host, serde_json::json!({"type": "answer"}));
        assert_eq!(env.sdp_type(), Some("answer"));

        let env = Envelope::signal_candidate(Role::Client, serde_json::json!({}));
        assert_eq!(env.sdp_type(), None);
    }

    #[test]
    fn role_peer_is_symmetric() {
        assert_eq!(Role::Client.peer(), Role::Host);
        assert_eq!(Role::Host.peer(), Role::Client);
    }
}

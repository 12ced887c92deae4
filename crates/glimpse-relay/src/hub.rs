//! The hub: one dispatch task owning the two role slots.
//!
//! Both slots live as plain fields on [`Hub`] and every read or write
//! happens on the single event-dispatch path, so no locks are involved.
//! The hub routes on `type` and `role` only; negotiation payloads are
//! forwarded byte-for-byte, never parsed beyond the routing fields.

use std::collections::HashMap;

use glimpse_common::{ConnId, Envelope, EnvelopeKind, Role};
use tokio::sync::mpsc;

/// Informational ping the host gets whenever a client binds.
const SHARE_NOTICE: &str = "Client wants to share screen";

/// Reply sent for frames that fail to parse.
const INVALID_JSON: &str = "Invalid JSON";

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Events produced by the connection pumps, consumed by the hub task.
#[derive(Debug)]
pub enum HubEvent {
    Connected {
        conn: ConnId,
        tx: mpsc::Sender<String>,
    },
    Message {
        conn: ConnId,
        raw: String,
    },
    Disconnected {
        conn: ConnId,
    },
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

/// One registered connection: its outbound channel and the role it last
/// announced. The tag outlives slot occupancy: a displaced connection
/// still relays by tag, but role-addressed replies go to the new occupant.
struct Peer {
    tx: mpsc::Sender<String>,
    role: Option<Role>,
}

/// Routes envelopes between the client slot (sharer) and host slot (viewer).
pub struct Hub {
    peers: HashMap<ConnId, Peer>,
    client_slot: Option<ConnId>,
    host_slot: Option<ConnId>,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            peers: HashMap::new(),
            client_slot: None,
            host_slot: None,
        }
    }

    /// Drain hub events until every connection pump has gone away.
    pub async fn run(mut self, mut events: mpsc::Receiver<HubEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
    }

    pub async fn handle(&mut self, event: HubEvent) {
        match event {
            HubEvent::Connected { conn, tx } => {
                self.peers.insert(conn, Peer { tx, role: None });
                tracing::debug!(%conn, "Connection registered");
            }
            HubEvent::Message { conn, raw } => self.dispatch(conn, raw).await,
            HubEvent::Disconnected { conn } => self.drop_conn(conn),
        }
    }

    /// Parse routing fields, bind any announced role, then apply the relay
    /// rules. A single envelope may do both (e.g. `role: client` +
    /// `type: signal`).
    async fn dispatch(&mut self, conn: ConnId, raw: String) {
        let envelope: Envelope = match serde_json::from_str(&raw) {
            Ok(env) => env,
            Err(e) => {
                tracing::warn!(%conn, error = %e, "Malformed envelope");
                let reply = serde_json::to_string(&Envelope::error(INVALID_JSON)).unwrap();
                self.send_to(conn, reply).await;
                return;
            }
        };

        if let Some(role) = envelope.role {
            self.bind_role(conn, role).await;
        }

        match envelope.kind {
            Some(EnvelopeKind::Signal) => match self.role_of(conn) {
                // The raw frame goes through untouched so the opaque
                // payload reaches the peer exactly as sent.
                Some(Role::Client) => self.relay_to_slot(self.host_slot, raw).await,
                Some(Role::Host) => self.relay_to_slot(self.client_slot, raw).await,
                None => tracing::debug!(%conn, "Signal from untagged connection, dropping"),
            },
            Some(EnvelopeKind::Accept) if self.role_of(conn) == Some(Role::Host) => {
                self.relay_minimal(self.client_slot, EnvelopeKind::Accept).await;
            }
            Some(EnvelopeKind::Reject) if self.role_of(conn) == Some(Role::Host) => {
                self.relay_minimal(self.client_slot, EnvelopeKind::Reject).await;
            }
            Some(EnvelopeKind::Stop) if self.role_of(conn) == Some(Role::Client) => {
                self.relay_minimal(self.host_slot, EnvelopeKind::Stop).await;
            }
            _ => {}
        }
    }

    /// The single insertion point for role assignment. Any envelope carrying
    /// a `role` field rebinds that slot, replacing the previous occupant
    /// without telling it. A future access-control check goes here.
    async fn bind_role(&mut self, conn: ConnId, role: Role) {
        if let Some(peer) = self.peers.get_mut(&conn) {
            peer.role = Some(role);
        }
        match role {
            Role::Client => {
                self.client_slot = Some(conn);
                if self.host_slot.is_some() {
                    let notice =
                        serde_json::to_string(&Envelope::notify_message(SHARE_NOTICE)).unwrap();
                    self.relay_to_slot(self.host_slot, notice).await;
                }
            }
            Role::Host => self.host_slot = Some(conn),
        }
        tracing::debug!(%conn, ?role, "Role bound");
    }

    /// Clear the peer and whichever slot it occupies. The other party is
    /// not told (documented gap: it can wait forever).
    fn drop_conn(&mut self, conn: ConnId) {
        self.peers.remove(&conn);
        if self.client_slot == Some(conn) {
            self.client_slot = None;
        }
        if self.host_slot == Some(conn) {
            self.host_slot = None;
        }
        tracing::info!(%conn, "Connection dropped");
    }

    fn role_of(&self, conn: ConnId) -> Option<Role> {
        self.peers.get(&conn).and_then(|p| p.role)
    }

    async fn send_to(&self, conn: ConnId, frame: String) {
        if let Some(peer) = self.peers.get(&conn) {
            if peer.tx.send(frame).await.is_err() {
                tracing::debug!(%conn, "Outbound channel closed");
            }
        }
    }

    /// Deliver to a slot's occupant; an empty slot is a silent drop, not an
    /// error to the sender.
    async fn relay_to_slot(&self, slot: Option<ConnId>, frame: String) {
        match slot {
            Some(conn) => self.send_to(conn, frame).await,
            None => tracing::trace!("Relay target slot empty, dropping frame"),
        }
    }

    async fn relay_minimal(&self, slot: Option<ConnId>, kind: EnvelopeKind) {
        let frame = serde_json::to_string(&Envelope::of_kind(kind)).unwrap();
        self.relay_to_slot(slot, frame).await;
    }

    pub fn client_slot(&self) -> Option<ConnId> {
        self.client_slot
    }

    pub fn host_slot(&self) -> Option<ConnId> {
        self.host_slot
    }
}

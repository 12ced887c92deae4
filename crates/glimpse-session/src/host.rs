//! Viewer-side session negotiator.
//!
//! Mirror image of the client machine: waits to be notified, answers the
//! consent question, then answers offers and relays candidates until the
//! remote stream arrives. The viewer never originates offers and, unlike
//! the sharer, never announces its own teardown.

use std::sync::Arc;

use glimpse_common::{Envelope, EnvelopeKind, Role};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::link::SignalingLink;
use crate::media::{recv_opt, MediaEvent, MediaTransport, MediaTransportFactory};
use crate::types::{HostCommand, HostEvent, HostPhase, SessionConfig};

// ---------------------------------------------------------------------------
// Public handle
// ---------------------------------------------------------------------------

/// Handle for the viewer side of a session. All methods are non-blocking
/// and feed the negotiator's command channel.
pub struct HostSession {
    command_tx: mpsc::Sender<HostCommand>,
}

impl HostSession {
    /// Dial the hub, announce the host role, and start the negotiator.
    /// Returns `(session, event_receiver)`.
    pub async fn connect(
        config: SessionConfig,
        factory: Arc<dyn MediaTransportFactory>,
    ) -> glimpse_common::Result<(Self, mpsc::Receiver<HostEvent>)> {
        let (link, inbound) = SignalingLink::connect(&config, Role::Host).await?;
        let (command_tx, command_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(256);

        let negotiator = HostNegotiator::new(link.sender(), factory, event_tx);
        tokio::spawn(negotiator.run(inbound, command_rx));

        Ok((Self { command_tx }, event_rx))
    }

    /// Let the waiting client share.
    pub async fn accept(&self) {
        let _ = self.command_tx.send(HostCommand::Accept).await;
    }

    /// Turn the waiting client down.
    pub async fn reject(&self) {
        let _ = self.command_tx.send(HostCommand::Reject).await;
    }

    /// Stop viewing. The sharer is not told.
    pub async fn stop_viewing(&self) {
        let _ = self.command_tx.send(HostCommand::StopViewing).await;
    }
}

// ---------------------------------------------------------------------------
// Negotiator
// ---------------------------------------------------------------------------

pub(crate) struct HostNegotiator {
    phase: HostPhase,
    outbound: mpsc::Sender<Envelope>,
    factory: Arc<dyn MediaTransportFactory>,
    event_tx: mpsc::Sender<HostEvent>,
    transport: Option<Box<dyn MediaTransport>>,
}

impl HostNegotiator {
    pub(crate) fn new(
        outbound: mpsc::Sender<Envelope>,
        factory: Arc<dyn MediaTransportFactory>,
        event_tx: mpsc::Sender<HostEvent>,
    ) -> Self {
        Self {
            phase: HostPhase::Idle,
            outbound,
            factory,
            event_tx,
            transport: None,
        }
    }

    /// Single-threaded event loop: user commands, envelopes from the hub,
    /// collaborator callbacks.
    pub(crate) async fn run(
        mut self,
        mut inbound: mpsc::Receiver<Envelope>,
        mut commands: mpsc::Receiver<HostCommand>,
    ) {
        let mut media_rx: Option<mpsc::Receiver<MediaEvent>> = None;

        loop {
            tokio::select! {
                Some(cmd) = commands.recv() => {
                    if let Some(events) = self.handle_command(cmd).await {
                        media_rx = Some(events);
                    }
                }

                envelope = inbound.recv() => match envelope {
                    Some(envelope) => self.handle_envelope(envelope).await,
                    None => {
                        warn!("Signaling link closed");
                        self.teardown().await;
                        self.set_phase(HostPhase::Idle).await;
                        self.emit(HostEvent::Error("signaling link closed".into())).await;
                        break;
                    }
                },

                Some(event) = recv_opt(&mut media_rx) => self.handle_media_event(event).await,
            }

            if self.transport.is_none() {
                media_rx = None;
            }
        }
    }

    async fn handle_command(&mut self, cmd: HostCommand) -> Option<mpsc::Receiver<MediaEvent>> {
        match cmd {
            HostCommand::Accept => {
                if self.phase != HostPhase::Notified {
                    return None;
                }
                self.send(Envelope::with_role(EnvelopeKind::Accept, Role::Host))
                    .await;
                // The transport goes up before any offer has arrived.
                match self.factory.create().await {
                    Ok((transport, events)) => {
                        self.transport = Some(transport);
                        self.set_phase(HostPhase::Negotiating).await;
                        return Some(events);
                    }
                    Err(e) => {
                        self.emit(HostEvent::Error(e.to_string())).await;
                        self.set_phase(HostPhase::Idle).await;
                    }
                }
            }
            HostCommand::Reject => {
                if self.phase != HostPhase::Notified {
                    return None;
                }
                self.send(Envelope::with_role(EnvelopeKind::Reject, Role::Host))
                    .await;
                self.set_phase(HostPhase::Idle).await;
            }
            HostCommand::StopViewing => {
                if !matches!(self.phase, HostPhase::Negotiating | HostPhase::Active) {
                    return None;
                }
                // Deliberate asymmetry with the sharer: no envelope leaves.
                self.teardown().await;
                self.set_phase(HostPhase::Idle).await;
            }
        }
        None
    }

    async fn handle_envelope(&mut self, envelope: Envelope) {
        match envelope.kind {
            Some(EnvelopeKind::Notify) if self.phase == HostPhase::Idle => {
                self.set_phase(HostPhase::Notified).await;
            }
            Some(EnvelopeKind::Notify) => {
                // The hub re-notifies on every client-role envelope; only
                // the first one from idle matters.
                debug!("Notify outside idle, ignoring");
            }
            Some(EnvelopeKind::Signal) => self.apply_signal(envelope).await,
            Some(EnvelopeKind::Stop) => {
                if matches!(self.phase, HostPhase::Negotiating | HostPhase::Active) {
                    self.teardown().await;
                    self.set_phase(HostPhase::Idle).await;
                }
            }
            Some(EnvelopeKind::Error) => {
                if let Some(message) = envelope.message {
                    self.emit(HostEvent::Error(message)).await;
                }
            }
            _ => debug!(kind = ?envelope.kind, "Ignoring envelope"),
        }
    }

    /// Apply a remote description or candidate; an incoming offer is
    /// answered straight back through the hub. With no transport the
    /// signal is dropped, not queued.
    async fn apply_signal(&mut self, envelope: Envelope) {
        let is_offer = envelope.sdp_type() == Some("offer");
        let Some(transport) = self.transport.as_mut() else {
            debug!("Signal with no transport, dropping");
            return;
        };

        let mut failures = Vec::new();
        let mut answer = None;
        if let Some(sdp) = envelope.sdp {
            match transport.set_remote_description(sdp).await {
                Ok(()) if is_offer => match transport.create_answer().await {
                    Ok(sdp) => answer = Some(sdp),
                    Err(e) => failures.push(e.to_string()),
                },
                Ok(()) => {}
                Err(e) => failures.push(format!("failed to apply remote description: {e}")),
            }
        }
        if let Some(candidate) = envelope.candidate {
            if let Err(e) = transport.add_candidate(candidate).await {
                failures.push(format!("failed to add candidate: {e}"));
            }
        }

        if let Some(sdp) = answer {
            self.send(Envelope::signal_sdp(Role::Host, sdp)).await;
        }
        for message in failures {
            self.emit(HostEvent::Error(message)).await;
        }
    }

    async fn handle_media_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::LocalCandidate(candidate) => {
                self.send(Envelope::signal_candidate(Role::Host, candidate))
                    .await;
            }
            MediaEvent::RemoteTrack(stream) => {
                if self.phase == HostPhase::Negotiating {
                    self.set_phase(HostPhase::Active).await;
                }
                self.emit(HostEvent::RemoteStream(stream)).await;
            }
            MediaEvent::RenegotiationNeeded => {
                // The viewer answers; it never originates offers.
                debug!("Ignoring renegotiation request on host side");
            }
            MediaEvent::Connected => {}
            MediaEvent::Closed => {
                self.teardown().await;
                self.set_phase(HostPhase::Idle).await;
                self.emit(HostEvent::Error("media transport closed".into()))
                    .await;
            }
        }
    }

    async fn teardown(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }
    }

    async fn set_phase(&mut self, phase: HostPhase) {
        if self.phase != phase {
            self.phase = phase;
            self.emit(HostEvent::PhaseChanged(phase)).await;
        }
    }

    async fn send(&self, envelope: Envelope) {
        if self.outbound.send(envelope).await.is_err() {
            warn!("Signaling link gone, envelope dropped");
        }
    }

    async fn emit(&self, event: HostEvent) {
        let _ = self.event_tx.send(event).await;
    }
}

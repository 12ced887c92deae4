//! Sharer-side session negotiator.
//!
//! Drives the consent handshake (request → accept/reject), then hands the
//! agreed session to the media transport: produce offers on renegotiation,
//! relay local candidates, apply the viewer's answer. Single-threaded:
//! everything happens on one event loop.

use std::sync::Arc;

use glimpse_common::{Envelope, EnvelopeKind, Role};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::link::SignalingLink;
use crate::media::{
    recv_opt, Capture, LocalTrack, MediaEvent, MediaTransport, MediaTransportFactory, ScreenCapture,
};
use crate::types::{ClientCommand, ClientEvent, ClientPhase, SessionConfig};

// ---------------------------------------------------------------------------
// Public handle
// ---------------------------------------------------------------------------

/// Handle for the sharer side of a session. All methods are non-blocking
/// and feed the negotiator's command channel.
pub struct ClientSession {
    command_tx: mpsc::Sender<ClientCommand>,
}

impl ClientSession {
    /// Dial the hub, announce the client role, and start the negotiator.
    /// Returns `(session, event_receiver)`.
    pub async fn connect(
        config: SessionConfig,
        capture: Arc<dyn ScreenCapture>,
        factory: Arc<dyn MediaTransportFactory>,
    ) -> glimpse_common::Result<(Self, mpsc::Receiver<ClientEvent>)> {
        let (link, inbound) = SignalingLink::connect(&config, Role::Client).await?;
        let (command_tx, command_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(256);

        let negotiator = ClientNegotiator::new(link.sender(), capture, factory, event_tx);
        tokio::spawn(negotiator.run(inbound, command_rx));

        Ok((Self { command_tx }, event_rx))
    }

    /// Ask the viewer for consent to share.
    pub async fn request_share(&self) {
        let _ = self.command_tx.send(ClientCommand::RequestShare).await;
    }

    /// Stop sharing and tell the peer.
    pub async fn stop_share(&self) {
        let _ = self.command_tx.send(ClientCommand::StopShare).await;
    }
}

// ---------------------------------------------------------------------------
// Negotiator
// ---------------------------------------------------------------------------

/// Channels handed to the run loop when a transport is stood up.
struct NewMedia {
    events: mpsc::Receiver<MediaEvent>,
    capture_ended: mpsc::Receiver<()>,
}

pub(crate) struct ClientNegotiator {
    phase: ClientPhase,
    outbound: mpsc::Sender<Envelope>,
    capture: Arc<dyn ScreenCapture>,
    factory: Arc<dyn MediaTransportFactory>,
    event_tx: mpsc::Sender<ClientEvent>,
    transport: Option<Box<dyn MediaTransport>>,
    track: Option<Box<dyn LocalTrack>>,
}

impl ClientNegotiator {
    pub(crate) fn new(
        outbound: mpsc::Sender<Envelope>,
        capture: Arc<dyn ScreenCapture>,
        factory: Arc<dyn MediaTransportFactory>,
        event_tx: mpsc::Sender<ClientEvent>,
    ) -> Self {
        Self {
            phase: ClientPhase::Idle,
            outbound,
            capture,
            factory,
            event_tx,
            transport: None,
            track: None,
        }
    }

    /// Single-threaded event loop: user commands, envelopes from the hub,
    /// collaborator callbacks, and the capture-ended signal.
    pub(crate) async fn run(
        mut self,
        mut inbound: mpsc::Receiver<Envelope>,
        mut commands: mpsc::Receiver<ClientCommand>,
    ) {
        let mut media_rx: Option<mpsc::Receiver<MediaEvent>> = None;
        let mut capture_ended: Option<mpsc::Receiver<()>> = None;

        loop {
            tokio::select! {
                Some(cmd) = commands.recv() => self.handle_command(cmd).await,

                envelope = inbound.recv() => match envelope {
                    Some(envelope) => {
                        if let Some(media) = self.handle_envelope(envelope).await {
                            media_rx = Some(media.events);
                            capture_ended = Some(media.capture_ended);
                        }
                    }
                    None => {
                        // Link gone. Local teardown only; nobody is told.
                        warn!("Signaling link closed");
                        self.teardown(false).await;
                        self.set_phase(ClientPhase::Idle).await;
                        self.emit(ClientEvent::Error("signaling link closed".into())).await;
                        break;
                    }
                },

                Some(event) = recv_opt(&mut media_rx) => self.handle_media_event(event).await,

                Some(()) = recv_opt(&mut capture_ended) => {
                    info!("Capture ended from OS chrome");
                    self.stop(true).await;
                }
            }

            if self.transport.is_none() {
                media_rx = None;
                capture_ended = None;
            }
        }
    }

    async fn handle_command(&mut self, cmd: ClientCommand) {
        match cmd {
            ClientCommand::RequestShare => {
                // A fresh request also clears a lingering rejection.
                if !matches!(self.phase, ClientPhase::Idle | ClientPhase::Rejected) {
                    return;
                }
                self.send(Envelope::with_role(EnvelopeKind::Notify, Role::Client))
                    .await;
                self.set_phase(ClientPhase::Requesting).await;
            }
            ClientCommand::StopShare => self.stop(true).await,
        }
    }

    async fn handle_envelope(&mut self, envelope: Envelope) -> Option<NewMedia> {
        match envelope.kind {
            Some(EnvelopeKind::Accept) if self.phase == ClientPhase::Requesting => {
                self.set_phase(ClientPhase::Accepted).await;
                return self.start_media().await;
            }
            Some(EnvelopeKind::Reject) if self.phase == ClientPhase::Requesting => {
                self.set_phase(ClientPhase::Rejected).await;
            }
            Some(EnvelopeKind::Signal) => self.apply_signal(envelope).await,
            Some(EnvelopeKind::Stop) => {
                // Remote-initiated teardown runs the same path as a local
                // stop, echo included.
                self.stop(true).await;
            }
            Some(EnvelopeKind::Error) => {
                if let Some(message) = envelope.message {
                    self.emit(ClientEvent::Error(message)).await;
                }
            }
            _ => debug!(kind = ?envelope.kind, "Ignoring envelope"),
        }
        None
    }

    /// Consent granted: capture the display, stand up a transport, attach
    /// the track. Failure here surfaces to the user and returns the
    /// machine to idle; there is nothing to keep alive yet.
    async fn start_media(&mut self) -> Option<NewMedia> {
        let Capture { mut track, ended } = match self.capture.begin_capture().await {
            Ok(capture) => capture,
            Err(e) => {
                self.emit(ClientEvent::Error(e.to_string())).await;
                self.set_phase(ClientPhase::Idle).await;
                return None;
            }
        };

        let created = self.factory.create().await;
        let (mut transport, events) = match created {
            Ok(pair) => pair,
            Err(e) => {
                track.stop().await;
                self.emit(ClientEvent::Error(e.to_string())).await;
                self.set_phase(ClientPhase::Idle).await;
                return None;
            }
        };

        if let Err(e) = transport.add_track(track.as_ref()).await {
            track.stop().await;
            transport.close().await;
            self.emit(ClientEvent::Error(e.to_string())).await;
            self.set_phase(ClientPhase::Idle).await;
            return None;
        }

        self.track = Some(track);
        self.transport = Some(transport);
        self.set_phase(ClientPhase::Negotiating).await;
        Some(NewMedia {
            events,
            capture_ended: ended,
        })
    }

    /// Feed a remote description or candidate to the transport. With no
    /// transport the signal is dropped, not queued; it cannot be applied
    /// to anything.
    async fn apply_signal(&mut self, envelope: Envelope) {
        let Some(transport) = self.transport.as_mut() else {
            debug!("Signal with no transport, dropping");
            return;
        };

        let mut failures = Vec::new();
        if let Some(sdp) = envelope.sdp {
            if let Err(e) = transport.set_remote_description(sdp).await {
                failures.push(format!("failed to apply remote description: {e}"));
            }
        }
        if let Some(candidate) = envelope.candidate {
            if let Err(e) = transport.add_candidate(candidate).await {
                failures.push(format!("failed to add candidate: {e}"));
            }
        }
        for message in failures {
            self.emit(ClientEvent::Error(message)).await;
        }
    }

    async fn handle_media_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::RenegotiationNeeded => {
                let Some(transport) = self.transport.as_mut() else {
                    return;
                };
                match transport.create_offer().await {
                    Ok(offer) => self.send(Envelope::signal_sdp(Role::Client, offer)).await,
                    Err(e) => self.emit(ClientEvent::Error(e.to_string())).await,
                }
            }
            MediaEvent::LocalCandidate(candidate) => {
                self.send(Envelope::signal_candidate(Role::Client, candidate))
                    .await;
            }
            MediaEvent::Connected => {
                if self.phase == ClientPhase::Negotiating {
                    self.set_phase(ClientPhase::Active).await;
                }
            }
            MediaEvent::Closed => {
                // Transport died underneath us. Release local media; the
                // peer is not told.
                self.teardown(false).await;
                self.set_phase(ClientPhase::Idle).await;
                self.emit(ClientEvent::Error("media transport closed".into()))
                    .await;
            }
            MediaEvent::RemoteTrack(_) => {
                // The sharer has no incoming media.
                debug!("Unexpected remote track on client side");
            }
        }
    }

    /// Stop sharing and go idle. Stopping with nothing in flight is a
    /// no-op: no envelope leaves, no phase event fires.
    async fn stop(&mut self, notify_peer: bool) {
        if !matches!(
            self.phase,
            ClientPhase::Accepted | ClientPhase::Negotiating | ClientPhase::Active
        ) {
            return;
        }
        self.teardown(notify_peer).await;
        self.set_phase(ClientPhase::Idle).await;
    }

    /// Release capture and transport. `notify_peer` sends the stop
    /// envelope; transport-closed paths skip it.
    async fn teardown(&mut self, notify_peer: bool) {
        if let Some(mut track) = self.track.take() {
            track.stop().await;
        }
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }
        if notify_peer {
            self.send(Envelope::with_role(EnvelopeKind::Stop, Role::Client))
                .await;
        }
    }

    async fn set_phase(&mut self, phase: ClientPhase) {
        if self.phase != phase {
            self.phase = phase;
            self.emit(ClientEvent::PhaseChanged(phase)).await;
        }
    }

    async fn send(&self, envelope: Envelope) {
        if self.outbound.send(envelope).await.is_err() {
            warn!("Signaling link gone, envelope dropped");
        }
    }

    async fn emit(&self, event: ClientEvent) {
        let _ = self.event_tx.send(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::mock::{MockCapture, MockFactory};

    struct Rig {
        negotiator: ClientNegotiator,
        outbound_rx: mpsc::Receiver<Envelope>,
        event_rx: mpsc::Receiver<ClientEvent>,
        capture: Arc<MockCapture>,
        factory: Arc<MockFactory>,
    }

    fn rig_with(capture: Arc<MockCapture>) -> Rig {
        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(64);
        let factory = MockFactory::new();
        let negotiator = ClientNegotiator::new(
            outbound_tx,
            capture.clone(),
            factory.clone() as Arc<dyn MediaTransportFactory>,
            event_tx,
        );
        Rig {
            negotiator,
            outbound_rx,
            event_rx,
            capture,
            factory,
        }
    }

    fn rig() -> Rig {
        rig_with(MockCapture::new())
    }

    /// Walk a fresh negotiator to `Negotiating`.
    async fn negotiate(rig: &mut Rig) -> NewMedia {
        rig.negotiator
            .handle_command(ClientCommand::RequestShare)
            .await;
        rig.negotiator
            .handle_envelope(Envelope::of_kind(EnvelopeKind::Accept))
            .await
            .expect("transport should be created on accept")
    }

    fn drain_events(rx: &mut mpsc::Receiver<ClientEvent>) -> Vec<ClientEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn request_share_sends_consent_request() {
        let mut rig = rig();
        rig.negotiator
            .handle_command(ClientCommand::RequestShare)
            .await;

        assert_eq!(rig.negotiator.phase, ClientPhase::Requesting);
        let sent = rig.outbound_rx.try_recv().unwrap();
        assert_eq!(sent.kind, Some(EnvelopeKind::Notify));
        assert_eq!(sent.role, Some(Role::Client));
    }

    #[tokio::test]
    async fn repeated_request_is_ignored_while_waiting() {
        let mut rig = rig();
        rig.negotiator
            .handle_command(ClientCommand::RequestShare)
            .await;
        rig.negotiator
            .handle_command(ClientCommand::RequestShare)
            .await;

        assert!(rig.outbound_rx.try_recv().is_ok());
        assert!(rig.outbound_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn accept_stands_up_capture_and_transport() {
        let mut rig = rig();
        let _media = negotiate(&mut rig).await;

        assert_eq!(rig.negotiator.phase, ClientPhase::Negotiating);
        assert_eq!(rig.factory.calls(), vec!["create", "add_track"]);

        let phases: Vec<_> = drain_events(&mut rig.event_rx)
            .into_iter()
            .filter_map(|e| match e {
                ClientEvent::PhaseChanged(p) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(
            phases,
            vec![
                ClientPhase::Requesting,
                ClientPhase::Accepted,
                ClientPhase::Negotiating
            ]
        );
    }

    #[tokio::test]
    async fn reject_never_touches_media() {
        let mut rig = rig();
        rig.negotiator
            .handle_command(ClientCommand::RequestShare)
            .await;
        rig.negotiator
            .handle_envelope(Envelope::of_kind(EnvelopeKind::Reject))
            .await;

        assert_eq!(rig.negotiator.phase, ClientPhase::Rejected);
        assert!(rig.factory.calls().is_empty());

        // A fresh request clears the rejection.
        rig.negotiator
            .handle_command(ClientCommand::RequestShare)
            .await;
        assert_eq!(rig.negotiator.phase, ClientPhase::Requesting);
    }

    #[tokio::test]
    async fn accept_outside_requesting_is_ignored() {
        let mut rig = rig();
        let created = rig
            .negotiator
            .handle_envelope(Envelope::of_kind(EnvelopeKind::Accept))
            .await;

        assert!(created.is_none());
        assert_eq!(rig.negotiator.phase, ClientPhase::Idle);
        assert!(rig.factory.calls().is_empty());
    }

    #[tokio::test]
    async fn renegotiation_produces_relayed_offer() {
        let mut rig = rig();
        let _media = negotiate(&mut rig).await;
        let _ = rig.outbound_rx.try_recv(); // consent request

        rig.negotiator
            .handle_media_event(MediaEvent::RenegotiationNeeded)
            .await;

        let sent = rig.outbound_rx.try_recv().unwrap();
        assert_eq!(sent.kind, Some(EnvelopeKind::Signal));
        assert_eq!(sent.role, Some(Role::Client));
        assert_eq!(sent.sdp_type(), Some("offer"));
    }

    #[tokio::test]
    async fn local_candidates_are_relayed_as_they_arrive() {
        let mut rig = rig();
        let _media = negotiate(&mut rig).await;
        let _ = rig.outbound_rx.try_recv();

        for n in 0..3 {
            rig.negotiator
                .handle_media_event(MediaEvent::LocalCandidate(serde_json::json!({"n": n})))
                .await;
        }

        for n in 0..3 {
            let sent = rig.outbound_rx.try_recv().unwrap();
            assert_eq!(sent.kind, Some(EnvelopeKind::Signal));
            assert_eq!(sent.candidate, Some(serde_json::json!({"n": n})));
        }
    }

    #[tokio::test]
    async fn answer_and_candidates_feed_the_transport() {
        let mut rig = rig();
        let _media = negotiate(&mut rig).await;

        rig.negotiator
            .handle_envelope(Envelope::signal_sdp(
                Role::Host,
                serde_json::json!({"type": "answer", "sdp": "v=0"}),
            ))
            .await;
        rig.negotiator
            .handle_envelope(Envelope::signal_candidate(
                Role::Host,
                serde_json::json!({"candidate": "udp 1"}),
            ))
            .await;

        let calls = rig.factory.calls();
        assert!(calls.contains(&"set_remote_description".to_string()));
        assert!(calls.contains(&"add_candidate".to_string()));
    }

    #[tokio::test]
    async fn signal_without_transport_is_dropped() {
        let mut rig = rig();
        rig.negotiator
            .handle_envelope(Envelope::signal_sdp(
                Role::Host,
                serde_json::json!({"type": "answer"}),
            ))
            .await;

        assert!(rig.factory.calls().is_empty());
        assert!(drain_events(&mut rig.event_rx).is_empty());
        assert_eq!(rig.negotiator.phase, ClientPhase::Idle);
    }

    #[tokio::test]
    async fn media_connected_activates() {
        let mut rig = rig();
        let _media = negotiate(&mut rig).await;

        rig.negotiator.handle_media_event(MediaEvent::Connected).await;
        assert_eq!(rig.negotiator.phase, ClientPhase::Active);
    }

    #[tokio::test]
    async fn stop_while_idle_is_a_no_op() {
        let mut rig = rig();
        rig.negotiator.handle_command(ClientCommand::StopShare).await;

        assert!(rig.outbound_rx.try_recv().is_err());
        assert!(drain_events(&mut rig.event_rx).is_empty());
        assert_eq!(rig.negotiator.phase, ClientPhase::Idle);
    }

    #[tokio::test]
    async fn stop_releases_media_and_notifies_peer() {
        let mut rig = rig();
        let _media = negotiate(&mut rig).await;
        rig.negotiator.handle_media_event(MediaEvent::Connected).await;
        let _ = rig.outbound_rx.try_recv();

        rig.negotiator.handle_command(ClientCommand::StopShare).await;

        assert_eq!(rig.negotiator.phase, ClientPhase::Idle);
        assert!(*rig.capture.track_stopped.lock().unwrap());
        assert!(rig.factory.calls().contains(&"close".to_string()));
        let sent = rig.outbound_rx.try_recv().unwrap();
        assert_eq!(sent.kind, Some(EnvelopeKind::Stop));
        assert_eq!(sent.role, Some(Role::Client));
    }

    #[tokio::test]
    async fn remote_stop_forces_teardown() {
        let mut rig = rig();
        let _media = negotiate(&mut rig).await;
        let _ = rig.outbound_rx.try_recv();

        rig.negotiator
            .handle_envelope(Envelope::of_kind(EnvelopeKind::Stop))
            .await;

        assert_eq!(rig.negotiator.phase, ClientPhase::Idle);
        assert!(rig.factory.calls().contains(&"close".to_string()));
        // Remote-initiated teardown reuses the shared stop path, echo
        // included.
        let sent = rig.outbound_rx.try_recv().unwrap();
        assert_eq!(sent.kind, Some(EnvelopeKind::Stop));
    }

    #[tokio::test]
    async fn capture_failure_surfaces_and_goes_idle() {
        let mut rig = rig_with(MockCapture::failing());
        rig.negotiator
            .handle_command(ClientCommand::RequestShare)
            .await;
        let created = rig
            .negotiator
            .handle_envelope(Envelope::of_kind(EnvelopeKind::Accept))
            .await;

        assert!(created.is_none());
        assert_eq!(rig.negotiator.phase, ClientPhase::Idle);
        assert!(drain_events(&mut rig.event_rx)
            .iter()
            .any(|e| matches!(e, ClientEvent::Error(m) if m.contains("capture"))));
    }

    #[tokio::test]
    async fn negotiation_failure_stays_in_phase() {
        let mut rig = rig();
        let _media = negotiate(&mut rig).await;
        rig.factory.fail_on("set_remote_description");

        rig.negotiator
            .handle_envelope(Envelope::signal_sdp(
                Role::Host,
                serde_json::json!({"type": "answer"}),
            ))
            .await;

        // Surfaced, not rolled back: still negotiating, transport alive.
        assert_eq!(rig.negotiator.phase, ClientPhase::Negotiating);
        assert!(!rig.factory.calls().contains(&"close".to_string()));
        assert!(drain_events(&mut rig.event_rx)
            .iter()
            .any(|e| matches!(e, ClientEvent::Error(_))));
    }

    #[tokio::test]
    async fn no_timeout_while_peer_is_silent() {
        // The host accepted and then vanished without `stop`; with no
        // envelope and no media event, nothing moves the machine.
        let mut rig = rig();
        let _media = negotiate(&mut rig).await;
        assert_eq!(rig.negotiator.phase, ClientPhase::Negotiating);
    }

    #[tokio::test]
    async fn capture_ended_stops_the_session() {
        // Run-loop test: the OS-chrome "stop sharing" path.
        let (outbound_tx, mut outbound_rx) = mpsc::channel(64);
        let (event_tx, mut event_rx) = mpsc::channel(64);
        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        let (command_tx, command_rx) = mpsc::channel(16);
        let capture = MockCapture::new();
        let factory = MockFactory::new();

        let negotiator = ClientNegotiator::new(
            outbound_tx,
            capture.clone(),
            factory.clone() as Arc<dyn MediaTransportFactory>,
            event_tx,
        );
        tokio::spawn(negotiator.run(inbound_rx, command_rx));

        command_tx.send(ClientCommand::RequestShare).await.unwrap();
        assert_eq!(outbound_rx.recv().await.unwrap().kind, Some(EnvelopeKind::Notify));

        inbound_tx
            .send(Envelope::of_kind(EnvelopeKind::Accept))
            .await
            .unwrap();

        // Wait until the machine reports Negotiating.
        loop {
            match event_rx.recv().await.unwrap() {
                ClientEvent::PhaseChanged(ClientPhase::Negotiating) => break,
                _ => {}
            }
        }

        // A collaborator callback flows through the loop into an offer.
        factory
            .events()
            .send(MediaEvent::RenegotiationNeeded)
            .await
            .unwrap();
        let offer = outbound_rx.recv().await.unwrap();
        assert_eq!(offer.kind, Some(EnvelopeKind::Signal));
        assert_eq!(offer.sdp_type(), Some("offer"));

        capture.end_capture().await;

        let stop = outbound_rx.recv().await.unwrap();
        assert_eq!(stop.kind, Some(EnvelopeKind::Stop));
        assert_eq!(stop.role, Some(Role::Client));
        loop {
            match event_rx.recv().await.unwrap() {
                ClientEvent::PhaseChanged(ClientPhase::Idle) => break,
                _ => {}
            }
        }
        assert!(*capture.track_stopped.lock().unwrap());
    }
}

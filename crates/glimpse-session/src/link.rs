//! WebSocket link between a session peer and the relay hub.

use futures_util::{SinkExt, StreamExt};
use glimpse_common::{Envelope, Role, SessionError};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::types::SessionConfig;

/// Sender half of an established signaling link. Inbound envelopes arrive
/// on the receiver returned by [`SignalingLink::connect`]; that stream
/// ending is how link closure is observed; there is no reconnect and no
/// timeout anywhere in the session core.
pub struct SignalingLink {
    outbound_tx: mpsc::Sender<Envelope>,
}

impl SignalingLink {
    /// Dial the hub, announce `role` as the first frame, and spawn the
    /// frame pump. Returns `(link, inbound_envelopes)`.
    pub async fn connect(
        config: &SessionConfig,
        role: Role,
    ) -> Result<(Self, mpsc::Receiver<Envelope>), SessionError> {
        let (ws, _) = tokio_tungstenite::connect_async(&config.signal_url)
            .await
            .map_err(|e| SessionError::Link(e.to_string()))?;
        info!(url = %config.signal_url, ?role, "Signaling link established");

        let (mut sink, mut stream) = ws.split();

        let hello = serde_json::to_string(&Envelope::role_announce(role)).unwrap();
        sink.send(WsMessage::Text(hello.into()))
            .await
            .map_err(|e| SessionError::Link(e.to_string()))?;

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Envelope>(64);
        let (inbound_tx, inbound_rx) = mpsc::channel::<Envelope>(256);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    envelope = outbound_rx.recv() => match envelope {
                        Some(envelope) => {
                            let json = serde_json::to_string(&envelope).unwrap();
                            if sink.send(WsMessage::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                        // The negotiator went away; close out.
                        None => break,
                    },

                    frame = stream.next() => match frame {
                        Some(Ok(WsMessage::Text(text))) => {
                            match serde_json::from_str::<Envelope>(&text) {
                                Ok(envelope) => {
                                    if inbound_tx.send(envelope).await.is_err() {
                                        break;
                                    }
                                }
                                Err(e) => {
                                    debug!(error = %e, "Unparseable frame from hub, skipping");
                                }
                            }
                        }
                        Some(Ok(WsMessage::Ping(data))) => {
                            let _ = sink.send(WsMessage::Pong(data)).await;
                        }
                        Some(Ok(WsMessage::Close(_))) | None => {
                            info!("Signaling link closed by hub");
                            break;
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "Signaling link error");
                            break;
                        }
                        _ => {}
                    },
                }
            }
            // Dropping inbound_tx ends the negotiator's envelope stream.
        });

        Ok((Self { outbound_tx }, inbound_rx))
    }

    /// A clonable handle for sending envelopes to the hub.
    pub fn sender(&self) -> mpsc::Sender<Envelope> {
        self.outbound_tx.clone()
    }
}

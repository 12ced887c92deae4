//! Per-connection pump: inbound frames become hub events, frames addressed
//! to this connection drain from its channel into the socket.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use glimpse_common::ConnId;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::hub::HubEvent;

/// Handle a single WebSocket connection until either side goes away.
pub async fn handle_connection(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    addr: SocketAddr,
    hub_tx: mpsc::Sender<HubEvent>,
) {
    let (mut sink, mut stream) = ws.split();
    let conn = ConnId::new();

    let (tx, mut rx) = mpsc::channel::<String>(256);
    if hub_tx.send(HubEvent::Connected { conn, tx }).await.is_err() {
        return;
    }

    tracing::info!(peer = %addr, %conn, "Connection open");

    loop {
        tokio::select! {
            // Frames the hub addressed to this connection → its socket.
            Some(frame) = rx.recv() => {
                if sink.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }

            // Frames from this connection → the hub's dispatch path.
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if hub_tx
                            .send(HubEvent::Message { conn, raw: text.to_string() })
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(peer = %addr, error = %e, "WS error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    tracing::info!(peer = %addr, %conn, "Connection closed");
    let _ = hub_tx.send(HubEvent::Disconnected { conn }).await;
}

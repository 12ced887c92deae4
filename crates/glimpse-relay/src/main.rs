//! glimpse-relay: WebSocket signaling hub for two-party screen sharing.
//!
//! Holds at most one connection per role, client (sharer) and host
//! (viewer), and forwards signaling envelopes between them. Negotiation
//! payloads are opaque; the hub reads only `type` and `role`.

mod connection;
mod hub;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;

use crate::connection::handle_connection;
use crate::hub::Hub;

#[derive(Parser)]
#[command(name = "glimpse-relay", about = "Signaling hub for glimpse screen sharing")]
struct Args {
    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = 3001)]
    port: u16,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "glimpse_relay=info".into()),
        )
        .init();

    let args = Args::parse();

    // One hub task owns both role slots; connection pumps feed it events.
    let (hub_tx, hub_rx) = mpsc::channel(256);
    tokio::spawn(Hub::new().run(hub_rx));

    let addr = format!("{}:{}", args.bind, args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .expect("Failed to bind TCP listener");

    tracing::info!("glimpse-relay listening on {}", addr);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let hub_tx = hub_tx.clone();
                tokio::spawn(async move {
                    match accept_async(stream).await {
                        Ok(ws) => handle_connection(ws, addr, hub_tx).await,
                        Err(e) => {
                            tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
            }
        }
    }
}

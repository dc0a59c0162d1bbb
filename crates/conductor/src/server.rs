//! WebSocket transport
//!
//! One task per connection. Messages on a connection are handled strictly in
//! order: the reply to message N is written before message N+1 is read.

use crate::bridge::Bridge;
use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::{self, Message};
use uuid::Uuid;

/// Accept connections until the listener fails irrecoverably
pub async fn serve(listener: TcpListener, bridge: Arc<Bridge>) -> Result<()> {
    let addr = listener.local_addr()?;
    log::info!("WebSocket server listening on ws://{}", addr);

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                log::error!("Failed to accept connection: {}", e);
                continue;
            }
        };

        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move {
            let id = Uuid::new_v4();
            log::info!("Client connected from {} ({})", peer, id);

            match handle_connection(stream, peer, id, bridge).await {
                Ok(()) => log::info!("Client {} ({}) disconnected normally", peer, id),
                Err(e) => log::error!("Client {} ({}) disconnected with error: {}", peer, id, e),
            }
            log::info!("Connection closed for {} ({})", peer, id);
        });
    }
}

/// Run one client's session to completion
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    id: Uuid,
    bridge: Arc<Bridge>,
) -> Result<(), tungstenite::Error> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut write, mut read) = ws_stream.split();

    let mut session = bridge.new_session();

    while let Some(msg) = read.next().await {
        let text = match msg? {
            Message::Text(text) => text,
            Message::Binary(data) => String::from_utf8_lossy(&data).into_owned(),
            Message::Close(_) => break,
            // tungstenite answers pings itself on the next flush
            _ => continue,
        };

        log::info!("Received from {} ({}): {}", peer, id, text);
        let reply = bridge.handle(&mut session, &text).await;
        write.send(Message::Text(reply.to_json())).await?;
    }

    Ok(())
}

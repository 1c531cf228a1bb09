//! WebSocket Link
//!
//! Carries fight records between two devices as binary WebSocket frames.
//! One side hosts (`accept`), the other joins (`connect`). Each connection
//! gets a writer task fed by a [`ChannelTransport`] and a reader task that
//! delivers frames to the session; when either ends the session is told the
//! link is down.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, connect_async, tungstenite::Message, WebSocketStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::network::link::LinkState;
use crate::network::session::SessionHandle;
use crate::network::transport::ChannelTransport;

/// Link setup errors.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    /// Socket error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Handshake or protocol error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Wait for one peer on `listener` and wire it to `handle`.
pub async fn accept(listener: &TcpListener, handle: SessionHandle) -> Result<ChannelTransport, WsError> {
    let (stream, addr) = listener.accept().await?;
    info!("peer connected from {}", addr);

    let ws = accept_async(stream).await?;
    Ok(spawn_pumps(ws, handle))
}

/// Join the host at `url` and wire it to `handle`.
pub async fn connect(url: &str, handle: SessionHandle) -> Result<ChannelTransport, WsError> {
    let (ws, _) = connect_async(url).await?;
    info!("connected to {}", url);
    Ok(spawn_pumps(ws, handle))
}

fn spawn_pumps<S>(ws: WebSocketStream<S>, handle: SessionHandle) -> ChannelTransport
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut ws_sender, mut ws_receiver) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

    tokio::spawn(async move {
        while let Some(record) = rx.recv().await {
            if ws_sender.send(Message::Binary(record)).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    let reader = handle.clone();
    tokio::spawn(async move {
        loop {
            match ws_receiver.next().await {
                Some(Ok(Message::Binary(data))) => {
                    if reader.deliver(data).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!("peer closed the link");
                    break;
                }
                Some(Err(e)) => {
                    warn!("link error: {}", e);
                    break;
                }
                // Pings are answered by tungstenite; text is not ours.
                Some(Ok(_)) => {}
            }
        }
        let _ = reader.link_state(LinkState::Disconnected);
    });

    let _ = handle.link_state(LinkState::Connected);
    ChannelTransport::new(tx)
}

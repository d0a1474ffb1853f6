//! Per-connection lifecycle.
//!
//! A connection is `OPEN` from registration until its reader loop exits on
//! end-of-stream, a close frame, a transport error, an undecodable message or
//! a failed write reported by the writer task; it is then `CLOSED` and the
//! reader removes it from the registry.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use super::message::GossipMessage;
use super::peer::{PeerDirection, PeerId};
use super::protocol::GossipHandler;

#[derive(Debug)]
pub enum CloseReason {
    EndOfStream,
    DecodeError(String),
    TransportError(String),
    ReplyFailed(String),
    WriteFailed(String),
    /// The writer stopped because the peer left the registry.
    Unregistered,
}

/// Registers the peer and spawns its reader and writer tasks.
pub fn spawn_connection<S>(
    ws: WebSocketStream<S>,
    address: String,
    direction: PeerDirection,
    handler: GossipHandler,
) -> PeerId
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, stream) = ws.split();
    let (tx, rx) = mpsc::unbounded_channel();
    let (writer_done_tx, writer_done_rx) = oneshot::channel();
    let peer_id = handler.peers().register(address, direction, tx);

    tokio::spawn(write_loop(peer_id, sink, rx, writer_done_tx));
    tokio::spawn(read_loop(peer_id, handler, stream, writer_done_rx));

    peer_id
}

async fn read_loop<S>(
    peer_id: PeerId,
    handler: GossipHandler,
    mut stream: SplitStream<WebSocketStream<S>>,
    mut writer_done: oneshot::Receiver<String>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let reason = loop {
        let frame = tokio::select! {
            frame = stream.next() => frame,
            outcome = &mut writer_done => break match outcome {
                Ok(error) => CloseReason::WriteFailed(error),
                Err(_) => CloseReason::Unregistered,
            },
        };

        let text = match frame {
            None | Some(Ok(Message::Close(_))) => break CloseReason::EndOfStream,
            Some(Err(e)) => break CloseReason::TransportError(e.to_string()),
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => break CloseReason::DecodeError(e.to_string()),
            },
            Some(Ok(_)) => continue,
        };

        debug!(%peer_id, message = %text, "received p2p message");
        let message = match GossipMessage::decode(&text) {
            Ok(message) => message,
            Err(e) => break CloseReason::DecodeError(e.to_string()),
        };
        if let Err(e) = handler.dispatch(peer_id, message).await {
            break CloseReason::ReplyFailed(e.to_string());
        }
    };

    match &reason {
        CloseReason::EndOfStream => info!(%peer_id, "peer shut down the connection"),
        other => warn!(%peer_id, reason = ?other, "closing peer connection"),
    }
    // Dropping the registry entry closes the writer queue, which closes the socket.
    handler.peers().remove(peer_id);
}

async fn write_loop<S>(
    peer_id: PeerId,
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut rx: mpsc::UnboundedReceiver<GossipMessage>,
    writer_done: oneshot::Sender<String>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        let text = match message.encode() {
            Ok(text) => text,
            Err(e) => {
                warn!(%peer_id, error = %e, "failed to encode outbound message");
                continue;
            }
        };
        if let Err(e) = sink.send(Message::Text(text)).await {
            warn!(%peer_id, error = %e, "failed to send message");
            let _ = writer_done.send(e.to_string());
            return;
        }
    }
    let _ = sink.close().await;
}

//! tokio-tungstenite transport.
//!
//! Each [`WsConnector::open`] spawns one task that owns the socket for its
//! whole life. The task reports lifecycle events on a shared channel tagged
//! with the socket id and always finishes with [`SocketEvent::Closed`], even
//! when the owner closed it first; the connection manager filters those.

use crate::error::{WsError, WsResult};
use crate::socket::{Connector, Socket, SocketEvent, SocketId};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Capacity of the shared socket event channel.
pub const SOCKET_EVENT_CHANNEL_SIZE: usize = 1000;

/// Lifecycle event tagged with its socket.
pub type TaggedSocketEvent = (SocketId, SocketEvent);

/// Connector backed by tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct WsConnector {
    events: mpsc::Sender<TaggedSocketEvent>,
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(events: mpsc::Sender<TaggedSocketEvent>, connect_timeout: Duration) -> Self {
        Self {
            events,
            connect_timeout,
        }
    }

    /// Create a connector along with the receiving end of its event channel.
    pub fn with_channel(connect_timeout: Duration) -> (Self, mpsc::Receiver<TaggedSocketEvent>) {
        let (tx, rx) = mpsc::channel(SOCKET_EVENT_CHANNEL_SIZE);
        (Self::new(tx, connect_timeout), rx)
    }
}

impl Connector for WsConnector {
    type Socket = WsSocket;

    fn open(&mut self, id: SocketId, url: &str) -> WsSocket {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        tokio::spawn(run_socket(
            id,
            url.to_string(),
            self.connect_timeout,
            self.events.clone(),
            outbound_rx,
            cancel.clone(),
        ));

        WsSocket {
            id,
            outbound: outbound_tx,
            cancel,
        }
    }
}

/// Handle to a socket task. Dropping it closes the socket.
#[derive(Debug)]
pub struct WsSocket {
    id: SocketId,
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

impl Socket for WsSocket {
    fn send(&mut self, frame: String) -> WsResult<()> {
        if self.cancel.is_cancelled() {
            return Err(WsError::SendFailed(format!("socket {} closed", self.id)));
        }
        self.outbound
            .send(frame)
            .map_err(|_| WsError::SendFailed(format!("socket {} task ended", self.id)))
    }

    fn close(&mut self) {
        self.cancel.cancel();
    }
}

impl Drop for WsSocket {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_socket(
    id: SocketId,
    url: String,
    connect_timeout: Duration,
    events: mpsc::Sender<TaggedSocketEvent>,
    outbound: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) {
    let (code, reason) = match drive_socket(id, &url, connect_timeout, &events, outbound, &cancel).await {
        Ok(closed) => closed,
        Err(e) => {
            let _ = events.send((id, SocketEvent::Error(e.to_string()))).await;
            (1006, e.to_string())
        }
    };

    debug!(socket = %id, code, %reason, "Socket task finished");
    let _ = events.send((id, SocketEvent::Closed { code, reason })).await;
}

/// Run one socket until it closes. Returns the close code and reason.
async fn drive_socket(
    id: SocketId,
    url: &str,
    connect_timeout: Duration,
    events: &mpsc::Sender<TaggedSocketEvent>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    cancel: &CancellationToken,
) -> WsResult<(u16, String)> {
    let connect = tokio::time::timeout(
        connect_timeout,
        connect_async_tls_with_config(url, None, true, None),
    );
    let (ws_stream, _response) = tokio::select! {
        () = cancel.cancelled() => return Ok((1000, "closed before open".to_string())),
        result = connect => result
            .map_err(|_| WsError::ConnectTimeout(connect_timeout.as_millis() as u64))??,
    };
    let (mut write, mut read) = ws_stream.split();

    if events.send((id, SocketEvent::Opened)).await.is_err() {
        return Ok((1000, "event receiver dropped".to_string()));
    }

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                if let Err(e) = write.send(Message::Close(None)).await {
                    warn!(socket = %id, ?e, "Failed to send Close frame");
                }
                return Ok((1000, "closed by client".to_string()));
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if events.send((id, SocketEvent::Frame(text))).await.is_err() {
                            return Ok((1000, "event receiver dropped".to_string()));
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let closed = frame
                            .map(|f| (f.code.into(), f.reason.to_string()))
                            .unwrap_or((1000, "normal close".to_string()));
                        return Ok(closed);
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok((1006, "stream ended".to_string())),
                    _ => {}
                }
            }

            frame = outbound.recv() => {
                match frame {
                    Some(text) => write.send(Message::Text(text)).await?,
                    // Handle dropped without close().
                    None => {
                        let _ = write.send(Message::Close(None)).await;
                        return Ok((1000, "closed by client".to_string()));
                    }
                }
            }
        }
    }
}

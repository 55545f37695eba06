//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! Browsers speak JSON over text frames, so outbound UTF-8 payloads are
//! sent as text. Inbound text and binary frames are both accepted and
//! handed up as bytes. Control frames never reach the caller.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use crate::{Connection, ConnectionId, Transport, TransportError};

/// Process-wide, so ids stay unique across several transports.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = WebSocketStream<TcpStream>;

/// A WebSocket [`Transport`] listening on a TCP socket.
pub struct WebSocketTransport {
    listener: TcpListener,
}

impl WebSocketTransport {
    /// Binds to `addr`. Use port 0 to let the OS pick one, then read it
    /// back with [`Transport::local_addr`].
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::BindFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self { listener })
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| TransportError::HandshakeFailed(e.to_string()))?;

        let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%id, %addr, "accepted WebSocket connection");
        Ok(WebSocketConnection::new(id, ws))
    }

    fn local_addr(&self) -> Result<SocketAddr, Self::Error> {
        self.listener
            .local_addr()
            .map_err(TransportError::AcceptFailed)
    }
}

/// A single WebSocket connection.
///
/// The sink and stream halves sit behind separate locks so a pending
/// `recv` never holds up a `send`.
pub struct WebSocketConnection {
    id: ConnectionId,

    /// Write half. Held only while one frame is flushed, so room
    /// broadcasts and direct replies interleave frame by frame.
    sink: Mutex<SplitSink<WsStream, Message>>,

    /// Read half. Only the connection's own read loop takes this.
    stream: Mutex<SplitStream<WsStream>>,
}

impl WebSocketConnection {
    fn new(id: ConnectionId, ws: WsStream) -> Self {
        let (sink, stream) = ws.split();
        Self {
            id,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        }
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    /// UTF-8 payloads go out as text frames (JSON for browsers), anything
    /// else as binary.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let msg = match std::str::from_utf8(data) {
            Ok(text) => Message::Text(text.to_owned().into()),
            Err(_) => Message::Binary(data.to_vec().into()),
        };
        self.sink
            .lock()
            .await
            .send(msg)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    /// Skips ping, pong and raw frames. A close frame and the end of the
    /// stream both read as `Ok(None)`.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text.as_bytes().to_vec())),
                Some(Ok(Message::Binary(data))) => return Ok(Some(data.into())),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                // tungstenite answers pings itself
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(TransportError::ReceiveFailed(e.to_string())),
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.sink
            .lock()
            .await
            .close()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

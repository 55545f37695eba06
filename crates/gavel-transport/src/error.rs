/// Errors that can occur in the transport layer.
///
/// Only [`BindFailed`](Self::BindFailed) is fatal to the server. The rest
/// concern one connection, and the server logs them and drops that
/// connection's team to disconnected while the room carries on.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Binding the listening socket failed.
    ///
    /// Usually the port is taken or the address is not local to this host.
    #[error("bind failed: {0}")]
    BindFailed(#[source] std::io::Error),

    /// Accepting a TCP connection failed.
    ///
    /// Also returned by `local_addr` when the socket cannot report its
    /// address, since both come from the same listener.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The WebSocket upgrade was refused or malformed.
    ///
    /// The peer opened TCP but never completed the HTTP upgrade, for
    /// example a plain `curl` against the port or a health check that
    /// does not speak WebSocket. Nothing was registered for it.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// Sending a message failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receiving a message failed.
    ///
    /// Covers protocol violations from the peer as well as I/O errors. A
    /// clean close is not an error: `recv` returns `Ok(None)` for that.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// The connection is already closed.
    #[error("connection closed")]
    ConnectionClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_messages() {
        let err = TransportError::HandshakeFailed("not a websocket".into());
        assert_eq!(err.to_string(), "handshake failed: not a websocket");
        assert_eq!(TransportError::ConnectionClosed.to_string(), "connection closed");
    }

    #[test]
    fn test_io_errors_keep_their_source() {
        use std::error::Error;
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken");
        let err = TransportError::BindFailed(io);
        assert!(err.source().is_some());
    }
}

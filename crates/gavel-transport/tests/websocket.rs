//! Integration tests for the WebSocket transport over a real socket.

#[cfg(feature = "websocket")]
mod websocket {
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use gavel_transport::{Connection, Transport, WebSocketConnection, WebSocketTransport};
    use tokio::net::TcpStream;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    /// Binds on an OS-assigned port and returns a connected client/server pair.
    async fn connected_pair() -> (Client, WebSocketConnection) {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("should have an address");

        let server = tokio::spawn(async move { transport.accept().await.expect("should accept") });
        let (client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("client should connect");
        let conn = server.await.expect("accept task should finish");
        (client, conn)
    }

    #[tokio::test]
    async fn test_json_goes_out_as_text_frame() {
        let (mut client, conn) = connected_pair().await;
        assert!(conn.id().into_inner() > 0);

        conn.send(br#"{"event":"HandshakeAck","server_time":1}"#)
            .await
            .unwrap();
        let msg = client.next().await.unwrap().unwrap();
        assert!(msg.is_text());
        assert_eq!(msg.into_text().unwrap().as_str(), r#"{"event":"HandshakeAck","server_time":1}"#);
    }

    #[tokio::test]
    async fn test_non_utf8_goes_out_as_binary_frame() {
        let (mut client, conn) = connected_pair().await;
        conn.send(&[0xff, 0x00, 0xfe]).await.unwrap();
        let msg = client.next().await.unwrap().unwrap();
        assert!(msg.is_binary());
        assert_eq!(msg.into_data().as_ref(), &[0xff, 0x00, 0xfe]);
    }

    #[tokio::test]
    async fn test_recv_accepts_text_and_binary() {
        let (mut client, conn) = connected_pair().await;

        client.send(Message::Text("bid".into())).await.unwrap();
        client
            .send(Message::Binary(b"pass".to_vec().into()))
            .await
            .unwrap();

        assert_eq!(conn.recv().await.unwrap().unwrap(), b"bid");
        assert_eq!(conn.recv().await.unwrap().unwrap(), b"pass");
    }

    #[tokio::test]
    async fn test_send_is_not_blocked_by_pending_recv() {
        let (mut client, conn) = connected_pair().await;

        // Nothing arrives, so recv stays pending while we send.
        let outcome = tokio::select! {
            _ = conn.recv() => None,
            sent = conn.send(b"going once") => Some(sent),
        };
        outcome.expect("send should win").unwrap();

        let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("client should get the frame")
            .unwrap()
            .unwrap();
        assert_eq!(msg.into_data().as_ref(), b"going once");
    }

    #[tokio::test]
    async fn test_recv_returns_none_on_client_close() {
        let (mut client, conn) = connected_pair().await;
        client.send(Message::Close(None)).await.unwrap();

        let result = conn.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on client close");
    }

    #[tokio::test]
    async fn test_connections_get_distinct_ids() {
        let (_c1, a) = connected_pair().await;
        let (_c2, b) = connected_pair().await;
        assert_ne!(a.id(), b.id());
    }
}

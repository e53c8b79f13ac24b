//! Integration tests for the WebSocket client transport.
//!
//! Each test runs a throwaway tungstenite server on an OS-assigned port
//! and drives it from the real connector.

#[cfg(feature = "websocket")]
mod websocket {
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;
    use utylink_transport::{Connection, Connector, WebSocketConnector};

    type ServerWs = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    /// Binds a listener on a random port and returns it with its ws:// url.
    async fn listen() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("should bind");
        let addr = listener.local_addr().expect("should have addr");
        (listener, format!("ws://{addr}"))
    }

    async fn accept(listener: TcpListener) -> ServerWs {
        let (stream, _) = listener.accept().await.expect("should accept");
        tokio_tungstenite::accept_async(stream).await.expect("should upgrade")
    }

    #[tokio::test]
    async fn test_connect_send_and_receive_text() {
        let (listener, url) = listen().await;
        let server = tokio::spawn(accept(listener));

        let conn = WebSocketConnector.connect(&url).await.expect("should connect");
        let mut server_ws = server.await.expect("task should complete");
        assert!(conn.id().into_inner() > 0);

        // Client → server arrives as a text frame.
        conn.send(r#"[{"cmd":"Sync"}]"#).await.expect("send should succeed");
        let msg = server_ws.next().await.unwrap().unwrap();
        assert!(msg.is_text());
        assert_eq!(msg.into_text().unwrap().as_str(), r#"[{"cmd":"Sync"}]"#);

        // Server → client.
        server_ws
            .send(Message::Text(r#"[{"cmd":"RoomInfo"}]"#.to_owned().into()))
            .await
            .unwrap();
        let received = conn
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have data");
        assert_eq!(received, r#"[{"cmd":"RoomInfo"}]"#);

        conn.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn test_recv_returns_none_on_server_close() {
        let (listener, url) = listen().await;
        let server = tokio::spawn(accept(listener));

        let conn = WebSocketConnector.connect(&url).await.expect("should connect");
        let mut server_ws = server.await.unwrap();
        server_ws.send(Message::Close(None)).await.unwrap();

        let result = conn.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on server close");
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let (listener, url) = listen().await;
        drop(listener);

        let result = WebSocketConnector.connect(&url).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_each_connection_gets_a_fresh_id() {
        let (listener_a, url_a) = listen().await;
        let (listener_b, url_b) = listen().await;
        let server_a = tokio::spawn(accept(listener_a));
        let server_b = tokio::spawn(accept(listener_b));

        let a = WebSocketConnector.connect(&url_a).await.unwrap();
        let b = WebSocketConnector.connect(&url_b).await.unwrap();
        let _keep = (server_a.await.unwrap(), server_b.await.unwrap());

        assert_ne!(a.id(), b.id());
    }
}

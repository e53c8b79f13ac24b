//! Client against an in-process mock coordination server.
//!
//! The mock speaks just enough of the protocol to drive a session: it
//! sends `RoomInfo`, reads `Connect`, and then follows a per-test script.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use utylink::{Client, ReconnectPolicy, UtylinkError};

type ServerWs = WebSocketStream<TcpStream>;

const TIMEOUT: Duration = Duration::from_secs(5);

// =========================================================================
// Mock server helpers
// =========================================================================

async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("should bind");
    let addr = listener.local_addr().expect("should have addr");
    (listener, addr.to_string())
}

async fn accept(listener: &TcpListener) -> ServerWs {
    let (stream, _) = tokio::time::timeout(TIMEOUT, listener.accept())
        .await
        .expect("client should connect")
        .expect("should accept");
    tokio_tungstenite::accept_async(stream).await.expect("should upgrade")
}

async fn send(ws: &mut ServerWs, cmds: Value) {
    ws.send(Message::Text(cmds.to_string().into()))
        .await
        .expect("server send");
}

/// Reads frames until a command named `name` shows up and returns it.
async fn expect_cmd(ws: &mut ServerWs, name: &str) -> Value {
    tokio::time::timeout(TIMEOUT, async {
        loop {
            let msg = ws.next().await.expect("stream open").expect("frame");
            let Ok(text) = msg.into_text() else {
                continue;
            };
            let Ok(Value::Array(cmds)) = serde_json::from_str::<Value>(text.as_str()) else {
                continue;
            };
            if let Some(cmd) = cmds.into_iter().find(|c| c["cmd"] == name) {
                return cmd;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {name}"))
}

/// `RoomInfo`, then the client's `Connect`.
async fn greet(ws: &mut ServerWs) -> Value {
    send(
        ws,
        json!([{"cmd": "RoomInfo", "password": false, "games": ["Undertale Yellow"], "seed_name": "seed"}]),
    )
    .await;
    expect_cmd(ws, "Connect").await
}

fn connected() -> Value {
    json!({
        "cmd": "Connected",
        "team": 0,
        "slot": 1,
        "players": [{"team": 0, "slot": 1, "alias": "Clover", "name": "Clover"}],
        "missing_locations": [12001, 12002],
        "checked_locations": [],
        "slot_data": {"route": "neutral", "key_hunt": false, "key_pieces": 0},
    })
}

async fn wait_for_file(path: &Path) {
    tokio::time::timeout(TIMEOUT, async {
        while !path.exists() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{} never appeared", path.display()));
}

fn client(addr: &str, dir: &Path) -> Client {
    Client::builder()
        .server(addr)
        .slot_name("Clover")
        .interface_dir(dir)
        .tick_rate(50)
        .reconnect(ReconnectPolicy {
            initial: Duration::from_millis(20),
            max: Duration::from_millis(100),
        })
        .build()
        .expect("client should build")
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_full_session_syncs_items_and_checks() {
    let dir = tempfile::tempdir().unwrap();
    let root: PathBuf = dir.path().join("Undertale_Yellow_AP");
    let (listener, addr) = listen().await;
    let (exit_tx, exit_rx) = watch::channel(false);

    // Left over from an earlier session; must be purged on connect.
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(root.join("99PLR9.item"), "1").unwrap();
    std::fs::write(root.join("file0"), "save").unwrap();

    let script_root = root.clone();
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let connect = greet(&mut ws).await;
        assert_eq!(connect["name"], "Clover");
        assert_eq!(connect["game"], "Undertale Yellow");
        assert_eq!(connect["items_handling"], 7);
        assert_eq!(connect["tags"], json!(["AP", "Online"]));
        assert_eq!(connect["uuid"].as_str().unwrap().len(), 32);

        send(
            &mut ws,
            json!([
                connected(),
                {"cmd": "ReceivedItems", "index": 0, "items": [
                    {"item": 77508, "location": 12010, "player": 2, "flags": 0}
                ]},
            ]),
        )
        .await;
        let get = expect_cmd(&mut ws, "Get").await;
        assert_eq!(get["keys"][0], "1 RoutesDone neutral");

        wait_for_file(&script_root.join("12010PLR2.item")).await;
        assert!(!script_root.join("99PLR9.item").exists());

        std::fs::write(script_root.join("check.spot"), "1\n").unwrap();
        let checks = expect_cmd(&mut ws, "LocationChecks").await;
        assert_eq!(checks["locations"], json!([12001]));

        exit_tx.send_replace(true);
        // Drain until the client closes.
        while let Some(Ok(_)) = ws.next().await {}
    });

    let result = tokio::time::timeout(TIMEOUT, client(&addr, &root).run(exit_rx))
        .await
        .expect("client should stop");
    assert!(result.is_ok(), "{result:?}");
    server.await.expect("server script");

    assert!(!root.join("12010PLR2.item").exists(), "purged on shutdown");
    assert!(!root.join("check.spot").exists());
    assert!(root.join("file0").exists());
}

#[tokio::test]
async fn test_connection_refused_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let (listener, addr) = listen().await;
    let (_exit_tx, exit_rx) = watch::channel(false);

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        greet(&mut ws).await;
        send(
            &mut ws,
            json!([{"cmd": "ConnectionRefused", "errors": ["InvalidSlot"]}]),
        )
        .await;
        while let Some(Ok(_)) = ws.next().await {}
    });

    let result = tokio::time::timeout(TIMEOUT, client(&addr, dir.path()).run(exit_rx))
        .await
        .expect("client should stop");
    match result {
        Err(UtylinkError::ConnectionRefused(errors)) => assert_eq!(errors, vec!["InvalidSlot"]),
        other => panic!("expected ConnectionRefused, got {other:?}"),
    }
    server.abort();
}

#[tokio::test]
async fn test_reconnects_after_server_closes() {
    let dir = tempfile::tempdir().unwrap();
    let (listener, addr) = listen().await;
    let (exit_tx, exit_rx) = watch::channel(false);

    let server = tokio::spawn(async move {
        let mut first = accept(&listener).await;
        greet(&mut first).await;
        send(&mut first, json!([connected()])).await;
        expect_cmd(&mut first, "SetNotify").await;
        first.close(None).await.unwrap();

        let mut second = accept(&listener).await;
        let connect = greet(&mut second).await;
        assert_eq!(connect["name"], "Clover");
        exit_tx.send_replace(true);
        while let Some(Ok(_)) = second.next().await {}
    });

    let result = tokio::time::timeout(TIMEOUT, client(&addr, dir.path()).run(exit_rx))
        .await
        .expect("client should stop");
    assert!(result.is_ok(), "{result:?}");
    server.await.expect("server script");
}

#[tokio::test]
async fn test_exit_before_connecting() {
    let dir = tempfile::tempdir().unwrap();
    let (exit_tx, exit_rx) = watch::channel(false);
    exit_tx.send_replace(true);

    let result = tokio::time::timeout(TIMEOUT, client("127.0.0.1:9", dir.path()).run(exit_rx))
        .await
        .expect("client should stop");
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_exit_while_upgrade_is_pending() {
    let dir = tempfile::tempdir().unwrap();
    let (listener, addr) = listen().await;
    let (exit_tx, exit_rx) = watch::channel(false);

    // Accepts TCP but never answers the WebSocket upgrade.
    let server = tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.expect("should accept");
        tokio::time::sleep(Duration::from_millis(300)).await;
        exit_tx.send_replace(true);
        std::future::pending::<()>().await;
    });

    let result = tokio::time::timeout(TIMEOUT, client(&addr, dir.path()).run(exit_rx))
        .await
        .expect("exit should interrupt the pending connect");
    assert!(result.is_ok(), "{result:?}");
    server.abort();
}

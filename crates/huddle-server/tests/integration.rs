//! End-to-end integration tests using a real WebSocket client.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use huddle_auth::{GoogleProvider, OAuthConfig};
use huddle_store::{MemoryIndex, MemoryStore, Store};
use huddle_server::command::context::CommandContext;
use huddle_server::command::handlers::register_all;
use huddle_server::command::registry::CommandRegistry;
use huddle_server::config::ServerConfig;
use huddle_server::server::HuddleServer;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Boot a test server and return the WS URL + server handle.
async fn boot_server() -> (String, Arc<HuddleServer>) {
    let ctx = CommandContext::new(Arc::new(MemoryStore::new()), Arc::new(MemoryIndex::new()));
    let mut registry = CommandRegistry::new();
    register_all(&mut registry).unwrap();
    let provider = GoogleProvider::new(OAuthConfig::google("clientid", "secret"));

    let server = Arc::new(HuddleServer::new(
        ServerConfig::default(),
        registry,
        ctx,
        Arc::new(provider),
    ));
    let (addr, _handle) = server.listen().await.unwrap();
    let ws_url = format!("ws://{addr}{}", server.config().ws_path);

    (ws_url, server)
}

async fn connect(url: &str) -> WsStream {
    let (ws, _) = timeout(TIMEOUT, connect_async(url))
        .await
        .expect("connect timed out")
        .expect("connect failed");
    ws
}

async fn send(ws: &mut WsStream, name: &str, data: Value) {
    let text = json!({"name": name, "data": data}).to_string();
    ws.send(Message::text(text)).await.unwrap();
}

/// Read the next text frame as JSON, skipping control frames.
async fn read_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for message")
            .expect("stream ended")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Assert that no text frame arrives within `wait`.
async fn assert_quiet(ws: &mut WsStream, wait: Duration) {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        match tokio::time::timeout_at(deadline, ws.next()).await {
            Err(_) => return,
            Ok(Some(Ok(Message::Text(text)))) => panic!("unexpected message: {text}"),
            Ok(Some(Ok(_))) => {}
            Ok(other) => panic!("socket ended early: {other:?}"),
        }
    }
}

async fn wait_for_connections(server: &HuddleServer, expected: usize) {
    timeout(TIMEOUT, async {
        while server.connection_count() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection count never settled");
}

#[tokio::test]
async fn channel_subscription_streams_changes_until_unsubscribed() {
    let (url, server) = boot_server().await;
    let mut ws = connect(&url).await;

    send(&mut ws, "channel subscribe", json!({})).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let store = server.context().store.clone();
    let _ = store
        .insert("channel", json!({"id": "c1", "name": "general"}))
        .await
        .unwrap();
    let msg = read_json(&mut ws).await;
    assert_eq!(msg, json!({"name": "channel add", "data": {"id": "c1", "name": "general"}}));

    store
        .update("channel", "c1", json!({"name": "random"}))
        .await
        .unwrap();
    let msg = read_json(&mut ws).await;
    assert_eq!(msg["name"], "channel edit");
    assert_eq!(msg["data"]["name"], "random");

    send(&mut ws, "channel unsubscribe", json!({})).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let _ = store
        .insert("channel", json!({"id": "c2", "name": "late"}))
        .await
        .unwrap();
    assert_quiet(&mut ws, Duration::from_millis(200)).await;
}

#[tokio::test]
async fn added_channel_reaches_every_subscriber() {
    let (url, _server) = boot_server().await;
    let mut alice = connect(&url).await;
    let mut bob = connect(&url).await;

    send(&mut alice, "channel subscribe", json!({})).await;
    send(&mut bob, "channel subscribe", json!({})).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    send(&mut alice, "channel add", json!({"name": "general"})).await;

    for ws in [&mut alice, &mut bob] {
        let msg = read_json(ws).await;
        assert_eq!(msg["name"], "channel add");
        assert_eq!(msg["data"]["name"], "general");
        assert!(msg["data"]["id"].is_string());
    }
}

#[tokio::test]
async fn message_subscription_is_scoped_to_channel() {
    let (url, _server) = boot_server().await;
    let mut ws = connect(&url).await;

    send(&mut ws, "message subscribe", json!({"channelId": "c1"})).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    send(&mut ws, "message add", json!({"channelId": "c2", "body": "elsewhere"})).await;
    send(&mut ws, "message add", json!({"channelId": "c1", "body": "hello"})).await;

    let msg = read_json(&mut ws).await;
    assert_eq!(msg["name"], "message add");
    assert_eq!(msg["data"]["body"], "hello");
    assert_quiet(&mut ws, Duration::from_millis(150)).await;
}

#[tokio::test]
async fn unknown_command_then_valid_command() {
    let (url, _server) = boot_server().await;
    let mut ws = connect(&url).await;

    send(&mut ws, "channel explode", json!({})).await;
    assert_eq!(read_json(&mut ws).await, json!({"name": "error", "data": "unknown command"}));

    send(&mut ws, "check login", json!({})).await;
    assert_eq!(
        read_json(&mut ws).await,
        json!({"name": "check login", "data": "Not logged in"})
    );
}

#[tokio::test]
async fn malformed_frame_keeps_connection_open() {
    let (url, _server) = boot_server().await;
    let mut ws = connect(&url).await;

    ws.send(Message::text("{not json")).await.unwrap();
    let msg = read_json(&mut ws).await;
    assert_eq!(msg["name"], "error");
    assert!(msg["data"].as_str().unwrap().starts_with("invalid envelope"));

    send(&mut ws, "channel add", json!({})).await;
    assert_eq!(
        read_json(&mut ws).await,
        json!({"name": "error", "data": "Missing required field: name"})
    );
}

#[tokio::test]
async fn signup_then_check_login_on_same_connection() {
    let (url, server) = boot_server().await;
    let mut ws = connect(&url).await;

    send(&mut ws, "google signup", json!({"auth_service_id": "g-42", "name": "Ada Lovelace"})).await;
    let msg = read_json(&mut ws).await;
    assert_eq!(msg["name"], "check login");
    assert_eq!(msg["data"]["name"], "Ada Lovelace");

    send(&mut ws, "check login", json!({"auth_service_id": "g-42"})).await;
    let msg = read_json(&mut ws).await;
    assert_eq!(msg["data"]["name"], "Ada Lovelace");

    let users = server
        .context()
        .store
        .filter("user", huddle_store::Predicate::eq("auth_service_id", json!("g-42")))
        .await
        .unwrap();
    assert_eq!(users.len(), 1);
}

#[tokio::test]
async fn health_counts_live_sockets() {
    let (url, server) = boot_server().await;
    let health_url = url.replacen("ws://", "http://", 1).replacen("/chat", "/health", 1);

    let ws = connect(&url).await;
    wait_for_connections(&server, 1).await;
    let body: Value = reqwest::get(&health_url).await.unwrap().json().await.unwrap();
    assert_eq!(body["connections"], 1);

    drop(ws);
    wait_for_connections(&server, 0).await;
}

#[tokio::test]
async fn shutdown_closes_open_sockets() {
    let (url, server) = boot_server().await;
    let mut ws = connect(&url).await;
    wait_for_connections(&server, 1).await;

    server.shutdown().shutdown();

    let ended = timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                None | Some(Err(_) | Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "socket stayed open after shutdown");
    wait_for_connections(&server, 0).await;
}

//! Shared test harness: a real server on an ephemeral port, driven over
//! real HTTP and WebSocket clients.

use banter_server::{app, config::Config, db, AppState};
use futures_util::StreamExt;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub http: reqwest::Client,
    _db_dir: tempfile::TempDir,
}

impl TestServer {
    /// Boot a server with a fresh database on an ephemeral port.
    pub async fn spawn() -> Self {
        let db_dir = tempfile::tempdir().expect("create temp dir");
        let mut config = Config::default();
        config.database.path = db_dir.path().join("banter.db").display().to_string();
        config.metrics.enabled = false;

        let pool = db::connect(&config).await.expect("open database");
        let state = Arc::new(AppState::new(config, pool));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app(state)).await.expect("serve");
        });

        Self {
            addr,
            http: reqwest::Client::new(),
            _db_dir: db_dir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    pub async fn post_json(&self, path: &str, body: Value) -> (u16, Value) {
        let resp = self
            .http
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .expect("send request");
        let status = resp.status().as_u16();
        let value = resp.json().await.expect("parse response body");
        (status, value)
    }

    pub async fn get_json(&self, path: &str) -> (u16, Value) {
        let resp = self
            .http
            .get(self.url(path))
            .send()
            .await
            .expect("send request");
        let status = resp.status().as_u16();
        let value = resp.json().await.expect("parse response body");
        (status, value)
    }

    /// Register a user and return its id.
    pub async fn register_user(&self, name: &str, role: Option<&str>) -> String {
        let mut body = json!({"name": name, "password": "pass123"});
        if let Some(role) = role {
            body["role"] = json!(role);
        }
        let (status, user) = self.post_json("/api/v1/users/register", body).await;
        assert_eq!(status, 200, "register {name}: {user}");
        user["id"].as_str().expect("user id").to_string()
    }

    /// Create a channel as an admin and return its id.
    pub async fn create_channel(&self, name: &str, admin_id: &str) -> String {
        let (status, channel) = self
            .post_json(
                &format!("/api/v1/channels?user_id={admin_id}"),
                json!({"name": name}),
            )
            .await;
        assert_eq!(status, 200, "create channel {name}: {channel}");
        channel["id"].as_str().expect("channel id").to_string()
    }

    pub async fn join_channel(&self, channel_id: &str, user_id: &str) {
        let (status, body) = self
            .post_json(
                &format!("/api/v1/channels/{channel_id}/join?user_id={user_id}"),
                json!({}),
            )
            .await;
        assert_eq!(status, 200, "join channel: {body}");
    }

    pub async fn connect_channel(&self, channel_id: &str, user_id: &str) -> WsClient {
        let (ws, _) = connect_async(self.ws_url(&format!(
            "/api/v1/ws/channels/{channel_id}/{user_id}"
        )))
        .await
        .expect("channel websocket connect");
        ws
    }

    pub async fn connect_peer(&self, user_id: &str) -> WsClient {
        let (ws, _) = connect_async(self.ws_url(&format!("/api/v1/ws/{user_id}")))
            .await
            .expect("peer websocket connect");
        ws
    }
}

/// Receive the next text frame as JSON, skipping transport-level frames.
pub async fn recv_frame(ws: &mut WsClient) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        match msg {
            Message::Text(text) => return serde_json::from_str(&text).expect("frame is JSON"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Assert no text frame arrives within the window.
pub async fn assert_silent(ws: &mut WsClient, window: Duration) {
    match tokio::time::timeout(window, ws.next()).await {
        Err(_) => {}
        Ok(Some(Ok(Message::Text(text)))) => panic!("unexpected frame: {text}"),
        Ok(_) => {}
    }
}

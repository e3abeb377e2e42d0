#![allow(dead_code)]

use std::time::Duration;

use axum::body::Body;
use codecollab::gateway::heartbeat::HeartbeatConfig;
use codecollab::routes;
use codecollab::state::AppState;
use codecollab::store::SessionStore;
use futures_util::{SinkExt, StreamExt};
use http::{Method, Request};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Test server that owns an isolated session store and full AppState.
/// Each instance is independent, so tests can run in parallel.
pub struct TestServer {
    pub state: AppState,
}

impl TestServer {
    pub fn new() -> Self {
        Self::with_heartbeat(HeartbeatConfig::default())
    }

    /// Server with custom heartbeat timings, for timeout tests.
    pub fn with_heartbeat(heartbeat: HeartbeatConfig) -> Self {
        let state = AppState::new(SessionStore::default(), heartbeat);
        Self { state }
    }

    /// Returns an Axum Router wired to this server's state for `oneshot()` calls.
    pub fn router(&self) -> axum::Router {
        routes::router(self.state.clone())
    }

    /// Binds a TCP listener on port 0, spawns the server, and returns the base URL.
    pub async fn spawn(&self) -> String {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("127.0.0.1:{}", addr.port())
    }

    /// Create a session directly in the store and return its id.
    pub fn create_session(&self) -> String {
        self.state.store().create(None, None).id
    }
}

// ---------------------------------------------------------------------------
// Request builder helpers
// ---------------------------------------------------------------------------

/// Build a request with no body.
pub fn request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Build a request with a JSON body.
pub fn json_request(method: Method, uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

/// Parse a response body into a `serde_json::Value`.
pub async fn parse_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ---------------------------------------------------------------------------
// Gateway helpers
// ---------------------------------------------------------------------------

/// Open a socket to a session's gateway and consume HELLO.
pub async fn connect(addr: &str, session_id: &str) -> (WsClient, serde_json::Value) {
    let (mut ws, _) = connect_async(format!("ws://{addr}/api/session/{session_id}/ws"))
        .await
        .unwrap();
    let hello = next_json(&mut ws).await;
    assert_eq!(hello["op"], 5, "expected HELLO, got {hello}");
    (ws, hello)
}

/// Connect and JOIN under `name`. Returns the socket and the READY data.
pub async fn join(addr: &str, session_id: &str, name: &str) -> (WsClient, serde_json::Value) {
    let (mut ws, _) = connect(addr, session_id).await;
    send_json(&mut ws, serde_json::json!({ "op": 2, "data": { "name": name } })).await;
    let ready = next_json(&mut ws).await;
    assert_eq!(ready["op"], 3, "expected READY, got {ready}");
    (ws, ready["data"].clone())
}

pub async fn send_json(ws: &mut WsClient, value: serde_json::Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

/// Next text frame as JSON. Panics if none arrives within two seconds.
pub async fn next_json(ws: &mut WsClient) -> serde_json::Value {
    try_next_json(ws, Duration::from_secs(2))
        .await
        .expect("timed out waiting for a frame")
}

/// Next text frame as JSON, or `None` if nothing arrives within `wait`.
pub async fn try_next_json(ws: &mut WsClient, wait: Duration) -> Option<serde_json::Value> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let msg = tokio::time::timeout_at(deadline, ws.next()).await.ok()??;
        match msg.ok()? {
            Message::Text(text) => return Some(serde_json::from_str(&text).unwrap()),
            Message::Close(_) => return None,
            _ => continue,
        }
    }
}

/// Next EVENT frame of the given type, skipping other events.
pub async fn next_event(ws: &mut WsClient, event_type: &str) -> serde_json::Value {
    loop {
        let frame = next_json(ws).await;
        if frame["op"] == 0 && frame["type"] == event_type {
            return frame;
        }
    }
}

/// Creates a test app backed by a fresh server.
pub fn test_app() -> axum::Router {
    TestServer::new().router()
}

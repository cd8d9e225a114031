//! Test helpers for integration tests
//!
//! `MockServer` serves a scripted WebSocket gateway at `/` and a minimal REST
//! API under `/api/v10`. Every accepted WebSocket connection is handed to the
//! test as a [`MockConnection`] that sends server frames and observes what
//! the client writes.

use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use discobra_common::{ClientConfig, ReconnectConfig};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Token the mock REST API accepts
pub const TEST_TOKEN: &str = "test-token";

/// Default wait for something the client should do promptly
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// What the client sent over the socket
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    Json(Value),
    Close(Option<u16>),
}

impl ClientFrame {
    /// Opcode of a JSON frame
    pub fn op(&self) -> Option<u64> {
        match self {
            Self::Json(value) => value.get("op").and_then(Value::as_u64),
            Self::Close(_) => None,
        }
    }
}

enum ServerFrame {
    Json(Value),
    Close(u16, String),
}

/// One accepted gateway connection
pub struct MockConnection {
    pub query: HashMap<String, String>,
    to_client: mpsc::UnboundedSender<ServerFrame>,
    from_client: mpsc::UnboundedReceiver<ClientFrame>,
}

impl MockConnection {
    /// Whether the client asked for zlib-stream compression
    pub fn compressed(&self) -> bool {
        self.query.get("compress").map(String::as_str) == Some("zlib-stream")
    }

    pub fn send(&self, payload: Value) {
        let _ = self.to_client.send(ServerFrame::Json(payload));
    }

    /// Close from the server side with a gateway close code
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.to_client.send(ServerFrame::Close(code, reason.to_string()));
    }

    /// Next frame from the client, or `None` if nothing arrives within `wait`
    pub async fn next_within(&mut self, wait: Duration) -> Option<ClientFrame> {
        tokio::time::timeout(wait, self.from_client.recv())
            .await
            .ok()
            .flatten()
    }

    /// Wait for the next frame
    pub async fn next(&mut self) -> Result<ClientFrame> {
        self.next_within(STEP_TIMEOUT)
            .await
            .ok_or_else(|| anyhow!("client sent nothing within {STEP_TIMEOUT:?}"))
    }

    /// Wait for a JSON message with opcode `op`, skipping heartbeats
    pub async fn expect_op(&mut self, op: u64) -> Result<Value> {
        loop {
            match self.next().await? {
                ClientFrame::Json(value) if value["op"] == op => return Ok(value),
                ClientFrame::Json(value) if value["op"] == 1 => {}
                other => bail!("expected op {op}, got {other:?}"),
            }
        }
    }

    /// Wait for a heartbeat and return the sequence it carries
    pub async fn expect_heartbeat(&mut self) -> Result<Value> {
        match self.next().await? {
            ClientFrame::Json(value) if value["op"] == 1 => Ok(value["d"].clone()),
            other => bail!("expected heartbeat, got {other:?}"),
        }
    }

    /// Wait for a close frame, skipping any other traffic
    pub async fn expect_close(&mut self) -> Result<Option<u16>> {
        loop {
            if let ClientFrame::Close(code) = self.next().await? {
                return Ok(code);
            }
        }
    }

    /// Send Hello and expect Identify or Resume as the very next frame
    pub async fn handshake(&mut self, heartbeat_interval_ms: u64) -> Result<Value> {
        self.send(crate::fixtures::hello(heartbeat_interval_ms));
        match self.next().await? {
            ClientFrame::Json(value) if value["op"] == 2 || value["op"] == 6 => Ok(value),
            other => bail!("expected Identify or Resume, got {other:?}"),
        }
    }
}

struct MockState {
    connections: mpsc::UnboundedSender<MockConnection>,
    profile: Value,
    profile_requests: AtomicUsize,
}

/// Test server instance that manages lifecycle
pub struct MockServer {
    pub addr: SocketAddr,
    state: Arc<MockState>,
    connections: Mutex<mpsc::UnboundedReceiver<MockConnection>>,
    _handle: JoinHandle<()>,
}

impl MockServer {
    /// Start a mock server whose `/users/@me` returns a default bot profile
    pub async fn start() -> Result<Self> {
        Self::start_with_profile(json!({
            "id": "1",
            "username": "mock-bot",
            "discriminator": "0",
            "bot": true
        }))
        .await
    }

    pub async fn start_with_profile(profile: Value) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(MockState {
            connections: tx,
            profile,
            profile_requests: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/", get(gateway_handler))
            .route("/api/v10/users/@me", get(current_user_handler))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
        let addr = listener.local_addr()?;

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Ok(Self {
            addr,
            state,
            connections: Mutex::new(rx),
            _handle: handle,
        })
    }

    pub fn gateway_url(&self) -> String {
        format!("ws://{}/", self.addr)
    }

    pub fn api_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    /// Client configuration pointed at this server, uncompressed, fast backoff
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_token(TEST_TOKEN)
            .with_gateway_url(self.gateway_url())
            .with_api_base_url(self.api_url())
            .with_compression(false)
            .with_reconnect(ReconnectConfig {
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(50),
                max_attempts: Some(5),
            })
    }

    /// Wait for the client's next WebSocket connection
    pub async fn accept(&self) -> Result<MockConnection> {
        self.accept_within(STEP_TIMEOUT).await
    }

    pub async fn accept_within(&self, wait: Duration) -> Result<MockConnection> {
        let mut rx = self.connections.lock().await;
        tokio::time::timeout(wait, rx.recv())
            .await
            .map_err(|_| anyhow!("no connection within {wait:?}"))?
            .ok_or_else(|| anyhow!("mock server stopped"))
    }

    /// Number of `GET /users/@me` requests served
    pub fn profile_requests(&self) -> usize {
        self.state.profile_requests.load(Ordering::SeqCst)
    }
}

async fn gateway_handler(
    State(state): State<Arc<MockState>>,
    Query(query): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, query, socket))
}

async fn handle_socket(state: Arc<MockState>, query: HashMap<String, String>, socket: WebSocket) {
    let (to_client, mut outgoing) = mpsc::unbounded_channel::<ServerFrame>();
    let (incoming, from_client) = mpsc::unbounded_channel::<ClientFrame>();
    let connection = MockConnection {
        query,
        to_client,
        from_client,
    };
    let compressed = connection.compressed();
    if state.connections.send(connection).is_err() {
        return;
    }

    let (mut sink, mut stream) = socket.split();

    let send_task = tokio::spawn(async move {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        while let Some(frame) = outgoing.recv().await {
            let message = match frame {
                ServerFrame::Json(value) if compressed => {
                    let bytes = compress_chunk(&mut encoder, value.to_string().as_bytes());
                    // Split in two frames so the client has to reassemble
                    let (head, tail) = bytes.split_at(bytes.len() / 2);
                    if sink.send(Message::Binary(head.to_vec())).await.is_err() {
                        break;
                    }
                    Message::Binary(tail.to_vec())
                }
                ServerFrame::Json(value) => Message::Text(value.to_string()),
                ServerFrame::Close(code, reason) => {
                    let _ = sink
                        .send(Message::Close(Some(axum::extract::ws::CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            };
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => {
                if let Ok(value) = serde_json::from_str::<Value>(&text) {
                    let _ = incoming.send(ClientFrame::Json(value));
                }
            }
            Message::Close(frame) => {
                let _ = incoming.send(ClientFrame::Close(frame.map(|f| f.code)));
                break;
            }
            _ => {}
        }
    }

    send_task.abort();
}

/// Compress one message onto the shared stream, ending in a sync flush
fn compress_chunk(encoder: &mut ZlibEncoder<Vec<u8>>, data: &[u8]) -> Vec<u8> {
    encoder.write_all(data).ok();
    encoder.flush().ok();
    std::mem::take(encoder.get_mut())
}

async fn current_user_handler(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bot {TEST_TOKEN}"));

    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"code": 0, "message": "401: Unauthorized"})),
        );
    }

    state.profile_requests.fetch_add(1, Ordering::SeqCst);
    (StatusCode::OK, Json(state.profile.clone()))
}

/// Poll `check` until it holds or `STEP_TIMEOUT` elapses
pub async fn eventually<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + STEP_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

//! Gateway end-to-end tests
//!
//! Each test runs a real `Client` against the in-process mock server.
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use discobra_common::ClientConfig;
use discobra_core::{Guild, Intents, Snowflake, User};
use discobra_gateway::protocol::CloseCode;
use discobra_gateway::{Client, GatewayError, GatewayResult, HandlerError, SessionStage};
use integration_tests::{
    dispatch, eventually, guild_create, heartbeat_ack, heartbeat_request, invalid_session,
    message_create, ready, reconnect, ClientFrame, MockConnection, MockServer, SESSION_ID,
    STEP_TIMEOUT, TEST_TOKEN,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

fn spawn_client(client: &Arc<Client>) -> JoinHandle<GatewayResult<()>> {
    let client = Arc::clone(client);
    tokio::spawn(async move { client.run(TEST_TOKEN).await })
}

async fn wait_ready(client: &Client) -> SessionStage {
    tokio::time::timeout(STEP_TIMEOUT, client.wait_until_ready())
        .await
        .expect("client did not become ready")
}

/// Accept a connection, identify and deliver READY with sequence 5
async fn ready_connection(server: &MockServer, client: &Client) -> MockConnection {
    let mut conn = server.accept().await.unwrap();
    let identify = conn.handshake(45_000).await.unwrap();
    assert_eq!(identify["op"], 2);
    conn.send(ready(5, &server.gateway_url()));
    assert_eq!(wait_ready(client).await, SessionStage::Ready);
    conn
}

/// Ask the client for an immediate heartbeat and return the sequence it carries
async fn heartbeat_sequence(conn: &mut MockConnection) -> Value {
    conn.send(heartbeat_request());
    match conn.next().await.unwrap() {
        ClientFrame::Json(value) => {
            assert_eq!(value["op"], 1);
            value["d"].clone()
        }
        other => panic!("expected heartbeat, got {other:?}"),
    }
}

/// Collect every stage change published after this call
fn record_stages(client: &Client) -> Arc<StdMutex<Vec<SessionStage>>> {
    let stages = Arc::new(StdMutex::new(Vec::new()));
    let mut rx = client.subscribe_stage();
    let sink = Arc::clone(&stages);
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let stage = *rx.borrow_and_update();
            sink.lock().unwrap().push(stage);
        }
    });
    stages
}

async fn join(handle: JoinHandle<GatewayResult<()>>) -> GatewayResult<()> {
    tokio::time::timeout(STEP_TIMEOUT, handle)
        .await
        .expect("client did not stop")
        .expect("client task panicked")
}

// ============================================================================
// Handshake
// ============================================================================

#[tokio::test]
async fn test_hello_then_identify() {
    let server = MockServer::start().await.unwrap();
    let client = Arc::new(Client::new(server.client_config()));
    let _run = spawn_client(&client);

    let mut conn = server.accept().await.unwrap();
    assert_eq!(conn.query.get("v").map(String::as_str), Some("10"));
    assert_eq!(conn.query.get("encoding").map(String::as_str), Some("json"));
    assert!(!conn.compressed());

    // Nothing is sent before Hello
    assert!(conn.next_within(Duration::from_millis(200)).await.is_none());

    let identify = conn.handshake(1_000).await.unwrap();
    assert_eq!(identify["op"], 2);
    assert_eq!(identify["d"]["token"], TEST_TOKEN);
    assert_eq!(identify["d"]["intents"], Intents::default().bits());
    assert_eq!(identify["d"]["properties"]["browser"], "discobra");
    assert_eq!(client.stage(), SessionStage::Identifying);

    // First pulse only after a full interval
    assert!(conn.next_within(Duration::from_millis(700)).await.is_none());
    let beat = conn.next_within(Duration::from_millis(1_500)).await.unwrap();
    assert_eq!(beat, ClientFrame::Json(json!({"op": 1, "d": null})));
}

#[tokio::test]
async fn test_ready_seeds_session_and_cache() {
    let server = MockServer::start().await.unwrap();
    let client = Arc::new(Client::new(server.client_config()));
    let _run = spawn_client(&client);

    let mut conn = ready_connection(&server, &client).await;

    let me = client.cache().current_user().unwrap();
    assert_eq!(me.id, Snowflake::new(1));
    let stub = client.cache().get::<Guild>(Snowflake::new(42)).unwrap();
    assert!(stub.unavailable);

    assert_eq!(heartbeat_sequence(&mut conn).await, 5);
}

#[tokio::test]
async fn test_sequence_never_decreases() {
    let server = MockServer::start().await.unwrap();
    let client = Arc::new(Client::new(server.client_config()));
    let _run = spawn_client(&client);

    let mut conn = ready_connection(&server, &client).await;

    conn.send(dispatch("TYPING_START", 3, json!({})));
    assert_eq!(heartbeat_sequence(&mut conn).await, 5);

    conn.send(dispatch("TYPING_START", 9, json!({})));
    assert_eq!(heartbeat_sequence(&mut conn).await, 9);
}

#[tokio::test]
async fn test_heartbeat_ack_records_latency() {
    let server = MockServer::start().await.unwrap();
    let client = Arc::new(Client::new(server.client_config()));
    let _run = spawn_client(&client);

    let mut conn = server.accept().await.unwrap();
    conn.handshake(100).await.unwrap();
    assert_eq!(conn.expect_heartbeat().await.unwrap(), Value::Null);
    conn.send(heartbeat_ack());

    assert!(eventually(|| client.latency().is_some()).await);
}

// ============================================================================
// Dispatch
// ============================================================================

#[tokio::test]
async fn test_handlers_receive_events() {
    let server = MockServer::start().await.unwrap();
    let client = Arc::new(Client::new(server.client_config()));

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.on("on_message_create", move |event| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(event);
            Ok(())
        }
    });
    client.on("message_create", |_event| async { Err(HandlerError::msg("always fails")) });
    client.on("MESSAGE_CREATE", |_event| async {
        if true {
            panic!("handler panic");
        }
        Ok(())
    });

    let _run = spawn_client(&client);
    let mut conn = ready_connection(&server, &client).await;

    conn.send(dispatch("TOTALLY_UNKNOWN", 6, json!({"x": 1})));
    conn.send(message_create(7, "hello"));
    conn.send(message_create(8, "again"));

    let mut events = Vec::new();
    for _ in 0..2 {
        events.push(tokio::time::timeout(STEP_TIMEOUT, rx.recv()).await.unwrap().unwrap());
    }
    events.sort_by_key(|event| event.sequence);

    assert_eq!(events[0].name, "MESSAGE_CREATE");
    assert_eq!(events[0].sequence, Some(7));
    assert_eq!(events[0].data["content"], "hello");

    // Failing and panicking handlers do not stop later events
    assert_eq!(events[1].data["content"], "again");
    assert_eq!(heartbeat_sequence(&mut conn).await, 8);
    assert_eq!(client.stage(), SessionStage::Ready);
}

#[tokio::test]
async fn test_guild_create_updates_cache_before_handlers() {
    let server = MockServer::start().await.unwrap();
    let client = Arc::new(Client::new(server.client_config()));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let cache = Arc::clone(client.cache());
    client.on("guild_create", move |event| {
        let tx = tx.clone();
        let cache = Arc::clone(&cache);
        async move {
            let guild: Guild = event.decode("guild")?;
            let _ = tx.send(cache.get::<Guild>(guild.id).map(|g| g.name));
            Ok::<(), HandlerError>(())
        }
    });

    let _run = spawn_client(&client);
    let conn = ready_connection(&server, &client).await;
    conn.send(guild_create(6, "42", "mock guild"));

    let seen = tokio::time::timeout(STEP_TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(seen.as_deref(), Some("mock guild"));

    let guild = client.cache().get::<Guild>(Snowflake::new(42)).unwrap();
    assert!(!guild.unavailable);
    assert!(guild.channel(Snowflake::new(100)).is_some());
    assert_eq!(client.cache().get::<User>(Snowflake::new(7)).unwrap().username, "member");

    conn.send(dispatch("GUILD_DELETE", 7, json!({"id": "42"})));
    assert!(eventually(|| client.cache().get::<Guild>(Snowflake::new(42)).is_none()).await);
}

#[tokio::test]
async fn test_current_user_refreshed_over_rest() {
    let server = MockServer::start_with_profile(json!({
        "id": "1",
        "username": "full-profile",
        "verified": true
    }))
    .await
    .unwrap();
    let client = Arc::new(Client::new(server.client_config()));
    let _run = spawn_client(&client);

    let _conn = ready_connection(&server, &client).await;

    assert!(
        eventually(|| {
            client
                .cache()
                .current_user()
                .is_some_and(|u| u.username == "full-profile")
        })
        .await
    );
    assert_eq!(server.profile_requests(), 1);
    assert_eq!(client.cache().current_user().unwrap().verified, Some(true));
}

// ============================================================================
// Recovery
// ============================================================================

#[tokio::test]
async fn test_reconnect_request_resumes() {
    let server = MockServer::start().await.unwrap();
    let client = Arc::new(Client::new(server.client_config()));
    let _run = spawn_client(&client);

    // Short interval so a leftover heartbeat task would show up on the new socket
    let mut conn = server.accept().await.unwrap();
    assert_eq!(conn.handshake(100).await.unwrap()["op"], 2);
    conn.send(ready(5, &server.gateway_url()));
    assert_eq!(wait_ready(&client).await, SessionStage::Ready);
    assert_eq!(conn.expect_heartbeat().await.unwrap(), 5);
    conn.send(heartbeat_ack());

    let stages = record_stages(&client);
    conn.send(reconnect());
    assert_eq!(conn.expect_close().await.unwrap(), Some(CloseCode::RESUMABLE_CLOSE));

    // Nothing is sent on the new connection before Hello
    let mut resumed = server.accept().await.unwrap();
    assert!(resumed.next_within(Duration::from_millis(300)).await.is_none());

    let resume = resumed.handshake(45_000).await.unwrap();
    assert_eq!(resume["op"], 6);
    assert_eq!(resume["d"]["token"], TEST_TOKEN);
    assert_eq!(resume["d"]["session_id"], SESSION_ID);
    assert_eq!(resume["d"]["seq"], 5);
    assert_eq!(client.stage(), SessionStage::Resuming);

    resumed.send(dispatch("RESUMED", 6, Value::Null));
    assert_eq!(wait_ready(&client).await, SessionStage::Ready);
    assert_eq!(heartbeat_sequence(&mut resumed).await, 6);

    // The old connection is gone and stays silent
    assert!(conn.next_within(Duration::from_millis(100)).await.is_none());

    let stages = stages.lock().unwrap().clone();
    assert_eq!(stages.first(), Some(&SessionStage::Closing));
    assert!(stages.contains(&SessionStage::Resuming));
}

#[tokio::test]
async fn test_failed_connection_passes_through_closing() {
    let server = MockServer::start().await.unwrap();
    let client = Arc::new(Client::new(server.client_config()));
    let _run = spawn_client(&client);

    let mut conn = ready_connection(&server, &client).await;
    let stages = record_stages(&client);
    conn.close(4000, "Unknown error");

    let mut retry = server.accept().await.unwrap();
    assert_eq!(retry.handshake(45_000).await.unwrap()["op"], 6);
    let stages = stages.lock().unwrap().clone();
    assert_eq!(stages.first(), Some(&SessionStage::Closing));
}

#[tokio::test]
async fn test_invalid_session_reidentifies() {
    let server = MockServer::start().await.unwrap();
    let client = Arc::new(Client::new(server.client_config()));
    let _run = spawn_client(&client);

    let mut conn = ready_connection(&server, &client).await;
    conn.send(invalid_session(false));
    assert_eq!(conn.expect_close().await.unwrap(), Some(CloseCode::RESUMABLE_CLOSE));

    // Re-identify waits one to five seconds
    let mut fresh = server.accept_within(Duration::from_secs(10)).await.unwrap();
    let identify = fresh.handshake(45_000).await.unwrap();
    assert_eq!(identify["op"], 2);
    assert_eq!(heartbeat_sequence(&mut fresh).await, Value::Null);
}

#[tokio::test]
async fn test_first_message_must_be_hello() {
    let server = MockServer::start().await.unwrap();
    let client = Arc::new(Client::new(server.client_config()));
    let _run = spawn_client(&client);

    let mut conn = server.accept().await.unwrap();
    conn.send(heartbeat_ack());
    assert_eq!(conn.expect_close().await.unwrap(), Some(CloseCode::RESUMABLE_CLOSE));

    let mut retry = server.accept().await.unwrap();
    let identify = retry.handshake(45_000).await.unwrap();
    assert_eq!(identify["op"], 2);
}

#[tokio::test]
async fn test_missed_ack_reconnects() {
    let server = MockServer::start().await.unwrap();
    let client = Arc::new(Client::new(server.client_config()));
    let _run = spawn_client(&client);

    let mut conn = server.accept().await.unwrap();
    conn.handshake(200).await.unwrap();
    conn.expect_heartbeat().await.unwrap();

    // No ACK: the next tick tears the connection down
    assert_eq!(conn.expect_close().await.unwrap(), Some(CloseCode::RESUMABLE_CLOSE));

    let mut retry = server.accept().await.unwrap();
    assert_eq!(retry.handshake(45_000).await.unwrap()["op"], 2);
}

#[tokio::test]
async fn test_authentication_failure_is_fatal() {
    let server = MockServer::start().await.unwrap();
    let client = Arc::new(Client::new(server.client_config()));
    let run = spawn_client(&client);

    let mut conn = server.accept().await.unwrap();
    conn.handshake(45_000).await.unwrap();
    conn.close(4004, "Authentication failed.");

    let err = join(run).await.unwrap_err();
    assert_eq!(err.close_code(), Some(CloseCode::AuthenticationFailed));
    assert_eq!(client.stage(), SessionStage::Closed);
    assert!(server.accept_within(Duration::from_millis(200)).await.is_err());
}

#[tokio::test]
async fn test_reconnect_limit() {
    let server = MockServer::start().await.unwrap();
    let mut config = server.client_config();
    config.reconnect.max_attempts = Some(1);
    let client = Arc::new(Client::new(config));
    let run = spawn_client(&client);

    for _ in 0..2 {
        let conn = server.accept().await.unwrap();
        conn.close(4000, "Unknown error");
    }

    let err = join(run).await.unwrap_err();
    assert!(matches!(err, GatewayError::ReconnectLimit { attempts: 1 }));
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_shutdown_closes_normally() {
    let server = MockServer::start().await.unwrap();
    let client = Arc::new(Client::new(server.client_config()));
    let run = spawn_client(&client);

    let mut conn = ready_connection(&server, &client).await;
    client.shutdown_handle().shutdown();

    assert_eq!(conn.expect_close().await.unwrap(), Some(CloseCode::NORMAL_CLOSE));
    join(run).await.unwrap();
    assert_eq!(client.stage(), SessionStage::Closed);
    assert!(!client.is_running());
}

#[tokio::test]
async fn test_shutdown_during_stalled_connect() {
    // Accepts TCP but never answers the WebSocket upgrade
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _stall = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let config = ClientConfig::default()
        .with_token(TEST_TOKEN)
        .with_gateway_url(format!("ws://{addr}/"))
        .with_compression(false);
    let client = Arc::new(Client::new(config));
    let run = spawn_client(&client);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(client.stage(), SessionStage::Connecting);
    client.shutdown_handle().shutdown();

    join(run).await.unwrap();
    assert_eq!(client.stage(), SessionStage::Closed);
    assert!(!client.is_running());
}

#[tokio::test]
async fn test_connect_timeout_retries() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (accepted, mut accepted_rx) = mpsc::unbounded_channel();
    let _stall = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
            let _ = accepted.send(());
        }
    });

    let server = MockServer::start().await.unwrap();
    let config = server
        .client_config()
        .with_gateway_url(format!("ws://{addr}/"))
        .with_timeouts(Duration::from_millis(150), Duration::from_secs(20));
    let client = Arc::new(Client::new(config));
    let run = spawn_client(&client);

    for _ in 0..2 {
        tokio::time::timeout(STEP_TIMEOUT, accepted_rx.recv())
            .await
            .expect("client did not retry the stalled connect")
            .unwrap();
    }

    client.shutdown_handle().shutdown();
    join(run).await.unwrap();
}

#[tokio::test]
async fn test_missing_hello_reconnects() {
    let server = MockServer::start().await.unwrap();
    let config = server
        .client_config()
        .with_timeouts(Duration::from_secs(10), Duration::from_millis(200));
    let client = Arc::new(Client::new(config));
    let _run = spawn_client(&client);

    let mut silent = server.accept().await.unwrap();
    assert_eq!(silent.expect_close().await.unwrap(), Some(CloseCode::RESUMABLE_CLOSE));

    let mut retry = server.accept().await.unwrap();
    assert_eq!(retry.handshake(45_000).await.unwrap()["op"], 2);
}

#[tokio::test]
async fn test_run_twice_is_rejected() {
    let server = MockServer::start().await.unwrap();
    let client = Arc::new(Client::new(server.client_config()));
    let _run = spawn_client(&client);

    let _conn = server.accept().await.unwrap();
    let err = client.run(TEST_TOKEN).await.unwrap_err();
    assert!(matches!(err, GatewayError::AlreadyRunning));
}

#[tokio::test]
async fn test_compressed_transport() {
    let server = MockServer::start().await.unwrap();
    let client = Arc::new(Client::new(server.client_config().with_compression(true)));
    let _run = spawn_client(&client);

    let mut conn = server.accept().await.unwrap();
    assert!(conn.compressed());

    let identify = conn.handshake(45_000).await.unwrap();
    assert_eq!(identify["op"], 2);

    conn.send(ready(5, &server.gateway_url()));
    assert_eq!(wait_ready(&client).await, SessionStage::Ready);
    conn.send(guild_create(6, "42", "compressed"));
    assert_eq!(heartbeat_sequence(&mut conn).await, 6);
    assert_eq!(
        client.cache().get::<Guild>(Snowflake::new(42)).map(|g| g.name),
        Some("compressed".to_string())
    );
}

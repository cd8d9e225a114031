//! Connection runner
//!
//! Drives one [`Session`] across connections: opens the socket, feeds
//! frames through the reassembler and the state machine, carries out the
//! resulting actions and decides how to reconnect when a connection ends.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use discobra_common::ClientConfig;
use discobra_rest::RestClient;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::cache::EntityCache;
use crate::connection::{
    compute_backoff, invalid_session_delay, with_jitter, Action, HeartbeatFailure,
    HeartbeatState, Heartbeater, Outbound, Session, SessionStage,
};
use crate::dispatch::Dispatcher;
use crate::error::{GatewayError, GatewayResult, Recovery};
use crate::events::GatewayEvent;
use crate::protocol::{CloseCode, Envelope, GatewayMessage, ReadyPayload};
use crate::transport::{Frame, FrameReassembler};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Channel buffer size for outgoing messages
const OUTBOUND_BUFFER_SIZE: usize = 64;

/// How long the writer may take to flush the close frame
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Why a connection ended
enum ConnectionEnd {
    Shutdown,
    Failed(GatewayError),
}

/// Per-connection resources; dropped when the connection ends
struct Connection {
    outgoing: mpsc::Sender<Outbound>,
    failures: mpsc::Sender<HeartbeatFailure>,
    reassembler: FrameReassembler,
    heartbeater: Option<Heartbeater>,
}

impl Connection {
    async fn send(&self, item: Outbound) -> GatewayResult<()> {
        self.outgoing
            .send(item)
            .await
            .map_err(|_| GatewayError::ConnectionClosed {
                code: None,
                reason: "writer stopped".to_string(),
            })
    }
}

pub(crate) struct Runner<'a> {
    pub(crate) config: &'a ClientConfig,
    pub(crate) dispatcher: &'a Arc<Dispatcher>,
    pub(crate) cache: &'a Arc<EntityCache>,
    pub(crate) heartbeat: &'a Arc<HeartbeatState>,
    pub(crate) rest: RestClient,
    pub(crate) session: Session,
    pub(crate) shutdown: watch::Receiver<bool>,
}

impl Runner<'_> {
    /// Reconnect loop; returns on shutdown or a fatal error
    pub(crate) async fn run(mut self) -> GatewayResult<()> {
        let mut attempt: u32 = 0;

        loop {
            if *self.shutdown.borrow() {
                self.session.close();
                return Ok(());
            }

            let plan = self.session.begin_connect();
            let base = plan.url.as_deref().unwrap_or(&self.config.gateway.url);
            let url = self.config.gateway.connect_url(base);
            tracing::info!(url = %url, resume = plan.resume, attempt, "Connecting to gateway");

            let err = match self.connect_once(&url).await {
                ConnectionEnd::Shutdown => {
                    self.session.close();
                    tracing::info!("Gateway client stopped");
                    return Ok(());
                }
                ConnectionEnd::Failed(err) => err,
            };

            if self.session.reached_ready() {
                attempt = 0;
            }
            let recovery = err.recovery();
            self.session.on_disconnect(recovery);

            if recovery == Recovery::Fatal {
                tracing::error!(error = %err, "Gateway connection failed permanently");
                return Err(err);
            }

            attempt += 1;
            if let Some(max) = self.config.reconnect.max_attempts {
                if attempt > max {
                    self.session.close();
                    tracing::error!(attempts = max, error = %err, "Giving up reconnecting");
                    return Err(GatewayError::ReconnectLimit { attempts: max });
                }
            }

            let delay = match err {
                GatewayError::SessionInvalidated { .. } => invalid_session_delay(),
                GatewayError::ReconnectRequested if attempt == 1 => Duration::ZERO,
                _ => with_jitter(compute_backoff(&self.config.reconnect, attempt)),
            };
            tracing::warn!(
                error = %err,
                recovery = ?recovery,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Gateway connection lost, reconnecting"
            );

            let mut shutdown = self.shutdown.clone();
            let stopped = tokio::select! {
                () = tokio::time::sleep(delay) => false,
                () = shutdown_requested(&mut shutdown) => true,
            };
            if stopped {
                self.session.close();
                return Ok(());
            }
        }
    }

    async fn connect_once(&mut self, url: &str) -> ConnectionEnd {
        let mut shutdown = self.shutdown.clone();
        let connect = tokio::time::timeout(self.config.gateway.connect_timeout, connect_async(url));
        let socket = tokio::select! {
            result = connect => match result {
                Ok(Ok((socket, _response))) => socket,
                Ok(Err(e)) => return ConnectionEnd::Failed(e.into()),
                Err(_) => {
                    return ConnectionEnd::Failed(GatewayError::Timeout {
                        stage: "WebSocket connect",
                    })
                }
            },
            () = shutdown_requested(&mut shutdown) => return ConnectionEnd::Shutdown,
        };
        self.session.on_connected();
        tracing::debug!("WebSocket connection established");

        let (sink, mut stream) = socket.split();
        let (outgoing, outgoing_rx) = mpsc::channel::<Outbound>(OUTBOUND_BUFFER_SIZE);
        let (failures, mut failures_rx) = mpsc::channel::<HeartbeatFailure>(1);
        let mut writer = tokio::spawn(write_loop(sink, outgoing_rx));

        let mut conn = Connection {
            outgoing,
            failures,
            reassembler: FrameReassembler::new(),
            heartbeater: None,
        };
        let hello_deadline = tokio::time::sleep(self.config.gateway.hello_timeout);
        tokio::pin!(hello_deadline);

        let end = loop {
            tokio::select! {
                message = stream.next() => {
                    let result = match message {
                        Some(Ok(message)) => self.on_message(message, &mut conn).await,
                        Some(Err(e)) => Err(e.into()),
                        None => Err(GatewayError::closed(None)),
                    };
                    if let Err(err) = result {
                        break ConnectionEnd::Failed(err);
                    }
                }
                Some(HeartbeatFailure) = failures_rx.recv() => {
                    break ConnectionEnd::Failed(GatewayError::HeartbeatTimeout);
                }
                () = &mut hello_deadline, if self.session.stage() == SessionStage::AwaitingHello => {
                    break ConnectionEnd::Failed(GatewayError::Timeout { stage: "Hello" });
                }
                () = shutdown_requested(&mut shutdown) => {
                    break ConnectionEnd::Shutdown;
                }
            }
        };

        self.teardown(conn, &mut writer, &end).await;
        end
    }

    /// Stop the heartbeat, close the socket and wait briefly for the writer
    async fn teardown(&mut self, mut conn: Connection, writer: &mut JoinHandle<()>, end: &ConnectionEnd) {
        if let Some(heartbeater) = conn.heartbeater.take() {
            tracing::debug!(
                interval_ms = heartbeater.interval().as_millis() as u64,
                finished = heartbeater.is_finished(),
                "Stopping heartbeat"
            );
            heartbeater.stop();
        }

        self.session.begin_close();
        let code = match end {
            ConnectionEnd::Shutdown => CloseCode::NORMAL_CLOSE,
            ConnectionEnd::Failed(_) => CloseCode::RESUMABLE_CLOSE,
        };
        let _ = conn.outgoing.try_send(Outbound::Close(code));
        drop(conn);

        if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut *writer).await.is_err() {
            tracing::debug!("Writer did not finish in time, aborting");
            writer.abort();
        }
    }

    async fn on_message(&mut self, message: Message, conn: &mut Connection) -> GatewayResult<()> {
        let frame = match message {
            Message::Text(text) => Frame::Text(text),
            Message::Binary(bytes) => Frame::Binary(bytes),
            Message::Close(frame) => return Err(GatewayError::closed(frame)),
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => return Ok(()),
        };

        let Some(text) = conn.reassembler.push(frame)? else {
            return Ok(());
        };
        let envelope = Envelope::decode(&text)?;
        tracing::trace!(op = envelope.op, seq = ?envelope.s, event = ?envelope.t, "Envelope received");

        for action in self.session.on_envelope(envelope)? {
            self.perform(action, conn).await?;
        }
        Ok(())
    }

    async fn perform(&mut self, action: Action, conn: &mut Connection) -> GatewayResult<()> {
        match action {
            Action::StartHeartbeat(interval) => {
                tracing::debug!(interval_ms = interval.as_millis() as u64, "Starting heartbeat");
                conn.heartbeater = Some(Heartbeater::spawn(
                    interval,
                    Arc::clone(self.heartbeat),
                    Arc::clone(self.session.sequence()),
                    conn.outgoing.clone(),
                    conn.failures.clone(),
                ));
            }
            Action::Send(message) => conn.send(Outbound::Message(message)).await?,
            Action::HeartbeatNow => {
                let seq = self.session.sequence().get();
                conn.send(Outbound::Message(GatewayMessage::heartbeat(seq)))
                    .await?;
            }
            Action::HeartbeatAcked => self.heartbeat.ack(),
            Action::Ready(ready) => self.on_ready(&ready),
            Action::Dispatch {
                event,
                sequence,
                data,
            } => {
                if let Some(kind) = GatewayEvent::from_name(&event).filter(|k| k.mutates_cache()) {
                    if let Err(e) = self.cache.apply(kind, &data) {
                        tracing::warn!(event = %event, error = %e, "Failed to apply event to cache");
                    }
                }
                let spawned = self.dispatcher.emit(&event, sequence, data);
                tracing::trace!(event = %event, seq = ?sequence, handlers = spawned, "Event dispatched");
            }
        }
        Ok(())
    }

    fn on_ready(&self, ready: &ReadyPayload) {
        self.cache.seed_ready(ready);

        let rest = self.rest.clone();
        let cache = Arc::clone(self.cache);
        tokio::spawn(async move {
            match rest.current_user().await {
                Ok(user) => {
                    tracing::debug!(user_id = %user.id, "Current user profile refreshed");
                    cache.set_current_user(user);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to refresh current user profile");
                }
            }
        });
    }
}

/// Resolves once shutdown is requested; never if the handle is gone
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Drain the outgoing queue into the socket until a close is requested
async fn write_loop(mut sink: WsSink, mut rx: mpsc::Receiver<Outbound>) {
    while let Some(item) = rx.recv().await {
        match item {
            Outbound::Message(message) => {
                let json = match message.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::warn!(op = %message.op, error = %e, "Failed to encode message");
                        continue;
                    }
                };
                tracing::trace!(op = %message.op, "Sending gateway message");
                if let Err(e) = sink.send(Message::Text(json)).await {
                    tracing::debug!(error = %e, "Failed to send message to WebSocket");
                    break;
                }
            }
            Outbound::Close(code) => {
                tracing::debug!(code, "Sending close frame");
                let frame = CloseFrame {
                    code: WsCloseCode::from(code),
                    reason: Cow::Borrowed(""),
                };
                let _ = sink.send(Message::Close(Some(frame))).await;
                break;
            }
        }
    }

    let _ = sink.close().await;
}

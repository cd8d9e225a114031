//! Session state machine
//!
//! Owns the session identity (token, session id, resume URL) and decides how
//! every inbound envelope moves the session forward. It performs no I/O:
//! each step returns [`Action`]s for the connection runner to carry out, or
//! the [`GatewayError`] that ends the current connection.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use discobra_core::Intents;
use serde_json::Value;
use tokio::sync::watch;

use super::Sequence;
use crate::error::{GatewayError, Recovery};
use crate::events::GatewayEvent;
use crate::protocol::{
    Envelope, GatewayMessage, HelloPayload, IdentifyPayload, IdentifyProperties, OpCode,
    ReadyPayload, ResumePayload,
};

/// Session lifecycle stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionStage {
    #[default]
    Disconnected,
    Connecting,
    /// Transport is up, no envelope processed yet
    AwaitingHello,
    /// Identify sent, waiting for READY
    Identifying,
    /// Resume sent, waiting for RESUMED
    Resuming,
    Ready,
    Closing,
    /// Terminal; the client stopped
    Closed,
}

impl SessionStage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AwaitingHello => "awaiting_hello",
            Self::Identifying => "identifying",
            Self::Resuming => "resuming",
            Self::Ready => "ready",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Work the connection runner must do after a session step
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Start (or restart) the heartbeat task
    StartHeartbeat(Duration),
    /// Queue a message for the writer
    Send(GatewayMessage),
    /// Server requested an immediate heartbeat
    HeartbeatNow,
    HeartbeatAcked,
    /// READY arrived; seed the cache with it
    Ready(Box<ReadyPayload>),
    /// Hand an event to the cache and the dispatcher
    Dispatch {
        event: String,
        sequence: Option<u64>,
        data: Value,
    },
}

/// How the next connection should be opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPlan {
    /// Send Resume instead of Identify after Hello
    pub resume: bool,
    /// Resume URL from READY, when resuming
    pub url: Option<String>,
}

/// Gateway session
pub struct Session {
    token: String,
    intents: Intents,
    properties: IdentifyProperties,
    stage: Arc<watch::Sender<SessionStage>>,
    sequence: Arc<Sequence>,
    session_id: Option<String>,
    resume_url: Option<String>,
    heartbeat_interval: Option<Duration>,
    resuming: bool,
    reached_ready: bool,
}

impl Session {
    /// Create a disconnected session publishing its stage through `stage`
    pub fn new(
        token: impl Into<String>,
        intents: Intents,
        properties: IdentifyProperties,
        stage: Arc<watch::Sender<SessionStage>>,
    ) -> Self {
        stage.send_replace(SessionStage::Disconnected);
        Self {
            token: token.into(),
            intents,
            properties,
            stage,
            sequence: Arc::new(Sequence::new()),
            session_id: None,
            resume_url: None,
            heartbeat_interval: None,
            resuming: false,
            reached_ready: false,
        }
    }

    pub fn stage(&self) -> SessionStage {
        *self.stage.borrow()
    }

    /// Sequence cell shared with the heartbeat task
    pub fn sequence(&self) -> &Arc<Sequence> {
        &self.sequence
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Interval from the last Hello on the current connection
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat_interval
    }

    /// Check if a session id and sequence are known
    pub fn can_resume(&self) -> bool {
        self.session_id.is_some() && self.sequence.get().is_some()
    }

    /// Check if the current connection reached `Ready`
    pub fn reached_ready(&self) -> bool {
        self.reached_ready
    }

    /// Start a new connection attempt
    pub fn begin_connect(&mut self) -> ConnectPlan {
        self.resuming = self.can_resume();
        self.reached_ready = false;
        self.heartbeat_interval = None;
        self.set_stage(SessionStage::Connecting);

        ConnectPlan {
            resume: self.resuming,
            url: if self.resuming {
                self.resume_url.clone()
            } else {
                None
            },
        }
    }

    /// Transport is open; the first envelope must be Hello
    pub fn on_connected(&mut self) {
        self.set_stage(SessionStage::AwaitingHello);
    }

    /// Process one inbound envelope
    pub fn on_envelope(&mut self, envelope: Envelope) -> Result<Vec<Action>, GatewayError> {
        if self.stage() == SessionStage::AwaitingHello && envelope.opcode() != Some(OpCode::Hello) {
            return Err(GatewayError::ProtocolViolation {
                expected: "Hello",
                received: format!("{} ({})", envelope.op_name(), envelope.op),
            });
        }

        let Some(op) = envelope.opcode() else {
            tracing::warn!(op = envelope.op, "Ignoring unknown op code");
            return Ok(Vec::new());
        };

        match op {
            OpCode::Hello => self.on_hello(envelope.d),
            OpCode::Dispatch => self.on_dispatch(envelope),
            OpCode::HeartbeatAck => Ok(vec![Action::HeartbeatAcked]),
            OpCode::Heartbeat => {
                tracing::debug!("Server requested heartbeat");
                Ok(vec![Action::HeartbeatNow])
            }
            OpCode::Reconnect => {
                tracing::info!("Server requested reconnect");
                self.set_stage(SessionStage::Closing);
                Err(GatewayError::ReconnectRequested)
            }
            OpCode::InvalidSession => {
                let resumable = envelope.d.as_ref().and_then(Value::as_bool).unwrap_or(false);
                tracing::warn!(
                    resumable,
                    session_id = ?self.session_id,
                    "Session invalidated"
                );
                self.set_stage(SessionStage::Closing);
                Err(GatewayError::SessionInvalidated { resumable })
            }
            OpCode::Identify
            | OpCode::PresenceUpdate
            | OpCode::VoiceStateUpdate
            | OpCode::Resume
            | OpCode::RequestGuildMembers => {
                tracing::warn!(op = %op, "Ignoring client-only op code from server");
                Ok(Vec::new())
            }
        }
    }

    /// Apply the recovery decided for a connection that ended
    pub fn on_disconnect(&mut self, recovery: Recovery) {
        self.heartbeat_interval = None;
        match recovery {
            Recovery::Resume => {}
            Recovery::Reidentify => self.invalidate(),
            Recovery::Fatal => {
                self.set_stage(SessionStage::Closed);
                return;
            }
        }
        self.set_stage(SessionStage::Disconnected);
    }

    /// Discard session identity so the next connection identifies from scratch
    pub fn invalidate(&mut self) {
        self.session_id = None;
        self.resume_url = None;
        self.sequence.reset();
    }

    pub fn begin_close(&mut self) {
        self.set_stage(SessionStage::Closing);
    }

    /// Permanent stop
    pub fn close(&mut self) {
        self.heartbeat_interval = None;
        self.set_stage(SessionStage::Closed);
    }

    fn set_stage(&self, next: SessionStage) {
        let previous = self.stage.send_replace(next);
        if previous != next {
            tracing::debug!(from = %previous, to = %next, "Session stage changed");
        }
    }

    fn on_hello(&mut self, data: Option<Value>) -> Result<Vec<Action>, GatewayError> {
        if self.stage() != SessionStage::AwaitingHello {
            tracing::warn!(stage = %self.stage(), "Ignoring repeated Hello");
            return Ok(Vec::new());
        }

        let hello: HelloPayload =
            serde_json::from_value(data.unwrap_or(Value::Null)).map_err(GatewayError::Decode)?;
        if hello.heartbeat_interval == 0 {
            return Err(GatewayError::ProtocolViolation {
                expected: "non-zero heartbeat interval",
                received: "0".to_string(),
            });
        }
        let interval = Duration::from_millis(hello.heartbeat_interval);
        self.heartbeat_interval = Some(interval);

        let message = match (self.resuming, self.session_id.clone(), self.sequence.get()) {
            (true, Some(session_id), Some(seq)) => {
                tracing::info!(session_id = %session_id, seq, "Resuming session");
                self.set_stage(SessionStage::Resuming);
                GatewayMessage::resume(&ResumePayload {
                    token: self.token.clone(),
                    session_id,
                    seq,
                })
            }
            _ => {
                tracing::info!(intents = %self.intents, "Identifying");
                self.set_stage(SessionStage::Identifying);
                GatewayMessage::identify(&IdentifyPayload {
                    token: self.token.clone(),
                    intents: self.intents,
                    properties: self.properties.clone(),
                })
            }
        }
        .map_err(GatewayError::Decode)?;

        Ok(vec![Action::StartHeartbeat(interval), Action::Send(message)])
    }

    fn on_dispatch(&mut self, envelope: Envelope) -> Result<Vec<Action>, GatewayError> {
        let sequence = envelope.sequence();
        match (sequence, envelope.s) {
            (Some(seq), _) => {
                self.sequence.observe(seq);
            }
            (None, Some(raw)) => {
                tracing::warn!(seq = raw, event = ?envelope.t, "Ignoring invalid sequence number");
            }
            (None, None) => {}
        }

        let Some(event) = envelope.t else {
            tracing::warn!(seq = ?envelope.s, "Dispatch without an event name");
            return Ok(Vec::new());
        };
        let data = envelope.d.unwrap_or(Value::Null);
        let mut actions = Vec::with_capacity(2);

        match GatewayEvent::from_name(&event) {
            Some(GatewayEvent::Ready) => {
                let ready: ReadyPayload =
                    serde_json::from_value(data.clone()).map_err(GatewayError::Decode)?;
                self.session_id.clone_from(&ready.session_id);
                self.resume_url.clone_from(&ready.resume_gateway_url);
                self.reached_ready = true;
                self.set_stage(SessionStage::Ready);
                tracing::info!(
                    user_id = %ready.user.id,
                    session_id = ?ready.session_id,
                    guilds = ready.guilds.len(),
                    "Session ready"
                );
                actions.push(Action::Ready(Box::new(ready)));
            }
            Some(GatewayEvent::Resumed) => {
                self.reached_ready = true;
                self.set_stage(SessionStage::Ready);
                tracing::info!(session_id = ?self.session_id, seq = ?self.sequence.get(), "Session resumed");
            }
            _ => {}
        }

        actions.push(Action::Dispatch {
            event,
            sequence,
            data,
        });
        Ok(actions)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("stage", &self.stage())
            .field("session_id", &self.session_id)
            .field("sequence", &self.sequence.get())
            .field("heartbeat_interval", &self.heartbeat_interval)
            .finish_non_exhaustive()
    }
}

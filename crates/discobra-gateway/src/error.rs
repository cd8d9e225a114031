//! Gateway error types
//!
//! Every reason a connection ends is a `GatewayError`; [`GatewayError::recovery`]
//! decides what the reconnect loop does next.

use discobra_common::ConfigError;
use discobra_rest::RestError;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

use crate::protocol::CloseCode;

/// How the client recovers after a connection ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Reconnect and resume the session if one is known
    Resume,
    /// Reconnect with a fresh Identify, discarding the session
    Reidentify,
    /// Stop the client
    Fatal,
}

/// Gateway error type
#[derive(Debug, Error)]
pub enum GatewayError {
    /// WebSocket connect, read or write failed
    #[error("WebSocket error: {0}")]
    WebSocket(#[source] Box<tungstenite::Error>),

    /// zlib-stream inflation failed; the compression context is unusable
    #[error("Inflate error: {0}")]
    Inflate(String),

    /// Payload was not a valid envelope
    #[error("Decode error: {0}")]
    Decode(#[source] serde_json::Error),

    /// Unexpected op code for the current session stage
    #[error("Protocol violation: expected {expected}, received {received}")]
    ProtocolViolation {
        expected: &'static str,
        received: String,
    },

    /// Server closed the connection
    #[error("Connection closed (code {code:?}): {reason}")]
    ConnectionClosed { code: Option<u16>, reason: String },

    /// Connecting or waiting for Hello took longer than configured
    #[error("Timed out waiting for {stage}")]
    Timeout { stage: &'static str },

    /// No heartbeat ACK arrived within an interval
    #[error("Heartbeat not acknowledged")]
    HeartbeatTimeout,

    /// Server sent op 7 Reconnect
    #[error("Server requested reconnect")]
    ReconnectRequested,

    /// Server sent op 9 Invalid Session
    #[error("Session invalidated (resumable: {resumable})")]
    SessionInvalidated { resumable: bool },

    /// Consecutive reconnect attempts exceeded the configured maximum
    #[error("Gave up after {attempts} reconnect attempts")]
    ReconnectLimit { attempts: u32 },

    #[error("Client is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Rest(#[from] RestError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Gateway result type
pub type GatewayResult<T> = Result<T, GatewayError>;

impl From<tungstenite::Error> for GatewayError {
    fn from(err: tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

impl GatewayError {
    /// Classify this error for the reconnect loop
    #[must_use]
    pub fn recovery(&self) -> Recovery {
        match self {
            Self::WebSocket(_)
            | Self::Inflate(_)
            | Self::Decode(_)
            | Self::Timeout { .. }
            | Self::HeartbeatTimeout
            | Self::ReconnectRequested => Recovery::Resume,

            Self::ProtocolViolation { .. } | Self::SessionInvalidated { .. } => {
                Recovery::Reidentify
            }

            Self::ConnectionClosed { code, .. } => match code.and_then(CloseCode::from_u16) {
                Some(code) if !code.should_reconnect() => Recovery::Fatal,
                Some(code) if !code.can_resume() => Recovery::Reidentify,
                _ => Recovery::Resume,
            },

            Self::ReconnectLimit { .. } | Self::AlreadyRunning | Self::Rest(_) | Self::Config(_) => {
                Recovery::Fatal
            }
        }
    }

    /// Build a `ConnectionClosed` from a received close frame
    #[must_use]
    pub fn closed(frame: Option<tungstenite::protocol::CloseFrame<'_>>) -> Self {
        match frame {
            Some(frame) => Self::ConnectionClosed {
                code: Some(frame.code.into()),
                reason: frame.reason.into_owned(),
            },
            None => Self::ConnectionClosed {
                code: None,
                reason: "connection closed without a close frame".to_string(),
            },
        }
    }

    /// Get the gateway close code, if the server sent a known one
    #[must_use]
    pub fn close_code(&self) -> Option<CloseCode> {
        match self {
            Self::ConnectionClosed { code, .. } => code.and_then(CloseCode::from_u16),
            _ => None,
        }
    }
}

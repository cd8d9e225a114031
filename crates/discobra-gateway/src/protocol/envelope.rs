//! Inbound message envelope
//!
//! Every gateway payload is `{"op", "d", "s", "t"}`. The op code and sequence
//! are kept raw so that values this client does not understand can be
//! skipped instead of failing the decode.

use serde::Deserialize;
use serde_json::Value;

use super::OpCode;
use crate::error::GatewayError;

/// Decoded inbound gateway message
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Envelope {
    /// Raw op code
    pub op: i64,

    /// Event data
    #[serde(default)]
    pub d: Option<Value>,

    /// Raw sequence number (Dispatch only)
    #[serde(default)]
    pub s: Option<i64>,

    /// Event name (Dispatch only)
    #[serde(default)]
    pub t: Option<String>,
}

impl Envelope {
    /// Decode an envelope from a complete JSON text message
    pub fn decode(text: &str) -> Result<Self, GatewayError> {
        serde_json::from_str(text).map_err(GatewayError::Decode)
    }

    /// Get the op code if it is one this client knows
    #[must_use]
    pub fn opcode(&self) -> Option<OpCode> {
        u8::try_from(self.op).ok().and_then(OpCode::from_u8)
    }

    /// Get the sequence number if it is a valid one
    #[must_use]
    pub fn sequence(&self) -> Option<u64> {
        self.s.and_then(|s| u64::try_from(s).ok())
    }

    /// Get the op code name for logging
    #[must_use]
    pub fn op_name(&self) -> &'static str {
        self.opcode().map_or("Unknown", OpCode::name)
    }
}

//! Outbound gateway messages
//!
//! The client only ever sends `{"op", "d"}`; `s` and `t` are server fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{IdentifyPayload, OpCode, ResumePayload};

/// Outbound gateway message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayMessage {
    /// Operation code
    pub op: OpCode,

    /// Event data; serialized as `null` when empty
    pub d: Value,
}

impl GatewayMessage {
    /// Create a Heartbeat message (op=1) carrying the last sequence number
    #[must_use]
    pub fn heartbeat(last_sequence: Option<u64>) -> Self {
        Self {
            op: OpCode::Heartbeat,
            d: last_sequence.map_or(Value::Null, Value::from),
        }
    }

    /// Create an Identify message (op=2)
    pub fn identify(payload: &IdentifyPayload) -> Result<Self, serde_json::Error> {
        Ok(Self {
            op: OpCode::Identify,
            d: serde_json::to_value(payload)?,
        })
    }

    /// Create a Resume message (op=6)
    pub fn resume(payload: &ResumePayload) -> Result<Self, serde_json::Error> {
        Ok(Self {
            op: OpCode::Resume,
            d: serde_json::to_value(payload)?,
        })
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl std::fmt::Display for GatewayMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GatewayMessage(op={})", self.op)
    }
}

//! Commands for the per-connection writer task

use crate::protocol::GatewayMessage;

/// Item queued for the WebSocket writer
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Serialize and send as a text frame
    Message(GatewayMessage),
    /// Send a close frame with this code, then stop writing
    Close(u16),
}

impl From<GatewayMessage> for Outbound {
    fn from(message: GatewayMessage) -> Self {
        Self::Message(message)
    }
}

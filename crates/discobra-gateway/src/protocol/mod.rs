//! Gateway protocol definitions
//!
//! Op codes, close codes, the inbound envelope and outbound control messages.

mod close_codes;
mod envelope;
mod messages;
mod opcodes;
mod payloads;

pub use close_codes::CloseCode;
pub use envelope::Envelope;
pub use messages::GatewayMessage;
pub use opcodes::OpCode;
pub use payloads::{HelloPayload, IdentifyPayload, IdentifyProperties, ReadyPayload, ResumePayload};

//! # discobra-core
//!
//! Domain layer containing snowflakes, intent and flag bitsets, and the typed
//! entity schemas decoded from gateway and REST payloads.
//! This crate has zero dependencies on transport (WebSocket, HTTP, etc.).

pub mod entities;
pub mod error;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{
    decode, Channel, ChannelType, Emoji, Guild, GuildMember, PremiumType, Role, UnavailableGuild,
    User,
};
pub use error::ModelError;
pub use value_objects::{Intents, IntentsParseError, Snowflake, SnowflakeParseError, UserFlags};

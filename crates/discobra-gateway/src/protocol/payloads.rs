//! Payload definitions for the control messages this client exchanges

use discobra_core::{Intents, UnavailableGuild, User};
use serde::{Deserialize, Serialize};

/// Payload for op 10 (Hello)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
}

/// Payload for op 2 (Identify)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyPayload {
    pub token: String,
    pub intents: Intents,
    pub properties: IdentifyProperties,
}

/// Client connection properties sent with Identify
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyProperties {
    /// Operating system
    pub os: String,
    /// Library name
    pub browser: String,
    /// Library name
    pub device: String,
}

impl IdentifyProperties {
    /// Library name reported to the gateway
    pub const LIBRARY: &'static str = "discobra";

    /// Create properties with an explicit OS name
    #[must_use]
    pub fn new(os: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            browser: Self::LIBRARY.to_string(),
            device: Self::LIBRARY.to_string(),
        }
    }
}

impl Default for IdentifyProperties {
    /// Properties for the running platform
    fn default() -> Self {
        Self::new(std::env::consts::OS)
    }
}

/// Payload for op 6 (Resume)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePayload {
    pub token: String,
    pub session_id: String,
    /// Last sequence number received
    pub seq: u64,
}

/// Payload of the READY dispatch
///
/// Only the fields the session and cache need; the rest is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReadyPayload {
    /// Gateway API version
    #[serde(default)]
    pub v: Option<u8>,
    /// The account behind the token
    pub user: User,
    /// Guilds the account is in, delivered later through GUILD_CREATE
    #[serde(default)]
    pub guilds: Vec<UnavailableGuild>,
    #[serde(default)]
    pub session_id: Option<String>,
    /// URL to use when resuming this session
    #[serde(default)]
    pub resume_gateway_url: Option<String>,
}

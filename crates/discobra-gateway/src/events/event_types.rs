//! Gateway event names
//!
//! Names carried in the `t` field of Dispatch envelopes. Only events the
//! client reacts to internally need a variant; every other name still flows
//! to handlers as a plain string.

use std::fmt;

/// Dispatch events the client acts on before handing them to handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayEvent {
    /// Sent after a successful Identify
    Ready,
    /// Sent after a successful Resume, once missed events were replayed
    Resumed,
    /// Guild became available, was joined, or was created
    GuildCreate,
    /// Guild settings changed
    GuildUpdate,
    /// Left or removed from a guild, or the guild went unavailable
    GuildDelete,
    /// Current account changed
    UserUpdate,
}

impl GatewayEvent {
    /// Get the wire name of the event
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "READY",
            Self::Resumed => "RESUMED",
            Self::GuildCreate => "GUILD_CREATE",
            Self::GuildUpdate => "GUILD_UPDATE",
            Self::GuildDelete => "GUILD_DELETE",
            Self::UserUpdate => "USER_UPDATE",
        }
    }

    /// Parse an event from its wire name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "READY" => Some(Self::Ready),
            "RESUMED" => Some(Self::Resumed),
            "GUILD_CREATE" => Some(Self::GuildCreate),
            "GUILD_UPDATE" => Some(Self::GuildUpdate),
            "GUILD_DELETE" => Some(Self::GuildDelete),
            "USER_UPDATE" => Some(Self::UserUpdate),
            _ => None,
        }
    }

    /// Check if the event changes the local entity cache
    #[must_use]
    pub const fn mutates_cache(self) -> bool {
        matches!(
            self,
            Self::GuildCreate | Self::GuildUpdate | Self::GuildDelete | Self::UserUpdate
        )
    }
}

impl fmt::Display for GatewayEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalize an event name for handler lookup
///
/// `GUILD_CREATE`, `guild_create` and `on_guild_create` all map to
/// `guild_create`.
#[must_use]
pub fn normalize_event_name(name: &str) -> String {
    let lower = name.trim().to_ascii_lowercase();
    match lower.strip_prefix("on_") {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => lower,
    }
}

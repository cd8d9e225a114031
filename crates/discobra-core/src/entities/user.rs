//! User entity - a Discord account as seen by this client

use serde::{Deserialize, Serialize};

use crate::value_objects::{Snowflake, UserFlags};

/// Nitro subscription level of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum PremiumType {
    #[default]
    None,
    NitroClassic,
    Nitro,
    NitroBasic,
    /// Value not known to this client
    Unknown(u8),
}

impl From<u8> for PremiumType {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::None,
            1 => Self::NitroClassic,
            2 => Self::Nitro,
            3 => Self::NitroBasic,
            other => Self::Unknown(other),
        }
    }
}

impl From<PremiumType> for u8 {
    fn from(value: PremiumType) -> Self {
        match value {
            PremiumType::None => 0,
            PremiumType::NitroClassic => 1,
            PremiumType::Nitro => 2,
            PremiumType::NitroBasic => 3,
            PremiumType::Unknown(other) => other,
        }
    }
}

/// User entity
///
/// Only `id` is guaranteed; the READY payload and `GET /users/@me` fill in
/// progressively more of the profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Snowflake,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub discriminator: Option<String>,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bot: bool,
    #[serde(default)]
    pub system: bool,
    #[serde(default)]
    pub mfa_enabled: Option<bool>,
    #[serde(default)]
    pub banner: Option<String>,
    #[serde(default)]
    pub accent_color: Option<u32>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub verified: Option<bool>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub flags: Option<UserFlags>,
    #[serde(default)]
    pub premium_type: Option<PremiumType>,
    #[serde(default)]
    pub public_flags: Option<UserFlags>,
}

impl User {
    /// Create a user carrying only an ID
    pub fn new(id: Snowflake) -> Self {
        Self {
            id,
            username: String::new(),
            discriminator: None,
            global_name: None,
            avatar: None,
            bot: false,
            system: false,
            mfa_enabled: None,
            banner: None,
            accent_color: None,
            locale: None,
            verified: None,
            email: None,
            flags: None,
            premium_type: None,
            public_flags: None,
        }
    }

    /// Get the full tag: username#discriminator (legacy) or the bare username
    pub fn tag(&self) -> String {
        match self.discriminator.as_deref() {
            Some(d) if d != "0" => format!("{}#{}", self.username, d),
            _ => self.username.clone(),
        }
    }

    /// Name shown in clients: global display name, falling back to username
    pub fn display_name(&self) -> &str {
        self.global_name.as_deref().unwrap_or(&self.username)
    }

    /// Get avatar CDN path or the default avatar path
    pub fn avatar_url(&self) -> String {
        match &self.avatar {
            Some(hash) => format!("/avatars/{}/{}.png", self.id, hash),
            None => format!("/embed/avatars/{}.png", self.default_avatar_index()),
        }
    }

    /// Default avatar index: discriminator % 5 for legacy names, (id >> 22) % 6 otherwise
    fn default_avatar_index(&self) -> u64 {
        match self.discriminator.as_deref().and_then(|d| d.parse::<u64>().ok()) {
            Some(d) if d != 0 => d % 5,
            _ => (self.id.into_inner() >> 22) % 6,
        }
    }
}

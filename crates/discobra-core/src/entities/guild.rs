//! Guild entity - a server and the collections it carries

use serde::{Deserialize, Serialize};

use super::{Channel, Emoji, GuildMember, Role};
use crate::value_objects::Snowflake;

/// Guild entity
///
/// `GUILD_CREATE` sends the full object including members and channels;
/// `GUILD_UPDATE` omits those collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    pub id: Snowflake,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub splash: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub owner_id: Option<Snowflake>,
    #[serde(default)]
    pub afk_channel_id: Option<Snowflake>,
    #[serde(default)]
    pub afk_timeout: u32,
    #[serde(default)]
    pub verification_level: u8,
    #[serde(default)]
    pub explicit_content_filter: u8,
    #[serde(default)]
    pub mfa_level: u8,
    #[serde(default)]
    pub premium_tier: u8,
    #[serde(default)]
    pub premium_subscription_count: Option<u32>,
    #[serde(default)]
    pub preferred_locale: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub emojis: Vec<Emoji>,
    #[serde(default)]
    pub member_count: Option<u64>,
    #[serde(default)]
    pub large: Option<bool>,
    #[serde(default)]
    pub unavailable: bool,
    #[serde(default)]
    pub joined_at: Option<String>,
    #[serde(default)]
    pub members: Option<Vec<GuildMember>>,
    #[serde(default)]
    pub channels: Option<Vec<Channel>>,
    #[serde(default)]
    pub threads: Option<Vec<Channel>>,
}

impl Guild {
    /// Placeholder for a guild that is known but not yet delivered
    pub fn unavailable(id: Snowflake) -> Self {
        Self {
            id,
            name: String::new(),
            icon: None,
            splash: None,
            description: None,
            owner_id: None,
            afk_channel_id: None,
            afk_timeout: 0,
            verification_level: 0,
            explicit_content_filter: 0,
            mfa_level: 0,
            premium_tier: 0,
            premium_subscription_count: None,
            preferred_locale: None,
            features: Vec::new(),
            roles: Vec::new(),
            emojis: Vec::new(),
            member_count: None,
            large: None,
            unavailable: true,
            joined_at: None,
            members: None,
            channels: None,
            threads: None,
        }
    }

    /// Check if user is the guild owner
    #[inline]
    pub fn is_owner(&self, user_id: Snowflake) -> bool {
        self.owner_id == Some(user_id)
    }

    /// Get icon CDN path if set
    pub fn icon_url(&self) -> Option<String> {
        self.icon
            .as_ref()
            .map(|hash| format!("/icons/{}/{}.png", self.id, hash))
    }

    /// Find a role by ID
    pub fn role(&self, role_id: Snowflake) -> Option<&Role> {
        self.roles.iter().find(|r| r.id == role_id)
    }

    /// Find a channel by ID
    pub fn channel(&self, channel_id: Snowflake) -> Option<&Channel> {
        self.channels
            .as_deref()
            .and_then(|channels| channels.iter().find(|c| c.id == channel_id))
    }

    /// Carry over collections that a partial update left out
    pub fn merge_missing_from(&mut self, previous: &Guild) {
        if self.members.is_none() {
            self.members.clone_from(&previous.members);
        }
        if self.channels.is_none() {
            self.channels.clone_from(&previous.channels);
        }
        if self.threads.is_none() {
            self.threads.clone_from(&previous.threads);
        }
        if self.joined_at.is_none() {
            self.joined_at.clone_from(&previous.joined_at);
        }
        if self.member_count.is_none() {
            self.member_count = previous.member_count;
        }
    }
}

/// Guild stub sent in READY and GUILD_DELETE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnavailableGuild {
    pub id: Snowflake,
    #[serde(default)]
    pub unavailable: Option<bool>,
}

impl UnavailableGuild {
    /// `GUILD_DELETE` with `unavailable: true` is an outage, not a removal
    #[inline]
    pub fn is_outage(&self) -> bool {
        self.unavailable == Some(true)
    }
}

impl From<UnavailableGuild> for Guild {
    fn from(stub: UnavailableGuild) -> Self {
        Guild::unavailable(stub.id)
    }
}

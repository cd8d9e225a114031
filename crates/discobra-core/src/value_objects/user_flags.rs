//! User flags bitflags
//!
//! Badges and account markers carried in a user's `flags` and `public_flags`.

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

bitflags! {
    /// Account flags attached to a user
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct UserFlags: u64 {
        /// Discord employee
        const STAFF                    = 1 << 0;
        /// Partnered server owner
        const PARTNER                  = 1 << 1;
        /// HypeSquad events member
        const HYPESQUAD                = 1 << 2;
        const BUG_HUNTER_LEVEL_1       = 1 << 3;
        /// House Bravery member
        const HYPESQUAD_ONLINE_HOUSE_1 = 1 << 6;
        /// House Brilliance member
        const HYPESQUAD_ONLINE_HOUSE_2 = 1 << 7;
        /// House Balance member
        const HYPESQUAD_ONLINE_HOUSE_3 = 1 << 8;
        const PREMIUM_EARLY_SUPPORTER  = 1 << 9;
        /// User is a team
        const TEAM_PSEUDO_USER         = 1 << 10;
        const BUG_HUNTER_LEVEL_2       = 1 << 14;
        const VERIFIED_BOT             = 1 << 16;
        const VERIFIED_DEVELOPER       = 1 << 17;
        const CERTIFIED_MODERATOR      = 1 << 18;
        /// Bot uses only HTTP interactions
        const BOT_HTTP_INTERACTIONS    = 1 << 19;
        const ACTIVE_DEVELOPER         = 1 << 22;
    }
}

impl Serialize for UserFlags {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(self.bits())
    }
}

// Unknown bits are kept so a round trip never loses information
impl<'de> Deserialize<'de> for UserFlags {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Self::from_bits_retain)
    }
}

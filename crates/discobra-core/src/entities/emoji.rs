//! Emoji entity - a custom guild emoji

use serde::{Deserialize, Serialize};

use super::User;
use crate::value_objects::Snowflake;

/// Custom emoji
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emoji {
    pub id: Option<Snowflake>,
    pub name: Option<String>,
    #[serde(default)]
    pub roles: Vec<Snowflake>,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub require_colons: bool,
    #[serde(default)]
    pub managed: bool,
    #[serde(default)]
    pub animated: bool,
    #[serde(default = "default_available")]
    pub available: bool,
}

fn default_available() -> bool {
    true
}

impl Emoji {
    /// Message mention syntax, e.g. `<:name:id>` or `<a:name:id>`
    pub fn mention(&self) -> Option<String> {
        let id = self.id?;
        let name = self.name.as_deref().unwrap_or("_");
        let prefix = if self.animated { "a" } else { "" };
        Some(format!("<{prefix}:{name}:{id}>"))
    }
}

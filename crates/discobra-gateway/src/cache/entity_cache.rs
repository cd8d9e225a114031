//! Entity cache
//!
//! Latest snapshot of the current account and of every user and guild seen
//! through dispatch events. Entries are last-write-wins and never expire;
//! the cache lives as long as the client that owns it.

use dashmap::DashMap;
use discobra_core::{decode, Guild, ModelError, Snowflake, UnavailableGuild, User};
use parking_lot::RwLock;
use serde_json::Value;

use crate::events::GatewayEvent;
use crate::protocol::ReadyPayload;

/// Entity kinds the cache stores
pub trait Cached: Clone + Send + Sync + 'static {
    /// Kind name used in logs and decode errors
    const KIND: &'static str;

    fn id(&self) -> Snowflake;

    fn store(cache: &EntityCache) -> &DashMap<Snowflake, Self>;
}

impl Cached for User {
    const KIND: &'static str = "user";

    fn id(&self) -> Snowflake {
        self.id
    }

    fn store(cache: &EntityCache) -> &DashMap<Snowflake, Self> {
        &cache.users
    }
}

impl Cached for Guild {
    const KIND: &'static str = "guild";

    fn id(&self) -> Snowflake {
        self.id
    }

    fn store(cache: &EntityCache) -> &DashMap<Snowflake, Self> {
        &cache.guilds
    }
}

/// Concurrent entity cache
#[derive(Debug, Default)]
pub struct EntityCache {
    users: DashMap<Snowflake, User>,
    guilds: DashMap<Snowflake, Guild>,
    current_user: RwLock<Option<User>>,
}

impl EntityCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `entity` under `id`, returning the entry it replaced
    pub fn put<T: Cached>(&self, id: Snowflake, entity: T) -> Option<T> {
        T::store(self).insert(id, entity)
    }

    /// Store `entity` under its own id
    pub fn insert<T: Cached>(&self, entity: T) -> Option<T> {
        self.put(entity.id(), entity)
    }

    pub fn get<T: Cached>(&self, id: Snowflake) -> Option<T> {
        T::store(self).get(&id).map(|entry| entry.value().clone())
    }

    /// All entities of a kind, in no particular order
    pub fn list<T: Cached>(&self) -> Vec<T> {
        T::store(self)
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn remove<T: Cached>(&self, id: Snowflake) -> Option<T> {
        T::store(self).remove(&id).map(|(_, entity)| entity)
    }

    pub fn count<T: Cached>(&self) -> usize {
        T::store(self).len()
    }

    /// The account behind the token
    pub fn current_user(&self) -> Option<User> {
        self.current_user.read().clone()
    }

    /// Replace the current account; it is also stored as a regular user
    pub fn set_current_user(&self, user: User) {
        self.users.insert(user.id, user.clone());
        *self.current_user.write() = Some(user);
    }

    /// Seed from READY: current account plus placeholders for pending guilds
    pub fn seed_ready(&self, ready: &ReadyPayload) {
        self.set_current_user(ready.user.clone());
        for stub in &ready.guilds {
            self.guilds
                .entry(stub.id)
                .or_insert_with(|| Guild::from(*stub));
        }
    }

    /// Apply a dispatch event to the cache
    ///
    /// Returns `true` if the event changed the cache.
    pub fn apply(&self, event: GatewayEvent, data: &Value) -> Result<bool, ModelError> {
        match event {
            GatewayEvent::GuildCreate => {
                let guild: Guild = decode(Guild::KIND, Some(data))?;
                for member in guild.members.iter().flatten() {
                    if let Some(user) = &member.user {
                        self.users.insert(user.id, user.clone());
                    }
                }
                tracing::debug!(guild_id = %guild.id, name = %guild.name, "Guild cached");
                self.insert(guild);
                Ok(true)
            }
            GatewayEvent::GuildUpdate => {
                let mut guild: Guild = decode(Guild::KIND, Some(data))?;
                if let Some(previous) = self.get::<Guild>(guild.id) {
                    guild.merge_missing_from(&previous);
                }
                self.insert(guild);
                Ok(true)
            }
            GatewayEvent::GuildDelete => {
                let stub: UnavailableGuild = decode(Guild::KIND, Some(data))?;
                if stub.is_outage() {
                    match self.guilds.get_mut(&stub.id) {
                        Some(mut guild) => guild.unavailable = true,
                        None => {
                            self.guilds.insert(stub.id, Guild::from(stub));
                        }
                    }
                    tracing::debug!(guild_id = %stub.id, "Guild unavailable");
                } else {
                    self.guilds.remove(&stub.id);
                    tracing::debug!(guild_id = %stub.id, "Guild removed from cache");
                }
                Ok(true)
            }
            GatewayEvent::UserUpdate => {
                let user: User = decode(User::KIND, Some(data))?;
                self.set_current_user(user);
                Ok(true)
            }
            GatewayEvent::Ready | GatewayEvent::Resumed => Ok(false),
        }
    }
}

//! Entity schemas decoded from gateway and REST payloads
//!
//! Every struct maps the keys it knows to typed fields; unknown keys are
//! ignored so new API fields never break decoding.

mod channel;
mod emoji;
mod guild;
mod member;
mod role;
mod user;

pub use channel::{Channel, ChannelType};
pub use emoji::Emoji;
pub use guild::{Guild, UnavailableGuild};
pub use member::GuildMember;
pub use role::Role;
pub use user::{PremiumType, User};

use serde::de::DeserializeOwned;

use crate::error::ModelError;

/// Decode an entity from a raw JSON payload
///
/// `kind` names the entity in the error, e.g. `"guild"`.
pub fn decode<T: DeserializeOwned>(
    kind: &'static str,
    value: Option<&serde_json::Value>,
) -> Result<T, ModelError> {
    let value = value.ok_or(ModelError::MissingPayload { kind })?;
    T::deserialize(value).map_err(|source| ModelError::Decode { kind, source })
}

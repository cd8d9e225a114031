//! Value objects - immutable types that represent domain concepts

mod intents;
mod snowflake;
mod user_flags;

pub use intents::{Intents, IntentsParseError};
pub use snowflake::{Snowflake, SnowflakeParseError};
pub use user_flags::UserFlags;

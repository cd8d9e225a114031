//! Local entity cache

mod entity_cache;

pub use entity_cache::{Cached, EntityCache};

//! Dispatch event names

mod event_types;

pub use event_types::{normalize_event_name, GatewayEvent};

//! # discobra-gateway
//!
//! Client for the Discord real-time gateway: frame reassembly, the session
//! state machine, heartbeats, event dispatch and the local entity cache.

pub mod cache;
pub mod client;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod protocol;
pub mod transport;

pub use cache::{Cached, EntityCache};
pub use client::{Client, ShutdownHandle};
pub use connection::SessionStage;
pub use dispatch::{handler_fn, Dispatcher, Event, EventHandler, HandlerError};
pub use error::{GatewayError, GatewayResult, Recovery};

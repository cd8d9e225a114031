//! Event dispatch to application handlers

mod dispatcher;
mod handler;

pub use dispatcher::Dispatcher;
pub use handler::{handler_fn, Event, EventHandler, HandlerError, HandlerResult};

//! Event dispatcher
//!
//! Maps normalized event names to sets of handlers and runs each handler
//! invocation on its own task, so a slow or failing handler never holds up
//! the read loop or the other handlers.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::FutureExt;
use serde_json::Value;

use super::{Event, EventHandler};
use crate::events::normalize_event_name;

/// Handler registry and fan-out
#[derive(Default)]
pub struct Dispatcher {
    handlers: DashMap<String, Vec<Arc<dyn EventHandler>>>,
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event`
    ///
    /// Returns `false` if this handler was already registered for the event.
    pub fn register(&self, event: &str, handler: Arc<dyn EventHandler>) -> bool {
        let key = normalize_event_name(event);
        let mut handlers = self.handlers.entry(key.clone()).or_default();
        if handlers.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            return false;
        }
        handlers.push(handler);
        tracing::debug!(event = %key, handlers = handlers.len(), "Handler registered");
        true
    }

    /// Remove `handler` from `event`, dropping the event once it has no handlers
    ///
    /// Returns `true` if the handler was registered.
    pub fn unregister(&self, event: &str, handler: &Arc<dyn EventHandler>) -> bool {
        let key = normalize_event_name(event);
        let removed = match self.handlers.get_mut(&key) {
            Some(mut handlers) => {
                let before = handlers.len();
                handlers.retain(|h| !Arc::ptr_eq(h, handler));
                before != handlers.len()
            }
            None => false,
        };
        self.handlers.remove_if(&key, |_, handlers| handlers.is_empty());
        if removed {
            tracing::debug!(event = %key, "Handler unregistered");
        }
        removed
    }

    /// Number of handlers registered for `event`
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers
            .get(&normalize_event_name(event))
            .map_or(0, |handlers| handlers.len())
    }

    /// Check if `event` has any handlers
    pub fn has_handlers(&self, event: &str) -> bool {
        self.handler_count(event) > 0
    }

    /// Spawn every handler registered for `event`
    ///
    /// Must be called inside a Tokio runtime. Returns the number of handler
    /// tasks spawned; an event nobody listens to is a no-op.
    pub fn emit(&self, event: &str, sequence: Option<u64>, data: Value) -> usize {
        let key = normalize_event_name(event);
        // Clone the set so no map guard is held while spawning
        let handlers = match self.handlers.get(&key) {
            Some(handlers) => handlers.clone(),
            None => return 0,
        };

        let event = Arc::new(Event::new(event, sequence, data));
        for handler in &handlers {
            let handler = Arc::clone(handler);
            let event = Arc::clone(&event);
            tokio::spawn(async move {
                let name = event.name.clone();
                match AssertUnwindSafe(handler.handle(event)).catch_unwind().await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::warn!(event = %name, error = %e, "Event handler failed");
                    }
                    Err(panic) => {
                        let message = panic
                            .downcast_ref::<&str>()
                            .map(|s| (*s).to_string())
                            .or_else(|| panic.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "unknown panic".to_string());
                        tracing::error!(event = %name, panic = %message, "Event handler panicked");
                    }
                }
            });
        }
        handlers.len()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("events", &self.handlers.len())
            .finish()
    }
}

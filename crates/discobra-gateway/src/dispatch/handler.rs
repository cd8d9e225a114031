//! Event handler API

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use discobra_core::ModelError;
use discobra_rest::RestError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Dispatch event handed to handlers
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Wire name, e.g. `MESSAGE_CREATE`
    pub name: String,
    pub sequence: Option<u64>,
    pub data: Value,
}

impl Event {
    #[must_use]
    pub fn new(name: impl Into<String>, sequence: Option<u64>, data: Value) -> Self {
        Self {
            name: name.into(),
            sequence,
            data,
        }
    }

    /// Decode the payload into an entity schema
    pub fn decode<T: DeserializeOwned>(&self, kind: &'static str) -> Result<T, ModelError> {
        discobra_core::decode(kind, Some(&self.data))
    }
}

/// Handler error type
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Rest(#[from] RestError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HandlerError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

/// Handler result type
pub type HandlerResult = Result<(), HandlerError>;

/// Application callback for dispatch events
///
/// Every invocation runs on its own task. Identity for registration is the
/// `Arc` pointer: registering the same `Arc` twice is a no-op.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, event: Arc<Event>) -> HandlerResult;
}

/// Adapter turning an async closure into an [`EventHandler`]
pub struct FnHandler<F, Fut> {
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F, Fut>
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, event: Arc<Event>) -> HandlerResult {
        (self.f)(event).await
    }
}

/// Wrap an async closure as a shareable handler
///
/// ```ignore
/// let handler = handler_fn(|event| async move {
///     tracing::info!(event = %event.name, "got event");
///     Ok(())
/// });
/// client.register("on_message_create", handler.clone());
/// ```
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(FnHandler {
        f,
        _fut: PhantomData,
    })
}

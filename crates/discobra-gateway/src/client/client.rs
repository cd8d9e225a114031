//! Gateway client
//!
//! Owns everything that outlives a single connection: handler registry,
//! entity cache, heartbeat state and the published session stage.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use discobra_common::ClientConfig;
use discobra_rest::RestClient;
use tokio::sync::watch;

use super::runner::Runner;
use crate::cache::EntityCache;
use crate::connection::{HeartbeatState, Session, SessionStage};
use crate::dispatch::{handler_fn, Dispatcher, Event, EventHandler, HandlerResult};
use crate::error::{GatewayError, GatewayResult};
use crate::protocol::IdentifyProperties;

/// Cloneable handle requesting a permanent stop
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    fn new() -> Self {
        Self {
            tx: Arc::new(watch::Sender::new(false)),
        }
    }

    /// Close the connection with a normal close and stop reconnecting
    ///
    /// Permanent: a later `run` on the same client returns immediately.
    pub fn shutdown(&self) {
        if !self.tx.send_replace(true) {
            tracing::info!("Shutdown requested");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Discord gateway client
///
/// ```ignore
/// let client = Client::new(ClientConfig::from_env()?);
/// client.on("message_create", |event| async move {
///     tracing::info!(seq = ?event.sequence, "message");
///     Ok(())
/// });
/// client.run(token).await?;
/// ```
pub struct Client {
    config: ClientConfig,
    dispatcher: Arc<Dispatcher>,
    cache: Arc<EntityCache>,
    heartbeat: Arc<HeartbeatState>,
    stage: Arc<watch::Sender<SessionStage>>,
    shutdown: ShutdownHandle,
    running: AtomicBool,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            dispatcher: Arc::new(Dispatcher::new()),
            cache: Arc::new(EntityCache::new()),
            heartbeat: Arc::new(HeartbeatState::new()),
            stage: Arc::new(watch::Sender::new(SessionStage::Disconnected)),
            shutdown: ShutdownHandle::new(),
            running: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Register `handler` for `event` (`"GUILD_CREATE"`, `"on_guild_create"`, ...)
    pub fn register(&self, event: &str, handler: Arc<dyn EventHandler>) -> bool {
        self.dispatcher.register(event, handler)
    }

    pub fn unregister(&self, event: &str, handler: &Arc<dyn EventHandler>) -> bool {
        self.dispatcher.unregister(event, handler)
    }

    /// Register an async closure; returns the handler for later `unregister`
    pub fn on<F, Fut>(&self, event: &str, f: F) -> Arc<dyn EventHandler>
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler = handler_fn(f);
        self.dispatcher.register(event, Arc::clone(&handler));
        handler
    }

    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.cache
    }

    pub fn stage(&self) -> SessionStage {
        *self.stage.borrow()
    }

    /// Receiver observing every stage change
    pub fn subscribe_stage(&self) -> watch::Receiver<SessionStage> {
        self.stage.subscribe()
    }

    /// Wait until the session is `Ready` or the client stopped
    ///
    /// Returns the stage that ended the wait.
    pub async fn wait_until_ready(&self) -> SessionStage {
        let mut rx = self.stage.subscribe();
        let result = rx
            .wait_for(|stage| matches!(stage, SessionStage::Ready | SessionStage::Closed))
            .await
            .map(|stage| *stage);
        result.unwrap_or(SessionStage::Closed)
    }

    /// Round trip of the last acknowledged heartbeat
    pub fn latency(&self) -> Option<Duration> {
        self.heartbeat.latency()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run with the token from the configuration
    pub async fn start(&self) -> GatewayResult<()> {
        let token = self.config.require_token()?.to_string();
        self.run(token).await
    }

    /// Connect and process events until shutdown or a fatal error
    ///
    /// Transient failures reconnect with backoff and never surface here.
    pub async fn run(&self, token: impl Into<String>) -> GatewayResult<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(GatewayError::AlreadyRunning);
        }
        let _guard = RunningGuard(&self.running);

        let token = token.into();
        let rest = RestClient::new(&self.config.rest, &token)?;
        let session = Session::new(
            token,
            self.config.gateway.intents,
            IdentifyProperties::default(),
            Arc::clone(&self.stage),
        );

        tracing::info!(
            gateway = %self.config.gateway.url,
            compress = self.config.gateway.compress,
            intents = %self.config.gateway.intents,
            "Starting gateway client"
        );

        Runner {
            config: &self.config,
            dispatcher: &self.dispatcher,
            cache: &self.cache,
            heartbeat: &self.heartbeat,
            rest,
            session,
            shutdown: self.shutdown.subscribe(),
        }
        .run()
        .await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("stage", &self.stage())
            .field("running", &self.is_running())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

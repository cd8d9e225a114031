//! Gateway client example binary
//!
//! Run with:
//! ```bash
//! DISCORD_TOKEN=... cargo run -p discobra-gateway
//! ```
//!
//! Configuration is loaded from environment variables. Ctrl-C closes the
//! session cleanly.

use anyhow::Context;
use discobra_common::{try_init_tracing_with_config, ClientConfig, TracingConfig};
use discobra_gateway::protocol::ReadyPayload;
use discobra_gateway::{Client, HandlerError};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Load configuration first so the log format can follow it
    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = try_init_tracing_with_config(TracingConfig::for_format(config.log_format)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    if let Err(e) = run(config).await {
        error!(error = %format!("{e:#}"), "Gateway client failed");
        std::process::exit(1);
    }
}

async fn run(config: ClientConfig) -> anyhow::Result<()> {
    let token = config
        .require_token()
        .context("a bot token is required")?
        .to_string();

    info!(
        gateway = %config.gateway.url,
        intents = %config.gateway.intents,
        compress = config.gateway.compress,
        "Configuration loaded"
    );

    let client = Client::new(config);

    client.on("ready", |event| async move {
        let ready: ReadyPayload = event.decode("ready")?;
        info!(
            user = %ready.user.tag(),
            guilds = ready.guilds.len(),
            "Logged in"
        );
        Ok::<(), HandlerError>(())
    });
    client.on("guild_create", |event| async move {
        let name = event.data.get("name").and_then(|v| v.as_str()).unwrap_or("");
        info!(guild = %name, "Guild available");
        Ok(())
    });
    client.on("message_create", |event| async move {
        info!(seq = ?event.sequence, "Message received");
        Ok(())
    });

    let shutdown = client.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            shutdown.shutdown();
        }
    });

    client.run(token).await?;
    Ok(())
}

//! sentinel - presence-triggered safety check-in daemon.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use sentinel_core::config::SentinelConfig;
use sentinel_server::console::{self, ConsoleChannel};
use sentinel_server::{create_chat, create_runtime, create_server, create_server_with_auth, AppState};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn load_config() -> anyhow::Result<SentinelConfig> {
    match std::env::var("SENTINEL_CONFIG") {
        Ok(path) => {
            let mut config =
                SentinelConfig::from_file(&path).with_context(|| format!("loading config from {}", path))?;
            config.apply_env();
            Ok(config)
        }
        Err(_) => Ok(SentinelConfig::from_env()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive(Level::INFO.into())
                .add_directive("sentinel_server=debug".parse()?),
        )
        .init();

    let host = std::env::var("SENTINEL_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("SENTINEL_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .context("SENTINEL_PORT must be a valid port number")?;
    let require_auth = std::env::var("SENTINEL_REQUIRE_AUTH").is_ok();

    let config = load_config()?;
    let webhook_secret = config.channels.webhook.as_ref().and_then(|w| w.secret.clone());
    let console_enabled = config.channels.console;
    let chat_config = config.chat.clone();

    let mut runtime = create_runtime(config)?;
    if let Some(step) = runtime.start().await? {
        info!(?step, "Resumed interrupted session");
    }
    info!("Heartbeat started");

    let engine = runtime.engine().clone();
    let chat = create_chat(&chat_config, &engine);

    let cancel = CancellationToken::new();
    if console_enabled {
        let channel = Arc::new(ConsoleChannel::stdout());
        engine.register_channel(channel.clone());
        tokio::spawn(console::read_stdin(engine.clone(), chat.clone(), channel, cancel.child_token()));
    }

    let state = AppState::new(engine, runtime.wake_handle())
        .with_chat(chat)
        .with_webhook_secret(webhook_secret);
    let app = if require_auth {
        info!("Authentication enabled");
        create_server_with_auth(state)
    } else {
        info!("Authentication disabled");
        create_server(state)
    };

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Starting sentinel on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            info!("Shutdown signal received, stopping heartbeat...");
        })
        .await?;

    cancel.cancel();
    runtime.shutdown().await?;

    info!("Sentinel stopped cleanly");
    Ok(())
}

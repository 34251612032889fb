//! # SSO Server
//!
//! Main entry point for the SSO ticket authority.

#![forbid(unsafe_code)]

use sso_server::{ServerConfig, SsoServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("SSO authority starting...");

    let server = SsoServer::new(&config);
    server.start();

    tokio::signal::ctrl_c().await?;
    tracing::info!(
        sessions = server.session_count().await.unwrap_or_default(),
        "shutdown requested"
    );
    server.shutdown().await;

    tracing::info!("SSO authority stopped");
    Ok(())
}

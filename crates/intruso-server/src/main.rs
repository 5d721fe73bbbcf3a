mod config;
mod connection;
mod error;
mod handler;
mod profiles;
mod room;
mod server;
mod session;
mod store;

use clap::Parser;

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "intruso_server=debug,intruso_common=debug".into()),
        )
        .init();

    let config = ServerConfig::parse();

    tracing::info!(
        "Starting intruso server on {} (max {} connections, delete grace {} ms)",
        config.bind,
        config.max_connections,
        config.delete_grace_ms
    );
    server::run(config).await
}

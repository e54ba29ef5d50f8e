//! Chat relayer: WebSocket broadcast server.
//!
//! Usage: relayer HOST:PORT [--workers N]
//! Optional env: RELAY_SEND_QUEUE, RELAY_PING_SECS, RUST_LOG

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use relayer::{api, cli, config, relay};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    let config = config::Config::load(&cli.addr).map_err(|e| anyhow::anyhow!("config: {}", e))?;

    let mut runtime = tokio::runtime::Builder::new_multi_thread();
    if let Some(workers) = cli.workers.filter(|&n| n > 0) {
        runtime.worker_threads(workers);
    }
    runtime.enable_all().build()?.block_on(serve(config))
}

async fn serve(config: config::Config) -> anyhow::Result<()> {
    let relay = Arc::new(relay::RelayState::new(config.send_queue));
    let state = api::AppState::new(relay, config.connection_settings());
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    tracing::info!("Relayer listening on {}", listener.local_addr()?);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

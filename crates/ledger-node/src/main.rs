use clap::Parser;
use ledger_node::{launch, Args, NodeConfig};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = NodeConfig::from(Args::parse());
    let running = launch(config, CancellationToken::new()).await?;
    info!("ledger-node listening on http://{}", running.http_addr);

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    running.shutdown().await;
    Ok(())
}

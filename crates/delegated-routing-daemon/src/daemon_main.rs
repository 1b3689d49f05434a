//! Delegated routing daemon.
//!
//! Serves provider and naming-record lookups from a static table, accepting
//! signed provide announcements and record updates at runtime.
//!
//! Run:
//!   routingd --config routingd.toml
//!   routingd --listen 0.0.0.0:8190

use anyhow::Context;
use clap::Parser;
use delegated_routing_daemon::{DaemonConfig, StaticService};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "routingd", version, about = "Delegated routing daemon")]
struct Cli {
    /// Configuration file; defaults apply when omitted
    #[arg(short, long, env = "ROUTINGD_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overriding the configured one
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("routingd=info".parse()?)
                .add_directive("delegated_routing=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => DaemonConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => DaemonConfig::default(),
    };
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }

    let service = StaticService::from_config(&config)?;
    tracing::info!(
        providers = config.providers.len(),
        records = config.records.len(),
        "loaded routing tables"
    );

    let app = delegated_routing_server::router(service);
    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}

//! Robust Node binary
//!
//! Runs one grid cell until Ctrl-C or an admin `shutdown`.

use clap::Parser;
use robust_node::{GridNode, NodeArgs};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "robust_node=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match NodeArgs::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(2);
        }
    };

    let node = GridNode::bind(config).await?;

    let handle = node.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, shutting down {}", handle.id());
            handle.shutdown();
        }
    });

    node.run().await?;
    Ok(())
}

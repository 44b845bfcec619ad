//! # Swap Node
//!
//! Entry point for the atomic swap coordinator daemon.
//!
//! Configuration comes from the environment; see [`NodeConfig::from_env`].

use anyhow::{Context, Result};
use tracing::info;

use swap_node::{NodeConfig, SwapNode};
use swap_telemetry::{init_telemetry, TelemetryConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = init_telemetry(TelemetryConfig::from_env())
        .context("Failed to initialize telemetry")?;

    let config = NodeConfig::from_env().context("Failed to load configuration")?;
    if std::env::var_os("SWAP_PRODUCTION").is_some() {
        config
            .validate_for_production()
            .context("Configuration is not fit for production")?;
    }

    let node = SwapNode::build(config).context("Failed to build swap node")?;
    node.start().await.context("Failed to start swap node")?;

    info!("Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    node.shutdown().await;
    Ok(())
}

//! Mutuals Node binary
//!
//! Roster daemon: member API, mutual-match recompute engine and reports.

use mutuals_node::{MutualsNode, NodeConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mutuals_node=info,mutuals_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Mutuals Node");

    let config = NodeConfig::from_env()?;

    // Create and run node
    let node = MutualsNode::new(config).await?;
    node.run().await?;

    Ok(())
}

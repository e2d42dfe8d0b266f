//! moobird node binary
//!
//! Runs the node with log-only collaborators: surface events and stream
//! items arrive through the admin socket.

use std::sync::Arc;

use moobird_node::dry_run::{IdleFeed, LogPlatform, LogSurface};
use moobird_node::tracker::TrelloTracker;
use moobird_node::{Collaborators, Node, NodeConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Handle the dry-run platform account posts as.
const DRY_RUN_HANDLE: &str = "moobird";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "moobird_node=info,moobird=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting moobird node");

    let config = NodeConfig::from_env()?;
    let collaborators = Collaborators {
        surface: Arc::new(LogSurface::new()),
        feed: Arc::new(IdleFeed::default()),
        tracker: Arc::new(TrelloTracker::new()?),
    };
    let node = Node::new(config, collaborators)?;

    // Covers groups configured after startup too.
    node.context()
        .platforms
        .set_fallback(Arc::new(LogPlatform::new(DRY_RUN_HANDLE)), DRY_RUN_HANDLE);

    node.run().await?;

    Ok(())
}

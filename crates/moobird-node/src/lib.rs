//! moobird Node - group consensus over actions on a live content stream
//!
//! Members of a chat group vote with reactions on whether to publish a
//! post or how to interact with items from a search feed. When a vote
//! reaches its threshold the node carries out the action exactly once.
//!
//! # Architecture
//!
//! - **Engine**: single-consumer event loop; every vote is applied and
//!   evaluated in arrival order
//! - **Dispatcher**: claims a decision, then publishes, amplifies,
//!   favorites, suppresses or escalates
//! - **Ingest**: filters feed items and opens them for votes
//! - **Sweeper**: retires candidates whose window closed
//! - **Settings**: per-group configuration persisted as JSON
//! - **Admin Socket**: Unix socket for local admin commands and bridged
//!   surface events (moobird-admin CLI)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use moobird_node::dry_run::{IdleFeed, LogSurface};
//! use moobird_node::tracker::TrelloTracker;
//! use moobird_node::{Collaborators, Node, NodeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let collaborators = Collaborators {
//!         surface: Arc::new(LogSurface::new()),
//!         feed: Arc::new(IdleFeed::default()),
//!         tracker: Arc::new(TrelloTracker::new()?),
//!     };
//!     let node = Node::new(NodeConfig::from_env()?, collaborators)?;
//!     node.run().await?;
//!     Ok(())
//! }
//! ```

pub mod admin_socket;
pub mod context;
pub mod dispatch;
pub mod dry_run;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod node;
pub mod platform;
pub mod proposal;
pub mod settings;
pub mod streams;
pub mod surface;
pub mod sweeper;
pub mod tracker;

#[cfg(test)]
mod testing;

pub use context::Context;
pub use engine::{Engine, Event, ReactionEvent};
pub use error::{Error, Result};
pub use node::{Collaborators, Node, NodeConfig};
pub use platform::{ContentPlatform, MediaCategory};
pub use settings::{GroupSettings, SettingsStore};
pub use surface::{Notice, NotificationSurface, Outbound};

//! moobird node - the main application entry point.
//!
//! Architecture:
//! - One event loop owning all candidate mutations
//! - One feed connection task per streaming group
//! - One periodic expiry sweeper
//! - Unix admin socket for local admin ops and bridged surface events
//!   (moobird-admin CLI)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use moobird_stream::{ContentFeed, FeedItem, StreamSupervisor};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::admin_socket::{AdminHandles, AdminSocket};
use crate::context::Context;
use crate::engine::{Engine, Event};
use crate::error::{Error, Result};
use crate::settings::SettingsStore;
use crate::streams::StreamControl;
use crate::surface::{NotificationSurface, UserId};
use crate::sweeper::{Sweeper, DEFAULT_SWEEP_INTERVAL};
use crate::tracker::Tracker;

/// Capacity of the event and feed queues.
pub const QUEUE_DEPTH: usize = 1024;

/// Configuration for a moobird node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Data directory
    pub data_dir: PathBuf,

    /// Group settings document
    pub settings_path: PathBuf,

    /// Admin socket path (for moobird-admin CLI)
    pub admin_socket: PathBuf,

    /// Time between expiry sweeps
    pub sweep_interval: Duration,

    /// The node's own user on the surface
    pub bot_user: UserId,
}

impl NodeConfig {
    /// Config rooted at `data_dir` with every other value defaulted.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            settings_path: data_dir.join("settings.json"),
            admin_socket: data_dir.join("admin.sock"),
            data_dir,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            bot_user: 0,
        }
    }

    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = PathBuf::from(
            lookup("MOOBIRD_DATA_DIR").unwrap_or_else(|| "./moobird-data".to_string()),
        );
        let mut config = Self::with_data_dir(data_dir);

        if let Some(path) = lookup("MOOBIRD_SETTINGS") {
            config.settings_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("MOOBIRD_ADMIN_SOCKET") {
            config.admin_socket = PathBuf::from(path);
        }
        if let Some(secs) = lookup("MOOBIRD_SWEEP_INTERVAL_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("invalid MOOBIRD_SWEEP_INTERVAL_SECS: {secs}")))?;
            if secs == 0 {
                return Err(Error::Config("MOOBIRD_SWEEP_INTERVAL_SECS must be positive".into()));
            }
            config.sweep_interval = Duration::from_secs(secs);
        }
        if let Some(user) = lookup("MOOBIRD_BOT_USER") {
            config.bot_user = user
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("invalid MOOBIRD_BOT_USER: {user}")))?;
        }

        Ok(config)
    }
}

/// External services the node talks to.
pub struct Collaborators {
    pub surface: Arc<dyn NotificationSurface>,
    pub feed: Arc<dyn ContentFeed>,
    pub tracker: Arc<dyn Tracker>,
}

/// A moobird node instance.
pub struct Node {
    config: NodeConfig,
    ctx: Arc<Context>,
    feed: Arc<dyn ContentFeed>,
    events_tx: mpsc::Sender<Event>,
    events_rx: mpsc::Receiver<Event>,
}

impl Node {
    /// Create a new node, loading group settings from disk.
    pub fn new(config: NodeConfig, collaborators: Collaborators) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let settings = SettingsStore::open(&config.settings_path)?;

        let ctx = Arc::new(Context::new(
            settings,
            collaborators.surface,
            collaborators.tracker,
            config.bot_user,
        ));
        let (events_tx, events_rx) = mpsc::channel(QUEUE_DEPTH);

        Ok(Self {
            config,
            ctx,
            feed: collaborators.feed,
            events_tx,
            events_rx,
        })
    }

    /// Shared handles, e.g. to register platform accounts before `run`.
    pub fn context(&self) -> Arc<Context> {
        Arc::clone(&self.ctx)
    }

    /// Sender for surface events from a chat bridge.
    pub fn events(&self) -> mpsc::Sender<Event> {
        self.events_tx.clone()
    }

    /// Run the node until ctrl-c.
    pub async fn run(self) -> Result<()> {
        info!("moobird node starting");
        info!("  Settings: {:?}", self.config.settings_path);
        info!("  Admin: {:?}", self.config.admin_socket);
        info!("  Sweep every {:?}", self.config.sweep_interval);

        let Self {
            config,
            ctx,
            feed,
            events_tx,
            events_rx,
        } = self;

        // Feed items join the event queue so they are ordered with votes.
        let (feed_tx, mut feed_rx) = mpsc::channel::<FeedItem>(QUEUE_DEPTH);
        let forward = events_tx.clone();
        tokio::spawn(async move {
            while let Some(item) = feed_rx.recv().await {
                if forward.send(Event::from(item)).await.is_err() {
                    break;
                }
            }
        });

        let streams = Arc::new(StreamControl::new(
            Arc::clone(&ctx),
            StreamSupervisor::new(feed, feed_tx),
        ));
        let engine = Arc::new(Engine::new(Arc::clone(&ctx)));
        let sweeper = Arc::new(Sweeper::new(Arc::clone(&ctx), config.sweep_interval));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(Arc::clone(&sweeper).run(shutdown_rx));

        let admin_socket = AdminSocket::new(
            AdminHandles {
                ctx: Arc::clone(&ctx),
                streams: Arc::clone(&streams),
                engine: Arc::clone(&engine),
                sweeper,
                events: events_tx.clone(),
            },
            &config.admin_socket,
        );
        tokio::spawn(async move {
            if let Err(e) = admin_socket.run().await {
                error!("Admin socket error: {}", e);
            }
        });

        let resumed = streams.resume();
        info!(resumed, "Streams resumed");

        tokio::select! {
            _ = Arc::clone(&engine).run(events_rx) => {}
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "Failed to listen for ctrl-c");
                }
                info!("Shutdown requested");
            }
        }

        streams.stop_all();
        shutdown_tx.send_replace(true);
        info!("moobird node stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_hang_off_data_dir() {
        let config = NodeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("./moobird-data"));
        assert_eq!(config.settings_path, PathBuf::from("./moobird-data/settings.json"));
        assert_eq!(config.admin_socket, PathBuf::from("./moobird-data/admin.sock"));
        assert_eq!(config.sweep_interval, Duration::from_secs(1800));
        assert_eq!(config.bot_user, 0);
    }

    #[test]
    fn overrides_from_environment() {
        let config = NodeConfig::from_lookup(lookup(&[
            ("MOOBIRD_DATA_DIR", "/var/lib/moobird"),
            ("MOOBIRD_ADMIN_SOCKET", "/run/moobird.sock"),
            ("MOOBIRD_SWEEP_INTERVAL_SECS", "60"),
            ("MOOBIRD_BOT_USER", "12345"),
        ]))
        .unwrap();
        assert_eq!(config.settings_path, PathBuf::from("/var/lib/moobird/settings.json"));
        assert_eq!(config.admin_socket, PathBuf::from("/run/moobird.sock"));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.bot_user, 12345);
    }

    #[test]
    fn invalid_values_are_errors() {
        assert!(matches!(
            NodeConfig::from_lookup(lookup(&[("MOOBIRD_SWEEP_INTERVAL_SECS", "soon")])),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            NodeConfig::from_lookup(lookup(&[("MOOBIRD_SWEEP_INTERVAL_SECS", "0")])),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            NodeConfig::from_lookup(lookup(&[("MOOBIRD_BOT_USER", "-1")])),
            Err(Error::Config(_))
        ));
    }
}

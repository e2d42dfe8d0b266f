//! Feed connection supervisor.
//!
//! One push-feed connection per group, each driven by its own task that
//! forwards items into a shared sink. The connection state machine is:
//!
//! ```text
//! Stopped ──start──► Connecting ──connected──► Streaming
//!    ▲                   │                         │
//!    └───────stop────────┴──────stop / closed──────┘
//! ```
//!
//! `stop` is idempotent. Changing the search terms is a full reconnect
//! (`stop` then `start`), never an incremental update.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use moobird_consensus::GroupId;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::item::ContentItem;

/// Connection state for one group's feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Stopped,
    Connecting,
    Streaming,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "Stopped"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Streaming => write!(f, "Streaming"),
        }
    }
}

/// An item received on a group's feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub group: GroupId,
    pub item: ContentItem,
}

/// The external push feed.
#[async_trait]
pub trait ContentFeed: Send + Sync {
    /// Open a filtered stream tracking `terms`. The stream ends when the
    /// returned receiver closes.
    async fn connect(&self, group: GroupId, terms: &[String]) -> Result<mpsc::Receiver<ContentItem>>;
}

struct Connection {
    terms: Vec<String>,
    state: watch::Receiver<StreamState>,
    cancel: oneshot::Sender<()>,
}

impl Connection {
    fn is_running(&self) -> bool {
        *self.state.borrow() != StreamState::Stopped
    }
}

/// Owns every group's feed connection.
pub struct StreamSupervisor {
    feed: Arc<dyn ContentFeed>,
    sink: mpsc::Sender<FeedItem>,
    connections: Mutex<HashMap<GroupId, Connection>>,
}

impl StreamSupervisor {
    /// Create a supervisor forwarding every feed item into `sink`.
    pub fn new(feed: Arc<dyn ContentFeed>, sink: mpsc::Sender<FeedItem>) -> Self {
        Self {
            feed,
            sink,
            connections: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<GroupId, Connection>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state of a group's feed.
    pub fn state(&self, group: GroupId) -> StreamState {
        self.lock()
            .get(&group)
            .map(|c| *c.state.borrow())
            .unwrap_or(StreamState::Stopped)
    }

    /// Whether a group's feed is connecting or streaming.
    pub fn is_running(&self, group: GroupId) -> bool {
        self.state(group) != StreamState::Stopped
    }

    /// Terms the group's current connection tracks.
    pub fn terms(&self, group: GroupId) -> Option<Vec<String>> {
        self.lock().get(&group).map(|c| c.terms.clone())
    }

    /// Watch a group's state transitions.
    pub fn subscribe(&self, group: GroupId) -> Option<watch::Receiver<StreamState>> {
        self.lock().get(&group).map(|c| c.state.clone())
    }

    /// Start a feed for `group`. Must be called inside a tokio runtime.
    pub fn start(&self, group: GroupId, terms: Vec<String>) -> Result<()> {
        if terms.iter().all(|t| t.trim().is_empty()) {
            return Err(Error::NoSearchTerms(group));
        }

        let mut connections = self.lock();
        if connections.get(&group).is_some_and(Connection::is_running) {
            return Err(Error::AlreadyRunning(group));
        }

        let (state_tx, state_rx) = watch::channel(StreamState::Connecting);
        let (cancel_tx, cancel_rx) = oneshot::channel();

        tokio::spawn(run_connection(
            Arc::clone(&self.feed),
            self.sink.clone(),
            group,
            terms.clone(),
            state_tx,
            cancel_rx,
        ));

        info!(%group, ?terms, "Stream starting");
        connections.insert(
            group,
            Connection {
                terms,
                state: state_rx,
                cancel: cancel_tx,
            },
        );
        Ok(())
    }

    /// Stop a group's feed. Returns whether it was running; stopping a
    /// stopped feed is a no-op.
    pub fn stop(&self, group: GroupId) -> bool {
        let Some(connection) = self.lock().remove(&group) else {
            return false;
        };
        let was_running = connection.is_running();
        // The task may already have exited on its own.
        let _ = connection.cancel.send(());
        if was_running {
            info!(%group, "Stream stopped");
        }
        was_running
    }

    /// Reconnect with new terms.
    pub fn restart(&self, group: GroupId, terms: Vec<String>) -> Result<()> {
        self.stop(group);
        self.start(group, terms)
    }

    /// Stop every feed.
    pub fn stop_all(&self) {
        let groups: Vec<GroupId> = self.lock().keys().copied().collect();
        for group in groups {
            self.stop(group);
        }
    }
}

async fn run_connection(
    feed: Arc<dyn ContentFeed>,
    sink: mpsc::Sender<FeedItem>,
    group: GroupId,
    terms: Vec<String>,
    state: watch::Sender<StreamState>,
    mut cancel: oneshot::Receiver<()>,
) {
    let connected = tokio::select! {
        _ = &mut cancel => {
            debug!(%group, "Stream cancelled while connecting");
            state.send_replace(StreamState::Stopped);
            return;
        }
        result = feed.connect(group, &terms) => result,
    };

    let mut items = match connected {
        Ok(items) => items,
        Err(e) => {
            warn!(%group, error = %e, "Stream connection failed");
            state.send_replace(StreamState::Stopped);
            return;
        }
    };

    state.send_replace(StreamState::Streaming);
    info!(%group, "Stream connected");

    loop {
        tokio::select! {
            _ = &mut cancel => break,
            item = items.recv() => match item {
                Some(item) => {
                    if sink.send(FeedItem { group, item }).await.is_err() {
                        debug!(%group, "Feed sink closed");
                        break;
                    }
                }
                None => {
                    warn!(%group, "Feed closed by remote");
                    break;
                }
            },
        }
    }

    state.send_replace(StreamState::Stopped);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Default)]
    struct MockFeed {
        senders: Mutex<Vec<mpsc::Sender<ContentItem>>>,
        tracked: Mutex<Vec<Vec<String>>>,
        refuse: bool,
    }

    impl MockFeed {
        fn last_sender(&self) -> mpsc::Sender<ContentItem> {
            self.senders.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl ContentFeed for MockFeed {
        async fn connect(&self, _group: GroupId, terms: &[String]) -> Result<mpsc::Receiver<ContentItem>> {
            if self.refuse {
                return Err(Error::Connect("refused".into()));
            }
            let (tx, rx) = mpsc::channel(8);
            self.senders.lock().unwrap().push(tx);
            self.tracked.lock().unwrap().push(terms.to_vec());
            Ok(rx)
        }
    }

    async fn wait_for(supervisor: &StreamSupervisor, group: GroupId, want: StreamState) {
        let mut rx = supervisor.subscribe(group).unwrap();
        tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|s| *s == want))
            .await
            .expect("state transition timed out")
            .unwrap();
    }

    fn terms(t: &[&str]) -> Vec<String> {
        t.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn forwards_items_while_streaming() {
        let feed = Arc::new(MockFeed::default());
        let (tx, mut rx) = mpsc::channel(8);
        let supervisor = StreamSupervisor::new(feed.clone(), tx);
        let group = GroupId(1);

        supervisor.start(group, terms(&["BNB"])).unwrap();
        wait_for(&supervisor, group, StreamState::Streaming).await;

        feed.last_sender().send(ContentItem::new(5, "a", "hello")).await.unwrap();
        let got = rx.recv().await.unwrap();
        assert_eq!(got.group, group);
        assert_eq!(got.item.id, 5);
    }

    #[tokio::test]
    async fn start_requires_terms_and_is_exclusive() {
        let feed = Arc::new(MockFeed::default());
        let (tx, _rx) = mpsc::channel(8);
        let supervisor = StreamSupervisor::new(feed, tx);
        let group = GroupId(1);

        assert!(matches!(supervisor.start(group, vec![]), Err(Error::NoSearchTerms(_))));
        supervisor.start(group, terms(&["x"])).unwrap();
        assert!(matches!(
            supervisor.start(group, terms(&["y"])),
            Err(Error::AlreadyRunning(_))
        ));
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let feed = Arc::new(MockFeed::default());
        let (tx, _rx) = mpsc::channel(8);
        let supervisor = StreamSupervisor::new(feed, tx);
        let group = GroupId(1);

        assert!(!supervisor.stop(group));
        supervisor.start(group, terms(&["x"])).unwrap();
        assert!(supervisor.stop(group));
        assert!(!supervisor.stop(group));
        assert_eq!(supervisor.state(group), StreamState::Stopped);
    }

    #[tokio::test]
    async fn restart_reconnects_with_new_terms() {
        let feed = Arc::new(MockFeed::default());
        let (tx, _rx) = mpsc::channel(8);
        let supervisor = StreamSupervisor::new(feed.clone(), tx);
        let group = GroupId(1);

        supervisor.start(group, terms(&["old"])).unwrap();
        wait_for(&supervisor, group, StreamState::Streaming).await;
        let old = feed.last_sender();

        supervisor.restart(group, terms(&["new"])).unwrap();
        wait_for(&supervisor, group, StreamState::Streaming).await;

        assert_eq!(supervisor.terms(group), Some(terms(&["new"])));
        assert_eq!(feed.tracked.lock().unwrap().len(), 2);
        // The old task dropped its receiver.
        tokio::time::timeout(Duration::from_secs(1), old.closed()).await.unwrap();
    }

    #[tokio::test]
    async fn remote_close_returns_to_stopped() {
        let feed = Arc::new(MockFeed::default());
        let (tx, _rx) = mpsc::channel(8);
        let supervisor = StreamSupervisor::new(feed.clone(), tx);
        let group = GroupId(1);

        supervisor.start(group, terms(&["x"])).unwrap();
        wait_for(&supervisor, group, StreamState::Streaming).await;
        let mut state = supervisor.subscribe(group).unwrap();
        feed.senders.lock().unwrap().clear();

        tokio::time::timeout(Duration::from_secs(1), state.wait_for(|s| *s == StreamState::Stopped))
            .await
            .unwrap()
            .unwrap();
        // A stopped connection can be started again.
        supervisor.start(group, terms(&["x"])).unwrap();
    }

    #[tokio::test]
    async fn refused_connection_stops() {
        let feed = Arc::new(MockFeed {
            refuse: true,
            ..Default::default()
        });
        let (tx, _rx) = mpsc::channel(8);
        let supervisor = StreamSupervisor::new(feed, tx);
        let group = GroupId(3);

        supervisor.start(group, terms(&["x"])).unwrap();
        wait_for(&supervisor, group, StreamState::Stopped).await;
        assert!(!supervisor.is_running(group));
    }
}

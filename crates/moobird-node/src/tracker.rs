//! Escalation tracker.
//!
//! Escalated items are filed as cards on a project board.

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::error::Result;
use crate::settings::TrackerConfig;

/// Board card API used by [`TrelloTracker`].
pub const TRELLO_CARDS_URL: &str = "https://api.trello.com/1/cards";

/// A card to file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerCard {
    pub name: String,
    /// Link the card points at.
    pub link: String,
}

#[async_trait]
pub trait Tracker: Send + Sync {
    async fn submit(&self, config: &TrackerConfig, card: &TrackerCard) -> Result<()>;
}

/// Files cards through the Trello REST API.
pub struct TrelloTracker {
    client: reqwest::Client,
    endpoint: String,
}

impl TrelloTracker {
    pub fn new() -> Result<Self> {
        Self::with_endpoint(TRELLO_CARDS_URL)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self::with_client(client, endpoint))
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Tracker for TrelloTracker {
    async fn submit(&self, config: &TrackerConfig, card: &TrackerCard) -> Result<()> {
        self.client
            .post(&self.endpoint)
            .query(&[
                ("key", config.key.as_str()),
                ("token", config.token.as_str()),
                ("idList", config.list_id.as_str()),
                ("cardRole", "link"),
                ("name", card.name.as_str()),
                ("urlSource", card.link.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;

        info!(list = %config.list_id, link = %card.link, "Tracker card filed");
        Ok(())
    }
}

//! Log-only collaborators.
//!
//! Used by the binary when no chat bridge or platform credentials are
//! wired in: every external call is logged and answered locally, so votes
//! injected through the admin socket run the whole pipeline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use moobird_consensus::{ContentId, GroupId};
use moobird_stream::{ContentFeed, ContentItem};
use tokio::sync::mpsc;
use tracing::info;

use crate::error::{Error, Result};
use crate::platform::{ContentPlatform, MediaCategory, MediaRef, Published};
use crate::surface::{Attachment, ChannelId, FetchedMessage, MessageId, NotificationSurface, Outbound};

/// Surface that logs instead of posting. Posted messages can be fetched
/// back; unknown messages read as empty.
#[derive(Debug)]
pub struct LogSurface {
    next_id: AtomicU64,
    messages: Mutex<HashMap<MessageId, FetchedMessage>>,
}

impl Default for LogSurface {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            messages: Mutex::new(HashMap::new()),
        }
    }
}

impl LogSurface {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationSurface for LogSurface {
    async fn post_message(&self, channel: ChannelId, message: Outbound) -> Result<MessageId> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let content = message.notice.to_string();
        info!(channel, id, reply_to = ?message.reply_to, %content, "post_message");
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, FetchedMessage::new(id, channel, content));
        Ok(id)
    }

    async fn add_vote_affordance(&self, channel: ChannelId, message: MessageId, symbol: &str) -> Result<()> {
        info!(channel, message, symbol, "add_vote_affordance");
        Ok(())
    }

    async fn clear_vote_affordance(
        &self,
        channel: ChannelId,
        message: MessageId,
        symbol: Option<&str>,
    ) -> Result<()> {
        info!(channel, message, ?symbol, "clear_vote_affordance");
        Ok(())
    }

    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> Result<()> {
        info!(channel, message, "delete_message");
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&message);
        Ok(())
    }

    async fn fetch_message(&self, channel: ChannelId, message: MessageId) -> Result<FetchedMessage> {
        Ok(self
            .messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&message)
            .cloned()
            .unwrap_or_else(|| FetchedMessage::new(message, channel, String::new())))
    }

    async fn download_attachment(&self, attachment: &Attachment) -> Result<Vec<u8>> {
        Err(Error::ExternalApi(format!(
            "dry run cannot download {}",
            attachment.url
        )))
    }
}

/// Platform account that logs instead of acting.
#[derive(Debug)]
pub struct LogPlatform {
    handle: String,
    next_id: AtomicU64,
}

impl LogPlatform {
    pub fn new(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            next_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl ContentPlatform for LogPlatform {
    async fn own_handle(&self) -> Result<String> {
        Ok(self.handle.clone())
    }

    async fn publish(&self, text: &str, media: &[MediaRef]) -> Result<Published> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        info!(id, media = media.len(), %text, "publish");
        Ok(Published {
            content_id: ContentId(id),
            author_handle: self.handle.clone(),
        })
    }

    async fn upload_media(&self, bytes: Vec<u8>, category: MediaCategory) -> Result<MediaRef> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        info!(id, size = bytes.len(), %category, "upload_media");
        Ok(MediaRef(id))
    }

    async fn amplify(&self, id: ContentId) -> Result<()> {
        info!(%id, "amplify");
        Ok(())
    }

    async fn favorite(&self, id: ContentId) -> Result<()> {
        info!(%id, "favorite");
        Ok(())
    }

    async fn fetch_by_id(&self, id: ContentId) -> Result<ContentItem> {
        Err(Error::ExternalApi(format!("dry run cannot fetch item {id}")))
    }
}

/// Feed that connects but never delivers. Stream items can still be
/// injected through the admin socket.
#[derive(Debug, Default)]
pub struct IdleFeed {
    open: Mutex<HashMap<GroupId, mpsc::Sender<ContentItem>>>,
}

#[async_trait]
impl ContentFeed for IdleFeed {
    async fn connect(&self, group: GroupId, terms: &[String]) -> moobird_stream::Result<mpsc::Receiver<ContentItem>> {
        let (tx, rx) = mpsc::channel(1);
        info!(%group, ?terms, "connect");
        self.open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(group, tx);
        Ok(rx)
    }
}

//! Recording doubles for the external collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use moobird_consensus::{ContentId, GroupId};
use moobird_stream::ContentItem;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::platform::{ContentPlatform, MediaCategory, MediaRef, Published};
use crate::settings::{SettingsStore, TrackerConfig};
use crate::surface::{
    Attachment, ChannelId, FetchedMessage, MessageId, Notice, NotificationSurface, Outbound,
    Reaction, UserId, Voter,
};
use crate::tracker::{Tracker, TrackerCard};

pub const GROUP: GroupId = GroupId(1);
pub const STREAM_CHANNEL: ChannelId = 50;
pub const BOT: UserId = 999;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCall {
    Post {
        channel: ChannelId,
        id: MessageId,
        message: Outbound,
    },
    AddAffordance {
        message: MessageId,
        symbol: String,
    },
    ClearAffordance {
        message: MessageId,
        symbol: Option<String>,
    },
    Delete {
        message: MessageId,
    },
}

#[derive(Default)]
pub struct RecordingSurface {
    next_id: AtomicU64,
    calls: Mutex<Vec<SurfaceCall>>,
    messages: Mutex<HashMap<MessageId, FetchedMessage>>,
    pub fail_posts: AtomicBool,
}

impl RecordingSurface {
    /// Make a message readable through `fetch_message`.
    pub fn seed(&self, message: FetchedMessage) {
        self.messages.lock().unwrap().insert(message.id, message);
    }

    /// Record presses of `symbol` on a stored message.
    pub fn press(&self, message: MessageId, symbol: &str, voters: &[UserId]) {
        let mut messages = self.messages.lock().unwrap();
        let msg = messages.get_mut(&message).unwrap();
        msg.reactions.push(Reaction {
            symbol: symbol.into(),
            voters: voters.iter().map(|&id| Voter { id, bot: false }).collect(),
        });
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SurfaceCall::Post { message, .. } => Some(message.notice),
                _ => None,
            })
            .collect()
    }

    pub fn added(&self, message: MessageId) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SurfaceCall::AddAffordance { message: m, symbol } if m == message => Some(symbol),
                _ => None,
            })
            .collect()
    }

    pub fn deleted(&self) -> Vec<MessageId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SurfaceCall::Delete { message } => Some(message),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: SurfaceCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl NotificationSurface for RecordingSurface {
    async fn post_message(&self, channel: ChannelId, message: Outbound) -> Result<MessageId> {
        if self.fail_posts.load(Ordering::SeqCst) {
            return Err(Error::ExternalApi("surface unavailable".into()));
        }
        let id = 10_000 + self.next_id.fetch_add(1, Ordering::SeqCst);
        self.seed(FetchedMessage::new(id, channel, message.notice.to_string()));
        self.record(SurfaceCall::Post { channel, id, message });
        Ok(id)
    }

    async fn add_vote_affordance(&self, _channel: ChannelId, message: MessageId, symbol: &str) -> Result<()> {
        self.record(SurfaceCall::AddAffordance {
            message,
            symbol: symbol.into(),
        });
        Ok(())
    }

    async fn clear_vote_affordance(
        &self,
        _channel: ChannelId,
        message: MessageId,
        symbol: Option<&str>,
    ) -> Result<()> {
        self.record(SurfaceCall::ClearAffordance {
            message,
            symbol: symbol.map(str::to_string),
        });
        Ok(())
    }

    async fn delete_message(&self, _channel: ChannelId, message: MessageId) -> Result<()> {
        self.messages.lock().unwrap().remove(&message);
        self.record(SurfaceCall::Delete { message });
        Ok(())
    }

    async fn fetch_message(&self, _channel: ChannelId, message: MessageId) -> Result<FetchedMessage> {
        self.messages
            .lock()
            .unwrap()
            .get(&message)
            .cloned()
            .ok_or_else(|| Error::ExternalApi(format!("unknown message {message}")))
    }

    async fn download_attachment(&self, attachment: &Attachment) -> Result<Vec<u8>> {
        Ok(vec![0; attachment.size as usize])
    }
}

#[derive(Default)]
pub struct MockPlatform {
    pub published: AtomicU32,
    pub uploads: AtomicU32,
    pub amplified: AtomicU32,
    pub favorited: AtomicU32,
    pub fail: AtomicBool,
    /// Simulated latency of every external call.
    pub delay: Option<Duration>,
    pub texts: Mutex<Vec<String>>,
}

impl MockPlatform {
    async fn call(&self) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::ExternalApi("platform rejected the request".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ContentPlatform for MockPlatform {
    async fn own_handle(&self) -> Result<String> {
        Ok("moobird".into())
    }

    async fn publish(&self, text: &str, _media: &[MediaRef]) -> Result<Published> {
        self.call().await?;
        let n = self.published.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().unwrap().push(text.to_string());
        Ok(Published {
            content_id: ContentId(500 + u64::from(n)),
            author_handle: "moobird".into(),
        })
    }

    async fn upload_media(&self, _bytes: Vec<u8>, _category: MediaCategory) -> Result<MediaRef> {
        self.call().await?;
        let n = self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(MediaRef(u64::from(n)))
    }

    async fn amplify(&self, _id: ContentId) -> Result<()> {
        self.call().await?;
        self.amplified.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn favorite(&self, _id: ContentId) -> Result<()> {
        self.call().await?;
        self.favorited.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch_by_id(&self, id: ContentId) -> Result<ContentItem> {
        self.call().await?;
        Ok(ContentItem::new(id.0, "author", "fetched text"))
    }
}

#[derive(Default)]
pub struct MockTracker {
    pub cards: Mutex<Vec<TrackerCard>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl Tracker for MockTracker {
    async fn submit(&self, _config: &TrackerConfig, card: &TrackerCard) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::ExternalApi("tracker unavailable".into()));
        }
        self.cards.lock().unwrap().push(card.clone());
        Ok(())
    }
}

/// A context wired to recording doubles, with [`GROUP`] fully configured.
pub struct Harness {
    pub ctx: Arc<Context>,
    pub surface: Arc<RecordingSurface>,
    pub platform: Arc<MockPlatform>,
    pub tracker: Arc<MockTracker>,
}

impl Harness {
    pub fn new(votes_needed: u32) -> Self {
        Self::with_platform(MockPlatform::default(), votes_needed)
    }

    pub fn with_platform(platform: MockPlatform, votes_needed: u32) -> Self {
        let settings = SettingsStore::in_memory();
        settings.set_votes_needed(GROUP, votes_needed).unwrap();
        settings.set_target_channel(GROUP, STREAM_CHANNEL).unwrap();
        settings
            .set_tracker(
                GROUP,
                TrackerConfig {
                    key: "key".into(),
                    token: "token".into(),
                    list_id: "list".into(),
                },
            )
            .unwrap();

        let surface = Arc::new(RecordingSurface::default());
        let platform = Arc::new(platform);
        let tracker = Arc::new(MockTracker::default());
        let ctx = Context::new(settings, surface.clone(), tracker.clone(), BOT);
        ctx.platforms.insert(GROUP, platform.clone(), "moobird");

        Self {
            ctx: Arc::new(ctx),
            surface,
            platform,
            tracker,
        }
    }
}

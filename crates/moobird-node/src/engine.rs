//! The single-consumer event loop.
//!
//! Surface events and feed items arrive on one queue. Store mutations and
//! evaluation run synchronously here, in arrival order, so a candidate's
//! votes are always seen in the order they happened. External I/O is
//! spawned only after the store has handed out a claim, which keeps
//! duplicate vote events from re-triggering an action already in flight.

use std::sync::Arc;

use moobird_consensus::{CandidateId, CandidateKind, Claimed, GroupId, VoteOption};
use moobird_stream::FeedItem;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::context::{now_secs, Context};
use crate::dispatch::Dispatcher;
use crate::ingest::Ingestor;
use crate::surface::{ChannelId, MessageId, Notice, Outbound, UserId};

/// Someone pressed or released a vote affordance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionEvent {
    pub channel: ChannelId,
    pub message: MessageId,
    pub symbol: String,
    pub actor: UserId,
    /// Set when the actor is any bot account.
    pub actor_is_bot: bool,
}

/// An inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ReactionAdded(ReactionEvent),
    ReactionRemoved(ReactionEvent),
    MessageEdited {
        channel: ChannelId,
        message: MessageId,
    },
    MessageDeleted {
        channel: ChannelId,
        message: MessageId,
    },
    StreamItem(FeedItem),
}

impl From<FeedItem> for Event {
    fn from(item: FeedItem) -> Self {
        Self::StreamItem(item)
    }
}

pub struct Engine {
    ctx: Arc<Context>,
    dispatcher: Arc<Dispatcher>,
    ingestor: Arc<Ingestor>,
}

impl Engine {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::new(Arc::clone(&ctx))),
            ingestor: Arc::new(Ingestor::new(Arc::clone(&ctx))),
            ctx,
        }
    }

    /// Consume events until every sender is dropped.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<Event>) {
        info!("Event loop started");
        while let Some(event) = events.recv().await {
            self.handle(event);
        }
        info!("Event loop stopped");
    }

    /// Apply one event. Returns the tasks it spawned for external work.
    pub fn handle(&self, event: Event) -> Vec<JoinHandle<()>> {
        match event {
            Event::ReactionAdded(reaction) => self.on_reaction(reaction, 1),
            Event::ReactionRemoved(reaction) => self.on_reaction(reaction, -1),
            Event::MessageEdited { channel, message } => self.on_edited(channel, message),
            Event::MessageDeleted { channel, message } => self.on_deleted(channel, message),
            Event::StreamItem(item) => self.on_stream_item(item),
        }
    }

    fn on_reaction(&self, reaction: ReactionEvent, delta: i32) -> Vec<JoinHandle<()>> {
        if reaction.actor_is_bot || reaction.actor == self.ctx.bot_user {
            return Vec::new();
        }
        let Some(option) = VoteOption::from_symbol(&reaction.symbol) else {
            return Vec::new();
        };
        let id = CandidateId(reaction.message);
        let Some(candidate) = self.ctx.store.get(id) else {
            return Vec::new();
        };

        if delta < 0 {
            match self.ctx.store.record_vote(id, option, delta) {
                Ok(count) => debug!(%id, %option, count, "Vote withdrawn"),
                Err(e) => debug!(%id, %option, error = %e, "Vote removal ignored"),
            }
            return Vec::new();
        }

        let thresholds = self.ctx.settings.thresholds(candidate.group);
        match self.ctx.store.apply_vote(id, option, delta, &thresholds) {
            Ok(applied) => {
                debug!(%id, %option, count = applied.count, "Vote recorded");
                applied.claims.into_iter().map(|c| self.spawn_dispatch(c)).collect()
            }
            Err(e) => {
                debug!(%id, %option, error = %e, "Vote ignored");
                Vec::new()
            }
        }
    }

    fn spawn_dispatch(&self, claimed: Claimed) -> JoinHandle<()> {
        let dispatcher = Arc::clone(&self.dispatcher);
        tokio::spawn(async move {
            // Failures are reported on the surface by the dispatcher.
            let _ = dispatcher.execute(claimed).await;
        })
    }

    /// Re-evaluate a group's candidates, e.g. after its threshold changed.
    pub fn settle_group(&self, group: GroupId) -> Vec<JoinHandle<()>> {
        let thresholds = self.ctx.settings.thresholds(group);
        self.ctx
            .store
            .scan(|c| c.group == group)
            .into_iter()
            .flat_map(|c| match self.ctx.store.settle(c.id, &thresholds) {
                Ok(claims) => claims,
                Err(e) => {
                    debug!(id = %c.id, error = %e, "Settle skipped");
                    Vec::new()
                }
            })
            .map(|claimed| self.spawn_dispatch(claimed))
            .collect()
    }

    /// An edited source message withdraws the post proposal built on it.
    fn on_edited(&self, channel: ChannelId, message: MessageId) -> Vec<JoinHandle<()>> {
        let withdrawn = self.ctx.store.withdraw_matching(message, |c| {
            c.kind == CandidateKind::TweetPost && c.anchor.source == message
        });
        withdrawn
            .into_iter()
            .map(|candidate| {
                info!(id = %candidate.id, "Post proposal withdrawn after edit");
                let ctx = Arc::clone(&self.ctx);
                tokio::spawn(async move {
                    if let Err(e) = ctx.surface.delete_message(channel, candidate.id.0).await {
                        warn!(id = %candidate.id, error = %e, "Failed to delete withdrawn vote");
                    }
                    let notice = Outbound::reply(candidate.anchor.source, Notice::Withdrawn);
                    if let Err(e) = ctx.surface.post_message(channel, notice).await {
                        warn!(id = %candidate.id, error = %e, "Failed to post withdrawal notice");
                    }
                })
            })
            .collect()
    }

    /// A deleted vote or source message withdraws every candidate on it.
    fn on_deleted(&self, channel: ChannelId, message: MessageId) -> Vec<JoinHandle<()>> {
        self.ctx
            .store
            .withdraw(message)
            .into_iter()
            .filter(|c| c.id.0 != message)
            .map(|candidate| {
                info!(id = %candidate.id, "Candidate withdrawn, source deleted");
                let ctx = Arc::clone(&self.ctx);
                tokio::spawn(async move {
                    if let Err(e) = ctx.surface.delete_message(channel, candidate.id.0).await {
                        warn!(id = %candidate.id, error = %e, "Failed to delete orphaned vote");
                    }
                })
            })
            .collect()
    }

    fn on_stream_item(&self, item: FeedItem) -> Vec<JoinHandle<()>> {
        let Some(admitted) = self.ingestor.admit(item) else {
            return Vec::new();
        };
        let ingestor = Arc::clone(&self.ingestor);
        vec![tokio::spawn(async move {
            // Failures are logged by the ingestor.
            let _ = ingestor.register(admitted, now_secs()).await;
        })]
    }
}

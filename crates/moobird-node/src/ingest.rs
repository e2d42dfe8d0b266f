//! Stream ingestion.
//!
//! Feed items that survive the filter are posted to the group's target
//! channel and opened for interaction votes. Admission is synchronous and
//! reserves the item's `(group, content)` pair so a duplicate delivery that
//! arrives while the first copy is still being posted is dropped.

use std::sync::Arc;

use moobird_consensus::{Anchor, CandidateId, CandidateKind, ContentId, GroupId, NewCandidate, VoteOption};
use moobird_stream::filter::normalize_handle;
use moobird_stream::{screen, ContentItem, FeedItem, FilterContext};
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::error::Result;
use crate::surface::{ChannelId, Notice, Outbound};

/// Interaction options offered on every stream item, in display order.
pub const INTERACTIONS: [VoteOption; 4] = [
    VoteOption::Amplify,
    VoteOption::Favorite,
    VoteOption::Suppress,
    VoteOption::Escalate,
];

/// An item that passed the filter and holds a reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admitted {
    pub group: GroupId,
    pub channel: ChannelId,
    pub item: ContentItem,
}

impl Admitted {
    fn target(&self) -> ContentId {
        self.item.content_id()
    }
}

pub struct Ingestor {
    ctx: Arc<Context>,
}

impl Ingestor {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Filter and reserve a feed item. `None` means it was dropped.
    pub fn admit(&self, feed_item: FeedItem) -> Option<Admitted> {
        let FeedItem { group, item } = feed_item;

        let Some(settings) = self.ctx.settings.get(group) else {
            debug!(%group, "Item for unconfigured group dropped");
            return None;
        };
        let Some(own_handle) = self.ctx.platforms.handle(group) else {
            warn!(%group, "Item dropped, no platform account");
            return None;
        };
        let Some(channel) = settings.target_channel else {
            warn!(%group, "Item dropped, no target channel");
            return None;
        };

        let filter = FilterContext {
            own_handle: &own_handle,
            search_terms: &settings.search_terms,
            ignore: &settings.ignore_terms,
        };
        if let Err(reason) = screen(&item, &filter) {
            debug!(%group, item = item.id, %reason, "Item filtered");
            return None;
        }

        if !self.ctx.store.reserve_target(group, item.content_id()) {
            debug!(%group, item = item.id, "Duplicate item dropped");
            return None;
        }

        Some(Admitted {
            group,
            channel,
            item,
        })
    }

    /// Post an admitted item and open it for votes. The reservation is
    /// released if the item never becomes a candidate.
    pub async fn register(&self, admitted: Admitted, now: u64) -> Result<CandidateId> {
        let result = self.open_vote(&admitted, now).await;
        if let Err(e) = &result {
            self.ctx.store.release_target(admitted.group, admitted.target());
            warn!(group = %admitted.group, item = admitted.item.id, error = %e, "Failed to register stream item");
        }
        result
    }

    async fn open_vote(&self, admitted: &Admitted, now: u64) -> Result<CandidateId> {
        let Admitted {
            group,
            channel,
            item,
        } = admitted;

        let message = self
            .ctx
            .surface
            .post_message(
                *channel,
                Outbound::new(Notice::StreamItem {
                    link: item.permalink(),
                }),
            )
            .await?;

        let candidate = self.ctx.store.create(NewCandidate {
            id: CandidateId(message),
            group: *group,
            kind: CandidateKind::Interact,
            proposed_at: now,
            target_content_id: Some(item.content_id()),
            anchor: Anchor {
                channel: *channel,
                source: message,
            },
            author_handle: Some(normalize_handle(&item.author.handle)),
        })?;

        for option in INTERACTIONS {
            if let Err(e) = self
                .ctx
                .surface
                .add_vote_affordance(*channel, message, option.symbol())
                .await
            {
                warn!(id = %candidate.id, error = %e, "Failed to add vote affordance");
            }
        }

        info!(%group, id = %candidate.id, item = item.id, "Stream item open for votes");
        Ok(candidate.id)
    }
}

//! Manual post proposals.
//!
//! A member points the node at a message; the node checks the draft can be
//! published, posts a preview and opens a `TweetPost` vote keyed by the
//! preview's id.

use std::sync::LazyLock;

use moobird_consensus::{Anchor, CandidateId, CandidateKind, GroupId, NewCandidate, VoteOption};
use regex::Regex;
use tracing::{info, warn};
use unicode_segmentation::UnicodeSegmentation;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::platform::MediaCategory;
use crate::surface::{ChannelId, MessageId, Notice, Outbound};

/// Platform length limit.
pub const MAX_POST_LENGTH: usize = 280;

/// Every link counts as this many characters, whatever its real length.
pub const LINK_LENGTH: usize = 23;

/// A request to put a message to the vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostProposal {
    pub group: GroupId,
    pub channel: ChannelId,
    /// Message whose text and attachment would be published.
    pub source: MessageId,
}

/// A back-ticked mention, up to the next back-tick on the same line.
static MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`(@.*?)`").expect("mention regex is valid"));

/// A link runs from its scheme to the next whitespace.
static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("link regex is valid"));

/// Strip the back-ticks members wrap `@mentions` in so the surface does not
/// ping anyone.
pub fn normalize_mentions(text: &str) -> String {
    MENTION.replace_all(text, "$1").into_owned()
}

fn is_emoji(c: char) -> bool {
    matches!(
        u32::from(c),
        0x1F000..=0x1FAFF | 0x2600..=0x27BF | 0x2B00..=0x2BFF | 0x1FC00..=0x1FFFF
    )
}

/// Weight of text without links. An emoji grapheme, including joined
/// sequences and skin-tone variants, counts 2.
fn plain_length(text: &str) -> usize {
    text.graphemes(true)
        .map(|g| {
            if g.chars().any(is_emoji) {
                2
            } else {
                g.chars().count()
            }
        })
        .sum()
}

/// Length as the platform counts it: every link is [`LINK_LENGTH`] wherever
/// it appears and emoji count double.
pub fn weighted_length(text: &str) -> usize {
    let mut length = 0;
    let mut rest = 0;
    for link in LINK.find_iter(text) {
        length += plain_length(&text[rest..link.start()]) + LINK_LENGTH;
        rest = link.end();
    }
    length + plain_length(&text[rest..])
}

/// Notice for a failed command, or `None` when the error is internal.
fn user_notice(error: &Error) -> Option<Notice> {
    match error {
        Error::TooLong(overflow) => Some(Notice::TooLong { overflow: *overflow }),
        Error::MediaTooLarge { limit_mb, .. } => Some(Notice::MediaTooLarge { limit_mb: *limit_mb }),
        Error::ConfigMissing { what, .. } => Some(Notice::SetupRequired {
            what: (*what).to_string(),
        }),
        Error::ExternalApi(_) => Some(Notice::NoAccess),
        _ => None,
    }
}

/// Open a vote on publishing `proposal.source`. Returns the new
/// candidate's id.
pub async fn propose_post(ctx: &Context, proposal: PostProposal, now: u64) -> Result<CandidateId> {
    match open_vote(ctx, proposal, now).await {
        Ok(id) => Ok(id),
        Err(e) => {
            warn!(group = %proposal.group, source = proposal.source, error = %e, "Post proposal rejected");
            if let Some(notice) = user_notice(&e) {
                let reply = Outbound::reply(proposal.source, notice);
                if let Err(report) = ctx.surface.post_message(proposal.channel, reply).await {
                    warn!(error = %report, "Failed to report rejected proposal");
                }
            }
            Err(e)
        }
    }
}

async fn open_vote(ctx: &Context, proposal: PostProposal, now: u64) -> Result<CandidateId> {
    let PostProposal {
        group,
        channel,
        source,
    } = proposal;

    let message = ctx.surface.fetch_message(channel, source).await?;
    let text = normalize_mentions(&message.content);

    let length = weighted_length(&text);
    if length > MAX_POST_LENGTH {
        return Err(Error::TooLong(length - MAX_POST_LENGTH));
    }

    let attachment = message.attachments.first();
    if let Some(a) = attachment {
        MediaCategory::from_content_type(&a.content_type).check(a.size)?;
    }

    let platform = ctx.platforms.get(group)?;
    let posting_as = match ctx.platforms.handle(group) {
        Some(handle) => handle,
        None => platform.own_handle().await?,
    };

    let preview = ctx
        .surface
        .post_message(
            channel,
            Outbound::reply(
                source,
                Notice::PostPreview {
                    text,
                    posting_as,
                    attachment: attachment.map(|a| a.filename.clone()),
                },
            ),
        )
        .await?;

    let candidate = ctx.store.create(NewCandidate {
        id: CandidateId(preview),
        group,
        kind: CandidateKind::TweetPost,
        proposed_at: now,
        target_content_id: None,
        anchor: Anchor { channel, source },
        author_handle: None,
    })?;

    for option in [VoteOption::Approve, VoteOption::Reject] {
        if let Err(e) = ctx.surface.add_vote_affordance(channel, preview, option.symbol()).await {
            warn!(id = %candidate.id, error = %e, "Failed to add vote affordance");
        }
    }

    info!(%group, id = %candidate.id, source, "Post proposal opened");
    Ok(candidate.id)
}

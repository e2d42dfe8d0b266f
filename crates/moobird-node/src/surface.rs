//! The chat surface votes happen on.
//!
//! The node never renders presentation itself: it hands the surface a
//! [`Notice`] describing what happened and the surface decides how it
//! looks. Vote affordances are the reaction buttons members press.

use std::fmt;

use async_trait::async_trait;
use moobird_consensus::VoteOption;

use crate::error::Result;

pub type ChannelId = u64;
pub type MessageId = u64;
pub type UserId = u64;

/// A file attached to a surface message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    /// Size in bytes.
    pub size: u64,
    pub url: String,
}

/// Someone who pressed an affordance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Voter {
    pub id: UserId,
    pub bot: bool,
}

/// All presses of one affordance on a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    pub symbol: String,
    pub voters: Vec<Voter>,
}

/// A message read back from the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMessage {
    pub id: MessageId,
    pub channel: ChannelId,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub reactions: Vec<Reaction>,
}

impl FetchedMessage {
    pub fn new(id: MessageId, channel: ChannelId, content: impl Into<String>) -> Self {
        Self {
            id,
            channel,
            content: content.into(),
            attachments: Vec::new(),
            reactions: Vec::new(),
        }
    }

    /// Human voters behind `symbol`.
    pub fn voters(&self, symbol: &str) -> Vec<UserId> {
        self.reactions
            .iter()
            .filter(|r| r.symbol == symbol)
            .flat_map(|r| r.voters.iter())
            .filter(|v| !v.bot)
            .map(|v| v.id)
            .collect()
    }
}

/// Something the node tells a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A post proposal waiting for votes.
    PostPreview {
        text: String,
        posting_as: String,
        attachment: Option<String>,
    },
    /// A passed post went out.
    Published { link: String, voters: Vec<UserId> },
    VotedDown,
    TimedOut,
    /// The proposal's source message changed before the vote finished.
    Withdrawn,
    /// A stream item open for interaction votes.
    StreamItem { link: String },
    /// An interaction vote passed and was carried out.
    ActionTaken {
        option: VoteOption,
        target: String,
        voters: Vec<UserId>,
    },
    /// A decided action failed.
    Failure { action: String, details: String },
    SetupRequired { what: String },
    MediaTooLarge { limit_mb: u64 },
    TooLong { overflow: usize },
    /// The source message could not be read.
    NoAccess,
}

fn mentions(voters: &[UserId]) -> String {
    voters
        .iter()
        .map(|v| format!("<@{v}>"))
        .collect::<Vec<_>>()
        .join(" ")
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PostPreview {
                text,
                posting_as,
                attachment,
            } => {
                write!(f, "{text}\n-- posting as @{posting_as}")?;
                if let Some(name) = attachment {
                    write!(f, " with attachment {name}")?;
                }
                Ok(())
            }
            Self::Published { link, voters } => {
                write!(f, "Posted {link}")?;
                if !voters.is_empty() {
                    write!(f, " (approved by {})", mentions(voters))?;
                }
                Ok(())
            }
            Self::VotedDown => write!(f, "Post voted down."),
            Self::TimedOut => write!(f, "Post timed out."),
            Self::Withdrawn => write!(f, "Source message changed, vote withdrawn."),
            Self::StreamItem { link } => write!(f, "{link}"),
            Self::ActionTaken {
                option,
                target,
                voters,
            } => {
                write!(f, "{} {target}", option.confirmation().unwrap_or(option.symbol()))?;
                if !voters.is_empty() {
                    write!(f, " (voted by {})", mentions(voters))?;
                }
                Ok(())
            }
            Self::Failure { action, details } => write!(f, "Failed to {action}: {details}"),
            Self::SetupRequired { what } => write!(f, "Setup required: {what}"),
            Self::MediaTooLarge { limit_mb } => {
                write!(f, "Attachment too large, the limit is {limit_mb} MB.")
            }
            Self::TooLong { overflow } => {
                write!(f, "Message is too long by {overflow} characters.")
            }
            Self::NoAccess => write!(f, "Unable to read the source message."),
        }
    }
}

/// A message the node wants posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    /// Message this one replies to, if any.
    pub reply_to: Option<MessageId>,
    pub notice: Notice,
}

impl Outbound {
    pub fn new(notice: Notice) -> Self {
        Self {
            reply_to: None,
            notice,
        }
    }

    pub fn reply(reply_to: MessageId, notice: Notice) -> Self {
        Self {
            reply_to: Some(reply_to),
            notice,
        }
    }
}

/// Chat surface client.
#[async_trait]
pub trait NotificationSurface: Send + Sync {
    /// Post a message. Returns the new message's id.
    async fn post_message(&self, channel: ChannelId, message: Outbound) -> Result<MessageId>;

    /// Offer `symbol` as a vote button on a message.
    async fn add_vote_affordance(
        &self,
        channel: ChannelId,
        message: MessageId,
        symbol: &str,
    ) -> Result<()>;

    /// Remove one vote button, or every button when `symbol` is `None`.
    async fn clear_vote_affordance(
        &self,
        channel: ChannelId,
        message: MessageId,
        symbol: Option<&str>,
    ) -> Result<()>;

    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> Result<()>;

    async fn fetch_message(&self, channel: ChannelId, message: MessageId) -> Result<FetchedMessage>;

    async fn download_attachment(&self, attachment: &Attachment) -> Result<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voters_skip_bots_and_other_symbols() {
        let mut msg = FetchedMessage::new(1, 2, "x");
        msg.reactions = vec![
            Reaction {
                symbol: "👍".into(),
                voters: vec![
                    Voter { id: 10, bot: false },
                    Voter { id: 99, bot: true },
                    Voter { id: 11, bot: false },
                ],
            },
            Reaction {
                symbol: "👎".into(),
                voters: vec![Voter { id: 12, bot: false }],
            },
        ];
        assert_eq!(msg.voters("👍"), vec![10, 11]);
        assert!(msg.voters("🔃").is_empty());
    }

    #[test]
    fn action_notice_uses_confirmation_symbol() {
        let notice = Notice::ActionTaken {
            option: VoteOption::Favorite,
            target: "https://twitter.com/a/status/1".into(),
            voters: vec![7],
        };
        assert_eq!(
            notice.to_string(),
            "♥️ https://twitter.com/a/status/1 (voted by <@7>)"
        );
    }
}

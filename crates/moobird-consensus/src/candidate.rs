//! Candidate model.
//!
//! A candidate is a proposed action awaiting consensus. It is keyed by the
//! id of the vote message members react to, and carries everything the
//! dispatcher needs once a decision is reached.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

/// Expiry window for post proposals.
pub const POST_EXPIRY: Duration = Duration::from_secs(3_600);

/// Expiry window for interaction candidates.
pub const INTERACT_EXPIRY: Duration = Duration::from_secs(86_400);

/// Identifier of a candidate: the id of its vote (anchor) message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidateId(pub u64);

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a group (one community with its own settings).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub u64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an item on the external content platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId(pub u64);

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a candidate is displayed. Only the dispatcher looks inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Anchor {
    /// Channel holding both the vote message and the source message.
    pub channel: u64,
    /// The message the proposal refers to. For stream items this is the
    /// vote message itself.
    pub source: u64,
}

/// The kind of action a candidate proposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandidateKind {
    /// Publish a drafted message to the external platform.
    TweetPost,
    /// Interact with an existing external item.
    Interact,
}

impl CandidateKind {
    /// Vote options legal for this kind.
    pub const fn options(&self) -> &'static [VoteOption] {
        match self {
            Self::TweetPost => &[VoteOption::Approve, VoteOption::Reject],
            Self::Interact => &[
                VoteOption::Amplify,
                VoteOption::Favorite,
                VoteOption::Suppress,
                VoteOption::Escalate,
            ],
        }
    }

    /// Whether `option` may be voted on a candidate of this kind.
    pub fn accepts(&self, option: VoteOption) -> bool {
        self.options().contains(&option)
    }

    /// Age at which an unresolved candidate is retired by the sweeper.
    pub const fn expiry(&self) -> Duration {
        match self {
            Self::TweetPost => POST_EXPIRY,
            Self::Interact => INTERACT_EXPIRY,
        }
    }
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TweetPost => write!(f, "TweetPost"),
            Self::Interact => write!(f, "Interact"),
        }
    }
}

/// A vote option, identified on the surface by its reaction symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VoteOption {
    Approve,
    Reject,
    Amplify,
    Favorite,
    Suppress,
    Escalate,
}

impl VoteOption {
    pub const ALL: [VoteOption; 6] = [
        Self::Approve,
        Self::Reject,
        Self::Amplify,
        Self::Favorite,
        Self::Suppress,
        Self::Escalate,
    ];

    /// Reaction symbol members use to cast this vote.
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::Approve => "👍",
            Self::Reject => "👎",
            Self::Amplify => "🔃",
            Self::Favorite => "🤍",
            Self::Suppress => "🔇",
            Self::Escalate => "🐮",
        }
    }

    /// Symbol stamped on the anchor once an interaction went through.
    pub const fn confirmation(&self) -> Option<&'static str> {
        match self {
            Self::Approve | Self::Reject => None,
            Self::Amplify => Some("🔃"),
            Self::Favorite => Some("♥️"),
            Self::Suppress => Some("🤐"),
            Self::Escalate => Some("🚀"),
        }
    }

    /// Parse a reaction symbol. Unknown symbols are not votes.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|o| o.symbol() == symbol)
    }
}

impl fmt::Display for VoteOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Amplify => "amplify",
            Self::Favorite => "favorite",
            Self::Suppress => "suppress",
            Self::Escalate => "escalate",
        };
        f.write_str(name)
    }
}

/// Fields supplied when a candidate is created.
#[derive(Debug, Clone)]
pub struct NewCandidate {
    pub id: CandidateId,
    pub group: GroupId,
    pub kind: CandidateKind,
    pub proposed_at: u64,
    pub target_content_id: Option<ContentId>,
    pub anchor: Anchor,
    pub author_handle: Option<String>,
}

/// A proposed action awaiting consensus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: CandidateId,
    pub group: GroupId,
    pub kind: CandidateKind,
    /// Creation time in epoch seconds.
    pub proposed_at: u64,
    pub target_content_id: Option<ContentId>,
    pub anchor: Anchor,
    /// Lower-cased author handle on the external platform.
    pub author_handle: Option<String>,
    votes: BTreeMap<VoteOption, u32>,
    claimed: BTreeSet<VoteOption>,
}

impl Candidate {
    pub(crate) fn new(fields: NewCandidate) -> Self {
        let votes = fields.kind.options().iter().map(|o| (*o, 0)).collect();
        Self {
            id: fields.id,
            group: fields.group,
            kind: fields.kind,
            proposed_at: fields.proposed_at,
            target_content_id: fields.target_content_id,
            anchor: fields.anchor,
            author_handle: fields.author_handle.map(|h| h.to_lowercase()),
            votes,
            claimed: BTreeSet::new(),
        }
    }

    /// Current count for `option` (zero for options of another kind).
    pub fn votes(&self, option: VoteOption) -> u32 {
        self.votes.get(&option).copied().unwrap_or(0)
    }

    /// All counts, in option order.
    pub fn tally(&self) -> impl Iterator<Item = (VoteOption, u32)> + '_ {
        self.votes.iter().map(|(o, c)| (*o, *c))
    }

    /// Whether `option` has already been resolved and dispatched.
    pub fn is_claimed(&self, option: VoteOption) -> bool {
        self.claimed.contains(&option)
    }

    /// Options that can still be resolved.
    pub fn open_options(&self) -> impl Iterator<Item = VoteOption> + '_ {
        self.kind
            .options()
            .iter()
            .copied()
            .filter(|o| !self.claimed.contains(o))
    }

    /// Whether the candidate is past its expiry window at `now`.
    pub fn is_expired(&self, now: u64) -> bool {
        now.saturating_sub(self.proposed_at) >= self.kind.expiry().as_secs()
    }

    /// Whether the candidate references `message`, either as its vote
    /// message or as its source.
    pub fn references(&self, message: u64) -> bool {
        self.id.0 == message || self.anchor.source == message
    }

    /// Apply a signed delta, clamping at zero. Returns the new count.
    pub(crate) fn apply_delta(&mut self, option: VoteOption, delta: i32) -> u32 {
        let count = self.votes.entry(option).or_insert(0);
        *count = if delta.is_negative() {
            count.saturating_sub(delta.unsigned_abs())
        } else {
            count.saturating_add(delta.unsigned_abs())
        };
        *count
    }

    pub(crate) fn mark_claimed(&mut self, option: VoteOption) -> bool {
        self.claimed.insert(option)
    }

    pub(crate) fn all_claimed(&self) -> bool {
        self.open_options().next().is_none()
    }
}

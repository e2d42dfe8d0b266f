//! Candidate Lifecycle & Consensus
//!
//! Members propose actions against an external content stream and vote on
//! them with reactions. This crate holds the in-memory state machine behind
//! that: the candidate model, the store every event path mutates, and the
//! threshold evaluator that turns counts into decisions.
//!
//! # Lifecycle
//!
//! ```text
//! create ──► votes accumulate ──► evaluate ──► claim ──► dispatch (caller)
//!    │                                 │
//!    └──── withdraw / expire ◄─────────┘ (pending)
//! ```
//!
//! A candidate leaves the store exactly once: when its resolution is
//! claimed, when the sweeper expires it, or when its anchor is edited or
//! deleted. Ids are never reused.
//!
//! # Thresholds
//!
//! - Post proposals: pass at `approve >= t`, fail at `reject × 2 >= t`
//! - Interactions: every option resolves on its own at `votes >= t`

mod candidate;
mod error;
mod store;
mod threshold;

pub use candidate::{
    Anchor, Candidate, CandidateId, CandidateKind, ContentId, GroupId, NewCandidate, VoteOption,
    INTERACT_EXPIRY, POST_EXPIRY,
};
pub use error::{Error, Result};
pub use store::{CandidateStore, Claimed, VoteApplied};
pub use threshold::{evaluate, evaluate_post, ready_options, Decision, Thresholds};

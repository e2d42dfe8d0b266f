//! Error types for moobird-consensus.

use thiserror::Error;

use crate::candidate::{CandidateId, CandidateKind, VoteOption};

/// Result type for candidate store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the candidate store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The candidate is not (or no longer) in the store. Usually a lost race
    /// against another claim or removal.
    #[error("unknown candidate {0}")]
    UnknownCandidate(CandidateId),

    /// A candidate with this id exists, or existed and was retired.
    #[error("duplicate candidate id {0}")]
    DuplicateId(CandidateId),

    /// The option is not a legal vote for this kind of candidate.
    #[error("option {option} is not valid for {kind} candidates")]
    UnknownOption {
        kind: CandidateKind,
        option: VoteOption,
    },

    /// A pending decision cannot be claimed.
    #[error("decision for candidate {0} is still pending")]
    Unresolved(CandidateId),

    /// The option was already resolved by another path.
    #[error("option {option} of candidate {id} already claimed")]
    AlreadyClaimed { id: CandidateId, option: VoteOption },
}

impl Error {
    /// Races between concurrent claim and removal paths. Callers treat
    /// these as a no-op and never surface them.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::UnknownCandidate(_) | Self::AlreadyClaimed { .. })
    }
}

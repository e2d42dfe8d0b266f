//! Vote tally and threshold evaluation.
//!
//! Pure functions from a candidate's counts and its group's thresholds to a
//! decision:
//! - Post proposals pass when approvals reach the threshold, and fail when
//!   rejections reach half of it (a reject counts double, so a minority can
//!   veto before approval quorum is reached). Pass is checked first.
//! - Interaction options resolve independently, each against its own
//!   threshold, and each at most once.

use std::collections::BTreeMap;

use crate::candidate::{Candidate, CandidateKind, VoteOption};

/// Weight of a reject vote toward failing a post proposal.
pub const REJECT_WEIGHT: u32 = 2;

/// Smallest usable threshold. Zero would pass with no votes at all.
pub const MIN_THRESHOLD: u32 = 1;

/// Outcome of evaluating a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Not enough votes either way.
    Pending,
    /// Quorum reached for the given option.
    Pass(VoteOption),
    /// Post proposal voted down.
    Fail,
}

impl Decision {
    /// Whether this decision retires or dispatches something.
    pub const fn is_resolved(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Vote thresholds for one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thresholds {
    votes_needed: u32,
    overrides: BTreeMap<VoteOption, u32>,
}

impl Thresholds {
    /// Same threshold for every option.
    pub fn uniform(votes_needed: u32) -> Self {
        Self {
            votes_needed: votes_needed.max(MIN_THRESHOLD),
            overrides: BTreeMap::new(),
        }
    }

    /// Give `option` its own threshold.
    #[must_use]
    pub fn with_override(mut self, option: VoteOption, votes_needed: u32) -> Self {
        self.overrides.insert(option, votes_needed.max(MIN_THRESHOLD));
        self
    }

    /// The group-wide threshold.
    pub fn votes_needed(&self) -> u32 {
        self.votes_needed
    }

    /// Threshold applying to `option`.
    pub fn for_option(&self, option: VoteOption) -> u32 {
        self.overrides
            .get(&option)
            .copied()
            .unwrap_or(self.votes_needed)
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::uniform(MIN_THRESHOLD)
    }
}

/// Evaluate a post proposal from its approve/reject counts.
///
/// ```
/// use moobird_consensus::{evaluate_post, Decision, VoteOption};
///
/// assert_eq!(evaluate_post(3, 0, 3), Decision::Pass(VoteOption::Approve));
/// assert_eq!(evaluate_post(2, 2, 3), Decision::Fail);
/// assert_eq!(evaluate_post(2, 1, 3), Decision::Pending);
/// ```
pub fn evaluate_post(approve: u32, reject: u32, threshold: u32) -> Decision {
    let threshold = threshold.max(MIN_THRESHOLD);
    if approve >= threshold {
        return Decision::Pass(VoteOption::Approve);
    }
    if reject.saturating_mul(REJECT_WEIGHT) >= threshold {
        return Decision::Fail;
    }
    Decision::Pending
}

/// Options of an interaction candidate that have reached quorum and have
/// not been claimed yet.
pub fn ready_options(candidate: &Candidate, thresholds: &Thresholds) -> Vec<VoteOption> {
    candidate
        .open_options()
        .filter(|o| candidate.votes(*o) >= thresholds.for_option(*o))
        .collect()
}

/// Every decision a candidate is currently ready for.
///
/// A post yields at most one decision. An interaction yields one `Pass` per
/// option at quorum. Already claimed options never appear, so calling this
/// twice at the same vote level cannot trigger the same resolution twice
/// once the first one has been claimed.
pub fn evaluate(candidate: &Candidate, thresholds: &Thresholds) -> Vec<Decision> {
    match candidate.kind {
        CandidateKind::TweetPost => {
            if candidate.open_options().next().is_none() {
                return Vec::new();
            }
            let decision = evaluate_post(
                candidate.votes(VoteOption::Approve),
                candidate.votes(VoteOption::Reject),
                thresholds.votes_needed(),
            );
            if decision.is_resolved() {
                vec![decision]
            } else {
                Vec::new()
            }
        }
        CandidateKind::Interact => ready_options(candidate, thresholds)
            .into_iter()
            .map(Decision::Pass)
            .collect(),
    }
}

//! Candidate store.
//!
//! The single source of truth for open candidates and their vote counts.
//! Every operation takes one short critical section, so callers on
//! independent event paths (reactions, stream ingestion, the sweeper) never
//! observe a partially updated vote map and never claim the same resolution
//! twice. The lock is never held across an await point.
//!
//! # Claiming
//!
//! Dispatch must claim before it performs any external call:
//! - a post proposal is claimed by removing it;
//! - an interaction option is claimed by marking it resolved, and the
//!   candidate is removed once all of its options are claimed.
//!
//! A claim that loses a race fails with a benign error (see
//! [`Error::is_benign`]).

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::candidate::{Candidate, CandidateId, CandidateKind, ContentId, GroupId, NewCandidate, VoteOption};
use crate::error::{Error, Result};
use crate::threshold::{evaluate, Decision, Thresholds};

/// A resolution won by the caller. The caller now owns its side effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claimed {
    /// Snapshot of the candidate taken at claim time.
    pub candidate: Candidate,
    pub decision: Decision,
    /// Whether the claim removed the candidate from the store.
    pub retired: bool,
}

/// Result of [`CandidateStore::apply_vote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteApplied {
    /// Count for the voted option after the update.
    pub count: u32,
    /// Resolutions triggered by this vote, already claimed.
    pub claims: Vec<Claimed>,
}

#[derive(Debug, Default)]
struct Inner {
    live: HashMap<CandidateId, Candidate>,
    /// Retired ids with the `proposed_at` of the candidate they belonged to.
    retired: HashMap<CandidateId, u64>,
    /// Ingestion reservations for items being posted right now.
    reserved: HashSet<(GroupId, ContentId)>,
}

impl Inner {
    fn retire(&mut self, id: CandidateId) -> Option<Candidate> {
        let candidate = self.live.remove(&id)?;
        self.retired.insert(id, candidate.proposed_at);
        Some(candidate)
    }

    fn claim(&mut self, id: CandidateId, decision: Decision) -> Result<Claimed> {
        let candidate = self.live.get_mut(&id).ok_or(Error::UnknownCandidate(id))?;
        let kind = candidate.kind;

        let option = match (kind, decision) {
            (_, Decision::Pending) => return Err(Error::Unresolved(id)),
            (CandidateKind::TweetPost, Decision::Fail) => VoteOption::Reject,
            (CandidateKind::Interact, Decision::Fail) => {
                return Err(Error::UnknownOption {
                    kind,
                    option: VoteOption::Reject,
                })
            }
            (_, Decision::Pass(option)) => option,
        };
        if !kind.accepts(option) {
            return Err(Error::UnknownOption { kind, option });
        }

        let retired = match kind {
            CandidateKind::TweetPost => true,
            CandidateKind::Interact => {
                if !candidate.mark_claimed(option) {
                    return Err(Error::AlreadyClaimed { id, option });
                }
                candidate.all_claimed()
            }
        };

        let snapshot = if retired {
            self.retire(id).ok_or(Error::UnknownCandidate(id))?
        } else {
            candidate.clone()
        };

        Ok(Claimed {
            candidate: snapshot,
            decision,
            retired,
        })
    }
}

/// Thread-safe store of open candidates.
#[derive(Debug, Default)]
pub struct CandidateStore {
    inner: Mutex<Inner>,
}

impl CandidateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every mutation completes inside one critical section, so the map
        // is consistent even if a holder panicked.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new candidate with zero votes.
    ///
    /// Fails with [`Error::DuplicateId`] if the id is live or was retired.
    /// Consumes any ingestion reservation for the same target.
    pub fn create(&self, fields: NewCandidate) -> Result<Candidate> {
        let mut inner = self.lock();
        if inner.live.contains_key(&fields.id) || inner.retired.contains_key(&fields.id) {
            return Err(Error::DuplicateId(fields.id));
        }
        if let Some(target) = fields.target_content_id {
            inner.reserved.remove(&(fields.group, target));
        }
        let candidate = Candidate::new(fields);
        inner.live.insert(candidate.id, candidate.clone());
        Ok(candidate)
    }

    /// Snapshot of a candidate.
    pub fn get(&self, id: CandidateId) -> Option<Candidate> {
        self.lock().live.get(&id).cloned()
    }

    /// Add `delta` to the count for `option`, clamping at zero.
    pub fn record_vote(&self, id: CandidateId, option: VoteOption, delta: i32) -> Result<u32> {
        let mut inner = self.lock();
        let candidate = inner.live.get_mut(&id).ok_or(Error::UnknownCandidate(id))?;
        if !candidate.kind.accepts(option) {
            return Err(Error::UnknownOption {
                kind: candidate.kind,
                option,
            });
        }
        Ok(candidate.apply_delta(option, delta))
    }

    /// Record a vote, evaluate the candidate and claim every resolution it
    /// is now ready for, all in one step.
    pub fn apply_vote(
        &self,
        id: CandidateId,
        option: VoteOption,
        delta: i32,
        thresholds: &Thresholds,
    ) -> Result<VoteApplied> {
        let mut inner = self.lock();
        let candidate = inner.live.get_mut(&id).ok_or(Error::UnknownCandidate(id))?;
        if !candidate.kind.accepts(option) {
            return Err(Error::UnknownOption {
                kind: candidate.kind,
                option,
            });
        }
        let count = candidate.apply_delta(option, delta);
        let decisions = evaluate(candidate, thresholds);

        let mut claims = Vec::with_capacity(decisions.len());
        for decision in decisions {
            claims.push(inner.claim(id, decision)?);
        }
        Ok(VoteApplied { count, claims })
    }

    /// Re-evaluate a candidate without changing its votes, claiming any
    /// resolution it is ready for. Used after a threshold change.
    pub fn settle(&self, id: CandidateId, thresholds: &Thresholds) -> Result<Vec<Claimed>> {
        let mut inner = self.lock();
        let candidate = inner.live.get(&id).ok_or(Error::UnknownCandidate(id))?;
        let decisions = evaluate(candidate, thresholds);
        decisions
            .into_iter()
            .map(|decision| inner.claim(id, decision))
            .collect()
    }

    /// Atomically claim `decision` for candidate `id`.
    pub fn claim(&self, id: CandidateId, decision: Decision) -> Result<Claimed> {
        self.lock().claim(id, decision)
    }

    /// Remove a candidate. A second removal fails with
    /// [`Error::UnknownCandidate`].
    pub fn remove(&self, id: CandidateId) -> Result<Candidate> {
        self.lock().retire(id).ok_or(Error::UnknownCandidate(id))
    }

    /// Remove every candidate whose vote message or source message is
    /// `message`.
    pub fn withdraw(&self, message: u64) -> Vec<Candidate> {
        self.withdraw_matching(message, |_| true)
    }

    /// Like [`withdraw`](Self::withdraw), limited to candidates matching
    /// `predicate`.
    pub fn withdraw_matching<F>(&self, message: u64, predicate: F) -> Vec<Candidate>
    where
        F: Fn(&Candidate) -> bool,
    {
        let mut inner = self.lock();
        let ids: Vec<CandidateId> = inner
            .live
            .values()
            .filter(|c| c.references(message) && predicate(c))
            .map(|c| c.id)
            .collect();
        ids.into_iter().filter_map(|id| inner.retire(id)).collect()
    }

    /// Snapshots of all candidates matching `predicate`.
    pub fn scan<F>(&self, predicate: F) -> Vec<Candidate>
    where
        F: Fn(&Candidate) -> bool,
    {
        self.lock()
            .live
            .values()
            .filter(|c| predicate(c))
            .cloned()
            .collect()
    }

    /// Reserve `(group, target)` for an item about to become a candidate.
    ///
    /// Returns false if an open candidate already targets the item or
    /// another ingestion path holds the reservation.
    pub fn reserve_target(&self, group: GroupId, target: ContentId) -> bool {
        let mut inner = self.lock();
        let taken = inner
            .live
            .values()
            .any(|c| c.group == group && c.target_content_id == Some(target));
        if taken {
            return false;
        }
        inner.reserved.insert((group, target))
    }

    /// Drop a reservation whose candidate was never created.
    pub fn release_target(&self, group: GroupId, target: ContentId) {
        self.lock().reserved.remove(&(group, target));
    }

    /// Forget retired ids whose candidates were proposed before `cutoff`.
    /// Returns how many were dropped.
    pub fn forget_retired_before(&self, cutoff: u64) -> usize {
        let mut inner = self.lock();
        let before = inner.retired.len();
        inner.retired.retain(|_, proposed_at| *proposed_at >= cutoff);
        before - inner.retired.len()
    }

    /// Number of open candidates.
    pub fn len(&self) -> usize {
        self.lock().live.len()
    }

    /// Whether there are no open candidates.
    pub fn is_empty(&self) -> bool {
        self.lock().live.is_empty()
    }
}

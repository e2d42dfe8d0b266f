//! Expiry sweeper.
//!
//! One periodic task retires every candidate whose voting window has
//! closed. Each expired candidate is claimed with `remove` before any
//! cleanup; losing that race to a dispatch means the candidate is skipped.

use std::sync::Arc;
use std::time::Duration;

use moobird_consensus::{Candidate, CandidateKind, INTERACT_EXPIRY};
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::context::{now_secs, Context};
use crate::ingest::INTERACTIONS;
use crate::surface::{Notice, Outbound};

/// Default time between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub posts: usize,
    pub interactions: usize,
    /// Cleanup steps that failed. Never aborts the sweep.
    pub cleanup_failures: usize,
    /// Another sweep was already running.
    pub skipped: bool,
}

impl SweepReport {
    pub fn retired(&self) -> usize {
        self.posts + self.interactions
    }
}

pub struct Sweeper {
    ctx: Arc<Context>,
    interval: Duration,
    running: Mutex<()>,
}

impl Sweeper {
    pub fn new(ctx: Arc<Context>, interval: Duration) -> Self {
        Self {
            ctx,
            interval,
            running: Mutex::new(()),
        }
    }

    /// Retire every candidate expired at `now`.
    pub async fn sweep(&self, now: u64) -> SweepReport {
        let Ok(_guard) = self.running.try_lock() else {
            debug!("Sweep already running, tick skipped");
            return SweepReport {
                skipped: true,
                ..Default::default()
            };
        };

        let mut report = SweepReport::default();
        if self.ctx.store.is_empty() {
            return report;
        }

        for expired in self.ctx.store.scan(|c| c.is_expired(now)) {
            let candidate = match self.ctx.store.remove(expired.id) {
                Ok(candidate) => candidate,
                Err(e) => {
                    debug!(id = %expired.id, error = %e, "Expired candidate already retired");
                    continue;
                }
            };
            match candidate.kind {
                CandidateKind::TweetPost => {
                    report.posts += 1;
                    report.cleanup_failures += self.close_post(&candidate).await;
                }
                CandidateKind::Interact => {
                    report.interactions += 1;
                    report.cleanup_failures += self.close_interaction(&candidate).await;
                }
            }
        }

        // Retired ids older than any window can no longer collide.
        let cutoff = now.saturating_sub(2 * INTERACT_EXPIRY.as_secs());
        let forgotten = self.ctx.store.forget_retired_before(cutoff);

        if report.retired() > 0 {
            info!(
                posts = report.posts,
                interactions = report.interactions,
                failures = report.cleanup_failures,
                forgotten,
                "Sweep retired expired candidates"
            );
        }
        report
    }

    async fn close_post(&self, candidate: &Candidate) -> usize {
        let surface = &self.ctx.surface;
        let channel = candidate.anchor.channel;
        let mut failures = 0;

        if let Err(e) = surface.delete_message(channel, candidate.id.0).await {
            warn!(id = %candidate.id, error = %e, "Failed to delete expired vote message");
            failures += 1;
        }
        let notice = Outbound::reply(candidate.anchor.source, Notice::TimedOut);
        if let Err(e) = surface.post_message(channel, notice).await {
            warn!(id = %candidate.id, error = %e, "Failed to post timeout notice");
            failures += 1;
        }
        failures
    }

    async fn close_interaction(&self, candidate: &Candidate) -> usize {
        let mut failures = 0;
        for option in INTERACTIONS {
            if let Err(e) = self
                .ctx
                .surface
                .clear_vote_affordance(candidate.anchor.channel, candidate.id.0, Some(option.symbol()))
                .await
            {
                debug!(id = %candidate.id, %option, error = %e, "Failed to clear affordance");
                failures += 1;
            }
        }
        failures
    }

    /// Sweep every interval until `shutdown` flips to true.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep(now_secs()).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Sweeper stopping");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moobird_consensus::{Anchor, CandidateId, ContentId, Decision, NewCandidate, VoteOption};

    use crate::testing::{Harness, SurfaceCall, GROUP};

    const T0: u64 = 1_000_000;

    fn add(h: &Harness, id: u64, kind: CandidateKind) {
        h.ctx
            .store
            .create(NewCandidate {
                id: CandidateId(id),
                group: GROUP,
                kind,
                proposed_at: T0,
                target_content_id: (kind == CandidateKind::Interact).then_some(ContentId(id)),
                anchor: Anchor {
                    channel: 7,
                    source: id + 100,
                },
                author_handle: None,
            })
            .unwrap();
    }

    #[tokio::test]
    async fn post_window_boundary() {
        let h = Harness::new(1);
        add(&h, 1, CandidateKind::TweetPost);
        let sweeper = Sweeper::new(h.ctx.clone(), DEFAULT_SWEEP_INTERVAL);

        assert_eq!(sweeper.sweep(T0 + 3_599).await.retired(), 0);
        assert!(h.ctx.store.get(CandidateId(1)).is_some());

        let report = sweeper.sweep(T0 + 3_600).await;
        assert_eq!(report.posts, 1);
        assert!(h.ctx.store.is_empty());
        assert_eq!(h.surface.deleted(), vec![1]);
        assert_eq!(h.surface.notices(), vec![Notice::TimedOut]);
    }

    #[tokio::test]
    async fn interact_window_boundary() {
        let h = Harness::new(1);
        add(&h, 2, CandidateKind::Interact);
        let sweeper = Sweeper::new(h.ctx.clone(), DEFAULT_SWEEP_INTERVAL);

        assert_eq!(sweeper.sweep(T0 + 86_399).await.retired(), 0);
        let report = sweeper.sweep(T0 + 86_400).await;
        assert_eq!(report.interactions, 1);
        assert!(h.ctx.store.is_empty());

        let cleared = h
            .surface
            .calls()
            .into_iter()
            .filter(|c| matches!(c, SurfaceCall::ClearAffordance { message: 2, .. }))
            .count();
        assert_eq!(cleared, 4);
        assert!(h.surface.notices().is_empty());
    }

    #[tokio::test]
    async fn empty_store_is_noop() {
        let h = Harness::new(1);
        let sweeper = Sweeper::new(h.ctx.clone(), DEFAULT_SWEEP_INTERVAL);
        assert_eq!(sweeper.sweep(T0).await, SweepReport::default());
        assert!(h.surface.calls().is_empty());
    }

    #[tokio::test]
    async fn candidate_claimed_by_dispatch_is_skipped() {
        let h = Harness::new(1);
        add(&h, 1, CandidateKind::TweetPost);
        h.ctx
            .store
            .claim(CandidateId(1), Decision::Pass(VoteOption::Approve))
            .unwrap();

        let sweeper = Sweeper::new(h.ctx.clone(), DEFAULT_SWEEP_INTERVAL);
        assert_eq!(sweeper.sweep(T0 + 10_000).await.retired(), 0);
        assert!(h.surface.calls().is_empty());
    }

    #[tokio::test]
    async fn cleanup_failures_do_not_abort() {
        let h = Harness::new(1);
        add(&h, 1, CandidateKind::TweetPost);
        add(&h, 2, CandidateKind::TweetPost);
        h.surface
            .fail_posts
            .store(true, std::sync::atomic::Ordering::SeqCst);

        let sweeper = Sweeper::new(h.ctx.clone(), DEFAULT_SWEEP_INTERVAL);
        let report = sweeper.sweep(T0 + 3_600).await;
        assert_eq!(report.posts, 2);
        assert_eq!(report.cleanup_failures, 2);
        assert!(h.ctx.store.is_empty());
    }

    #[tokio::test]
    async fn overlapping_sweep_is_skipped() {
        let h = Harness::new(1);
        let sweeper = Sweeper::new(h.ctx.clone(), DEFAULT_SWEEP_INTERVAL);
        let _held = sweeper.running.lock().await;
        assert!(sweeper.sweep(T0).await.skipped);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let h = Harness::new(1);
        let sweeper = Arc::new(Sweeper::new(h.ctx.clone(), Duration::from_millis(10)));
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(sweeper.run(rx));
        tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}

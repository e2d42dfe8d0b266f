//! Action dispatcher.
//!
//! Turns a resolved decision into external side effects. Every decision is
//! claimed on the store before anything external happens, so a decision
//! reached twice (two vote events racing, a vote racing the sweeper) runs
//! once. Failures are reported on the surface and logged, never retried.

use std::sync::Arc;

use moobird_consensus::{Candidate, CandidateId, CandidateKind, Claimed, ContentId, Decision, VoteOption};
use moobird_stream::permalink;
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::platform::MediaCategory;
use crate::proposal::normalize_mentions;
use crate::surface::{MessageId, Notice, Outbound, UserId};
use crate::tracker::TrackerCard;

/// What an executed action left on the surface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Executed {
    /// Report message, if it could be posted.
    pub notice: Option<MessageId>,
    /// Permalink of newly published content.
    pub link: Option<String>,
}

fn action_name(kind: CandidateKind, decision: Decision) -> String {
    match (kind, decision) {
        (CandidateKind::TweetPost, Decision::Pass(_)) => "publish".into(),
        (_, Decision::Pass(option)) => option.to_string(),
        _ => "close the vote".into(),
    }
}

/// Notice describing a failed action.
pub(crate) fn failure_notice(action: &str, error: &Error) -> Notice {
    match error {
        Error::ConfigMissing { what, .. } => Notice::SetupRequired {
            what: (*what).to_string(),
        },
        Error::MediaTooLarge { limit_mb, .. } => Notice::MediaTooLarge { limit_mb: *limit_mb },
        other => Notice::Failure {
            action: action.to_string(),
            details: other.to_string(),
        },
    }
}

pub struct Dispatcher {
    ctx: Arc<Context>,
}

impl Dispatcher {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Claim `decision` for candidate `id` and execute it. Returns `None`
    /// when another path already claimed it.
    pub async fn dispatch(&self, id: CandidateId, decision: Decision) -> Result<Option<Executed>> {
        let claimed = match self.ctx.store.claim(id, decision) {
            Ok(claimed) => claimed,
            Err(e) if e.is_benign() => {
                debug!(%id, error = %e, "Decision already handled");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        self.execute(claimed).await.map(Some)
    }

    /// Execute an already claimed decision.
    pub async fn execute(&self, claimed: Claimed) -> Result<Executed> {
        let Claimed {
            candidate,
            decision,
            ..
        } = claimed;

        let result = match (candidate.kind, decision) {
            (CandidateKind::TweetPost, Decision::Pass(_)) => self.publish(&candidate).await,
            (CandidateKind::TweetPost, Decision::Fail) => self.vote_down(&candidate).await,
            (CandidateKind::Interact, Decision::Pass(option)) => self.interact(&candidate, option).await,
            _ => Err(moobird_consensus::Error::Unresolved(candidate.id).into()),
        };

        if let Err(e) = &result {
            self.report_failure(&candidate, decision, e).await;
        }
        result
    }

    async fn report_failure(&self, candidate: &Candidate, decision: Decision, error: &Error) {
        let action = action_name(candidate.kind, decision);
        warn!(id = %candidate.id, group = %candidate.group, %action, error = %error, "Action failed");

        let reply_to = match candidate.kind {
            CandidateKind::TweetPost => candidate.anchor.source,
            CandidateKind::Interact => candidate.id.0,
        };
        let notice = failure_notice(&action, error);
        if let Err(e) = self
            .ctx
            .surface
            .post_message(candidate.anchor.channel, Outbound::reply(reply_to, notice))
            .await
        {
            warn!(id = %candidate.id, error = %e, "Failed to report action failure");
        }
    }

    async fn voters(&self, candidate: &Candidate, option: VoteOption) -> Vec<UserId> {
        match self
            .ctx
            .surface
            .fetch_message(candidate.anchor.channel, candidate.id.0)
            .await
        {
            Ok(message) => message.voters(option.symbol()),
            Err(e) => {
                warn!(id = %candidate.id, error = %e, "Could not read voters");
                Vec::new()
            }
        }
    }

    async fn delete_vote_message(&self, candidate: &Candidate) {
        if let Err(e) = self
            .ctx
            .surface
            .delete_message(candidate.anchor.channel, candidate.id.0)
            .await
        {
            warn!(id = %candidate.id, error = %e, "Failed to delete vote message");
        }
    }

    /// Post a report, logging instead of failing: the action already
    /// happened.
    async fn report(&self, candidate: &Candidate, message: Outbound) -> Option<MessageId> {
        match self.ctx.surface.post_message(candidate.anchor.channel, message).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(id = %candidate.id, error = %e, "Failed to post report");
                None
            }
        }
    }

    async fn publish(&self, candidate: &Candidate) -> Result<Executed> {
        let surface = &self.ctx.surface;
        let channel = candidate.anchor.channel;
        let platform = self.ctx.platforms.get(candidate.group)?;

        let source = surface.fetch_message(channel, candidate.anchor.source).await?;
        let media = source
            .attachments
            .iter()
            .map(|a| {
                let category = MediaCategory::from_content_type(&a.content_type);
                category.check(a.size).map(|()| (category, a))
            })
            .collect::<Result<Vec<_>>>()?;

        let voters = self.voters(candidate, VoteOption::Approve).await;
        self.delete_vote_message(candidate).await;

        let mut refs = Vec::with_capacity(media.len());
        for (category, attachment) in media {
            let bytes = surface.download_attachment(attachment).await?;
            category.check(bytes.len() as u64)?;
            refs.push(platform.upload_media(bytes, category).await?);
        }

        let published = platform.publish(&normalize_mentions(&source.content), &refs).await?;
        let link = published.link();
        info!(id = %candidate.id, group = %candidate.group, %link, "Post published");

        let notice = self
            .report(
                candidate,
                Outbound::reply(
                    candidate.anchor.source,
                    Notice::Published {
                        link: link.clone(),
                        voters,
                    },
                ),
            )
            .await;
        Ok(Executed {
            notice,
            link: Some(link),
        })
    }

    async fn vote_down(&self, candidate: &Candidate) -> Result<Executed> {
        self.delete_vote_message(candidate).await;
        info!(id = %candidate.id, group = %candidate.group, "Post voted down");
        let notice = self
            .ctx
            .surface
            .post_message(
                candidate.anchor.channel,
                Outbound::reply(candidate.anchor.source, Notice::VotedDown),
            )
            .await?;
        Ok(Executed {
            notice: Some(notice),
            link: None,
        })
    }

    async fn interact(&self, candidate: &Candidate, option: VoteOption) -> Result<Executed> {
        let surface = &self.ctx.surface;
        let channel = candidate.anchor.channel;
        let message = candidate.id.0;

        let target = candidate
            .target_content_id
            .ok_or_else(|| Error::InvalidInput(format!("candidate {} has no target", candidate.id)))?;
        let link = candidate
            .author_handle
            .as_deref()
            .map(|handle| permalink(handle, target.0))
            .unwrap_or_else(|| target.to_string());

        let voters = self.voters(candidate, option).await;
        let cleared = if option == VoteOption::Escalate {
            None
        } else {
            Some(option.symbol())
        };
        if let Err(e) = surface.clear_vote_affordance(channel, message, cleared).await {
            warn!(id = %candidate.id, error = %e, "Failed to clear vote affordance");
        }

        match option {
            VoteOption::Amplify => self.ctx.platforms.get(candidate.group)?.amplify(target).await?,
            VoteOption::Favorite => self.ctx.platforms.get(candidate.group)?.favorite(target).await?,
            VoteOption::Suppress => {
                let handle = candidate
                    .author_handle
                    .as_deref()
                    .ok_or_else(|| Error::InvalidInput(format!("candidate {} has no author", candidate.id)))?;
                let terms = self
                    .ctx
                    .settings
                    .add_ignore_terms(candidate.group, [format!("@{handle}")])?;
                debug!(group = %candidate.group, ignored = terms.len(), "Author suppressed");
            }
            VoteOption::Escalate => self.escalate(candidate, target, &link).await?,
            VoteOption::Approve | VoteOption::Reject => {
                return Err(Error::InvalidInput(format!(
                    "{option} is not an interaction"
                )))
            }
        }
        info!(id = %candidate.id, group = %candidate.group, %option, %target, "Interaction carried out");

        if let Some(symbol) = option.confirmation() {
            if let Err(e) = surface.add_vote_affordance(channel, message, symbol).await {
                warn!(id = %candidate.id, error = %e, "Failed to mark interaction");
            }
        }
        let notice = self
            .report(
                candidate,
                Outbound::reply(
                    message,
                    Notice::ActionTaken {
                        option,
                        target: link,
                        voters,
                    },
                ),
            )
            .await;
        Ok(Executed { notice, link: None })
    }

    async fn escalate(&self, candidate: &Candidate, target: ContentId, link: &str) -> Result<()> {
        let config = self
            .ctx
            .settings
            .get_or_default(candidate.group)
            .tracker
            .ok_or(Error::ConfigMissing {
                group: candidate.group,
                what: "tracker credentials",
            })?;

        // Card title is the item's text, or the link if it cannot be read.
        let name = match self.ctx.platforms.get(candidate.group) {
            Ok(platform) => match platform.fetch_by_id(target).await {
                Ok(item) => item.full_text().to_string(),
                Err(e) => {
                    debug!(%target, error = %e, "Could not fetch escalated item");
                    link.to_string()
                }
            },
            Err(_) => link.to_string(),
        };

        self.ctx
            .tracker
            .submit(
                &config,
                &TrackerCard {
                    name,
                    link: link.to_string(),
                },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use moobird_consensus::{Anchor, NewCandidate};

    use crate::platform::MEGABYTE;
    use crate::surface::{Attachment, FetchedMessage};
    use crate::testing::{Harness, MockPlatform, SurfaceCall, GROUP, STREAM_CHANNEL};

    const CHANNEL: u64 = 7;
    const SOURCE: u64 = 1;
    const VOTE: u64 = 2;
    const ITEM: u64 = 3;

    fn open_post(h: &Harness, content: &str) -> CandidateId {
        h.surface.seed(FetchedMessage::new(SOURCE, CHANNEL, content));
        h.surface.seed(FetchedMessage::new(VOTE, CHANNEL, "preview"));
        h.ctx
            .store
            .create(NewCandidate {
                id: CandidateId(VOTE),
                group: GROUP,
                kind: CandidateKind::TweetPost,
                proposed_at: 0,
                target_content_id: None,
                anchor: Anchor {
                    channel: CHANNEL,
                    source: SOURCE,
                },
                author_handle: None,
            })
            .unwrap()
            .id
    }

    fn open_interact(h: &Harness) -> CandidateId {
        h.surface.seed(FetchedMessage::new(ITEM, STREAM_CHANNEL, "link"));
        h.ctx
            .store
            .create(NewCandidate {
                id: CandidateId(ITEM),
                group: GROUP,
                kind: CandidateKind::Interact,
                proposed_at: 0,
                target_content_id: Some(ContentId(42)),
                anchor: Anchor {
                    channel: STREAM_CHANNEL,
                    source: ITEM,
                },
                author_handle: Some("someone".into()),
            })
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn passed_post_is_published_once() {
        let h = Harness::new(1);
        let id = open_post(&h, "hello `@world`");
        h.surface.press(VOTE, "👍", &[10, 11]);
        let dispatcher = Dispatcher::new(h.ctx.clone());

        let out = dispatcher
            .dispatch(id, Decision::Pass(VoteOption::Approve))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(out.link.as_deref(), Some("https://twitter.com/moobird/status/500"));
        assert_eq!(h.platform.texts.lock().unwrap().as_slice(), ["hello @world"]);
        assert_eq!(h.surface.deleted(), vec![VOTE]);
        assert!(h.surface.notices().contains(&Notice::Published {
            link: "https://twitter.com/moobird/status/500".into(),
            voters: vec![10, 11],
        }));
        assert!(h.ctx.store.is_empty());

        // A second dispatch of the same decision is a no-op.
        let again = dispatcher
            .dispatch(id, Decision::Pass(VoteOption::Approve))
            .await
            .unwrap();
        assert!(again.is_none());
        assert_eq!(h.platform.published.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_dispatch_runs_once() {
        let h = Harness::with_platform(
            MockPlatform {
                delay: Some(Duration::from_millis(20)),
                ..Default::default()
            },
            1,
        );
        let id = open_post(&h, "race");
        let dispatcher = Arc::new(Dispatcher::new(h.ctx.clone()));

        let a = tokio::spawn({
            let d = dispatcher.clone();
            async move { d.dispatch(id, Decision::Pass(VoteOption::Approve)).await }
        });
        let b = tokio::spawn({
            let d = dispatcher.clone();
            async move { d.dispatch(id, Decision::Pass(VoteOption::Approve)).await }
        });
        let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());

        assert_eq!(a.is_some() as u8 + b.is_some() as u8, 1);
        assert_eq!(h.platform.published.load(Ordering::SeqCst), 1);
        assert_eq!(h.surface.deleted(), vec![VOTE]);
    }

    #[tokio::test]
    async fn failed_post_is_voted_down() {
        let h = Harness::new(1);
        let id = open_post(&h, "meh");
        let dispatcher = Dispatcher::new(h.ctx.clone());

        dispatcher.dispatch(id, Decision::Fail).await.unwrap();

        assert_eq!(h.surface.deleted(), vec![VOTE]);
        assert_eq!(h.surface.notices(), vec![Notice::VotedDown]);
        assert_eq!(h.platform.published.load(Ordering::SeqCst), 0);
        assert!(h.ctx.store.is_empty());
    }

    #[tokio::test]
    async fn oversized_attachment_fails_before_publishing() {
        let h = Harness::new(1);
        let id = open_post(&h, "video");
        let mut source = FetchedMessage::new(SOURCE, CHANNEL, "video");
        source.attachments.push(Attachment {
            filename: "clip.mp4".into(),
            content_type: "video/mp4".into(),
            size: 16 * MEGABYTE,
            url: "https://cdn.example/clip.mp4".into(),
        });
        h.surface.seed(source);
        let dispatcher = Dispatcher::new(h.ctx.clone());

        let err = dispatcher
            .dispatch(id, Decision::Pass(VoteOption::Approve))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::MediaTooLarge { limit_mb: 15, .. }));
        assert_eq!(h.platform.uploads.load(Ordering::SeqCst), 0);
        assert_eq!(h.platform.published.load(Ordering::SeqCst), 0);
        assert_eq!(h.surface.notices(), vec![Notice::MediaTooLarge { limit_mb: 15 }]);
    }

    #[tokio::test]
    async fn attachments_are_uploaded() {
        let h = Harness::new(1);
        let id = open_post(&h, "pic");
        let mut source = FetchedMessage::new(SOURCE, CHANNEL, "pic");
        source.attachments.push(Attachment {
            filename: "cow.gif".into(),
            content_type: "image/gif".into(),
            size: 64,
            url: "https://cdn.example/cow.gif".into(),
        });
        h.surface.seed(source);

        Dispatcher::new(h.ctx.clone())
            .dispatch(id, Decision::Pass(VoteOption::Approve))
            .await
            .unwrap();
        assert_eq!(h.platform.uploads.load(Ordering::SeqCst), 1);
        assert_eq!(h.platform.published.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn platform_failure_is_reported_not_retried() {
        let h = Harness::new(1);
        h.platform.fail.store(true, Ordering::SeqCst);
        let id = open_post(&h, "doomed");
        let dispatcher = Dispatcher::new(h.ctx.clone());

        let err = dispatcher
            .dispatch(id, Decision::Pass(VoteOption::Approve))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExternalApi(_)));
        assert!(matches!(
            h.surface.notices().as_slice(),
            [Notice::Failure { action, .. }] if action == "publish"
        ));
        // Claimed and retired: never retried.
        assert!(h.ctx.store.get(id).is_none());
    }

    #[tokio::test]
    async fn amplify_leaves_other_options_open() {
        let h = Harness::new(2);
        let id = open_interact(&h);
        h.surface.press(ITEM, "🔃", &[20, 21]);

        Dispatcher::new(h.ctx.clone())
            .dispatch(id, Decision::Pass(VoteOption::Amplify))
            .await
            .unwrap();

        assert_eq!(h.platform.amplified.load(Ordering::SeqCst), 1);
        let c = h.ctx.store.get(id).unwrap();
        assert!(c.is_claimed(VoteOption::Amplify));
        assert!(!c.is_claimed(VoteOption::Favorite));

        let calls = h.surface.calls();
        assert!(calls.contains(&SurfaceCall::ClearAffordance {
            message: ITEM,
            symbol: Some("🔃".into()),
        }));
        assert_eq!(h.surface.added(ITEM), vec!["🔃"]);
        assert!(h.surface.notices().contains(&Notice::ActionTaken {
            option: VoteOption::Amplify,
            target: "https://twitter.com/someone/status/42".into(),
            voters: vec![20, 21],
        }));
    }

    #[tokio::test]
    async fn suppress_adds_author_to_ignore_list() {
        let h = Harness::new(1);
        let id = open_interact(&h);

        Dispatcher::new(h.ctx.clone())
            .dispatch(id, Decision::Pass(VoteOption::Suppress))
            .await
            .unwrap();

        assert_eq!(h.ctx.settings.get_or_default(GROUP).ignore_terms, vec!["@someone"]);
        assert_eq!(h.surface.added(ITEM), vec!["🤐"]);
    }

    #[tokio::test]
    async fn escalate_files_tracker_card() {
        let h = Harness::new(1);
        let id = open_interact(&h);

        Dispatcher::new(h.ctx.clone())
            .dispatch(id, Decision::Pass(VoteOption::Escalate))
            .await
            .unwrap();

        let cards = h.tracker.cards.lock().unwrap().clone();
        assert_eq!(
            cards,
            vec![TrackerCard {
                name: "fetched text".into(),
                link: "https://twitter.com/someone/status/42".into(),
            }]
        );
        assert!(h.surface.calls().contains(&SurfaceCall::ClearAffordance {
            message: ITEM,
            symbol: None,
        }));
        assert_eq!(h.surface.added(ITEM), vec!["🚀"]);
    }

    #[tokio::test]
    async fn escalate_without_tracker_needs_setup() {
        let h = Harness::new(1);
        h.ctx
            .settings
            .update(GROUP, |s| s.tracker = None)
            .unwrap();
        let id = open_interact(&h);

        let err = Dispatcher::new(h.ctx.clone())
            .dispatch(id, Decision::Pass(VoteOption::Escalate))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConfigMissing { .. }));
        assert!(matches!(h.surface.notices()[0], Notice::SetupRequired { .. }));
        // Other options stay votable after a failure.
        assert!(!h.ctx.store.get(id).unwrap().is_claimed(VoteOption::Favorite));
    }

    #[tokio::test]
    async fn interaction_failure_does_not_touch_other_options() {
        let h = Harness::new(1);
        h.platform.fail.store(true, Ordering::SeqCst);
        let id = open_interact(&h);
        let dispatcher = Dispatcher::new(h.ctx.clone());

        assert!(dispatcher
            .dispatch(id, Decision::Pass(VoteOption::Favorite))
            .await
            .is_err());
        h.platform.fail.store(false, Ordering::SeqCst);
        dispatcher
            .dispatch(id, Decision::Pass(VoteOption::Amplify))
            .await
            .unwrap();
        assert_eq!(h.platform.amplified.load(Ordering::SeqCst), 1);
        assert_eq!(h.platform.favorited.load(Ordering::SeqCst), 0);
    }
}

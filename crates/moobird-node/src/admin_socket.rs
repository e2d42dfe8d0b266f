//! Unix socket server for admin commands.
//!
//! JSON lines in, JSON lines out. Besides group administration the socket
//! accepts surface events, so a chat bridge can feed votes into the node
//! without linking against it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use moobird_consensus::{Candidate, GroupId};
use moobird_stream::{ContentItem, FeedItem};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;

use crate::context::{now_secs, Context};
use crate::engine::{Engine, Event, ReactionEvent};
use crate::error::Result;
use crate::proposal::{propose_post, PostProposal};
use crate::settings::AllowKind;
use crate::streams::StreamControl;
use crate::sweeper::Sweeper;

/// Surface event as sent by a bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    ReactionAdded {
        channel: u64,
        message: u64,
        symbol: String,
        actor: u64,
        #[serde(default)]
        actor_is_bot: bool,
    },
    ReactionRemoved {
        channel: u64,
        message: u64,
        symbol: String,
        actor: u64,
        #[serde(default)]
        actor_is_bot: bool,
    },
    MessageEdited { channel: u64, message: u64 },
    MessageDeleted { channel: u64, message: u64 },
    StreamItem { group: u64, item: ContentItem },
}

impl From<InboundEvent> for Event {
    fn from(event: InboundEvent) -> Self {
        match event {
            InboundEvent::ReactionAdded {
                channel,
                message,
                symbol,
                actor,
                actor_is_bot,
            } => Event::ReactionAdded(ReactionEvent {
                channel,
                message,
                symbol,
                actor,
                actor_is_bot,
            }),
            InboundEvent::ReactionRemoved {
                channel,
                message,
                symbol,
                actor,
                actor_is_bot,
            } => Event::ReactionRemoved(ReactionEvent {
                channel,
                message,
                symbol,
                actor,
                actor_is_bot,
            }),
            InboundEvent::MessageEdited { channel, message } => Event::MessageEdited { channel, message },
            InboundEvent::MessageDeleted { channel, message } => Event::MessageDeleted { channel, message },
            InboundEvent::StreamItem { group, item } => Event::StreamItem(FeedItem {
                group: GroupId(group),
                item,
            }),
        }
    }
}

/// Admin command sent over the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum AdminCommand {
    /// Start a group's stream
    StreamStart { group: u64 },
    /// Stop a group's stream
    StreamStop { group: u64 },
    /// Report a group's stream state
    StreamStatus { group: u64 },
    /// Replace a group's search terms
    SetSearchTerms { group: u64, terms: Vec<String> },
    /// List a group's ignore terms
    IgnoreList { group: u64 },
    /// Add ignore terms
    IgnoreAdd { group: u64, terms: Vec<String> },
    /// Remove one ignore term
    IgnoreDel { group: u64, term: String },
    /// Clear the ignore list
    IgnoreClear { group: u64 },
    /// Set the votes needed to pass
    SetVotesNeeded { group: u64, votes: u32 },
    /// Set the channel stream items go to
    SetTargetChannel { group: u64, channel: u64 },
    /// Add an id to an allow-list
    Allow { group: u64, kind: AllowKind, id: u64 },
    /// Put a message to the vote
    Propose { group: u64, channel: u64, message: u64 },
    /// List open candidates
    ListCandidates,
    /// Run an expiry sweep now
    Sweep,
    /// Inject a surface event
    Event { event: InboundEvent },
    /// Ping (health check)
    Ping,
}

/// Response from admin command.
#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdminResponse {
    Ok { message: String },
    Error { error: String },
    List { items: Vec<String> },
    Pong,
}

impl AdminResponse {
    fn ok(message: impl Into<String>) -> Self {
        Self::Ok {
            message: message.into(),
        }
    }

    fn error(error: impl ToString) -> Self {
        Self::Error {
            error: error.to_string(),
        }
    }
}

/// Everything admin commands act on.
#[derive(Clone)]
pub struct AdminHandles {
    pub ctx: Arc<Context>,
    pub streams: Arc<StreamControl>,
    pub engine: Arc<Engine>,
    pub sweeper: Arc<Sweeper>,
    pub events: mpsc::Sender<Event>,
}

/// Admin socket server.
pub struct AdminSocket {
    handles: AdminHandles,
    socket_path: PathBuf,
}

impl AdminSocket {
    /// Create a new admin socket server.
    pub fn new(handles: AdminHandles, socket_path: impl AsRef<Path>) -> Self {
        Self {
            handles,
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    /// Run the admin socket server.
    pub async fn run(&self) -> Result<()> {
        // Remove existing socket file if present
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!("Admin socket listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let handles = self.handles.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, handles).await {
                            tracing::error!("Admin connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept admin connection: {}", e);
                }
            }
        }
    }

    /// Get the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

async fn handle_connection(stream: UnixStream, handles: AdminHandles) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<AdminCommand>(&line) {
            Ok(cmd) => execute_command(cmd, &handles).await,
            Err(e) => AdminResponse::Error {
                error: format!("Invalid command: {}", e),
            },
        };

        let response_json = serde_json::to_string(&response)? + "\n";
        writer.write_all(response_json.as_bytes()).await?;
        line.clear();
    }

    Ok(())
}

fn describe(candidate: &Candidate) -> String {
    let votes = candidate
        .tally()
        .map(|(option, n)| format!("{option}={n}"))
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "{} {} group={} proposed_at={} [{}]",
        candidate.id, candidate.kind, candidate.group, candidate.proposed_at, votes
    )
}

pub async fn execute_command(cmd: AdminCommand, handles: &AdminHandles) -> AdminResponse {
    let ctx = &handles.ctx;
    match cmd {
        AdminCommand::StreamStart { group } => match handles.streams.start(GroupId(group)) {
            Ok(()) => AdminResponse::ok(format!("Stream started for group {group}")),
            Err(e) => AdminResponse::error(e),
        },

        AdminCommand::StreamStop { group } => match handles.streams.stop(GroupId(group)) {
            Ok(true) => AdminResponse::ok(format!("Stream stopped for group {group}")),
            Ok(false) => AdminResponse::error(format!("No stream running for group {group}")),
            Err(e) => AdminResponse::error(e),
        },

        AdminCommand::StreamStatus { group } => {
            AdminResponse::ok(handles.streams.state(GroupId(group)).to_string())
        }

        AdminCommand::SetSearchTerms { group, terms } => {
            match handles.streams.set_search_terms(GroupId(group), terms) {
                Ok(true) => AdminResponse::ok("Search terms updated, stream restarted"),
                Ok(false) => AdminResponse::ok("Search terms updated"),
                Err(e) => AdminResponse::error(e),
            }
        }

        AdminCommand::IgnoreList { group } => AdminResponse::List {
            items: ctx.settings.get_or_default(GroupId(group)).ignore_terms,
        },

        AdminCommand::IgnoreAdd { group, terms } => {
            match ctx.settings.add_ignore_terms(GroupId(group), terms) {
                Ok(items) => AdminResponse::List { items },
                Err(e) => AdminResponse::error(e),
            }
        }

        AdminCommand::IgnoreDel { group, term } => {
            match ctx.settings.remove_ignore_term(GroupId(group), &term) {
                Ok(true) => AdminResponse::ok(format!("Removed ignore term: {term}")),
                Ok(false) => AdminResponse::error(format!("Unknown ignore term: {term}")),
                Err(e) => AdminResponse::error(e),
            }
        }

        AdminCommand::IgnoreClear { group } => match ctx.settings.clear_ignore_terms(GroupId(group)) {
            Ok(items) => AdminResponse::List { items },
            Err(e) => AdminResponse::error(e),
        },

        AdminCommand::SetVotesNeeded { group, votes } => {
            let group = GroupId(group);
            match ctx.settings.set_votes_needed(group, votes) {
                Ok(()) => {
                    let settled = handles.engine.settle_group(group).len();
                    tracing::info!(%group, votes, settled, "Votes needed changed");
                    AdminResponse::ok(format!("Votes needed set to {votes}"))
                }
                Err(e) => AdminResponse::error(e),
            }
        }

        AdminCommand::SetTargetChannel { group, channel } => {
            match ctx.settings.set_target_channel(GroupId(group), channel) {
                Ok(()) => AdminResponse::ok(format!("Stream items go to channel {channel}")),
                Err(e) => AdminResponse::error(e),
            }
        }

        AdminCommand::Allow { group, kind, id } => match ctx.settings.allow(GroupId(group), kind, id) {
            Ok(true) => AdminResponse::ok(format!("Allowed {kind:?} {id}")),
            Ok(false) => AdminResponse::ok(format!("{kind:?} {id} was already allowed")),
            Err(e) => AdminResponse::error(e),
        },

        AdminCommand::Propose {
            group,
            channel,
            message,
        } => {
            let proposal = PostProposal {
                group: GroupId(group),
                channel,
                source: message,
            };
            match propose_post(ctx, proposal, now_secs()).await {
                Ok(id) => AdminResponse::ok(format!("Vote opened: {id}")),
                Err(e) => AdminResponse::error(e),
            }
        }

        AdminCommand::ListCandidates => {
            let mut open = ctx.store.scan(|_| true);
            open.sort_by_key(|c| c.id);
            AdminResponse::List {
                items: open.iter().map(describe).collect(),
            }
        }

        AdminCommand::Sweep => {
            let report = handles.sweeper.sweep(now_secs()).await;
            if report.skipped {
                AdminResponse::error("A sweep is already running")
            } else {
                AdminResponse::ok(format!("Retired {} candidates", report.retired()))
            }
        }

        AdminCommand::Event { event } => match handles.events.send(event.into()).await {
            Ok(()) => AdminResponse::ok("queued"),
            Err(_) => AdminResponse::error("event loop stopped"),
        },

        AdminCommand::Ping => AdminResponse::Pong,
    }
}

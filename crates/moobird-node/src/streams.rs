//! Per-group stream commands.
//!
//! Wraps the feed supervisor with the group's persisted settings: starting
//! and stopping a stream flips `stream_enabled`, and changing search terms
//! on a running stream reconnects it.

use std::sync::Arc;

use moobird_consensus::GroupId;
use moobird_stream::{StreamState, StreamSupervisor};
use tracing::{info, warn};

use crate::context::Context;
use crate::error::Result;

pub struct StreamControl {
    ctx: Arc<Context>,
    supervisor: StreamSupervisor,
}

impl StreamControl {
    pub fn new(ctx: Arc<Context>, supervisor: StreamSupervisor) -> Self {
        Self { ctx, supervisor }
    }

    pub fn state(&self, group: GroupId) -> StreamState {
        self.supervisor.state(group)
    }

    /// Start the group's stream with its saved search terms.
    pub fn start(&self, group: GroupId) -> Result<()> {
        // Fail before touching the feed if the account is missing.
        self.ctx.platforms.get(group)?;
        let terms = self.ctx.settings.get_or_default(group).search_terms;
        self.supervisor.start(group, terms)?;
        self.ctx.settings.set_stream_enabled(group, true)?;
        Ok(())
    }

    /// Stop the group's stream. Returns whether it was running.
    pub fn stop(&self, group: GroupId) -> Result<bool> {
        let was_running = self.supervisor.stop(group);
        self.ctx.settings.set_stream_enabled(group, false)?;
        Ok(was_running)
    }

    /// Replace the search terms. A running stream reconnects with them.
    /// Returns whether it was restarted.
    pub fn set_search_terms(&self, group: GroupId, terms: Vec<String>) -> Result<bool> {
        let terms: Vec<String> = terms
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        let running = self.supervisor.is_running(group);
        // A running stream cannot reconnect without terms.
        if running && terms.is_empty() {
            return Err(moobird_stream::Error::NoSearchTerms(group).into());
        }
        self.ctx.settings.set_search_terms(group, terms.clone())?;

        if !running {
            return Ok(false);
        }
        info!(%group, ?terms, "Search terms changed, reconnecting");
        self.supervisor.restart(group, terms)?;
        Ok(true)
    }

    /// Start every group whose stream was enabled. Returns how many started.
    pub fn resume(&self) -> usize {
        let mut started = 0;
        for group in self.ctx.settings.groups() {
            if !self.ctx.settings.get_or_default(group).stream_enabled {
                continue;
            }
            match self.start(group) {
                Ok(()) => started += 1,
                Err(e) => warn!(%group, error = %e, "Failed to resume stream"),
            }
        }
        started
    }

    pub fn stop_all(&self) {
        self.supervisor.stop_all();
    }
}

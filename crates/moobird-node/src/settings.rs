//! Per-group settings.
//!
//! Settings live in memory and are written through to a single JSON
//! document on every change. Groups that were never configured read as
//! [`GroupSettings::default`].

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use moobird_consensus::{GroupId, Thresholds};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;

fn default_votes_needed() -> u32 {
    1
}

/// Who may use the node's commands in a group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allowed {
    #[serde(default)]
    pub channels: BTreeSet<u64>,
    #[serde(default)]
    pub roles: BTreeSet<u64>,
    #[serde(default)]
    pub users: BTreeSet<u64>,
}

/// Which allow-list an id goes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowKind {
    Channel,
    Role,
    User,
}

/// Credentials for the escalation tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub key: String,
    pub token: String,
    /// Board list new cards are filed into.
    #[serde(rename = "idList")]
    pub list_id: String,
}

/// One group's settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSettings {
    #[serde(default = "default_votes_needed")]
    pub votes_needed: u32,
    #[serde(default)]
    pub ignore_terms: Vec<String>,
    #[serde(default)]
    pub search_terms: Vec<String>,
    #[serde(default)]
    pub allowed: Allowed,
    #[serde(default)]
    pub stream_enabled: bool,
    /// Channel stream items are posted into.
    #[serde(default)]
    pub target_channel: Option<u64>,
    #[serde(default)]
    pub tracker: Option<TrackerConfig>,
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self {
            votes_needed: default_votes_needed(),
            ignore_terms: Vec::new(),
            search_terms: Vec::new(),
            allowed: Allowed::default(),
            stream_enabled: false,
            target_channel: None,
            tracker: None,
        }
    }
}

impl GroupSettings {
    /// Vote thresholds for this group's candidates.
    pub fn thresholds(&self) -> Thresholds {
        Thresholds::uniform(self.votes_needed)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    groups: BTreeMap<u64, GroupSettings>,
}

/// Settings for every group, optionally persisted to disk.
#[derive(Debug)]
pub struct SettingsStore {
    path: Option<PathBuf>,
    groups: RwLock<BTreeMap<u64, GroupSettings>>,
}

impl SettingsStore {
    /// Load settings from `path`, starting empty if the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            serde_json::from_str::<SettingsFile>(&raw)?
        } else {
            SettingsFile::default()
        };
        info!(path = %path.display(), groups = file.groups.len(), "Settings loaded");

        Ok(Self {
            path: Some(path),
            groups: RwLock::new(file.groups),
        })
    }

    /// Settings that are never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            groups: RwLock::new(BTreeMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<u64, GroupSettings>> {
        self.groups.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<u64, GroupSettings>> {
        self.groups.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// A group's settings, if it was ever configured.
    pub fn get(&self, group: GroupId) -> Option<GroupSettings> {
        self.read().get(&group.0).cloned()
    }

    /// A group's settings, or the defaults.
    pub fn get_or_default(&self, group: GroupId) -> GroupSettings {
        self.get(group).unwrap_or_default()
    }

    /// Every configured group.
    pub fn groups(&self) -> Vec<GroupId> {
        self.read().keys().copied().map(GroupId).collect()
    }

    /// Modify a group's settings and persist. Returns what `f` returns.
    ///
    /// The change only becomes visible once it is on disk; a failed write
    /// leaves the settings as they were.
    pub fn update<F, T>(&self, group: GroupId, f: F) -> Result<T>
    where
        F: FnOnce(&mut GroupSettings) -> T,
    {
        let mut groups = self.write();
        let mut next = groups.clone();
        let out = f(next.entry(group.0).or_default());
        self.persist(&next)?;
        *groups = next;
        Ok(out)
    }

    fn persist(&self, groups: &BTreeMap<u64, GroupSettings>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let doc = serde_json::to_string_pretty(&SettingsFile {
            groups: groups.clone(),
        })?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, doc)?;
        fs::rename(&tmp, path)?;
        debug!(path = %path.display(), "Settings persisted");
        Ok(())
    }

    /// Add ignore terms. Returns the resulting list, sorted and deduplicated.
    pub fn add_ignore_terms<I, S>(&self, group: GroupId, terms: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let terms: Vec<String> = terms
            .into_iter()
            .map(Into::into)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        self.update(group, |s| {
            let mut set: BTreeSet<String> = s.ignore_terms.drain(..).collect();
            set.extend(terms);
            s.ignore_terms = set.into_iter().collect();
            s.ignore_terms.clone()
        })
    }

    /// Remove one ignore term. Returns whether it was present.
    pub fn remove_ignore_term(&self, group: GroupId, term: &str) -> Result<bool> {
        if !self
            .get(group)
            .is_some_and(|s| s.ignore_terms.iter().any(|t| t == term))
        {
            return Ok(false);
        }
        self.update(group, |s| {
            let before = s.ignore_terms.len();
            s.ignore_terms.retain(|t| t != term);
            s.ignore_terms.len() != before
        })
    }

    /// Clear the ignore list. Returns the terms that were removed.
    pub fn clear_ignore_terms(&self, group: GroupId) -> Result<Vec<String>> {
        self.update(group, |s| std::mem::take(&mut s.ignore_terms))
    }

    pub fn set_search_terms(&self, group: GroupId, terms: Vec<String>) -> Result<()> {
        self.update(group, |s| s.search_terms = terms)
    }

    pub fn set_stream_enabled(&self, group: GroupId, enabled: bool) -> Result<()> {
        self.update(group, |s| s.stream_enabled = enabled)
    }

    pub fn set_votes_needed(&self, group: GroupId, votes: u32) -> Result<()> {
        self.update(group, |s| s.votes_needed = votes)
    }

    pub fn set_target_channel(&self, group: GroupId, channel: u64) -> Result<()> {
        self.update(group, |s| s.target_channel = Some(channel))
    }

    /// Add an id to one of the group's allow-lists. Returns whether it was
    /// new.
    pub fn allow(&self, group: GroupId, kind: AllowKind, id: u64) -> Result<bool> {
        self.update(group, |s| match kind {
            AllowKind::Channel => s.allowed.channels.insert(id),
            AllowKind::Role => s.allowed.roles.insert(id),
            AllowKind::User => s.allowed.users.insert(id),
        })
    }

    pub fn set_tracker(&self, group: GroupId, tracker: TrackerConfig) -> Result<()> {
        self.update(group, |s| s.tracker = Some(tracker))
    }

    /// Vote thresholds for a group.
    pub fn thresholds(&self, group: GroupId) -> Thresholds {
        self.get_or_default(group).thresholds()
    }
}

//! Shared handles every node component works from.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use moobird_consensus::CandidateStore;

use crate::platform::Platforms;
use crate::settings::SettingsStore;
use crate::surface::{NotificationSurface, UserId};
use crate::tracker::Tracker;

/// Seconds since the Unix epoch.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub struct Context {
    pub store: CandidateStore,
    pub settings: SettingsStore,
    pub platforms: Platforms,
    pub surface: Arc<dyn NotificationSurface>,
    pub tracker: Arc<dyn Tracker>,
    /// The node's own user on the surface. Its reactions never count.
    pub bot_user: UserId,
}

impl Context {
    pub fn new(
        settings: SettingsStore,
        surface: Arc<dyn NotificationSurface>,
        tracker: Arc<dyn Tracker>,
        bot_user: UserId,
    ) -> Self {
        Self {
            store: CandidateStore::new(),
            settings,
            platforms: Platforms::new(),
            surface,
            tracker,
            bot_user,
        }
    }
}

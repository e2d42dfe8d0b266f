//! The external content platform actions are carried out on.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use moobird_consensus::{ContentId, GroupId};
use moobird_stream::{permalink, ContentItem};
use tracing::info;

use crate::error::{Error, Result};

/// Bytes per megabyte as the platform counts them.
pub const MEGABYTE: u64 = 1_024_000;

/// Upload category, which decides the size limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaCategory {
    Image,
    Gif,
    Video,
}

impl MediaCategory {
    /// Category for a MIME type such as `video/mp4` or `image/gif`.
    pub fn from_content_type(content_type: &str) -> Self {
        let content_type = content_type.to_ascii_lowercase();
        if content_type.starts_with("video") {
            Self::Video
        } else if content_type.ends_with("gif") {
            Self::Gif
        } else {
            Self::Image
        }
    }

    pub const fn limit_mb(&self) -> u64 {
        match self {
            Self::Image => 5,
            Self::Gif | Self::Video => 15,
        }
    }

    pub const fn limit_bytes(&self) -> u64 {
        self.limit_mb() * MEGABYTE
    }

    /// Reject `size` bytes if it exceeds the limit.
    pub fn check(&self, size: u64) -> Result<()> {
        if size > self.limit_bytes() {
            return Err(Error::MediaTooLarge {
                category: *self,
                size,
                limit_mb: self.limit_mb(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for MediaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Gif => write!(f, "gif"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// Handle to uploaded media, attached when publishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaRef(pub u64);

/// A newly published item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub content_id: ContentId,
    pub author_handle: String,
}

impl Published {
    pub fn link(&self) -> String {
        permalink(&self.author_handle, self.content_id.0)
    }
}

/// Client for one group's platform account.
#[async_trait]
pub trait ContentPlatform: Send + Sync {
    /// Handle of the account this client acts as.
    async fn own_handle(&self) -> Result<String>;

    async fn publish(&self, text: &str, media: &[MediaRef]) -> Result<Published>;

    async fn upload_media(&self, bytes: Vec<u8>, category: MediaCategory) -> Result<MediaRef>;

    async fn amplify(&self, id: ContentId) -> Result<()>;

    async fn favorite(&self, id: ContentId) -> Result<()>;

    async fn fetch_by_id(&self, id: ContentId) -> Result<ContentItem>;
}

#[derive(Clone)]
struct Account {
    client: Arc<dyn ContentPlatform>,
    handle: String,
}

/// Platform clients by group, with an optional account for every other group.
#[derive(Default)]
pub struct Platforms {
    accounts: RwLock<HashMap<GroupId, Account>>,
    fallback: RwLock<Option<Account>>,
}

impl Platforms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client whose handle is already known.
    pub fn insert(&self, group: GroupId, client: Arc<dyn ContentPlatform>, handle: impl Into<String>) {
        let handle = handle.into();
        info!(%group, %handle, "Platform account registered");
        self.accounts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(group, Account { client, handle });
    }

    /// Register a client, asking it for its handle.
    pub async fn register(&self, group: GroupId, client: Arc<dyn ContentPlatform>) -> Result<()> {
        let handle = client.own_handle().await?;
        self.insert(group, client, handle);
        Ok(())
    }

    /// Serve groups without their own account from `client`.
    pub fn set_fallback(&self, client: Arc<dyn ContentPlatform>, handle: impl Into<String>) {
        let handle = handle.into();
        info!(%handle, "Fallback platform account registered");
        *self.fallback.write().unwrap_or_else(PoisonError::into_inner) = Some(Account { client, handle });
    }

    fn account(&self, group: GroupId) -> Option<Account> {
        let own = self
            .accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&group)
            .cloned();
        own.or_else(|| self.fallback.read().unwrap_or_else(PoisonError::into_inner).clone())
    }

    /// The group's client, or [`Error::ConfigMissing`].
    pub fn get(&self, group: GroupId) -> Result<Arc<dyn ContentPlatform>> {
        self.account(group).map(|a| a.client).ok_or(Error::ConfigMissing {
            group,
            what: "platform credentials",
        })
    }

    /// The group's own handle, if an account is registered.
    pub fn handle(&self, group: GroupId) -> Option<String> {
        self.account(group).map(|a| a.handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dry_run::LogPlatform;

    #[test]
    fn categories_from_content_type() {
        assert_eq!(MediaCategory::from_content_type("image/png"), MediaCategory::Image);
        assert_eq!(MediaCategory::from_content_type("image/gif"), MediaCategory::Gif);
        assert_eq!(MediaCategory::from_content_type("video/mp4"), MediaCategory::Video);
    }

    #[test]
    fn size_limits() {
        assert!(MediaCategory::Image.check(5 * MEGABYTE).is_ok());
        let err = MediaCategory::Image.check(5 * MEGABYTE + 1).unwrap_err();
        assert!(matches!(err, Error::MediaTooLarge { limit_mb: 5, .. }));

        assert!(MediaCategory::Video.check(15 * MEGABYTE).is_ok());
        assert!(MediaCategory::Gif.check(15 * MEGABYTE + 1).is_err());
    }

    #[test]
    fn missing_account_is_config_error() {
        let platforms = Platforms::new();
        let group = GroupId(4);
        assert!(matches!(
            platforms.get(group),
            Err(Error::ConfigMissing { group: g, .. }) if g == group
        ));
        assert!(platforms.handle(group).is_none());
    }

    #[test]
    fn fallback_serves_groups_without_account() {
        let platforms = Platforms::new();
        platforms.set_fallback(Arc::new(LogPlatform::new("shared")), "shared");
        platforms.insert(GroupId(1), Arc::new(LogPlatform::new("own")), "own");

        assert_eq!(platforms.handle(GroupId(1)).as_deref(), Some("own"));
        // Groups configured after startup still get an account.
        assert_eq!(platforms.handle(GroupId(9)).as_deref(), Some("shared"));
        assert!(platforms.get(GroupId(9)).is_ok());
    }

    #[tokio::test]
    async fn register_asks_client_for_handle() {
        let platforms = Platforms::new();
        platforms
            .register(GroupId(2), Arc::new(LogPlatform::new("asked")))
            .await
            .unwrap();
        assert_eq!(platforms.handle(GroupId(2)).as_deref(), Some("asked"));
        assert!(platforms.get(GroupId(3)).is_err());
    }

    #[test]
    fn published_link() {
        let p = Published {
            content_id: ContentId(77),
            author_handle: "moobird".into(),
        };
        assert_eq!(p.link(), "https://twitter.com/moobird/status/77");
    }
}

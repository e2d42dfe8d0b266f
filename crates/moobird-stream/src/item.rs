//! Content items as delivered by the external push feed.

use moobird_consensus::ContentId;
use serde::{Deserialize, Serialize};

/// Author of a content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    #[serde(rename = "screen_name")]
    pub handle: String,
}

/// Untruncated text of a long item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedText {
    pub full_text: String,
}

/// One item from the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: u64,

    #[serde(default)]
    pub text: String,

    /// Set when `text` is cut short and `extended` holds the full text.
    #[serde(default)]
    pub truncated: bool,

    #[serde(default, rename = "extended_tweet")]
    pub extended: Option<ExtendedText>,

    #[serde(rename = "user")]
    pub author: Author,

    #[serde(default, rename = "in_reply_to_status_id")]
    pub reply_to: Option<u64>,

    #[serde(default, rename = "retweeted_status")]
    pub reshare_of: Option<Box<ContentItem>>,

    #[serde(default, rename = "quoted_status")]
    pub quoted: Option<Box<ContentItem>>,
}

impl ContentItem {
    /// Minimal item with plain text, used by feeds that build items
    /// themselves.
    pub fn new(id: u64, handle: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            truncated: false,
            extended: None,
            author: Author {
                handle: handle.into(),
            },
            reply_to: None,
            reshare_of: None,
            quoted: None,
        }
    }

    /// Parse one feed payload.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn content_id(&self) -> ContentId {
        ContentId(self.id)
    }

    /// Full text, preferring the extended text when present.
    pub fn full_text(&self) -> &str {
        match &self.extended {
            Some(ext) if self.truncated || self.text.is_empty() => &ext.full_text,
            _ => &self.text,
        }
    }

    pub fn is_reply(&self) -> bool {
        self.reply_to.is_some()
    }

    pub fn is_reshare(&self) -> bool {
        self.reshare_of.is_some()
    }

    /// Public link to the item.
    pub fn permalink(&self) -> String {
        permalink(&self.author.handle, self.id)
    }
}

/// Public link to item `id` by `handle`.
pub fn permalink(handle: &str, id: u64) -> String {
    format!("https://twitter.com/{}/status/{}", handle, id)
}

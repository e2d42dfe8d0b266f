//! Error types for the moobird node.

use moobird_consensus::GroupId;
use thiserror::Error;

use crate::platform::MediaCategory;

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in node operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Candidate store error
    #[error("Candidate error: {0}")]
    Candidate(#[from] moobird_consensus::Error),

    /// Feed connection error
    #[error("Stream error: {0}")]
    Stream(#[from] moobird_stream::Error),

    /// The external platform, surface or tracker failed
    #[error("External API error: {0}")]
    ExternalApi(String),

    /// The group lacks credentials or settings the operation needs
    #[error("Group {group} is missing configuration: {what}")]
    ConfigMissing { group: GroupId, what: &'static str },

    /// Attachment rejected before upload
    #[error("Attachment of {size} bytes exceeds the {limit_mb} MB limit for {category}")]
    MediaTooLarge {
        category: MediaCategory,
        size: u64,
        limit_mb: u64,
    },

    /// Draft is over the platform's length limit
    #[error("Message is too long by {0} characters")]
    TooLong(usize),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid process configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Lost races on the candidate store. Never surfaced to users.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::Candidate(e) if e.is_benign())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::ExternalApi(e.to_string())
    }
}

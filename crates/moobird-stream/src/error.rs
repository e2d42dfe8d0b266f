//! Error types for moobird-stream.

use moobird_consensus::GroupId;
use thiserror::Error;

/// Result type for stream operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while managing feed connections.
#[derive(Debug, Error)]
pub enum Error {
    /// A stream for the group is already connecting or streaming.
    #[error("a stream is already running for group {0}")]
    AlreadyRunning(GroupId),

    /// The group has no search terms to track.
    #[error("no search terms configured for group {0}")]
    NoSearchTerms(GroupId),

    /// The feed refused or dropped the connection.
    #[error("feed connection failed: {0}")]
    Connect(String),
}

//! moobird Stream Ingestion
//!
//! Consumes the external platform's live search feed for each group and
//! decides which items are worth a vote.
//!
//! # Overview
//!
//! - [`ContentItem`]: one feed payload (text, author, reply/re-share/quote
//!   links)
//! - [`filter`]: the ordered ingestion rules; survivors become interaction
//!   candidates
//! - [`StreamSupervisor`]: per-group feed connections with a
//!   `Stopped → Connecting → Streaming` lifecycle, forwarding items into a
//!   single sink
//!
//! Turning a surviving item into a candidate (dedup, posting, registering)
//! happens in the node, which owns the candidate store.

pub mod connection;
pub mod error;
pub mod filter;
pub mod item;

pub use connection::{ContentFeed, FeedItem, StreamState, StreamSupervisor};
pub use error::{Error, Result};
pub use filter::{screen, FilterContext, FilterRejected};
pub use item::{permalink, ContentItem};

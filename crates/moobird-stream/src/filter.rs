//! Ingestion filter.
//!
//! Decides whether a feed item should become an interaction candidate.
//! Rules run in a fixed order and stop at the first match:
//!
//! 1. replies and re-shares
//! 2. items by our own account
//! 3. quotes of an item that already matches a search term (the quoted
//!    item surfaces on its own)
//! 4. authors on the ignore list
//! 5. ignore terms anywhere in the text
//! 6. noise: cash-tag flooding
//!
//! Rejection is not an error, callers drop the item silently.

use std::fmt;

use crate::item::ContentItem;

/// Symbol counted by the noise heuristic.
pub const NOISE_SYMBOL: char = '$';

/// Items with more than this many noise symbols are dropped.
pub const NOISE_LIMIT: usize = 15;

/// Per-group inputs to the filter.
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
    /// Our own handle on the platform.
    pub own_handle: &'a str,
    /// Active search terms. A term with several words matches when every
    /// word is present.
    pub search_terms: &'a [String],
    /// Ignore list. Entries match author handles (with or without a
    /// leading `@`) and are also matched as substrings of the text.
    pub ignore: &'a [String],
}

/// Why an item was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterRejected {
    Reply,
    Reshare,
    OwnItem,
    QuotesMatch { term: String },
    IgnoredAuthor { handle: String },
    IgnoredTerm { term: String },
    Noise { count: usize },
}

impl fmt::Display for FilterRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reply => write!(f, "reply"),
            Self::Reshare => write!(f, "re-share"),
            Self::OwnItem => write!(f, "own item"),
            Self::QuotesMatch { term } => write!(f, "quotes an item matching {:?}", term),
            Self::IgnoredAuthor { handle } => write!(f, "ignored author @{}", handle),
            Self::IgnoredTerm { term } => write!(f, "ignored term {:?}", term),
            Self::Noise { count } => write!(f, "{} noise symbols", count),
        }
    }
}

/// Run every rule against `item`.
pub fn screen(item: &ContentItem, ctx: &FilterContext<'_>) -> Result<(), FilterRejected> {
    if item.is_reply() {
        return Err(FilterRejected::Reply);
    }
    if item.is_reshare() {
        return Err(FilterRejected::Reshare);
    }

    let handle = item.author.handle.to_lowercase();
    if handle == normalize_handle(ctx.own_handle) {
        return Err(FilterRejected::OwnItem);
    }

    if let Some(quoted) = &item.quoted {
        let quoted_text = quoted.full_text().to_lowercase();
        if let Some(term) = ctx
            .search_terms
            .iter()
            .find(|t| matches_search_term(&quoted_text, t))
        {
            return Err(FilterRejected::QuotesMatch { term: term.clone() });
        }
    }

    if ctx.ignore.iter().any(|entry| normalize_handle(entry) == handle) {
        return Err(FilterRejected::IgnoredAuthor { handle });
    }

    let text = item.full_text();
    let lowered = text.to_lowercase();
    if let Some(term) = ctx
        .ignore
        .iter()
        .find(|t| !t.is_empty() && lowered.contains(&t.to_lowercase()))
    {
        return Err(FilterRejected::IgnoredTerm { term: term.clone() });
    }

    let count = text.matches(NOISE_SYMBOL).count();
    if count > NOISE_LIMIT {
        return Err(FilterRejected::Noise { count });
    }

    Ok(())
}

/// Lower-case a handle and strip its sigil.
pub fn normalize_handle(handle: &str) -> String {
    handle.trim().trim_start_matches('@').to_lowercase()
}

/// Whether lower-cased `text` matches a search term: every word of the
/// term appears in the text.
fn matches_search_term(text: &str, term: &str) -> bool {
    let mut words = term.split_whitespace().peekable();
    if words.peek().is_none() {
        return false;
    }
    words.all(|w| text.contains(&w.to_lowercase()))
}

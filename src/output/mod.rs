//! Final output documents
//!
//! Each pipeline writes exactly one pretty-printed JSON document, once, on
//! completion. The checkpoint stays behind as an audit trail.

use crate::Page;
use std::collections::HashSet;

pub mod json;

pub use json::JsonDocumentWriter;

/// Output writer errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Buffer flush error
    #[error("flush error: {0}")]
    FlushError(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Drop records whose `key` value was already seen on an earlier page
///
/// Boundary overlap re-fetches the tail of a full page, so the same record
/// can appear twice. Records without the key are always kept; pages left
/// empty are dropped. Returns the pages and the number of records removed.
pub fn dedup_pages(pages: Vec<Page>, key: &str) -> (Vec<Page>, usize) {
    let mut seen = HashSet::new();
    let mut removed = 0;

    let pages = pages
        .into_iter()
        .filter_map(|page| {
            let before = page.len();
            let kept: Vec<_> = page
                .into_records()
                .into_iter()
                .filter(|record| match record.get(key) {
                    Some(value) => seen.insert(value.to_string()),
                    None => true,
                })
                .collect();
            removed += before - kept.len();
            (!kept.is_empty()).then(|| Page::new(kept))
        })
        .collect();

    (pages, removed)
}

//! Data sources
//!
//! The pipelines only see the three traits below; the osu! HTTP
//! implementations live in [`osu_api`] and [`rankings`].

use crate::cursor::Cursor;
use crate::{RawRecord, UserId};
use async_trait::async_trait;

pub mod osu_api;
pub mod osu_http;
pub mod rankings;

/// Fetcher errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetcherError {
    /// Non-success HTTP status without an error payload
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Response body is not the JSON we expect
    #[error("parse error: {0}")]
    ParseError(String),

    /// Explicit error payload from the service
    #[error("API error: {0}")]
    ApiError(String),

    /// Service rejected the request for exceeding its rate limit
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    /// JSON of an unexpected shape
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Transport failure (connect, timeout, reset)
    #[error("network error: {0}")]
    NetworkError(String),
}

impl FetcherError {
    /// Whether the service itself refused the request
    ///
    /// Such errors abort a run in either pipeline. Everything else is a
    /// transport or decode failure.
    pub fn is_fatal_service_error(&self) -> bool {
        matches!(
            self,
            FetcherError::ApiError(_) | FetcherError::RateLimitExceeded
        )
    }
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// Timeline endpoint ordered by an approval timestamp
#[async_trait]
pub trait TimelineSource: Send + Sync {
    /// Records at or after `since`, at most one page, in timeline order
    ///
    /// An empty vector means the timeline is exhausted.
    async fn fetch_page(&self, since: Cursor) -> FetcherResult<Vec<RawRecord>>;
}

/// Per-identifier detail endpoint
#[async_trait]
pub trait DetailSource: Send + Sync {
    /// Detail records of one user
    async fn fetch_detail(&self, user_id: UserId) -> FetcherResult<Vec<RawRecord>>;
}

/// Producer of the ordered identifier list fed to the batch pipeline
#[async_trait]
pub trait ListEnumerator: Send + Sync {
    /// Walk `page_count` listing pages and return their ids in order
    async fn enumerate(&self, page_count: usize) -> FetcherResult<Vec<UserId>>;
}

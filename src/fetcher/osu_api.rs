//! osu! v1 API client
//!
//! Implements [`TimelineSource`] over `get_beatmaps` and [`DetailSource`]
//! over `get_user_best`.

use async_trait::async_trait;
use tracing::debug;

use crate::cursor::Cursor;
use crate::downloader::config::{ApiConfig, API_MAX_RESULTS, TOP_SCORES};
use crate::fetcher::osu_http::{parse_records, OsuHttpClient};
use crate::fetcher::{DetailSource, FetcherResult, TimelineSource};
use crate::{GameMode, RawRecord, UserId};

const GET_BEATMAPS: &str = "get_beatmaps";
const GET_USER_BEST: &str = "get_user_best";

/// Parameters of the per-user best-scores request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetailQuery {
    /// Game mode of the scores
    pub mode: GameMode,
    /// Scores per user, at most 100
    pub limit: u32,
}

impl Default for DetailQuery {
    fn default() -> Self {
        Self {
            mode: GameMode::Osu,
            limit: TOP_SCORES,
        }
    }
}

/// osu! v1 API client
#[derive(Debug, Clone)]
pub struct OsuApiClient {
    http: OsuHttpClient,
    page_limit: usize,
    detail: DetailQuery,
}

impl OsuApiClient {
    /// Client for the beatmap timeline with default score queries
    pub fn new(config: &ApiConfig) -> FetcherResult<Self> {
        Ok(Self {
            http: OsuHttpClient::new(config)?,
            page_limit: API_MAX_RESULTS,
            detail: DetailQuery::default(),
        })
    }

    /// Use `query` for [`DetailSource::fetch_detail`]
    pub fn with_detail_query(mut self, query: DetailQuery) -> Self {
        self.detail = query;
        self
    }

    /// Request at most `limit` beatmaps per page
    pub fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = limit;
        self
    }

    fn beatmap_params(&self, since: Cursor) -> Vec<(&'static str, String)> {
        vec![
            ("since", since.to_string()),
            ("limit", self.page_limit.to_string()),
        ]
    }

    fn user_best_params(&self, user_id: UserId) -> Vec<(&'static str, String)> {
        vec![
            ("u", user_id.to_string()),
            ("type", "id".to_string()),
            ("m", self.detail.mode.api_value().to_string()),
            ("limit", self.detail.limit.to_string()),
        ]
    }
}

#[async_trait]
impl TimelineSource for OsuApiClient {
    async fn fetch_page(&self, since: Cursor) -> FetcherResult<Vec<RawRecord>> {
        let value = self
            .http
            .get_json(GET_BEATMAPS, &self.beatmap_params(since))
            .await?;
        let records = parse_records(value)?;
        debug!(since = %since, records = records.len(), "Fetched beatmap page");
        Ok(records)
    }
}

#[async_trait]
impl DetailSource for OsuApiClient {
    async fn fetch_detail(&self, user_id: UserId) -> FetcherResult<Vec<RawRecord>> {
        let value = self
            .http
            .get_json(GET_USER_BEST, &self.user_best_params(user_id))
            .await?;
        parse_records(value)
    }
}

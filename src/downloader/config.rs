//! Download configuration
//!
//! Every tunable lives in [`HarvestConfig`], built once (usually from CLI
//! flags) and handed to each component at construction.

use crate::cursor::Cursor;
use crate::GameMode;
use chrono::NaiveDate;
use std::path::PathBuf;
use std::time::Duration;

/// Base URL of the osu! v1 API
pub const DEFAULT_API_BASE_URL: &str = "https://osu.ppy.sh/api";

/// Legacy performance ranking listing
pub const DEFAULT_RANKINGS_URL: &str = "https://old.ppy.sh/p/pp";

/// Maximum number of beatmaps `get_beatmaps` returns per request.
/// A page of exactly this size may have cut a same-second group in two.
pub const API_MAX_RESULTS: usize = 500;

/// Record field the timeline is ordered by
pub const ORDERING_KEY: &str = "approved_date";

/// Day the first ranked beatmap was approved
pub const DEFAULT_SINCE: (i32, u32, u32) = (2007, 10, 7);

/// Request ceiling of the osu! v1 API per key
pub const MAX_REQUESTS_PER_MINUTE: u32 = 1200;

/// Detail fetches issued concurrently per chunk.
/// 100 requests per 5 second window is exactly [`MAX_REQUESTS_PER_MINUTE`].
pub const BATCH_REQUESTS: usize = 100;

/// Minimum wall-clock duration of one chunk
pub const BATCH_INTERVAL: Duration = Duration::from_secs(5);

/// Persist the batch checkpoint every N chunks.
/// Saving rewrites every result so far, so it is not done after every chunk.
pub const CHECKPOINT_EVERY_CHUNKS: usize = 10;

/// Users listed per ranking page
pub const RANKS_PER_PAGE: usize = 50;

/// Deepest rank the ranking listing exposes
pub const MAX_RANK: usize = 10_000;

/// Best scores requested per user (API maximum)
pub const TOP_SCORES: u32 = 100;

/// HTTP request timeout (seconds), so a hung request fails instead of stalling a chunk
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// HTTP connect timeout (seconds)
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default checkpoint directory
pub const DEFAULT_CHECKPOINT_DIR: &str = ".checkpoints";

/// Upstream endpoints and credentials
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// API key sent as `k`
    pub api_key: String,
    /// Base URL of the JSON API
    pub base_url: String,
    /// URL of the ranking listing pages
    pub rankings_url: String,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_API_BASE_URL.to_string(),
            rankings_url: DEFAULT_RANKINGS_URL.to_string(),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
        }
    }
}

impl ApiConfig {
    /// Validate endpoint settings
    pub fn validate(&self) -> Result<(), String> {
        if self.api_key.trim().is_empty() {
            return Err("API key cannot be empty".to_string());
        }
        if self.base_url.is_empty() {
            return Err("API base URL cannot be empty".to_string());
        }
        if self.request_timeout.is_zero() {
            return Err("request timeout must be positive".to_string());
        }
        Ok(())
    }
}

/// Cursor paginator settings
#[derive(Debug, Clone)]
pub struct TimelineConfig {
    /// Cursor of a fresh walk
    pub start: Cursor,
    /// Page size at which a boundary group may have been cut
    pub page_cap: usize,
    /// Record field holding the ordering timestamp
    pub ordering_key: String,
    /// Final output document
    pub output_path: PathBuf,
    /// Drop duplicate records by this field when writing the output
    pub dedup_key: Option<String>,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        let (year, month, day) = DEFAULT_SINCE;
        let start = NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or_default();

        Self {
            start: Cursor::from(start),
            page_cap: API_MAX_RESULTS,
            ordering_key: ORDERING_KEY.to_string(),
            output_path: PathBuf::from("maps.json"),
            dedup_key: None,
        }
    }
}

impl TimelineConfig {
    /// Validate paginator settings
    pub fn validate(&self) -> Result<(), String> {
        if self.page_cap == 0 {
            return Err("page cap must be at least 1".to_string());
        }
        if self.ordering_key.is_empty() {
            return Err("ordering key cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Batch fetcher settings
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Game mode of the ranking and the scores
    pub mode: GameMode,
    /// Restrict the ranking to one country (ISO 3166-1 alpha-2)
    pub country: Option<String>,
    /// Best scores requested per user
    pub top_scores: u32,
    /// First rank to fetch (0-based, inclusive)
    pub start_rank: usize,
    /// Rank to stop at (exclusive)
    pub end_rank: usize,
    /// Identifiers fetched concurrently per chunk
    pub chunk_size: usize,
    /// Persist the checkpoint every N chunks
    pub checkpoint_every: usize,
    /// Throttle floor interval per chunk
    pub floor_interval: Duration,
    /// Reject settings whose `chunk_size` per `floor_interval` exceeds this rate.
    /// `None` disables the check.
    pub max_requests_per_minute: Option<u32>,
    /// Final output document
    pub output_path: PathBuf,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            mode: GameMode::Osu,
            country: None,
            top_scores: TOP_SCORES,
            start_rank: 0,
            end_rank: MAX_RANK,
            chunk_size: BATCH_REQUESTS,
            checkpoint_every: CHECKPOINT_EVERY_CHUNKS,
            floor_interval: BATCH_INTERVAL,
            max_requests_per_minute: Some(MAX_REQUESTS_PER_MINUTE),
            output_path: PathBuf::from("rankings.json"),
        }
    }
}

impl BatchConfig {
    /// Listing pages needed to cover `end_rank`
    pub fn page_count(&self) -> usize {
        crate::fetcher::rankings::pages_for_rank(self.end_rank)
    }

    /// Request rate implied by one chunk per floor interval
    pub fn requests_per_minute(&self) -> f64 {
        self.chunk_size as f64 * 60.0 / self.floor_interval.as_secs_f64()
    }

    /// Validate batch settings
    pub fn validate(&self) -> Result<(), String> {
        if self.start_rank >= self.end_rank {
            return Err(format!(
                "start rank ({}) must be below end rank ({})",
                self.start_rank, self.end_rank
            ));
        }
        if self.end_rank > MAX_RANK {
            return Err(format!(
                "end rank ({}) exceeds the deepest listed rank ({MAX_RANK})",
                self.end_rank
            ));
        }
        if self.chunk_size == 0 {
            return Err("chunk size must be at least 1".to_string());
        }
        if self.checkpoint_every == 0 {
            return Err("checkpoint frequency must be at least 1".to_string());
        }
        if let Some(limit) = self.max_requests_per_minute {
            if self.floor_interval.is_zero() {
                return Err(format!(
                    "a zero throttle interval cannot stay under {limit} requests/minute"
                ));
            }
            let rate = self.requests_per_minute();
            if rate > f64::from(limit) {
                return Err(format!(
                    "{} requests every {:?} is {rate:.0} requests/minute, above the limit of {limit}",
                    self.chunk_size, self.floor_interval
                ));
            }
        }
        if self.top_scores == 0 || self.top_scores > TOP_SCORES {
            return Err(format!(
                "top scores must be between 1 and {TOP_SCORES}, got {}",
                self.top_scores
            ));
        }
        if let Some(country) = &self.country {
            if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(format!("invalid country code: {country}"));
            }
        }
        Ok(())
    }
}

/// Complete configuration of a downloader process
#[derive(Debug, Clone, Default)]
pub struct HarvestConfig {
    /// Upstream endpoints and credentials
    pub api: ApiConfig,
    /// Cursor paginator settings
    pub timeline: TimelineConfig,
    /// Batch fetcher settings
    pub batch: BatchConfig,
    /// Where checkpoints are stored
    pub checkpoint_dir: PathBuf,
}

impl HarvestConfig {
    /// Defaults with the given API key
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api: ApiConfig {
                api_key: api_key.into(),
                ..ApiConfig::default()
            },
            checkpoint_dir: PathBuf::from(DEFAULT_CHECKPOINT_DIR),
            ..Self::default()
        }
    }
}

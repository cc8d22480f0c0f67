//! # osu! Data Downloader Library
//!
//! Resumable, crash-tolerant bulk extraction from the osu! v1 API.
//!
//! ## Features
//!
//! - **Beatmap history**: walks `get_beatmaps` from a start date to the present
//!   with a timestamp cursor, correcting for page boundaries that split a group
//!   of maps approved in the same second
//! - **Top-player scores**: enumerates ranked user ids once, then fetches each
//!   user's best scores in concurrent, throttled chunks
//! - **Resume Capability**: versioned JSON checkpoints written atomically after
//!   each page or every N chunks; a killed run restarts where it left off
//! - **Rate Limiting**: fixed-window pacing keeps the aggregate request rate
//!   under the API ceiling
//!
//! ## Quick Start
//!
//! ```no_run
//! use osu_data_downloader::downloader::{CursorPaginator, HarvestConfig};
//! use osu_data_downloader::fetcher::osu_api::OsuApiClient;
//! use osu_data_downloader::resume::FileCheckpointStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HarvestConfig::with_api_key("my-api-key");
//! let client = Arc::new(OsuApiClient::new(&config.api)?);
//! let store = Arc::new(FileCheckpointStore::new(&config.checkpoint_dir));
//!
//! let paginator = CursorPaginator::new(client, store, config.timeline.clone());
//! let report = paginator.run().await?;
//! println!("{} records written", report.records_written);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`cursor`] - Timeline cursor parsing and the one-second boundary nudge
//! - [`fetcher`] - Source traits and the osu! HTTP implementations
//! - [`resume`] - Checkpoint schema, atomic store and run lock
//! - [`downloader`] - Cursor paginator, batch fetcher, throttle and config
//! - [`output`] - Final JSON document writer
//! - [`metrics`] - Counters and histograms for both pipelines

#![warn(missing_docs)]
#![warn(clippy::all)]

use cursor::{Cursor, CursorError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// CLI command implementations
pub mod cli;

/// Timeline cursor type
pub mod cursor;

/// Pipeline orchestration
pub mod downloader;

/// Data sources
pub mod fetcher;

/// Pipeline metrics
pub mod metrics;

/// Final output writers
pub mod output;

/// Checkpoint persistence
pub mod resume;

/// An opaque record as returned by the API
///
/// The downloader never interprets fields other than the timeline ordering key.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// osu! user id, the identifier type of the batch pipeline
pub type UserId = u64;

/// One timeline API response, in the order the service returned it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Page {
    records: Vec<RawRecord>,
}

impl Page {
    /// Wrap a response body
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self { records }
    }

    /// Records in service order
    pub fn records(&self) -> &[RawRecord] {
        &self.records
    }

    /// Number of records on the page
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the page carries no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Consume the page and return its records
    pub fn into_records(self) -> Vec<RawRecord> {
        self.records
    }

    /// Ordering key of the last record, `None` for an empty page
    pub fn last_ordering_key(&self, field: &str) -> Result<Option<Cursor>, CursorError> {
        let Some(last) = self.records.last() else {
            return Ok(None);
        };

        let value = last
            .get(field)
            .ok_or_else(|| CursorError::MissingOrderingKey(field.to_string()))?;
        let raw = value
            .as_str()
            .ok_or_else(|| CursorError::InvalidOrderingKey(value.to_string()))?;
        Cursor::from_ordering_key(raw).map(Some)
    }
}

/// Detail records fetched for one identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailResult {
    /// User the records belong to
    pub user_id: UserId,
    /// Records in service order (best scores, highest first)
    pub records: Vec<RawRecord>,
}

/// An identifier whose detail fetch failed and was skipped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchFailure {
    /// User whose fetch failed
    pub user_id: UserId,
    /// Index of the user in the identifier list
    pub position: usize,
    /// Failure description
    pub error: String,
    /// When the failure was observed (Unix milliseconds)
    pub failed_at: i64,
}

/// osu! game mode, sent as the `m` query parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    /// osu!standard
    #[default]
    Osu,
    /// osu!taiko
    Taiko,
    /// osu!catch
    Fruits,
    /// osu!mania
    Mania,
}

impl GameMode {
    /// Numeric value expected by the API
    pub fn api_value(&self) -> u8 {
        match self {
            GameMode::Osu => 0,
            GameMode::Taiko => 1,
            GameMode::Fruits => 2,
            GameMode::Mania => 3,
        }
    }
}

impl std::fmt::Display for GameMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GameMode::Osu => "osu",
            GameMode::Taiko => "taiko",
            GameMode::Fruits => "fruits",
            GameMode::Mania => "mania",
        };
        write!(f, "{s}")
    }
}

impl FromStr for GameMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "osu" | "0" => Ok(GameMode::Osu),
            "taiko" | "1" => Ok(GameMode::Taiko),
            "fruits" | "catch" | "ctb" | "2" => Ok(GameMode::Fruits),
            "mania" | "3" => Ok(GameMode::Mania),
            _ => Err(format!(
                "Invalid game mode: {s}. Valid options: osu, taiko, fruits, mania"
            )),
        }
    }
}

//! Pipeline orchestration and pacing
//!
//! Two pipelines share the checkpoint store and the error taxonomy below:
//!
//! 1. **Cursor pagination**: [`paginator::CursorPaginator`] walks the beatmap
//!    timeline page by page, persisting after every page
//! 2. **Batch fetch**: [`batch::BatchFetcher`] enumerates user ids once, then
//!    fetches their details in concurrent chunks paced by
//!    [`throttle::Throttle`], persisting every N chunks
//!
//! # Components
//!
//! - [`paginator`] - Timeline walk with boundary-overlap correction
//! - [`batch`] - Chunked concurrent detail fetch
//! - [`throttle`] - Fixed-window pacing between chunks
//! - [`progress`] - Percentage, rate and ETA of a batch run
//! - [`config`] - Configuration constants and [`HarvestConfig`]
//!
//! # Error Handling
//!
//! All operations return `Result<T, DownloadError>`. Nothing is retried in
//! process: a failed run leaves its last persisted checkpoint untouched and a
//! rerun resumes from it (see [`DownloadError::is_resumable`]).

use crate::cursor::{Cursor, CursorError};
use crate::fetcher::FetcherError;
use crate::output::OutputError;
use crate::resume::ResumeError;
use std::path::PathBuf;

pub mod batch;
pub mod config;
pub mod paginator;
pub mod progress;
pub mod throttle;

pub use batch::BatchFetcher;
pub use config::{ApiConfig, BatchConfig, HarvestConfig, TimelineConfig};
pub use paginator::{CursorPaginator, PageOutcome};
pub use progress::BatchProgress;
pub use throttle::Throttle;

/// Download errors
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// The service refused a request (error payload, rate limit)
    #[error("service refused request: {0}")]
    FatalService(FetcherError),

    /// A timeline request failed in transport or decoding
    #[error("transport failure: {0}")]
    Transport(FetcherError),

    /// The identifier list could not be produced
    #[error("enumeration failed: {0}")]
    Enumeration(FetcherError),

    /// Checkpoint could not be loaded or saved
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] ResumeError),

    /// Final output could not be written
    #[error("output error: {0}")]
    Output(#[from] OutputError),

    /// A record lacks a usable ordering key
    #[error("invalid record: {0}")]
    InvalidRecord(#[from] CursorError),

    /// A page would not move the cursor forward
    #[error(
        "pagination stalled at {cursor}: a page of {records} records (cap {page_cap}) did not advance the cursor"
    )]
    PaginationStalled {
        /// Cursor that produced the page
        cursor: Cursor,
        /// Records on the offending page
        records: usize,
        /// Page size limit in effect
        page_cap: usize,
    },

    /// Validation error
    #[error("validation error: {0}")]
    ValidationError(String),
}

impl DownloadError {
    /// Classify a fetch failure that ends the run
    pub fn from_fetch(error: FetcherError) -> Self {
        if error.is_fatal_service_error() {
            DownloadError::FatalService(error)
        } else {
            DownloadError::Transport(error)
        }
    }

    /// Whether rerunning unchanged may succeed from the stored checkpoint
    ///
    /// Configuration mistakes, corrupt checkpoints and stalls need the
    /// operator first.
    pub fn is_resumable(&self) -> bool {
        match self {
            DownloadError::FatalService(_)
            | DownloadError::Transport(_)
            | DownloadError::Enumeration(_)
            | DownloadError::Output(_) => true,
            DownloadError::Checkpoint(e) => matches!(e, ResumeError::IoError(_)),
            DownloadError::InvalidRecord(_)
            | DownloadError::PaginationStalled { .. }
            | DownloadError::ValidationError(_) => false,
        }
    }
}

/// Summary of a completed timeline walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationReport {
    /// Pages fetched by this process (excludes pages restored from a checkpoint)
    pub pages_fetched: usize,
    /// Pages in the checkpoint at completion
    pub pages_total: usize,
    /// Records in the output document
    pub records_written: usize,
    /// Records dropped by output de-duplication
    pub duplicates_removed: usize,
    /// Cursor the exhausted request was made with
    pub final_cursor: Cursor,
    /// Output document
    pub output_path: PathBuf,
}

/// Summary of a completed batch run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// Chunks fetched by this process
    pub chunks_fetched: usize,
    /// Identifiers in the run's window
    pub identifiers: usize,
    /// Identifiers with results
    pub succeeded: usize,
    /// Identifiers dropped after a failed fetch
    pub failed: usize,
    /// Output document
    pub output_path: PathBuf,
}

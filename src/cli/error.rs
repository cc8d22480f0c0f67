//! CLI error types and conversions

use crate::downloader::DownloadError;
use crate::fetcher::FetcherError;
use crate::resume::ResumeError;

/// Exit status of a run that aborted but can resume from its checkpoint
pub const EXIT_RESUMABLE: i32 = 2;

/// Exit status of errors that need operator action first
pub const EXIT_OPERATOR: i32 = 1;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Download error
    #[error("download error: {0}")]
    DownloadError(#[from] DownloadError),

    /// Fetcher error
    #[error("fetcher error: {0}")]
    FetcherError(#[from] FetcherError),

    /// Resume error
    #[error("resume error: {0}")]
    ResumeError(#[from] ResumeError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}

impl CliError {
    /// Process exit status for this error
    ///
    /// `2` when rerunning the same command resumes from the checkpoint, `1`
    /// otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::DownloadError(e) if e.is_resumable() => EXIT_RESUMABLE,
            _ => EXIT_OPERATOR,
        }
    }
}

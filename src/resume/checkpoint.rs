//! Checkpoint types for resume capability
//!
//! One checkpoint per pipeline. Pages, results and failures are append-only;
//! the identifier list of a batch run is fixed once written.

use super::state::ResumeError;
use crate::cursor::Cursor;
use crate::{DetailResult, FetchFailure, Page, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline that owns a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    /// Cursor walk over the beatmap timeline
    Pagination,
    /// Chunked user detail fetch
    Batch,
}

impl PipelineKind {
    /// Stable tag used in file names and metrics labels
    pub fn tag(&self) -> &'static str {
        match self {
            PipelineKind::Pagination => "pagination",
            PipelineKind::Batch => "batch",
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Recoverable state of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "pipeline", rename_all = "snake_case")]
pub enum Checkpoint {
    /// Timeline walk state
    Pagination(PaginationCheckpoint),
    /// Batch fetch state
    Batch(BatchCheckpoint),
}

impl Checkpoint {
    /// Pipeline this checkpoint belongs to
    pub fn kind(&self) -> PipelineKind {
        match self {
            Checkpoint::Pagination(_) => PipelineKind::Pagination,
            Checkpoint::Batch(_) => PipelineKind::Batch,
        }
    }

    /// Check structural invariants after loading
    pub fn validate(&self) -> Result<(), ResumeError> {
        match self {
            Checkpoint::Pagination(cp) => cp.validate(),
            Checkpoint::Batch(cp) => cp.validate(),
        }
    }

    /// Borrowed view for saving
    pub fn borrowed(&self) -> CheckpointRef<'_> {
        match self {
            Checkpoint::Pagination(cp) => CheckpointRef::Pagination(cp),
            Checkpoint::Batch(cp) => CheckpointRef::Batch(cp),
        }
    }
}

/// Borrowed checkpoint, serialized exactly like [`Checkpoint`]
///
/// Saves go through this view so a pipeline never copies its state to
/// persist it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "pipeline", rename_all = "snake_case")]
pub enum CheckpointRef<'a> {
    /// Timeline walk state
    Pagination(&'a PaginationCheckpoint),
    /// Batch fetch state
    Batch(&'a BatchCheckpoint),
}

impl CheckpointRef<'_> {
    /// Pipeline this checkpoint belongs to
    pub fn kind(&self) -> PipelineKind {
        match self {
            CheckpointRef::Pagination(_) => PipelineKind::Pagination,
            CheckpointRef::Batch(_) => PipelineKind::Batch,
        }
    }
}

impl<'a> From<&'a Checkpoint> for CheckpointRef<'a> {
    fn from(checkpoint: &'a Checkpoint) -> Self {
        checkpoint.borrowed()
    }
}

/// Cursor walk state: where the next request starts and every page so far
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationCheckpoint {
    cursor: Cursor,
    pages: Vec<Page>,
}

impl PaginationCheckpoint {
    /// Fresh walk starting at `cursor`
    pub fn new(cursor: Cursor) -> Self {
        Self {
            cursor,
            pages: Vec::new(),
        }
    }

    /// Lower bound of the next request
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Committed pages in fetch order
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Total records over all committed pages
    pub fn record_count(&self) -> usize {
        self.pages.iter().map(Page::len).sum()
    }

    /// Append a page and move the cursor to `next`
    pub fn commit_page(&mut self, page: Page, next: Cursor) {
        self.pages.push(page);
        self.cursor = next;
    }

    /// Committed pages, consuming the checkpoint
    pub fn into_pages(self) -> Vec<Page> {
        self.pages
    }

    fn validate(&self) -> Result<(), ResumeError> {
        // An empty page means exhaustion and is never committed
        if let Some(index) = self.pages.iter().position(Page::is_empty) {
            return Err(ResumeError::InvalidState(format!(
                "pagination checkpoint contains an empty page at index {index}"
            )));
        }
        Ok(())
    }
}

/// Batch fetch state: the identifier list and how far through it we are
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchCheckpoint {
    identifiers: Vec<UserId>,
    start_position: usize,
    position: usize,
    results: Vec<DetailResult>,
    #[serde(default)]
    failures: Vec<FetchFailure>,
}

impl BatchCheckpoint {
    /// Fresh run over `identifiers`, starting at `start_position`
    pub fn new(identifiers: Vec<UserId>, start_position: usize) -> Result<Self, ResumeError> {
        if start_position > identifiers.len() {
            return Err(ResumeError::InvalidState(format!(
                "start position {} exceeds identifier count {}",
                start_position,
                identifiers.len()
            )));
        }

        Ok(Self {
            identifiers,
            start_position,
            position: start_position,
            results: Vec::new(),
            failures: Vec::new(),
        })
    }

    /// Full identifier list
    pub fn identifiers(&self) -> &[UserId] {
        &self.identifiers
    }

    /// Index of the next unfetched identifier
    pub fn position(&self) -> usize {
        self.position
    }

    /// Position the run started at
    pub fn start_position(&self) -> usize {
        self.start_position
    }

    /// Successful results in identifier order
    pub fn results(&self) -> &[DetailResult] {
        &self.results
    }

    /// Identifiers whose fetch failed and were skipped
    pub fn failures(&self) -> &[FetchFailure] {
        &self.failures
    }

    /// Identifiers left to fetch
    pub fn remaining(&self) -> usize {
        self.identifiers.len().saturating_sub(self.position)
    }

    /// Whether every identifier has been consumed
    pub fn is_complete(&self) -> bool {
        self.position == self.identifiers.len()
    }

    /// Next slice of at most `chunk_size` identifiers
    pub fn next_chunk(&self, chunk_size: usize) -> &[UserId] {
        let end = self.position.saturating_add(chunk_size).min(self.identifiers.len());
        &self.identifiers[self.position..end]
    }

    /// Record a finished chunk and advance past all of it
    ///
    /// The position moves by `chunk_len` however many fetches succeeded.
    pub fn commit_chunk(
        &mut self,
        chunk_len: usize,
        results: Vec<DetailResult>,
        failures: Vec<FetchFailure>,
    ) -> Result<(), ResumeError> {
        if chunk_len > self.remaining() {
            return Err(ResumeError::InvalidState(format!(
                "chunk of {} overruns the {} remaining identifiers",
                chunk_len,
                self.remaining()
            )));
        }
        if results.len() + failures.len() != chunk_len {
            return Err(ResumeError::InvalidState(format!(
                "chunk of {} produced {} results and {} failures",
                chunk_len,
                results.len(),
                failures.len()
            )));
        }

        self.results.extend(results);
        self.failures.extend(failures);
        self.position += chunk_len;
        Ok(())
    }

    fn validate(&self) -> Result<(), ResumeError> {
        if self.position > self.identifiers.len() {
            return Err(ResumeError::InvalidState(format!(
                "position {} exceeds identifier count {}",
                self.position,
                self.identifiers.len()
            )));
        }
        if self.start_position > self.position {
            return Err(ResumeError::InvalidState(format!(
                "position {} is before start position {}",
                self.position, self.start_position
            )));
        }

        let consumed = self.position - self.start_position;
        let accounted = self.results.len() + self.failures.len();
        if consumed != accounted {
            return Err(ResumeError::InvalidState(format!(
                "{consumed} identifiers consumed but {accounted} outcomes recorded"
            )));
        }
        Ok(())
    }
}

//! Cursor pagination over the beatmap timeline
//!
//! Each request asks for records after the cursor. The next cursor is the
//! ordering key `T` of the page's last record, except after a full page: the
//! service caps responses, so a full page may have cut a group of records
//! sharing `T` in two. Stepping back to `T - 1s` re-fetches that group whole
//! on the next request, at the price of duplicates across the boundary.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, Instrument, Level};

use crate::cursor::Cursor;
use crate::downloader::config::TimelineConfig;
use crate::downloader::{DownloadError, PaginationReport};
use crate::fetcher::TimelineSource;
use crate::metrics::{self, PipelineMetrics};
use crate::output::{dedup_pages, JsonDocumentWriter};
use crate::resume::{
    Checkpoint, CheckpointRef, CheckpointStore, PaginationCheckpoint, PipelineKind, ResumeError,
};
use crate::{Page, RawRecord};

/// Result of one pagination step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// A page was committed and the cursor moved
    Advanced {
        /// Records on the page
        records: usize,
        /// Cursor of the next request
        next: Cursor,
        /// Whether the page hit the cap and the cursor was stepped back
        full: bool,
    },
    /// The service returned no records; the walk is over
    Exhausted,
}

/// Sequential, resumable walk over a [`TimelineSource`]
pub struct CursorPaginator {
    source: Arc<dyn TimelineSource>,
    store: Arc<dyn CheckpointStore>,
    config: TimelineConfig,
}

impl CursorPaginator {
    /// Paginator over `source`, persisting into `store`
    pub fn new(
        source: Arc<dyn TimelineSource>,
        store: Arc<dyn CheckpointStore>,
        config: TimelineConfig,
    ) -> Self {
        Self {
            source,
            store,
            config,
        }
    }

    /// Stored checkpoint, or a fresh one at the configured start
    pub fn load_or_init(&self) -> Result<PaginationCheckpoint, DownloadError> {
        match self.store.load(PipelineKind::Pagination)? {
            Some(Checkpoint::Pagination(checkpoint)) => {
                info!(
                    cursor = %checkpoint.cursor(),
                    pages = checkpoint.pages().len(),
                    records = checkpoint.record_count(),
                    "Resuming timeline walk"
                );
                Ok(checkpoint)
            }
            Some(other) => Err(ResumeError::PipelineMismatch {
                expected: PipelineKind::Pagination,
                found: other.kind(),
            }
            .into()),
            None => {
                info!(cursor = %self.config.start, "Starting timeline walk");
                Ok(PaginationCheckpoint::new(self.config.start))
            }
        }
    }

    /// Cursor following `page`, which was fetched with `current`
    ///
    /// Fails when the page has no usable ordering key or when the result would
    /// not move past `current`; the latter means a single timestamp holds more
    /// records than fit on a page, and requesting again would loop forever.
    pub fn next_cursor(&self, page: &Page, current: Cursor) -> Result<Cursor, DownloadError> {
        let last = page
            .last_ordering_key(&self.config.ordering_key)?
            .ok_or_else(|| DownloadError::ValidationError("empty page has no cursor".to_string()))?;

        let next = if page.len() >= self.config.page_cap {
            last.step_back()
        } else {
            last
        };

        if next <= current {
            return Err(DownloadError::PaginationStalled {
                cursor: current,
                records: page.len(),
                page_cap: self.config.page_cap,
            });
        }
        Ok(next)
    }

    /// Fetch one page at the checkpoint's cursor, commit it and persist
    ///
    /// On error the checkpoint is left exactly as it was.
    pub async fn step(
        &self,
        checkpoint: &mut PaginationCheckpoint,
    ) -> Result<PageOutcome, DownloadError> {
        let cursor = checkpoint.cursor();
        let records = self
            .source
            .fetch_page(cursor)
            .await
            .map_err(DownloadError::from_fetch)?;

        if records.is_empty() {
            info!(cursor = %cursor, "Timeline exhausted");
            return Ok(PageOutcome::Exhausted);
        }

        let page = Page::new(records);
        let count = page.len();
        let full = count >= self.config.page_cap;
        let next = self.next_cursor(&page, cursor)?;

        if tracing::enabled!(Level::DEBUG) {
            for record in page.records() {
                debug!(
                    approved_date = field(record, "approved_date"),
                    beatmap_id = field(record, "beatmap_id"),
                    "{} - {} [{}]",
                    field(record, "artist"),
                    field(record, "title"),
                    field(record, "version"),
                );
            }
        }

        metrics::record_page(count, full);
        checkpoint.commit_page(page, next);
        self.persist(checkpoint)?;

        info!(
            cursor = %cursor,
            next = %next,
            records = count,
            full,
            total_records = checkpoint.record_count(),
            "Page committed"
        );
        Ok(PageOutcome::Advanced {
            records: count,
            next,
            full,
        })
    }

    /// Walk until exhaustion, then write the output document
    pub async fn run(&self) -> Result<PaginationReport, DownloadError> {
        self.config
            .validate()
            .map_err(DownloadError::ValidationError)?;

        let span = info_span!(
            "pagination",
            output = %self.config.output_path.display(),
            page_cap = self.config.page_cap,
        );

        async {
            let metrics = PipelineMetrics::start(PipelineKind::Pagination);
            let result = self.walk().await;
            match &result {
                Ok(report) => metrics.record_success(report.records_written as u64),
                Err(e) => metrics.record_failure(&e.to_string()),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn walk(&self) -> Result<PaginationReport, DownloadError> {
        let mut checkpoint = self.load_or_init()?;
        let mut pages_fetched = 0;

        while let PageOutcome::Advanced { .. } = self.step(&mut checkpoint).await? {
            pages_fetched += 1;
        }

        self.finish(checkpoint, pages_fetched)
    }

    fn persist(&self, checkpoint: &PaginationCheckpoint) -> Result<(), DownloadError> {
        let started = Instant::now();
        self.store.save(CheckpointRef::Pagination(checkpoint))?;
        metrics::record_checkpoint_write(PipelineKind::Pagination, started.elapsed());
        debug!(cursor = %checkpoint.cursor(), "Checkpoint saved");
        Ok(())
    }

    fn finish(
        &self,
        checkpoint: PaginationCheckpoint,
        pages_fetched: usize,
    ) -> Result<PaginationReport, DownloadError> {
        let final_cursor = checkpoint.cursor();
        let pages_total = checkpoint.pages().len();
        let pages = checkpoint.into_pages();

        let (pages, duplicates_removed) = match &self.config.dedup_key {
            Some(key) => dedup_pages(pages, key),
            None => (pages, 0),
        };
        if duplicates_removed > 0 {
            info!(duplicates_removed, "Removed boundary duplicates");
        }

        let records_written = pages.iter().map(Page::len).sum();
        JsonDocumentWriter::new(&self.config.output_path).write(&pages)?;

        Ok(PaginationReport {
            pages_fetched,
            pages_total,
            records_written,
            duplicates_removed,
            final_cursor,
            output_path: self.config.output_path.clone(),
        })
    }
}

fn field<'a>(record: &'a RawRecord, name: &str) -> &'a str {
    record
        .get(name)
        .and_then(serde_json::Value::as_str)
        .unwrap_or("?")
}

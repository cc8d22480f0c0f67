//! Chunked concurrent detail fetch
//!
//! The identifier list is produced once by a [`ListEnumerator`] and persisted
//! before any detail request. After that the run consumes it in fixed-size
//! chunks: every identifier of a chunk is fetched by its own task, all tasks
//! are joined, and only then is the checkpoint touched. One chunk is in
//! flight at a time.

use futures_util::future::join_all;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::downloader::config::BatchConfig;
use crate::downloader::progress::BatchProgress;
use crate::downloader::throttle::Throttle;
use crate::downloader::{BatchReport, DownloadError};
use crate::fetcher::{DetailSource, ListEnumerator};
use crate::metrics::{self, PipelineMetrics};
use crate::output::JsonDocumentWriter;
use crate::resume::{
    BatchCheckpoint, Checkpoint, CheckpointRef, CheckpointStore, PipelineKind, ResumeError,
};
use crate::{DetailResult, FetchFailure, UserId};

/// Outcomes of one chunk, in submission order
#[derive(Debug, Default)]
pub struct ChunkOutcome {
    /// Identifiers whose fetch succeeded
    pub results: Vec<DetailResult>,
    /// Identifiers dropped after a transient failure
    pub failures: Vec<FetchFailure>,
}

/// Resumable batch run over a ranked identifier list
pub struct BatchFetcher {
    detail: Arc<dyn DetailSource>,
    enumerator: Arc<dyn ListEnumerator>,
    store: Arc<dyn CheckpointStore>,
    config: BatchConfig,
    throttle: Throttle,
}

impl BatchFetcher {
    /// Fetcher pacing chunks to `config.floor_interval`
    pub fn new(
        detail: Arc<dyn DetailSource>,
        enumerator: Arc<dyn ListEnumerator>,
        store: Arc<dyn CheckpointStore>,
        config: BatchConfig,
    ) -> Self {
        let throttle = Throttle::new(config.floor_interval);
        Self {
            detail,
            enumerator,
            store,
            config,
            throttle,
        }
    }

    /// Stored checkpoint, or enumerate identifiers and persist a fresh one
    ///
    /// A stored checkpoint wins over the configured rank window.
    pub async fn load_or_init(&self) -> Result<BatchCheckpoint, DownloadError> {
        match self.store.load(PipelineKind::Batch)? {
            Some(Checkpoint::Batch(checkpoint)) => {
                info!(
                    position = checkpoint.position(),
                    identifiers = checkpoint.identifiers().len(),
                    results = checkpoint.results().len(),
                    failures = checkpoint.failures().len(),
                    "Resuming batch run"
                );
                Ok(checkpoint)
            }
            Some(other) => Err(ResumeError::PipelineMismatch {
                expected: PipelineKind::Batch,
                found: other.kind(),
            }
            .into()),
            None => self.enumerate().await,
        }
    }

    async fn enumerate(&self) -> Result<BatchCheckpoint, DownloadError> {
        let page_count = self.config.page_count();
        let mut identifiers = self
            .enumerator
            .enumerate(page_count)
            .await
            .map_err(DownloadError::Enumeration)?;

        if identifiers.len() < self.config.end_rank {
            warn!(
                found = identifiers.len(),
                end_rank = self.config.end_rank,
                "Fewer ranked users than requested"
            );
        }
        identifiers.truncate(self.config.end_rank);

        let start = self.config.start_rank.min(identifiers.len());
        let checkpoint = BatchCheckpoint::new(identifiers, start)?;
        self.persist(&checkpoint)?;

        info!(
            identifiers = checkpoint.identifiers().len(),
            start_position = start,
            "Identifier list persisted"
        );
        Ok(checkpoint)
    }

    /// Fetch every identifier of `chunk` concurrently and join them all
    ///
    /// `base_position` is the index of `chunk[0]` in the identifier list.
    /// Transient failures become [`FetchFailure`]s; a fatal service error
    /// anywhere in the chunk fails the whole chunk.
    pub async fn fetch_chunk(
        &self,
        chunk: &[UserId],
        base_position: usize,
    ) -> Result<ChunkOutcome, DownloadError> {
        let handles: Vec<_> = chunk
            .iter()
            .map(|&user_id| {
                let source = Arc::clone(&self.detail);
                tokio::spawn(async move { source.fetch_detail(user_id).await })
            })
            .collect();

        let joined = join_all(handles).await;

        let mut outcome = ChunkOutcome::default();
        for (offset, (&user_id, joined)) in chunk.iter().zip(joined).enumerate() {
            let position = base_position + offset;
            let error = match joined {
                Ok(Ok(records)) => {
                    outcome.results.push(DetailResult { user_id, records });
                    continue;
                }
                Ok(Err(e)) if e.is_fatal_service_error() => {
                    return Err(DownloadError::FatalService(e));
                }
                Ok(Err(e)) => e.to_string(),
                Err(e) => format!("fetch task failed: {e}"),
            };

            warn!(user_id, position, error = %error, "Dropping user after failed fetch");
            outcome.failures.push(FetchFailure {
                user_id,
                position,
                error,
                failed_at: chrono::Utc::now().timestamp_millis(),
            });
        }

        Ok(outcome)
    }

    /// Fetch every remaining chunk, then write the output document
    pub async fn run(&self) -> Result<BatchReport, DownloadError> {
        self.config
            .validate()
            .map_err(DownloadError::ValidationError)?;

        let span = info_span!(
            "batch",
            mode = %self.config.mode,
            chunk_size = self.config.chunk_size,
            output = %self.config.output_path.display(),
        );

        async {
            let metrics = PipelineMetrics::start(PipelineKind::Batch);
            let result = self.fetch_all().await;
            match &result {
                Ok(report) => metrics.record_success(report.succeeded as u64),
                Err(e) => metrics.record_failure(&e.to_string()),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn fetch_all(&self) -> Result<BatchReport, DownloadError> {
        let mut checkpoint = self.load_or_init().await?;

        let window = checkpoint.identifiers().len() - checkpoint.start_position();
        let mut progress =
            BatchProgress::new(window, checkpoint.position() - checkpoint.start_position());
        let mut chunks_fetched = 0;
        let mut unsaved = false;

        while !checkpoint.is_complete() {
            let position = checkpoint.position();
            let chunk = checkpoint.next_chunk(self.config.chunk_size).to_vec();

            let chunk_start = Instant::now();
            let outcome = self.fetch_chunk(&chunk, position).await?;
            metrics::record_chunk(
                chunk_start.elapsed(),
                outcome.results.len(),
                outcome.failures.len(),
            );
            debug!(
                position,
                chunk = chunk.len(),
                succeeded = outcome.results.len(),
                failed = outcome.failures.len(),
                "Chunk fetched"
            );

            checkpoint.commit_chunk(chunk.len(), outcome.results, outcome.failures)?;
            chunks_fetched += 1;
            unsaved = true;

            if chunks_fetched % self.config.checkpoint_every == 0 {
                self.persist(&checkpoint)?;
                unsaved = false;
            }

            progress.update(checkpoint.position() - checkpoint.start_position());
            if progress.should_emit_update() {
                info!("{}", progress.format_progress());
                progress.mark_emitted();
            }

            if !checkpoint.is_complete() {
                self.throttle.pace(chunk_start, Instant::now()).await;
            }
        }

        if unsaved {
            self.persist(&checkpoint)?;
        }

        JsonDocumentWriter::new(&self.config.output_path).write(checkpoint.results())?;

        Ok(BatchReport {
            chunks_fetched,
            identifiers: window,
            succeeded: checkpoint.results().len(),
            failed: checkpoint.failures().len(),
            output_path: self.config.output_path.clone(),
        })
    }

    fn persist(&self, checkpoint: &BatchCheckpoint) -> Result<(), DownloadError> {
        let started = std::time::Instant::now();
        self.store.save(CheckpointRef::Batch(checkpoint))?;
        metrics::record_checkpoint_write(PipelineKind::Batch, started.elapsed());
        debug!(position = checkpoint.position(), "Checkpoint saved");
        Ok(())
    }
}

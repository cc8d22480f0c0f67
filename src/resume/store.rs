//! Checkpoint store keyed by pipeline

use super::checkpoint::{Checkpoint, CheckpointRef, PipelineKind};
use super::state::{CheckpointFile, ResumeError};
use std::path::PathBuf;
use tracing::{debug, info};

/// Durable home of at most one checkpoint per pipeline
///
/// `load` is the only source of truth for resuming; `save` replaces the
/// stored checkpoint wholesale.
pub trait CheckpointStore: Send + Sync {
    /// Last persisted checkpoint of `pipeline`, `None` when there is none
    fn load(&self, pipeline: PipelineKind) -> Result<Option<Checkpoint>, ResumeError>;

    /// Persist `checkpoint`, replacing the previous one of the same pipeline
    fn save(&self, checkpoint: CheckpointRef<'_>) -> Result<(), ResumeError>;
}

/// Store writing one JSON file per pipeline into a directory
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Store rooted at `dir`; the directory is created on first save
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Checkpoint file of `pipeline`
    pub fn path_for(&self, pipeline: PipelineKind) -> PathBuf {
        self.dir.join(format!("{}_checkpoint.json", pipeline.tag()))
    }

    /// Lock file guarding runs of `pipeline`
    pub fn lock_path_for(&self, pipeline: PipelineKind) -> PathBuf {
        self.dir.join(format!("{}.lock", pipeline.tag()))
    }

    /// Delete the checkpoint of `pipeline` on explicit operator request
    ///
    /// Returns whether a file was removed.
    pub fn reset(&self, pipeline: PipelineKind) -> Result<bool, ResumeError> {
        let path = self.path_for(pipeline);
        if !path.exists() {
            return Ok(false);
        }

        std::fs::remove_file(&path).map_err(|e| {
            ResumeError::IoError(format!("Failed to remove {}: {e}", path.display()))
        })?;
        info!(path = %path.display(), %pipeline, "Checkpoint discarded");
        Ok(true)
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self, pipeline: PipelineKind) -> Result<Option<Checkpoint>, ResumeError> {
        let path = self.path_for(pipeline);
        if !path.exists() {
            debug!(path = %path.display(), "No checkpoint found");
            return Ok(None);
        }

        let checkpoint = CheckpointFile::load(&path)?.into_checkpoint();
        if checkpoint.kind() != pipeline {
            return Err(ResumeError::PipelineMismatch {
                expected: pipeline,
                found: checkpoint.kind(),
            });
        }
        checkpoint.validate()?;

        Ok(Some(checkpoint))
    }

    fn save(&self, checkpoint: CheckpointRef<'_>) -> Result<(), ResumeError> {
        CheckpointFile::save(checkpoint, &self.path_for(checkpoint.kind()))
    }
}

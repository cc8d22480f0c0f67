//! Checkpoint file persistence
//!
//! Checkpoints are wrapped in a versioned envelope and written atomically:
//! serialize to a temp file in the target directory, fsync, rename over the
//! old file, fsync the directory. A reader therefore sees either the previous
//! checkpoint or the new one, never a torn write.

use super::checkpoint::{Checkpoint, CheckpointRef, PipelineKind};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{debug, info, warn};

/// Current checkpoint schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Versioned on-disk form of a checkpoint, as loaded
#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointFile {
    schema_version: String,
    saved_at: i64,
    checkpoint: Checkpoint,
}

/// Write-side envelope; borrows the checkpoint it wraps
#[derive(Serialize)]
struct Envelope<'a> {
    schema_version: &'a str,
    saved_at: i64,
    checkpoint: CheckpointRef<'a>,
}

impl CheckpointFile {
    /// Schema version the file was written with
    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// Unwrap the checkpoint
    pub fn into_checkpoint(self) -> Checkpoint {
        self.checkpoint
    }

    /// Save `checkpoint` to `path` under the current schema version,
    /// atomically replacing any previous file
    pub fn save(checkpoint: CheckpointRef<'_>, path: &Path) -> Result<(), ResumeError> {
        debug!(
            path = %path.display(),
            pipeline = %checkpoint.kind(),
            "Saving checkpoint"
        );

        let envelope = Envelope {
            schema_version: SCHEMA_VERSION,
            saved_at: chrono::Utc::now().timestamp_millis(),
            checkpoint,
        };

        let parent_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent_dir).map_err(|e| ResumeError::IoError(e.to_string()))?;

        let temp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .map_err(|e| ResumeError::IoError(format!("Failed to create temp file: {e}")))?;

        let mut writer = BufWriter::new(temp_file);
        serde_json::to_writer_pretty(&mut writer, &envelope)
            .map_err(|e| ResumeError::SerializationError(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| ResumeError::IoError(format!("Failed to flush temp file: {e}")))?;
        let temp_file = writer
            .into_inner()
            .map_err(|e| ResumeError::IoError(format!("Failed to flush temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| ResumeError::IoError(format!("Failed to sync temp file: {e}")))?;

        temp_file
            .persist(path)
            .map_err(|e| ResumeError::IoError(format!("Failed to persist temp file: {e}")))?;

        // Make the rename itself durable
        if let Ok(dir) = File::open(parent_dir) {
            let _ = dir.sync_all();
        }

        Ok(())
    }

    /// Load from `path`
    ///
    /// Unparseable content and unknown schema versions are reported as
    /// errors; the caller decides whether the operator may discard the file.
    pub fn load(path: &Path) -> Result<Self, ResumeError> {
        debug!(path = %path.display(), "Loading checkpoint");

        let file = File::open(path).map_err(|e| ResumeError::IoError(e.to_string()))?;
        let raw: serde_json::Value = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| {
                warn!(path = %path.display(), error = %e, "Checkpoint is not valid JSON");
                ResumeError::DeserializationError(e.to_string())
            })?;

        let found = raw
            .get("schema_version")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                ResumeError::DeserializationError("missing schema_version".to_string())
            })?;
        if found != SCHEMA_VERSION {
            warn!(
                found_version = %found,
                expected_version = SCHEMA_VERSION,
                "Checkpoint schema version mismatch"
            );
            return Err(ResumeError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION.to_string(),
                found: found.to_string(),
            });
        }

        let file: CheckpointFile = serde_json::from_value(raw).map_err(|e| {
            warn!(path = %path.display(), error = %e, "Failed to deserialize checkpoint");
            ResumeError::DeserializationError(e.to_string())
        })?;

        info!(
            pipeline = %file.checkpoint.kind(),
            saved_at = file.saved_at,
            "Checkpoint loaded"
        );
        Ok(file)
    }
}

/// Errors related to checkpoint persistence
#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    /// Schema version mismatch
    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Expected schema version
        expected: String,
        /// Found schema version
        found: String,
    },

    /// Checkpoint belongs to another pipeline
    #[error("checkpoint belongs to the {found} pipeline, expected {expected}")]
    PipelineMismatch {
        /// Pipeline that asked for the checkpoint
        expected: PipelineKind,
        /// Pipeline recorded in the file
        found: PipelineKind,
    },

    /// Loaded checkpoint breaks a structural invariant
    #[error("invalid checkpoint state: {0}")]
    InvalidState(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Lock error
    #[error("lock error: {0}")]
    LockError(String),
}

impl ResumeError {
    /// Whether the stored file is unusable and only an operator reset recovers
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            ResumeError::SchemaVersionMismatch { .. }
                | ResumeError::PipelineMismatch { .. }
                | ResumeError::InvalidState(_)
                | ResumeError::DeserializationError(_)
        )
    }
}

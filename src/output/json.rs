//! Pretty JSON document writer

use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use super::{OutputError, OutputResult};

const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Writes one JSON document, replacing the target atomically
///
/// The document is serialized into a temp file beside the target and
/// renamed over it, so readers never see a half-written file.
#[derive(Debug, Clone)]
pub struct JsonDocumentWriter {
    path: PathBuf,
}

impl JsonDocumentWriter {
    /// Writer targeting `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Target path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize `document` with two-space indentation
    pub fn write<T: Serialize + ?Sized>(&self, document: &T) -> OutputResult<()> {
        let parent_dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent_dir).map_err(|e| OutputError::IoError(e.to_string()))?;

        let temp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .map_err(|e| OutputError::IoError(format!("Failed to create temp file: {e}")))?;

        let mut writer = BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, temp_file);
        serde_json::to_writer_pretty(&mut writer, document)
            .map_err(|e| OutputError::SerializationError(e.to_string()))?;
        writer
            .write_all(b"\n")
            .map_err(|e| OutputError::IoError(e.to_string()))?;
        let temp_file = writer
            .into_inner()
            .map_err(|e| OutputError::FlushError(e.to_string()))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| OutputError::FlushError(e.to_string()))?;

        temp_file
            .persist(&self.path)
            .map_err(|e| OutputError::IoError(format!("Failed to persist output: {e}")))?;

        if let Ok(dir) = File::open(parent_dir) {
            let _ = dir.sync_all();
        }

        info!(path = %self.path.display(), "Output written");
        Ok(())
    }
}

//! Resume capability for both pipelines
//!
//! Provides the tagged checkpoint schema, an atomic file store and a run lock.

pub mod checkpoint;
pub mod lock;
pub mod state;
pub mod store;

pub use checkpoint::{
    BatchCheckpoint, Checkpoint, CheckpointRef, PaginationCheckpoint, PipelineKind,
};
pub use lock::RunLock;
pub use state::{CheckpointFile, ResumeError, SCHEMA_VERSION};
pub use store::{CheckpointStore, FileCheckpointStore};

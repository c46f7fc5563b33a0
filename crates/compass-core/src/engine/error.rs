use super::config::ConfigError;
use super::solver::SolverError;
use crate::core::io::table::TableError;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("File I/O error for '{path}': {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("Flux range cache {action} failed for '{path}': {message}", path = path.display())]
    Cache {
        action: &'static str,
        path: PathBuf,
        message: String,
    },

    #[error("Conflicting flux ranges for {section} '{id}'")]
    CacheConflict { section: &'static str, id: String },

    #[error("Worker count must be at least 1, got {0}")]
    InvalidWorkerCount(usize),

    #[error("Phase '{phase}' failed: {source}")]
    Solver {
        phase: &'static str,
        #[source]
        source: SolverError,
    },

    #[error("Sample {sample} failed: {source}")]
    Sample {
        sample: usize,
        #[source]
        source: SolverError,
    },

    /// A solver failure reduced to its message so it can cross thread and process
    /// boundaries without carrying solver-internal state.
    #[error("Solver error in sample {sample}: {message}")]
    CrossBoundary { sample: usize, message: String },

    #[error("Sample index {index} is out of range for {count} samples")]
    SampleOutOfRange { index: usize, count: usize },

    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),

    #[error("Failed to submit job '{job}': {message}")]
    Dispatch { job: String, message: String },

    #[error("Failed to serialize {what}: {source}")]
    Serialization {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Initialization failed: {0}")]
    Initialization(String),
}

impl EngineError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

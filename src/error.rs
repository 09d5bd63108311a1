//! Error types for split-ingest
//!
//! The pipeline distinguishes three kinds of failure:
//! - conditions that abandon a job so it can be rediscovered later (a part
//!   vanished, a file is still growing, the part set is incomplete)
//! - conditions that fail a job terminally (extraction retries exhausted)
//! - everything else, which is surfaced to the caller and logged at the top level

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for split-ingest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for split-ingest
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_retries")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Archive pipeline error (stability, completeness, extraction, relocation)
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Folder watching error
    #[error("folder watch error: {0}")]
    FolderWatch(String),

    /// External tool execution failed (could not be spawned, killed by signal, ...)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation not supported (missing binary, ...)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error abandons a job rather than failing it.
    ///
    /// Abandoned jobs leave their parts in `Incoming` and are released so a
    /// later trigger can pick the archive up again. Any I/O failure while the
    /// archive's files are being read (missing, permission revoked, device
    /// error) counts, since the files may be readable again on the next pass.
    pub fn is_abandonment(&self) -> bool {
        match self {
            Error::Pipeline(e) => e.is_abandonment(),
            Error::Io(_) => true,
            _ => false,
        }
    }
}

/// Errors raised while driving one archive through the pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A file disappeared between observations
    #[error("file vanished: {path}")]
    Vanished {
        /// Path that no longer exists
        path: PathBuf,
    },

    /// A file changed size during the settle interval
    #[error("file still being written: {path} ({before} -> {after} bytes)")]
    Unstable {
        /// Path that is still growing or shrinking
        path: PathBuf,
        /// Size at the first reading
        before: u64,
        /// Size at the second reading
        after: u64,
    },

    /// The part set is not a contiguous run starting at 1 with at least two parts
    #[error("archive {base_name} is incomplete (parts found: {sequences:?})")]
    Incomplete {
        /// Archive base name
        base_name: String,
        /// Sequence numbers that were found, in order
        sequences: Vec<u32>,
    },

    /// The tool exited with a fatal status
    #[error("extraction of {archive} exited with status {code:?}")]
    ToolExit {
        /// Archive that was passed to the tool
        archive: PathBuf,
        /// Exit code, `None` if the tool was terminated by a signal
        code: Option<i32>,
    },

    /// The tool reported success but wrote nothing
    #[error("extraction of {archive} produced no files (exit status {exit_code})")]
    NothingExtracted {
        /// Archive that was passed to the tool
        archive: PathBuf,
        /// The non-fatal exit code the tool returned
        exit_code: i32,
    },

    /// Every extraction attempt failed
    #[error("extraction failed for {archive} after {attempts} attempt(s): {reason}")]
    ExtractionFailed {
        /// Archive that could not be extracted
        archive: PathBuf,
        /// Number of attempts made
        attempts: u32,
        /// Error from the last attempt
        reason: String,
    },

    /// Moving a file failed
    #[error("failed to move {source_path} to {dest_path}: {reason}")]
    MoveFailed {
        /// File being moved
        source_path: PathBuf,
        /// Intended destination
        dest_path: PathBuf,
        /// Underlying failure
        reason: String,
    },

    /// Path cannot be used (no file name, not under the expected root, ...)
    #[error("invalid path {path}: {reason}")]
    InvalidPath {
        /// The offending path
        path: PathBuf,
        /// Why the path was rejected
        reason: String,
    },
}

impl PipelineError {
    /// Whether the job should be dropped and left for rediscovery
    pub fn is_abandonment(&self) -> bool {
        matches!(
            self,
            PipelineError::Vanished { .. }
                | PipelineError::Unstable { .. }
                | PipelineError::Incomplete { .. }
        )
    }
}

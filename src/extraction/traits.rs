//! Traits and types for the external decompression tool

use async_trait::async_trait;
use std::path::Path;

/// Exit status reported by the decompression tool
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolExit {
    /// Process exit code, `None` if the process was terminated by a signal
    pub code: Option<i32>,
}

impl ToolExit {
    /// Highest exit code that is still treated as success
    ///
    /// 7-Zip and most archivers use 1 for "warning" (e.g. a locked file was skipped).
    pub const MAX_NON_FATAL: i32 = 1;

    /// Exit status with the given code
    pub fn code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    /// Whether the status is `0` or a warning
    pub fn is_non_fatal(&self) -> bool {
        matches!(self.code, Some(c) if (0..=Self::MAX_NON_FATAL).contains(&c))
    }
}

impl From<std::process::ExitStatus> for ToolExit {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

/// Trait for the external decompression tool
///
/// One call is one attempt: extract `archive` into `output_dir`, overwriting
/// existing files without prompting. Implementations report the exit status;
/// judging whether the attempt produced output is left to the caller.
///
/// # Examples
///
/// ```no_run
/// use split_ingest::extraction::{ArchiveTool, SevenZipCli};
/// use std::path::Path;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let tool = SevenZipCli::from_path().expect("7z not found");
/// let exit = tool
///     .extract(Path::new("Incoming/movie.7z.001"), Path::new("Temp/movie.7z"))
///     .await?;
/// println!("7z exited with {:?}", exit.code);
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait ArchiveTool: Send + Sync {
    /// Run one extraction attempt
    ///
    /// # Errors
    ///
    /// Returns an error if the tool could not be started at all.
    async fn extract(&self, archive: &Path, output_dir: &Path) -> crate::Result<ToolExit>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

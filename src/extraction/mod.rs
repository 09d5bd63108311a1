//! Archive extraction through an external decompression tool
//!
//! An attempt succeeds only when both hold:
//! 1. the tool's exit status is at most 1 (warnings are non-fatal)
//! 2. at least one file exists under the output directory afterwards
//!
//! A "clean" exit that wrote nothing is a failure. The output directory is not
//! reset between attempts of the same job; the tool overwrites on extract.

mod cli;
mod traits;

pub use cli::SevenZipCli;
pub use traits::{ArchiveTool, ToolExit};

use crate::error::{Error, PipelineError, Result};
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;
use tracing::debug;
use walkdir::WalkDir;

/// Run one extraction attempt and judge it
///
/// Returns the number of files present under `output_dir` on success.
///
/// # Errors
///
/// - [`PipelineError::ToolExit`] if the tool exited with a fatal status
/// - [`PipelineError::NothingExtracted`] if it exited cleanly but wrote nothing
/// - whatever the tool returned if it could not be started
pub async fn extract_once(tool: &dyn ArchiveTool, archive: &Path, output_dir: &Path) -> Result<usize> {
    tokio::fs::create_dir_all(output_dir).await?;

    let exit = tool.extract(archive, output_dir).await?;
    let Some(code) = exit.code.filter(|_| exit.is_non_fatal()) else {
        return Err(PipelineError::ToolExit {
            archive: archive.to_path_buf(),
            code: exit.code,
        }
        .into());
    };

    let files = count_files(output_dir).await?;
    debug!(
        ?archive,
        tool = tool.name(),
        exit_code = code,
        files,
        "extraction attempt finished"
    );

    if files == 0 {
        return Err(PipelineError::NothingExtracted {
            archive: archive.to_path_buf(),
            exit_code: code,
        }
        .into());
    }
    Ok(files)
}

/// Count regular files anywhere under `dir`
pub async fn count_files(dir: &Path) -> Result<usize> {
    Ok(list_files(dir).await?.len())
}

/// Snapshot every regular file under `dir`
///
/// The walk completes before the list is returned, so callers can mutate the
/// tree while iterating the result.
pub async fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let dir = dir.to_path_buf();
    spawn_blocking(move || {
        let mut files = Vec::new();
        for entry in WalkDir::new(&dir).follow_links(false) {
            let entry = entry.map_err(|e| {
                Error::Io(std::io::Error::other(format!(
                    "failed to walk {}: {}",
                    dir.display(),
                    e
                )))
            })?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    })
    .await
    .map_err(|e| Error::Other(format!("directory walk task panicked: {}", e)))?
}

//! Relocation of extracted output and source parts
//!
//! On success every file under the job's working directory is moved to
//! `Completed/<base>/<relative path>`, the working directory is removed, and
//! the parts go to `Processed`. On failure the working directory is removed
//! and the parts go to `Failed` unmodified.
//!
//! Moves are best-effort per file: a part that has already disappeared, or a
//! file whose move fails, is skipped without failing the job. Skipped output
//! stays in the working directory, which is then kept instead of removed.

use crate::error::{PipelineError, Result};
use crate::extraction::list_files;
use crate::types::ArchivePart;
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Upper bound on disambiguation attempts when a prefixed name is also taken
const MAX_COLLISION_ATTEMPTS: u32 = 9999;

/// What the success path did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelocationReport {
    /// `Completed/<base>`
    pub destination: PathBuf,
    /// Final locations of relocated files
    pub moved: Vec<PathBuf>,
    /// Files that were renamed because the destination already existed
    pub renamed: usize,
    /// Files that could not be moved
    pub skipped: Vec<PathBuf>,
    /// Parts moved to `Processed`
    pub parts_moved: usize,
}

/// What happened to a job's parts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartsReport {
    /// Final locations of moved parts
    pub moved: Vec<PathBuf>,
    /// Parts that were already gone
    pub missing: usize,
}

/// Moves job output and parts into the terminal directories
#[derive(Debug, Clone)]
pub struct Relocator {
    completed_dir: PathBuf,
    processed_dir: PathBuf,
    failed_dir: PathBuf,
}

impl Relocator {
    /// Create a relocator for the given terminal directories
    pub fn new(completed_dir: PathBuf, processed_dir: PathBuf, failed_dir: PathBuf) -> Self {
        Self {
            completed_dir,
            processed_dir,
            failed_dir,
        }
    }

    /// Relocate a successful job
    ///
    /// The working directory is snapshotted before anything moves.
    ///
    /// # Errors
    ///
    /// Only fails if the snapshot cannot be taken or `Completed/<base>` cannot
    /// be created. Individual move failures are recorded in the report.
    pub async fn relocate_success(
        &self,
        base_name: &str,
        work_dir: &Path,
        parts: &[ArchivePart],
    ) -> Result<RelocationReport> {
        let snapshot = list_files(work_dir).await?;
        let destination = self.completed_dir.join(base_name);
        tokio::fs::create_dir_all(&destination).await?;

        let mut report = RelocationReport {
            destination: destination.clone(),
            ..Default::default()
        };

        for file in snapshot {
            let Ok(relative) = file.strip_prefix(work_dir) else {
                report.skipped.push(file);
                continue;
            };
            match relocate_one(&file, &destination.join(relative)).await {
                Ok((final_path, was_renamed)) => {
                    if was_renamed {
                        report.renamed += 1;
                    }
                    report.moved.push(final_path);
                }
                Err(e) => {
                    debug!(base_name, ?file, error = %e, "skipping file that could not be moved");
                    report.skipped.push(file);
                }
            }
        }

        if report.skipped.is_empty() {
            remove_work_dir(work_dir).await;
        } else {
            warn!(
                base_name,
                skipped = report.skipped.len(),
                work_dir = %work_dir.display(),
                "{} extracted file(s) could not be relocated, keeping working directory",
                report.skipped.len()
            );
        }
        report.parts_moved = move_parts(parts, &self.processed_dir).await.moved.len();

        debug!(
            base_name,
            files = report.moved.len(),
            renamed = report.renamed,
            parts = report.parts_moved,
            destination = %destination.display(),
            "relocated extracted files"
        );
        Ok(report)
    }

    /// Relocate a failed job: discard partial output, park the parts in `Failed`
    pub async fn relocate_failure(&self, work_dir: &Path, parts: &[ArchivePart]) -> PartsReport {
        remove_work_dir(work_dir).await;
        move_parts(parts, &self.failed_dir).await
    }
}

/// Move one file to `destination`, creating parents and avoiding overwrites
///
/// Returns the final path and whether it had to be renamed.
async fn relocate_one(source: &Path, destination: &Path) -> Result<(PathBuf, bool)> {
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let final_path = collision_free_path(destination)?;
    move_file(source, &final_path).await?;
    let renamed = final_path != destination;
    Ok((final_path, renamed))
}

/// Move every part into `target_dir`, skipping parts that are already gone
async fn move_parts(parts: &[ArchivePart], target_dir: &Path) -> PartsReport {
    let mut report = PartsReport::default();

    if let Err(e) = tokio::fs::create_dir_all(target_dir).await {
        warn!(?target_dir, error = %e, "failed to create part directory");
    }

    for part in parts {
        if tokio::fs::metadata(&part.path).await.is_err() {
            debug!(path = ?part.path, "part already gone, skipping");
            report.missing += 1;
            continue;
        }
        let Some(name) = part.path.file_name() else {
            continue;
        };
        match relocate_one(&part.path, &target_dir.join(name)).await {
            Ok((final_path, _)) => report.moved.push(final_path),
            Err(e) => {
                debug!(path = ?part.path, error = %e, "skipping part that could not be moved");
            }
        }
    }
    report
}

async fn remove_work_dir(work_dir: &Path) {
    match tokio::fs::remove_dir_all(work_dir).await {
        Ok(()) => debug!(?work_dir, "removed working directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(?work_dir, error = %e, "failed to remove working directory"),
    }
}

/// Return `path` if it is free, otherwise the same name prefixed with a timestamp
///
/// `report.txt` becomes `20240501-142233-117_report.txt`. If that name is
/// taken too, a counter is appended to the prefix.
pub fn collision_free_path(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Ok(path.to_path_buf());
    }

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| PipelineError::InvalidPath {
            path: path.to_path_buf(),
            reason: "cannot extract file name".to_string(),
        })?;
    let parent = path.parent().ok_or_else(|| PipelineError::InvalidPath {
        path: path.to_path_buf(),
        reason: "cannot extract parent directory".to_string(),
    })?;

    let stamp = Local::now().format("%Y%m%d-%H%M%S-%3f").to_string();
    let candidate = parent.join(format!("{stamp}_{name}"));
    if !candidate.exists() {
        return Ok(candidate);
    }

    for i in 1..=MAX_COLLISION_ATTEMPTS {
        let candidate = parent.join(format!("{stamp}-{i}_{name}"));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(PipelineError::InvalidPath {
        path: path.to_path_buf(),
        reason: format!("no free name after {MAX_COLLISION_ATTEMPTS} attempts"),
    }
    .into())
}

/// Rename `source` to `destination`, copying across filesystems if needed
pub async fn move_file(source: &Path, destination: &Path) -> Result<()> {
    match tokio::fs::rename(source, destination).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
            tokio::fs::copy(source, destination)
                .await
                .map_err(|e| move_failed(source, destination, e))?;
            tokio::fs::remove_file(source)
                .await
                .map_err(|e| move_failed(source, destination, e))?;
            Ok(())
        }
        Err(e) => Err(move_failed(source, destination, e)),
    }
}

fn move_failed(source: &Path, destination: &Path, e: std::io::Error) -> crate::Error {
    PipelineError::MoveFailed {
        source_path: source.to_path_buf(),
        dest_path: destination.to_path_buf(),
        reason: e.to_string(),
    }
    .into()
}

//! Part-set resolution and completeness validation
//!
//! Given a first part, every sibling file in the same directory whose name
//! parses as `<base>.<NNN>` with the same base belongs to the archive. A set is
//! complete only when it has at least two parts and the part at index `i`
//! carries sequence `i + 1`. Sets are never repaired or re-sorted after the
//! initial ordering; an incomplete set leaves the archive for a later trigger.

use crate::error::{PipelineError, Result};
use crate::naming::{first_part_base, parse_part_name};
use crate::types::ArchivePart;
use std::path::Path;
use tracing::debug;

/// Minimum number of parts for a set to qualify
///
/// A single `.001` file is treated as incomplete and waits for siblings.
pub const MIN_PARTS: usize = 2;

/// Enumerate all parts that share the first part's base name, ordered by sequence
///
/// # Errors
///
/// Returns [`PipelineError::Vanished`] if the first part or its directory
/// disappeared, [`PipelineError::InvalidPath`] if `first_part` is not a
/// `.001` file, and [`Error::Io`](crate::Error::Io) if the directory cannot be
/// read.
pub async fn resolve_parts(first_part: &Path) -> Result<Vec<ArchivePart>> {
    let base = first_part_base(first_part).ok_or_else(|| PipelineError::InvalidPath {
        path: first_part.to_path_buf(),
        reason: "not a first part (<base>.001)".to_string(),
    })?;
    let dir = first_part.parent().ok_or_else(|| PipelineError::InvalidPath {
        path: first_part.to_path_buf(),
        reason: "no parent directory".to_string(),
    })?;

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(PipelineError::Vanished {
                path: dir.to_path_buf(),
            }
            .into());
        }
        Err(e) => return Err(e.into()),
    };

    let mut parts = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        let Some(parsed) = parse_part_name(name) else {
            continue;
        };
        if parsed.base != base {
            continue;
        }

        // Entries can disappear between listing and stat; those simply aren't part of the set.
        let meta = match entry.metadata().await {
            Ok(meta) if meta.is_file() => meta,
            _ => continue,
        };

        parts.push(ArchivePart {
            path: entry.path(),
            sequence: parsed.sequence,
            size: meta.len(),
        });
    }

    if !parts.iter().any(|p| p.sequence == 1) {
        return Err(PipelineError::Vanished {
            path: first_part.to_path_buf(),
        }
        .into());
    }

    parts.sort_by_key(|p| p.sequence);
    debug!(
        base_name = %base,
        count = parts.len(),
        "resolved {} part(s)",
        parts.len()
    );
    Ok(parts)
}

/// Whether `parts` is a contiguous run `1..=n` with `n >= 2`, in order
///
/// A gap, a duplicate or an out-of-order sequence at any position invalidates
/// the whole set.
pub fn parts_complete(parts: &[ArchivePart]) -> bool {
    parts.len() >= MIN_PARTS
        && parts
            .iter()
            .enumerate()
            .all(|(i, part)| part.sequence as usize == i + 1)
}

/// Like [`parts_complete`] but reports the failure as a pipeline error
pub fn ensure_complete(base_name: &str, parts: &[ArchivePart]) -> Result<()> {
    if parts_complete(parts) {
        return Ok(());
    }
    Err(PipelineError::Incomplete {
        base_name: base_name.to_string(),
        sequences: parts.iter().map(|p| p.sequence).collect(),
    }
    .into())
}

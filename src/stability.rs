//! File-stability detection
//!
//! Copy tools usually create the destination file before they finish writing
//! it and give no completion signal. The gate reads the size, waits a settle
//! interval, and reads it again; equal readings of an existing file count as
//! stable. The verdict is provisional: callers still have to cope with the
//! file disappearing afterwards.

use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Outcome of a stability check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StabilityVerdict {
    /// Size unchanged across the settle interval
    Stable {
        /// The observed size in bytes
        size: u64,
    },
    /// Size changed across the settle interval
    Changed {
        /// First reading
        before: u64,
        /// Second reading
        after: u64,
    },
    /// File missing at either reading
    Vanished,
}

/// Decides whether a file has finished being written
#[derive(Clone, Copy, Debug)]
pub struct StabilityGate {
    settle: Duration,
}

impl StabilityGate {
    /// Create a gate that waits `settle` between the two readings
    pub fn new(settle: Duration) -> Self {
        Self { settle }
    }

    /// Read the size twice, `settle` apart, and compare
    ///
    /// Any failure to read metadata (missing file, permission revoked, ...) is
    /// reported as [`StabilityVerdict::Vanished`].
    pub async fn check(&self, path: &Path) -> StabilityVerdict {
        let Some(before) = file_size(path).await else {
            debug!(?path, "file missing before settle interval");
            return StabilityVerdict::Vanished;
        };

        tokio::time::sleep(self.settle).await;

        let Some(after) = file_size(path).await else {
            debug!(?path, "file vanished during settle interval");
            return StabilityVerdict::Vanished;
        };

        if before == after {
            StabilityVerdict::Stable { size: after }
        } else {
            debug!(?path, before, after, "file size changed during settle interval");
            StabilityVerdict::Changed { before, after }
        }
    }
}

async fn file_size(path: &Path) -> Option<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Some(meta.len()),
        _ => None,
    }
}

//! Core types for split-ingest

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Which trigger source observed a first part
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Filesystem change notification
    Notify,
    /// Periodic reconciliation sweep
    Sweep,
    /// Explicit request (CLI, tests)
    Manual,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Trigger::Notify => "notify",
            Trigger::Sweep => "sweep",
            Trigger::Manual => "manual",
        };
        f.write_str(name)
    }
}

/// Lifecycle of one job instance
///
/// Transitions are strictly forward and each state may only advance to its
/// immediate successor. There is no transition out of a terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    /// First part observed, claim held
    Discovered,
    /// Waiting for the first part to stop growing
    Stabilizing,
    /// Enumerating and validating sibling parts
    PartsPending,
    /// Running the decompression tool
    Extracting,
    /// Output relocated to `Completed`, parts to `Processed`
    Succeeded,
    /// Parts relocated to `Failed`
    Failed,
}

impl ProcessingState {
    /// Whether the job has finished
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessingState::Succeeded | ProcessingState::Failed)
    }

    /// Whether `next` is a legal successor of `self`
    pub fn can_advance_to(self, next: ProcessingState) -> bool {
        use ProcessingState::*;
        matches!(
            (self, next),
            (Discovered, Stabilizing)
                | (Stabilizing, PartsPending)
                | (PartsPending, Extracting)
                | (Extracting, Succeeded)
                | (Extracting, Failed)
        )
    }
}

impl std::fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProcessingState::Discovered => "discovered",
            ProcessingState::Stabilizing => "stabilizing",
            ProcessingState::PartsPending => "parts_pending",
            ProcessingState::Extracting => "extracting",
            ProcessingState::Succeeded => "succeeded",
            ProcessingState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One numbered fragment of a split archive
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivePart {
    /// Location of the part
    pub path: PathBuf,
    /// Sequence number parsed from the 3-digit suffix (1-based)
    pub sequence: u32,
    /// Size in bytes at enumeration time
    pub size: u64,
}

/// One logical multi-part archive being processed
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveJob {
    /// Base name (first-part file name minus its numeric suffix)
    pub base_name: String,
    /// Path of the `.001` part
    pub first_part: PathBuf,
    /// When the first part was observed
    pub discovered_at: DateTime<Utc>,
    /// Trigger source that won the claim
    pub trigger: Trigger,
    state: ProcessingState,
}

impl ArchiveJob {
    /// Create a job in the `Discovered` state
    pub fn new(base_name: impl Into<String>, first_part: impl Into<PathBuf>, trigger: Trigger) -> Self {
        Self {
            base_name: base_name.into(),
            first_part: first_part.into(),
            discovered_at: Utc::now(),
            trigger,
            state: ProcessingState::Discovered,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ProcessingState {
        self.state
    }

    /// Move the job to `next`, rejecting anything but the immediate successor
    pub fn advance(&mut self, next: ProcessingState) -> Result<()> {
        if self.state.is_terminal() {
            return Err(Error::Other(format!(
                "job for {} already ended as {}",
                self.base_name, self.state
            )));
        }
        if !self.state.can_advance_to(next) {
            return Err(Error::Other(format!(
                "illegal transition for {}: {} -> {}",
                self.base_name, self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }
}

/// How a claimed job ended
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    /// Extracted and relocated
    Succeeded {
        /// `Completed/<base>` directory
        destination: PathBuf,
        /// Number of files relocated
        files: usize,
    },
    /// Extraction retries exhausted, parts moved to `Failed`
    Failed {
        /// Last error
        error: String,
    },
    /// Dropped before extraction; parts left in place for rediscovery
    Abandoned {
        /// State the job was in when it was dropped
        at: ProcessingState,
        /// Why it was dropped
        reason: String,
    },
}

/// Events emitted while jobs move through the pipeline
///
/// Every meaningful transition produces exactly one event, in the same order
/// as the corresponding log lines.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A first part was claimed
    Discovered {
        /// Archive base name
        base_name: String,
        /// Trigger that won the claim
        trigger: Trigger,
    },

    /// A trigger arrived while the archive was already in flight
    Dropped {
        /// Archive base name
        base_name: String,
        /// Trigger that lost
        trigger: Trigger,
    },

    /// The first part is still being written or vanished
    StabilityFailed {
        /// Archive base name
        base_name: String,
        /// Human-readable reason
        reason: String,
    },

    /// A part disappeared while the archive was being examined
    Vanished {
        /// Archive base name
        base_name: String,
        /// The missing path
        path: PathBuf,
    },

    /// The part set failed validation
    Incomplete {
        /// Archive base name
        base_name: String,
        /// Sequence numbers found
        sequences: Vec<u32>,
    },

    /// An extraction attempt is starting
    Extracting {
        /// Archive base name
        base_name: String,
        /// 1-based attempt number
        attempt: u32,
        /// Configured maximum
        max_attempts: u32,
    },

    /// An attempt failed and another one will follow
    RetryScheduled {
        /// Archive base name
        base_name: String,
        /// Attempt that failed
        attempt: u32,
        /// Error from that attempt
        error: String,
    },

    /// Archive extracted and relocated
    Succeeded {
        /// Archive base name
        base_name: String,
        /// `Completed/<base>` directory
        destination: PathBuf,
        /// Number of files relocated
        files: usize,
    },

    /// Archive could not be extracted; parts moved to `Failed`
    Failed {
        /// Archive base name
        base_name: String,
        /// Last error
        error: String,
    },
}

impl Event {
    /// Base name the event refers to
    pub fn base_name(&self) -> &str {
        match self {
            Event::Discovered { base_name, .. }
            | Event::Dropped { base_name, .. }
            | Event::StabilityFailed { base_name, .. }
            | Event::Vanished { base_name, .. }
            | Event::Incomplete { base_name, .. }
            | Event::Extracting { base_name, .. }
            | Event::RetryScheduled { base_name, .. }
            | Event::Succeeded { base_name, .. }
            | Event::Failed { base_name, .. } => base_name,
        }
    }
}

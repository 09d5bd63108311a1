//! Periodic reconciliation sweep over `Incoming`
//!
//! The sweep is the safety net for lost notifications and for archives that
//! were abandoned earlier (still growing, parts missing). It lists first parts
//! whose modification time is older than a minimum age and submits them to the
//! [`Dispatcher`]; the claim table keeps it from racing the watcher.

use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::naming::is_first_part;
use crate::types::{JobOutcome, Trigger};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// List first parts in `dir` last modified at least `min_age` ago
///
/// Entries that disappear or cannot be inspected mid-scan are skipped. The
/// result is sorted so repeated scans submit in a stable order.
pub async fn scan_first_parts(dir: &Path, min_age: Duration) -> Result<Vec<PathBuf>> {
    let now = SystemTime::now();
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut found = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !is_first_part(&path) {
            continue;
        }
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        // A modification time in the future counts as brand new
        let old_enough = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .is_some_and(|age| age >= min_age);
        if old_enough {
            found.push(path);
        } else {
            debug!(path = %path.display(), "first part too recent for sweep");
        }
    }

    found.sort();
    Ok(found)
}

/// Interval-driven rescan of `Incoming`
pub struct ReconciliationSweep {
    dispatcher: Dispatcher,
    incoming: PathBuf,
    interval: Duration,
    min_age: Duration,
}

impl ReconciliationSweep {
    /// Build a sweep from the dispatcher's configuration
    pub fn new(dispatcher: Dispatcher) -> Self {
        let config = dispatcher.config();
        Self {
            incoming: config.incoming_dir(),
            interval: config.poll_interval,
            min_age: config.sweep_min_age,
            dispatcher,
        }
    }

    /// Scan once and submit every eligible first part
    ///
    /// Returns handles for the jobs that won their claim; archives already in
    /// flight are dropped by the dispatcher.
    pub async fn sweep_once(&self) -> Result<Vec<JoinHandle<Result<JobOutcome>>>> {
        let candidates = scan_first_parts(&self.incoming, self.min_age).await?;
        let found = candidates.len();
        let handles: Vec<_> = candidates
            .into_iter()
            .filter_map(|path| self.dispatcher.submit(path, Trigger::Sweep))
            .collect();

        if found > 0 {
            debug!(found, submitted = handles.len(), "sweep finished");
        }
        Ok(handles)
    }

    /// Sweep immediately, then on every interval tick until `cancel` fires
    ///
    /// A failed sweep is logged and the next tick runs as usual.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            min_age_secs = self.min_age.as_secs(),
            "Reconciliation sweep started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        error!(error = %e, dir = %self.incoming.display(), "sweep failed");
                    }
                }
            }
        }

        info!("Reconciliation sweep stopped");
    }
}

//! Job dispatch and per-archive processing
//!
//! Both trigger sources hand candidate first parts to a [`Dispatcher`]. The
//! dispatcher derives the base name, tries to claim it in the [`ClaimTable`],
//! and drops the trigger if another job already holds it. The winning job runs
//! the archive through the pipeline:
//!
//! ```text
//! Discovered -> Stabilizing -> PartsPending -> Extracting -> Succeeded
//!                                                        \-> Failed
//! ```
//!
//! Stability failures, vanished files and incomplete part sets abandon the job
//! without touching the parts, so a later trigger can pick the archive up
//! again. The claim is released when the job ends, however it ends.

use crate::config::Config;
use crate::error::{Error, PipelineError, Result};
use crate::extraction::{ArchiveTool, extract_once};
use crate::naming::first_part_base;
use crate::parts::{ensure_complete, resolve_parts};
use crate::relocate::Relocator;
use crate::retry::{IsRetryable, RetryPolicy, retry_fixed};
use crate::stability::{StabilityGate, StabilityVerdict};
use crate::types::{ArchiveJob, ArchivePart, Event, JobOutcome, ProcessingState, Trigger};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Poll interval while waiting for in-flight jobs
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Set of base names currently being processed
///
/// Claiming is a single check-and-insert under one lock, so two triggers racing
/// on the same base name can never both win.
#[derive(Clone, Debug, Default)]
pub struct ClaimTable {
    claimed: Arc<Mutex<HashSet<String>>>,
}

impl ClaimTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `base_name`, or return `None` if it is already in flight
    ///
    /// The claim is held until the returned guard is dropped.
    pub fn try_claim(&self, base_name: &str) -> Option<ClaimGuard> {
        if !self.lock().insert(base_name.to_string()) {
            return None;
        }
        Some(ClaimGuard {
            base_name: base_name.to_string(),
            table: self.clone(),
        })
    }

    /// Whether `base_name` is currently claimed
    pub fn is_claimed(&self, base_name: &str) -> bool {
        self.lock().contains(base_name)
    }

    /// Number of claims currently held
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no claims are held
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn release(&self, base_name: &str) {
        self.lock().remove(base_name);
    }

    // Every critical section is a single insert, remove or lookup, so a
    // poisoned lock still guards a consistent set.
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.claimed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive hold on one base name; released on drop
#[derive(Debug)]
pub struct ClaimGuard {
    base_name: String,
    table: ClaimTable,
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        self.table.release(&self.base_name);
    }
}

/// Routes trigger observations into claimed, processed jobs
#[derive(Clone)]
pub struct Dispatcher {
    config: Arc<Config>,
    tool: Arc<dyn ArchiveTool>,
    claims: ClaimTable,
    gate: StabilityGate,
    retry: RetryPolicy,
    relocator: Relocator,
    event_tx: broadcast::Sender<Event>,
}

impl Dispatcher {
    /// Create a dispatcher using `tool` for extraction
    pub fn new(config: Arc<Config>, tool: Arc<dyn ArchiveTool>) -> Self {
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            gate: StabilityGate::new(config.stability_wait),
            retry: RetryPolicy::from(config.as_ref()),
            relocator: Relocator::new(
                config.completed_dir(),
                config.processed_dir(),
                config.failed_dir(),
            ),
            claims: ClaimTable::new(),
            config,
            tool,
            event_tx,
        }
    }

    /// Subscribe to pipeline events
    ///
    /// Multiple subscribers are supported. A subscriber that falls more than
    /// the channel capacity behind receives `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The claim table shared by all jobs
    pub fn claims(&self) -> &ClaimTable {
        &self.claims
    }

    /// The active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of claimed jobs that have not finished yet
    pub fn in_flight(&self) -> usize {
        self.claims.len()
    }

    /// Claim the archive behind `first_part` and process it on a new task
    ///
    /// Returns `None` when the path is not a first part or the archive is
    /// already claimed. The returned handle resolves once the job has ended
    /// and its claim has been released.
    pub fn submit(&self, first_part: PathBuf, trigger: Trigger) -> Option<JoinHandle<Result<JobOutcome>>> {
        let (job, guard) = self.claim(&first_part, trigger)?;
        let dispatcher = self.clone();
        Some(tokio::spawn(async move {
            let base_name = job.base_name.clone();
            let result = dispatcher.run(job, guard).await;
            if let Err(e) = &result {
                error!(base_name = %base_name, error = %e, "unhandled error while processing archive");
            }
            result
        }))
    }

    /// Claim and process the archive behind `first_part` on the current task
    ///
    /// Returns `None` under the same conditions as [`Dispatcher::submit`].
    pub async fn process(&self, first_part: &Path, trigger: Trigger) -> Option<Result<JobOutcome>> {
        let (job, guard) = self.claim(first_part, trigger)?;
        Some(self.run(job, guard).await)
    }

    /// Wait until no job holds a claim
    pub async fn wait_idle(&self) {
        loop {
            let in_flight = self.in_flight();
            if in_flight == 0 {
                return;
            }
            debug!(in_flight, "Waiting for in-flight jobs to finish");
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
    }

    fn claim(&self, first_part: &Path, trigger: Trigger) -> Option<(ArchiveJob, ClaimGuard)> {
        let Some(base_name) = first_part_base(first_part) else {
            debug!(path = ?first_part, %trigger, "ignoring path that is not a first part");
            return None;
        };

        let Some(guard) = self.claims.try_claim(&base_name) else {
            debug!(base_name = %base_name, %trigger, "archive already in flight, dropping trigger");
            self.emit_event(Event::Dropped { base_name, trigger });
            return None;
        };

        Some((ArchiveJob::new(base_name, first_part, trigger), guard))
    }

    /// Drive one claimed job to an outcome
    ///
    /// The guard is held for the whole run and released on return.
    async fn run(&self, mut job: ArchiveJob, _guard: ClaimGuard) -> Result<JobOutcome> {
        let base_name = job.base_name.clone();

        info!(
            base_name = %base_name,
            trigger = %job.trigger,
            path = %job.first_part.display(),
            "discovered archive"
        );
        self.emit_event(Event::Discovered {
            base_name: base_name.clone(),
            trigger: job.trigger,
        });

        job.advance(ProcessingState::Stabilizing)?;
        if let Some(outcome) = self.stabilize(&job).await {
            return Ok(outcome);
        }

        job.advance(ProcessingState::PartsPending)?;
        let parts = match self.collect_parts(&job).await? {
            Ok(parts) => parts,
            Err(outcome) => return Ok(outcome),
        };

        job.advance(ProcessingState::Extracting)?;
        let work_dir = self.config.temp_dir().join(&base_name);
        clear_stale_work_dir(&work_dir).await?;

        match self.extract(&job, &work_dir).await {
            Ok(_) => match self.relocator.relocate_success(&base_name, &work_dir, &parts).await {
                Ok(report) => {
                    job.advance(ProcessingState::Succeeded)?;
                    info!(
                        base_name = %base_name,
                        outcome = "success",
                        files = report.moved.len(),
                        destination = %report.destination.display(),
                        "archive extracted"
                    );
                    self.emit_event(Event::Succeeded {
                        base_name,
                        destination: report.destination.clone(),
                        files: report.moved.len(),
                    });
                    Ok(JobOutcome::Succeeded {
                        destination: report.destination,
                        files: report.moved.len(),
                    })
                }
                Err(e) => self.fail(&mut job, &work_dir, &parts, e).await,
            },
            Err(e) => self.fail(&mut job, &work_dir, &parts, e).await,
        }
    }

    /// Returns an outcome if the job must be abandoned
    async fn stabilize(&self, job: &ArchiveJob) -> Option<JobOutcome> {
        let reason = match self.gate.check(&job.first_part).await {
            StabilityVerdict::Stable { size } => {
                debug!(base_name = %job.base_name, size, "first part is stable");
                return None;
            }
            StabilityVerdict::Changed { before, after } => PipelineError::Unstable {
                path: job.first_part.clone(),
                before,
                after,
            }
            .to_string(),
            StabilityVerdict::Vanished => PipelineError::Vanished {
                path: job.first_part.clone(),
            }
            .to_string(),
        };

        info!(base_name = %job.base_name, reason = %reason, "first part not stable, leaving for rediscovery");
        self.emit_event(Event::StabilityFailed {
            base_name: job.base_name.clone(),
            reason: reason.clone(),
        });
        Some(JobOutcome::Abandoned {
            at: job.state(),
            reason,
        })
    }

    /// Resolve and validate the part set
    ///
    /// The inner `Err` carries the outcome of an abandoned job; the outer one
    /// is an unexpected failure.
    async fn collect_parts(
        &self,
        job: &ArchiveJob,
    ) -> Result<std::result::Result<Vec<ArchivePart>, JobOutcome>> {
        let listed = resolve_parts(&job.first_part).await;
        self.check_parts(job, listed)
    }

    fn check_parts(
        &self,
        job: &ArchiveJob,
        listed: Result<Vec<ArchivePart>>,
    ) -> Result<std::result::Result<Vec<ArchivePart>, JobOutcome>> {
        let parts = match listed {
            Ok(parts) => parts,
            Err(e) if e.is_abandonment() => {
                let path = match &e {
                    Error::Pipeline(PipelineError::Vanished { path }) => path.clone(),
                    _ => job.first_part.clone(),
                };
                info!(
                    base_name = %job.base_name,
                    path = %path.display(),
                    reason = %e,
                    "parts could not be listed, leaving for rediscovery"
                );
                self.emit_event(Event::Vanished {
                    base_name: job.base_name.clone(),
                    path,
                });
                return Ok(Err(JobOutcome::Abandoned {
                    at: job.state(),
                    reason: e.to_string(),
                }));
            }
            Err(e) => return Err(e),
        };

        if let Err(e) = ensure_complete(&job.base_name, &parts) {
            let sequences: Vec<u32> = parts.iter().map(|p| p.sequence).collect();
            warn!(
                base_name = %job.base_name,
                parts = ?sequences,
                "archive is incomplete, leaving for rediscovery"
            );
            self.emit_event(Event::Incomplete {
                base_name: job.base_name.clone(),
                sequences,
            });
            return Ok(Err(JobOutcome::Abandoned {
                at: job.state(),
                reason: e.to_string(),
            }));
        }

        debug!(base_name = %job.base_name, parts = parts.len(), "part set complete");
        Ok(Ok(parts))
    }

    /// Run extraction attempts until one succeeds or the policy is exhausted
    async fn extract(&self, job: &ArchiveJob, work_dir: &Path) -> Result<usize> {
        let tool = self.tool.as_ref();
        let archive = job.first_part.as_path();
        let base_name = job.base_name.as_str();
        let max_attempts = self.retry.max_attempts;

        let result = retry_fixed(&self.retry, |attempt| async move {
            if attempt == 1 {
                info!(base_name, max_attempts, tool = tool.name(), "extracting archive");
            } else {
                debug!(base_name, attempt, max_attempts, "starting extraction attempt");
            }
            self.emit_event(Event::Extracting {
                base_name: base_name.to_string(),
                attempt,
                max_attempts,
            });

            let result = extract_once(tool, archive, work_dir).await;
            if let Err(e) = &result {
                if e.is_retryable() && attempt < max_attempts {
                    self.emit_event(Event::RetryScheduled {
                        base_name: base_name.to_string(),
                        attempt,
                        error: e.to_string(),
                    });
                }
            }
            result
        })
        .await;

        result.map_err(|exhausted| {
            PipelineError::ExtractionFailed {
                archive: archive.to_path_buf(),
                attempts: exhausted.attempts,
                reason: exhausted.error.to_string(),
            }
            .into()
        })
    }

    async fn fail(
        &self,
        job: &mut ArchiveJob,
        work_dir: &Path,
        parts: &[ArchivePart],
        cause: Error,
    ) -> Result<JobOutcome> {
        job.advance(ProcessingState::Failed)?;
        let report = self.relocator.relocate_failure(work_dir, parts).await;
        error!(
            base_name = %job.base_name,
            error = %cause,
            parts_moved = report.moved.len(),
            parts_missing = report.missing,
            "archive could not be extracted, parts moved to failed"
        );
        self.emit_event(Event::Failed {
            base_name: job.base_name.clone(),
            error: cause.to_string(),
        });
        Ok(JobOutcome::Failed {
            error: cause.to_string(),
        })
    }

    /// Send an event to subscribers
    ///
    /// Having no subscribers is not an error.
    fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}

/// Remove whatever an earlier, interrupted job left in the working directory
async fn clear_stale_work_dir(work_dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(work_dir).await {
        Ok(()) => {
            warn!(path = %work_dir.display(), "removed stale working directory");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io(std::io::Error::new(
            e.kind(),
            format!("failed to clear working directory {}: {}", work_dir.display(), e),
        ))),
    }
}

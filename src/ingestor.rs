//! Service assembly: directory bootstrap, triggers, shutdown

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result};
use crate::extraction::{ArchiveTool, SevenZipCli};
use crate::folder_watcher::FolderWatcher;
use crate::sweep::ReconciliationSweep;
use crate::types::{Event, JobOutcome};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long shutdown waits for in-flight jobs
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// The ingestion service
///
/// Owns the [`Dispatcher`] and the two trigger sources feeding it. Call
/// [`Ingestor::start`] to begin watching and sweeping, or
/// [`Ingestor::run_once`] for a single reconciliation pass.
pub struct Ingestor {
    config: Arc<Config>,
    dispatcher: Dispatcher,
    cancel: CancellationToken,
    services: Mutex<Vec<JoinHandle<()>>>,
}

impl Ingestor {
    /// Validate `config`, create the directory layout and locate the
    /// decompression tool
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration, if a directory cannot be created, or if
    /// no 7-Zip binary can be found.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let tool = SevenZipCli::discover(&config.tool)?;
        tracing::info!(binary = %tool.binary_path().display(), "using 7-Zip binary");
        Self::assemble(config, Arc::new(tool)).await
    }

    /// Like [`Ingestor::new`] but with an explicit extraction tool
    pub async fn with_tool(config: Config, tool: Arc<dyn ArchiveTool>) -> Result<Self> {
        config.validate()?;
        Self::assemble(config, tool).await
    }

    async fn assemble(config: Config, tool: Arc<dyn ArchiveTool>) -> Result<Self> {
        bootstrap_directories(&config).await?;

        let config = Arc::new(config);
        Ok(Self {
            dispatcher: Dispatcher::new(config.clone(), tool),
            config,
            cancel: CancellationToken::new(),
            services: Mutex::new(Vec::new()),
        })
    }

    /// Subscribe to pipeline events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.dispatcher.subscribe()
    }

    /// The dispatcher shared by both triggers
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// The active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Start the change watcher and the reconciliation sweep
    ///
    /// The sweep runs once immediately, so archives that arrived while the
    /// service was down are picked up at startup.
    ///
    /// # Errors
    ///
    /// Fails if `Incoming` cannot be watched.
    pub fn start(&self) -> Result<()> {
        let watcher = self.start_folder_watcher()?;
        let sweep = self.start_sweep();
        self.services
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([watcher, sweep]);

        tracing::info!(
            base_path = %self.config.base_path.display(),
            "ingestion service started"
        );
        Ok(())
    }

    /// Start watching `Incoming` for new first parts
    ///
    /// The task stops when the ingestor shuts down.
    pub fn start_folder_watcher(&self) -> Result<JoinHandle<()>> {
        let mut watcher = FolderWatcher::new(self.dispatcher.clone(), self.config.incoming_dir())?;
        watcher.start()?;
        Ok(tokio::spawn(watcher.run(self.cancel.child_token())))
    }

    /// Start the periodic reconciliation sweep
    pub fn start_sweep(&self) -> JoinHandle<()> {
        let sweep = ReconciliationSweep::new(self.dispatcher.clone());
        tokio::spawn(sweep.run(self.cancel.child_token()))
    }

    /// Run a single sweep and wait for every job it started
    ///
    /// Jobs that end in an unexpected error are logged and left out of the
    /// result.
    pub async fn run_once(&self) -> Result<Vec<JobOutcome>> {
        let handles = ReconciliationSweep::new(self.dispatcher.clone()).sweep_once().await?;

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(Ok(outcome)) => outcomes.push(outcome),
                Ok(Err(_)) => {}
                Err(e) => return Err(Error::Other(format!("job task failed: {}", e))),
            }
        }
        Ok(outcomes)
    }

    /// Stop both triggers and wait for in-flight jobs
    ///
    /// Jobs still running after the timeout are left to the runtime; their
    /// working directories are cleared on the next start.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.cancel.cancel();
        let services = std::mem::take(
            &mut *self.services.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for handle in services {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Background service ended abnormally");
            }
        }
        tracing::info!("Stopped watcher and sweep");

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.dispatcher.wait_idle()).await {
            Ok(()) => tracing::info!("All in-flight jobs finished"),
            Err(_) => tracing::warn!(
                in_flight = self.dispatcher.in_flight(),
                "Timeout waiting for jobs to finish, proceeding with shutdown"
            ),
        }

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }
}

/// Create the five service directories and clear leftovers from `Temp`
async fn bootstrap_directories(config: &Config) -> Result<()> {
    for dir in config.directories() {
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to create directory '{}': {}", dir.display(), e),
            ))
        })?;
    }
    clear_temp(&config.temp_dir()).await
}

async fn clear_temp(temp_dir: &Path) -> Result<()> {
    let mut entries = tokio::fs::read_dir(temp_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let removed = if entry.file_type().await?.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        match removed {
            Ok(()) => tracing::warn!(path = %path.display(), "removed leftover working data"),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not remove leftover working data")
            }
        }
    }
    Ok(())
}

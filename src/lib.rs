//! # split-ingest
//!
//! Unattended ingestion of multi-part split archives.
//!
//! Parts named `<base>.001`, `<base>.002`, ... are dropped into an `Incoming`
//! directory. Once the first part stops growing and the part set is a
//! contiguous run starting at 1, the archive is extracted with 7-Zip into a
//! per-archive working directory. The output is then moved to
//! `Completed/<base>` and the parts to `Processed`. Archives that cannot be
//! extracted have their parts moved to `Failed`.
//!
//! ## Layout
//!
//! ```text
//! <base_path>/
//!   Incoming/    parts arrive here
//!   Temp/        Temp/<base> working directory per job
//!   Completed/   Completed/<base> extracted output
//!   Processed/   parts of successfully extracted archives
//!   Failed/      parts of archives that could not be extracted
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use split_ingest::{Config, Ingestor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ingestor = Ingestor::new(Config::with_base_path("/srv/ingest")).await?;
//!
//!     // Subscribe to events
//!     let mut events = ingestor.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     ingestor.start()?;
//!     split_ingest::run_with_shutdown(ingestor).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Job claiming and the per-archive state machine
pub mod dispatcher;
/// Error types
pub mod error;
/// Archive extraction
pub mod extraction;
/// Change notifications on the incoming folder
pub mod folder_watcher;
/// Service assembly
pub mod ingestor;
/// Part file name grammar
pub mod naming;
/// Part enumeration and completeness
pub mod parts;
/// Moving output and parts to their final place
pub mod relocate;
/// Retry logic with a fixed delay
pub mod retry;
/// Size-stability check
pub mod stability;
/// Periodic reconciliation sweep
pub mod sweep;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{Config, ToolConfig};
pub use dispatcher::{ClaimTable, Dispatcher};
pub use error::{Error, PipelineError, Result};
pub use extraction::{ArchiveTool, SevenZipCli, ToolExit};
pub use ingestor::Ingestor;
pub use types::{ArchiveJob, ArchivePart, Event, JobOutcome, ProcessingState, Trigger};

/// Run the ingestor until a termination signal arrives, then shut it down.
///
/// The ingestor should already be started with [`Ingestor::start`].
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(ingestor: Ingestor) -> Result<()> {
    wait_for_signal().await;
    ingestor.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}

//! Change-notification trigger for the `Incoming` directory
//!
//! The notify callback runs on the watcher's own thread and only forwards raw
//! events over a channel. A dedicated task drains that channel, keeps events
//! that can mean "a first part just appeared", and hands each candidate path to
//! the [`Dispatcher`], which spawns a short-lived job per claim.
//!
//! Notifications may be lost under load; the reconciliation sweep covers that.
//!
//! # Example
//!
//! ```no_run
//! use split_ingest::config::Config;
//! use split_ingest::dispatcher::Dispatcher;
//! use split_ingest::extraction::SevenZipCli;
//! use split_ingest::folder_watcher::FolderWatcher;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(Config::default());
//! let tool = SevenZipCli::discover(&config.tool)?;
//! let dispatcher = Dispatcher::new(config.clone(), Arc::new(tool));
//!
//! let mut watcher = FolderWatcher::new(dispatcher, config.incoming_dir())?;
//! watcher.start()?;
//!
//! // Runs until the token is cancelled
//! watcher.run(CancellationToken::new()).await;
//! # Ok(())
//! # }
//! ```

use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result};
use crate::naming::is_first_part;
use crate::types::{JobOutcome, Trigger};
use notify::event::{AccessKind, AccessMode, ModifyKind};
use notify::{
    Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Watches `Incoming` and submits first parts as they appear
pub struct FolderWatcher {
    /// Filesystem watcher instance
    watcher: RecommendedWatcher,

    /// Channel for receiving filesystem events
    rx: mpsc::UnboundedReceiver<notify::Result<Event>>,

    dispatcher: Dispatcher,

    /// Directory being watched
    incoming: PathBuf,
}

impl FolderWatcher {
    /// Create a watcher for `incoming`
    ///
    /// # Errors
    /// Returns error if the filesystem watcher cannot be initialized
    pub fn new(dispatcher: Dispatcher, incoming: PathBuf) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        let watcher = RecommendedWatcher::new(
            move |res| {
                if let Err(e) = tx.send(res) {
                    error!("Failed to send filesystem event: {}", e);
                }
            },
            NotifyConfig::default(),
        )
        .map_err(|e| Error::FolderWatch(e.to_string()))?;

        Ok(Self {
            watcher,
            rx,
            dispatcher,
            incoming,
        })
    }

    /// Start watching `Incoming`, creating it if needed
    ///
    /// # Errors
    /// Returns error if the folder cannot be created or watched
    pub fn start(&mut self) -> Result<()> {
        if !self.incoming.exists() {
            std::fs::create_dir_all(&self.incoming).map_err(|e| {
                Error::FolderWatch(format!("Failed to create incoming folder: {}", e))
            })?;
            info!("Created incoming folder: {}", self.incoming.display());
        }

        self.watcher
            .watch(&self.incoming, RecursiveMode::NonRecursive)
            .map_err(|e| Error::FolderWatch(format!("Failed to watch folder: {}", e)))?;

        info!("Watching folder: {}", self.incoming.display());
        Ok(())
    }

    /// Run the event loop until `cancel` fires or the channel closes
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Folder watcher started");

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.rx.recv() => match result {
                    Some(result) => result,
                    None => break,
                },
            };

            match result {
                Ok(event) => {
                    self.handle_event(event);
                }
                Err(e) => {
                    error!("Filesystem watcher error: {}", e);
                }
            }
        }

        info!("Folder watcher stopped");
    }

    /// Submit every first part named by a relevant event
    ///
    /// Returns the handles of the jobs that won their claim.
    fn handle_event(&self, event: Event) -> Vec<JoinHandle<Result<JobOutcome>>> {
        if !is_arrival(&event.kind) {
            return Vec::new();
        }

        event
            .paths
            .into_iter()
            .filter(|path| is_first_part(path))
            .filter_map(|path| {
                debug!(path = %path.display(), kind = ?event.kind, "first part observed");
                self.dispatcher.submit(path, Trigger::Notify)
            })
            .collect()
    }
}

/// Whether an event kind can signal a new or finished file
///
/// Covers creation, renames into the folder and a writer closing the file.
fn is_arrival(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Name(_))
            | EventKind::Access(AccessKind::Close(AccessMode::Write))
    )
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::extraction::{ArchiveTool, ToolExit};
    use async_trait::async_trait;
    use notify::event::{CreateKind, DataChange, RemoveKind, RenameMode};
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::sleep;

    struct OneFileTool;

    #[async_trait]
    impl ArchiveTool for OneFileTool {
        async fn extract(&self, _archive: &Path, output_dir: &Path) -> crate::Result<ToolExit> {
            std::fs::write(output_dir.join("out.bin"), b"data").unwrap();
            Ok(ToolExit::code(0))
        }

        fn name(&self) -> &'static str {
            "one-file"
        }
    }

    fn create_watcher() -> (FolderWatcher, Arc<Config>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::with_base_path(temp_dir.path());
        config.stability_wait = Duration::from_millis(10);
        for dir in config.directories() {
            std::fs::create_dir_all(dir).unwrap();
        }
        let config = Arc::new(config);
        let dispatcher = Dispatcher::new(config.clone(), Arc::new(OneFileTool));
        let watcher = FolderWatcher::new(dispatcher, config.incoming_dir()).unwrap();
        (watcher, config, temp_dir)
    }

    fn write_parts(config: &Config, base: &str) -> PathBuf {
        let incoming = config.incoming_dir();
        std::fs::write(incoming.join(format!("{base}.001")), b"one").unwrap();
        std::fs::write(incoming.join(format!("{base}.002")), b"two").unwrap();
        incoming.join(format!("{base}.001"))
    }

    fn event(kind: EventKind, path: PathBuf) -> Event {
        Event {
            kind,
            paths: vec![path],
            attrs: Default::default(),
        }
    }

    #[test]
    fn arrival_kinds() {
        assert!(is_arrival(&EventKind::Create(CreateKind::File)));
        assert!(is_arrival(&EventKind::Modify(ModifyKind::Name(RenameMode::To))));
        assert!(is_arrival(&EventKind::Access(AccessKind::Close(AccessMode::Write))));

        assert!(!is_arrival(&EventKind::Modify(ModifyKind::Data(DataChange::Content))));
        assert!(!is_arrival(&EventKind::Remove(RemoveKind::File)));
    }

    #[tokio::test]
    async fn create_event_for_first_part_runs_a_job() {
        let (watcher, config, _temp_dir) = create_watcher();
        let first = write_parts(&config, "movie");

        let handles = watcher.handle_event(event(EventKind::Create(CreateKind::File), first));
        assert_eq!(handles.len(), 1);

        let outcome = handles.into_iter().next().unwrap().await.unwrap().unwrap();
        assert!(matches!(outcome, JobOutcome::Succeeded { .. }));
        assert!(config.completed_dir().join("movie/out.bin").exists());
    }

    #[tokio::test]
    async fn later_parts_are_ignored() {
        let (watcher, config, _temp_dir) = create_watcher();
        write_parts(&config, "movie");

        let second = config.incoming_dir().join("movie.002");
        let handles = watcher.handle_event(event(EventKind::Create(CreateKind::File), second));
        assert!(handles.is_empty());
    }

    #[tokio::test]
    async fn remove_event_is_ignored() {
        let (watcher, config, _temp_dir) = create_watcher();
        let first = config.incoming_dir().join("gone.001");

        let handles = watcher.handle_event(event(EventKind::Remove(RemoveKind::File), first));
        assert!(handles.is_empty());
    }

    #[tokio::test]
    async fn test_folder_watching_with_file_creation() {
        let (mut watcher, config, _temp_dir) = create_watcher();
        watcher.start().unwrap();

        let cancel = CancellationToken::new();
        let watcher_handle = tokio::spawn(watcher.run(cancel.clone()));

        // Give watcher time to start
        sleep(Duration::from_millis(100)).await;

        // Later parts first so the set is complete when the first part lands
        let incoming = config.incoming_dir();
        std::fs::write(incoming.join("show.002"), b"two").unwrap();
        std::fs::write(incoming.join("show.001"), b"one").unwrap();

        let completed = config.completed_dir().join("show/out.bin");
        for _ in 0..50 {
            if completed.exists() {
                break;
            }
            sleep(Duration::from_millis(100)).await;
        }
        assert!(completed.exists(), "watcher should have extracted the archive");

        cancel.cancel();
        watcher_handle.await.unwrap();
    }
}

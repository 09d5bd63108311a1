//! Test configuration helpers

use split_ingest::{ArchiveTool, Config, Ingestor};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Configuration rooted in `dir` with timings shrunk for tests
pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::with_base_path(dir.path().join("ingest"));
    config.stability_wait = Duration::from_millis(20);
    config.sweep_min_age = Duration::ZERO;
    config.poll_interval = Duration::from_millis(200);
    config.retry_delay = Duration::from_millis(5);
    config.tool.search_path = false;
    config
}

/// Create an ingestor backed by `tool` in a fresh temporary directory
///
/// The directory layout is bootstrapped before this returns.
pub async fn create_test_ingestor(tool: Arc<dyn ArchiveTool>) -> (Ingestor, TempDir) {
    let dir = TempDir::new().unwrap();
    let ingestor = Ingestor::with_tool(test_config(&dir), tool)
        .await
        .unwrap();
    (ingestor, dir)
}

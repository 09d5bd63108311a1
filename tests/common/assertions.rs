//! Event-based wait helpers

use split_ingest::Event;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast;

/// Terminal result observed for an archive
#[derive(Debug, PartialEq, Eq)]
pub enum WaitResult {
    /// `Event::Succeeded` arrived
    Succeeded,
    /// `Event::Failed` arrived with this error
    Failed(String),
    /// Nothing terminal within the timeout
    Timeout,
    /// Channel closed unexpectedly
    ChannelClosed,
}

/// Wait until `base_name` reaches a terminal event
pub async fn wait_for_terminal(
    events: &mut broadcast::Receiver<Event>,
    base_name: &str,
    timeout: Duration,
) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::Succeeded { base_name: b, .. }) if b == base_name => {
                    return WaitResult::Succeeded;
                }
                Ok(Event::Failed { base_name: b, error }) if b == base_name => {
                    return WaitResult::Failed(error);
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return WaitResult::ChannelClosed,
            }
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Drain every event currently buffered
pub fn drain(events: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut collected = Vec::new();
    while let Ok(event) = events.try_recv() {
        collected.push(event);
    }
    collected
}

/// Assert a part lives in exactly one of the given directories
pub fn assert_in_exactly_one(file_name: &str, dirs: &[PathBuf]) {
    let hits: Vec<_> = dirs.iter().filter(|d| d.join(file_name).exists()).collect();
    assert_eq!(
        hits.len(),
        1,
        "{file_name} should be in exactly one of {dirs:?}, found in {hits:?}"
    );
}

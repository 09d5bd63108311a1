//! End-to-end pipeline scenarios driven through the dispatcher
//!
//! Each test builds a fresh directory layout, drops part files into
//! `Incoming`, and checks where everything ends up.

mod common;

use common::{
    FakeTool, assert_in_exactly_one, create_test_ingestor, drain, file_names, write_part,
    write_parts,
};
use futures::future::join_all;
use split_ingest::{Event, JobOutcome, ProcessingState, Trigger};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn complete_archive_lands_in_completed_and_processed() {
    let tool = Arc::new(FakeTool::succeeding(vec![
        ("readme.txt", "hello"),
        ("data/blob.bin", "\x00\x01\x02"),
    ]));
    let (ingestor, _dir) = create_test_ingestor(tool.clone()).await;
    let config = ingestor.config().clone();
    let first = write_parts(&config, "arc", 3);

    let outcome = ingestor
        .dispatcher()
        .process(&first, Trigger::Manual)
        .await
        .unwrap()
        .unwrap();

    let completed = config.completed_dir().join("arc");
    assert_eq!(
        outcome,
        JobOutcome::Succeeded {
            destination: completed.clone(),
            files: 2
        }
    );
    assert_eq!(std::fs::read_to_string(completed.join("readme.txt")).unwrap(), "hello");
    assert!(completed.join("data/blob.bin").exists());

    assert_eq!(file_names(&config.processed_dir()), vec!["arc.001", "arc.002", "arc.003"]);
    assert!(file_names(&config.incoming_dir()).is_empty());
    assert!(file_names(&config.failed_dir()).is_empty());
    assert!(!config.temp_dir().join("arc").exists());

    // 7-Zip is always handed the first volume
    assert_eq!(tool.archives(), vec![first]);
}

#[tokio::test]
async fn single_part_waits_until_second_part_arrives() {
    let tool = Arc::new(FakeTool::succeeding(vec![("movie.mkv", "frames")]));
    let (ingestor, _dir) = create_test_ingestor(tool.clone()).await;
    let config = ingestor.config().clone();
    let first = write_parts(&config, "movie", 1);

    let outcome = ingestor
        .dispatcher()
        .process(&first, Trigger::Sweep)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        outcome,
        JobOutcome::Abandoned {
            at: ProcessingState::PartsPending,
            ..
        }
    ));
    assert!(first.exists());
    assert_eq!(tool.calls(), 0);

    write_part(&config, "movie", 2);
    let outcome = ingestor
        .dispatcher()
        .process(&first, Trigger::Sweep)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(outcome, JobOutcome::Succeeded { .. }));
    assert!(config.completed_dir().join("movie/movie.mkv").exists());
    assert_eq!(file_names(&config.processed_dir()), vec!["movie.001", "movie.002"]);
}

#[tokio::test]
async fn gap_in_sequence_is_abandoned() {
    let tool = Arc::new(FakeTool::succeeding(vec![("x", "x")]));
    let (ingestor, _dir) = create_test_ingestor(tool.clone()).await;
    let config = ingestor.config().clone();
    let first = write_part(&config, "gap", 1);
    write_part(&config, "gap", 3);
    let mut events = ingestor.subscribe();

    ingestor
        .dispatcher()
        .process(&first, Trigger::Notify)
        .await
        .unwrap()
        .unwrap();

    let incomplete = drain(&mut events).into_iter().find_map(|e| match e {
        Event::Incomplete { sequences, .. } => Some(sequences),
        _ => None,
    });
    assert_eq!(incomplete, Some(vec![1, 3]));
    assert_eq!(file_names(&config.incoming_dir()), vec!["gap.001", "gap.003"]);
    assert_eq!(tool.calls(), 0);
}

#[tokio::test]
async fn fatal_exit_on_every_attempt_moves_parts_to_failed() {
    let tool = Arc::new(FakeTool::failing(2));
    let (ingestor, _dir) = create_test_ingestor(tool.clone()).await;
    let config = ingestor.config().clone();
    let first = write_parts(&config, "broken", 2);

    let outcome = ingestor
        .dispatcher()
        .process(&first, Trigger::Manual)
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(outcome, JobOutcome::Failed { .. }));
    assert_eq!(tool.calls(), config.max_retries);
    assert_eq!(file_names(&config.failed_dir()), vec!["broken.001", "broken.002"]);
    assert!(!config.completed_dir().join("broken").exists());
    assert!(file_names(&config.processed_dir()).is_empty());
    assert!(file_names(&config.temp_dir()).is_empty());
}

#[tokio::test]
async fn retry_recovers_after_transient_failure() {
    let tool = Arc::new(FakeTool::with_codes(vec![2, 0], vec![("ok.txt", "ok")]));
    let (ingestor, _dir) = create_test_ingestor(tool.clone()).await;
    let config = ingestor.config().clone();
    let first = write_parts(&config, "flaky", 2);
    let mut events = ingestor.subscribe();

    let outcome = ingestor
        .dispatcher()
        .process(&first, Trigger::Manual)
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(outcome, JobOutcome::Succeeded { files: 1, .. }));
    assert_eq!(tool.calls(), 2);

    let attempts: Vec<u32> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            Event::Extracting { attempt, .. } => Some(attempt),
            _ => None,
        })
        .collect();
    assert_eq!(attempts, vec![1, 2]);
}

#[tokio::test]
async fn clean_exit_without_output_counts_as_failure() {
    let tool = Arc::new(FakeTool::with_codes(vec![0], Vec::new()));
    let (ingestor, _dir) = create_test_ingestor(tool.clone()).await;
    let config = ingestor.config().clone();
    let first = write_parts(&config, "empty", 2);

    let outcome = ingestor
        .dispatcher()
        .process(&first, Trigger::Manual)
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(outcome, JobOutcome::Failed { .. }));
    assert_eq!(file_names(&config.failed_dir()), vec!["empty.001", "empty.002"]);
}

#[tokio::test]
async fn duplicate_triggers_run_one_extraction() {
    let tool = Arc::new(
        FakeTool::succeeding(vec![("once.txt", "1")]).with_delay(Duration::from_millis(50)),
    );
    let (ingestor, _dir) = create_test_ingestor(tool.clone()).await;
    let config = ingestor.config().clone();
    let first = write_parts(&config, "dup", 2);
    let mut events = ingestor.subscribe();

    let dispatcher = ingestor.dispatcher();
    let runs = join_all([
        dispatcher.process(&first, Trigger::Notify),
        dispatcher.process(&first, Trigger::Sweep),
        dispatcher.process(&first, Trigger::Sweep),
    ])
    .await;

    let winners: Vec<_> = runs.into_iter().flatten().collect();
    assert_eq!(winners.len(), 1);
    assert_eq!(tool.calls(), 1);

    let events = drain(&mut events);
    let dropped = events
        .iter()
        .filter(|e| matches!(e, Event::Dropped { .. }))
        .count();
    let discovered = events
        .iter()
        .filter(|e| matches!(e, Event::Discovered { .. }))
        .count();
    assert_eq!(dropped, 2);
    assert_eq!(discovered, 1);
    assert!(dispatcher.claims().is_empty());
}

#[tokio::test]
async fn independent_archives_run_concurrently() {
    let tool = Arc::new(
        FakeTool::succeeding(vec![("out.txt", "x")]).with_delay(Duration::from_millis(30)),
    );
    let (ingestor, _dir) = create_test_ingestor(tool.clone()).await;
    let config = ingestor.config().clone();

    let dispatcher = ingestor.dispatcher();
    let handles: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|base| {
            let first = write_parts(&config, base, 2);
            dispatcher.submit(first, Trigger::Notify).unwrap()
        })
        .collect();

    for result in join_all(handles).await {
        assert!(matches!(result.unwrap().unwrap(), JobOutcome::Succeeded { .. }));
    }
    assert_eq!(tool.calls(), 3);
    for base in ["a", "b", "c"] {
        assert!(config.completed_dir().join(base).join("out.txt").exists());
    }
}

#[tokio::test]
async fn every_part_ends_in_exactly_one_terminal_directory() {
    let tool = Arc::new(FakeTool::succeeding(vec![("f", "f")]));
    let (ingestor, _dir) = create_test_ingestor(tool).await;
    let config = ingestor.config().clone();
    let good = write_parts(&config, "good", 2);

    let (bad_ingestor, _bad_dir) = create_test_ingestor(Arc::new(FakeTool::failing(7))).await;
    let bad_config = bad_ingestor.config().clone();
    let bad = write_parts(&bad_config, "bad", 2);

    ingestor.dispatcher().process(&good, Trigger::Manual).await;
    bad_ingestor.dispatcher().process(&bad, Trigger::Manual).await;

    for part in ["good.001", "good.002"] {
        assert_in_exactly_one(
            part,
            &[
                config.incoming_dir(),
                config.processed_dir(),
                config.failed_dir(),
            ],
        );
        assert!(config.processed_dir().join(part).exists());
    }
    for part in ["bad.001", "bad.002"] {
        assert_in_exactly_one(
            part,
            &[
                bad_config.incoming_dir(),
                bad_config.processed_dir(),
                bad_config.failed_dir(),
            ],
        );
        assert!(bad_config.failed_dir().join(part).exists());
    }
}

#[tokio::test]
async fn existing_output_is_never_overwritten() {
    let tool = Arc::new(FakeTool::succeeding(vec![("same.txt", "new")]));
    let (ingestor, _dir) = create_test_ingestor(tool).await;
    let config = ingestor.config().clone();

    let completed = config.completed_dir().join("arc");
    std::fs::create_dir_all(&completed).unwrap();
    std::fs::write(completed.join("same.txt"), b"old").unwrap();
    std::fs::write(config.processed_dir().join("arc.001"), b"older part").unwrap();

    let first = write_parts(&config, "arc", 2);
    ingestor
        .dispatcher()
        .process(&first, Trigger::Manual)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(std::fs::read(completed.join("same.txt")).unwrap(), b"old");
    let renamed: Vec<_> = file_names(&completed)
        .into_iter()
        .filter(|n| n != "same.txt")
        .collect();
    assert_eq!(renamed.len(), 1);
    assert!(renamed[0].ends_with("_same.txt"), "got {renamed:?}");
    assert_eq!(std::fs::read_to_string(completed.join(&renamed[0])).unwrap(), "new");

    // The earlier part is kept and the new one gets a prefixed name
    let processed = file_names(&config.processed_dir());
    assert_eq!(processed.len(), 3);
    assert_eq!(
        std::fs::read(config.processed_dir().join("arc.001")).unwrap(),
        b"older part"
    );
}

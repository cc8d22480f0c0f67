//! Integration tests for the chunked batch fetcher

use crate::support::{FakeRankings, FakeScores, RecordingStore};
use osu_data_downloader::downloader::{BatchConfig, BatchFetcher, DownloadError};
use osu_data_downloader::fetcher::FetcherError;
use osu_data_downloader::resume::{
    BatchCheckpoint, Checkpoint, CheckpointRef, CheckpointStore, FileCheckpointStore,
    PipelineKind,
};
use osu_data_downloader::{DetailResult, UserId};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;

fn ranking(n: u64) -> Vec<UserId> {
    (1..=n).map(|i| 1000 + i).collect()
}

fn config(dir: &Path) -> BatchConfig {
    BatchConfig {
        end_rank: 250,
        chunk_size: 100,
        checkpoint_every: 1,
        floor_interval: Duration::ZERO,
        max_requests_per_minute: None,
        output_path: dir.join("rankings.json"),
        ..BatchConfig::default()
    }
}

fn read_results(path: &Path) -> Vec<DetailResult> {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

fn stored(dir: &Path) -> BatchCheckpoint {
    match FileCheckpointStore::new(dir).load(PipelineKind::Batch).unwrap() {
        Some(Checkpoint::Batch(cp)) => cp,
        other => panic!("Expected batch checkpoint, got {other:?}"),
    }
}

#[tokio::test]
async fn test_chunks_advance_and_persist_in_order() {
    let dir = TempDir::new().unwrap();
    let scores = Arc::new(FakeScores::new());
    let rankings = Arc::new(FakeRankings::new(ranking(250)));
    let store = Arc::new(RecordingStore::new(dir.path()));

    let fetcher = BatchFetcher::new(scores.clone(), rankings.clone(), store.clone(), config(dir.path()));
    let report = fetcher.run().await.unwrap();

    // identifiers persisted first, then 100, 100 and a final chunk of 50
    assert_eq!(store.saved_positions(), vec![0, 100, 200, 250]);
    assert_eq!(report.chunks_fetched, 3);
    assert_eq!(report.identifiers, 250);
    assert_eq!(report.succeeded, 250);
    assert_eq!(report.failed, 0);
    assert_eq!(scores.tracker.get_count(), 250);
    assert_eq!(*rankings.page_counts.lock().unwrap(), vec![5]);

    let results = read_results(&dir.path().join("rankings.json"));
    let ids: Vec<_> = results.iter().map(|r| r.user_id).collect();
    assert_eq!(ids, ranking(250));
}

#[tokio::test]
async fn test_checkpoint_frequency_with_final_save() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(RecordingStore::new(dir.path()));
    let config = BatchConfig {
        checkpoint_every: 2,
        ..config(dir.path())
    };

    BatchFetcher::new(
        Arc::new(FakeScores::new()),
        Arc::new(FakeRankings::new(ranking(250))),
        store.clone(),
        config,
    )
    .run()
    .await
    .unwrap();

    // every second chunk, plus the unsaved tail at completion
    assert_eq!(store.saved_positions(), vec![0, 200, 250]);
    assert!(stored(dir.path()).is_complete());
}

#[tokio::test]
async fn test_transient_failures_are_dropped_and_recorded() {
    let dir = TempDir::new().unwrap();
    let failing = [1007, 1150, 1250];
    let scores = Arc::new(FakeScores::new().failing(&failing));

    let report = BatchFetcher::new(
        scores,
        Arc::new(FakeRankings::new(ranking(250))),
        Arc::new(FileCheckpointStore::new(dir.path())),
        config(dir.path()),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(report.succeeded, 247);
    assert_eq!(report.failed, 3);

    let results = read_results(&dir.path().join("rankings.json"));
    assert_eq!(results.len(), 247);
    assert!(results.iter().all(|r| !failing.contains(&r.user_id)));

    let checkpoint = stored(dir.path());
    assert_eq!(checkpoint.position(), 250);
    let failed: Vec<_> = checkpoint
        .failures()
        .iter()
        .map(|f| (f.user_id, f.position))
        .collect();
    assert_eq!(failed, vec![(1007, 6), (1150, 149), (1250, 249)]);
}

#[tokio::test]
async fn test_fatal_error_keeps_last_persisted_position() {
    let dir = TempDir::new().unwrap();
    let rankings = Arc::new(FakeRankings::new(ranking(250)));

    let err = BatchFetcher::new(
        Arc::new(FakeScores::new().refusing(&[1150])),
        rankings.clone(),
        Arc::new(FileCheckpointStore::new(dir.path())),
        config(dir.path()),
    )
    .run()
    .await
    .unwrap_err();

    assert!(matches!(err, DownloadError::FatalService(FetcherError::ApiError(_))));
    assert!(err.is_resumable());

    let checkpoint = stored(dir.path());
    assert_eq!(checkpoint.position(), 100);
    assert_eq!(checkpoint.results().len(), 100);
    assert!(!dir.path().join("rankings.json").exists());

    // resume: no second enumeration, only the remaining 150 users fetched
    let scores = Arc::new(FakeScores::new());
    let report = BatchFetcher::new(
        scores.clone(),
        rankings.clone(),
        Arc::new(FileCheckpointStore::new(dir.path())),
        config(dir.path()),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(rankings.tracker.get_count(), 1);
    assert_eq!(scores.tracker.get_count(), 150);
    assert_eq!(report.chunks_fetched, 2);
    assert_eq!(report.succeeded, 250);

    let ids: Vec<_> = read_results(&dir.path().join("rankings.json"))
        .iter()
        .map(|r| r.user_id)
        .collect();
    assert_eq!(ids, ranking(250));
}

#[tokio::test]
async fn test_unsaved_chunks_are_refetched_on_resume() {
    let dir = TempDir::new().unwrap();
    let rankings = Arc::new(FakeRankings::new(ranking(250)));
    let config = BatchConfig {
        checkpoint_every: 2,
        ..config(dir.path())
    };

    // chunk 1 completes but is not yet due for a save when chunk 2 fails
    let err = BatchFetcher::new(
        Arc::new(FakeScores::new().refusing(&[1150])),
        rankings.clone(),
        Arc::new(FileCheckpointStore::new(dir.path())),
        config.clone(),
    )
    .run()
    .await
    .unwrap_err();

    assert!(matches!(err, DownloadError::FatalService(_)));
    let checkpoint = stored(dir.path());
    assert_eq!(checkpoint.position(), 0);
    assert!(checkpoint.results().is_empty());
    assert!(!dir.path().join("rankings.json").exists());

    let scores = Arc::new(FakeScores::new());
    let report = BatchFetcher::new(
        scores.clone(),
        rankings.clone(),
        Arc::new(FileCheckpointStore::new(dir.path())),
        config,
    )
    .run()
    .await
    .unwrap();

    assert_eq!(rankings.tracker.get_count(), 1);
    assert_eq!(scores.tracker.get_count(), 250);
    assert_eq!(report.chunks_fetched, 3);
    assert_eq!(report.succeeded, 250);

    let ids: Vec<_> = read_results(&dir.path().join("rankings.json"))
        .iter()
        .map(|r| r.user_id)
        .collect();
    assert_eq!(ids, ranking(250));
}

#[tokio::test]
async fn test_rank_window_limits_identifiers() {
    let dir = TempDir::new().unwrap();
    let rankings = Arc::new(FakeRankings::new(ranking(200)));
    let config = BatchConfig {
        start_rank: 50,
        end_rank: 120,
        ..config(dir.path())
    };

    let report = BatchFetcher::new(
        Arc::new(FakeScores::new()),
        rankings.clone(),
        Arc::new(FileCheckpointStore::new(dir.path())),
        config,
    )
    .run()
    .await
    .unwrap();

    assert_eq!(*rankings.page_counts.lock().unwrap(), vec![3]);
    assert_eq!(report.identifiers, 70);

    let checkpoint = stored(dir.path());
    assert_eq!(checkpoint.identifiers().len(), 120);
    assert_eq!(checkpoint.start_position(), 50);

    let ids: Vec<_> = checkpoint.results().iter().map(|r| r.user_id).collect();
    assert_eq!(ids, (1051..=1120).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn test_chunk_fetches_run_concurrently() {
    let dir = TempDir::new().unwrap();
    let config = BatchConfig {
        end_rank: 100,
        ..config(dir.path())
    };

    let started = Instant::now();
    BatchFetcher::new(
        Arc::new(FakeScores::new().with_latency(Duration::from_secs(1))),
        Arc::new(FakeRankings::new(ranking(100))),
        Arc::new(FileCheckpointStore::new(dir.path())),
        config,
    )
    .run()
    .await
    .unwrap();

    // 100 fetches of one second each, all in flight together
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_throttle_paces_chunks_but_not_the_last() {
    let dir = TempDir::new().unwrap();
    let config = BatchConfig {
        floor_interval: Duration::from_secs(5),
        ..config(dir.path())
    };

    let started = Instant::now();
    BatchFetcher::new(
        Arc::new(FakeScores::new()),
        Arc::new(FakeRankings::new(ranking(250))),
        Arc::new(FileCheckpointStore::new(dir.path())),
        config,
    )
    .run()
    .await
    .unwrap();

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(10), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(15), "elapsed {elapsed:?}");
}

#[tokio::test]
async fn test_corrupt_checkpoint_refuses_to_start() {
    let dir = TempDir::new().unwrap();
    let path = FileCheckpointStore::new(dir.path()).path_for(PipelineKind::Batch);
    std::fs::write(&path, r#"{"schema_version": "1.0.0", "checkpoint": {"pipel"#).unwrap();
    let rankings = Arc::new(FakeRankings::new(ranking(10)));

    let err = BatchFetcher::new(
        Arc::new(FakeScores::new()),
        rankings.clone(),
        Arc::new(FileCheckpointStore::new(dir.path())),
        config(dir.path()),
    )
    .run()
    .await
    .unwrap_err();

    match err {
        DownloadError::Checkpoint(e) => assert!(e.is_corrupt()),
        other => panic!("Expected checkpoint error, got {other:?}"),
    }
    assert_eq!(rankings.tracker.get_count(), 0);
    // the file is left for inspection
    assert!(std::fs::read_to_string(&path).unwrap().contains("pipel"));
}

#[tokio::test]
async fn test_foreign_pipeline_checkpoint_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = FileCheckpointStore::new(dir.path());
    let pagination_path = store.path_for(PipelineKind::Pagination);
    let batch_path = store.path_for(PipelineKind::Batch);

    let cursor = osu_data_downloader::cursor::Cursor::parse("2007-10-07").unwrap();
    store
        .save(CheckpointRef::Pagination(
            &osu_data_downloader::resume::PaginationCheckpoint::new(cursor),
        ))
        .unwrap();
    std::fs::rename(&pagination_path, &batch_path).unwrap();

    let err = BatchFetcher::new(
        Arc::new(FakeScores::new()),
        Arc::new(FakeRankings::new(ranking(10))),
        Arc::new(store),
        config(dir.path()),
    )
    .run()
    .await
    .unwrap_err();

    assert!(matches!(err, DownloadError::Checkpoint(e) if e.is_corrupt()));
}

#[tokio::test]
async fn test_invalid_config_is_rejected_before_any_request() {
    let dir = TempDir::new().unwrap();
    let rankings = Arc::new(FakeRankings::new(ranking(10)));
    let config = BatchConfig {
        chunk_size: 0,
        ..config(dir.path())
    };

    let err = BatchFetcher::new(
        Arc::new(FakeScores::new()),
        rankings.clone(),
        Arc::new(FileCheckpointStore::new(dir.path())),
        config,
    )
    .run()
    .await
    .unwrap_err();

    assert!(matches!(err, DownloadError::ValidationError(_)));
    assert_eq!(rankings.tracker.get_count(), 0);
}

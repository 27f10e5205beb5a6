#![cfg(feature = "test-utils")]

use chrono::{DateTime, Duration, TimeZone, Utc};
use movies_etl::destination::memory::MemoryDestination;
use movies_etl::pipeline::Pipeline;
use movies_etl::retry::RetryPolicy;
use movies_etl::store::{FileWatermarkStore, WatermarkStore};
use movies_etl::test_utils::memory_source::MemorySource;
use movies_etl::test_utils::pipeline::{PipelineBuilder, TEST_MOVIES_INDEX, test_retry_config};
use movies_etl::test_utils::tracing::init_test_tracing;
use movies_etl::types::{EntityType, Watermark};
use serde_json::Value;

fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
}

fn source() -> MemorySource {
    MemorySource::with_retry(RetryPolicy::from(&test_retry_config()))
}

fn pipeline(
    source: &MemorySource,
    store: FileWatermarkStore,
    destination: &MemoryDestination,
) -> Pipeline<MemorySource, FileWatermarkStore, MemoryDestination> {
    PipelineBuilder::new(source.clone(), store, destination.clone()).build()
}

#[tokio::test(flavor = "multi_thread")]
async fn restarted_pipeline_resumes_from_persisted_watermarks() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let source = source();
    for minute in 0..3 {
        source.add_movie("first run", at(minute)).await;
    }

    let destination = MemoryDestination::new();
    pipeline(&source, FileWatermarkStore::new(&path), &destination)
        .run()
        .await
        .unwrap();
    assert_eq!(destination.documents(TEST_MOVIES_INDEX).await.len(), 3);

    let late = source.add_movie("second run", at(10)).await;
    let restarted_destination = MemoryDestination::new();
    let report = pipeline(&source, FileWatermarkStore::new(&path), &restarted_destination)
        .run_iteration()
        .await
        .unwrap();

    assert_eq!(report.entity(EntityType::Movie).unwrap().rows_scanned, 1);
    let documents = restarted_destination.documents(TEST_MOVIES_INDEX).await;
    assert_eq!(documents.len(), 1);
    assert!(documents.contains_key(&late.to_string()));
}

#[tokio::test(flavor = "multi_thread")]
async fn persisted_file_holds_rfc3339_watermarks_with_ids() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let source = source();
    let movie = source.add_movie("Arrival", at(0)).await;

    pipeline(&source, FileWatermarkStore::new(&path), &MemoryDestination::new())
        .run()
        .await
        .unwrap();

    let contents: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(
        contents["movies"],
        Value::String(format!("2024-01-01T00:00:00Z#{movie}"))
    );
    assert!(!dir.path().join("state.json.tmp").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn legacy_timestamp_values_are_honored() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, r#"{"movies": "2024-01-01 00:05:00.000000+00:00"}"#).unwrap();
    let source = source();
    for minute in 0..10 {
        source.add_movie("movie", at(minute)).await;
    }
    let store = FileWatermarkStore::new(&path);

    let report = pipeline(&source, store.clone(), &MemoryDestination::new())
        .run_iteration()
        .await
        .unwrap();

    assert_eq!(report.entity(EntityType::Movie).unwrap().rows_scanned, 4);
    let watermark = store.get("movies").await.unwrap().unwrap();
    assert_eq!(watermark.changed_at, at(9));
    assert!(watermark > Watermark::at(at(5)));
}

#[tokio::test(flavor = "multi_thread")]
async fn corrupt_file_triggers_full_resync_and_is_rewritten() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, "{ not json").unwrap();
    let source = source();
    for minute in 0..4 {
        source.add_movie("movie", at(minute)).await;
    }
    let store = FileWatermarkStore::new(&path);
    let destination = MemoryDestination::new();

    pipeline(&source, store.clone(), &destination)
        .run()
        .await
        .unwrap();

    assert_eq!(destination.documents(TEST_MOVIES_INDEX).await.len(), 4);
    let snapshot = store.snapshot().await.unwrap();
    assert_eq!(snapshot["movies"].changed_at, at(3));
}

#[tokio::test(flavor = "multi_thread")]
async fn unparseable_value_only_resets_its_own_key() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(
        &path,
        r#"{"movies": "yesterday", "genres": "2030-01-01T00:00:00Z"}"#,
    )
    .unwrap();
    let source = source();
    source.add_movie("movie", at(0)).await;
    source.add_genre("Drama", at(0)).await;

    let report = pipeline(&source, FileWatermarkStore::new(&path), &MemoryDestination::new())
        .run_iteration()
        .await
        .unwrap();

    assert_eq!(report.entity(EntityType::Movie).unwrap().rows_scanned, 1);
    assert_eq!(report.entity(EntityType::Genre).unwrap().rows_scanned, 0);
}

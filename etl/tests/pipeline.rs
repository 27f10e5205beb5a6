#![cfg(feature = "test-utils")]

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};
use movies_etl::destination::memory::MemoryDestination;
use movies_etl::error::ErrorKind;
use movies_etl::pipeline::{EntitySyncStatus, Pipeline};
use movies_etl::retry::RetryPolicy;
use movies_etl::store::{MemoryWatermarkStore, WatermarkStore};
use movies_etl::test_utils::memory_source::MemorySource;
use movies_etl::test_utils::pipeline::{
    PipelineBuilder, TEST_GENRES_INDEX, TEST_MOVIES_INDEX, TEST_PERSONS_INDEX, test_retry_config,
};
use movies_etl::test_utils::test_destination_wrapper::TestDestinationWrapper;
use movies_etl::test_utils::tracing::init_test_tracing;
use movies_etl::types::{CASCADE_WATERMARK_KEY, EntityId, EntityType, Watermark};
use serde_json::Value;

type TestDestination = TestDestinationWrapper<MemoryDestination>;

fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
}

struct Harness {
    source: MemorySource,
    store: MemoryWatermarkStore,
    destination: TestDestination,
    memory: MemoryDestination,
}

impl Harness {
    fn new() -> Self {
        init_test_tracing();

        let memory = MemoryDestination::new();

        Self {
            source: MemorySource::with_retry(RetryPolicy::from(&test_retry_config())),
            store: MemoryWatermarkStore::new(),
            destination: TestDestinationWrapper::wrap(memory.clone()),
            memory,
        }
    }

    fn builder(
        &self,
    ) -> PipelineBuilder<MemorySource, MemoryWatermarkStore, TestDestination> {
        PipelineBuilder::new(
            self.source.clone(),
            self.store.clone(),
            self.destination.clone(),
        )
    }

    fn pipeline(&self) -> Pipeline<MemorySource, MemoryWatermarkStore, TestDestination> {
        self.builder().build()
    }

    async fn movie(&self, id: EntityId) -> Value {
        self.memory
            .document(TEST_MOVIES_INDEX, &id.to_string())
            .await
            .expect("movie document should be indexed")
    }
}

fn names(document: &Value, field: &str) -> Vec<String> {
    document[field]
        .as_array()
        .unwrap()
        .iter()
        .map(|name| name.as_str().unwrap().to_owned())
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn movie_with_two_actors_and_one_genre_is_indexed() {
    let harness = Harness::new();
    let movie = harness.source.add_movie("Star Wars", at(0)).await;
    let luke = harness.source.add_person("Mark Hamill", at(0)).await;
    let han = harness.source.add_person("Harrison Ford", at(0)).await;
    let genre = harness.source.add_genre("Sci-Fi", at(0)).await;
    harness.source.link_person(movie, luke, "actor").await;
    harness.source.link_person(movie, han, "actor").await;
    harness.source.link_genre(movie, genre).await;

    let report = harness.pipeline().run_iteration().await.unwrap();

    let document = harness.movie(movie).await;
    let mut actors = names(&document, "actors_names");
    actors.sort();
    assert_eq!(actors, vec!["Harrison Ford", "Mark Hamill"]);
    assert_eq!(document["actors"].as_array().unwrap().len(), 2);
    assert_eq!(document["genres"].as_array().unwrap().len(), 1);
    assert_eq!(document["genres"][0]["name"], "Sci-Fi");
    assert_eq!(document["title"], "Star Wars");
    assert_eq!(document["imdb_rating"], 0.0);
    assert!(names(&document, "directors_names").is_empty());
    assert_eq!(harness.memory.documents(TEST_MOVIES_INDEX).await.len(), 1);

    assert_eq!(report.entity(EntityType::Movie).unwrap().rows_scanned, 1);
    assert_eq!(report.entity(EntityType::Person).unwrap().rows_scanned, 2);
    assert_eq!(
        harness.store.get("movies").await.unwrap(),
        Some(Watermark::new(at(0), movie))
    );
    assert!(harness.store.get("persons").await.unwrap().is_some());
    assert!(harness.store.get("genres").await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn person_rename_cascades_to_every_linked_movie() {
    let harness = Harness::new();
    let person = harness.source.add_person("Carrie Fisher", at(0)).await;
    let mut movies = Vec::new();
    for (minute, title) in [(1, "A New Hope"), (2, "Empire"), (3, "Return")] {
        let movie = harness.source.add_movie(title, at(minute)).await;
        harness.source.link_person(movie, person, "actor").await;
        movies.push(movie);
    }
    // Credited twice on the same movie: still listed once.
    harness.source.link_person(movies[0], person, "actor").await;
    let pipeline = harness.pipeline();
    pipeline.run_iteration().await.unwrap();

    harness
        .source
        .rename_person(person, "Carrie F.", at(10))
        .await;
    let report = pipeline.run_iteration().await.unwrap();

    for movie in &movies {
        let document = harness.movie(*movie).await;
        assert_eq!(names(&document, "actors_names"), vec!["Carrie F."]);
    }
    let person_report = report.entity(EntityType::Person).unwrap();
    assert_eq!(person_report.rows_scanned, 1);
    assert_eq!(person_report.documents_written, 3);
    assert_eq!(report.entity(EntityType::Movie).unwrap().rows_scanned, 0);
    assert_eq!(
        harness.store.get("persons").await.unwrap(),
        Some(Watermark::new(at(10), person))
    );
    assert_eq!(
        harness.store.get(CASCADE_WATERMARK_KEY).await.unwrap(),
        Some(Watermark::new(at(3), movies[2]))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_document_blocks_watermark_until_replay_succeeds() {
    let harness = Harness::new();
    let mut movies = Vec::new();
    for minute in 0..50 {
        movies.push(harness.source.add_movie("movie", at(minute)).await);
    }
    harness.destination.fail_document_once(movies[17]).await;
    let pipeline = harness.pipeline();

    let first = pipeline.run_iteration().await.unwrap();

    assert_eq!(
        first.entity(EntityType::Movie).unwrap().status,
        EntitySyncStatus::Deferred
    );
    assert_eq!(first.entities.len(), 3);
    assert_eq!(harness.store.get("movies").await.unwrap(), None);
    assert_eq!(harness.memory.documents(TEST_MOVIES_INDEX).await.len(), 49);

    let second = pipeline.run_iteration().await.unwrap();

    assert_eq!(
        second.entity(EntityType::Movie).unwrap().status,
        EntitySyncStatus::CaughtUp
    );
    let calls = harness.destination.bulk_calls_for(TEST_MOVIES_INDEX).await;
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].ids.len(), 50);
    assert_eq!(harness.memory.documents(TEST_MOVIES_INDEX).await.len(), 50);
    assert_eq!(
        harness.store.get("movies").await.unwrap(),
        Some(Watermark::new(at(49), movies[49]))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_cascade_document_blocks_dimension_watermark() {
    let harness = Harness::new();
    let person = harness.source.add_person("Carrie Fisher", at(0)).await;
    let mut movies = Vec::new();
    for minute in 1..=3 {
        let movie = harness.source.add_movie("episode", at(minute)).await;
        harness.source.link_person(movie, person, "actor").await;
        movies.push(movie);
    }
    let pipeline = harness.builder().with_scan_limit(1).build();
    pipeline.run_iteration().await.unwrap();

    harness
        .source
        .rename_person(person, "Carrie F.", at(10))
        .await;
    harness.destination.fail_document_once(movies[2]).await;
    let first = pipeline.run_iteration().await.unwrap();

    let person_report = first.entity(EntityType::Person).unwrap();
    assert_eq!(person_report.status, EntitySyncStatus::Deferred);
    assert_eq!(person_report.documents_written, 2);
    assert_eq!(
        harness.store.get("persons").await.unwrap(),
        Some(Watermark::new(at(0), person))
    );
    assert_eq!(
        names(&harness.movie(movies[2]).await, "actors_names"),
        vec!["Carrie Fisher"]
    );

    let second = pipeline.run_iteration().await.unwrap();

    assert_eq!(
        second.entity(EntityType::Person).unwrap().status,
        EntitySyncStatus::CaughtUp
    );
    for movie in &movies {
        assert_eq!(
            names(&harness.movie(*movie).await, "actors_names"),
            vec!["Carrie F."]
        );
    }
    assert_eq!(
        harness.store.get("persons").await.unwrap(),
        Some(Watermark::new(at(10), person))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_during_movie_write_leaves_batch_uncommitted() {
    let harness = Harness::new();
    let movie = harness.source.add_movie("Solaris", at(0)).await;
    let pipeline = harness.pipeline();
    harness
        .destination
        .shutdown_after_next_write(pipeline.shutdown_tx())
        .await;

    let report = pipeline.run_iteration().await.unwrap();

    assert!(report.is_interrupted());
    assert_eq!(report.entities.len(), 1);
    assert_eq!(harness.movie(movie).await["title"], "Solaris");
    assert_eq!(harness.store.get("movies").await.unwrap(), None);

    // A fresh process replays the written but uncommitted batch.
    let restarted = harness.pipeline();
    let replay = restarted.run_iteration().await.unwrap();

    assert_eq!(replay.entity(EntityType::Movie).unwrap().rows_scanned, 1);
    assert_eq!(
        harness.store.get("movies").await.unwrap(),
        Some(Watermark::new(at(0), movie))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_during_cascade_write_commits_neither_cursor() {
    let harness = Harness::new();
    let genre = harness.source.add_genre("Noir", at(0)).await;
    let mut movies = Vec::new();
    for minute in 1..=3 {
        let movie = harness.source.add_movie("noir", at(minute)).await;
        harness.source.link_genre(movie, genre).await;
        movies.push(movie);
    }
    harness.pipeline().run_iteration().await.unwrap();
    harness.source.rename_genre(genre, "Neo-Noir", at(10)).await;
    let cascade_before = harness.store.get(CASCADE_WATERMARK_KEY).await.unwrap();

    let pipeline = harness.builder().with_scan_limit(1).build();
    harness
        .destination
        .shutdown_after_next_write(pipeline.shutdown_tx())
        .await;
    let report = pipeline.run_iteration().await.unwrap();

    let genre_report = report.entity(EntityType::Genre).unwrap();
    assert_eq!(genre_report.status, EntitySyncStatus::Interrupted);
    assert_eq!(genre_report.documents_written, 1);
    assert_eq!(harness.movie(movies[0]).await["genres"][0]["name"], "Neo-Noir");
    assert_eq!(
        harness.store.get("genres").await.unwrap(),
        Some(Watermark::new(at(0), genre))
    );
    assert_eq!(
        harness.store.get(CASCADE_WATERMARK_KEY).await.unwrap(),
        Some(Watermark::sentinel())
    );
    assert_ne!(cascade_before, Some(Watermark::sentinel()));
}

#[tokio::test(flavor = "multi_thread")]
async fn wiped_watermarks_resync_identical_documents() {
    let harness = Harness::new();
    let director = harness.source.add_person("Ridley Scott", at(0)).await;
    let genre = harness.source.add_genre("Horror", at(0)).await;
    for minute in 0..5 {
        let movie = harness.source.add_movie("Alien", at(minute)).await;
        harness.source.link_person(movie, director, "director").await;
        harness.source.link_genre(movie, genre).await;
    }
    let pipeline = harness.pipeline();
    pipeline.run_iteration().await.unwrap();
    let before = harness.memory.documents(TEST_MOVIES_INDEX).await;

    harness.store.clear().await;
    let report = pipeline.run_iteration().await.unwrap();

    assert_eq!(report.entity(EntityType::Movie).unwrap().rows_scanned, 5);
    let after = harness.memory.documents(TEST_MOVIES_INDEX).await;
    assert_eq!(after, before);
    for document in after.values() {
        assert_eq!(names(document, "directors_names"), vec!["Ridley Scott"]);
        assert_eq!(document["genres"].as_array().unwrap().len(), 1);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn replaying_without_changes_writes_nothing() {
    let harness = Harness::new();
    harness.source.add_movie("Heat", at(0)).await;
    let pipeline = harness.pipeline();
    pipeline.run_iteration().await.unwrap();
    let calls_before = harness.destination.bulk_calls().await.len();

    let report = pipeline.run_iteration().await.unwrap();

    assert_eq!(report.rows_scanned(), 0);
    assert_eq!(report.documents_written(), 0);
    assert_eq!(harness.destination.bulk_calls().await.len(), calls_before);
}

#[tokio::test(flavor = "multi_thread")]
async fn rows_sharing_a_timestamp_across_batches_are_not_skipped() {
    let harness = Harness::new();
    let mut movies = Vec::new();
    for _ in 0..5 {
        movies.push(harness.source.add_movie("same instant", at(0)).await);
    }
    let pipeline = harness.builder().with_scan_limit(2).build();

    let report = pipeline.run_iteration().await.unwrap();

    assert_eq!(report.entity(EntityType::Movie).unwrap().rows_scanned, 5);
    assert_eq!(harness.memory.documents(TEST_MOVIES_INDEX).await.len(), 5);

    let history = harness.store.history("movies").await;
    assert_eq!(history.len(), 3);
    assert!(history.windows(2).all(|pair| pair[0] < pair[1]));
}

#[tokio::test(flavor = "multi_thread")]
async fn cascade_pages_through_movies_sharing_a_timestamp() {
    let harness = Harness::new();
    let genre = harness.source.add_genre("Western", at(0)).await;
    let mut movies = Vec::new();
    for _ in 0..3 {
        let movie = harness.source.add_movie("western", at(1)).await;
        harness.source.link_genre(movie, genre).await;
        movies.push(movie);
    }
    let pipeline = harness.builder().with_scan_limit(2).build();
    pipeline.run_iteration().await.unwrap();

    harness.source.rename_genre(genre, "Spaghetti Western", at(5)).await;
    pipeline.run_iteration().await.unwrap();

    for movie in movies {
        assert_eq!(
            harness.movie(movie).await["genres"][0]["name"],
            "Spaghetti Western"
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn watermarks_only_move_forward() {
    let harness = Harness::new();
    for minute in [5, 1, 3, 2, 4] {
        harness.source.add_movie("movie", at(minute)).await;
    }
    let pipeline = harness.builder().with_scan_limit(1).build();
    pipeline.run_iteration().await.unwrap();

    let late = harness.source.add_movie("late", at(9)).await;
    pipeline.run_iteration().await.unwrap();

    let history = harness.store.history("movies").await;
    assert_eq!(history.len(), 6);
    assert!(history.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(history.last(), Some(&Watermark::new(at(9), late)));
}

#[tokio::test(flavor = "multi_thread")]
async fn dimension_documents_are_indexed_when_configured() {
    let harness = Harness::new();
    let movie = harness.source.add_movie("THX 1138", at(0)).await;
    let person = harness.source.add_person("George Lucas", at(0)).await;
    let genre = harness.source.add_genre("Sci-Fi", at(0)).await;
    harness.source.link_person(movie, person, "director").await;
    harness.source.link_person(movie, person, "writer").await;
    harness.source.link_genre(movie, genre).await;
    let pipeline = harness.builder().with_dimension_indices().build();
    pipeline.prepare().await.unwrap();

    pipeline.run_iteration().await.unwrap();

    let document = harness
        .memory
        .document(TEST_PERSONS_INDEX, &person.to_string())
        .await
        .unwrap();
    assert_eq!(document["full_name"], "George Lucas");
    assert_eq!(document["films"].as_array().unwrap().len(), 1);
    assert_eq!(
        document["films"][0]["roles"],
        serde_json::json!(["director", "writer"])
    );
    let genre_document = harness
        .memory
        .document(TEST_GENRES_INDEX, &genre.to_string())
        .await
        .unwrap();
    assert_eq!(genre_document["name"], "Sci-Fi");
    assert_eq!(
        genre_document["films"],
        serde_json::json!([{ "id": movie.to_string(), "title": "THX 1138" }])
    );
    assert_eq!(harness.destination.created_indices().await.len(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn connection_failures_are_retried() {
    let harness = Harness::new();
    let movie = harness.source.add_movie("Ronin", at(0)).await;
    harness.source.fail_next_queries(3).await;
    harness.destination.fail_next_requests(2).await;

    harness.pipeline().run_iteration().await.unwrap();

    assert_eq!(harness.movie(movie).await["title"], "Ronin");
    assert!(harness.source.query_count().await > 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn exhausted_retries_abort_the_run() {
    let harness = Harness::new();
    harness.source.add_movie("Ronin", at(0)).await;
    harness.source.fail_next_queries(100).await;

    let err = harness.pipeline().run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SourceConnectionFailed);
    assert_eq!(harness.store.get("movies").await.unwrap(), None);
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_before_run_commits_nothing() {
    let harness = Harness::new();
    harness.source.add_movie("Solaris", at(0)).await;
    let pipeline = harness.pipeline();
    pipeline.shutdown_tx().shutdown();

    let iterations = pipeline.run().await.unwrap();

    assert_eq!(iterations, 0);
    assert!(harness.destination.bulk_calls().await.is_empty());
    assert!(harness.store.snapshot().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_stops_an_unbounded_run() {
    let harness = Harness::new();
    let movie = harness.source.add_movie("Stalker", at(0)).await;
    let pipeline = harness
        .builder()
        .with_max_iterations(None)
        .with_poll_interval_ms(10)
        .build();
    let shutdown_tx = pipeline.shutdown_tx();

    let (result, _) = tokio::join!(pipeline.run(), async move {
        tokio::time::sleep(StdDuration::from_millis(100)).await;
        shutdown_tx.shutdown();
    });

    assert!(result.unwrap() >= 1);
    assert_eq!(harness.movie(movie).await["title"], "Stalker");

    pipeline.shutdown().await.unwrap();
    assert!(harness.destination.shutdown_called().await);
}

#[tokio::test(flavor = "multi_thread")]
async fn run_stops_after_max_iterations() {
    let harness = Harness::new();
    harness.source.add_movie("Zodiac", at(0)).await;
    let pipeline = harness.builder().with_max_iterations(Some(3)).build();

    assert_eq!(pipeline.run().await.unwrap(), 3);
}

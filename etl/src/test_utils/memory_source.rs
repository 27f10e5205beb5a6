use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{ErrorKind, EtlResult};
use crate::retry::RetryPolicy;
use crate::source::Source;
use crate::types::{
    ChangeRow, EntityId, EntityType, GenreFilmRow, JoinedRow, MovieRef, PersonCreditRow, Watermark,
};
use crate::{bail, etl_error};

#[derive(Debug, Clone)]
pub struct MovieRecord {
    pub id: EntityId,
    pub title: String,
    pub description: Option<String>,
    pub rating: Option<f64>,
    pub kind: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PersonRecord {
    pub id: EntityId,
    pub full_name: String,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct GenreEntry {
    pub id: EntityId,
    pub name: String,
    pub description: Option<String>,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct PersonLink {
    movie_id: EntityId,
    person_id: EntityId,
    role: String,
}

#[derive(Debug, Default)]
struct Tables {
    movies: BTreeMap<EntityId, MovieRecord>,
    persons: BTreeMap<EntityId, PersonRecord>,
    genres: BTreeMap<EntityId, GenreEntry>,
    person_links: Vec<PersonLink>,
    genre_links: Vec<(EntityId, EntityId)>,
    pending_connection_failures: u32,
    queries: u64,
}

impl Tables {
    fn changed_rows(&self, entity: EntityType) -> Vec<(DateTime<Utc>, EntityId)> {
        match entity {
            EntityType::Movie => self.movies.values().map(|m| (m.modified, m.id)).collect(),
            EntityType::Person => self.persons.values().map(|p| (p.modified, p.id)).collect(),
            EntityType::Genre => self.genres.values().map(|g| (g.modified, g.id)).collect(),
        }
    }

    fn linked_movie_ids(&self, entity: EntityType, ids: &BTreeSet<EntityId>) -> BTreeSet<EntityId> {
        match entity {
            EntityType::Person => self
                .person_links
                .iter()
                .filter(|link| ids.contains(&link.person_id))
                .map(|link| link.movie_id)
                .collect(),
            EntityType::Genre => self
                .genre_links
                .iter()
                .filter(|(_, genre_id)| ids.contains(genre_id))
                .map(|(movie_id, _)| *movie_id)
                .collect(),
            EntityType::Movie => BTreeSet::new(),
        }
    }
}

/// Keeps the content tables in memory and answers [`Source`] queries like the Postgres source.
///
/// Queries run under a [`RetryPolicy`], and [`MemorySource::fail_next_queries`] makes the next
/// queries fail with a connection error, which exercises the retry path.
#[derive(Debug, Clone)]
pub struct MemorySource {
    tables: Arc<Mutex<Tables>>,
    retry: RetryPolicy,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySource {
    pub fn new() -> Self {
        Self::with_retry(RetryPolicy::default())
    }

    pub fn with_retry(retry: RetryPolicy) -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            retry,
        }
    }

    /// Inserts a movie with only a title and returns its id.
    pub async fn add_movie(&self, title: &str, modified: DateTime<Utc>) -> EntityId {
        let id = Uuid::new_v4();
        self.insert_movie(MovieRecord {
            id,
            title: title.to_owned(),
            description: None,
            rating: None,
            kind: Some("movie".to_owned()),
            created: Some(modified),
            modified,
        })
        .await;

        id
    }

    pub async fn insert_movie(&self, movie: MovieRecord) {
        self.tables.lock().await.movies.insert(movie.id, movie);
    }

    pub async fn add_person(&self, full_name: &str, modified: DateTime<Utc>) -> EntityId {
        let id = Uuid::new_v4();
        self.insert_person(PersonRecord {
            id,
            full_name: full_name.to_owned(),
            modified,
        })
        .await;

        id
    }

    pub async fn insert_person(&self, person: PersonRecord) {
        self.tables.lock().await.persons.insert(person.id, person);
    }

    pub async fn add_genre(&self, name: &str, modified: DateTime<Utc>) -> EntityId {
        let id = Uuid::new_v4();
        self.insert_genre(GenreEntry {
            id,
            name: name.to_owned(),
            description: None,
            modified,
        })
        .await;

        id
    }

    pub async fn insert_genre(&self, genre: GenreEntry) {
        self.tables.lock().await.genres.insert(genre.id, genre);
    }

    pub async fn link_person(&self, movie_id: EntityId, person_id: EntityId, role: &str) {
        self.tables.lock().await.person_links.push(PersonLink {
            movie_id,
            person_id,
            role: role.to_owned(),
        });
    }

    pub async fn link_genre(&self, movie_id: EntityId, genre_id: EntityId) {
        self.tables
            .lock()
            .await
            .genre_links
            .push((movie_id, genre_id));
    }

    /// Renames a person and bumps its `modified` timestamp, like an edit in the admin panel.
    pub async fn rename_person(&self, id: EntityId, full_name: &str, modified: DateTime<Utc>) {
        if let Some(person) = self.tables.lock().await.persons.get_mut(&id) {
            person.full_name = full_name.to_owned();
            person.modified = modified;
        }
    }

    pub async fn rename_genre(&self, id: EntityId, name: &str, modified: DateTime<Utc>) {
        if let Some(genre) = self.tables.lock().await.genres.get_mut(&id) {
            genre.name = name.to_owned();
            genre.modified = modified;
        }
    }

    pub async fn retitle_movie(&self, id: EntityId, title: &str, modified: DateTime<Utc>) {
        if let Some(movie) = self.tables.lock().await.movies.get_mut(&id) {
            movie.title = title.to_owned();
            movie.modified = modified;
        }
    }

    /// Makes the next `count` queries fail with [`ErrorKind::SourceConnectionFailed`].
    pub async fn fail_next_queries(&self, count: u32) {
        self.tables.lock().await.pending_connection_failures = count;
    }

    /// Returns the number of query attempts, failed ones included.
    pub async fn query_count(&self) -> u64 {
        self.tables.lock().await.queries
    }

    async fn query<T, F>(&self, operation: &'static str, f: F) -> EtlResult<T>
    where
        F: Fn(&Tables) -> EtlResult<T>,
    {
        self.retry
            .run(operation, || async {
                let mut tables = self.tables.lock().await;
                tables.queries += 1;

                if tables.pending_connection_failures > 0 {
                    tables.pending_connection_failures -= 1;
                    return Err(etl_error!(
                        ErrorKind::SourceConnectionFailed,
                        "Injected connection failure"
                    ));
                }

                f(&tables)
            })
            .await
    }
}

impl Source for MemorySource {
    fn name() -> &'static str {
        "memory"
    }

    async fn scan_changes(
        &self,
        entity: EntityType,
        after: &Watermark,
        limit: u32,
    ) -> EtlResult<Vec<ChangeRow>> {
        self.query("scan changes", |tables| {
            let mut rows = tables.changed_rows(entity);
            rows.retain(|(modified, id)| after.precedes(*modified, *id));
            rows.sort();

            Ok(rows
                .into_iter()
                .take(limit as usize)
                .map(|(changed_at, id)| ChangeRow { id, changed_at })
                .collect())
        })
        .await
    }

    async fn linked_movies(
        &self,
        entity: EntityType,
        ids: &[EntityId],
        after: &Watermark,
        limit: u32,
    ) -> EtlResult<Vec<MovieRef>> {
        if !entity.is_dimension() {
            bail!(
                ErrorKind::InvalidState,
                "Movies are not linked through an association table"
            );
        }
        let ids: BTreeSet<EntityId> = ids.iter().copied().collect();

        self.query("resolve linked movies", |tables| {
            let mut movies: Vec<(DateTime<Utc>, EntityId)> = tables
                .linked_movie_ids(entity, &ids)
                .into_iter()
                .filter_map(|id| tables.movies.get(&id))
                .map(|movie| (movie.modified, movie.id))
                .filter(|(modified, id)| after.precedes(*modified, *id))
                .collect();
            movies.sort();

            Ok(movies
                .into_iter()
                .take(limit as usize)
                .map(|(changed_at, id)| MovieRef { id, changed_at })
                .collect())
        })
        .await
    }

    async fn movie_rows(&self, ids: &[EntityId]) -> EtlResult<Vec<JoinedRow>> {
        let ids: BTreeSet<EntityId> = ids.iter().copied().collect();

        self.query("load movie rows", |tables| {
            let mut movies: Vec<&MovieRecord> = tables
                .movies
                .values()
                .filter(|movie| ids.contains(&movie.id))
                .collect();
            movies.sort_by_key(|movie| (movie.modified, movie.id));

            let mut rows = Vec::new();
            for movie in movies {
                let credits: Vec<Option<&PersonLink>> = {
                    let links: Vec<_> = tables
                        .person_links
                        .iter()
                        .filter(|link| link.movie_id == movie.id)
                        .map(Some)
                        .collect();
                    if links.is_empty() { vec![None] } else { links }
                };
                let genres: Vec<Option<&GenreEntry>> = {
                    let linked: Vec<_> = tables
                        .genre_links
                        .iter()
                        .filter(|(movie_id, _)| *movie_id == movie.id)
                        .map(|(_, genre_id)| tables.genres.get(genre_id))
                        .collect();
                    if linked.is_empty() { vec![None] } else { linked }
                };

                for credit in &credits {
                    let person = credit.and_then(|link| tables.persons.get(&link.person_id));
                    for genre in &genres {
                        rows.push(JoinedRow {
                            movie_id: movie.id,
                            title: movie.title.clone(),
                            description: movie.description.clone(),
                            rating: movie.rating,
                            kind: movie.kind.clone(),
                            created: movie.created,
                            modified: movie.modified,
                            role: credit.map(|link| link.role.clone()),
                            person_id: person.map(|person| person.id),
                            full_name: person.map(|person| person.full_name.clone()),
                            genre_id: genre.map(|genre| genre.id),
                            genre_name: genre.map(|genre| genre.name.clone()),
                        });
                    }
                }
            }

            Ok(rows)
        })
        .await
    }

    async fn person_rows(&self, ids: &[EntityId]) -> EtlResult<Vec<PersonCreditRow>> {
        let ids: BTreeSet<EntityId> = ids.iter().copied().collect();

        self.query("load person rows", |tables| {
            let mut rows = Vec::new();
            for person in tables.persons.values().filter(|p| ids.contains(&p.id)) {
                let credits: Vec<(&PersonLink, &MovieRecord)> = tables
                    .person_links
                    .iter()
                    .filter(|link| link.person_id == person.id)
                    .filter_map(|link| tables.movies.get(&link.movie_id).map(|m| (link, m)))
                    .collect();

                if credits.is_empty() {
                    rows.push(PersonCreditRow {
                        person_id: person.id,
                        full_name: person.full_name.clone(),
                        movie_id: None,
                        title: None,
                        role: None,
                    });
                }
                for (link, movie) in credits {
                    rows.push(PersonCreditRow {
                        person_id: person.id,
                        full_name: person.full_name.clone(),
                        movie_id: Some(movie.id),
                        title: Some(movie.title.clone()),
                        role: Some(link.role.clone()),
                    });
                }
            }

            Ok(rows)
        })
        .await
    }

    async fn genre_rows(&self, ids: &[EntityId]) -> EtlResult<Vec<GenreFilmRow>> {
        let ids: BTreeSet<EntityId> = ids.iter().copied().collect();

        self.query("load genre rows", |tables| {
            let mut rows = Vec::new();
            for genre in tables.genres.values().filter(|g| ids.contains(&g.id)) {
                let mut movies: Vec<&MovieRecord> = tables
                    .genre_links
                    .iter()
                    .filter(|(_, genre_id)| *genre_id == genre.id)
                    .filter_map(|(movie_id, _)| tables.movies.get(movie_id))
                    .collect();
                movies.sort_by_key(|movie| (movie.modified, movie.id));

                if movies.is_empty() {
                    rows.push(GenreFilmRow {
                        genre_id: genre.id,
                        name: genre.name.clone(),
                        description: genre.description.clone(),
                        movie_id: None,
                        title: None,
                    });
                }
                for movie in movies {
                    rows.push(GenreFilmRow {
                        genre_id: genre.id,
                        name: genre.name.clone(),
                        description: genre.description.clone(),
                        movie_id: Some(movie.id),
                        title: Some(movie.title.clone()),
                    });
                }
            }

            Ok(rows)
        })
        .await
    }
}

//! Folding of flat joined rows into nested index documents.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::error::EtlResult;
use crate::source::Source;
use crate::types::{
    EntityId, GenreDocument, GenreFilmRow, JoinedRow, MovieDocument, PersonCreditRow,
    PersonDocument, PersonRole,
};

/// Loads joined rows from the source and folds them into documents keyed by id.
#[derive(Debug, Clone)]
pub struct Denormalizer<Src> {
    source: Src,
}

impl<Src> Denormalizer<Src>
where
    Src: Source,
{
    pub fn new(source: Src) -> Self {
        Self { source }
    }

    /// Builds one [`MovieDocument`] per movie of `ids` that still exists in the source.
    pub async fn denormalize(&self, ids: &[EntityId]) -> EtlResult<BTreeMap<EntityId, MovieDocument>> {
        let ids = distinct(ids);
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }

        let rows = self.source.movie_rows(&ids).await?;
        let documents = fold_movie_rows(rows);

        if documents.len() < ids.len() {
            debug!(
                requested = ids.len(),
                found = documents.len(),
                "some movies disappeared before denormalization"
            );
        }

        Ok(documents)
    }

    pub async fn denormalize_persons(
        &self,
        ids: &[EntityId],
    ) -> EtlResult<BTreeMap<EntityId, PersonDocument>> {
        let ids = distinct(ids);
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }

        let rows = self.source.person_rows(&ids).await?;

        Ok(fold_person_rows(rows))
    }

    pub async fn denormalize_genres(
        &self,
        ids: &[EntityId],
    ) -> EtlResult<BTreeMap<EntityId, GenreDocument>> {
        let ids = distinct(ids);
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }

        let rows = self.source.genre_rows(&ids).await?;

        Ok(fold_genre_rows(rows))
    }
}

fn distinct(ids: &[EntityId]) -> Vec<EntityId> {
    ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect()
}

fn parse_role(movie_id: EntityId, role: &str) -> Option<PersonRole> {
    let parsed = PersonRole::parse(role);
    if parsed.is_none() {
        warn!(%movie_id, role, "skipping credit with unknown role");
    }

    parsed
}

/// Folds joined movie rows into documents.
///
/// The first row of a movie provides its attributes. Every row then adds its genre, unless that
/// genre id is already listed, and its credited person under the matching role, unless a person
/// with the same name is already listed for that role.
pub fn fold_movie_rows(rows: impl IntoIterator<Item = JoinedRow>) -> BTreeMap<EntityId, MovieDocument> {
    let mut documents: BTreeMap<EntityId, MovieDocument> = BTreeMap::new();

    for row in rows {
        let document = documents
            .entry(row.movie_id)
            .or_insert_with(|| MovieDocument {
                id: row.movie_id,
                imdb_rating: row.rating.unwrap_or(0.0),
                title: row.title.clone(),
                description: row.description.clone(),
                kind: row.kind.clone(),
                created: row.created,
                modified: row.modified,
                genres: Vec::new(),
                directors: Vec::new(),
                actors: Vec::new(),
                writers: Vec::new(),
                directors_names: Vec::new(),
                actors_names: Vec::new(),
                writers_names: Vec::new(),
            });

        if let (Some(genre_id), Some(genre_name)) = (row.genre_id, row.genre_name.as_deref()) {
            document.add_genre(genre_id, genre_name);
        }

        if let (Some(role), Some(person_id), Some(full_name)) =
            (row.role.as_deref(), row.person_id, row.full_name.as_deref())
        {
            if let Some(role) = parse_role(row.movie_id, role) {
                document.add_person(role, person_id, full_name);
            }
        }
    }

    documents
}

/// Folds person credit rows into documents listing each film once with all of its roles.
pub fn fold_person_rows(
    rows: impl IntoIterator<Item = PersonCreditRow>,
) -> BTreeMap<EntityId, PersonDocument> {
    let mut documents: BTreeMap<EntityId, PersonDocument> = BTreeMap::new();

    for row in rows {
        let document = documents
            .entry(row.person_id)
            .or_insert_with(|| PersonDocument {
                id: row.person_id,
                full_name: row.full_name.clone(),
                films: Vec::new(),
            });

        if let (Some(movie_id), Some(title)) = (row.movie_id, row.title.as_deref()) {
            let role = row
                .role
                .as_deref()
                .and_then(|role| parse_role(movie_id, role));
            document.add_credit(movie_id, title, role);
        }
    }

    documents
}

/// Folds genre rows into documents listing each tagged movie once.
pub fn fold_genre_rows(
    rows: impl IntoIterator<Item = GenreFilmRow>,
) -> BTreeMap<EntityId, GenreDocument> {
    let mut documents: BTreeMap<EntityId, GenreDocument> = BTreeMap::new();

    for row in rows {
        let document = documents
            .entry(row.genre_id)
            .or_insert_with(|| GenreDocument {
                id: row.genre_id,
                name: row.name.clone(),
                description: row.description.clone(),
                films: Vec::new(),
            });

        if let (Some(movie_id), Some(title)) = (row.movie_id, row.title.as_deref()) {
            document.add_film(movie_id, title);
        }
    }

    documents
}

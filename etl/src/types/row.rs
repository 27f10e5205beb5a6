use chrono::{DateTime, Utc};
use movies_postgres::content::{ChangedRow, FilmWorkJoinRow, GenreJoinRow, PersonJoinRow};

use crate::types::{EntityId, Watermark};

/// A source row changed after the entity watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeRow {
    pub id: EntityId,
    pub changed_at: DateTime<Utc>,
}

impl ChangeRow {
    pub fn watermark(&self) -> Watermark {
        Watermark::new(self.changed_at, self.id)
    }
}

impl From<ChangedRow> for ChangeRow {
    fn from(row: ChangedRow) -> Self {
        Self {
            id: row.id,
            changed_at: row.modified,
        }
    }
}

/// A movie reached through a changed person or genre.
///
/// The same movie may show up again in a later cascade batch when it changes in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovieRef {
    pub id: EntityId,
    pub changed_at: DateTime<Utc>,
}

impl MovieRef {
    pub fn watermark(&self) -> Watermark {
        Watermark::new(self.changed_at, self.id)
    }
}

impl From<ChangedRow> for MovieRef {
    fn from(row: ChangedRow) -> Self {
        Self {
            id: row.id,
            changed_at: row.modified,
        }
    }
}

/// One row of the movie join: the movie attributes with at most one credited person and at most
/// one genre. A movie with several people and genres spans many rows.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRow {
    pub movie_id: EntityId,
    pub title: String,
    pub description: Option<String>,
    pub rating: Option<f64>,
    pub kind: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub modified: DateTime<Utc>,
    pub role: Option<String>,
    pub person_id: Option<EntityId>,
    pub full_name: Option<String>,
    pub genre_id: Option<EntityId>,
    pub genre_name: Option<String>,
}

impl From<FilmWorkJoinRow> for JoinedRow {
    fn from(row: FilmWorkJoinRow) -> Self {
        Self {
            movie_id: row.film_work_id,
            title: row.title,
            description: row.description,
            rating: row.rating,
            kind: row.kind,
            created: row.created,
            modified: row.modified,
            role: row.role,
            person_id: row.person_id,
            full_name: row.full_name,
            genre_id: row.genre_id,
            genre_name: row.genre_name,
        }
    }
}

/// A person with at most one of the movies they are credited on.
#[derive(Debug, Clone, PartialEq)]
pub struct PersonCreditRow {
    pub person_id: EntityId,
    pub full_name: String,
    pub movie_id: Option<EntityId>,
    pub title: Option<String>,
    pub role: Option<String>,
}

impl From<PersonJoinRow> for PersonCreditRow {
    fn from(row: PersonJoinRow) -> Self {
        Self {
            person_id: row.person_id,
            full_name: row.full_name,
            movie_id: row.film_work_id,
            title: row.title,
            role: row.role,
        }
    }
}

/// A genre with at most one of the movies tagged with it.
#[derive(Debug, Clone, PartialEq)]
pub struct GenreFilmRow {
    pub genre_id: EntityId,
    pub name: String,
    pub description: Option<String>,
    pub movie_id: Option<EntityId>,
    pub title: Option<String>,
}

impl From<GenreJoinRow> for GenreFilmRow {
    fn from(row: GenreJoinRow) -> Self {
        Self {
            genre_id: row.genre_id,
            name: row.name,
            description: row.description,
            movie_id: row.film_work_id,
            title: row.title,
        }
    }
}

use std::future::Future;

use crate::error::EtlResult;
use crate::types::{
    ChangeRow, EntityId, EntityType, GenreFilmRow, JoinedRow, MovieRef, PersonCreditRow, Watermark,
};

/// The relational store holding movies, persons, genres and their links.
///
/// Every cursor-based query returns rows sorting strictly after the given watermark in ascending
/// `(changed_at, id)` order, at most `limit` of them.
pub trait Source {
    /// Returns the name of the source.
    fn name() -> &'static str;

    /// Returns rows of `entity` changed after `after`.
    fn scan_changes(
        &self,
        entity: EntityType,
        after: &Watermark,
        limit: u32,
    ) -> impl Future<Output = EtlResult<Vec<ChangeRow>>> + Send;

    /// Returns distinct movies linked to any of `ids` of the dimension `entity` and changed after
    /// `after`, ordered by the movie cursor.
    fn linked_movies(
        &self,
        entity: EntityType,
        ids: &[EntityId],
        after: &Watermark,
        limit: u32,
    ) -> impl Future<Output = EtlResult<Vec<MovieRef>>> + Send;

    /// Returns every joined row of the given movies.
    fn movie_rows(&self, ids: &[EntityId])
    -> impl Future<Output = EtlResult<Vec<JoinedRow>>> + Send;

    /// Returns every credit row of the given persons.
    fn person_rows(
        &self,
        ids: &[EntityId],
    ) -> impl Future<Output = EtlResult<Vec<PersonCreditRow>>> + Send;

    /// Returns every genre of `ids` joined with the movies tagged with it.
    fn genre_rows(&self, ids: &[EntityId])
    -> impl Future<Output = EtlResult<Vec<GenreFilmRow>>> + Send;

    /// Releases the connections of the source. The default implementation is a no-op.
    fn close(&self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

use chrono::{DateTime, Utc};
use sqlx::prelude::FromRow;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::schema::{ContentSchema, ContentTable};

/// Position of the last synchronized row: its change timestamp and, when known, its id.
///
/// Rows strictly after the cursor in `(modified, id)` order are returned by the change and cascade
/// queries. Without an id the comparison falls back to `modified` alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowCursor {
    pub modified: DateTime<Utc>,
    pub id: Option<Uuid>,
}

/// A changed row of `film_work`, `person` or `genre`, or a movie reached through a cascade.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ChangedRow {
    pub id: Uuid,
    pub modified: DateTime<Utc>,
}

/// One row of the movie join: a movie with at most one person role and at most one genre.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct FilmWorkJoinRow {
    pub film_work_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub rating: Option<f64>,
    pub kind: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub modified: DateTime<Utc>,
    pub role: Option<String>,
    pub person_id: Option<Uuid>,
    pub full_name: Option<String>,
    pub genre_id: Option<Uuid>,
    pub genre_name: Option<String>,
}

/// One row of the person join: a person with at most one film and role.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct PersonJoinRow {
    pub person_id: Uuid,
    pub full_name: String,
    pub film_work_id: Option<Uuid>,
    pub title: Option<String>,
    pub role: Option<String>,
}

/// One row of the genre join: a genre with at most one film.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct GenreJoinRow {
    pub genre_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub film_work_id: Option<Uuid>,
    pub title: Option<String>,
}

/// Returns up to `limit` rows of `table` changed after `cursor`, ordered by `(modified, id)`.
pub async fn get_changed_rows(
    pool: &PgPool,
    schema: &ContentSchema,
    table: ContentTable,
    cursor: RowCursor,
    limit: i64,
) -> sqlx::Result<Vec<ChangedRow>> {
    let statement = format!(
        r#"
        select id, modified
        from {table}
        where modified > $1 or (modified = $1 and $2::uuid is not null and id > $2)
        order by modified, id
        limit $3
        "#,
        table = schema.table(table),
    );

    sqlx::query_as::<Postgres, ChangedRow>(&statement)
        .bind(cursor.modified)
        .bind(cursor.id)
        .bind(limit)
        .fetch_all(pool)
        .await
}

/// Returns up to `limit` distinct movies linked through `association` to any of `ids` and
/// changed after `cursor`, ordered by the movie's `(modified, id)`.
///
/// `association` is either [`ContentTable::PersonFilmWork`] or [`ContentTable::GenreFilmWork`].
pub async fn get_linked_film_works(
    pool: &PgPool,
    schema: &ContentSchema,
    association: ContentTable,
    ids: &[Uuid],
    cursor: RowCursor,
    limit: i64,
) -> sqlx::Result<Vec<ChangedRow>> {
    let foreign_key = match association {
        ContentTable::PersonFilmWork => "person_id",
        ContentTable::GenreFilmWork => "genre_id",
        other => {
            return Err(sqlx::Error::Protocol(format!(
                "table `{other}` does not link movies to another entity"
            )));
        }
    };

    let statement = format!(
        r#"
        select distinct fw.id, fw.modified
        from {film_work} fw
        join {association} link on link.film_work_id = fw.id
        where link.{foreign_key} = any($1)
          and (fw.modified > $2 or (fw.modified = $2 and $3::uuid is not null and fw.id > $3))
        order by fw.modified, fw.id
        limit $4
        "#,
        film_work = schema.table(ContentTable::FilmWork),
        association = schema.table(association),
    );

    sqlx::query_as::<Postgres, ChangedRow>(&statement)
        .bind(ids)
        .bind(cursor.modified)
        .bind(cursor.id)
        .bind(limit)
        .fetch_all(pool)
        .await
}

/// Returns every joined row of the given movies, with people and genres outer-joined.
pub async fn get_film_work_rows(
    pool: &PgPool,
    schema: &ContentSchema,
    film_work_ids: &[Uuid],
) -> sqlx::Result<Vec<FilmWorkJoinRow>> {
    let statement = format!(
        r#"
        select
            fw.id as film_work_id,
            fw.title,
            fw.description,
            fw.rating::float8 as rating,
            fw.type::text as kind,
            fw.created,
            fw.modified,
            pfw.role::text as role,
            p.id as person_id,
            p.full_name,
            g.id as genre_id,
            g.name as genre_name
        from {film_work} fw
        left join {person_film_work} pfw on pfw.film_work_id = fw.id
        left join {person} p on p.id = pfw.person_id
        left join {genre_film_work} gfw on gfw.film_work_id = fw.id
        left join {genre} g on g.id = gfw.genre_id
        where fw.id = any($1)
        order by fw.modified, fw.id, pfw.role, p.full_name, p.id, g.name, g.id
        "#,
        film_work = schema.table(ContentTable::FilmWork),
        person_film_work = schema.table(ContentTable::PersonFilmWork),
        person = schema.table(ContentTable::Person),
        genre_film_work = schema.table(ContentTable::GenreFilmWork),
        genre = schema.table(ContentTable::Genre),
    );

    sqlx::query_as::<Postgres, FilmWorkJoinRow>(&statement)
        .bind(film_work_ids)
        .fetch_all(pool)
        .await
}

/// Returns every person of `person_ids` joined with the movies they took part in.
pub async fn get_person_rows(
    pool: &PgPool,
    schema: &ContentSchema,
    person_ids: &[Uuid],
) -> sqlx::Result<Vec<PersonJoinRow>> {
    let statement = format!(
        r#"
        select
            p.id as person_id,
            p.full_name,
            fw.id as film_work_id,
            fw.title,
            pfw.role::text as role
        from {person} p
        left join {person_film_work} pfw on pfw.person_id = p.id
        left join {film_work} fw on fw.id = pfw.film_work_id
        where p.id = any($1)
        order by p.id, fw.modified, fw.id, pfw.role
        "#,
        person = schema.table(ContentTable::Person),
        person_film_work = schema.table(ContentTable::PersonFilmWork),
        film_work = schema.table(ContentTable::FilmWork),
    );

    sqlx::query_as::<Postgres, PersonJoinRow>(&statement)
        .bind(person_ids)
        .fetch_all(pool)
        .await
}

/// Returns every genre of `genre_ids` joined with the movies tagged with it.
pub async fn get_genre_rows(
    pool: &PgPool,
    schema: &ContentSchema,
    genre_ids: &[Uuid],
) -> sqlx::Result<Vec<GenreJoinRow>> {
    let statement = format!(
        r#"
        select
            g.id as genre_id,
            g.name,
            g.description,
            fw.id as film_work_id,
            fw.title
        from {genre} g
        left join {genre_film_work} gfw on gfw.genre_id = g.id
        left join {film_work} fw on fw.id = gfw.film_work_id
        where g.id = any($1)
        order by g.id, fw.modified, fw.id
        "#,
        genre = schema.table(ContentTable::Genre),
        genre_film_work = schema.table(ContentTable::GenreFilmWork),
        film_work = schema.table(ContentTable::FilmWork),
    );

    sqlx::query_as::<Postgres, GenreJoinRow>(&statement)
        .bind(genre_ids)
        .fetch_all(pool)
        .await
}

use std::fmt;

use movies_postgres::schema::ContentTable;

/// Identifier of every row in the content tables.
pub type EntityId = uuid::Uuid;

/// Watermark key of the cascade cursor shared by the person and genre cycles.
pub const CASCADE_WATERMARK_KEY: &str = "tmp_date";

/// The kinds of source rows whose changes are tracked.
///
/// Movies are indexed directly. Persons and genres are dimensions: a change to one of them is
/// propagated to the movies that reference it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityType {
    Movie,
    Person,
    Genre,
}

impl EntityType {
    /// Every entity type in the order a sync iteration visits them.
    pub const ALL: [EntityType; 3] = [EntityType::Movie, EntityType::Person, EntityType::Genre];

    /// Table holding the rows of this entity.
    pub fn table(&self) -> ContentTable {
        match self {
            EntityType::Movie => ContentTable::FilmWork,
            EntityType::Person => ContentTable::Person,
            EntityType::Genre => ContentTable::Genre,
        }
    }

    /// Table linking this entity to movies, `None` for movies themselves.
    pub fn association(&self) -> Option<ContentTable> {
        match self {
            EntityType::Movie => None,
            EntityType::Person => Some(ContentTable::PersonFilmWork),
            EntityType::Genre => Some(ContentTable::GenreFilmWork),
        }
    }

    /// Key under which the entity watermark is persisted.
    pub fn watermark_key(&self) -> &'static str {
        match self {
            EntityType::Movie => "movies",
            EntityType::Person => "persons",
            EntityType::Genre => "genres",
        }
    }

    pub fn is_dimension(&self) -> bool {
        self.association().is_some()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Movie => "movie",
            EntityType::Person => "person",
            EntityType::Genre => "genre",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

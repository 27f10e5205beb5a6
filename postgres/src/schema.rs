use pg_escape::quote_identifier;
use std::fmt;

/// Tables of the content schema that take part in the sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentTable {
    FilmWork,
    Person,
    Genre,
    PersonFilmWork,
    GenreFilmWork,
}

impl ContentTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentTable::FilmWork => "film_work",
            ContentTable::Person => "person",
            ContentTable::Genre => "genre",
            ContentTable::PersonFilmWork => "person_film_work",
            ContentTable::GenreFilmWork => "genre_film_work",
        }
    }
}

impl fmt::Display for ContentTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A schema name, quoted once so it can be embedded in statements.
///
/// Table and schema names cannot be bound as parameters, so they are the only part of a
/// statement built with string formatting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSchema {
    quoted: String,
}

impl ContentSchema {
    pub fn new(name: &str) -> Self {
        Self {
            quoted: quote_identifier(name).into_owned(),
        }
    }

    /// Returns the fully qualified and quoted name of `table`.
    pub fn table(&self, table: ContentTable) -> String {
        format!("{}.{}", self.quoted, quote_identifier(table.as_str()))
    }
}

impl Default for ContentSchema {
    fn default() -> Self {
        Self::new("content")
    }
}

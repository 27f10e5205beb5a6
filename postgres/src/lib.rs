//! Postgres access for the movies content schema.
//!
//! Holds the row types returned by the source database and the parameterized queries used to
//! detect changes, resolve affected movies and fetch the rows that are folded into documents.

pub mod content;
pub mod schema;

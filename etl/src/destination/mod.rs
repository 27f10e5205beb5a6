//! Search index destinations and the typed writer on top of them.
//!
//! A [`Destination`] speaks to one search backend in terms of JSON documents keyed by string ids.
//! [`writer::IndexWriter`] sits above it: it serializes typed documents, retries connection
//! failures and turns per-document rejections into errors that keep watermarks in place.

mod base;
pub mod elasticsearch;
pub mod memory;
pub mod writer;

pub use base::{BulkOutcome, Destination, DocumentFailure, IndexDocument};

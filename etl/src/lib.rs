//! Incremental sync of a relational movie catalog into a document search index.
//!
//! The [`pipeline::Pipeline`] polls the content tables for rows changed after the persisted
//! [`types::Watermark`] of each [`types::EntityType`], cascades person and genre changes to the
//! movies embedding them, folds joined rows into nested documents and upserts them through a
//! [`destination::Destination`]. Watermarks live in a [`store::WatermarkStore`] and only move once
//! the index acknowledged a batch.

pub mod cascade;
pub mod concurrency;
pub mod denormalize;
pub mod destination;
pub mod error;
mod macros;
pub mod pipeline;
pub mod retry;
pub mod scan;
pub mod source;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;

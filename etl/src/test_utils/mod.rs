//! Test doubles and helpers for exercising the sync loop without Postgres or Elasticsearch.
//!
//! - [`memory_source`] holds content tables in memory and answers the same queries as the
//!   Postgres source, with injectable connection failures.
//! - [`test_destination_wrapper`] records bulk writes and injects rejected documents or failed
//!   requests into any destination.
//! - [`pipeline`] builds pipelines with test-friendly configuration.
//! - [`tracing`] installs a log subscriber for tests.

pub mod memory_source;
pub mod pipeline;
pub mod test_destination_wrapper;
pub mod tracing;

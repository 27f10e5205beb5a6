//! Read access to the relational content store.

mod base;
pub mod postgres;

pub use base::Source;

//! Coordination primitives shared by the sync loop and the process wiring.
//!
//! The [`shutdown`] module exposes a broadcast-style shutdown signal. The pipeline races every
//! source query, index write and poll sleep against it, so a stop request takes effect at the next
//! suspension point without committing further watermarks.

pub mod shutdown;

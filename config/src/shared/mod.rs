mod base;
mod connection;
mod destination;
mod index;
mod log;
mod pipeline;
mod replicator;
mod retry;
mod state_store;

pub use base::*;
pub use connection::*;
pub use destination::*;
pub use index::*;
pub use log::*;
pub use pipeline::*;
pub use replicator::*;
pub use retry::*;
pub use state_store::*;

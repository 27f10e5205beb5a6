//! Configuration records shared by the sync engine and the replicator binary.
//!
//! Every record is deserialized with serde and validated explicitly by the caller, so that a
//! single [`shared::ReplicatorConfig`] can be built once at startup and passed by reference into
//! each component.

mod environment;
mod load;
mod secret;
pub mod shared;

pub use environment::Environment;
pub use load::{Config, LoadConfigError, load_config, load_config_from};
pub use secret::SerializableSecretString;

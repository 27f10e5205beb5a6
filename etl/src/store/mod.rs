//! Durable registries of sync watermarks.

pub mod base;
pub mod file;
pub mod memory;

pub use base::WatermarkStore;
pub use file::FileWatermarkStore;
pub use memory::MemoryWatermarkStore;

//! Domain types shared by the sync components.

mod document;
mod entity;
mod row;
mod watermark;

pub use document::*;
pub use entity::*;
pub use row::*;
pub use watermark::*;

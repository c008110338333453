//! Timeline data structures, serialization and storage

mod events;
mod format;
mod store;

pub use events::*;
pub use format::*;
pub use store::*;

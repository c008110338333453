//! Input capture: OS hooks, event routing and the capture engine

mod backend;
mod engine;
pub mod permissions;
pub(crate) mod rdev_backend;
mod router;

pub use backend::*;
pub use engine::*;
pub use router::*;

#[cfg(test)]
pub(crate) use engine::testing;

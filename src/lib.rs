//! input-recorder core
//!
//! Records OS-level mouse and keyboard input into timelines and replays them
//! with the original timing. The [`session::SessionController`] is the entry
//! point for any shell, headless or graphical.

pub mod config;
pub mod data;
pub mod input;
pub mod logging;
pub mod playback;
pub mod session;

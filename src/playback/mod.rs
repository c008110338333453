//! Playback: replaying timelines as synthetic OS input

mod player;
mod synth;

pub use player::*;
pub use synth::*;

#[cfg(test)]
pub(crate) use synth::testing;

use thiserror::Error;

/// Per-event playback failures. These never abort a playback run.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("unsupported key {0:?}")]
    UnsupportedEvent(String),

    #[error(transparent)]
    Synthesis(#[from] SynthError),
}

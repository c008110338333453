//! Input synthesis backends

use thiserror::Error;

#[derive(Debug, Error)]
#[error("OS rejected synthetic {event:?}")]
pub struct SynthError {
    pub event: rdev::EventType,
}

/// Something that can inject input events into the OS
pub trait InputSynth: Send + Sync {
    fn synthesize(&self, event: &rdev::EventType) -> Result<(), SynthError>;
}

/// Synthesizes through `rdev::simulate`
#[derive(Debug, Default)]
pub struct RdevSynth;

impl RdevSynth {
    pub fn new() -> Self {
        Self
    }
}

impl InputSynth for RdevSynth {
    fn synthesize(&self, event: &rdev::EventType) -> Result<(), SynthError> {
        rdev::simulate(event).map_err(|_| SynthError { event: *event })
    }
}

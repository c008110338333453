use std::fmt;
use thiserror::Error;

use crate::data::StoreError;
use crate::input::CaptureError;

use super::SessionState;

/// Controller operations, named in rejection errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ToggleRecording,
    StopRecording,
    TogglePlayback,
    SetCaptureMode,
    SetSuppressOutgoing,
    Save,
    Load,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::ToggleRecording => "toggle recording",
            Operation::StopRecording => "stop recording",
            Operation::TogglePlayback => "toggle playback",
            Operation::SetCaptureMode => "change capture mode",
            Operation::SetSuppressOutgoing => "change input suppression",
            Operation::Save => "save",
            Operation::Load => "load",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// The operation is not valid in the current state; nothing changed
    #[error("cannot {requested} while {state}")]
    ConflictingOperation {
        requested: Operation,
        state: SessionState,
    },

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no recording to play")]
    NothingToPlay,

    #[error("the timeline is empty")]
    NothingToSave,

    #[error("invalid setting: {0}")]
    InvalidSetting(String),
}

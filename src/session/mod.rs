//! Session controller - owns the recorder state machine
//!
//! The controller is the only thing that moves between Idle, CountdownPending,
//! Recording and Playing. It is fed by the hotkey hook and the shell through a
//! command channel and reports progress on a broadcast channel.

mod controller;
mod error;

pub use controller::SessionController;
pub use error::{Operation, SessionError};

use std::fmt;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::input::{CaptureMode, HotkeyAction, HotkeyBindings};
use crate::playback::PlaybackReport;

/// Longest countdown that can be configured
pub const MAX_COUNTDOWN_SECS: u32 = 10;

/// Recorder state. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    CountdownPending,
    Recording,
    Playing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::CountdownPending => write!(f, "countdown"),
            SessionState::Recording => write!(f, "recording"),
            SessionState::Playing => write!(f, "playing"),
        }
    }
}

/// Commands that can be sent to the session controller
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    /// A reserved hotkey was pressed
    Hotkey(HotkeyAction),
    /// Abort whatever is running
    StopAll,
    /// Stop everything and leave the command loop
    Shutdown,
}

/// Status updates from the session controller
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStatus {
    StateChanged(SessionState),
    /// Seconds left before recording starts
    Countdown { remaining: u32 },
    /// A recording was finalized into the working timeline
    RecordingFinished { event_count: usize },
    PlaybackFinished(PlaybackReport),
    /// A background task failed
    Error(String),
}

/// Capture and countdown settings applied to the next recording
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSettings {
    pub capture_mode: CaptureMode,
    pub suppress_outgoing: bool,
    pub countdown_secs: u32,
    pub hotkeys: HotkeyBindings,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            capture_mode: CaptureMode::Observe,
            suppress_outgoing: false,
            countdown_secs: 3,
            hotkeys: HotkeyBindings::default(),
        }
    }
}

impl SessionSettings {
    /// Settings from a validated configuration
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            capture_mode: config.recording.capture_mode,
            suppress_outgoing: config.recording.suppress_outgoing,
            countdown_secs: config.recording.countdown_secs,
            hotkeys: config.hotkeys.bindings()?,
        })
    }
}

/// Create the command channel shared by the hotkey hook and the shell
pub fn create_session_channel() -> (
    mpsc::UnboundedSender<SessionCommand>,
    mpsc::UnboundedReceiver<SessionCommand>,
) {
    mpsc::unbounded_channel()
}

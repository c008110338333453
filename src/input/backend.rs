//! Input hook trait and capture mode selection

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use super::HookRouter;

/// How OS input notifications are subscribed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Non-blocking global listener; cannot stop events reaching other applications
    #[default]
    Observe,
    /// Blocking hook whose callback decides whether the OS keeps delivering each event
    Intercept,
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureMode::Observe => write!(f, "observe"),
            CaptureMode::Intercept => write!(f, "intercept"),
        }
    }
}

/// Capture engine errors
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to install {mode} input hook: {reason}")]
    HookInstallFailed { mode: CaptureMode, reason: String },
}

/// An OS-level input hook.
///
/// Installed hooks run for the rest of the process and route every notification
/// through the [`HookRouter`]; whether anything is recorded is decided there.
pub trait InputHook: Send + Sync {
    /// The capture mode this hook implements
    fn mode(&self) -> CaptureMode;

    /// Install the hook. Returns once the hook is running or has failed.
    fn install(&self, router: Arc<HookRouter>) -> Result<(), CaptureError>;
}

/// Create the input hook implementing `mode` for the current platform
pub fn create_input_hook(mode: CaptureMode) -> Box<dyn InputHook> {
    match mode {
        CaptureMode::Observe => {
            tracing::debug!("Using rdev listen hook for observe-only capture");
            Box::new(super::rdev_backend::ObserveHook::new())
        }
        CaptureMode::Intercept => {
            tracing::debug!("Using rdev grab hook for intercept-capable capture");
            Box::new(super::rdev_backend::InterceptHook::new())
        }
    }
}

//! rdev-based input hooks
//! Works on Windows, macOS, and Linux (X11; grab additionally needs evdev access)

use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};

use super::permissions::describe_missing_permissions;
use super::{CaptureError, CaptureMode, Decision, HookRouter, InputHook};

/// How long a freshly spawned hook thread gets to report an install failure.
/// rdev's listen/grab block for the lifetime of the hook, so silence past this
/// point means the hook is running.
const INSTALL_GRACE: Duration = Duration::from_millis(300);

/// Observe-only hook over `rdev::listen`
pub struct ObserveHook;

impl ObserveHook {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ObserveHook {
    fn default() -> Self {
        Self::new()
    }
}

impl InputHook for ObserveHook {
    fn mode(&self) -> CaptureMode {
        CaptureMode::Observe
    }

    fn install(&self, router: Arc<HookRouter>) -> Result<(), CaptureError> {
        spawn_hook(CaptureMode::Observe, move || {
            let callback = move |event: rdev::Event| {
                router.handle(CaptureMode::Observe, &event.event_type);
            };
            rdev::listen(callback).map_err(|e| format!("{:?}", e))
        })
    }
}

/// Intercept-capable hook over `rdev::grab`
pub struct InterceptHook;

impl InterceptHook {
    pub fn new() -> Self {
        Self
    }
}

impl Default for InterceptHook {
    fn default() -> Self {
        Self::new()
    }
}

impl InputHook for InterceptHook {
    fn mode(&self) -> CaptureMode {
        CaptureMode::Intercept
    }

    fn install(&self, router: Arc<HookRouter>) -> Result<(), CaptureError> {
        spawn_hook(CaptureMode::Intercept, move || {
            let callback = move |event: rdev::Event| -> Option<rdev::Event> {
                match router.handle(CaptureMode::Intercept, &event.event_type) {
                    Decision::PassThrough => Some(event),
                    Decision::Swallow => None,
                }
            };
            rdev::grab(callback).map_err(|e| format!("{:?}", e))
        })
    }
}

/// Run a blocking hook on its own thread and wait briefly for it to fail
fn spawn_hook<F>(mode: CaptureMode, run: F) -> Result<(), CaptureError>
where
    F: FnOnce() -> Result<(), String> + Send + 'static,
{
    let (failure_tx, failure_rx) = std_mpsc::channel::<String>();

    thread::Builder::new()
        .name(format!("input-hook-{}", mode))
        .spawn(move || {
            info!("rdev {} hook started", mode);
            let reason = match run() {
                Ok(()) => "hook exited unexpectedly".to_string(),
                Err(reason) => reason,
            };
            error!("rdev {} hook error: {}", mode, reason);
            let _ = failure_tx.send(reason);
        })
        .map_err(|e| CaptureError::HookInstallFailed {
            mode,
            reason: format!("could not spawn hook thread: {}", e),
        })?;

    match failure_rx.recv_timeout(INSTALL_GRACE) {
        Err(std_mpsc::RecvTimeoutError::Timeout) => {
            debug!("{} input hook running after grace period", mode);
            Ok(())
        }
        Ok(reason) => Err(install_failure(mode, reason)),
        Err(std_mpsc::RecvTimeoutError::Disconnected) => Err(install_failure(
            mode,
            "hook thread exited without reporting".to_string(),
        )),
    }
}

fn install_failure(mode: CaptureMode, reason: String) -> CaptureError {
    let missing = describe_missing_permissions(mode);
    let reason = if missing.is_empty() {
        reason
    } else {
        format!("{} ({})", reason, missing.join("; "))
    };
    CaptureError::HookInstallFailed { mode, reason }
}

//! Capture engine: installs hooks on demand and attaches capture sessions

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::data::Timeline;

use super::{
    create_input_hook, ActiveCapture, CaptureError, CaptureMode, HookRouter, InputHook,
};

/// Owns the OS hooks and the router they feed.
///
/// Hooks cannot be removed once running, so each mode's hook is installed at
/// most once; `start`/`stop` attach and detach the capture session instead.
pub struct CaptureEngine {
    router: Arc<HookRouter>,
    observe: Box<dyn InputHook>,
    intercept: Box<dyn InputHook>,
    installed: HashSet<CaptureMode>,
}

impl CaptureEngine {
    /// Create an engine backed by the platform hooks
    pub fn new(router: Arc<HookRouter>) -> Self {
        Self::with_hooks(
            router,
            create_input_hook(CaptureMode::Observe),
            create_input_hook(CaptureMode::Intercept),
        )
    }

    /// Create an engine with explicit hook implementations
    pub fn with_hooks(
        router: Arc<HookRouter>,
        observe: Box<dyn InputHook>,
        intercept: Box<dyn InputHook>,
    ) -> Self {
        Self {
            router,
            observe,
            intercept,
            installed: HashSet::new(),
        }
    }

    pub fn router(&self) -> &Arc<HookRouter> {
        &self.router
    }

    pub fn is_installed(&self, mode: CaptureMode) -> bool {
        self.installed.contains(&mode)
    }

    /// Install the hook for `mode` unless it is already running
    pub fn ensure_installed(&mut self, mode: CaptureMode) -> Result<(), CaptureError> {
        if self.installed.contains(&mode) {
            return Ok(());
        }

        let hook = match mode {
            CaptureMode::Observe => &self.observe,
            CaptureMode::Intercept => &self.intercept,
        };
        debug_assert_eq!(hook.mode(), mode);

        hook.install(self.router.clone())?;
        self.installed.insert(mode);
        info!("Installed {} hook", mode);
        Ok(())
    }

    /// Start capturing into a fresh timeline
    pub fn start(&mut self, mode: CaptureMode, suppress_outgoing: bool) -> Result<(), CaptureError> {
        self.ensure_installed(mode)?;

        if mode == CaptureMode::Observe && suppress_outgoing {
            debug!("suppress_outgoing has no effect in observe mode");
        }

        self.router.begin(ActiveCapture {
            mode,
            suppress_outgoing,
        });
        Ok(())
    }

    /// Stop capturing and hand back the finished timeline.
    /// Returns None if no capture was active.
    pub fn stop(&mut self) -> Option<Timeline> {
        self.router.end()
    }

    pub fn is_capturing(&self) -> bool {
        self.router.is_capturing()
    }

    pub fn event_count(&self) -> usize {
        self.router.event_count()
    }
}

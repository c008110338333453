//! Session controller state machine

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::data::{key_name, Timeline, TimelineStore};
use crate::input::{CaptureEngine, CaptureMode, HookRouter, HotkeyAction, HotkeyBindings};
use crate::playback::{play, InputSynth, PlaybackReport};

use super::{
    Operation, SessionCommand, SessionError, SessionSettings, SessionState, SessionStatus,
    MAX_COUNTDOWN_SECS,
};

const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

/// Everything guarded by the state lock
struct SessionInner {
    state: SessionState,
    /// Working timeline: the last finished recording or the last loaded file
    timeline: Arc<Timeline>,
    /// Path of the last save or load, reloaded by playback when the timeline is empty
    last_path: Option<PathBuf>,
    settings: SessionSettings,
    countdown_remaining: Option<u32>,
    /// Cancels the running countdown or playback task
    task: Option<CancellationToken>,
    /// Bumped for every background task; stale tasks compare and back off
    generation: u64,
    last_report: Option<PlaybackReport>,
}

/// Lock order: `inner`, then `capture`, then the router's own lock.
struct Shared {
    inner: Mutex<SessionInner>,
    capture: Mutex<CaptureEngine>,
    router: Arc<HookRouter>,
    synth: Arc<dyn InputSynth>,
    store: TimelineStore,
    status_tx: broadcast::Sender<SessionStatus>,
    runtime: Handle,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn capture(&self) -> MutexGuard<'_, CaptureEngine> {
        self.capture.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, status: SessionStatus) {
        // No subscribers is fine
        let _ = self.status_tx.send(status);
    }

    fn set_state(&self, inner: &mut SessionInner, state: SessionState) {
        if inner.state != state {
            info!("Session state: {} -> {}", inner.state, state);
            inner.state = state;
            self.publish(SessionStatus::StateChanged(state));
        }
    }

    fn cancel_task(&self, inner: &mut SessionInner) {
        if let Some(token) = inner.task.take() {
            token.cancel();
        }
    }

    /// Attach a capture session with the current settings and enter Recording
    fn begin_capture(&self, inner: &mut SessionInner) -> Result<(), SessionError> {
        let settings = inner.settings;
        self.capture()
            .start(settings.capture_mode, settings.suppress_outgoing)?;
        inner.timeline = Arc::new(Timeline::new());
        self.set_state(inner, SessionState::Recording);
        Ok(())
    }

    /// Detach the capture session and make its timeline the working timeline
    fn finish_recording(&self, inner: &mut SessionInner) -> Arc<Timeline> {
        let timeline = Arc::new(self.capture().stop().unwrap_or_default());
        inner.timeline = timeline.clone();
        info!(
            "Recording finished: {} events over {:.2}s",
            timeline.len(),
            timeline.duration_secs()
        );
        self.publish(SessionStatus::RecordingFinished {
            event_count: timeline.len(),
        });
        self.set_state(inner, SessionState::Idle);
        timeline
    }

    fn abort_countdown(&self, inner: &mut SessionInner) {
        self.cancel_task(inner);
        inner.countdown_remaining = None;
        info!("Countdown aborted");
        self.set_state(inner, SessionState::Idle);
    }

    fn halt_playback(&self, inner: &mut SessionInner) {
        self.cancel_task(inner);
        info!("Playback stopped");
        self.set_state(inner, SessionState::Idle);
    }
}

fn conflict(requested: Operation, state: SessionState) -> SessionError {
    SessionError::ConflictingOperation { requested, state }
}

/// Handle to the recorder state machine. Clones share the same session.
#[derive(Clone)]
pub struct SessionController {
    shared: Arc<Shared>,
}

impl SessionController {
    /// Create a controller in Idle. Background tasks are spawned on `runtime`.
    pub fn new(
        capture: CaptureEngine,
        synth: Arc<dyn InputSynth>,
        store: TimelineStore,
        settings: SessionSettings,
        runtime: Handle,
    ) -> Self {
        let router = capture.router().clone();
        router.set_hotkeys(settings.hotkeys);
        let (status_tx, _) = broadcast::channel(64);

        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(SessionInner {
                    state: SessionState::Idle,
                    timeline: Arc::new(Timeline::new()),
                    last_path: None,
                    settings,
                    countdown_remaining: None,
                    task: None,
                    generation: 0,
                    last_report: None,
                }),
                capture: Mutex::new(capture),
                router,
                synth,
                store,
                status_tx,
                runtime,
            }),
        }
    }

    /// Install the observe hook, which also carries hotkey detection
    pub fn install_hotkeys(&self) -> Result<(), SessionError> {
        self.shared.capture().ensure_installed(CaptureMode::Observe)?;
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionStatus> {
        self.shared.status_tx.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    pub fn settings(&self) -> SessionSettings {
        self.shared.lock().settings
    }

    /// Seconds left in a pending countdown
    pub fn countdown_remaining(&self) -> Option<u32> {
        self.shared.lock().countdown_remaining
    }

    /// Snapshot of the working timeline
    pub fn timeline(&self) -> Arc<Timeline> {
        self.shared.lock().timeline.clone()
    }

    pub fn last_path(&self) -> Option<PathBuf> {
        self.shared.lock().last_path.clone()
    }

    /// Report of the most recent playback run
    pub fn last_report(&self) -> Option<PlaybackReport> {
        self.shared.lock().last_report
    }

    pub fn store(&self) -> &TimelineStore {
        &self.shared.store
    }

    /// Live count while recording, otherwise the working timeline's length
    pub fn event_count(&self) -> usize {
        let inner = self.shared.lock();
        if inner.state == SessionState::Recording {
            self.shared.router.event_count()
        } else {
            inner.timeline.len()
        }
    }

    /// Start recording from Idle (through the countdown if one is set) or
    /// finish the active recording. Returns the resulting state.
    pub fn toggle_recording(&self) -> Result<SessionState, SessionError> {
        let mode = {
            let mut inner = self.shared.lock();
            match inner.state {
                SessionState::Idle => inner.settings.capture_mode,
                SessionState::Recording => {
                    self.shared.finish_recording(&mut inner);
                    return Ok(SessionState::Idle);
                }
                state => return Err(conflict(Operation::ToggleRecording, state)),
            }
        };

        // A fresh hook can take a moment to come up; keep that out of the state lock
        self.shared.capture().ensure_installed(mode)?;

        let mut inner = self.shared.lock();
        if inner.state != SessionState::Idle {
            return Err(conflict(Operation::ToggleRecording, inner.state));
        }

        let countdown_secs = inner.settings.countdown_secs;
        if countdown_secs == 0 {
            self.shared.begin_capture(&mut inner)?;
            return Ok(SessionState::Recording);
        }

        let token = CancellationToken::new();
        inner.generation += 1;
        let generation = inner.generation;
        inner.task = Some(token.clone());
        inner.countdown_remaining = Some(countdown_secs);
        self.shared
            .set_state(&mut inner, SessionState::CountdownPending);
        drop(inner);

        self.shared.runtime.spawn(run_countdown(
            self.shared.clone(),
            token,
            generation,
            countdown_secs,
        ));
        Ok(SessionState::CountdownPending)
    }

    /// Finish the active recording, or abort a pending countdown.
    ///
    /// Returns the finalized timeline, or None when there was nothing to
    /// finalize. Calling it again is a no-op.
    pub fn stop_recording(&self) -> Result<Option<Arc<Timeline>>, SessionError> {
        let mut inner = self.shared.lock();
        match inner.state {
            SessionState::Recording => Ok(Some(self.shared.finish_recording(&mut inner))),
            SessionState::CountdownPending => {
                self.shared.abort_countdown(&mut inner);
                Ok(None)
            }
            SessionState::Idle => Ok(None),
            SessionState::Playing => Err(conflict(Operation::StopRecording, inner.state)),
        }
    }

    /// Play the working timeline from Idle, or stop a running playback.
    /// Returns the resulting state.
    ///
    /// An empty working timeline is reloaded from the last saved or loaded
    /// file. The file is read without holding the state lock.
    pub fn toggle_playback(&self) -> Result<SessionState, SessionError> {
        let reload = {
            let mut inner = self.shared.lock();
            match inner.state {
                SessionState::Idle => {}
                SessionState::Playing => {
                    self.shared.halt_playback(&mut inner);
                    return Ok(SessionState::Idle);
                }
                state => return Err(conflict(Operation::TogglePlayback, state)),
            }

            if inner.timeline.is_empty() {
                Some(inner.last_path.clone().ok_or(SessionError::NothingToPlay)?)
            } else {
                None
            }
        };

        let reloaded = match reload {
            Some(path) => {
                let timeline = self.shared.store.load(&path)?;
                info!("Reloaded {} events from {:?}", timeline.len(), path);
                Some(Arc::new(timeline))
            }
            None => None,
        };

        let mut inner = self.shared.lock();
        if inner.state != SessionState::Idle {
            return Err(conflict(Operation::TogglePlayback, inner.state));
        }
        // A recording or load that landed during the read wins
        if let Some(timeline) = reloaded {
            if inner.timeline.is_empty() {
                inner.timeline = timeline;
            }
        }
        if inner.timeline.is_empty() {
            return Err(SessionError::NothingToPlay);
        }

        let timeline = inner.timeline.clone();
        let token = CancellationToken::new();
        inner.generation += 1;
        let generation = inner.generation;
        inner.task = Some(token.clone());
        inner.last_report = None;
        self.shared.set_state(&mut inner, SessionState::Playing);
        drop(inner);

        self.shared.runtime.spawn(run_playback(
            self.shared.clone(),
            timeline,
            token,
            generation,
        ));
        Ok(SessionState::Playing)
    }

    /// Stop a running playback. Returns false if nothing was playing.
    pub fn stop_playback(&self) -> bool {
        let mut inner = self.shared.lock();
        if inner.state != SessionState::Playing {
            return false;
        }
        self.shared.halt_playback(&mut inner);
        true
    }

    /// Abort the countdown, recording or playback, whichever is active
    pub fn stop_all(&self) {
        let mut inner = self.shared.lock();
        match inner.state {
            SessionState::Idle => {}
            SessionState::CountdownPending => self.shared.abort_countdown(&mut inner),
            SessionState::Recording => {
                self.shared.finish_recording(&mut inner);
            }
            SessionState::Playing => self.shared.halt_playback(&mut inner),
        }
    }

    /// Switch between observe and intercept capture.
    ///
    /// While recording, capture restarts under the new mode into a fresh
    /// timeline and the partial recording is discarded.
    pub fn set_capture_mode(&self, mode: CaptureMode) -> Result<(), SessionError> {
        self.apply_capture_settings(Operation::SetCaptureMode, Some(mode), None)
    }

    /// Toggle swallowing of captured input. Only has an effect in intercept mode.
    pub fn set_suppress_outgoing(&self, suppress: bool) -> Result<(), SessionError> {
        self.apply_capture_settings(Operation::SetSuppressOutgoing, None, Some(suppress))
    }

    fn apply_capture_settings(
        &self,
        requested: Operation,
        mode: Option<CaptureMode>,
        suppress: Option<bool>,
    ) -> Result<(), SessionError> {
        let recording = {
            let inner = self.shared.lock();
            match inner.state {
                SessionState::Idle => false,
                SessionState::Recording => true,
                state => return Err(conflict(requested, state)),
            }
        };

        if recording {
            if let Some(mode) = mode {
                self.shared.capture().ensure_installed(mode)?;
            }
        }

        let mut inner = self.shared.lock();
        if !matches!(inner.state, SessionState::Idle | SessionState::Recording) {
            return Err(conflict(requested, inner.state));
        }

        if let Some(mode) = mode {
            inner.settings.capture_mode = mode;
        }
        if let Some(suppress) = suppress {
            inner.settings.suppress_outgoing = suppress;
        }
        let settings = inner.settings;
        info!(
            "Capture settings: {} mode, suppress_outgoing={}",
            settings.capture_mode, settings.suppress_outgoing
        );

        if inner.state == SessionState::Recording {
            let mut capture = self.shared.capture();
            if let Some(partial) = capture.stop() {
                warn!(
                    "Restarting capture under new settings; {} recorded events discarded",
                    partial.len()
                );
            }
            if let Err(e) = capture.start(settings.capture_mode, settings.suppress_outgoing) {
                drop(capture);
                error!("Failed to restart capture: {}", e);
                self.shared.set_state(&mut inner, SessionState::Idle);
                return Err(e.into());
            }
            inner.timeline = Arc::new(Timeline::new());
        }

        Ok(())
    }

    /// Set the countdown before recording starts, in seconds
    pub fn set_countdown(&self, secs: u32) -> Result<(), SessionError> {
        if secs > MAX_COUNTDOWN_SECS {
            return Err(SessionError::InvalidSetting(format!(
                "countdown must be 0 to {} seconds, got {}",
                MAX_COUNTDOWN_SECS, secs
            )));
        }
        self.shared.lock().settings.countdown_secs = secs;
        debug!("Countdown set to {}s", secs);
        Ok(())
    }

    /// Rebind the record and/or playback hotkey. Takes effect on the next key event.
    pub fn set_hotkeys(
        &self,
        record: Option<&str>,
        playback: Option<&str>,
    ) -> Result<HotkeyBindings, SessionError> {
        let mut inner = self.shared.lock();
        let current = inner.settings.hotkeys;
        let record = record.map_or_else(|| key_name(current.record), str::to_string);
        let playback = playback.map_or_else(|| key_name(current.playback), str::to_string);

        let bindings = HotkeyBindings::parse(&record, &playback)
            .map_err(|e| SessionError::InvalidSetting(e.to_string()))?;

        inner.settings.hotkeys = bindings;
        self.shared.router.set_hotkeys(bindings);
        info!("Hotkeys: record={} playback={}", record, playback);
        Ok(bindings)
    }

    /// Persist the working timeline. Returns the path written.
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf, SessionError> {
        let timeline = {
            let inner = self.shared.lock();
            if matches!(
                inner.state,
                SessionState::Recording | SessionState::CountdownPending
            ) {
                return Err(conflict(Operation::Save, inner.state));
            }
            if inner.timeline.is_empty() {
                return Err(SessionError::NothingToSave);
            }
            inner.timeline.clone()
        };

        let written = self.shared.store.save(&timeline, path)?;
        self.shared.lock().last_path = Some(written.clone());
        Ok(written)
    }

    /// Replace the working timeline with a recording from disk.
    /// On failure the working timeline is left untouched.
    pub fn load(&self, path: &Path) -> Result<Arc<Timeline>, SessionError> {
        {
            let inner = self.shared.lock();
            if inner.state != SessionState::Idle {
                return Err(conflict(Operation::Load, inner.state));
            }
        }

        let timeline = Arc::new(self.shared.store.load(path)?);

        let mut inner = self.shared.lock();
        if inner.state != SessionState::Idle {
            return Err(conflict(Operation::Load, inner.state));
        }
        inner.timeline = timeline.clone();
        inner.last_path = Some(self.shared.store.resolve(path));
        Ok(timeline)
    }

    /// Dispatch commands until `Shutdown` arrives or every sender is gone
    pub async fn run(&self, mut cmd_rx: mpsc::UnboundedReceiver<SessionCommand>) {
        info!("Session controller running");
        self.shared
            .publish(SessionStatus::StateChanged(self.state()));

        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                SessionCommand::Hotkey(action) => self.handle_hotkey(action),
                SessionCommand::StopAll => self.stop_all(),
                SessionCommand::Shutdown => {
                    info!("Shutdown command received");
                    self.stop_all();
                    break;
                }
            }
        }

        info!("Session controller stopped");
    }

    fn handle_hotkey(&self, action: HotkeyAction) {
        let result = match action {
            // The record hotkey doubles as the countdown abort
            HotkeyAction::ToggleRecording
                if self.state() == SessionState::CountdownPending =>
            {
                self.stop_recording().map(|_| SessionState::Idle)
            }
            HotkeyAction::ToggleRecording => self.toggle_recording(),
            HotkeyAction::TogglePlayback => self.toggle_playback(),
        };

        match result {
            Ok(state) => debug!("Hotkey {:?} -> {}", action, state),
            Err(e) => warn!("Hotkey {:?} rejected: {}", action, e),
        }
    }
}

async fn run_countdown(
    shared: Arc<Shared>,
    token: CancellationToken,
    generation: u64,
    secs: u32,
) {
    for remaining in (1..=secs).rev() {
        {
            let mut inner = shared.lock();
            if token.is_cancelled() || inner.generation != generation {
                return;
            }
            inner.countdown_remaining = Some(remaining);
        }
        debug!("Recording starts in {}s", remaining);
        shared.publish(SessionStatus::Countdown { remaining });

        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(COUNTDOWN_TICK) => {}
        }
    }

    let mut inner = shared.lock();
    if token.is_cancelled()
        || inner.generation != generation
        || inner.state != SessionState::CountdownPending
    {
        return;
    }
    inner.task = None;
    inner.countdown_remaining = None;

    if let Err(e) = shared.begin_capture(&mut inner) {
        error!("Failed to start recording after countdown: {}", e);
        shared.set_state(&mut inner, SessionState::Idle);
        shared.publish(SessionStatus::Error(e.to_string()));
    }
}

async fn run_playback(
    shared: Arc<Shared>,
    timeline: Arc<Timeline>,
    token: CancellationToken,
    generation: u64,
) {
    let report = play(timeline.events(), &*shared.synth, &token).await;
    info!(
        "Playback report: {} synthesized, {} skipped{}",
        report.synthesized,
        report.skipped,
        if report.cancelled { ", cancelled" } else { "" }
    );

    {
        let mut inner = shared.lock();
        if inner.generation != generation {
            return;
        }
        inner.last_report = Some(report);
        if inner.state == SessionState::Playing && !token.is_cancelled() {
            inner.task = None;
            shared.set_state(&mut inner, SessionState::Idle);
        }
    }
    shared.publish(SessionStatus::PlaybackFinished(report));
}

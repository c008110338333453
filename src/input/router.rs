//! Routing of raw OS input notifications
//!
//! Every installed hook hands its notifications to one shared [`HookRouter`].
//! The router splits the work in two: [`decide`] is a pure function that says
//! whether the OS should keep delivering the event, and the active
//! [`CaptureSession`] (if any) appends the normalized event to its timeline.
//! Hotkey presses are forwarded to the session controller as commands.

use rdev::EventType;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::data::{key_name, parse_key, Action, Event, EventKind, PointerButton, Timeline};
use crate::session::SessionCommand;

use super::CaptureMode;

/// Whether the OS should continue delivering an event to other applications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    PassThrough,
    Swallow,
}

/// What a reserved hotkey asks the controller to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyAction {
    ToggleRecording,
    TogglePlayback,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HotkeyError {
    #[error("unknown key name: {0:?}")]
    UnknownKey(String),

    #[error("record and playback hotkeys must differ (both are {0})")]
    Duplicate(String),
}

/// The two reserved global key bindings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HotkeyBindings {
    pub record: rdev::Key,
    pub playback: rdev::Key,
}

impl HotkeyBindings {
    /// Parse key names, rejecting unknown names and identical bindings
    pub fn parse(record: &str, playback: &str) -> Result<Self, HotkeyError> {
        let record_key =
            parse_key(record).ok_or_else(|| HotkeyError::UnknownKey(record.to_string()))?;
        let playback_key =
            parse_key(playback).ok_or_else(|| HotkeyError::UnknownKey(playback.to_string()))?;

        if record_key == playback_key {
            return Err(HotkeyError::Duplicate(key_name(record_key)));
        }

        Ok(Self {
            record: record_key,
            playback: playback_key,
        })
    }

    /// The action bound to `key`, if it is one of the reserved keys
    pub fn action_for(&self, key: rdev::Key) -> Option<HotkeyAction> {
        if key == self.record {
            Some(HotkeyAction::ToggleRecording)
        } else if key == self.playback {
            Some(HotkeyAction::TogglePlayback)
        } else {
            None
        }
    }

    /// True if the raw event is a press or release of a reserved key
    pub fn matches(&self, raw: &EventType) -> bool {
        match raw {
            EventType::KeyPress(key) | EventType::KeyRelease(key) => {
                self.action_for(*key).is_some()
            }
            _ => false,
        }
    }
}

impl Default for HotkeyBindings {
    fn default() -> Self {
        Self {
            record: rdev::Key::F8,
            playback: rdev::Key::F9,
        }
    }
}

/// Settings of the capture session currently receiving events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveCapture {
    pub mode: CaptureMode,
    pub suppress_outgoing: bool,
}

/// Decide whether a raw event continues to other applications.
///
/// Hotkeys always pass. Nothing is swallowed unless a capture session is active
/// on an intercept hook with `suppress_outgoing` set, and pointer motion is
/// never swallowed.
pub fn decide(
    raw: &EventType,
    hook_mode: CaptureMode,
    hotkeys: &HotkeyBindings,
    active: Option<ActiveCapture>,
) -> Decision {
    if hotkeys.matches(raw) {
        return Decision::PassThrough;
    }

    let Some(active) = active else {
        return Decision::PassThrough;
    };

    if hook_mode != CaptureMode::Intercept || active.mode != hook_mode || !active.suppress_outgoing
    {
        return Decision::PassThrough;
    }

    match raw {
        EventType::MouseMove { .. } => Decision::PassThrough,
        EventType::ButtonPress(button) | EventType::ButtonRelease(button) => {
            if PointerButton::from_rdev(*button).is_some() {
                Decision::Swallow
            } else {
                Decision::PassThrough
            }
        }
        _ => Decision::Swallow,
    }
}

/// An in-progress recording: the append target for the hooks
#[derive(Debug)]
pub struct CaptureSession {
    id: Uuid,
    settings: ActiveCapture,
    started: Instant,
    timeline: Timeline,
    /// Position of the last recorded move, for deduplication
    last_move: Option<(i32, i32)>,
    /// Last known pointer position, attached to scroll events
    pointer: (i32, i32),
}

impl CaptureSession {
    pub fn new(settings: ActiveCapture, started: Instant) -> Self {
        Self {
            id: Uuid::new_v4(),
            settings,
            started,
            timeline: Timeline::new(),
            last_move: None,
            pointer: (0, 0),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn settings(&self) -> ActiveCapture {
        self.settings
    }

    pub fn len(&self) -> usize {
        self.timeline.len()
    }

    /// Normalize and append a raw event. Returns true if an event was stored.
    pub fn record(&mut self, raw: &EventType, at: Instant) -> bool {
        let offset_seconds = at.saturating_duration_since(self.started).as_secs_f64();

        let kind = match raw {
            EventType::KeyPress(key) => EventKind::Key {
                key: key_name(*key),
                action: Action::Press,
            },
            EventType::KeyRelease(key) => EventKind::Key {
                key: key_name(*key),
                action: Action::Release,
            },
            EventType::ButtonPress(button) | EventType::ButtonRelease(button) => {
                let Some(normalized) = PointerButton::from_rdev(*button) else {
                    debug!("Dropping unsupported pointer button {:?}", button);
                    return false;
                };
                let action = if matches!(raw, EventType::ButtonPress(_)) {
                    Action::Press
                } else {
                    Action::Release
                };
                EventKind::PointerButton {
                    button: normalized,
                    action,
                }
            }
            EventType::MouseMove { x, y } => {
                let position = (x.round() as i32, y.round() as i32);
                self.pointer = position;
                if self.last_move == Some(position) {
                    return false;
                }
                self.last_move = Some(position);
                EventKind::PointerMove {
                    x: position.0,
                    y: position.1,
                }
            }
            EventType::Wheel { delta_x, delta_y } => EventKind::Scroll {
                dx: *delta_x,
                dy: *delta_y,
                x: self.pointer.0,
                y: self.pointer.1,
            },
        };

        self.timeline.push(Event {
            offset_seconds,
            kind,
        });
        true
    }

    pub fn into_timeline(self) -> Timeline {
        self.timeline
    }
}

#[derive(Debug)]
struct RouterState {
    hotkeys: HotkeyBindings,
    session: Option<CaptureSession>,
    /// Hotkey currently held down, so key repeat does not re-trigger it
    held_hotkey: Option<rdev::Key>,
}

/// Shared entry point for all installed hooks
#[derive(Debug)]
pub struct HookRouter {
    state: Mutex<RouterState>,
    commands: mpsc::UnboundedSender<SessionCommand>,
}

impl HookRouter {
    pub fn new(hotkeys: HotkeyBindings, commands: mpsc::UnboundedSender<SessionCommand>) -> Self {
        Self {
            state: Mutex::new(RouterState {
                hotkeys,
                session: None,
                held_hotkey: None,
            }),
            commands,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RouterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle a notification from the hook implementing `hook_mode`
    pub fn handle(&self, hook_mode: CaptureMode, raw: &EventType) -> Decision {
        self.handle_at(hook_mode, raw, Instant::now())
    }

    /// Handle a notification observed at `at`
    pub fn handle_at(&self, hook_mode: CaptureMode, raw: &EventType, at: Instant) -> Decision {
        let mut state = self.lock();
        let hotkeys = state.hotkeys;

        if hotkeys.matches(raw) {
            // Hotkeys are dispatched from the observe hook only, which is always installed
            if hook_mode == CaptureMode::Observe {
                self.dispatch_hotkey(&mut state, raw);
            }
            return Decision::PassThrough;
        }

        let active = state.session.as_ref().map(CaptureSession::settings);
        let decision = decide(raw, hook_mode, &hotkeys, active);

        if let Some(session) = state.session.as_mut() {
            if session.settings.mode == hook_mode {
                session.record(raw, at);
            }
        }

        decision
    }

    fn dispatch_hotkey(&self, state: &mut RouterState, raw: &EventType) {
        match raw {
            EventType::KeyPress(key) => {
                if state.held_hotkey == Some(*key) {
                    return;
                }
                state.held_hotkey = Some(*key);
                if let Some(action) = state.hotkeys.action_for(*key) {
                    debug!("Hotkey {} pressed: {:?}", key_name(*key), action);
                    if self.commands.send(SessionCommand::Hotkey(action)).is_err() {
                        warn!("Session controller is gone, hotkey {:?} dropped", action);
                    }
                }
            }
            EventType::KeyRelease(key) => {
                if state.held_hotkey == Some(*key) {
                    state.held_hotkey = None;
                }
            }
            _ => {}
        }
    }

    pub fn hotkeys(&self) -> HotkeyBindings {
        self.lock().hotkeys
    }

    pub fn set_hotkeys(&self, hotkeys: HotkeyBindings) {
        let mut state = self.lock();
        state.hotkeys = hotkeys;
        state.held_hotkey = None;
    }

    /// Start a new capture session, replacing any session still attached
    pub fn begin(&self, settings: ActiveCapture) -> Uuid {
        let session = CaptureSession::new(settings, Instant::now());
        let id = session.id();
        let mut state = self.lock();
        if let Some(previous) = state.session.replace(session) {
            warn!(
                "Capture session {} replaced while active; {} events discarded",
                previous.id(),
                previous.len()
            );
        }
        info!(
            "Capture session {} started ({} mode, suppress_outgoing={})",
            id, settings.mode, settings.suppress_outgoing
        );
        id
    }

    /// Detach the active session and return its timeline. A second call returns None.
    pub fn end(&self) -> Option<Timeline> {
        let session = self.lock().session.take()?;
        info!(
            "Capture session {} stopped with {} events",
            session.id(),
            session.len()
        );
        Some(session.into_timeline())
    }

    pub fn is_capturing(&self) -> bool {
        self.lock().session.is_some()
    }

    /// Events recorded so far in the active session
    pub fn event_count(&self) -> usize {
        self.lock().session.as_ref().map_or(0, CaptureSession::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn router() -> (HookRouter, mpsc::UnboundedReceiver<SessionCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (HookRouter::new(HotkeyBindings::default(), tx), rx)
    }

    const OBSERVE: ActiveCapture = ActiveCapture {
        mode: CaptureMode::Observe,
        suppress_outgoing: false,
    };

    const INTERCEPT_SUPPRESS: ActiveCapture = ActiveCapture {
        mode: CaptureMode::Intercept,
        suppress_outgoing: true,
    };

    #[test]
    fn test_hotkey_bindings_parse() {
        let bindings = HotkeyBindings::parse("f6", "F7").unwrap();
        assert_eq!(bindings.record, rdev::Key::F6);
        assert_eq!(bindings.playback, rdev::Key::F7);

        assert_eq!(
            HotkeyBindings::parse("F8", "f8"),
            Err(HotkeyError::Duplicate("F8".to_string()))
        );
        assert!(matches!(
            HotkeyBindings::parse("F8", "Hyper"),
            Err(HotkeyError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_decide_without_session_passes_everything() {
        let hotkeys = HotkeyBindings::default();
        let raw = EventType::KeyPress(rdev::Key::KeyA);
        assert_eq!(
            decide(&raw, CaptureMode::Intercept, &hotkeys, None),
            Decision::PassThrough
        );
    }

    #[test]
    fn test_decide_swallows_only_when_suppressing_on_intercept() {
        let hotkeys = HotkeyBindings::default();
        let key = EventType::KeyPress(rdev::Key::KeyA);

        assert_eq!(
            decide(&key, CaptureMode::Intercept, &hotkeys, Some(INTERCEPT_SUPPRESS)),
            Decision::Swallow
        );
        assert_eq!(
            decide(&key, CaptureMode::Observe, &hotkeys, Some(INTERCEPT_SUPPRESS)),
            Decision::PassThrough
        );

        let no_suppress = ActiveCapture {
            suppress_outgoing: false,
            ..INTERCEPT_SUPPRESS
        };
        assert_eq!(
            decide(&key, CaptureMode::Intercept, &hotkeys, Some(no_suppress)),
            Decision::PassThrough
        );
    }

    #[test]
    fn test_decide_never_swallows_hotkeys_or_motion() {
        let hotkeys = HotkeyBindings::default();
        for raw in [
            EventType::KeyPress(rdev::Key::F8),
            EventType::KeyRelease(rdev::Key::F9),
            EventType::MouseMove { x: 1.0, y: 2.0 },
        ] {
            assert_eq!(
                decide(&raw, CaptureMode::Intercept, &hotkeys, Some(INTERCEPT_SUPPRESS)),
                Decision::PassThrough
            );
        }
    }

    #[test]
    fn test_session_records_normalized_events() {
        let start = Instant::now();
        let mut session = CaptureSession::new(OBSERVE, start);

        session.record(
            &EventType::MouseMove { x: 10.4, y: 20.6 },
            start + Duration::from_millis(10),
        );
        session.record(
            &EventType::ButtonPress(rdev::Button::Left),
            start + Duration::from_millis(20),
        );
        session.record(
            &EventType::Wheel {
                delta_x: 0,
                delta_y: -1,
            },
            start + Duration::from_millis(30),
        );
        session.record(
            &EventType::KeyRelease(rdev::Key::KeyD),
            start + Duration::from_millis(40),
        );

        let timeline = session.into_timeline();
        let kinds: Vec<_> = timeline.events().iter().map(|e| e.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::PointerMove { x: 10, y: 21 },
                EventKind::PointerButton {
                    button: PointerButton::Left,
                    action: Action::Press
                },
                EventKind::Scroll {
                    dx: 0,
                    dy: -1,
                    x: 10,
                    y: 21
                },
                EventKind::Key {
                    key: "KeyD".to_string(),
                    action: Action::Release
                },
            ]
        );
        assert!((timeline.events()[0].offset_seconds - 0.010).abs() < 1e-9);
    }

    #[test]
    fn test_session_collapses_identical_moves() {
        let start = Instant::now();
        let mut session = CaptureSession::new(OBSERVE, start);

        assert!(session.record(&EventType::MouseMove { x: 5.0, y: 5.0 }, start));
        assert!(!session.record(&EventType::MouseMove { x: 5.0, y: 5.0 }, start));
        assert!(!session.record(&EventType::MouseMove { x: 5.2, y: 4.9 }, start));
        assert!(session.record(&EventType::MouseMove { x: 6.0, y: 5.0 }, start));
        assert!(session.record(&EventType::MouseMove { x: 5.0, y: 5.0 }, start));
        assert_eq!(session.len(), 3);
    }

    #[test]
    fn test_session_drops_unsupported_button() {
        let start = Instant::now();
        let mut session = CaptureSession::new(OBSERVE, start);
        assert!(!session.record(&EventType::ButtonPress(rdev::Button::Unknown(42)), start));
        assert_eq!(session.len(), 0);
    }

    #[test]
    fn test_offsets_are_non_decreasing() {
        let start = Instant::now();
        let mut session = CaptureSession::new(OBSERVE, start);
        for i in 0..50u64 {
            session.record(
                &EventType::MouseMove {
                    x: i as f64,
                    y: 0.0,
                },
                start + Duration::from_millis(i * 3),
            );
        }
        let timeline = session.into_timeline();
        assert!(timeline
            .events()
            .windows(2)
            .all(|pair| pair[0].offset_seconds <= pair[1].offset_seconds));
    }

    #[test]
    fn test_router_ignores_hotkeys_in_intercept_capture() {
        let (router, mut rx) = router();
        router.begin(INTERCEPT_SUPPRESS);

        let f8 = EventType::KeyPress(rdev::Key::F8);
        assert_eq!(
            router.handle(CaptureMode::Intercept, &f8),
            Decision::PassThrough
        );
        assert_eq!(router.handle(CaptureMode::Observe, &f8), Decision::PassThrough);
        router.handle(CaptureMode::Intercept, &EventType::KeyRelease(rdev::Key::F8));
        router.handle(CaptureMode::Observe, &EventType::KeyRelease(rdev::Key::F8));

        let a = EventType::KeyPress(rdev::Key::KeyA);
        assert_eq!(router.handle(CaptureMode::Intercept, &a), Decision::Swallow);
        // Same key seen by the observe hook is not recorded twice
        assert_eq!(router.handle(CaptureMode::Observe, &a), Decision::PassThrough);

        let timeline = router.end().unwrap();
        assert_eq!(timeline.len(), 1);
        assert!(matches!(
            &timeline.events()[0].kind,
            EventKind::Key { key, .. } if key == "KeyA"
        ));

        // Dispatched exactly once, from the observe hook
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionCommand::Hotkey(HotkeyAction::ToggleRecording)
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_router_hotkey_repeat_dispatches_once() {
        let (router, mut rx) = router();
        let f9 = EventType::KeyPress(rdev::Key::F9);
        router.handle(CaptureMode::Observe, &f9);
        router.handle(CaptureMode::Observe, &f9);
        router.handle(CaptureMode::Observe, &EventType::KeyRelease(rdev::Key::F9));
        router.handle(CaptureMode::Observe, &f9);

        let mut count = 0;
        while let Ok(cmd) = rx.try_recv() {
            assert_eq!(cmd, SessionCommand::Hotkey(HotkeyAction::TogglePlayback));
            count += 1;
        }
        assert_eq!(count, 2);
    }

    #[test]
    fn test_router_end_is_idempotent() {
        let (router, _rx) = router();
        router.begin(OBSERVE);
        router.handle(CaptureMode::Observe, &EventType::KeyPress(rdev::Key::KeyQ));
        assert_eq!(router.event_count(), 1);

        assert_eq!(router.end().map(|t| t.len()), Some(1));
        assert!(router.end().is_none());
        assert!(!router.is_capturing());
        assert_eq!(router.event_count(), 0);
    }

    #[test]
    fn test_router_rebinds_hotkeys() {
        let (router, _rx) = router();
        router.set_hotkeys(HotkeyBindings::parse("F1", "F2").unwrap());
        router.begin(OBSERVE);

        router.handle(CaptureMode::Observe, &EventType::KeyPress(rdev::Key::F8));
        router.handle(CaptureMode::Observe, &EventType::KeyPress(rdev::Key::F1));

        let timeline = router.end().unwrap();
        assert_eq!(timeline.len(), 1);
        assert!(matches!(
            &timeline.events()[0].kind,
            EventKind::Key { key, .. } if key == "F8"
        ));
    }
}

//! Timeline replay with reproduced inter-event gaps

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::data::{parse_key, Action, Event, EventKind};

use super::{InputSynth, PlaybackError};

/// Outcome of one playback run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackReport {
    /// Events handed to the OS
    pub synthesized: usize,
    /// Events that could not be synthesized
    pub skipped: usize,
    /// Whether playback stopped before the end of the timeline
    pub cancelled: bool,
}

/// Translate a recorded event into the OS action that reproduces it
pub fn resolve(kind: &EventKind) -> Result<rdev::EventType, PlaybackError> {
    let event = match kind {
        EventKind::Key { key, action } => {
            let resolved =
                parse_key(key).ok_or_else(|| PlaybackError::UnsupportedEvent(key.clone()))?;
            match action {
                Action::Press => rdev::EventType::KeyPress(resolved),
                Action::Release => rdev::EventType::KeyRelease(resolved),
            }
        }
        EventKind::PointerMove { x, y } => rdev::EventType::MouseMove {
            x: f64::from(*x),
            y: f64::from(*y),
        },
        EventKind::PointerButton { button, action } => match action {
            Action::Press => rdev::EventType::ButtonPress(button.to_rdev()),
            Action::Release => rdev::EventType::ButtonRelease(button.to_rdev()),
        },
        EventKind::Scroll { dx, dy, .. } => rdev::EventType::Wheel {
            delta_x: *dx,
            delta_y: *dy,
        },
    };
    Ok(event)
}

/// Replay `events` in order.
///
/// Each event fires `offset - first_offset` after playback starts, so gaps
/// between events match the recording. The cancellation token is raced against
/// every wait and checked before every event. Keys or buttons held down when
/// playback is cancelled stay held.
pub async fn play(
    events: &[Event],
    synth: &dyn InputSynth,
    cancel: &CancellationToken,
) -> PlaybackReport {
    let mut report = PlaybackReport::default();
    let Some(first) = events.first() else {
        return report;
    };

    let base = first.offset_seconds;
    let start = Instant::now();
    info!("Playback started: {} events", events.len());

    for (index, event) in events.iter().enumerate() {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }

        let Ok(delay) = Duration::try_from_secs_f64((event.offset_seconds - base).max(0.0)) else {
            warn!(
                "Skipping event {} at {:.3}s: offset out of range",
                index, event.offset_seconds
            );
            report.skipped += 1;
            continue;
        };

        let due = start + delay;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                report.cancelled = true;
                break;
            }
            _ = tokio::time::sleep_until(due) => {}
        }

        let outcome = resolve(&event.kind).and_then(|os_event| {
            synth
                .synthesize(&os_event)
                .map_err(PlaybackError::from)
        });

        match outcome {
            Ok(()) => report.synthesized += 1,
            Err(e) => {
                warn!("Skipping event {} at {:.3}s: {}", index, event.offset_seconds, e);
                report.skipped += 1;
            }
        }
    }

    if report.cancelled {
        info!(
            "Playback stopped after {} of {} events",
            report.synthesized + report.skipped,
            events.len()
        );
    } else {
        debug!("Playback finished in {:?}", start.elapsed());
    }

    report
}

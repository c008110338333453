//! Timeline data format and serialization utilities

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Event;

/// Legacy `created_at` layout written by earlier recorder versions
const LEGACY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Latest offset a loaded recording may carry (30 days)
pub const MAX_OFFSET_SECS: f64 = 30.0 * 24.0 * 60.0 * 60.0;

/// Errors produced while decoding a timeline document
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("event {index} has invalid offset {offset}")]
    InvalidOffset { index: usize, offset: f64 },

    #[error("event {index} at {offset}s precedes the previous event at {previous}s")]
    OutOfOrder {
        index: usize,
        offset: f64,
        previous: f64,
    },
}

/// An ordered recording of input events.
///
/// Offsets are non-decreasing: [`Timeline::push`] clamps an event that would
/// go backwards, and [`Timeline::from_json`] rejects documents that do.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    events: Vec<Event>,
    created_at: DateTime<Utc>,
}

/// On-disk document layout
#[derive(Debug, Serialize, Deserialize)]
struct TimelineDocument {
    #[serde(default)]
    events: Vec<Event>,

    #[serde(default)]
    metadata: TimelineMetadata,

    /// Blank recordings from older versions kept the timestamp at the top level
    #[serde(default, skip_serializing)]
    created_at: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TimelineMetadata {
    #[serde(default)]
    created_at: Option<String>,

    /// Informational only; loaders use the length of `events`
    #[serde(default)]
    event_count: Option<usize>,
}

impl Timeline {
    /// Create an empty timeline stamped with the current time
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Build a timeline from already-ordered events
    pub fn from_events(events: Vec<Event>) -> Self {
        let mut timeline = Self::new();
        for event in events {
            timeline.push(event);
        }
        timeline
    }

    /// Append an event, clamping its offset so the sequence never goes backwards
    pub fn push(&mut self, mut event: Event) {
        let floor = self.last_offset().unwrap_or(0.0);
        if event.offset_seconds.is_nan() || event.offset_seconds < floor {
            event.offset_seconds = floor;
        }
        self.events.push(event);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Offset of the last event, if any
    pub fn last_offset(&self) -> Option<f64> {
        self.events.last().map(|e| e.offset_seconds)
    }

    /// Span between the first and last event in seconds
    pub fn duration_secs(&self) -> f64 {
        match (self.events.first(), self.events.last()) {
            (Some(first), Some(last)) => last.offset_seconds - first.offset_seconds,
            _ => 0.0,
        }
    }

    /// Serialize to a pretty-printed JSON document
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let document = TimelineDocument {
            events: self.events.clone(),
            metadata: TimelineMetadata {
                created_at: Some(self.created_at.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
                event_count: Some(self.events.len()),
            },
            created_at: None,
        };
        serde_json::to_string_pretty(&document)
    }

    /// Parse a JSON document, validating offsets
    pub fn from_json(contents: &str) -> Result<Self, FormatError> {
        let document: TimelineDocument = serde_json::from_str(contents)?;

        let mut previous = 0.0;
        for (index, event) in document.events.iter().enumerate() {
            let offset = event.offset_seconds;
            if !(0.0..=MAX_OFFSET_SECS).contains(&offset) {
                return Err(FormatError::InvalidOffset { index, offset });
            }
            if offset < previous {
                return Err(FormatError::OutOfOrder {
                    index,
                    offset,
                    previous,
                });
            }
            previous = offset;
        }

        if let Some(count) = document.metadata.event_count {
            if count != document.events.len() {
                tracing::debug!(
                    "Metadata event_count {} differs from {} stored events",
                    count,
                    document.events.len()
                );
            }
        }

        let created_at = document
            .metadata
            .created_at
            .as_deref()
            .or(document.created_at.as_deref())
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);

        Ok(Self {
            events: document.events,
            created_at,
        })
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(value, LEGACY_TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

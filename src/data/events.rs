//! Input event data structures

use serde::{Deserialize, Serialize};

/// A single recorded input event with its offset from the recording start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Seconds elapsed since the recording started
    pub offset_seconds: f64,

    /// The kind of event and its payload
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Type of input event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// Key press or release, identified by its symbolic name (e.g. "KeyA", "F8")
    Key { key: String, action: Action },

    /// Absolute pointer position
    PointerMove { x: i32, y: i32 },

    /// Pointer button press or release
    PointerButton { button: PointerButton, action: Action },

    /// Scroll delta, with the pointer position at the time of the scroll
    Scroll { dx: i64, dy: i64, x: i32, y: i32 },
}

/// Press or release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Press,
    Release,
}

/// Pointer button identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerButton {
    Left,
    Right,
    Middle,
    /// First side button (back)
    Extra1,
    /// Second side button (forward)
    Extra2,
}

impl Event {
    pub fn key(offset_seconds: f64, key: impl Into<String>, action: Action) -> Self {
        Self {
            offset_seconds,
            kind: EventKind::Key {
                key: key.into(),
                action,
            },
        }
    }

    pub fn pointer_move(offset_seconds: f64, x: i32, y: i32) -> Self {
        Self {
            offset_seconds,
            kind: EventKind::PointerMove { x, y },
        }
    }

    pub fn pointer_button(offset_seconds: f64, button: PointerButton, action: Action) -> Self {
        Self {
            offset_seconds,
            kind: EventKind::PointerButton { button, action },
        }
    }

    pub fn scroll(offset_seconds: f64, dx: i64, dy: i64, x: i32, y: i32) -> Self {
        Self {
            offset_seconds,
            kind: EventKind::Scroll { dx, dy, x, y },
        }
    }
}

// Side button codes as reported by the OS hooks
#[cfg(target_os = "linux")]
const EXTRA1_CODE: u8 = 8;
#[cfg(target_os = "linux")]
const EXTRA2_CODE: u8 = 9;
#[cfg(not(target_os = "linux"))]
const EXTRA1_CODE: u8 = 1;
#[cfg(not(target_os = "linux"))]
const EXTRA2_CODE: u8 = 2;

impl PointerButton {
    /// Normalize an rdev button. Returns None for buttons outside the supported five.
    pub fn from_rdev(button: rdev::Button) -> Option<Self> {
        match button {
            rdev::Button::Left => Some(PointerButton::Left),
            rdev::Button::Right => Some(PointerButton::Right),
            rdev::Button::Middle => Some(PointerButton::Middle),
            rdev::Button::Unknown(n) if n == EXTRA1_CODE => Some(PointerButton::Extra1),
            rdev::Button::Unknown(n) if n == EXTRA2_CODE => Some(PointerButton::Extra2),
            rdev::Button::Unknown(_) => None,
        }
    }

    pub fn to_rdev(self) -> rdev::Button {
        match self {
            PointerButton::Left => rdev::Button::Left,
            PointerButton::Right => rdev::Button::Right,
            PointerButton::Middle => rdev::Button::Middle,
            PointerButton::Extra1 => rdev::Button::Unknown(EXTRA1_CODE),
            PointerButton::Extra2 => rdev::Button::Unknown(EXTRA2_CODE),
        }
    }
}

/// Canonical key names, in rdev declaration order
const KEY_NAMES: &[(rdev::Key, &str)] = &[
    (rdev::Key::Alt, "Alt"),
    (rdev::Key::AltGr, "AltGr"),
    (rdev::Key::Backspace, "Backspace"),
    (rdev::Key::CapsLock, "CapsLock"),
    (rdev::Key::ControlLeft, "ControlLeft"),
    (rdev::Key::ControlRight, "ControlRight"),
    (rdev::Key::Delete, "Delete"),
    (rdev::Key::DownArrow, "DownArrow"),
    (rdev::Key::End, "End"),
    (rdev::Key::Escape, "Escape"),
    (rdev::Key::F1, "F1"),
    (rdev::Key::F2, "F2"),
    (rdev::Key::F3, "F3"),
    (rdev::Key::F4, "F4"),
    (rdev::Key::F5, "F5"),
    (rdev::Key::F6, "F6"),
    (rdev::Key::F7, "F7"),
    (rdev::Key::F8, "F8"),
    (rdev::Key::F9, "F9"),
    (rdev::Key::F10, "F10"),
    (rdev::Key::F11, "F11"),
    (rdev::Key::F12, "F12"),
    (rdev::Key::Home, "Home"),
    (rdev::Key::LeftArrow, "LeftArrow"),
    (rdev::Key::MetaLeft, "MetaLeft"),
    (rdev::Key::MetaRight, "MetaRight"),
    (rdev::Key::PageDown, "PageDown"),
    (rdev::Key::PageUp, "PageUp"),
    (rdev::Key::Return, "Return"),
    (rdev::Key::RightArrow, "RightArrow"),
    (rdev::Key::ShiftLeft, "ShiftLeft"),
    (rdev::Key::ShiftRight, "ShiftRight"),
    (rdev::Key::Space, "Space"),
    (rdev::Key::Tab, "Tab"),
    (rdev::Key::UpArrow, "UpArrow"),
    (rdev::Key::PrintScreen, "PrintScreen"),
    (rdev::Key::ScrollLock, "ScrollLock"),
    (rdev::Key::Pause, "Pause"),
    (rdev::Key::NumLock, "NumLock"),
    (rdev::Key::BackQuote, "BackQuote"),
    (rdev::Key::Num1, "Num1"),
    (rdev::Key::Num2, "Num2"),
    (rdev::Key::Num3, "Num3"),
    (rdev::Key::Num4, "Num4"),
    (rdev::Key::Num5, "Num5"),
    (rdev::Key::Num6, "Num6"),
    (rdev::Key::Num7, "Num7"),
    (rdev::Key::Num8, "Num8"),
    (rdev::Key::Num9, "Num9"),
    (rdev::Key::Num0, "Num0"),
    (rdev::Key::Minus, "Minus"),
    (rdev::Key::Equal, "Equal"),
    (rdev::Key::KeyQ, "KeyQ"),
    (rdev::Key::KeyW, "KeyW"),
    (rdev::Key::KeyE, "KeyE"),
    (rdev::Key::KeyR, "KeyR"),
    (rdev::Key::KeyT, "KeyT"),
    (rdev::Key::KeyY, "KeyY"),
    (rdev::Key::KeyU, "KeyU"),
    (rdev::Key::KeyI, "KeyI"),
    (rdev::Key::KeyO, "KeyO"),
    (rdev::Key::KeyP, "KeyP"),
    (rdev::Key::LeftBracket, "LeftBracket"),
    (rdev::Key::RightBracket, "RightBracket"),
    (rdev::Key::KeyA, "KeyA"),
    (rdev::Key::KeyS, "KeyS"),
    (rdev::Key::KeyD, "KeyD"),
    (rdev::Key::KeyF, "KeyF"),
    (rdev::Key::KeyG, "KeyG"),
    (rdev::Key::KeyH, "KeyH"),
    (rdev::Key::KeyJ, "KeyJ"),
    (rdev::Key::KeyK, "KeyK"),
    (rdev::Key::KeyL, "KeyL"),
    (rdev::Key::SemiColon, "SemiColon"),
    (rdev::Key::Quote, "Quote"),
    (rdev::Key::BackSlash, "BackSlash"),
    (rdev::Key::IntlBackslash, "IntlBackslash"),
    (rdev::Key::KeyZ, "KeyZ"),
    (rdev::Key::KeyX, "KeyX"),
    (rdev::Key::KeyC, "KeyC"),
    (rdev::Key::KeyV, "KeyV"),
    (rdev::Key::KeyB, "KeyB"),
    (rdev::Key::KeyN, "KeyN"),
    (rdev::Key::KeyM, "KeyM"),
    (rdev::Key::Comma, "Comma"),
    (rdev::Key::Dot, "Dot"),
    (rdev::Key::Slash, "Slash"),
    (rdev::Key::Insert, "Insert"),
    (rdev::Key::KpReturn, "KpReturn"),
    (rdev::Key::KpMinus, "KpMinus"),
    (rdev::Key::KpPlus, "KpPlus"),
    (rdev::Key::KpMultiply, "KpMultiply"),
    (rdev::Key::KpDivide, "KpDivide"),
    (rdev::Key::Kp0, "Kp0"),
    (rdev::Key::Kp1, "Kp1"),
    (rdev::Key::Kp2, "Kp2"),
    (rdev::Key::Kp3, "Kp3"),
    (rdev::Key::Kp4, "Kp4"),
    (rdev::Key::Kp5, "Kp5"),
    (rdev::Key::Kp6, "Kp6"),
    (rdev::Key::Kp7, "Kp7"),
    (rdev::Key::Kp8, "Kp8"),
    (rdev::Key::Kp9, "Kp9"),
    (rdev::Key::KpDelete, "KpDelete"),
    (rdev::Key::Function, "Function"),
];

/// Symbolic name for an rdev key. Keys without a name become `Unknown(<code>)`.
pub fn key_name(key: rdev::Key) -> String {
    if let rdev::Key::Unknown(code) = key {
        return format!("Unknown({})", code);
    }

    KEY_NAMES
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, name)| (*name).to_string())
        .unwrap_or_else(|| format!("{:?}", key))
}

/// Resolve a symbolic key name back to an rdev key (case-insensitive).
pub fn parse_key(name: &str) -> Option<rdev::Key> {
    let name = name.trim();

    if let Some(code) = name
        .strip_prefix("Unknown(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        return code.parse().ok().map(rdev::Key::Unknown);
    }

    KEY_NAMES
        .iter()
        .find(|(_, n)| n.eq_ignore_ascii_case(name))
        .map(|(k, _)| *k)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names_resolve_back() {
        for (key, name) in KEY_NAMES {
            assert_eq!(key_name(*key), *name);
            assert_eq!(parse_key(name), Some(*key));
        }
    }

    #[test]
    fn test_parse_key_is_case_insensitive() {
        assert_eq!(parse_key("f8"), Some(rdev::Key::F8));
        assert_eq!(parse_key(" keya "), Some(rdev::Key::KeyA));
        assert_eq!(parse_key("NoSuchKey"), None);
    }

    #[test]
    fn test_unknown_key_code() {
        assert_eq!(key_name(rdev::Key::Unknown(179)), "Unknown(179)");
        assert_eq!(parse_key("Unknown(179)"), Some(rdev::Key::Unknown(179)));
        assert_eq!(parse_key("Unknown(x)"), None);
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = Event::key(0.25, "KeyA", Action::Press);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["offset_seconds"], 0.25);
        assert_eq!(json["kind"], "key");
        assert_eq!(json["key"], "KeyA");
        assert_eq!(json["action"], "press");

        let scroll = serde_json::to_value(Event::scroll(1.0, 0, -1, 10, 20)).unwrap();
        assert_eq!(scroll["kind"], "scroll");
        assert_eq!(scroll["dy"], -1);
    }

    #[test]
    fn test_event_tolerates_unknown_fields() {
        let json = r#"{"offset_seconds": 0.5, "kind": "pointer_button", "button": "extra1",
                       "action": "release", "device": "usb-mouse"}"#;
        let event: Event = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            Event::pointer_button(0.5, PointerButton::Extra1, Action::Release)
        );
    }

    #[test]
    fn test_pointer_button_mapping() {
        for button in [
            PointerButton::Left,
            PointerButton::Right,
            PointerButton::Middle,
            PointerButton::Extra1,
            PointerButton::Extra2,
        ] {
            assert_eq!(PointerButton::from_rdev(button.to_rdev()), Some(button));
        }
        assert_eq!(PointerButton::from_rdev(rdev::Button::Unknown(42)), None);
    }
}

//! Virtual keyboard over Linux uinput.

use std::collections::HashMap;
use std::str::FromStr;

use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, EventType, InputEvent, Key};
use keymap_core::{KeySink, SinkError};
use log::{debug, warn};

/// Name the virtual device is registered under.
pub const DEVICE_NAME: &str = "serial-keymapper";

const PRESS: i32 = 1;
const RELEASE: i32 = 0;

/// [`KeySink`] that injects events through a uinput virtual keyboard.
///
/// Every key the device may produce has to be declared up front, so the
/// sink is built from the full set of mapped key names.
pub struct UinputKeySink {
    device: VirtualDevice,
    keys: HashMap<String, Key>,
}

impl UinputKeySink {
    /// Create the virtual device for the given key names.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::UnknownKey`] for a name [`parse_key`] does not
    /// recognise, or [`SinkError::Io`] if uinput is unavailable (usually a
    /// permissions problem on `/dev/uinput`).
    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<Self, SinkError> {
        let mut keys = HashMap::new();
        let mut attrs = AttributeSet::<Key>::new();
        for name in names {
            let key = parse_key(name).ok_or_else(|| SinkError::UnknownKey(name.to_owned()))?;
            attrs.insert(key);
            keys.insert(name.to_owned(), key);
        }

        let device = VirtualDeviceBuilder::new()
            .and_then(|builder| builder.name(DEVICE_NAME).with_keys(&attrs))
            .and_then(|builder| builder.build())
            .map_err(|e| SinkError::Io(e.to_string()))?;
        debug!("Created uinput device with {} keys", keys.len());

        Ok(Self { device, keys })
    }

    fn emit(&mut self, name: &str, value: i32) -> Result<(), SinkError> {
        let key = *self
            .keys
            .get(name)
            .ok_or_else(|| SinkError::UnknownKey(name.to_owned()))?;
        self.device
            .emit(&[InputEvent::new(EventType::KEY, key.code(), value)])
            .map_err(|e| SinkError::Io(e.to_string()))
    }
}

impl KeySink for UinputKeySink {
    fn press(&mut self, key: &str) -> Result<(), SinkError> {
        self.emit(key, PRESS)
    }

    fn release(&mut self, key: &str) -> Result<(), SinkError> {
        self.emit(key, RELEASE)
    }
}

/// Resolve a configured key name to an evdev key.
///
/// Names are case-insensitive, spaces and underscores inside multi-character
/// names are ignored (`"left ctrl"`, `"page_up"`), and raw kernel names such
/// as `KEY_VOLUMEUP` are accepted as-is.
pub fn parse_key(name: &str) -> Option<Key> {
    let upper = name.to_uppercase();
    if upper.starts_with("KEY_") {
        return Key::from_str(&upper).ok().or_else(|| {
            warn!("Unknown evdev key: {}", name);
            None
        });
    }

    let compact: String = if upper.chars().count() > 1 {
        upper.chars().filter(|c| *c != ' ' && *c != '_').collect()
    } else {
        upper
    };

    let key = match compact.as_str() {
        "ESCAPE" | "ESC" => Key::KEY_ESC,
        "ENTER" | "RETURN" => Key::KEY_ENTER,
        "SPACE" | " " => Key::KEY_SPACE,
        "CAPSLOCK" | "CAPS" => Key::KEY_CAPSLOCK,
        "BACKSPACE" => Key::KEY_BACKSPACE,

        // Modifiers
        "CTRL" | "CONTROL" | "LCTRL" | "LEFTCTRL" => Key::KEY_LEFTCTRL,
        "RCTRL" | "RIGHTCTRL" => Key::KEY_RIGHTCTRL,
        "SHIFT" | "LSHIFT" | "LEFTSHIFT" => Key::KEY_LEFTSHIFT,
        "RSHIFT" | "RIGHTSHIFT" => Key::KEY_RIGHTSHIFT,
        "ALT" | "LALT" | "LEFTALT" => Key::KEY_LEFTALT,
        "RALT" | "RIGHTALT" | "ALTGR" => Key::KEY_RIGHTALT,
        "SUPER" | "META" | "WINDOWS" | "CMD" | "LEFTMETA" => Key::KEY_LEFTMETA,
        "RIGHTMETA" | "RIGHTSUPER" => Key::KEY_RIGHTMETA,

        // Symbols
        "-" | "MINUS" => Key::KEY_MINUS,
        "=" | "EQUAL" | "EQUALS" => Key::KEY_EQUAL,
        "[" | "LEFTBRACE" => Key::KEY_LEFTBRACE,
        "]" | "RIGHTBRACE" => Key::KEY_RIGHTBRACE,
        ";" | "SEMICOLON" => Key::KEY_SEMICOLON,
        "'" | "APOSTROPHE" => Key::KEY_APOSTROPHE,
        "`" | "GRAVE" => Key::KEY_GRAVE,
        "\\" | "BACKSLASH" => Key::KEY_BACKSLASH,
        "," | "COMMA" => Key::KEY_COMMA,
        "." | "DOT" | "PERIOD" => Key::KEY_DOT,
        "/" | "SLASH" => Key::KEY_SLASH,

        // Navigation
        "UPARROW" => Key::KEY_UP,
        "DOWNARROW" => Key::KEY_DOWN,
        "LEFTARROW" => Key::KEY_LEFT,
        "RIGHTARROW" => Key::KEY_RIGHT,
        "PGUP" => Key::KEY_PAGEUP,
        "PGDN" | "PGDOWN" => Key::KEY_PAGEDOWN,
        "INS" => Key::KEY_INSERT,
        "DEL" => Key::KEY_DELETE,

        // Letters, digits, F-keys and the remaining kernel names
        other => match Key::from_str(&format!("KEY_{}", other)) {
            Ok(key) => key,
            Err(_) => {
                warn!("Unknown key: {}", name);
                return None;
            }
        },
    };
    Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letters_and_digits() {
        assert_eq!(parse_key("a"), Some(Key::KEY_A));
        assert_eq!(parse_key("W"), Some(Key::KEY_W));
        assert_eq!(parse_key("7"), Some(Key::KEY_7));
    }

    #[test]
    fn test_named_keys() {
        assert_eq!(parse_key("space"), Some(Key::KEY_SPACE));
        assert_eq!(parse_key("enter"), Some(Key::KEY_ENTER));
        assert_eq!(parse_key("esc"), Some(Key::KEY_ESC));
        assert_eq!(parse_key("up"), Some(Key::KEY_UP));
        assert_eq!(parse_key("left"), Some(Key::KEY_LEFT));
        assert_eq!(parse_key("f5"), Some(Key::KEY_F5));
        assert_eq!(parse_key("page up"), Some(Key::KEY_PAGEUP));
        assert_eq!(parse_key("tab"), Some(Key::KEY_TAB));
    }

    #[test]
    fn test_modifiers_and_spacing() {
        assert_eq!(parse_key("ctrl"), Some(Key::KEY_LEFTCTRL));
        assert_eq!(parse_key("left ctrl"), Some(Key::KEY_LEFTCTRL));
        assert_eq!(parse_key("right_shift"), Some(Key::KEY_RIGHTSHIFT));
        assert_eq!(parse_key("alt gr"), Some(Key::KEY_RIGHTALT));
    }

    #[test]
    fn test_symbols() {
        assert_eq!(parse_key("-"), Some(Key::KEY_MINUS));
        assert_eq!(parse_key("/"), Some(Key::KEY_SLASH));
        assert_eq!(parse_key(" "), Some(Key::KEY_SPACE));
    }

    #[test]
    fn test_raw_kernel_names() {
        assert_eq!(parse_key("KEY_VOLUMEUP"), Some(Key::KEY_VOLUMEUP));
        assert_eq!(parse_key("key_mute"), Some(Key::KEY_MUTE));
        assert_eq!(parse_key("KEY_NOT_A_KEY"), None);
    }

    #[test]
    fn test_unknown_names() {
        assert_eq!(parse_key("hyperdrive"), None);
        assert_eq!(parse_key(""), None);
    }
}

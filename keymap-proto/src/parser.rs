//! Parser for lines sent by the device.
//!
//! Every device line falls into one of four shapes:
//! - `OK` - the last command was accepted
//! - `ERR...` - the last command was rejected
//! - `<pin>:<value>` - analog sample
//! - `<pin>` - digital input event (repeated while the contact stays closed)

use core::fmt;

/// Line the device sends when it accepts a command.
pub const ACK: &str = "OK";

/// Prefix of lines the device sends when it rejects a command.
pub const ERROR_MARKER: &str = "ERR";

/// Maximum line length for the protocol (including newline).
pub const MAX_LINE_LENGTH: usize = 64;

/// Parsed device line.
///
/// Borrows from the input line, so no allocation takes place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum DeviceLine<'a> {
    /// Command accepted (`OK`).
    Ack,
    /// Command rejected. Holds whatever followed the error marker.
    Rejected(&'a str),
    /// Digital input event for the given pin.
    Digital(&'a str),
    /// Analog sample.
    Analog { pin: &'a str, value: u16 },
}

impl DeviceLine<'_> {
    /// Returns `true` for `OK` and error replies.
    ///
    /// Replies only matter to a confirmed send; everything else is data.
    #[must_use]
    pub const fn is_reply(&self) -> bool {
        matches!(self, Self::Ack | Self::Rejected(_))
    }
}

/// Error type for device line parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Nothing but whitespace on the line.
    Empty,
    /// An analog sample with nothing before the colon.
    EmptyPin,
    /// An analog sample whose value is not an unsigned 16-bit integer.
    InvalidValue,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty line"),
            Self::EmptyPin => write!(f, "missing pin identifier"),
            Self::InvalidValue => write!(f, "invalid analog value"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ParseError {}

/// Parse one line received from the device.
///
/// Trailing CR/LF and surrounding whitespace are ignored.
///
/// # Example
///
/// ```text
/// OK          -> DeviceLine::Ack
/// ERR bad pin -> DeviceLine::Rejected("bad pin")
/// A0:512      -> DeviceLine::Analog { pin: "A0", value: 512 }
/// 2           -> DeviceLine::Digital("2")
/// ```
pub fn parse_line(line: &str) -> Result<DeviceLine<'_>, ParseError> {
    let line = line.trim();

    if line.is_empty() {
        return Err(ParseError::Empty);
    }

    if line == ACK {
        return Ok(DeviceLine::Ack);
    }

    if let Some(rest) = line.strip_prefix(ERROR_MARKER) {
        let reason = rest.trim_start_matches([':', ' ']).trim();
        return Ok(DeviceLine::Rejected(reason));
    }

    match line.split_once(':') {
        Some((pin, value)) => {
            let pin = pin.trim();
            if pin.is_empty() {
                return Err(ParseError::EmptyPin);
            }
            let value = parse_u16(value.as_bytes())?;
            Ok(DeviceLine::Analog { pin, value })
        }
        None => Ok(DeviceLine::Digital(line)),
    }
}

/// Parse a decimal string as u16 (with optional surrounding spaces).
#[inline]
fn parse_u16(s: &[u8]) -> Result<u16, ParseError> {
    let s = trim_spaces(s);
    if s.is_empty() {
        return Err(ParseError::InvalidValue);
    }

    let mut value: u32 = 0;
    for &b in s {
        if !b.is_ascii_digit() {
            return Err(ParseError::InvalidValue);
        }
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add((b - b'0') as u32))
            .ok_or(ParseError::InvalidValue)?;
        if value > u16::MAX as u32 {
            return Err(ParseError::InvalidValue);
        }
    }

    Ok(value as u16)
}

#[inline]
fn trim_spaces(s: &[u8]) -> &[u8] {
    let start = s.iter().position(|&b| b != b' ').unwrap_or(s.len());
    let end = s.iter().rposition(|&b| b != b' ').map_or(start, |p| p + 1);
    &s[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ack() {
        assert_eq!(parse_line("OK"), Ok(DeviceLine::Ack));
        assert_eq!(parse_line("OK\r\n"), Ok(DeviceLine::Ack));
    }

    #[test]
    fn test_ack_must_match_exactly() {
        // Anything other than a bare OK is a pin event, not an acknowledgement
        assert_eq!(parse_line("OKAY"), Ok(DeviceLine::Digital("OKAY")));
    }

    #[test]
    fn test_parse_rejection() {
        assert_eq!(parse_line("ERR"), Ok(DeviceLine::Rejected("")));
        assert_eq!(parse_line("ERR\n"), Ok(DeviceLine::Rejected("")));
        assert_eq!(
            parse_line("ERR: unknown pin"),
            Ok(DeviceLine::Rejected("unknown pin"))
        );
        assert_eq!(parse_line("ERR bad mode"), Ok(DeviceLine::Rejected("bad mode")));
    }

    #[test]
    fn test_parse_digital_event() {
        assert_eq!(parse_line("2\n"), Ok(DeviceLine::Digital("2")));
        assert_eq!(parse_line("  7 \r\n"), Ok(DeviceLine::Digital("7")));
    }

    #[test]
    fn test_parse_analog_sample() {
        assert_eq!(
            parse_line("A0:500\n"),
            Ok(DeviceLine::Analog {
                pin: "A0",
                value: 500
            })
        );
        assert_eq!(
            parse_line("A1: 1023"),
            Ok(DeviceLine::Analog {
                pin: "A1",
                value: 1023
            })
        );
        assert_eq!(
            parse_line("A2:0"),
            Ok(DeviceLine::Analog {
                pin: "A2",
                value: 0
            })
        );
    }

    #[test]
    fn test_parse_analog_bounds() {
        assert_eq!(
            parse_line("A0:65535"),
            Ok(DeviceLine::Analog {
                pin: "A0",
                value: u16::MAX
            })
        );
        assert_eq!(parse_line("A0:65536"), Err(ParseError::InvalidValue));
        assert_eq!(parse_line("A0:99999999999"), Err(ParseError::InvalidValue));
    }

    #[test]
    fn test_parse_malformed_analog() {
        assert_eq!(parse_line("A0:"), Err(ParseError::InvalidValue));
        assert_eq!(parse_line("A0:abc"), Err(ParseError::InvalidValue));
        assert_eq!(parse_line("A0:-5"), Err(ParseError::InvalidValue));
        assert_eq!(parse_line("A0:1:2"), Err(ParseError::InvalidValue));
        assert_eq!(parse_line(":12"), Err(ParseError::EmptyPin));
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(parse_line(""), Err(ParseError::Empty));
        assert_eq!(parse_line("\n"), Err(ParseError::Empty));
        assert_eq!(parse_line("\r\n"), Err(ParseError::Empty));
    }

    #[test]
    fn test_is_reply() {
        assert!(DeviceLine::Ack.is_reply());
        assert!(DeviceLine::Rejected("x").is_reply());
        assert!(!DeviceLine::Digital("2").is_reply());
        let sample = DeviceLine::Analog {
            pin: "A0",
            value: 1,
        };
        assert!(!sample.is_reply());
    }
}

//! Protocol serialization for commands and device lines.
//!
//! This module provides the [`Serialize`] trait for writing [`Command`]s (host
//! side) and [`DeviceLine`]s (device side, also handy for simulated peers) in
//! the newline-terminated wire format.
//!
//! # Example
//!
//! ```
//! use keymap_proto::{Command, Serialize, MAX_COMMAND_SIZE};
//!
//! let mut buf = [0u8; MAX_COMMAND_SIZE];
//! let len = Command::PwmWrite { pin: "9", duty: 200 }.serialize(&mut buf).unwrap();
//! assert_eq!(&buf[..len], b"P,9,200\n");
//! ```

use core::fmt;

use crate::command::{Command, MAX_PIN_LEN, MAX_SERVO_ANGLE};
use crate::fmt::{write_u16, write_u8};
use crate::parser::{DeviceLine, ACK, ERROR_MARKER, MAX_LINE_LENGTH};

/// Maximum size of a serialized command.
///
/// Breakdown: `mode output ` (12) + pin (8) + `\n` (1) = 21.
/// We use 32 for safety margin.
pub const MAX_COMMAND_SIZE: usize = 32;

/// Error type for serialization operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializeError {
    /// The output buffer is too small to hold the serialized message.
    BufferTooSmall,
    /// The pin identifier is empty or longer than [`MAX_PIN_LEN`].
    InvalidPin,
    /// A value lies outside the range the command accepts.
    OutOfRange,
    /// A write operation failed (for writer adapters).
    WriteError,
}

impl fmt::Display for SerializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooSmall => write!(f, "buffer too small"),
            Self::InvalidPin => write!(f, "invalid pin identifier"),
            Self::OutOfRange => write!(f, "value out of range"),
            Self::WriteError => write!(f, "write error"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SerializeError {}

/// Bounds-checked cursor over the output buffer.
struct SerializeBuf<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> SerializeBuf<'a> {
    #[inline]
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[inline]
    fn write_slice(&mut self, bytes: &[u8]) -> Result<(), SerializeError> {
        let end = self.pos + bytes.len();
        if end > self.buf.len() {
            return Err(SerializeError::BufferTooSmall);
        }
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    #[inline]
    fn write_pin(&mut self, pin: &str) -> Result<(), SerializeError> {
        if pin.is_empty() || pin.len() > MAX_PIN_LEN {
            return Err(SerializeError::InvalidPin);
        }
        self.write_slice(pin.as_bytes())
    }

    #[inline]
    fn write_u8(&mut self, value: u8) -> Result<(), SerializeError> {
        let mut tmp = [0u8; 3];
        let len = write_u8(&mut tmp, value);
        self.write_slice(&tmp[..len])
    }

    #[inline]
    fn write_u16(&mut self, value: u16) -> Result<(), SerializeError> {
        let mut tmp = [0u8; 5];
        let len = write_u16(&mut tmp, value);
        self.write_slice(&tmp[..len])
    }

    /// Terminate the line and return the total length.
    #[inline]
    fn finalize(mut self) -> Result<usize, SerializeError> {
        self.write_slice(b"\n")?;
        Ok(self.pos)
    }
}

/// Extension trait for serializing protocol messages.
pub trait Serialize {
    /// Serialize to the provided buffer, newline included.
    ///
    /// Returns the number of bytes written on success.
    ///
    /// # Errors
    ///
    /// Returns [`SerializeError::BufferTooSmall`] if the buffer is not large
    /// enough, or a validation error if the message cannot be expressed.
    fn serialize(&self, buf: &mut [u8]) -> Result<usize, SerializeError>;

    /// Serialize to a `core::fmt::Write` implementation.
    ///
    /// # Errors
    ///
    /// Returns [`SerializeError::WriteError`] if the write fails.
    fn serialize_fmt<W: fmt::Write>(&self, writer: &mut W) -> Result<(), SerializeError> {
        let mut buf = [0u8; MAX_LINE_LENGTH];
        let len = self.serialize(&mut buf)?;
        let s = core::str::from_utf8(&buf[..len]).map_err(|_| SerializeError::WriteError)?;
        writer.write_str(s).map_err(|_| SerializeError::WriteError)
    }

    /// Serialize to a `heapless::Vec`.
    ///
    /// # Errors
    ///
    /// Returns [`SerializeError::BufferTooSmall`] if `N` is not large enough.
    #[cfg(feature = "heapless")]
    fn serialize_to_vec<const N: usize>(&self) -> Result<heapless::Vec<u8, N>, SerializeError> {
        let mut vec = heapless::Vec::new();
        vec.resize(N, 0)
            .map_err(|_| SerializeError::BufferTooSmall)?;
        let len = self.serialize(&mut vec)?;
        vec.truncate(len);
        Ok(vec)
    }
}

impl Serialize for Command<'_> {
    fn serialize(&self, buf: &mut [u8]) -> Result<usize, SerializeError> {
        let mut sb = SerializeBuf::new(buf);

        match *self {
            Self::Clear => sb.write_slice(b"clear")?,
            Self::Mode { mode, pin } => {
                sb.write_slice(b"mode ")?;
                sb.write_slice(mode.as_str().as_bytes())?;
                sb.write_slice(b" ")?;
                sb.write_pin(pin)?;
            }
            Self::DigitalWrite { pin, high } => {
                sb.write_slice(b"D,")?;
                sb.write_pin(pin)?;
                sb.write_slice(if high { b",1" } else { b",0" })?;
            }
            Self::PwmWrite { pin, duty } => {
                sb.write_slice(b"P,")?;
                sb.write_pin(pin)?;
                sb.write_slice(b",")?;
                sb.write_u8(duty)?;
            }
            Self::ServoWrite { pin, angle } => {
                if angle > MAX_SERVO_ANGLE {
                    return Err(SerializeError::OutOfRange);
                }
                sb.write_slice(b"S,")?;
                sb.write_pin(pin)?;
                sb.write_slice(b",")?;
                sb.write_u8(angle)?;
            }
        }

        sb.finalize()
    }
}

impl Serialize for DeviceLine<'_> {
    fn serialize(&self, buf: &mut [u8]) -> Result<usize, SerializeError> {
        let mut sb = SerializeBuf::new(buf);

        match *self {
            Self::Ack => sb.write_slice(ACK.as_bytes())?,
            Self::Rejected(reason) => {
                sb.write_slice(ERROR_MARKER.as_bytes())?;
                if !reason.is_empty() {
                    sb.write_slice(b" ")?;
                    sb.write_slice(reason.as_bytes())?;
                }
            }
            Self::Digital(pin) => sb.write_pin(pin)?,
            Self::Analog { pin, value } => {
                sb.write_pin(pin)?;
                sb.write_slice(b":")?;
                sb.write_u16(value)?;
            }
        }

        sb.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::PinMode;
    use crate::parser::parse_line;

    fn serialized(cmd: Command<'_>) -> ([u8; MAX_COMMAND_SIZE], usize) {
        let mut buf = [0u8; MAX_COMMAND_SIZE];
        let len = cmd.serialize(&mut buf).unwrap();
        (buf, len)
    }

    #[test]
    fn test_serialize_clear() {
        let (buf, len) = serialized(Command::Clear);
        assert_eq!(&buf[..len], b"clear\n");
    }

    #[test]
    fn test_serialize_mode() {
        let (buf, len) = serialized(Command::Mode {
            mode: PinMode::DigitalInput,
            pin: "2",
        });
        assert_eq!(&buf[..len], b"mode digital 2\n");

        let (buf, len) = serialized(Command::Mode {
            mode: PinMode::Servo,
            pin: "10",
        });
        assert_eq!(&buf[..len], b"mode servo 10\n");
    }

    #[test]
    fn test_serialize_writes() {
        let (buf, len) = serialized(Command::DigitalWrite {
            pin: "13",
            high: true,
        });
        assert_eq!(&buf[..len], b"D,13,1\n");

        let (buf, len) = serialized(Command::DigitalWrite {
            pin: "13",
            high: false,
        });
        assert_eq!(&buf[..len], b"D,13,0\n");

        let (buf, len) = serialized(Command::PwmWrite { pin: "9", duty: 0 });
        assert_eq!(&buf[..len], b"P,9,0\n");

        let (buf, len) = serialized(Command::ServoWrite {
            pin: "3",
            angle: 180,
        });
        assert_eq!(&buf[..len], b"S,3,180\n");
    }

    #[test]
    fn test_servo_angle_out_of_range() {
        let mut buf = [0u8; MAX_COMMAND_SIZE];
        let command = Command::ServoWrite {
            pin: "3",
            angle: 181,
        };
        let result = command.serialize(&mut buf);
        assert_eq!(result, Err(SerializeError::OutOfRange));
    }

    #[test]
    fn test_invalid_pins_rejected() {
        let mut buf = [0u8; MAX_COMMAND_SIZE];
        assert_eq!(
            Command::PwmWrite { pin: "", duty: 1 }.serialize(&mut buf),
            Err(SerializeError::InvalidPin)
        );
        assert_eq!(
            Command::PwmWrite {
                pin: "PIN_TOO_LONG",
                duty: 1
            }
            .serialize(&mut buf),
            Err(SerializeError::InvalidPin)
        );
    }

    #[cfg(feature = "heapless")]
    #[test]
    fn test_serialize_to_vec() {
        let vec = Command::Clear.serialize_to_vec::<MAX_COMMAND_SIZE>().unwrap();
        assert_eq!(vec.as_slice(), b"clear\n");

        assert_eq!(Command::Clear.serialize_to_vec::<4>(), Err(SerializeError::BufferTooSmall));
    }

    #[test]
    fn test_buffer_too_small() {
        let mut buf = [0u8; 4];
        assert_eq!(
            Command::Clear.serialize(&mut buf),
            Err(SerializeError::BufferTooSmall)
        );
    }

    #[test]
    fn test_longest_command_fits() {
        let mut buf = [0u8; MAX_COMMAND_SIZE];
        let len = Command::Mode {
            mode: PinMode::DigitalOutput,
            pin: "ABCDEFGH",
        }
        .serialize(&mut buf)
        .unwrap();
        assert_eq!(&buf[..len], b"mode output ABCDEFGH\n");
    }

    #[test]
    fn test_serialize_device_lines_parse_back() {
        let mut buf = [0u8; MAX_LINE_LENGTH];

        let sample = DeviceLine::Analog {
            pin: "A0",
            value: 1023,
        };
        let len = sample.serialize(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"A0:1023\n");
        let line = core::str::from_utf8(&buf[..len]).unwrap();
        assert_eq!(parse_line(line), Ok(sample));

        let len = DeviceLine::Rejected("busy").serialize(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"ERR busy\n");

        let len = DeviceLine::Ack.serialize(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"OK\n");
    }

    #[test]
    fn test_serialize_fmt() {
        struct Sink {
            data: [u8; 16],
            len: usize,
        }

        impl fmt::Write for Sink {
            fn write_str(&mut self, s: &str) -> fmt::Result {
                let end = self.len + s.len();
                if end > self.data.len() {
                    return Err(fmt::Error);
                }
                self.data[self.len..end].copy_from_slice(s.as_bytes());
                self.len = end;
                Ok(())
            }
        }

        let mut sink = Sink {
            data: [0; 16],
            len: 0,
        };
        let command = Command::DigitalWrite {
            pin: "4",
            high: true,
        };
        command.serialize_fmt(&mut sink).unwrap();
        assert_eq!(&sink.data[..sink.len], b"D,4,1\n");
    }
}

//! Line protocol types, parsing, and serialization for the serial keymapper.
//!
//! This crate provides everything needed to speak to the microcontroller on
//! the other end of the serial link:
//!
//! - **Commands**: Host-to-device messages
//!   - [`Command`] - configuration and output writes
//!   - [`PinMode`] - pin configuration keywords
//!
//! - **Parsing**: Parse incoming device lines
//!   - [`parse_line()`] - Parse a single line
//!   - [`DeviceLine`] - Result of parsing
//!
//! - **Serialization**: Serialize outgoing lines
//!   - [`Serialize`] trait - Extension trait for serialization
//!
//! # Protocol Format
//!
//! The protocol is plain ASCII, one message per newline-terminated line.
//!
//! ## Host to device
//!
//! ```text
//! clear
//! mode <digital|analog|output|pwm|servo> <pin>
//! D,<pin>,<0|1>
//! P,<pin>,<0-255>
//! S,<pin>,<0-180>
//! ```
//!
//! ## Device to host
//!
//! ```text
//! OK              command accepted
//! ERR[ reason]    command rejected
//! <pin>           digital input event
//! <pin>:<value>   analog sample
//! ```
//!
//! # Examples
//!
//! ```
//! use keymap_proto::{parse_line, DeviceLine};
//!
//! assert_eq!(
//!     parse_line("A0:512\r\n"),
//!     Ok(DeviceLine::Analog { pin: "A0", value: 512 })
//! );
//! assert_eq!(parse_line("2"), Ok(DeviceLine::Digital("2")));
//! ```
//!
//! # Features
//!
//! - **`std`**: Enable standard library support (`std::error::Error` impls)
//! - **`heapless`**: Enable `serialize_to_vec()` methods
//!
//! # No-std Support
//!
//! This crate is `#![no_std]` by default and uses no heap allocations, so
//! the same definitions can be shared with firmware.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

pub mod command;
mod fmt;
pub mod parser;
pub mod serialize;

// Re-export types at crate root for convenience
pub use command::{Command, PinMode, UnknownPinMode, MAX_PIN_LEN, MAX_SERVO_ANGLE};
pub use parser::{parse_line, DeviceLine, ParseError, ACK, ERROR_MARKER, MAX_LINE_LENGTH};
pub use serialize::{Serialize, SerializeError, MAX_COMMAND_SIZE};

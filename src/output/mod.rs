//! Key sink implementations.
//!
//! [`keymap_core::LogKeySink`] is always available for dry runs; the uinput
//! sink needs Linux and the `uinput` feature.

#[cfg(all(target_os = "linux", feature = "uinput"))]
pub mod uinput;

#[cfg(all(target_os = "linux", feature = "uinput"))]
pub use uinput::{parse_key, UinputKeySink};

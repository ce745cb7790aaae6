//! Device link implementations.

pub mod serial;

pub use serial::{SerialTransport, DEFAULT_BAUD_RATE};

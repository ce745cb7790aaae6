//! Host side of the serial keymapper: configuration, the serial link, the
//! virtual keyboard, and logger setup.

pub mod clock;
pub mod config;
pub mod input;
pub mod logging;
pub mod output;

pub use clock::SystemClock;
pub use config::{Config, ConfigError};
pub use input::{SerialTransport, DEFAULT_BAUD_RATE};

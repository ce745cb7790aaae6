//! Key action sink trait and error types.

use core::fmt;

use log::info;

/// Error type for key sink operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The key name does not correspond to any key the sink can produce.
    UnknownKey(String),
    /// The host rejected the event.
    Io(String),
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownKey(key) => write!(f, "unknown key '{}'", key),
            Self::Io(msg) => write!(f, "key injection failed: {}", msg),
        }
    }
}

impl std::error::Error for SinkError {}

/// Receiver of key press and release actions.
///
/// This trait abstracts how a key event reaches the host (virtual input
/// device, logging, test recorder). The mapping engine tracks pressed state
/// itself and never calls `press` twice without a `release` in between, but
/// implementations must still tolerate keys whose host-level state is
/// unknown.
pub trait KeySink {
    /// Press and hold a key.
    fn press(&mut self, key: &str) -> Result<(), SinkError>;

    /// Release a key.
    fn release(&mut self, key: &str) -> Result<(), SinkError>;
}

impl<S: KeySink + ?Sized> KeySink for Box<S> {
    fn press(&mut self, key: &str) -> Result<(), SinkError> {
        (**self).press(key)
    }

    fn release(&mut self, key: &str) -> Result<(), SinkError> {
        (**self).release(key)
    }
}

/// Sink that only logs the actions it receives.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogKeySink;

impl KeySink for LogKeySink {
    fn press(&mut self, key: &str) -> Result<(), SinkError> {
        info!("[dry run] press {}", key);
        Ok(())
    }

    fn release(&mut self, key: &str) -> Result<(), SinkError> {
        info!("[dry run] release {}", key);
        Ok(())
    }
}

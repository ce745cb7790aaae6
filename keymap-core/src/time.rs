//! Time source abstraction.
//!
//! The engine, the plugins, and the command channel never read the system
//! clock directly. They are handed an [`Instant`] (or a [`Clock`]) so that
//! the whole tick can be driven by virtual time in tests.

use embassy_time::Instant;

/// Monotonic time source.
pub trait Clock {
    /// Current instant.
    fn now(&self) -> Instant;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

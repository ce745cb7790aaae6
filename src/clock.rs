//! Wall clock backed by the embassy-time std driver.

use embassy_time::Instant;
use keymap_core::Clock;

/// [`Clock`] reading `embassy_time::Instant::now()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

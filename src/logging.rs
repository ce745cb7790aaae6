//! Logger setup from the `--log` verbosity ordinal.
//!
//! | Level | Shows                                                   |
//! |-------|---------------------------------------------------------|
//! | 0     | warnings and errors                                     |
//! | 1     | key presses/releases, configuration progress (default)  |
//! | 2     | lifecycle, command outcomes, plugin writes              |
//! | 3     | analog samples and hold times                           |
//! | 4     | everything, including raw serial traffic                |
//!
//! `RUST_LOG` directives are applied on top.

use keymap_core::WIRE_TARGET;
use log::LevelFilter;

/// Highest accepted verbosity.
pub const MAX_VERBOSITY: u8 = 4;

/// Global level for a verbosity ordinal.
#[must_use]
pub fn level_filter(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn filters(verbosity: u8) -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level_filter(verbosity));
    if verbosity < MAX_VERBOSITY {
        builder.filter_module(WIRE_TARGET, LevelFilter::Off);
    }
    builder
}

/// Install the global logger.
pub fn init(verbosity: u8) {
    let mut builder = filters(verbosity);
    builder.parse_default_env();
    builder.init();
}

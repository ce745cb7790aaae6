//! Host-agnostic core of the serial keymapper.
//!
//! This crate turns lines streamed by a microcontroller into key press and
//! release actions, and runs small output plugins against the same serial
//! link. It has no platform-specific dependencies: the link, the key
//! injector, and the clock are all traits, so the whole loop can be driven
//! by virtual time in tests.
//!
//! # Overview
//!
//! - [`channel`]: confirmed and fire-and-forget sends ([`CommandChannel`])
//! - [`mapping`]: pin-to-key configuration ([`KeyMap`], [`ThresholdRule`])
//! - [`engine`]: per-key state machines ([`MappingEngine`])
//! - [`plugin`]: output plugins and their scheduler ([`PluginScheduler`])
//! - [`sink`]: key action receiver trait ([`KeySink`])
//! - [`bridge`]: the setup / tick / shutdown cycle ([`KeymapBridge`])
//!
//! # Tick
//!
//! ```text
//! plugins.update_all() -> channel.try_read_line() -> engine.handle_line()
//!     -> engine.check_timeouts() -> pause(1 ms)
//! ```

pub mod bridge;
pub mod channel;
pub mod engine;
pub mod mapping;
pub mod plugin;
pub mod sink;
pub mod time;
pub mod transport;

// Re-export main types at crate root
pub use bridge::{KeymapBridge, SetupReport, DEFAULT_TICK_INTERVAL};
pub use channel::{
    ChannelError, CommandChannel, CommandOutcome, OutputPort, RetryPolicy, WIRE_TARGET,
};
pub use engine::{KeyState, MappingEngine, PressSource, DEFAULT_MAX_HOLD};
pub use mapping::{KeyMap, MappingError, PinMapping, ThresholdRule};
pub use plugin::{
    PinRequirement, Plugin, PluginError, PluginRegistry, PluginScheduler, PluginSettings,
};
pub use sink::{KeySink, LogKeySink, SinkError};
pub use time::Clock;
pub use transport::{LineBuffer, Transport};

//! Output-producing plugins.
//!
//! A plugin is a small unit that owns one output pin and decides on its own
//! schedule what to write to it. All plugins share one capability
//! interface, [`Plugin`], and are constructed by name through a closed
//! [`PluginRegistry`] of known kinds:
//!
//! | Name             | Behavior                                       |
//! |------------------|------------------------------------------------|
//! | `servo_sweeper`  | Sweeps a servo back and forth                  |
//! | `random_output`  | Writes random PWM/digital/servo values         |
//! | `cpu_monitor`    | Drives a digital pin from host CPU usage       |
//!
//! Plugins only ever see an [`OutputPort`], so they can issue
//! fire-and-forget writes but never block on a confirmed send.

use core::fmt;
use std::collections::BTreeMap;

use embassy_time::{Duration, Instant};
use keymap_proto::PinMode;
use serde_json::{Map, Value};

use crate::channel::{ChannelError, OutputPort};

pub mod cpu_monitor;
pub mod random_output;
pub mod scheduler;
pub mod servo_sweeper;

pub use cpu_monitor::{CpuMonitor, LoadSource, ProcStatLoad};
pub use random_output::{OutputType, RandomOutput};
pub use scheduler::PluginScheduler;
pub use servo_sweeper::ServoSweeper;

/// Error type for plugin construction and updates.
#[derive(Debug)]
pub enum PluginError {
    /// No plugin kind is registered under this name.
    UnknownPlugin(String),
    /// A setting is present but unusable.
    InvalidSetting { key: String, reason: &'static str },
    /// Writing to the device failed.
    Channel(ChannelError),
}

impl fmt::Display for PluginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownPlugin(name) => write!(f, "unknown plugin '{}'", name),
            Self::InvalidSetting { key, reason } => {
                write!(f, "invalid setting '{}': {}", key, reason)
            }
            Self::Channel(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for PluginError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Channel(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ChannelError> for PluginError {
    fn from(err: ChannelError) -> Self {
        Self::Channel(err)
    }
}

impl PluginError {
    fn invalid(key: &str, reason: &'static str) -> Self {
        Self::InvalidSetting {
            key: key.to_owned(),
            reason,
        }
    }
}

/// An output pin a plugin needs configured before the loop starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinRequirement {
    pub pin: String,
    pub mode: PinMode,
}

/// Capability interface shared by every plugin kind.
pub trait Plugin {
    /// Name the plugin was registered under.
    fn name(&self) -> &str;

    /// Output pins this plugin drives, with the mode each needs.
    fn required_pin_modes(&self) -> Vec<PinRequirement>;

    /// Called once per loop tick.
    ///
    /// Implementations rate-limit themselves; most calls should return
    /// without writing anything.
    fn update(&mut self, now: Instant, port: &mut dyn OutputPort) -> Result<(), PluginError>;
}

/// Free-form plugin settings from the configuration document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginSettings(Map<String, Value>);

impl From<Map<String, Value>> for PluginSettings {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl PluginSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly useful in tests.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_owned(), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The `pin` setting, accepted as a string or a non-negative integer.
    pub fn pin(&self) -> Result<Option<String>, PluginError> {
        match self.0.get("pin") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.trim().to_owned())),
            Some(Value::Number(n)) => n
                .as_u64()
                .map(|n| Some(n.to_string()))
                .ok_or_else(|| PluginError::invalid("pin", "expected a non-negative integer")),
            Some(_) => Err(PluginError::invalid("pin", "expected a string or integer")),
        }
    }

    /// An unsigned integer setting, or `default` when absent.
    pub fn u64_or(&self, key: &str, default: u64) -> Result<u64, PluginError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => value
                .as_u64()
                .ok_or_else(|| PluginError::invalid(key, "expected a non-negative integer")),
        }
    }

    /// An unsigned setting that must fit in a byte.
    pub fn u8_or(&self, key: &str, default: u8) -> Result<u8, PluginError> {
        let value = self.u64_or(key, u64::from(default))?;
        u8::try_from(value).map_err(|_| PluginError::invalid(key, "expected a value in 0..=255"))
    }

    /// A numeric setting, or `default` when absent.
    pub fn f64_or(&self, key: &str, default: f64) -> Result<f64, PluginError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => value
                .as_f64()
                .ok_or_else(|| PluginError::invalid(key, "expected a number")),
        }
    }

    /// A string setting, or `default` when absent.
    pub fn str_or<'a>(&'a self, key: &str, default: &'a str) -> Result<&'a str, PluginError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(Value::String(s)) => Ok(s),
            Some(_) => Err(PluginError::invalid(key, "expected a string")),
        }
    }

    /// A millisecond interval setting.
    pub fn millis_or(&self, key: &str, default_ms: u64) -> Result<Duration, PluginError> {
        self.u64_or(key, default_ms).map(Duration::from_millis)
    }
}

/// Self-imposed minimum spacing between a plugin's actions.
///
/// The first check always passes, matching a plugin whose last action was
/// "long ago".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    period: Duration,
    last: Option<Instant>,
}

impl RateLimit {
    #[must_use]
    pub const fn new(period: Duration) -> Self {
        Self { period, last: None }
    }

    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Returns `true` (and restarts the period) if an action is due.
    pub fn ready(&mut self, now: Instant) -> bool {
        let due = match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.period,
        };
        if due {
            self.last = Some(now);
        }
        due
    }
}

/// Constructor registered for a plugin kind.
pub type PluginConstructor = fn(&PluginSettings) -> Result<Box<dyn Plugin>, PluginError>;

/// Closed mapping from plugin names to constructors.
pub struct PluginRegistry {
    constructors: BTreeMap<&'static str, PluginConstructor>,
}

impl PluginRegistry {
    /// Registry with no kinds.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Registry with every built-in kind.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(servo_sweeper::NAME, |settings| {
            Ok(Box::new(ServoSweeper::from_settings(settings)?))
        });
        registry.register(random_output::NAME, |settings| {
            Ok(Box::new(RandomOutput::from_settings(settings)?))
        });
        registry.register(cpu_monitor::NAME, |settings| {
            Ok(Box::new(CpuMonitor::from_settings(
                settings,
                ProcStatLoad::new(),
            )?))
        });
        registry
    }

    /// Add or replace a kind.
    pub fn register(&mut self, name: &'static str, constructor: PluginConstructor) {
        self.constructors.insert(name, constructor);
    }

    /// Registered names, sorted.
    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.constructors.keys().copied()
    }

    /// Construct a plugin by name.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::UnknownPlugin`] for unregistered names, or the
    /// constructor's error for bad settings.
    pub fn create(
        &self,
        name: &str,
        settings: &PluginSettings,
    ) -> Result<Box<dyn Plugin>, PluginError> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| PluginError::UnknownPlugin(name.to_owned()))?;
        constructor(settings)
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

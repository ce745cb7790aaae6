//! JSON configuration document.
//!
//! ```json
//! {
//!   "port": "/dev/ttyUSB0",
//!   "key_mapping": {
//!     "2":  { "key": "a" },
//!     "A0": [ { "key": "w", "threshold": [300, 700], "hold_time_ms": 50 } ]
//!   },
//!   "plugins": [ { "name": "servo_sweeper", "settings": { "pin": 9 } } ]
//! }
//! ```

use core::fmt;
use core::str::FromStr;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use embassy_time::Duration;
use keymap_core::{
    KeyMap, MappingError, PluginRegistry, PluginScheduler, PluginSettings, ThresholdRule,
};
use log::{info, warn};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Error type for loading the configuration document.
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read.
    Io(io::Error),
    /// The document is not valid JSON or has the wrong shape.
    Json(serde_json::Error),
    /// A pin mapping is invalid.
    Mapping { pin: String, source: MappingError },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "cannot read configuration: {}", e),
            Self::Json(e) => write!(f, "malformed configuration: {}", e),
            Self::Mapping { pin, source } => write!(f, "pin '{}': {}", pin, source),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Mapping { source, .. } => Some(source),
        }
    }
}

impl From<io::Error> for ConfigError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Config {
    /// Serial port name; `--port` overrides it.
    #[serde(default)]
    pub port: Option<String>,
    /// Input pin → key mapping.
    #[serde(default)]
    pub key_mapping: BTreeMap<String, PinConfig>,
    /// Plugins, in load order.
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
}

/// One entry of `key_mapping`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PinConfig {
    /// `{ "key": "a" }`
    Digital { key: String },
    /// `[ { "key": "w", "threshold": [300, 700], "hold_time_ms": 50 }, ... ]`
    Analog(Vec<AnalogRuleConfig>),
}

/// One analog threshold rule.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnalogRuleConfig {
    pub key: String,
    pub threshold: [u16; 2],
    #[serde(default)]
    pub hold_time_ms: u64,
}

/// One entry of `plugins`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PluginConfig {
    pub name: String,
    #[serde(default)]
    pub settings: Map<String, Value>,
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(serde_json::from_str(s)?)
    }
}

impl Config {
    /// Read and parse a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        fs::read_to_string(path)?.parse()
    }

    /// Build the validated pin-to-key map.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Mapping`] for empty names or inverted
    /// thresholds.
    pub fn keymap(&self) -> Result<KeyMap, ConfigError> {
        let mut map = KeyMap::new();
        for (pin, entry) in &self.key_mapping {
            let mapped = match entry {
                PinConfig::Digital { key } => map.insert_digital(pin.as_str(), key.as_str()),
                PinConfig::Analog(rules) => rules
                    .iter()
                    .map(|rule| {
                        ThresholdRule::new(
                            rule.key.as_str(),
                            rule.threshold[0],
                            rule.threshold[1],
                            Duration::from_millis(rule.hold_time_ms),
                        )
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .and_then(|rules| map.insert_analog(pin.as_str(), rules)),
            };
            mapped.map_err(|source| ConfigError::Mapping {
                pin: pin.clone(),
                source,
            })?;
        }
        Ok(map)
    }

    /// Construct every configured plugin.
    ///
    /// Unknown names and plugins whose settings are rejected are logged and
    /// skipped.
    pub fn plugins(&self, registry: &PluginRegistry) -> PluginScheduler {
        let mut scheduler = PluginScheduler::new();
        for entry in &self.plugins {
            let settings = PluginSettings::from(entry.settings.clone());
            match registry.create(&entry.name, &settings) {
                Ok(plugin) => {
                    info!("Loaded plugin '{}'", entry.name);
                    scheduler.add(plugin);
                }
                Err(e) => warn!("Skipping plugin '{}': {}", entry.name, e),
            }
        }
        scheduler
    }
}

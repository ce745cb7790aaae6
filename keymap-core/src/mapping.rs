//! Pin-to-key mapping types.

use core::fmt;
use std::collections::BTreeMap;

use embassy_time::Duration;
use keymap_proto::PinMode;

/// One analog threshold band mapped to a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdRule {
    /// Key pressed while the value stays inside the band.
    pub key: String,
    /// Inclusive lower bound.
    pub low: u16,
    /// Inclusive upper bound.
    pub high: u16,
    /// Continuous in-range time required before the key is pressed.
    pub hold_required: Duration,
}

impl ThresholdRule {
    /// Create a rule, checking that the band is well formed.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError`] if the key is empty or `low > high`.
    pub fn new(
        key: impl Into<String>,
        low: u16,
        high: u16,
        hold_required: Duration,
    ) -> Result<Self, MappingError> {
        let key = key.into();
        if key.is_empty() {
            return Err(MappingError::EmptyKey);
        }
        if low > high {
            return Err(MappingError::InvertedThreshold { low, high });
        }
        Ok(Self {
            key,
            low,
            high,
            hold_required,
        })
    }

    /// Both bounds are inclusive.
    #[inline]
    #[must_use]
    pub fn contains(&self, value: u16) -> bool {
        self.low <= value && value <= self.high
    }
}

/// How one physical input pin maps to keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinMapping {
    /// A digital pin drives a single key.
    Digital { key: String },
    /// An analog pin drives any number of independent threshold rules.
    Analog { rules: Vec<ThresholdRule> },
}

impl PinMapping {
    /// Mode the device must configure the pin with.
    #[must_use]
    pub fn pin_mode(&self) -> PinMode {
        match self {
            Self::Digital { .. } => PinMode::DigitalInput,
            Self::Analog { .. } => PinMode::AnalogInput,
        }
    }

    /// Every key this mapping may press.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        let (single, rules) = match self {
            Self::Digital { key } => (Some(key.as_str()), &[][..]),
            Self::Analog { rules } => (None, rules.as_slice()),
        };
        single
            .into_iter()
            .chain(rules.iter().map(|rule| rule.key.as_str()))
    }
}

/// Error type for building mappings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    /// A mapping names an empty key.
    EmptyKey,
    /// A pin identifier is empty.
    EmptyPin,
    /// A threshold band has its bounds reversed.
    InvertedThreshold { low: u16, high: u16 },
}

impl fmt::Display for MappingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyKey => write!(f, "key must not be empty"),
            Self::EmptyPin => write!(f, "pin must not be empty"),
            Self::InvertedThreshold { low, high } => {
                write!(f, "threshold low bound {} exceeds high bound {}", low, high)
            }
        }
    }
}

impl std::error::Error for MappingError {}

/// All configured input pins, iterated in pin order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyMap {
    pins: BTreeMap<String, PinMapping>,
}

impl KeyMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a digital pin to a key, replacing any previous mapping of the pin.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError`] for an empty pin or key.
    pub fn insert_digital(
        &mut self,
        pin: impl Into<String>,
        key: impl Into<String>,
    ) -> Result<(), MappingError> {
        let key = key.into();
        if key.is_empty() {
            return Err(MappingError::EmptyKey);
        }
        self.insert(pin.into(), PinMapping::Digital { key })
    }

    /// Map an analog pin to threshold rules, replacing any previous mapping
    /// of the pin.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::EmptyPin`] for an empty pin.
    pub fn insert_analog(
        &mut self,
        pin: impl Into<String>,
        rules: Vec<ThresholdRule>,
    ) -> Result<(), MappingError> {
        self.insert(pin.into(), PinMapping::Analog { rules })
    }

    fn insert(&mut self, pin: String, mapping: PinMapping) -> Result<(), MappingError> {
        if pin.is_empty() {
            return Err(MappingError::EmptyPin);
        }
        self.pins.insert(pin, mapping);
        Ok(())
    }

    /// Mapping for a pin, if configured.
    #[must_use]
    pub fn get(&self, pin: &str) -> Option<&PinMapping> {
        self.pins.get(pin)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PinMapping)> {
        self.pins.iter().map(|(pin, mapping)| (pin.as_str(), mapping))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pins.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}

//! Random output plugin.

use core::fmt;
use core::str::FromStr;

use embassy_time::Instant;
use keymap_proto::{Command, PinMode, MAX_SERVO_ANGLE};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{PinRequirement, Plugin, PluginError, PluginSettings, RateLimit};
use crate::channel::OutputPort;

pub const NAME: &str = "random_output";

/// Kind of write a [`RandomOutput`] produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputType {
    Pwm,
    Digital,
    Servo,
}

impl OutputType {
    #[must_use]
    pub const fn pin_mode(self) -> PinMode {
        match self {
            Self::Pwm => PinMode::Pwm,
            Self::Digital => PinMode::DigitalOutput,
            Self::Servo => PinMode::Servo,
        }
    }
}

impl FromStr for OutputType {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pwm" => Ok(Self::Pwm),
            "digital" => Ok(Self::Digital),
            "servo" => Ok(Self::Servo),
            _ => Err(PluginError::InvalidSetting {
                key: "type".to_owned(),
                reason: "expected pwm, digital or servo",
            }),
        }
    }
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pwm => "pwm",
            Self::Digital => "digital",
            Self::Servo => "servo",
        })
    }
}

/// Writes a uniformly random value in `min_value..=max_value` every
/// `update_interval_ms`.
///
/// Servo values are clamped to 180; digital writes go high for any
/// non-zero value.
pub struct RandomOutput {
    pin: Option<String>,
    output: OutputType,
    min_value: u8,
    max_value: u8,
    rate: RateLimit,
    rng: StdRng,
}

impl RandomOutput {
    /// Settings: `pin`, `type` (`pwm`), `update_interval_ms` (500),
    /// `min_value` (0), `max_value` (255).
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidSetting`] for malformed values or an
    /// empty value range.
    pub fn from_settings(settings: &PluginSettings) -> Result<Self, PluginError> {
        Self::with_rng(settings, StdRng::from_entropy())
    }

    /// Same as [`from_settings`](Self::from_settings) with a caller-supplied
    /// generator.
    pub fn with_rng(settings: &PluginSettings, rng: StdRng) -> Result<Self, PluginError> {
        let pin = settings.pin()?;
        let output: OutputType = settings.str_or("type", "pwm")?.parse()?;
        let interval = settings.millis_or("update_interval_ms", 500)?;
        let min_value = settings.u8_or("min_value", 0)?;
        let max_value = settings.u8_or("max_value", u8::MAX)?;

        if min_value > max_value {
            return Err(PluginError::InvalidSetting {
                key: "min_value".to_owned(),
                reason: "must not exceed max_value",
            });
        }

        if let Some(pin) = &pin {
            info!("Random {} output on pin {}", output, pin);
        }

        Ok(Self {
            pin,
            output,
            min_value,
            max_value,
            rate: RateLimit::new(interval),
            rng,
        })
    }

    #[must_use]
    pub fn output_type(&self) -> OutputType {
        self.output
    }
}

impl Plugin for RandomOutput {
    fn name(&self) -> &str {
        NAME
    }

    fn required_pin_modes(&self) -> Vec<PinRequirement> {
        self.pin
            .iter()
            .map(|pin| PinRequirement {
                pin: pin.clone(),
                mode: self.output.pin_mode(),
            })
            .collect()
    }

    fn update(&mut self, now: Instant, port: &mut dyn OutputPort) -> Result<(), PluginError> {
        let Some(pin) = self.pin.as_deref() else {
            return Ok(());
        };
        if !self.rate.ready(now) {
            return Ok(());
        }

        let value: u8 = self.rng.gen_range(self.min_value..=self.max_value);
        let command = match self.output {
            OutputType::Pwm => Command::PwmWrite { pin, duty: value },
            OutputType::Digital => Command::DigitalWrite {
                pin,
                high: value != 0,
            },
            OutputType::Servo => Command::ServoWrite {
                pin,
                angle: value.min(MAX_SERVO_ANGLE),
            },
        };
        port.fire_and_forget(&command)?;
        debug!("Random output wrote {}", command);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::testing::RecordingPort;

    fn plugin(settings: PluginSettings) -> RandomOutput {
        RandomOutput::with_rng(&settings, StdRng::seed_from_u64(7)).unwrap()
    }

    fn values(sent: &[String]) -> Vec<u16> {
        sent.iter()
            .map(|line| line.rsplit(',').next().unwrap().parse().unwrap())
            .collect()
    }

    #[test]
    fn test_rate_limited_to_interval() {
        let mut random = plugin(PluginSettings::new().with("pin", 9));
        let mut port = RecordingPort::default();

        // Called every millisecond for one second with a 500 ms interval.
        for ms in 0..1000 {
            random.update(Instant::from_millis(ms), &mut port).unwrap();
        }
        assert_eq!(port.sent.len(), 2);
        assert!(port.sent.iter().all(|line| line.starts_with("P,9,")));
    }

    #[test]
    fn test_values_stay_in_range() {
        let mut random = plugin(
            PluginSettings::new()
                .with("pin", 5)
                .with("min_value", 100)
                .with("max_value", 120)
                .with("update_interval_ms", 1),
        );
        let mut port = RecordingPort::default();
        for ms in 0..200 {
            random.update(Instant::from_millis(ms), &mut port).unwrap();
        }
        assert_eq!(port.sent.len(), 200);
        assert!(values(&port.sent).iter().all(|v| (100..=120).contains(v)));
    }

    #[test]
    fn test_servo_values_clamped() {
        let mut random = plugin(
            PluginSettings::new()
                .with("pin", 5)
                .with("type", "servo")
                .with("min_value", 200)
                .with("update_interval_ms", 1),
        );
        assert_eq!(random.required_pin_modes()[0].mode, PinMode::Servo);

        let mut port = RecordingPort::default();
        for ms in 0..20 {
            random.update(Instant::from_millis(ms), &mut port).unwrap();
        }
        assert!(values(&port.sent).iter().all(|&v| v == 180));
    }

    #[test]
    fn test_digital_writes_are_binary() {
        let mut random = plugin(
            PluginSettings::new()
                .with("pin", 7)
                .with("type", "digital")
                .with("max_value", 1)
                .with("update_interval_ms", 1),
        );
        assert_eq!(random.output_type(), OutputType::Digital);
        assert_eq!(random.required_pin_modes()[0].mode, PinMode::DigitalOutput);

        let mut port = RecordingPort::default();
        for ms in 0..50 {
            random.update(Instant::from_millis(ms), &mut port).unwrap();
        }
        assert!(values(&port.sent).iter().all(|&v| v <= 1));
        assert!(port.sent.iter().all(|line| line.starts_with("D,7,")));
    }

    #[test]
    fn test_rejects_bad_settings() {
        let bad_type = PluginSettings::new().with("pin", 9).with("type", "analog");
        assert!(RandomOutput::from_settings(&bad_type).is_err());

        let inverted = PluginSettings::new()
            .with("pin", 9)
            .with("min_value", 10)
            .with("max_value", 5);
        assert!(RandomOutput::from_settings(&inverted).is_err());
    }
}

//! Servo sweeper plugin.

use embassy_time::Instant;
use keymap_proto::{Command, PinMode, MAX_SERVO_ANGLE};
use log::{debug, info, warn};

use super::{PinRequirement, Plugin, PluginError, PluginSettings, RateLimit};
use crate::channel::OutputPort;

pub const NAME: &str = "servo_sweeper";

/// Sweeps a servo between two angles, one step per `step_delay_ms`.
///
/// Starts at `min_angle` moving upward and reverses at either bound.
#[derive(Debug, Clone)]
pub struct ServoSweeper {
    pin: Option<String>,
    step_size: u8,
    min_angle: u8,
    max_angle: u8,
    angle: u8,
    ascending: bool,
    rate: RateLimit,
}

impl ServoSweeper {
    /// Settings: `pin`, `step_delay_ms` (50), `step_size` (2),
    /// `min_angle` (0), `max_angle` (180).
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidSetting`] for malformed values or an
    /// empty angle range.
    pub fn from_settings(settings: &PluginSettings) -> Result<Self, PluginError> {
        let pin = settings.pin()?;
        let step_delay = settings.millis_or("step_delay_ms", 50)?;
        let step_size = settings.u8_or("step_size", 2)?;
        let min_angle = settings.u8_or("min_angle", 0)?.min(MAX_SERVO_ANGLE);
        let max_angle = settings
            .u8_or("max_angle", MAX_SERVO_ANGLE)?
            .min(MAX_SERVO_ANGLE);

        if min_angle > max_angle {
            return Err(PluginError::InvalidSetting {
                key: "min_angle".to_owned(),
                reason: "must not exceed max_angle",
            });
        }

        match &pin {
            Some(pin) => info!("Servo sweeper on pin {}", pin),
            None => warn!("Servo sweeper loaded without a pin, it will stay idle"),
        }

        Ok(Self {
            pin,
            step_size,
            min_angle,
            max_angle,
            angle: min_angle,
            ascending: true,
            rate: RateLimit::new(step_delay),
        })
    }

    /// Angle most recently written.
    #[must_use]
    pub fn angle(&self) -> u8 {
        self.angle
    }

    fn advance(&mut self) {
        let step = u16::from(self.step_size);
        let angle = u16::from(self.angle);
        if self.ascending {
            let next = angle + step;
            if next >= u16::from(self.max_angle) {
                self.angle = self.max_angle;
                self.ascending = false;
            } else {
                self.angle = next as u8;
            }
        } else {
            let next = angle.saturating_sub(step);
            if next <= u16::from(self.min_angle) {
                self.angle = self.min_angle;
                self.ascending = true;
            } else {
                self.angle = next as u8;
            }
        }
    }
}

impl Plugin for ServoSweeper {
    fn name(&self) -> &str {
        NAME
    }

    fn required_pin_modes(&self) -> Vec<PinRequirement> {
        self.pin
            .iter()
            .map(|pin| PinRequirement {
                pin: pin.clone(),
                mode: PinMode::Servo,
            })
            .collect()
    }

    fn update(&mut self, now: Instant, port: &mut dyn OutputPort) -> Result<(), PluginError> {
        if self.pin.is_none() || !self.rate.ready(now) {
            return Ok(());
        }

        self.advance();
        let Some(pin) = self.pin.as_deref() else {
            return Ok(());
        };
        port.fire_and_forget(&Command::ServoWrite {
            pin,
            angle: self.angle,
        })?;
        debug!("Servo on pin {} set to {} degrees", pin, self.angle);
        Ok(())
    }
}

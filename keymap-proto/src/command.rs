//! Host-to-device commands and pin modes.

use core::fmt;
use core::str::FromStr;

/// Maximum length of a pin identifier in bytes (e.g. `13`, `A0`).
pub const MAX_PIN_LEN: usize = 8;

/// Highest angle a servo write may carry.
pub const MAX_SERVO_ANGLE: u8 = 180;

/// How the device should configure a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PinMode {
    /// Digital input reported as bare pin events.
    DigitalInput,
    /// Analog input streamed as `<pin>:<value>` samples.
    AnalogInput,
    /// Digital output driven by `D,<pin>,<0|1>`.
    DigitalOutput,
    /// PWM output driven by `P,<pin>,<0-255>`.
    Pwm,
    /// Servo output driven by `S,<pin>,<0-180>`.
    Servo,
}

impl PinMode {
    /// Keyword used on the wire in `mode <kind> <pin>`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DigitalInput => "digital",
            Self::AnalogInput => "analog",
            Self::DigitalOutput => "output",
            Self::Pwm => "pwm",
            Self::Servo => "servo",
        }
    }
}

impl fmt::Display for PinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a pin mode keyword is not recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownPinMode;

impl fmt::Display for UnknownPinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown pin mode")
    }
}

impl FromStr for PinMode {
    type Err = UnknownPinMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "digital" => Ok(Self::DigitalInput),
            "analog" => Ok(Self::AnalogInput),
            "output" => Ok(Self::DigitalOutput),
            "pwm" => Ok(Self::Pwm),
            "servo" => Ok(Self::Servo),
            _ => Err(UnknownPinMode),
        }
    }
}

/// A single command sent from the host to the device.
///
/// Pin identifiers are borrowed so commands can be built on the stack
/// right before they are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// Reset every pin configuration on the device (`clear`).
    Clear,
    /// Configure a pin (`mode <kind> <pin>`).
    Mode { mode: PinMode, pin: &'a str },
    /// Digital write (`D,<pin>,<0|1>`).
    DigitalWrite { pin: &'a str, high: bool },
    /// PWM duty cycle write (`P,<pin>,<0-255>`).
    PwmWrite { pin: &'a str, duty: u8 },
    /// Servo angle write (`S,<pin>,<0-180>`).
    ServoWrite { pin: &'a str, angle: u8 },
}

impl<'a> Command<'a> {
    /// Pin the command targets, if any.
    #[must_use]
    pub const fn pin(&self) -> Option<&'a str> {
        match *self {
            Self::Clear => None,
            Self::Mode { pin, .. }
            | Self::DigitalWrite { pin, .. }
            | Self::PwmWrite { pin, .. }
            | Self::ServoWrite { pin, .. } => Some(pin),
        }
    }

    /// Returns `true` for commands whose acknowledgement matters.
    ///
    /// Configuration commands go through the confirmed send path; output
    /// writes are fire-and-forget.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Clear | Self::Mode { .. })
    }
}

impl fmt::Display for Command<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clear => f.write_str("clear"),
            Self::Mode { mode, pin } => write!(f, "mode {} {}", mode, pin),
            Self::DigitalWrite { pin, high } => write!(f, "D,{},{}", pin, u8::from(*high)),
            Self::PwmWrite { pin, duty } => write!(f, "P,{},{}", pin, duty),
            Self::ServoWrite { pin, angle } => write!(f, "S,{},{}", pin, angle),
        }
    }
}

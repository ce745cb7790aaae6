//! CPU usage indicator plugin.

use std::fs;
use std::io;

use embassy_time::Instant;
use keymap_proto::{Command, PinMode};
use log::{debug, info};

use super::{PinRequirement, Plugin, PluginError, PluginSettings, RateLimit};
use crate::channel::OutputPort;

pub const NAME: &str = "cpu_monitor";

/// Source of host CPU usage samples.
pub trait LoadSource {
    /// Usage in percent since the previous call.
    ///
    /// Returns `None` until two samples are available or when the host
    /// cannot be read.
    fn cpu_percent(&mut self) -> Option<f64>;
}

/// Reads aggregate CPU times from `/proc/stat`.
#[derive(Debug, Default)]
pub struct ProcStatLoad {
    previous: Option<CpuTimes>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CpuTimes {
    idle: u64,
    total: u64,
}

impl ProcStatLoad {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read() -> io::Result<CpuTimes> {
        let stat = fs::read_to_string("/proc/stat")?;
        parse_cpu_line(&stat)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "no aggregate cpu line"))
    }

    fn usage(&mut self, current: CpuTimes) -> Option<f64> {
        let previous = self.previous.replace(current)?;
        let total = current.total.saturating_sub(previous.total);
        if total == 0 {
            return None;
        }
        let idle = current.idle.saturating_sub(previous.idle);
        Some(100.0 * (total - idle.min(total)) as f64 / total as f64)
    }
}

impl LoadSource for ProcStatLoad {
    fn cpu_percent(&mut self) -> Option<f64> {
        match Self::read() {
            Ok(times) => self.usage(times),
            Err(e) => {
                debug!("Cannot sample CPU usage: {}", e);
                None
            }
        }
    }
}

/// Parse the aggregate `cpu` line of `/proc/stat`.
///
/// Idle time counts both the `idle` and `iowait` columns.
fn parse_cpu_line(stat: &str) -> Option<CpuTimes> {
    let line = stat.lines().find(|line| line.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    if fields.len() < 4 {
        return None;
    }
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    Some(CpuTimes {
        idle,
        total: fields.iter().sum(),
    })
}

/// Drives a digital pin high while CPU usage is above a threshold.
///
/// Only state changes are written.
pub struct CpuMonitor<L> {
    pin: String,
    threshold: f64,
    rate: RateLimit,
    load: L,
    high: bool,
}

impl<L: LoadSource> CpuMonitor<L> {
    /// Settings: `pin` (13), `threshold_percent` (50),
    /// `sample_interval_ms` (500).
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidSetting`] for malformed values.
    pub fn from_settings(settings: &PluginSettings, load: L) -> Result<Self, PluginError> {
        let pin = settings.pin()?.unwrap_or_else(|| "13".to_owned());
        let threshold = settings.f64_or("threshold_percent", 50.0)?;
        let interval = settings.millis_or("sample_interval_ms", 500)?;

        info!("CPU monitor on pin {} above {}%", pin, threshold);
        Ok(Self {
            pin,
            threshold,
            rate: RateLimit::new(interval),
            load,
            high: false,
        })
    }

    /// Whether the pin was last driven high.
    #[must_use]
    pub fn is_high(&self) -> bool {
        self.high
    }
}

impl<L: LoadSource> Plugin for CpuMonitor<L> {
    fn name(&self) -> &str {
        NAME
    }

    fn required_pin_modes(&self) -> Vec<PinRequirement> {
        vec![PinRequirement {
            pin: self.pin.clone(),
            mode: PinMode::DigitalOutput,
        }]
    }

    fn update(&mut self, now: Instant, port: &mut dyn OutputPort) -> Result<(), PluginError> {
        if !self.rate.ready(now) {
            return Ok(());
        }
        let Some(usage) = self.load.cpu_percent() else {
            return Ok(());
        };

        let busy = usage > self.threshold;
        if busy != self.high {
            port.fire_and_forget(&Command::DigitalWrite {
                pin: &self.pin,
                high: busy,
            })?;
            self.high = busy;
            debug!("CPU at {:.1}%, pin {} now {}", usage, self.pin, u8::from(busy));
        }
        Ok(())
    }
}

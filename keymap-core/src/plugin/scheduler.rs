//! Cooperative plugin scheduler.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use embassy_time::Instant;
use log::{error, warn};

use super::{PinRequirement, Plugin};
use crate::channel::OutputPort;

/// Runs every loaded plugin once per tick, in load order.
///
/// A plugin that fails or panics is logged and skipped for that tick; the
/// remaining plugins still run.
#[derive(Default)]
pub struct PluginScheduler {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.iter().map(|plugin| plugin.name())
    }

    /// Output pins required by all plugins, in load order.
    #[must_use]
    pub fn required_pin_modes(&self) -> Vec<PinRequirement> {
        self.plugins
            .iter()
            .flat_map(|plugin| plugin.required_pin_modes())
            .collect()
    }

    /// Give every plugin one update. Returns the number that failed.
    pub fn update_all(&mut self, now: Instant, port: &mut dyn OutputPort) -> usize {
        let mut failures = 0;
        for plugin in &mut self.plugins {
            let result = panic::catch_unwind(AssertUnwindSafe(|| plugin.update(now, port)));
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("Plugin '{}' update failed: {}", plugin.name(), e);
                    failures += 1;
                }
                Err(payload) => {
                    error!(
                        "Plugin '{}' panicked: {}",
                        plugin.name(),
                        panic_message(payload.as_ref())
                    );
                    failures += 1;
                }
            }
        }
        failures
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

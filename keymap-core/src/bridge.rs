//! KeymapBridge: wires the command channel, mapping engine and plugins into
//! one cooperative loop.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_time::Duration;
use embedded_hal_async::delay::DelayNs;
use keymap_proto::{Command, PinMode};
use log::{debug, info, trace, warn};

use crate::channel::{ChannelError, CommandChannel, CommandOutcome};
use crate::engine::MappingEngine;
use crate::plugin::PluginScheduler;
use crate::sink::KeySink;
use crate::time::Clock;
use crate::transport::Transport;

/// Default pause between loop ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Tally of the confirmed sends issued by [`KeymapBridge::setup`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetupReport {
    pub confirmed: usize,
    pub failed: usize,
}

impl SetupReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }

    fn record(&mut self, outcome: &Result<CommandOutcome, ChannelError>) {
        match outcome {
            Ok(CommandOutcome::Confirmed) => self.confirmed += 1,
            _ => self.failed += 1,
        }
    }
}

/// Bridges device input lines to key actions and runs output plugins.
///
/// One tick is: plugin updates, at most one inbound line through the
/// mapping engine, then the digital auto-release sweep. Confirmed sends
/// only happen in [`setup`](Self::setup) and [`shutdown`](Self::shutdown),
/// never inside a tick.
pub struct KeymapBridge<T, K, C, D> {
    channel: CommandChannel<T, C, D>,
    engine: MappingEngine<K>,
    plugins: PluginScheduler,
    tick_interval: Duration,
}

impl<T, K, C, D> KeymapBridge<T, K, C, D>
where
    T: Transport,
    K: KeySink,
    C: Clock,
    D: DelayNs,
{
    pub fn new(
        channel: CommandChannel<T, C, D>,
        engine: MappingEngine<K>,
        plugins: PluginScheduler,
    ) -> Self {
        Self {
            channel,
            engine,
            plugins,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn channel(&self) -> &CommandChannel<T, C, D> {
        &self.channel
    }

    pub fn engine(&self) -> &MappingEngine<K> {
        &self.engine
    }

    pub fn plugins(&self) -> &PluginScheduler {
        &self.plugins
    }

    /// Put the device into a known state.
    ///
    /// Sends `clear`, then a mode command for every mapped input pin, then
    /// one for every output pin a plugin needs. A command that is not
    /// confirmed is logged and setup carries on; the device may be left
    /// partially configured.
    pub async fn setup(&mut self) -> SetupReport {
        let mut report = SetupReport::default();

        let outcome = self.channel.confirmed_send(&Command::Clear).await;
        log_outcome(&Command::Clear, &outcome);
        report.record(&outcome);

        let inputs: Vec<(String, PinMode)> = self
            .engine
            .keymap()
            .iter()
            .map(|(pin, mapping)| (pin.to_owned(), mapping.pin_mode()))
            .collect();
        info!(
            "Configuring {} input pins and {} plugins",
            inputs.len(),
            self.plugins.len()
        );

        let outputs = self
            .plugins
            .required_pin_modes()
            .into_iter()
            .map(|req| (req.pin, req.mode));

        for (pin, mode) in inputs.into_iter().chain(outputs) {
            let command = Command::Mode { mode, pin: &pin };
            let outcome = self.channel.confirmed_send(&command).await;
            log_outcome(&command, &outcome);
            report.record(&outcome);
        }

        if report.is_complete() {
            info!("Device configured ({} commands confirmed)", report.confirmed);
        } else {
            warn!(
                "Device partially configured: {} of {} commands unconfirmed",
                report.failed,
                report.confirmed + report.failed
            );
        }
        report
    }

    /// Run one loop tick at the channel clock's current time.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError`] if reading from the link failed. Plugin and
    /// parse failures are logged, not returned.
    pub fn tick(&mut self) -> Result<(), ChannelError> {
        let now = self.channel.now();

        self.plugins.update_all(now, &mut self.channel);

        let read = self.channel.try_read_line();
        if let Ok(Some(line)) = &read {
            if let Err(e) = self.engine.handle_line(line, now) {
                debug!("Dropping line {:?}: {}", line, e);
            }
        }

        self.engine.check_timeouts(now);
        read.map(|_| ())
    }

    /// Tick until `running` is cleared, pausing `tick_interval` between
    /// ticks. The current tick always completes.
    pub async fn run(&mut self, running: &AtomicBool) {
        info!("Listening for device input");
        let mut failures = FailureStreak::default();
        while running.load(Ordering::SeqCst) {
            match self.tick() {
                Ok(()) => {
                    if let Some(count) = failures.recover() {
                        info!("Device reads recovered after {} failed ticks", count);
                    }
                }
                Err(e) => {
                    if failures.fail() {
                        warn!("Device read failed: {}", e);
                    } else {
                        trace!("Device read failed again: {}", e);
                    }
                }
            }
            self.channel.pause(self.tick_interval).await;
        }
        if failures.count > 0 {
            warn!("Loop stopped after {} consecutive failed reads", failures.count);
        }
        debug!("Loop stopped");
    }

    /// Release every held key, clear the device, and hand back the transport.
    pub async fn shutdown(mut self) -> T {
        let released = self.engine.release_all();
        if released > 0 {
            info!("Released {} held keys", released);
        }

        let outcome = self.channel.confirmed_send(&Command::Clear).await;
        log_outcome(&Command::Clear, &outcome);

        self.channel.into_transport()
    }
}

/// Consecutive failed reads, so a dead link warns once instead of every tick.
#[derive(Debug, Default)]
struct FailureStreak {
    count: u32,
}

impl FailureStreak {
    /// Record a failure. Returns `true` if it starts a new streak.
    fn fail(&mut self) -> bool {
        self.count = self.count.saturating_add(1);
        self.count == 1
    }

    /// End the streak, returning its length if there was one.
    fn recover(&mut self) -> Option<u32> {
        match core::mem::take(&mut self.count) {
            0 => None,
            n => Some(n),
        }
    }
}

fn log_outcome(command: &Command<'_>, outcome: &Result<CommandOutcome, ChannelError>) {
    match outcome {
        Ok(CommandOutcome::Confirmed) => debug!("'{}' confirmed", command),
        // The channel already warned about the unconfirmed send.
        Ok(_) => {}
        Err(e) => warn!("'{}' failed: {}", command, e),
    }
}

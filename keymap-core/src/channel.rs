//! Command channel: confirmed and fire-and-forget sends over the device link.

use core::fmt;
use std::io;

use embassy_time::{Duration, Instant};
use embedded_hal_async::delay::DelayNs;
use keymap_proto::{parse_line, Command, DeviceLine, Serialize, SerializeError, MAX_COMMAND_SIZE};
use log::{debug, trace, warn};

use crate::time::Clock;
use crate::transport::{LineBuffer, Transport};

/// Log target for raw wire traffic.
pub const WIRE_TARGET: &str = "keymap_core::wire";

/// Result of a confirmed send.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum CommandOutcome {
    /// The device answered `OK`.
    Confirmed,
    /// The last attempt ended on an explicit error reply.
    Rejected(String),
    /// No reply arrived within any attempt.
    TimedOut,
}

impl CommandOutcome {
    /// Returns `true` if the device accepted the command.
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed)
    }
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Confirmed => write!(f, "confirmed"),
            Self::Rejected(reason) if reason.is_empty() => write!(f, "rejected"),
            Self::Rejected(reason) => write!(f, "rejected ({})", reason),
            Self::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Error type for channel operations.
#[derive(Debug)]
pub enum ChannelError {
    /// The link failed to read or write.
    Io(io::Error),
    /// The command could not be encoded.
    Encode(SerializeError),
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "link I/O error: {}", e),
            Self::Encode(e) => write!(f, "cannot encode command: {}", e),
        }
    }
}

impl std::error::Error for ChannelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Encode(e) => Some(e),
        }
    }
}

impl From<io::Error> for ChannelError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<SerializeError> for ChannelError {
    fn from(err: SerializeError) -> Self {
        Self::Encode(err)
    }
}

/// Retry and timing parameters for confirmed sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of times a command is written before giving up.
    pub max_attempts: u32,
    /// How long each attempt waits for a reply.
    pub attempt_timeout: Duration,
    /// Pause between attempts.
    pub backoff: Duration,
    /// Pause between polls of the link while waiting.
    pub poll_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(2),
            backoff: Duration::from_millis(100),
            poll_interval: Duration::from_millis(1),
        }
    }
}

/// Write-only view of the channel handed to plugins.
///
/// Only fire-and-forget sends are reachable through it, which keeps every
/// plugin update bounded in time.
pub trait OutputPort {
    /// Write a command without waiting for a reply.
    fn fire_and_forget(&mut self, command: &Command<'_>) -> Result<(), ChannelError>;
}

/// The single owner of the device link.
pub struct CommandChannel<T, C, D> {
    transport: T,
    clock: C,
    delay: D,
    lines: LineBuffer,
    policy: RetryPolicy,
}

impl<T: Transport, C: Clock, D: DelayNs> CommandChannel<T, C, D> {
    /// Create a channel with the default [`RetryPolicy`].
    pub fn new(transport: T, clock: C, delay: D) -> Self {
        Self::with_policy(transport, clock, delay, RetryPolicy::default())
    }

    /// Create a channel with an explicit retry policy.
    pub fn with_policy(transport: T, clock: C, delay: D, policy: RetryPolicy) -> Self {
        Self {
            transport,
            clock,
            delay,
            lines: LineBuffer::new(),
            policy,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Current instant according to the channel's clock.
    #[inline]
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Yield for the given duration.
    pub async fn pause(&mut self, duration: Duration) {
        let micros = u32::try_from(duration.as_micros()).unwrap_or(u32::MAX);
        self.delay.delay_us(micros).await;
    }

    /// Get a reference to the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get a mutable reference to the transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the channel, returning the transport (closing the link is
    /// left to its `Drop`).
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Send a command and wait for the device to acknowledge it.
    ///
    /// Each attempt writes the command and polls for a reply until
    /// `attempt_timeout` elapses. `OK` confirms immediately; an error reply
    /// ends the current attempt early. Data lines that arrive meanwhile are
    /// dropped. Attempts are separated by `backoff`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError`] if the link fails; an unanswered or rejected
    /// command is reported through the [`CommandOutcome`] instead.
    pub async fn confirmed_send(
        &mut self,
        command: &Command<'_>,
    ) -> Result<CommandOutcome, ChannelError> {
        let policy = self.policy;
        let mut rejection = None;

        for attempt in 1..=policy.max_attempts {
            self.write_command(command)?;
            trace!(
                target: WIRE_TARGET,
                "Sent: {} (attempt {}/{})",
                command,
                attempt,
                policy.max_attempts
            );

            rejection = None;
            let started = self.clock.now();

            'attempt: while self.clock.now().saturating_duration_since(started)
                < policy.attempt_timeout
            {
                while let Some(line) = self.poll_line()? {
                    trace!(target: WIRE_TARGET, "Received: {}", line);
                    match parse_line(&line) {
                        Ok(DeviceLine::Ack) => return Ok(CommandOutcome::Confirmed),
                        Ok(DeviceLine::Rejected(reason)) => {
                            debug!("'{}' rejected by device, retrying", command);
                            rejection = Some(reason.to_owned());
                            break 'attempt;
                        }
                        _ => trace!(
                            target: WIRE_TARGET,
                            "Dropping {:?} while waiting for a reply",
                            line
                        ),
                    }
                }
                self.pause(policy.poll_interval).await;
            }

            if attempt < policy.max_attempts {
                self.pause(policy.backoff).await;
            }
        }

        let outcome = match rejection {
            Some(reason) => CommandOutcome::Rejected(reason),
            None => CommandOutcome::TimedOut,
        };
        warn!("No confirmation for command '{}': {}", command, outcome);
        Ok(outcome)
    }

    /// Write a command without waiting for any reply.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError`] if the command cannot be encoded or written.
    pub fn fire_and_forget(&mut self, command: &Command<'_>) -> Result<(), ChannelError> {
        self.write_command(command)?;
        trace!(target: WIRE_TARGET, "Sent: {}", command);
        Ok(())
    }

    /// Return the next buffered data line, if any, without blocking.
    ///
    /// `OK` and error replies are filtered out here; they only matter to a
    /// confirmed send.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Io`] if reading from the link fails.
    pub fn try_read_line(&mut self) -> Result<Option<String>, ChannelError> {
        while let Some(line) = self.poll_line()? {
            trace!(target: WIRE_TARGET, "Received: {}", line);
            match parse_line(&line) {
                Ok(reply) if reply.is_reply() => {
                    trace!(target: WIRE_TARGET, "Ignoring unsolicited reply {:?}", line);
                }
                _ => return Ok(Some(line)),
            }
        }
        Ok(None)
    }

    fn write_command(&mut self, command: &Command<'_>) -> Result<(), ChannelError> {
        let bytes = command.serialize_to_vec::<MAX_COMMAND_SIZE>()?;
        self.transport.write_all(&bytes)?;
        Ok(())
    }

    fn poll_line(&mut self) -> Result<Option<String>, ChannelError> {
        if let Some(line) = self.lines.pop_line() {
            return Ok(Some(line));
        }

        let mut chunk = [0u8; 256];
        loop {
            let n = self.transport.read_available(&mut chunk)?;
            if n == 0 {
                return Ok(None);
            }
            self.lines.extend(&chunk[..n]);
            if let Some(line) = self.lines.pop_line() {
                return Ok(Some(line));
            }
        }
    }
}

// Plugins only write outputs; `clear` and `mode` stay with setup and shutdown.
impl<T: Transport, C: Clock, D: DelayNs> OutputPort for CommandChannel<T, C, D> {
    fn fire_and_forget(&mut self, command: &Command<'_>) -> Result<(), ChannelError> {
        if command.is_configuration() {
            warn!("Dropping configuration command '{}' from a plugin", command);
            return Ok(());
        }
        CommandChannel::fire_and_forget(self, command)
    }
}

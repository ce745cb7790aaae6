//! Serial port transport.

use std::io::{self, Read, Write};

use keymap_core::Transport;
use log::info;

/// Baud rate the device firmware listens at.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// [`Transport`] over a host serial port.
///
/// Reads never block: only the bytes already buffered by the OS are
/// returned.
pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialTransport {
    /// Open `path` at `baud_rate`, 8N1.
    ///
    /// # Errors
    ///
    /// Returns the `serialport` error if the port cannot be opened.
    pub fn open(path: &str, baud_rate: u32) -> serialport::Result<Self> {
        let port = serialport::new(path, baud_rate)
            .timeout(std::time::Duration::from_millis(10))
            .open()?;
        info!("Opened {} at {} baud", path, baud_rate);
        Ok(Self::new(port))
    }

    /// Wrap an already open port.
    pub fn new(port: Box<dyn serialport::SerialPort>) -> Self {
        Self { port }
    }

    /// Name of the underlying port, if known.
    pub fn name(&self) -> Option<String> {
        self.port.name()
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let pending = self.port.bytes_to_read().map_err(io::Error::from)?;
        if pending == 0 {
            return Ok(0);
        }
        let len = buf.len().min(pending as usize);
        match self.port.read(&mut buf[..len]) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }
}

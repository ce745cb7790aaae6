//! Byte-stream transport trait and line assembly.

use std::io;

use keymap_proto::MAX_LINE_LENGTH;

/// Byte stream connected to the device.
///
/// This trait abstracts the physical link (serial port, socket, test
/// double) so the command channel can be exercised without hardware.
pub trait Transport {
    /// Write all bytes to the link.
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Read whatever is already buffered by the link, without blocking.
    ///
    /// Returns `Ok(0)` when nothing is available.
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write_all(bytes)
    }

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_available(buf)
    }
}

/// Assembles newline-terminated lines from arbitrary read chunks.
///
/// If a line exceeds [`MAX_LINE_LENGTH`], the rest of the line is discarded
/// up to the next newline to prevent cascading parse errors.
#[derive(Debug, Default)]
pub struct LineBuffer {
    current: Vec<u8>,
    complete: std::collections::VecDeque<String>,
    discarding: bool,
    overflows: usize,
}

impl LineBuffer {
    /// Create an empty line buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes read from the link.
    pub fn extend(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if byte == b'\n' {
                if self.discarding {
                    self.discarding = false;
                } else {
                    let raw = std::mem::take(&mut self.current);
                    let line = String::from_utf8_lossy(&raw);
                    self.complete
                        .push_back(line.trim_end_matches('\r').to_owned());
                }
                continue;
            }

            if self.discarding {
                continue;
            }

            if self.current.len() >= MAX_LINE_LENGTH {
                self.current.clear();
                self.discarding = true;
                self.overflows += 1;
                continue;
            }

            self.current.push(byte);
        }
    }

    /// Pop the oldest complete line.
    pub fn pop_line(&mut self) -> Option<String> {
        self.complete.pop_front()
    }

    /// Number of lines dropped for exceeding the maximum length.
    #[must_use]
    pub fn overflows(&self) -> usize {
        self.overflows
    }
}

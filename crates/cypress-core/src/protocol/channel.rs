//! Channel transport abstraction
//!
//! The session manager drives instruments through this trait so the same
//! engine runs against real serial hardware and the simulated instruments
//! used in tests.

use serialport::SerialPort;
use std::io::{self, Read, Write};

/// Abstraction over an instrument communication channel.
///
/// One channel is exclusively owned by one device session; there is no
/// cloning and no sharing across threads.
pub trait Channel: Read + Write + Send {
    /// Clear any stale inbound bytes.
    fn clear_input_buffer(&mut self) -> io::Result<()>;

    /// Number of bytes available to read without blocking.
    fn bytes_to_read(&mut self) -> io::Result<u32>;
}

/// Serial port wrapper implementing [`Channel`]
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl SerialChannel {
    /// Wrap an opened serial port.
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl Read for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl Channel for SerialChannel {
    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.port
            .bytes_to_read()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

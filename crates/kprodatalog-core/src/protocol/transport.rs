//! Duplex byte channel used by capture and replay

use serialport::{ClearBuffer, SerialPort};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};
use tracing::debug;

use super::ProtocolError;

/// Abstraction over the device link (serial port or in-process simulator)
pub trait Transport: Send {
    /// Write every byte or fail
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ProtocolError>;

    /// Read up to `buf.len()` bytes, waiting at most `timeout` in total.
    ///
    /// Returns the number of bytes read; fewer than requested (including
    /// zero) means the timeout elapsed and is not an error.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, ProtocolError>;

    /// Discard any stale buffered input and output
    fn purge(&mut self) -> Result<(), ProtocolError>;

    /// Attempt to bring the device back after an I/O failure
    fn reset(&mut self) -> Result<(), ProtocolError> {
        self.purge()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        (**self).write_all(bytes)
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, ProtocolError> {
        (**self).read(buf, timeout)
    }

    fn purge(&mut self) -> Result<(), ProtocolError> {
        (**self).purge()
    }

    fn reset(&mut self) -> Result<(), ProtocolError> {
        (**self).reset()
    }
}

/// Serial port wrapper implementing [`Transport`]
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, ProtocolError> {
        let deadline = Instant::now() + timeout;
        let mut filled = 0;

        while filled < buf.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            self.port.set_timeout(remaining)?;

            match self.port.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(filled)
    }

    fn purge(&mut self) -> Result<(), ProtocolError> {
        self.port.clear(ClearBuffer::All)?;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), ProtocolError> {
        debug!("Resetting serial link");
        // Toggle DTR, then drop whatever arrived meanwhile
        self.port.write_data_terminal_ready(false)?;
        self.port.write_data_terminal_ready(true)?;
        self.purge()
    }
}

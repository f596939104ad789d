//! Transport layer for EASY PDK communication

use std::io::{Read, Write};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::error::{EasyPdkError, Result};
use crate::protocol::BAUD_RATE;

/// Default timeout for blocking reads
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Transport trait for reading and writing bytes
pub trait Transport {
    /// Write bytes to the transport
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Read exactly `buf.len()` bytes
    fn read(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Read up to `buf.len()` bytes, waiting at most `timeout`
    ///
    /// Returns 0 on timeout.
    fn read_nonblock(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Flush any buffered data
    fn flush(&mut self) -> Result<()>;
}

/// Serial port transport
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open a serial port at 115200 8N1
    pub fn open(device: &str) -> Result<Self> {
        let port = serialport::new(device, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(DEFAULT_TIMEOUT)
            .open()?;

        log::debug!("Opened serial port {} at {} baud", device, BAUD_RATE);

        Ok(Self { port })
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.port.write_all(data)?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        self.port.read_exact(buf)?;
        Ok(())
    }

    fn read_nonblock(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let old_timeout = self.port.timeout();
        self.port.set_timeout(timeout)?;

        let result = match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(EasyPdkError::from(e)),
        };

        self.port.set_timeout(old_timeout)?;
        result
    }

    fn flush(&mut self) -> Result<()> {
        self.port.flush()?;
        Ok(())
    }
}

//! Programmer trait definition

use std::time::Duration;

use super::requests::{
    BlankCheckRequest, CalibrationRequest, EraseRequest, ProbeResponse, ProgrammerVersion,
    ReadRequest, VerifyRequest, WriteRequest,
};
use crate::calibration::CalibrationMeasurement;
use crate::error::Result;

/// Operation-level interface to a PADAUK programmer
///
/// Device operations return the raw value the programmer echoed. On success
/// this is the 12-bit ID of the addressed IC; a different value means the
/// operation failed, and values in the reserved range
/// ([`crate::error::DEVICE_ERROR_BASE`] and up) carry an error code.
/// Interpreting the echo is left to the caller.
///
/// `Err` is reserved for communication failures.
pub trait Programmer {
    /// Read the hardware, firmware and protocol versions
    fn version(&mut self) -> Result<ProgrammerVersion>;

    /// Probe for an attached IC
    fn probe(&mut self) -> Result<ProbeResponse>;

    /// Read code memory into the data buffer
    fn read(&mut self, request: &ReadRequest) -> Result<u32>;

    /// Program code memory from the data buffer
    fn write(&mut self, request: &WriteRequest) -> Result<u32>;

    /// Erase a FLASH IC
    fn erase(&mut self, request: &EraseRequest) -> Result<u32>;

    /// Compare code memory against the data buffer
    fn verify(&mut self, request: &VerifyRequest) -> Result<u32>;

    /// Check that the code memory is blank
    fn blank_check(&mut self, request: &BlankCheckRequest) -> Result<u32>;

    /// Copy data into the data buffer at a byte offset
    fn set_buffer(&mut self, offset: usize, data: &[u8]) -> Result<()>;

    /// Copy data out of the data buffer from a byte offset
    fn get_buffer(&mut self, offset: usize, buf: &mut [u8]) -> Result<()>;

    /// Run the calibration stub written to the IC
    ///
    /// Fails with [`crate::Error::CalibrationFailed`] when the stub did not
    /// produce a result.
    fn calibrate(&mut self, request: &CalibrationRequest) -> Result<CalibrationMeasurement>;

    /// Power the IC at `vdd_mv` and let it run
    fn start_execution(&mut self, vdd_mv: u16) -> Result<()>;

    /// Stop a running IC
    fn stop_execution(&mut self) -> Result<()>;

    /// Send bytes to the running IC's debug input
    fn send_debug(&mut self, data: &[u8]) -> Result<()>;

    /// Receive pending debug output, returning the number of bytes read
    fn receive_debug(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Wait up to `timeout` for debug output to become available
    fn debug_pending(&mut self, timeout: Duration) -> Result<bool>;
}

// Boxed programmers are selected at runtime by the CLI
impl<P: Programmer + ?Sized> Programmer for Box<P> {
    fn version(&mut self) -> Result<ProgrammerVersion> {
        (**self).version()
    }

    fn probe(&mut self) -> Result<ProbeResponse> {
        (**self).probe()
    }

    fn read(&mut self, request: &ReadRequest) -> Result<u32> {
        (**self).read(request)
    }

    fn write(&mut self, request: &WriteRequest) -> Result<u32> {
        (**self).write(request)
    }

    fn erase(&mut self, request: &EraseRequest) -> Result<u32> {
        (**self).erase(request)
    }

    fn verify(&mut self, request: &VerifyRequest) -> Result<u32> {
        (**self).verify(request)
    }

    fn blank_check(&mut self, request: &BlankCheckRequest) -> Result<u32> {
        (**self).blank_check(request)
    }

    fn set_buffer(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        (**self).set_buffer(offset, data)
    }

    fn get_buffer(&mut self, offset: usize, buf: &mut [u8]) -> Result<()> {
        (**self).get_buffer(offset, buf)
    }

    fn calibrate(&mut self, request: &CalibrationRequest) -> Result<CalibrationMeasurement> {
        (**self).calibrate(request)
    }

    fn start_execution(&mut self, vdd_mv: u16) -> Result<()> {
        (**self).start_execution(vdd_mv)
    }

    fn stop_execution(&mut self) -> Result<()> {
        (**self).stop_execution()
    }

    fn send_debug(&mut self, data: &[u8]) -> Result<()> {
        (**self).send_debug(data)
    }

    fn receive_debug(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).receive_debug(buf)
    }

    fn debug_pending(&mut self, timeout: Duration) -> Result<bool> {
        (**self).debug_pending(timeout)
    }
}

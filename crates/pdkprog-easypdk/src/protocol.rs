//! EASY PDK protocol constants and payload encoding
//!
//! Every request is a frame `[cmd][len: u16 LE][payload]` and is answered
//! with a frame carrying the same command byte. While the IC runs, the
//! programmer also sends unsolicited [`CMD_DEBUG_OUT`] frames. Integers are
//! little-endian and voltages are given in millivolts.

use pdkprog_core::calibration::{CalibrationMeasurement, CalibrationTarget};
use pdkprog_core::chip::{MemoryKind, Voltages};
use pdkprog_core::programmer::{
    BlankCheckRequest, CalibrationRequest, CodeWindow, EraseRequest, Exclusions, ProbeResponse,
    ProgrammerVersion, ReadRequest, Target, VerifyRequest, Version, WriteRequest,
};

use crate::error::{EasyPdkError, Result};

/// Protocol major version we support
pub const PROTOCOL_MAJOR: u8 = 1;

/// Serial baud rate
pub const BAUD_RATE: u32 = 115_200;

/// USB vendor ID of the programmer
pub const USB_VID: u16 = 0x0483;
/// USB product ID of the programmer
pub const USB_PID: u16 = 0x5740;

/// Size of the frame header
pub const HEADER_LEN: usize = 3;

/// Largest payload in one frame
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// Bytes moved per buffer transfer frame
pub const BUFFER_CHUNK: usize = 1024;

// Command opcodes
/// Query hardware, firmware and protocol versions
pub const CMD_VERSION: u8 = 0x01;
/// Probe for an attached IC
pub const CMD_PROBE: u8 = 0x02;
/// Read code memory into the buffer
pub const CMD_READ: u8 = 0x03;
/// Program code memory from the buffer
pub const CMD_WRITE: u8 = 0x04;
/// Erase a FLASH IC
pub const CMD_ERASE: u8 = 0x05;
/// Compare code memory with the buffer
pub const CMD_VERIFY: u8 = 0x06;
/// Check code memory is blank
pub const CMD_BLANK_CHECK: u8 = 0x07;
/// Copy data into the buffer
pub const CMD_SET_BUFFER: u8 = 0x08;
/// Copy data out of the buffer
pub const CMD_GET_BUFFER: u8 = 0x09;
/// Run a calibration stub
pub const CMD_CALIBRATE: u8 = 0x0A;
/// Power the IC and let it run
pub const CMD_START: u8 = 0x0B;
/// Stop the running IC
pub const CMD_STOP: u8 = 0x0C;
/// Bytes for the running IC
pub const CMD_DEBUG_IN: u8 = 0x0D;
/// Bytes from the running IC (unsolicited)
pub const CMD_DEBUG_OUT: u8 = 0x0E;

/// Status byte for success
pub const STATUS_OK: u8 = 0x01;

/// Build a request frame
pub fn encode_frame(cmd: u8, payload: &[u8]) -> Result<Vec<u8>> {
    let len = u16::try_from(payload.len()).map_err(|_| EasyPdkError::PayloadTooLong(payload.len()))?;
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.push(cmd);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Split a frame header into command and payload length
pub fn decode_header(header: &[u8; HEADER_LEN]) -> (u8, usize) {
    (header[0], usize::from(u16::from_le_bytes([header[1], header[2]])))
}

/// Little-endian payload builder
#[derive(Debug, Default)]
pub struct Payload {
    buf: Vec<u8>,
}

impl Payload {
    /// Create an empty payload
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a byte
    pub fn u8(mut self, v: u8) -> Self {
        self.buf.push(v);
        self
    }

    /// Append a u16
    pub fn u16(mut self, v: u16) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    /// Append a u32
    pub fn u32(mut self, v: u32) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    /// Append raw bytes
    pub fn bytes(mut self, data: &[u8]) -> Self {
        self.buf.extend_from_slice(data);
        self
    }

    fn target(self, target: &Target) -> Self {
        self.u16(target.id12)
            .u8(memory_kind_code(target.memory_kind))
            .u8(target.address_bits)
            .u8(target.code_bits)
    }

    fn voltages(self, v: &Voltages) -> Self {
        self.u16(v.vdd_mv).u16(v.vpp_mv)
    }

    fn window(self, w: &CodeWindow) -> Self {
        self.u16(w.address).u16(w.buffer_offset).u16(w.count)
    }

    fn exclusions(self, e: &Exclusions) -> Self {
        let (start, end) = e.region.map(|r| (r.start, r.end)).unwrap_or((0, 0));
        self.u8(u8::from(e.first_instruction)).u16(start).u16(end)
    }

    /// The encoded bytes
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Little-endian payload reader
pub struct Reader<'a> {
    cmd: u8,
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Read the payload of a response to `cmd`
    pub fn new(cmd: u8, data: &'a [u8]) -> Self {
        Self { cmd, data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos + n;
        if end > self.data.len() {
            return Err(EasyPdkError::ShortResponse {
                command: self.cmd,
                len: self.data.len(),
                expected: end,
            });
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Read a byte
    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read a u16
    pub fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Read a u32
    pub fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

fn memory_kind_code(kind: MemoryKind) -> u8 {
    match kind {
        MemoryKind::Flash => 0,
        MemoryKind::Otp => 1,
    }
}

fn memory_kind_from_code(code: u8) -> MemoryKind {
    if code == 0 {
        MemoryKind::Flash
    } else {
        MemoryKind::Otp
    }
}

fn calibration_target_code(target: CalibrationTarget) -> u8 {
    match target {
        CalibrationTarget::InternalHighSpeed => 1,
        CalibrationTarget::InternalLowSpeed => 2,
        CalibrationTarget::BandGap => 3,
        CalibrationTarget::HighSpeedAndBandGap => 4,
        CalibrationTarget::LowSpeedAndBandGap => 5,
    }
}

/// Payload of a read request
pub fn read_payload(req: &ReadRequest) -> Vec<u8> {
    Payload::new()
        .target(&req.target)
        .voltages(&req.voltages)
        .window(&req.window)
        .finish()
}

/// Payload of a blank check request
pub fn blank_check_payload(req: &BlankCheckRequest) -> Vec<u8> {
    Payload::new()
        .target(&req.target)
        .voltages(&req.voltages)
        .u16(req.words)
        .exclusions(&req.exclusions)
        .finish()
}

/// Payload of an erase request
pub fn erase_payload(req: &EraseRequest) -> Vec<u8> {
    Payload::new()
        .target(&req.target)
        .voltages(&req.command)
        .voltages(&req.high_voltage)
        .u8(req.clocks)
        .finish()
}

/// Payload of a write request
pub fn write_payload(req: &WriteRequest) -> Vec<u8> {
    Payload::new()
        .target(&req.target)
        .voltages(&req.command)
        .voltages(&req.high_voltage)
        .window(&req.window)
        .u8(req.block.size)
        .u8(req.block.clock_groups)
        .u8(req.block.clocks_per_group)
        .finish()
}

/// Payload of a verify request
pub fn verify_payload(req: &VerifyRequest) -> Vec<u8> {
    Payload::new()
        .target(&req.target)
        .voltages(&req.voltages)
        .window(&req.window)
        .exclusions(&req.exclusions)
        .finish()
}

/// Payload of a calibration request
pub fn calibrate_payload(req: &CalibrationRequest) -> Vec<u8> {
    Payload::new()
        .u8(calibration_target_code(req.target))
        .u16(req.millivolt)
        .u32(req.frequency_hz)
        .u32(req.loop_cycles)
        .finish()
}

/// Parse a version response
pub fn parse_version(data: &[u8]) -> Result<ProgrammerVersion> {
    let mut r = Reader::new(CMD_VERSION, data);
    Ok(ProgrammerVersion {
        hardware: Version::new(r.u8()?, r.u8()?),
        firmware: Version::new(r.u8()?, r.u8()?),
        protocol: Version::new(r.u8()?, r.u8()?),
    })
}

/// Parse a probe response
pub fn parse_probe(data: &[u8]) -> Result<ProbeResponse> {
    let mut r = Reader::new(CMD_PROBE, data);
    Ok(ProbeResponse {
        vpp_mv: r.u16()?,
        vdd_mv: r.u16()?,
        memory_kind: memory_kind_from_code(r.u8()?),
        raw: r.u32()?,
    })
}

/// Parse the echo of a device operation
pub fn parse_echo(cmd: u8, data: &[u8]) -> Result<u32> {
    Reader::new(cmd, data).u32()
}

/// Parse a calibration response, `None` if the calibration failed
pub fn parse_calibration(data: &[u8]) -> Result<Option<CalibrationMeasurement>> {
    let mut r = Reader::new(CMD_CALIBRATE, data);
    if r.u8()? != STATUS_OK {
        return Ok(None);
    }
    Ok(Some(CalibrationMeasurement {
        value: r.u8()?,
        frequency_hz: r.u32()?,
        bandgap_value: r.u8()?,
    }))
}

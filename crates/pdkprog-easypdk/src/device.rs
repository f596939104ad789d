//! EASY PDK device implementation
//!
//! This module provides the `EasyPdk` struct which talks to the programmer
//! over a [`Transport`] and implements the core `Programmer` trait.

use std::collections::VecDeque;
use std::time::Duration;

use pdkprog_core::calibration::CalibrationMeasurement;
use pdkprog_core::error::{Error as CoreError, Result as CoreResult};
use pdkprog_core::programmer::{
    BlankCheckRequest, CalibrationRequest, EraseRequest, ProbeResponse, Programmer,
    ProgrammerVersion, ReadRequest, VerifyRequest, WriteRequest,
};

use crate::error::{EasyPdkError, Result};
use crate::protocol::*;
use crate::transport::Transport;

/// EASY PDK programmer
pub struct EasyPdk<T: Transport> {
    transport: T,
    version: ProgrammerVersion,
    /// Debug output received but not yet handed out
    debug_rx: VecDeque<u8>,
}

impl<T: Transport> EasyPdk<T> {
    /// Create a new instance and perform the version handshake
    pub fn new(transport: T) -> Result<Self> {
        let mut pdk = Self {
            transport,
            version: ProgrammerVersion::default(),
            debug_rx: VecDeque::new(),
        };

        let data = pdk.transact(CMD_VERSION, &[])?;
        pdk.version = parse_version(&data)?;
        if pdk.version.protocol.major != PROTOCOL_MAJOR {
            return Err(EasyPdkError::UnsupportedProtocol(pdk.version.protocol));
        }
        log::debug!("easypdk: {}", pdk.version);

        Ok(pdk)
    }

    /// Versions reported during the handshake
    pub fn info(&self) -> ProgrammerVersion {
        self.version
    }

    /// Consume the device, returning the transport
    pub fn into_transport(self) -> T {
        self.transport
    }

    // ---- Protocol implementation ----

    fn send(&mut self, cmd: u8, payload: &[u8]) -> Result<()> {
        let frame = encode_frame(cmd, payload)?;
        log::trace!("easypdk: -> {:02X} ({} bytes)", cmd, payload.len());
        self.transport.write(&frame)?;
        self.transport.flush()
    }

    /// Read the rest of a frame whose first byte was already received
    fn receive_rest(&mut self, cmd: u8) -> Result<(u8, Vec<u8>)> {
        let mut len = [0u8; 2];
        self.transport.read(&mut len)?;
        let (_, len) = decode_header(&[cmd, len[0], len[1]]);
        let mut payload = vec![0u8; len];
        self.transport.read(&mut payload)?;
        log::trace!("easypdk: <- {:02X} ({} bytes)", cmd, len);
        Ok((cmd, payload))
    }

    fn receive(&mut self) -> Result<(u8, Vec<u8>)> {
        let mut cmd = [0u8];
        self.transport.read(&mut cmd)?;
        self.receive_rest(cmd[0])
    }

    /// Send a command and wait for its response
    ///
    /// Debug output arriving in between is queued.
    fn transact(&mut self, cmd: u8, payload: &[u8]) -> Result<Vec<u8>> {
        self.send(cmd, payload)?;
        loop {
            let (response, data) = self.receive()?;
            if response == CMD_DEBUG_OUT && cmd != CMD_DEBUG_OUT {
                self.debug_rx.extend(data);
                continue;
            }
            if response != cmd {
                return Err(EasyPdkError::InvalidResponse {
                    command: cmd,
                    response,
                });
            }
            return Ok(data);
        }
    }

    fn operation(&mut self, cmd: u8, payload: &[u8]) -> Result<u32> {
        let data = self.transact(cmd, payload)?;
        parse_echo(cmd, &data)
    }

    fn expect_ok(&mut self, cmd: u8, payload: &[u8]) -> Result<()> {
        let data = self.transact(cmd, payload)?;
        match data.first() {
            Some(&STATUS_OK) => Ok(()),
            _ => Err(EasyPdkError::Rejected(cmd)),
        }
    }

    /// Wait for an unsolicited debug frame
    fn poll_debug(&mut self, timeout: Duration) -> Result<()> {
        let mut cmd = [0u8];
        if self.transport.read_nonblock(&mut cmd, timeout)? == 0 {
            return Ok(());
        }
        let (response, data) = self.receive_rest(cmd[0])?;
        if response == CMD_DEBUG_OUT {
            self.debug_rx.extend(data);
        } else {
            log::warn!("easypdk: unexpected frame 0x{:02X} while running", response);
        }
        Ok(())
    }
}

impl<T: Transport> Programmer for EasyPdk<T> {
    fn version(&mut self) -> CoreResult<ProgrammerVersion> {
        Ok(self.version)
    }

    fn probe(&mut self) -> CoreResult<ProbeResponse> {
        let data = self.transact(CMD_PROBE, &[])?;
        Ok(parse_probe(&data)?)
    }

    fn read(&mut self, request: &ReadRequest) -> CoreResult<u32> {
        Ok(self.operation(CMD_READ, &read_payload(request))?)
    }

    fn write(&mut self, request: &WriteRequest) -> CoreResult<u32> {
        Ok(self.operation(CMD_WRITE, &write_payload(request))?)
    }

    fn erase(&mut self, request: &EraseRequest) -> CoreResult<u32> {
        Ok(self.operation(CMD_ERASE, &erase_payload(request))?)
    }

    fn verify(&mut self, request: &VerifyRequest) -> CoreResult<u32> {
        Ok(self.operation(CMD_VERIFY, &verify_payload(request))?)
    }

    fn blank_check(&mut self, request: &BlankCheckRequest) -> CoreResult<u32> {
        Ok(self.operation(CMD_BLANK_CHECK, &blank_check_payload(request))?)
    }

    fn set_buffer(&mut self, offset: usize, data: &[u8]) -> CoreResult<()> {
        for (i, chunk) in data.chunks(BUFFER_CHUNK).enumerate() {
            let at = offset + i * BUFFER_CHUNK;
            let at = u16::try_from(at).map_err(|_| EasyPdkError::PayloadTooLong(at))?;
            let payload = Payload::new().u16(at).bytes(chunk).finish();
            self.expect_ok(CMD_SET_BUFFER, &payload)?;
        }
        Ok(())
    }

    fn get_buffer(&mut self, offset: usize, buf: &mut [u8]) -> CoreResult<()> {
        for (i, chunk) in buf.chunks_mut(BUFFER_CHUNK).enumerate() {
            let at = offset + i * BUFFER_CHUNK;
            let at = u16::try_from(at).map_err(|_| EasyPdkError::PayloadTooLong(at))?;
            let payload = Payload::new().u16(at).u16(chunk.len() as u16).finish();
            let data = self.transact(CMD_GET_BUFFER, &payload)?;
            if data.len() != chunk.len() {
                return Err(EasyPdkError::ShortResponse {
                    command: CMD_GET_BUFFER,
                    len: data.len(),
                    expected: chunk.len(),
                }
                .into());
            }
            chunk.copy_from_slice(&data);
        }
        Ok(())
    }

    fn calibrate(&mut self, request: &CalibrationRequest) -> CoreResult<CalibrationMeasurement> {
        let data = self.transact(CMD_CALIBRATE, &calibrate_payload(request))?;
        parse_calibration(&data)?.ok_or(CoreError::CalibrationFailed)
    }

    fn start_execution(&mut self, vdd_mv: u16) -> CoreResult<()> {
        self.debug_rx.clear();
        let payload = Payload::new().u16(vdd_mv).finish();
        Ok(self.expect_ok(CMD_START, &payload)?)
    }

    fn stop_execution(&mut self) -> CoreResult<()> {
        // Debug frames still in flight are dropped by transact
        self.transact(CMD_STOP, &[])?;
        self.debug_rx.clear();
        Ok(())
    }

    fn send_debug(&mut self, data: &[u8]) -> CoreResult<()> {
        Ok(self.send(CMD_DEBUG_IN, data)?)
    }

    fn receive_debug(&mut self, buf: &mut [u8]) -> CoreResult<usize> {
        if self.debug_rx.is_empty() {
            self.poll_debug(Duration::ZERO)?;
        }
        let n = buf.len().min(self.debug_rx.len());
        for (dst, src) in buf.iter_mut().zip(self.debug_rx.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn debug_pending(&mut self, timeout: Duration) -> CoreResult<bool> {
        if self.debug_rx.is_empty() {
            self.poll_debug(timeout)?;
        }
        Ok(!self.debug_rx.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdkprog_core::chip::ChipDatabase;
    use pdkprog_core::programmer::CodeWindow;

    /// Transport answering from a prepared byte stream
    #[derive(Default)]
    struct ScriptedTransport {
        rx: VecDeque<u8>,
        tx: Vec<u8>,
    }

    impl ScriptedTransport {
        fn respond(&mut self, cmd: u8, payload: &[u8]) {
            self.rx.extend(encode_frame(cmd, payload).unwrap());
        }
    }

    impl Transport for ScriptedTransport {
        fn write(&mut self, data: &[u8]) -> Result<()> {
            self.tx.extend_from_slice(data);
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<()> {
            if self.rx.len() < buf.len() {
                return Err(EasyPdkError::IoError("timed out".into()));
            }
            for b in buf.iter_mut() {
                *b = self.rx.pop_front().unwrap();
            }
            Ok(())
        }

        fn read_nonblock(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
            let n = buf.len().min(self.rx.len());
            for b in buf[..n].iter_mut() {
                *b = self.rx.pop_front().unwrap();
            }
            Ok(n)
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn connected() -> EasyPdk<ScriptedTransport> {
        let mut transport = ScriptedTransport::default();
        transport.respond(CMD_VERSION, &[1, 2, 1, 3, 1, 3]);
        let mut pdk = EasyPdk::new(transport).unwrap();
        pdk.transport.tx.clear();
        pdk
    }

    #[test]
    fn test_handshake() {
        let mut pdk = connected();
        assert_eq!(pdk.info().firmware.to_string(), "1.3");
        assert_eq!(pdk.version().unwrap().hardware.to_string(), "1.2");
    }

    #[test]
    fn test_unsupported_protocol() {
        let mut transport = ScriptedTransport::default();
        transport.respond(CMD_VERSION, &[1, 2, 1, 3, 2, 0]);
        assert!(matches!(
            EasyPdk::new(transport),
            Err(EasyPdkError::UnsupportedProtocol(_))
        ));
    }

    #[test]
    fn test_write_echo() {
        let db = ChipDatabase::builtin().unwrap();
        let chip = db.find_by_name("PFS154").unwrap();
        let request = WriteRequest::new(chip, CodeWindow::from_start(10));

        let mut pdk = connected();
        pdk.transport.respond(CMD_WRITE, &0xAA1u32.to_le_bytes());
        assert_eq!(pdk.write(&request).unwrap(), 0xAA1);
        assert_eq!(
            pdk.transport.tx,
            encode_frame(CMD_WRITE, &write_payload(&request)).unwrap()
        );
    }

    #[test]
    fn test_wrong_response_frame() {
        let mut pdk = connected();
        pdk.transport.respond(CMD_READ, &[0, 0, 0, 0]);
        assert!(matches!(
            pdk.probe(),
            Err(CoreError::Transport(msg)) if msg.contains("Invalid response")
        ));
    }

    #[test]
    fn test_buffer_chunks() {
        let mut pdk = connected();
        pdk.transport.respond(CMD_SET_BUFFER, &[STATUS_OK]);
        pdk.transport.respond(CMD_SET_BUFFER, &[STATUS_OK]);
        let data = vec![0x5A; BUFFER_CHUNK + 10];
        pdk.set_buffer(0x10, &data).unwrap();

        // Second frame starts at offset + chunk
        let second = &pdk.transport.tx[HEADER_LEN + 2 + BUFFER_CHUNK..];
        assert_eq!(second[0], CMD_SET_BUFFER);
        assert_eq!(&second[3..5], &(0x10 + BUFFER_CHUNK as u16).to_le_bytes());
        assert_eq!(second.len(), HEADER_LEN + 2 + 10);

        pdk.transport.respond(CMD_GET_BUFFER, &[1, 2, 3]);
        let mut buf = [0u8; 3];
        pdk.get_buffer(0, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3]);
    }

    #[test]
    fn test_calibration_failure() {
        let mut pdk = connected();
        pdk.transport.respond(CMD_CALIBRATE, &[0]);
        let request = CalibrationRequest {
            target: pdkprog_core::calibration::CalibrationTarget::BandGap,
            millivolt: 5000,
            frequency_hz: 0,
            loop_cycles: 0,
        };
        assert!(matches!(
            pdk.calibrate(&request),
            Err(CoreError::CalibrationFailed)
        ));
    }

    #[test]
    fn test_debug_relay() {
        let mut pdk = connected();
        pdk.transport.respond(CMD_START, &[STATUS_OK]);
        pdk.start_execution(5000).unwrap();

        pdk.transport.respond(CMD_DEBUG_OUT, b"hi");
        assert!(pdk.debug_pending(Duration::ZERO).unwrap());
        let mut buf = [0u8; 255];
        assert_eq!(pdk.receive_debug(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"hi");
        assert!(!pdk.debug_pending(Duration::ZERO).unwrap());

        // Output racing the stop request is discarded
        pdk.transport.respond(CMD_DEBUG_OUT, b"late");
        pdk.transport.respond(CMD_STOP, &[]);
        pdk.stop_execution().unwrap();
        assert_eq!(pdk.receive_debug(&mut buf).unwrap(), 0);
    }
}

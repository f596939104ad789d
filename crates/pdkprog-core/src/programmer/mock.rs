//! Recording programmer used by unit tests

use std::collections::VecDeque;
use std::time::Duration;

use super::*;
use crate::calibration::CalibrationMeasurement;
use crate::chip::MemoryKind;
use crate::error::{Error, Result};

/// One call made to the mock, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Version,
    Probe,
    Read(ReadRequest),
    Write(WriteRequest),
    Erase(EraseRequest),
    Verify(VerifyRequest),
    BlankCheck(BlankCheckRequest),
    SetBuffer(usize, Vec<u8>),
    GetBuffer(usize, usize),
    Calibrate(CalibrationRequest),
    StartExecution(u16),
    StopExecution,
    SendDebug(Vec<u8>),
    ReceiveDebug,
}

/// Which operation answers with a wrong echo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fail {
    Read,
    Erase,
    BlankCheck,
    Write,
    Verify,
    Calibrate,
}

pub struct MockProgrammer {
    pub calls: Vec<Call>,
    pub fail: Option<(Fail, u32)>,
    pub probe: ProbeResponse,
    pub buffer: Vec<u8>,
    pub measurement: CalibrationMeasurement,
    pub debug_out: VecDeque<Vec<u8>>,
    pub start_fails: bool,
}

impl MockProgrammer {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            fail: None,
            probe: ProbeResponse {
                vpp_mv: 0,
                vdd_mv: 0,
                memory_kind: MemoryKind::Flash,
                raw: 0,
            },
            buffer: vec![0xFF; 0x3000],
            measurement: CalibrationMeasurement {
                value: 0x42,
                frequency_hz: 8_000_123,
                bandgap_value: 0,
            },
            debug_out: VecDeque::new(),
            start_fails: false,
        }
    }

    pub fn failing(fail: Fail, echo: u32) -> Self {
        Self {
            fail: Some((fail, echo)),
            ..Self::new()
        }
    }

    pub fn take_calls(&mut self) -> Vec<Call> {
        std::mem::take(&mut self.calls)
    }

    fn echo(&self, op: Fail, target: &Target) -> u32 {
        match self.fail {
            Some((fail, echo)) if fail == op => echo,
            _ => u32::from(target.id12),
        }
    }
}

impl Programmer for MockProgrammer {
    fn version(&mut self) -> Result<ProgrammerVersion> {
        self.calls.push(Call::Version);
        Ok(ProgrammerVersion {
            hardware: Version::new(1, 2),
            firmware: Version::new(1, 3),
            protocol: Version::new(1, 3),
        })
    }

    fn probe(&mut self) -> Result<ProbeResponse> {
        self.calls.push(Call::Probe);
        Ok(self.probe)
    }

    fn read(&mut self, request: &ReadRequest) -> Result<u32> {
        self.calls.push(Call::Read(*request));
        Ok(self.echo(Fail::Read, &request.target))
    }

    fn write(&mut self, request: &WriteRequest) -> Result<u32> {
        self.calls.push(Call::Write(*request));
        Ok(self.echo(Fail::Write, &request.target))
    }

    fn erase(&mut self, request: &EraseRequest) -> Result<u32> {
        self.calls.push(Call::Erase(*request));
        Ok(self.echo(Fail::Erase, &request.target))
    }

    fn verify(&mut self, request: &VerifyRequest) -> Result<u32> {
        self.calls.push(Call::Verify(*request));
        Ok(self.echo(Fail::Verify, &request.target))
    }

    fn blank_check(&mut self, request: &BlankCheckRequest) -> Result<u32> {
        self.calls.push(Call::BlankCheck(*request));
        Ok(self.echo(Fail::BlankCheck, &request.target))
    }

    fn set_buffer(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        self.calls.push(Call::SetBuffer(offset, data.to_vec()));
        self.buffer[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn get_buffer(&mut self, offset: usize, buf: &mut [u8]) -> Result<()> {
        self.calls.push(Call::GetBuffer(offset, buf.len()));
        buf.copy_from_slice(&self.buffer[offset..offset + buf.len()]);
        Ok(())
    }

    fn calibrate(&mut self, request: &CalibrationRequest) -> Result<CalibrationMeasurement> {
        self.calls.push(Call::Calibrate(*request));
        match self.fail {
            Some((Fail::Calibrate, _)) => Err(Error::CalibrationFailed),
            _ => Ok(self.measurement),
        }
    }

    fn start_execution(&mut self, vdd_mv: u16) -> Result<()> {
        self.calls.push(Call::StartExecution(vdd_mv));
        if self.start_fails {
            Err(Error::Transport("could not start IC".into()))
        } else {
            Ok(())
        }
    }

    fn stop_execution(&mut self) -> Result<()> {
        self.calls.push(Call::StopExecution);
        Ok(())
    }

    fn send_debug(&mut self, data: &[u8]) -> Result<()> {
        self.calls.push(Call::SendDebug(data.to_vec()));
        Ok(())
    }

    fn receive_debug(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.calls.push(Call::ReceiveDebug);
        match self.debug_out.pop_front() {
            Some(chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                Ok(n)
            }
            None => Ok(0),
        }
    }

    fn debug_pending(&mut self, _timeout: Duration) -> Result<bool> {
        Ok(!self.debug_out.is_empty())
    }
}

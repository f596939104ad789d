//! pdkprog-dummy - Emulated programmer for testing
//!
//! This crate provides a programmer that emulates an EASY PDK with a
//! PADAUK IC attached, keeping the code memory in RAM. It's useful for
//! testing and development without real hardware.
//!
//! OTP memory behaves like the real thing: programming can only clear
//! bits, so writing twice without an erase fails the blank check.

use std::collections::VecDeque;
use std::time::Duration;

use pdkprog_core::calibration::CalibrationMeasurement;
use pdkprog_core::chip::{ChipDescriptor, MemoryKind, MAX_IMAGE_CELLS, OTP_RESPONSE_DECODINGS};
use pdkprog_core::error::{DeviceError, Error, Result};
use pdkprog_core::programmer::{
    BlankCheckRequest, CalibrationRequest, CodeWindow, EraseRequest, Exclusions, ProbeResponse,
    Programmer, ProgrammerVersion, ReadRequest, Target, Version, VerifyRequest, WriteRequest,
};

// Indices into the device error table
const ERR_COMMAND_NOT_SUPPORTED: u8 = 6;
const ERR_BLANK_CHECK: u8 = 8;
const ERR_VERIFY: u8 = 9;
const ERR_BUFFER_OVERFLOW: u8 = 10;

/// Size of the emulated data buffer in bytes
pub const BUFFER_SIZE: usize = MAX_IMAGE_CELLS * 2;

/// Configuration of the emulated programmer
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// The IC attached to the programmer
    pub chip: ChipDescriptor,
    /// VPP measured during a probe, in millivolts
    pub probe_vpp_mv: u16,
    /// VDD measured during a probe, in millivolts
    pub probe_vdd_mv: u16,
    /// Trim value a calibration finds
    pub calibration_value: u8,
}

impl DummyConfig {
    /// Configuration with `chip` attached
    pub fn new(chip: ChipDescriptor) -> Self {
        Self {
            chip,
            probe_vpp_mv: 5000,
            probe_vdd_mv: 5000,
            calibration_value: 0x84,
        }
    }
}

/// Emulated programmer with an IC attached
pub struct DummyPdk {
    config: DummyConfig,
    memory: Vec<u16>,
    buffer: Vec<u8>,
    running: bool,
    debug_out: VecDeque<u8>,
}

impl DummyPdk {
    /// Create an emulator with a blank IC
    pub fn new(config: DummyConfig) -> Self {
        let blank = blank_word(&config.chip);
        let memory = vec![blank; usize::from(config.chip.code_words)];
        Self {
            config,
            memory,
            buffer: vec![0xFF; BUFFER_SIZE],
            running: false,
            debug_out: VecDeque::new(),
        }
    }

    /// Create an emulator with a blank `chip` attached
    pub fn with_chip(chip: ChipDescriptor) -> Self {
        Self::new(DummyConfig::new(chip))
    }

    /// The code memory of the emulated IC
    pub fn memory(&self) -> &[u16] {
        &self.memory
    }

    /// Mutable code memory of the emulated IC
    pub fn memory_mut(&mut self) -> &mut [u16] {
        &mut self.memory
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Whether the IC is running
    pub fn is_running(&self) -> bool {
        self.running
    }

    fn chip(&self) -> &ChipDescriptor {
        &self.config.chip
    }

    fn mask(&self) -> u16 {
        blank_word(self.chip())
    }

    /// Echo of a request addressed to `target`
    ///
    /// `None` means the attached IC answers and the operation may go ahead.
    fn addressed(&self, target: &Target) -> Option<u32> {
        if target.id12 == self.chip().id12() {
            None
        } else {
            log::debug!(
                "dummy: request for 0x{:03X} but {} is attached",
                target.id12,
                self.chip()
            );
            Some(u32::from(self.chip().id12()))
        }
    }

    fn ok(&self) -> u32 {
        u32::from(self.chip().id12())
    }

    fn buffer_word(&self, word: usize) -> Option<u16> {
        let b = self.buffer.get(word * 2..word * 2 + 2)?;
        Some(u16::from_le_bytes([b[0], b[1]]))
    }

    fn window_in_range(&self, window: &CodeWindow) -> bool {
        let end = usize::from(window.address) + usize::from(window.count);
        let buf_end = usize::from(window.buffer_offset) + usize::from(window.count);
        end <= self.memory.len() && buf_end * 2 <= self.buffer.len()
    }
}

fn blank_word(chip: &ChipDescriptor) -> u16 {
    ((1u32 << chip.code_bits) - 1) as u16
}

fn device_error(index: u8) -> u32 {
    u32::from(DeviceError::from_index(index).code())
}

impl Programmer for DummyPdk {
    fn version(&mut self) -> Result<ProgrammerVersion> {
        Ok(ProgrammerVersion {
            hardware: Version::new(0, 0),
            firmware: Version::new(1, 3),
            protocol: Version::new(1, 3),
        })
    }

    fn probe(&mut self) -> Result<ProbeResponse> {
        let chip = self.chip();
        let id = u32::from(chip.id12());
        let raw = match chip.memory_kind {
            MemoryKind::Flash => id,
            MemoryKind::Otp => OTP_RESPONSE_DECODINGS
                .iter()
                .find(|(bits, _)| *bits == chip.code_bits)
                .map(|(_, shift)| id << shift)
                .unwrap_or(id),
        };
        Ok(ProbeResponse {
            vpp_mv: self.config.probe_vpp_mv,
            vdd_mv: self.config.probe_vdd_mv,
            memory_kind: chip.memory_kind,
            raw,
        })
    }

    fn read(&mut self, request: &ReadRequest) -> Result<u32> {
        if let Some(echo) = self.addressed(&request.target) {
            return Ok(echo);
        }
        let window = request.window;
        if !self.window_in_range(&window) {
            return Ok(device_error(ERR_BUFFER_OVERFLOW));
        }
        for i in 0..usize::from(window.count) {
            let word = self.memory[usize::from(window.address) + i];
            let at = (usize::from(window.buffer_offset) + i) * 2;
            self.buffer[at..at + 2].copy_from_slice(&word.to_le_bytes());
        }
        Ok(self.ok())
    }

    fn write(&mut self, request: &WriteRequest) -> Result<u32> {
        if let Some(echo) = self.addressed(&request.target) {
            return Ok(echo);
        }
        let window = request.window;
        if !self.window_in_range(&window) {
            return Ok(device_error(ERR_BUFFER_OVERFLOW));
        }
        let mask = self.mask();
        for i in 0..usize::from(window.count) {
            let value = self
                .buffer_word(usize::from(window.buffer_offset) + i)
                .unwrap_or(mask);
            // Programming can only clear bits
            self.memory[usize::from(window.address) + i] &= value & mask;
        }
        log::trace!("dummy: wrote {}", window);
        Ok(self.ok())
    }

    fn erase(&mut self, request: &EraseRequest) -> Result<u32> {
        if let Some(echo) = self.addressed(&request.target) {
            return Ok(echo);
        }
        if !self.chip().is_flash() {
            return Ok(device_error(ERR_COMMAND_NOT_SUPPORTED));
        }
        let blank = self.mask();
        let exclusions = Exclusions::of(self.chip());
        for (word, cell) in self.memory.iter_mut().enumerate() {
            if !exclusions.region.is_some_and(|r| r.contains(word as u16)) {
                *cell = blank;
            }
        }
        Ok(self.ok())
    }

    fn verify(&mut self, request: &VerifyRequest) -> Result<u32> {
        if let Some(echo) = self.addressed(&request.target) {
            return Ok(echo);
        }
        let window = request.window;
        if !self.window_in_range(&window) {
            return Ok(device_error(ERR_BUFFER_OVERFLOW));
        }
        let mask = self.mask();
        for i in 0..usize::from(window.count) {
            let address = window.address + i as u16;
            if request.exclusions.skips(address) {
                continue;
            }
            let expected = self
                .buffer_word(usize::from(window.buffer_offset) + i)
                .unwrap_or(mask);
            if self.memory[usize::from(address)] != expected & mask {
                log::debug!("dummy: verify mismatch at 0x{:04X}", address);
                return Ok(device_error(ERR_VERIFY));
            }
        }
        Ok(self.ok())
    }

    fn blank_check(&mut self, request: &BlankCheckRequest) -> Result<u32> {
        if let Some(echo) = self.addressed(&request.target) {
            return Ok(echo);
        }
        let blank = self.mask();
        let words = usize::from(request.words).min(self.memory.len());
        let dirty = (0..words)
            .filter(|&w| !request.exclusions.skips(w as u16))
            .any(|w| self.memory[w] != blank);
        if dirty {
            Ok(device_error(ERR_BLANK_CHECK))
        } else {
            Ok(self.ok())
        }
    }

    fn set_buffer(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        let dst = self
            .buffer
            .get_mut(offset..offset + data.len())
            .ok_or_else(|| Error::Transport("buffer overflow".into()))?;
        dst.copy_from_slice(data);
        Ok(())
    }

    fn get_buffer(&mut self, offset: usize, buf: &mut [u8]) -> Result<()> {
        let src = self
            .buffer
            .get(offset..offset + buf.len())
            .ok_or_else(|| Error::Transport("buffer overflow".into()))?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn calibrate(&mut self, request: &CalibrationRequest) -> Result<CalibrationMeasurement> {
        log::debug!(
            "dummy: calibrating {:?} at {} mV",
            request.target,
            request.millivolt
        );
        let frequency_hz = if request.target.is_oscillator() {
            request.frequency_hz
        } else {
            0
        };
        Ok(CalibrationMeasurement {
            value: self.config.calibration_value,
            frequency_hz,
            bandgap_value: if request.target.includes_bandgap() {
                self.config.calibration_value
            } else {
                0
            },
        })
    }

    fn start_execution(&mut self, vdd_mv: u16) -> Result<()> {
        log::debug!("dummy: running at {} mV", vdd_mv);
        self.running = true;
        self.debug_out.clear();
        Ok(())
    }

    fn stop_execution(&mut self) -> Result<()> {
        self.running = false;
        self.debug_out.clear();
        Ok(())
    }

    fn send_debug(&mut self, data: &[u8]) -> Result<()> {
        // The emulated IC echoes its debug input
        if self.running {
            self.debug_out.extend(data);
        }
        Ok(())
    }

    fn receive_debug(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = buf.len().min(self.debug_out.len());
        for (dst, src) in buf.iter_mut().zip(self.debug_out.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn debug_pending(&mut self, _timeout: Duration) -> Result<bool> {
        Ok(!self.debug_out.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use pdkprog_core::calibration::{
        CalibrationPatcher, CalibrationPlan, CalibrationTarget, NoCalibration,
    };
    use pdkprog_core::chip::ChipDatabase;
    use pdkprog_core::image::ProgramImage;
    use pdkprog_core::monitor::{Console, ExecutionMonitor, ESCAPE};
    use pdkprog_core::session::{NoProgress, ProbeOutcome, Session, WriteOptions};
    use pdkprog_core::Operation;

    fn chip(name: &str) -> ChipDescriptor {
        ChipDatabase::builtin()
            .unwrap()
            .find_by_name(name)
            .unwrap()
            .clone()
    }

    fn session(name: &str) -> Session<DummyPdk> {
        let chip = chip(name);
        let mut session = Session::open(DummyPdk::with_chip(chip.clone())).unwrap();
        session.select_chip(chip);
        session
    }

    /// Hex-style cells for little-endian words
    fn cells(words: &[u16]) -> Vec<u16> {
        words
            .iter()
            .flat_map(|w| w.to_le_bytes())
            .map(|b| 0xFF00 | u16::from(b))
            .collect()
    }

    #[test]
    fn test_write_then_read() {
        let mut session = session("PFS154");
        let program = [0x0070, 0x2F01, 0x0182, 0x3000];
        session
            .write(&cells(&program), &WriteOptions::default(), &NoCalibration, &mut NoProgress)
            .unwrap();

        let data = session.read(&mut NoProgress).unwrap();
        assert_eq!(data.len(), 0x1000);
        assert_eq!(&data[..8], &[0x70, 0x00, 0x01, 0x2F, 0x82, 0x01, 0x00, 0x30]);
        // Untouched words read back blank
        assert_eq!(&data[8..10], &[0xFF, 0x3F]);
    }

    #[test]
    fn test_fuse_written_to_last_word() {
        let mut session = session("PFS154");
        let options = WriteOptions::default().with_fuse(0x31FD);
        let report = session
            .write(&cells(&[0x0070]), &options, &NoCalibration, &mut NoProgress)
            .unwrap();
        assert!(report.fuse_written);

        let pdk = session.into_programmer();
        assert_eq!(pdk.memory()[0x7FF], 0x31FD);
        assert_eq!(pdk.memory()[0], 0x0070);
    }

    #[test]
    fn test_otp_second_write_fails_blank_check() {
        let mut session = session("PMS150C");
        session
            .write(&cells(&[0x0070]), &WriteOptions::default(), &NoCalibration, &mut NoProgress)
            .unwrap();

        let err = session
            .write(&cells(&[0x0070]), &WriteOptions::default(), &NoCalibration, &mut NoProgress)
            .unwrap_err();
        match err {
            Error::Device { operation, error } => {
                assert_eq!(operation, Operation::BlankCheck);
                assert_eq!(error.message(), "blank check failed");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_erase_restores_blank() {
        let mut session = session("PFS173");
        session
            .write(&cells(&[0x0000; 16]), &WriteOptions::default(), &NoCalibration, &mut NoProgress)
            .unwrap();
        session.erase(true, &mut NoProgress).unwrap();
        assert!(session.into_programmer().memory().iter().all(|&w| w == 0x7FFF));
    }

    #[test]
    fn test_secure_fill() {
        let mut session = session("PFS154");
        let options = WriteOptions {
            secure_fill: true,
            ..Default::default()
        };
        let report = session
            .write(&cells(&[0x0070]), &options, &NoCalibration, &mut NoProgress)
            .unwrap();
        assert_eq!(report.words, 0x7E0);

        let pdk = session.into_programmer();
        assert_eq!(pdk.memory()[0], 0x0070);
        assert!(pdk.memory()[1..0x7E0].iter().all(|&w| w == 0));
        assert!(pdk.memory()[0x7E0..].iter().all(|&w| w == 0x3FFF));
    }

    #[test]
    fn test_probe_resolves_every_chip() {
        let db = ChipDatabase::builtin().unwrap();
        for chip in db.iter() {
            let mut session = Session::open(DummyPdk::with_chip(chip.clone())).unwrap();
            match session.probe(&db).unwrap() {
                ProbeOutcome::Found { chip: found, response } => {
                    assert_eq!(found, Some(chip));
                    assert_eq!(response.memory_kind, chip.memory_kind);
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_wrong_chip_attached() {
        let mut session = Session::open(DummyPdk::with_chip(chip("PFS173"))).unwrap();
        session.select_chip(chip("PFS154"));
        let err = session.erase(false, &mut NoProgress).unwrap_err();
        assert!(matches!(
            err,
            Error::OperationFailed {
                operation: Operation::Erase,
                echo: 0xEA2,
                expected: 0xAA1
            }
        ));
    }

    #[test]
    fn test_verify_detects_otp_conflict() {
        let mut pdk = DummyPdk::with_chip(chip("PMS154B"));
        pdk.memory_mut()[1] = 0x0000;
        let mut session = Session::open(pdk).unwrap();
        session.select_chip(chip("PMS154B"));

        let options = WriteOptions {
            skip_blank_check: true,
            ..Default::default()
        };
        let err = session
            .write(&cells(&[0x0070, 0x0171]), &options, &NoCalibration, &mut NoProgress)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Device {
                operation: Operation::Verify,
                ..
            }
        ));
    }

    struct FixedStub;

    impl CalibrationPatcher for FixedStub {
        fn insert(&self, _chip: &ChipDescriptor, _image: &mut ProgramImage) -> Option<CalibrationPlan> {
            Some(CalibrationPlan {
                target: CalibrationTarget::InternalHighSpeed,
                frequency_hz: 8_000_000,
                millivolt: 5000,
                algorithm: 0,
                position: 2,
                loop_cycles: 7,
            })
        }

        fn remove(&self, plan: &CalibrationPlan, value: u8, image: &mut ProgramImage) -> bool {
            image.bytes_mut()[usize::from(plan.position)] = value;
            true
        }
    }

    #[test]
    fn test_calibration_value_is_programmed() {
        let mut session = session("PFS154");
        // The stub word starts out all ones, so the trim can still be programmed
        let program = [0x0070, 0x3FFF];
        let report = session
            .write(&cells(&program), &WriteOptions::default(), &FixedStub, &mut NoProgress)
            .unwrap();
        let measurement = report.calibration.unwrap();
        assert_eq!(measurement.value, 0x84);
        assert_eq!(measurement.frequency_hz, 8_000_000);

        assert_eq!(session.into_programmer().memory()[1], 0x3F84);
    }

    struct Keys(VecDeque<u8>);

    impl Console for Keys {
        fn poll_key(&mut self, _timeout: Duration) -> io::Result<bool> {
            Ok(!self.0.is_empty())
        }

        fn read_key(&mut self) -> io::Result<Option<u8>> {
            Ok(self.0.pop_front())
        }
    }

    #[test]
    fn test_monitor_echo() {
        let mut session = session("PFS154");
        let mut keys = Keys(VecDeque::from([b'h', b'i', ESCAPE]));
        let mut out = Vec::new();

        let mut monitor = ExecutionMonitor::new(session.programmer_mut());
        monitor.start(5000).unwrap();
        monitor.relay(&mut keys, &mut out).unwrap();

        assert_eq!(out, b"hi");
        assert!(!session.programmer_mut().is_running());
    }
}

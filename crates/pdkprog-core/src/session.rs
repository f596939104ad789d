//! Programming workflow
//!
//! A [`Session`] owns the programmer for the lifetime of one command and
//! sequences the device operations of read, write, erase and probe. Every
//! device operation is checked as soon as it returns, and the first failure
//! ends the command.

use crate::calibration::{self, CalibrationMeasurement, CalibrationPatcher, CalibrationPlan};
use crate::chip::{ChipDatabase, ChipDescriptor};
use crate::error::{DeviceError, Error, Operation, Result};
use crate::image::ProgramImage;
use crate::programmer::{
    BlankCheckRequest, CalibrationRequest, CodeWindow, EraseRequest, ProbeResponse, Programmer,
    ProgrammerVersion, ReadRequest, VerifyRequest, WriteRequest,
};

/// Fuse value meaning "leave the fuse alone"
pub const FUSE_UNCHANGED: u16 = 0xFFFF;

/// Progress callbacks for device operations
pub trait Progress {
    /// A device operation is about to be issued
    fn started(&mut self, operation: Operation);

    /// The operation succeeded
    fn finished(&mut self, operation: Operation);

    /// The operation failed; the command ends after this
    fn failed(&mut self, operation: Operation, error: &Error);

    /// A calibration is about to run
    fn calibrating(&mut self, plan: &CalibrationPlan);

    /// The calibration produced a value
    fn calibrated(&mut self, plan: &CalibrationPlan, measurement: &CalibrationMeasurement);
}

/// A no-op progress reporter
pub struct NoProgress;

impl Progress for NoProgress {
    fn started(&mut self, _operation: Operation) {}
    fn finished(&mut self, _operation: Operation) {}
    fn failed(&mut self, _operation: Operation, _error: &Error) {}
    fn calibrating(&mut self, _plan: &CalibrationPlan) {}
    fn calibrated(&mut self, _plan: &CalibrationPlan, _measurement: &CalibrationMeasurement) {}
}

/// Options of the write command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteOptions {
    /// Do not erase a FLASH IC first
    pub skip_erase: bool,
    /// Do not check the IC is blank
    pub skip_blank_check: bool,
    /// Zero unused memory up to the fill boundary
    pub secure_fill: bool,
    /// Do not verify after writing
    pub skip_verify: bool,
    /// Do not run calibration stubs found in the image
    pub skip_calibration: bool,
    /// Fuse value to write after the image
    pub fuse: Option<u16>,
}

impl WriteOptions {
    /// Set the fuse from a raw value, where [`FUSE_UNCHANGED`] means none
    pub fn with_fuse(mut self, raw: u16) -> Self {
        self.fuse = (raw != FUSE_UNCHANGED).then_some(raw);
        self
    }

    /// The ordered steps of a write to `chip`
    pub fn steps(&self, chip: &ChipDescriptor) -> Vec<WriteStep> {
        let mut steps = Vec::with_capacity(7);
        if chip.is_flash() && !self.skip_erase {
            steps.push(WriteStep::Erase);
        }
        if !self.skip_blank_check {
            steps.push(WriteStep::BlankCheck);
        }
        steps.push(WriteStep::BuildImage);
        steps.push(WriteStep::Program);
        if !self.skip_verify {
            steps.push(WriteStep::Verify);
        }
        if self.fuse.is_some() {
            steps.push(WriteStep::WriteFuse);
        }
        if !self.skip_calibration {
            steps.push(WriteStep::Calibrate);
        }
        steps
    }
}

/// One step of the write command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStep {
    /// Erase a FLASH IC
    Erase,
    /// Check the IC is blank
    BlankCheck,
    /// Build the image and insert a calibration stub
    BuildImage,
    /// Upload and write the image
    Program,
    /// Verify the written words
    Verify,
    /// Write the fuse word
    WriteFuse,
    /// Run a calibration and write its result
    Calibrate,
}

/// Outcome of a successful write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteReport {
    /// Words written
    pub words: u16,
    /// Bytes uploaded
    pub bytes: usize,
    /// Whether a fuse value was written
    pub fuse_written: bool,
    /// Calibration result, if a calibration ran
    pub calibration: Option<CalibrationMeasurement>,
}

/// Outcome of a probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome<'db> {
    /// No IC answered
    NothingFound,
    /// The programmer reported an error
    Error(DeviceError),
    /// An IC answered
    Found {
        /// Raw answer of the programmer
        response: ProbeResponse,
        /// Matching chip, `None` if unsupported
        chip: Option<&'db ChipDescriptor>,
    },
}

#[derive(Default)]
struct WriteState {
    image: Option<ProgramImage>,
    plan: Option<CalibrationPlan>,
    report: WriteReport,
}

impl WriteState {
    fn image(&self) -> Result<&ProgramImage> {
        self.image.as_ref().ok_or(Error::NothingToWrite)
    }
}

/// One programming session
///
/// Holds the programmer, the versions it reported when opened and the
/// resolved chip.
pub struct Session<P: Programmer> {
    programmer: P,
    version: ProgrammerVersion,
    chip: Option<ChipDescriptor>,
}

impl<P: Programmer> Session<P> {
    /// Start a session, reading the programmer versions
    pub fn open(mut programmer: P) -> Result<Self> {
        let version = programmer.version()?;
        log::debug!("programmer {}", version);
        Ok(Self {
            programmer,
            version,
            chip: None,
        })
    }

    /// Versions reported by the programmer
    pub fn version(&self) -> ProgrammerVersion {
        self.version
    }

    /// The resolved chip, if any
    pub fn chip(&self) -> Option<&ChipDescriptor> {
        self.chip.as_ref()
    }

    /// Set the chip subsequent commands are addressed to
    pub fn select_chip(&mut self, chip: ChipDescriptor) {
        log::debug!("selected {}", chip);
        self.chip = Some(chip);
    }

    /// Access the programmer
    pub fn programmer_mut(&mut self) -> &mut P {
        &mut self.programmer
    }

    /// End the session, returning the programmer
    pub fn into_programmer(self) -> P {
        self.programmer
    }

    fn parts(&mut self) -> Result<(&mut P, &ChipDescriptor)> {
        let chip = self.chip.as_ref().ok_or(Error::ChipNotResolved)?;
        Ok((&mut self.programmer, chip))
    }

    /// Probe for an attached IC and resolve it against `db`
    pub fn probe<'db>(&mut self, db: &'db ChipDatabase) -> Result<ProbeOutcome<'db>> {
        let response = self.programmer.probe()?;
        log::debug!("probe response: {:?}", response);

        if response.raw == 0 {
            return Ok(ProbeOutcome::NothingFound);
        }
        if let Some(error) = DeviceError::from_response(response.raw) {
            return Ok(ProbeOutcome::Error(error));
        }

        let chip = db.resolve_probe_response(response.raw, response.memory_kind);
        Ok(ProbeOutcome::Found { response, chip })
    }

    /// Read the whole code memory
    ///
    /// The full memory is always transferred, even when the caller only
    /// wants to know that the IC can be read.
    pub fn read(&mut self, progress: &mut dyn Progress) -> Result<Vec<u8>> {
        let (programmer, chip) = self.parts()?;

        run(progress, Operation::Read, || {
            let echo = programmer.read(&ReadRequest::new(chip))?;
            check_echo(Operation::Read, echo, chip)?;

            let mut data = vec![0u8; chip.capacity_bytes()];
            programmer.get_buffer(0, &mut data).map_err(|e| {
                log::debug!("get buffer: {}", e);
                Error::BufferTransfer("read")
            })?;
            Ok(data)
        })
    }

    /// Erase a FLASH IC, optionally followed by a blank check
    pub fn erase(&mut self, blank_check: bool, progress: &mut dyn Progress) -> Result<()> {
        let (programmer, chip) = self.parts()?;
        let request = EraseRequest::new(chip).ok_or_else(|| Error::NotErasable(chip.name.clone()))?;

        run(progress, Operation::Erase, || {
            let echo = programmer.erase(&request)?;
            check_echo(Operation::Erase, echo, chip)
        })?;

        if blank_check {
            run(progress, Operation::BlankCheck, || {
                let echo = programmer.blank_check(&BlankCheckRequest::new(chip))?;
                check_echo(Operation::BlankCheck, echo, chip)
            })?;
        }
        Ok(())
    }

    /// Write an image given as decoded input cells
    ///
    /// Runs the steps of [`WriteOptions::steps`] in order and stops at the
    /// first failure. A failed calibration leaves the already written image
    /// on the IC.
    pub fn write(
        &mut self,
        cells: &[u16],
        options: &WriteOptions,
        patcher: &dyn CalibrationPatcher,
        progress: &mut dyn Progress,
    ) -> Result<WriteReport> {
        let (programmer, chip) = self.parts()?;
        let mut state = WriteState::default();

        for step in options.steps(chip) {
            log::trace!("write step {:?}", step);
            match step {
                WriteStep::Erase => {
                    let request =
                        EraseRequest::new(chip).ok_or_else(|| Error::NotErasable(chip.name.clone()))?;
                    run(progress, Operation::Erase, || {
                        let echo = programmer.erase(&request)?;
                        check_echo(Operation::Erase, echo, chip)
                    })?;
                }
                WriteStep::BlankCheck => {
                    run(progress, Operation::BlankCheck, || {
                        let echo = programmer.blank_check(&BlankCheckRequest::new(chip))?;
                        check_echo(Operation::BlankCheck, echo, chip)
                    })?;
                }
                WriteStep::BuildImage => {
                    let mut image = ProgramImage::build(cells, options.secure_fill, chip)?;
                    if !options.skip_calibration {
                        state.plan = calibration::plan(patcher, chip, &mut image);
                    }
                    state.image = Some(image);
                }
                WriteStep::Program => {
                    let image = state.image()?;
                    run(progress, Operation::Write, || {
                        program(programmer, chip, image, Operation::Write)
                    })?;
                    let (words, bytes) = (image.word_count(), image.used_length());
                    state.report.words = words;
                    state.report.bytes = bytes;
                }
                WriteStep::Verify => {
                    let words = state.image()?.word_count();
                    run(progress, Operation::Verify, || {
                        let request = VerifyRequest::new(chip, CodeWindow::from_start(words));
                        let echo = programmer.verify(&request)?;
                        check_echo(Operation::Verify, echo, chip)
                    })?;
                }
                WriteStep::WriteFuse => {
                    if let Some(fuse) = options.fuse {
                        run(progress, Operation::WriteFuse, || {
                            write_fuse(programmer, chip, fuse)
                        })?;
                        state.report.fuse_written = true;
                    }
                }
                WriteStep::Calibrate => {
                    if let Some(plan) = state.plan.take() {
                        let image = state.image.as_mut().ok_or(Error::NothingToWrite)?;
                        let measurement =
                            calibrate(programmer, chip, patcher, &plan, image, progress)?;
                        state.report.calibration = Some(measurement);
                    }
                }
            }
        }

        Ok(state.report)
    }
}

/// Report a device operation to `progress` around `f`
fn run<T>(
    progress: &mut dyn Progress,
    operation: Operation,
    f: impl FnOnce() -> Result<T>,
) -> Result<T> {
    progress.started(operation);
    match f() {
        Ok(value) => {
            progress.finished(operation);
            Ok(value)
        }
        Err(e) => {
            log::debug!("{} failed: {}", operation, e);
            progress.failed(operation, &e);
            Err(e)
        }
    }
}

/// Accept an echo only if it is the chip's ID
fn check_echo(operation: Operation, echo: u32, chip: &ChipDescriptor) -> Result<()> {
    if echo == u32::from(chip.id12()) {
        Ok(())
    } else {
        Err(Error::from_echo(operation, echo, chip.id12()))
    }
}

fn upload<P: Programmer>(programmer: &mut P, offset: usize, data: &[u8]) -> Result<()> {
    programmer.set_buffer(offset, data).map_err(|e| {
        log::debug!("set buffer: {}", e);
        Error::BufferTransfer("write")
    })
}

/// Upload the image and write it from word 0
fn program<P: Programmer>(
    programmer: &mut P,
    chip: &ChipDescriptor,
    image: &ProgramImage,
    operation: Operation,
) -> Result<()> {
    upload(programmer, 0, image.data())?;
    let request = WriteRequest::new(chip, CodeWindow::from_start(image.word_count()));
    let echo = programmer.write(&request)?;
    check_echo(operation, echo, chip)
}

/// Write the fuse to the last code word
fn write_fuse<P: Programmer>(programmer: &mut P, chip: &ChipDescriptor, fuse: u16) -> Result<()> {
    let address = chip.fuse_address();
    upload(programmer, usize::from(address) * 2, &fuse.to_le_bytes())?;
    let echo = programmer.write(&WriteRequest::new(chip, CodeWindow::single(address)))?;
    check_echo(Operation::WriteFuse, echo, chip)
}

/// Run the calibration, patch the value into the image and write it again
fn calibrate<P: Programmer>(
    programmer: &mut P,
    chip: &ChipDescriptor,
    patcher: &dyn CalibrationPatcher,
    plan: &CalibrationPlan,
    image: &mut ProgramImage,
    progress: &mut dyn Progress,
) -> Result<CalibrationMeasurement> {
    progress.calibrating(plan);
    let measurement = run(progress, Operation::Calibrate, || {
        programmer.calibrate(&CalibrationRequest::from(plan))
    })?;
    progress.calibrated(plan, &measurement);

    if let Err(e) = calibration::apply(patcher, plan, &measurement, image) {
        progress.failed(Operation::WriteCalibration, &e);
        return Err(e);
    }

    run(progress, Operation::WriteCalibration, || {
        program(programmer, chip, image, Operation::WriteCalibration)
    })?;
    Ok(measurement)
}

//! Request parameters for device operations
//!
//! Every request is built from a [`ChipDescriptor`], so the wiring of chip
//! parameters to operations lives in one place.

use core::fmt;

use crate::calibration::{CalibrationPlan, CalibrationTarget};
use crate::chip::{ChipDescriptor, ExcludedRegion, MemoryKind, Voltages, WriteBlock};

/// Identity and geometry of the IC an operation is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    /// 12-bit runtime ID the programmer must confirm
    pub id12: u16,
    /// Kind of code memory
    pub memory_kind: MemoryKind,
    /// Number of address bits
    pub address_bits: u8,
    /// Code word width in bits
    pub code_bits: u8,
}

impl From<&ChipDescriptor> for Target {
    fn from(chip: &ChipDescriptor) -> Self {
        Self {
            id12: chip.id12(),
            memory_kind: chip.memory_kind,
            address_bits: chip.address_bits,
            code_bits: chip.code_bits,
        }
    }
}

/// Cells skipped by blank check and verify
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Exclusions {
    /// Skip word 0
    pub first_instruction: bool,
    /// Skip the factory calibration words
    pub region: Option<ExcludedRegion>,
}

impl Exclusions {
    /// Exclusions of a chip
    pub fn of(chip: &ChipDescriptor) -> Self {
        Self {
            first_instruction: chip.exclude_first_instruction,
            region: chip.excluded_region,
        }
    }

    /// Check whether a word is skipped
    pub fn skips(&self, word: u16) -> bool {
        (self.first_instruction && word == 0) || self.region.is_some_and(|r| r.contains(word))
    }
}

/// A run of code words together with its location in the programmer buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeWindow {
    /// First word address on the IC
    pub address: u16,
    /// Word offset into the programmer's data buffer
    pub buffer_offset: u16,
    /// Number of words
    pub count: u16,
}

impl CodeWindow {
    /// The first `count` words, taken from the start of the buffer
    pub fn from_start(count: u16) -> Self {
        Self {
            address: 0,
            buffer_offset: 0,
            count,
        }
    }

    /// A single word, taken from the same offset in the buffer
    pub fn single(address: u16) -> Self {
        Self {
            address,
            buffer_offset: address,
            count: 1,
        }
    }
}

impl fmt::Display for CodeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}+{}", self.address, self.count)
    }
}

/// Read the code memory into the programmer buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    /// Addressed IC
    pub target: Target,
    /// Read command voltages
    pub voltages: Voltages,
    /// Words to read
    pub window: CodeWindow,
}

impl ReadRequest {
    /// Read the whole code memory
    pub fn new(chip: &ChipDescriptor) -> Self {
        Self {
            target: chip.into(),
            voltages: chip.read,
            window: CodeWindow::from_start(chip.code_words),
        }
    }
}

/// Check that the code memory is blank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlankCheckRequest {
    /// Addressed IC
    pub target: Target,
    /// Read command voltages
    pub voltages: Voltages,
    /// Number of words checked, from word 0
    pub words: u16,
    /// Skipped cells
    pub exclusions: Exclusions,
}

impl BlankCheckRequest {
    /// Blank check over the whole code memory
    pub fn new(chip: &ChipDescriptor) -> Self {
        Self {
            target: chip.into(),
            voltages: chip.read,
            words: chip.code_words,
            exclusions: Exclusions::of(chip),
        }
    }
}

/// Erase a FLASH IC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraseRequest {
    /// Addressed IC
    pub target: Target,
    /// Erase command voltages
    pub command: Voltages,
    /// Erase high voltage pulse
    pub high_voltage: Voltages,
    /// Number of erase clocks
    pub clocks: u8,
}

impl EraseRequest {
    /// Erase request for a chip, `None` if the chip cannot be erased
    pub fn new(chip: &ChipDescriptor) -> Option<Self> {
        let erase = chip.erase?;
        Some(Self {
            target: chip.into(),
            command: erase.command,
            high_voltage: erase.high_voltage,
            clocks: erase.clocks,
        })
    }
}

/// Program words from the programmer buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRequest {
    /// Addressed IC
    pub target: Target,
    /// Write command voltages
    pub command: Voltages,
    /// Write high voltage pulse
    pub high_voltage: Voltages,
    /// Words to program
    pub window: CodeWindow,
    /// Block geometry
    pub block: WriteBlock,
}

impl WriteRequest {
    /// Write request for a window of a chip
    pub fn new(chip: &ChipDescriptor, window: CodeWindow) -> Self {
        Self {
            target: chip.into(),
            command: chip.write,
            high_voltage: chip.write_high_voltage,
            window,
            block: chip.write_block,
        }
    }
}

/// Compare words on the IC against the programmer buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyRequest {
    /// Addressed IC
    pub target: Target,
    /// Read command voltages
    pub voltages: Voltages,
    /// Words to compare
    pub window: CodeWindow,
    /// Skipped cells
    pub exclusions: Exclusions,
}

impl VerifyRequest {
    /// Verify request for a window of a chip
    pub fn new(chip: &ChipDescriptor, window: CodeWindow) -> Self {
        Self {
            target: chip.into(),
            voltages: chip.read,
            window,
            exclusions: Exclusions::of(chip),
        }
    }
}

/// Run a calibration stub on the IC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationRequest {
    /// What is calibrated
    pub target: CalibrationTarget,
    /// Supply voltage in millivolts
    pub millivolt: u16,
    /// Target frequency in Hz
    pub frequency_hz: u32,
    /// Cycles of the stub's measurement loop
    pub loop_cycles: u32,
}

impl From<&CalibrationPlan> for CalibrationRequest {
    fn from(plan: &CalibrationPlan) -> Self {
        Self {
            target: plan.target,
            millivolt: plan.millivolt,
            frequency_hz: plan.frequency_hz,
            loop_cycles: plan.loop_cycles,
        }
    }
}

/// Answer to a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResponse {
    /// Measured programming voltage in millivolts
    pub vpp_mv: u16,
    /// Measured supply voltage in millivolts
    pub vdd_mv: u16,
    /// Kind of code memory detected
    pub memory_kind: MemoryKind,
    /// Raw ID response, 0 when nothing answered
    pub raw: u32,
}

/// A `major.minor` version number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Version {
    /// Major version
    pub major: u8,
    /// Minor version
    pub minor: u8,
}

impl Version {
    /// Create a version
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Versions reported by the programmer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgrammerVersion {
    /// Hardware revision
    pub hardware: Version,
    /// Firmware version
    pub firmware: Version,
    /// Protocol version
    pub protocol: Version,
}

impl fmt::Display for ProgrammerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Hardware:{} Firmware:{} Protocol:{}",
            self.hardware, self.firmware, self.protocol
        )
    }
}

//! Chip descriptor type definitions

use core::fmt;
use core::ops::Range;

/// Mask applied to runtime IDs before comparing them
pub const ID12_MASK: u16 = 0x0FFF;

/// Maximum number of byte cells a program image can hold
///
/// This is also the size of the programmer's data buffer in words.
pub const MAX_IMAGE_CELLS: usize = 0x1800;

/// Words at the end of the code memory reserved for calibration data
pub const CALIBRATION_RESERVED_WORDS: u16 = 8;

/// Kind of code memory the IC has
///
/// Only FLASH versus non-FLASH changes behaviour: FLASH parts can be
/// erased, OTP parts cannot and are identified differently when probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize)]
pub enum MemoryKind {
    /// Reprogrammable FLASH memory
    Flash,
    /// One-time programmable memory
    Otp,
}

impl MemoryKind {
    /// Short label as printed in listings
    pub fn label(&self) -> &'static str {
        match self {
            Self::Flash => "FLASH",
            Self::Otp => "OTP",
        }
    }
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A VDD/VPP voltage pair in millivolts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Voltages {
    /// Supply voltage in millivolts
    pub vdd_mv: u16,
    /// Programming voltage in millivolts
    pub vpp_mv: u16,
}

impl Voltages {
    /// Create a new voltage pair
    pub const fn new(vdd_mv: u16, vpp_mv: u16) -> Self {
        Self { vdd_mv, vpp_mv }
    }
}

impl fmt::Display for Voltages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "VDD={:.2}V VPP={:.2}V",
            f32::from(self.vdd_mv) / 1000.0,
            f32::from(self.vpp_mv) / 1000.0
        )
    }
}

/// Word range reserved for factory calibration constants
///
/// Skipped by blank check and verify, and protected from secure fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExcludedRegion {
    /// First excluded word
    pub start: u16,
    /// One past the last excluded word
    pub end: u16,
}

impl ExcludedRegion {
    /// The excluded words as a range
    pub fn words(&self) -> Range<u16> {
        self.start..self.end
    }

    /// Check whether a word address lies inside the region
    pub fn contains(&self, word: u16) -> bool {
        self.words().contains(&word)
    }
}

/// Parameters needed to erase a FLASH IC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraseParameters {
    /// Voltages for the erase command
    pub command: Voltages,
    /// High voltage pulse for the erase
    pub high_voltage: Voltages,
    /// Number of erase clocks
    pub clocks: u8,
}

/// Write block geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteBlock {
    /// Words written per block
    pub size: u8,
    /// Clock groups per block
    pub clock_groups: u8,
    /// Clocks in each group
    pub clocks_per_group: u8,
}

/// Descriptor of one supported silicon variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipDescriptor {
    /// Primary IC name (e.g. "PFS154")
    pub name: String,
    /// Alternate marketing names for the same silicon (at most two)
    pub aliases: Vec<String>,
    /// Kind of code memory
    pub memory_kind: MemoryKind,
    /// Historical 16-bit OTP ID, informational only
    pub legacy_otp_id: u16,
    /// 12-bit ID the programmer uses to confirm the attached IC
    pub runtime_id12: u16,
    /// Number of address bits
    pub address_bits: u8,
    /// Width of a code word in bits (13 to 16)
    pub code_bits: u8,
    /// Code memory capacity in words
    pub code_words: u16,
    /// RAM size in bytes
    pub ram_size: u16,
    /// Skip the first instruction during blank check and verify
    pub exclude_first_instruction: bool,
    /// Region holding factory calibration constants
    pub excluded_region: Option<ExcludedRegion>,
    /// Voltages for the read command (also used for blank check and verify)
    pub read: Voltages,
    /// Voltages for the write command
    pub write: Voltages,
    /// High voltage pulse for writing
    pub write_high_voltage: Voltages,
    /// Erase parameters, present for FLASH ICs only
    pub erase: Option<EraseParameters>,
    /// Write block geometry
    pub write_block: WriteBlock,
}

impl ChipDescriptor {
    /// The masked 12-bit runtime ID
    pub fn id12(&self) -> u16 {
        self.runtime_id12 & ID12_MASK
    }

    /// Check if this is a FLASH IC
    pub fn is_flash(&self) -> bool {
        self.memory_kind == MemoryKind::Flash
    }

    /// Primary name followed by all aliases
    pub fn names(&self) -> impl Iterator<Item = &str> {
        core::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    /// Case-insensitive match against the primary name or an alias
    pub fn matches_name(&self, name: &str) -> bool {
        self.names().any(|n| n.eq_ignore_ascii_case(name))
    }

    /// Code memory size in bytes
    pub fn capacity_bytes(&self) -> usize {
        usize::from(self.code_words) * 2
    }

    /// Word address of the fuse (the last code word)
    pub fn fuse_address(&self) -> u16 {
        self.code_words - 1
    }

    /// Last word (exclusive) that secure fill may cover
    ///
    /// The trailing calibration words are reserved, and the fill never
    /// reaches into the excluded region.
    pub fn fill_boundary(&self) -> u16 {
        let boundary = self.code_words.saturating_sub(CALIBRATION_RESERVED_WORDS);
        match self.excluded_region {
            Some(region) if region.start < boundary => region.start,
            _ => boundary,
        }
    }
}

impl fmt::Display for ChipDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:03X})", self.name, self.id12())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chip(excluded: Option<ExcludedRegion>) -> ChipDescriptor {
        ChipDescriptor {
            name: "PFS154".to_string(),
            aliases: vec!["PFS154X".to_string()],
            memory_kind: MemoryKind::Flash,
            legacy_otp_id: 0x2AA1,
            runtime_id12: 0xAA1,
            address_bits: 13,
            code_bits: 14,
            code_words: 0x800,
            ram_size: 128,
            exclude_first_instruction: false,
            excluded_region: excluded,
            read: Voltages::new(2500, 5500),
            write: Voltages::new(3000, 5000),
            write_high_voltage: Voltages::new(5800, 8500),
            erase: None,
            write_block: WriteBlock {
                size: 4,
                clock_groups: 1,
                clocks_per_group: 8,
            },
        }
    }

    #[test]
    fn test_fill_boundary() {
        assert_eq!(chip(None).fill_boundary(), 0x7F8);
        let region = ExcludedRegion {
            start: 0x7E0,
            end: 0x7F0,
        };
        assert_eq!(chip(Some(region)).fill_boundary(), 0x7E0);
        // A region above the reserved words does not move the boundary
        let region = ExcludedRegion {
            start: 0x7FA,
            end: 0x800,
        };
        assert_eq!(chip(Some(region)).fill_boundary(), 0x7F8);
    }

    #[test]
    fn test_names() {
        let c = chip(None);
        let names: Vec<_> = c.names().collect();
        assert_eq!(names, ["PFS154", "PFS154X"]);
        assert!(c.matches_name("pfs154x"));
        assert!(!c.matches_name("PFS15"));
        assert_eq!(c.fuse_address(), 0x7FF);
        assert_eq!(c.capacity_bytes(), 0x1000);
    }

    #[test]
    fn test_voltage_display() {
        assert_eq!(
            Voltages::new(5800, 10500).to_string(),
            "VDD=5.80V VPP=10.50V"
        );
    }
}

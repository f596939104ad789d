//! Chip database and identity resolution
//!
//! The built-in table ships as a RON file compiled into the binary. A
//! different table can be loaded at runtime with the same format.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use super::types::{
    ChipDescriptor, EraseParameters, ExcludedRegion, MemoryKind, Voltages, WriteBlock, ID12_MASK,
    MAX_IMAGE_CELLS,
};
use crate::error::{Error, Result};

/// Built-in chip table
const BUILTIN_CHIPS: &str = include_str!("../../chips/padauk.ron");

/// Candidate decodings of an OTP probe response, as `(code_bits, shift)`
///
/// OTP families pad the 12-bit ID differently depending on their word
/// width. The order matters: a response can alias a different family
/// under a wrong shift, so the first match in this order wins.
pub const OTP_RESPONSE_DECODINGS: [(u8, u32); 4] = [(16, 0), (15, 2), (14, 4), (13, 6)];

// ============================================================================
// RON deserialization types (intermediate format)
// ============================================================================

/// Voltage pair in volts (RON format)
#[derive(Debug, Clone, Copy, serde::Deserialize)]
struct VoltagesDef {
    vdd: f32,
    vpp: f32,
}

fn to_millivolts(volts: f32) -> u16 {
    (volts * 1000.0).round() as u16
}

impl From<VoltagesDef> for Voltages {
    fn from(def: VoltagesDef) -> Self {
        Voltages::new(to_millivolts(def.vdd), to_millivolts(def.vpp))
    }
}

#[derive(Debug, Clone, Copy, serde::Deserialize)]
struct RegionDef {
    start: u16,
    end: u16,
}

#[derive(Debug, Clone, Copy, serde::Deserialize)]
struct EraseDef {
    cmd: VoltagesDef,
    hv: VoltagesDef,
    clocks: u8,
}

#[derive(Debug, Clone, Copy, serde::Deserialize)]
struct WriteBlockDef {
    size: u8,
    clock_groups: u8,
    clocks_per_group: u8,
}

/// Chip definition (RON format)
#[derive(Debug, Clone, serde::Deserialize)]
struct ChipDef {
    name: String,
    #[serde(default)]
    aliases: Vec<String>,
    otp_id: u16,
    id12: u16,
    memory: MemoryKind,
    address_bits: u8,
    code_bits: u8,
    code_words: u16,
    ram_size: u16,
    #[serde(default)]
    exclude_first_instr: bool,
    #[serde(default)]
    exclude: Option<RegionDef>,
    read: VoltagesDef,
    write: VoltagesDef,
    write_hv: VoltagesDef,
    write_block: WriteBlockDef,
    #[serde(default)]
    erase: Option<EraseDef>,
}

impl From<ChipDef> for ChipDescriptor {
    fn from(def: ChipDef) -> Self {
        ChipDescriptor {
            name: def.name,
            aliases: def.aliases,
            memory_kind: def.memory,
            legacy_otp_id: def.otp_id,
            runtime_id12: def.id12,
            address_bits: def.address_bits,
            code_bits: def.code_bits,
            code_words: def.code_words,
            ram_size: def.ram_size,
            exclude_first_instruction: def.exclude_first_instr,
            excluded_region: def.exclude.map(|r| ExcludedRegion {
                start: r.start,
                end: r.end,
            }),
            read: def.read.into(),
            write: def.write.into(),
            write_high_voltage: def.write_hv.into(),
            erase: def.erase.map(|e| EraseParameters {
                command: e.cmd.into(),
                high_voltage: e.hv.into(),
                clocks: e.clocks,
            }),
            write_block: WriteBlock {
                size: def.write_block.size,
                clock_groups: def.write_block.clock_groups,
                clocks_per_group: def.write_block.clocks_per_group,
            },
        }
    }
}

/// Vendor definition containing multiple chips
#[derive(Debug, Clone, serde::Deserialize)]
struct VendorDef {
    #[allow(dead_code)]
    vendor: String,
    chips: Vec<ChipDef>,
}

// ============================================================================
// Chip database
// ============================================================================

/// Runtime chip database
///
/// Chips are kept sorted by their 12-bit runtime ID.
#[derive(Debug, Clone, Default)]
pub struct ChipDatabase {
    chips: Vec<ChipDescriptor>,
}

impl ChipDatabase {
    /// Create an empty chip database
    pub fn new() -> Self {
        Self { chips: Vec::new() }
    }

    /// Parse the built-in chip table
    pub fn builtin() -> Result<Self> {
        let mut db = Self::new();
        db.load_ron(BUILTIN_CHIPS)?;
        Ok(db)
    }

    /// Load chip definitions from a RON file
    pub fn load_file(&mut self, path: &Path) -> Result<usize> {
        let content = fs::read_to_string(path)?;
        self.load_ron(&content)
    }

    /// Load chip definitions from a RON string
    ///
    /// The merged table is validated before it replaces the current one,
    /// so a failed load leaves the database untouched.
    pub fn load_ron(&mut self, content: &str) -> Result<usize> {
        let vendor_def: VendorDef =
            ron::from_str(content).map_err(|e| Error::Database(e.to_string()))?;
        let count = vendor_def.chips.len();

        let mut chips = self.chips.clone();
        chips.extend(vendor_def.chips.into_iter().map(ChipDescriptor::from));
        validate(&chips)?;
        chips.sort_by_key(|c| c.id12());

        self.chips = chips;
        Ok(count)
    }

    /// Get all chips, ascending by runtime ID
    pub fn chips(&self) -> &[ChipDescriptor] {
        &self.chips
    }

    /// Get the number of chips in the database
    pub fn len(&self) -> usize {
        self.chips.len()
    }

    /// Check if the database is empty
    pub fn is_empty(&self) -> bool {
        self.chips.is_empty()
    }

    /// Iterate over all chips, ascending by runtime ID
    pub fn iter(&self) -> impl Iterator<Item = &ChipDescriptor> {
        self.chips.iter()
    }

    /// Find a chip by its 12-bit runtime ID (masked to 12 bits)
    pub fn find_by_id12(&self, id: u16) -> Option<&ChipDescriptor> {
        let id = id & ID12_MASK;
        self.chips.iter().find(|c| c.id12() == id)
    }

    /// Find a chip by primary name or alias (case-insensitive)
    pub fn find_by_name(&self, name: &str) -> Option<&ChipDescriptor> {
        self.chips.iter().find(|c| c.matches_name(name))
    }

    fn find_by_id12_and_code_bits(&self, id: u32, code_bits: u8) -> Option<&ChipDescriptor> {
        let id = (id & u32::from(ID12_MASK)) as u16;
        self.chips
            .iter()
            .find(|c| c.id12() == id && c.code_bits == code_bits)
    }

    /// Resolve the raw response of a probe
    ///
    /// FLASH ICs answer with their plain 12-bit ID. OTP ICs answer with the
    /// ID shifted by a family dependent amount, so every decoding in
    /// [`OTP_RESPONSE_DECODINGS`] is tried in order and the first entry whose
    /// ID and word width both match is returned.
    pub fn resolve_probe_response(
        &self,
        raw_response: u32,
        memory_kind: MemoryKind,
    ) -> Option<&ChipDescriptor> {
        match memory_kind {
            MemoryKind::Flash => self.find_by_id12((raw_response & u32::from(ID12_MASK)) as u16),
            MemoryKind::Otp => OTP_RESPONSE_DECODINGS
                .iter()
                .find_map(|&(code_bits, shift)| {
                    self.find_by_id12_and_code_bits(raw_response >> shift, code_bits)
                }),
        }
    }

    /// Select the chip named on the command line
    ///
    /// The ID is tried first, then the name, like the programmer's own
    /// tooling does.
    pub fn select(&self, name: Option<&str>, id: Option<u16>) -> Result<&ChipDescriptor> {
        if name.is_none() && id.is_none() {
            return Err(Error::NoChipSelected);
        }

        id.and_then(|id| self.find_by_id12(id))
            .or_else(|| name.and_then(|n| self.find_by_name(n)))
            .ok_or_else(|| {
                let what = match (name, id) {
                    (Some(n), _) => n.to_string(),
                    (None, Some(id)) => format!("0x{:03X}", id),
                    (None, None) => String::new(),
                };
                Error::UnknownChip(what)
            })
    }
}

/// Check the table invariants
fn validate(chips: &[ChipDescriptor]) -> Result<()> {
    let mut ids = HashSet::new();

    for chip in chips {
        if !ids.insert(chip.id12()) {
            return Err(Error::Database(format!(
                "{}: duplicate runtime ID 0x{:03X}",
                chip.name,
                chip.id12()
            )));
        }
        if chip.aliases.len() > 2 {
            return Err(Error::Database(format!(
                "{}: at most two aliases are allowed",
                chip.name
            )));
        }
        if !(13..=16).contains(&chip.code_bits) {
            return Err(Error::Database(format!(
                "{}: code_bits {} out of range 13..=16",
                chip.name, chip.code_bits
            )));
        }
        if chip.code_words == 0 || chip.capacity_bytes() > MAX_IMAGE_CELLS * 2 {
            return Err(Error::Database(format!(
                "{}: code_words 0x{:X} out of range",
                chip.name, chip.code_words
            )));
        }
        if let Some(region) = chip.excluded_region {
            if region.start >= region.end || region.end > chip.code_words {
                return Err(Error::Database(format!(
                    "{}: excluded region 0x{:X}..0x{:X} outside code memory",
                    chip.name, region.start, region.end
                )));
            }
        }
        if chip.is_flash() && chip.erase.is_none() {
            return Err(Error::Database(format!(
                "{}: FLASH IC without erase parameters",
                chip.name
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> ChipDatabase {
        ChipDatabase::builtin().unwrap()
    }

    #[test]
    fn test_builtin_table() {
        let db = db();
        assert_eq!(db.len(), 4);

        let ids: Vec<u16> = db.iter().map(|c| c.id12()).collect();
        assert_eq!(ids, [0xA16, 0xAA1, 0xE06, 0xEA2]);

        let pfs154 = db.find_by_id12(0xAA1).unwrap();
        assert_eq!(pfs154.name, "PFS154");
        assert_eq!(pfs154.code_words, 0x800);
        assert_eq!(pfs154.code_bits, 14);
        assert_eq!(pfs154.read, Voltages::new(2500, 5500));
        assert_eq!(pfs154.write_high_voltage, Voltages::new(5800, 8500));
        let erase = pfs154.erase.unwrap();
        assert_eq!(erase.high_voltage, Voltages::new(3000, 9000));
        assert_eq!(erase.clocks, 2);
        assert_eq!(pfs154.write_block.size, 4);
    }

    #[test]
    fn test_find_by_id12_exact() {
        let db = db();
        for chip in db.iter() {
            let found = db.find_by_id12(chip.runtime_id12).unwrap();
            assert_eq!(found, chip);
        }
        // Upper bits are masked off
        assert_eq!(db.find_by_id12(0xFAA1).unwrap().name, "PFS154");
        assert!(db.find_by_id12(0x123).is_none());
    }

    #[test]
    fn test_find_by_name() {
        let db = db();
        for chip in db.iter() {
            for name in chip.names() {
                assert_eq!(db.find_by_name(name).unwrap(), chip);
                assert_eq!(db.find_by_name(&name.to_lowercase()).unwrap(), chip);
            }
        }
        assert_eq!(db.find_by_name("pms154c").unwrap().name, "PMS154B");
        assert!(db.find_by_name("PFS999").is_none());
        assert!(db.find_by_name("").is_none());
    }

    #[test]
    fn test_otp_probe_decoding() {
        let db = db();
        for chip in db.iter() {
            let shift = OTP_RESPONSE_DECODINGS
                .iter()
                .find(|(bits, _)| *bits == chip.code_bits)
                .map(|(_, shift)| *shift)
                .unwrap();
            let raw = u32::from(chip.id12()) << shift;
            let found = db.resolve_probe_response(raw, MemoryKind::Otp).unwrap();
            assert_eq!(found, chip);
        }
    }

    #[test]
    fn test_otp_probe_pms154b() {
        let db = db();
        let chip = db
            .resolve_probe_response(0xE06 << 4, MemoryKind::Otp)
            .unwrap();
        assert_eq!(chip.name, "PMS154B");
        assert_eq!(chip.code_bits, 14);
    }

    #[test]
    fn test_otp_probe_unknown() {
        let db = db();
        assert!(db.resolve_probe_response(0x1234, MemoryKind::Otp).is_none());
        assert!(db.resolve_probe_response(0, MemoryKind::Otp).is_none());
    }

    #[test]
    fn test_otp_probe_requires_code_bits_match() {
        let db = db();
        // PMS150C (13 bit) shifted as a 14 bit family must not match
        assert!(db
            .resolve_probe_response(0xA16 << 4, MemoryKind::Otp)
            .is_none());
        assert_eq!(
            db.resolve_probe_response(0xA16 << 6, MemoryKind::Otp)
                .unwrap()
                .name,
            "PMS150C"
        );
    }

    #[test]
    fn test_flash_probe_is_direct() {
        let db = db();
        assert_eq!(
            db.resolve_probe_response(0xEA2, MemoryKind::Flash)
                .unwrap()
                .name,
            "PFS173"
        );
        assert!(db.resolve_probe_response(0xEA2 << 2, MemoryKind::Flash).is_none());
    }

    #[test]
    fn test_select() {
        let db = db();
        assert!(matches!(db.select(None, None), Err(Error::NoChipSelected)));
        assert_eq!(db.select(Some("pfs173"), None).unwrap().name, "PFS173");
        assert_eq!(db.select(None, Some(0xAA1)).unwrap().name, "PFS154");
        // Unknown ID falls back to the name
        assert_eq!(db.select(Some("PMS150C"), Some(0x001)).unwrap().name, "PMS150C");
        assert!(matches!(
            db.select(Some("nope"), None),
            Err(Error::UnknownChip(n)) if n == "nope"
        ));
        assert!(matches!(
            db.select(None, Some(0x123)),
            Err(Error::UnknownChip(n)) if n == "0x123"
        ));
    }

    const ONE_CHIP: &str = r#"
    (
        vendor: "Test",
        chips: [
            (
                name: "PFS999",
                otp_id: 0x2999,
                id12: 0x999,
                memory: Flash,
                address_bits: 13,
                code_bits: 14,
                code_words: 0x800,
                ram_size: 128,
                read: (vdd: 2.5, vpp: 5.5),
                write: (vdd: 3.0, vpp: 5.0),
                write_hv: (vdd: 5.8, vpp: 8.5),
                write_block: (size: 4, clock_groups: 1, clocks_per_group: 8),
                erase: Some((cmd: (vdd: 2.5, vpp: 5.5), hv: (vdd: 3.0, vpp: 9.0), clocks: 2)),
            ),
        ],
    )
    "#;

    #[test]
    fn test_load_ron() {
        let mut db = ChipDatabase::new();
        assert_eq!(db.load_ron(ONE_CHIP).unwrap(), 1);
        let chip = db.find_by_id12(0x999).unwrap();
        assert!(chip.aliases.is_empty());
        assert!(chip.excluded_region.is_none());
        assert!(!chip.exclude_first_instruction);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut db = ChipDatabase::new();
        db.load_ron(ONE_CHIP).unwrap();
        assert!(matches!(db.load_ron(ONE_CHIP), Err(Error::Database(_))));
        // The failed load left the table as it was
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn test_excluded_region_out_of_range_rejected() {
        let bad = ONE_CHIP.replace(
            "ram_size: 128,",
            "ram_size: 128, exclude: Some((start: 0x7F0, end: 0x810)),",
        );
        let mut db = ChipDatabase::new();
        assert!(matches!(db.load_ron(&bad), Err(Error::Database(_))));
    }

    #[test]
    fn test_flash_without_erase_rejected() {
        let bad = ONE_CHIP.replace(
            "erase: Some((cmd: (vdd: 2.5, vpp: 5.5), hv: (vdd: 3.0, vpp: 9.0), clocks: 2)),",
            "",
        );
        let mut db = ChipDatabase::new();
        assert!(matches!(db.load_ron(&bad), Err(Error::Database(_))));
    }
}

//! Program image building
//!
//! Input files are decoded into byte cells: a cell is present when any bit
//! above the low byte is set, and its payload is the low byte. The builder
//! turns those cells into the byte buffer that is uploaded to the
//! programmer.

use crate::chip::ChipDescriptor;
use crate::error::{Error, Result};

/// Fill value for unused memory (the erased state)
pub const FILL_ERASED: u8 = 0xFF;

/// Fill value for unused memory when secure fill is requested
pub const FILL_SECURE: u8 = 0x00;

/// Check whether an input cell carries data
#[inline]
pub fn cell_present(cell: u16) -> bool {
    cell & 0xFF00 != 0
}

/// Byte image ready to be uploaded to the programmer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramImage {
    bytes: Vec<u8>,
    used_length: usize,
    fill_value: u8,
}

impl ProgramImage {
    /// Build the image for a chip from decoded input cells
    ///
    /// Gaps between present cells are filled with the fill value and written
    /// like any other byte. With `secure_fill` the unused memory is zeroed
    /// and the used length is forced up to the chip's fill boundary, so the
    /// real code length cannot be read back from trailing erased words.
    pub fn build(cells: &[u16], secure_fill: bool, chip: &ChipDescriptor) -> Result<Self> {
        let fill_value = if secure_fill { FILL_SECURE } else { FILL_ERASED };
        let capacity = chip.capacity_bytes();
        let mut bytes = vec![fill_value; capacity];
        let mut used_length = 0;

        for (offset, &cell) in cells.iter().enumerate() {
            if !cell_present(cell) {
                continue;
            }
            if offset >= capacity {
                return Err(Error::ImageTooLarge {
                    chip: chip.name.clone(),
                    needed: offset + 1,
                    capacity,
                });
            }
            bytes[offset] = cell as u8;
            used_length = offset + 1;
        }

        if used_length == 0 {
            return Err(Error::NothingToWrite);
        }

        if secure_fill {
            let boundary = usize::from(chip.fill_boundary()) * 2;
            if used_length > boundary {
                log::warn!(
                    "secure fill: data beyond 0x{:04X} is reserved for calibration and is not written",
                    boundary
                );
                bytes[boundary..used_length].fill(fill_value);
            }
            used_length = boundary;
        }

        Ok(Self {
            bytes,
            used_length,
            fill_value,
        })
    }

    /// The whole code memory image
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Mutable access for the calibration patcher
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// The bytes that will be written
    pub fn data(&self) -> &[u8] {
        &self.bytes[..self.used_length]
    }

    /// One past the highest byte that is written
    pub fn used_length(&self) -> usize {
        self.used_length
    }

    /// Number of code words to write
    pub fn word_count(&self) -> u16 {
        ((self.used_length + 1) / 2) as u16
    }

    /// Fill value of unused memory
    pub fn fill_value(&self) -> u8 {
        self.fill_value
    }
}

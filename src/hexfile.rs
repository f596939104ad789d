//! Intel HEX and raw binary image files
//!
//! Images are decoded into byte cells. A present cell is stored as
//! `0xFF00 | byte`, an absent one as 0, which is the input format of
//! [`pdkprog_core::image::ProgramImage::build`].

use std::fs;
use std::path::Path;

use ihex::Record;
use pdkprog_core::chip::MAX_IMAGE_CELLS;
use thiserror::Error;

/// Bytes per data record in written HEX files
const HEX_RECORD_LEN: usize = 16;

/// File codec errors
#[derive(Debug, Error)]
pub enum FileError {
    /// The file could not be read or written
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Malformed Intel HEX
    #[error("invalid input file / not ihex8 format: {0}")]
    Hex(#[from] ihex::ReaderError),

    /// HEX records could not be rendered
    #[error("could not encode Intel HEX: {0}")]
    HexWrite(#[from] ihex::WriterError),

    /// Data outside the largest supported image
    #[error("invalid input file / data at 0x{0:X} exceeds image size")]
    OutOfRange(usize),
}

/// Output file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// Intel HEX (8 bit)
    Hex,
    /// Raw bytes
    Binary,
}

impl FileFormat {
    /// Format implied by a file name
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("bin") => Self::Binary,
            _ => Self::Hex,
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> FileError {
    FileError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Read an image file into byte cells
pub fn read_image(path: &Path) -> Result<Vec<u16>, FileError> {
    match FileFormat::from_path(path) {
        FileFormat::Binary => {
            let data = fs::read(path).map_err(|e| io_error(path, e))?;
            decode_binary(&data)
        }
        FileFormat::Hex => {
            let text = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
            decode_hex(&text)
        }
    }
}

/// Write an image file
pub fn write_image(path: &Path, data: &[u8], format: FileFormat) -> Result<(), FileError> {
    let contents = match format {
        FileFormat::Binary => data.to_vec(),
        FileFormat::Hex => encode_hex(data)?.into_bytes(),
    };
    fs::write(path, contents).map_err(|e| io_error(path, e))
}

fn decode_binary(data: &[u8]) -> Result<Vec<u16>, FileError> {
    if data.len() > MAX_IMAGE_CELLS {
        return Err(FileError::OutOfRange(MAX_IMAGE_CELLS));
    }
    let mut cells = vec![0u16; MAX_IMAGE_CELLS];
    for (cell, &byte) in cells.iter_mut().zip(data) {
        *cell = 0xFF00 | u16::from(byte);
    }
    Ok(cells)
}

fn decode_hex(text: &str) -> Result<Vec<u16>, FileError> {
    let mut cells = vec![0u16; MAX_IMAGE_CELLS];
    let mut base = 0usize;

    for record in ihex::Reader::new(text) {
        match record? {
            Record::Data { offset, value } => {
                let start = base + usize::from(offset);
                for (i, byte) in value.into_iter().enumerate() {
                    let cell = cells
                        .get_mut(start + i)
                        .ok_or(FileError::OutOfRange(start + i))?;
                    *cell = 0xFF00 | u16::from(byte);
                }
            }
            Record::ExtendedSegmentAddress(segment) => base = usize::from(segment) << 4,
            Record::ExtendedLinearAddress(upper) => base = usize::from(upper) << 16,
            Record::EndOfFile => break,
            Record::StartSegmentAddress { .. } | Record::StartLinearAddress(_) => {}
        }
    }
    Ok(cells)
}

fn encode_hex(data: &[u8]) -> Result<String, FileError> {
    let mut records: Vec<Record> = data
        .chunks(HEX_RECORD_LEN)
        .enumerate()
        .map(|(i, chunk)| Record::Data {
            offset: (i * HEX_RECORD_LEN) as u16,
            value: chunk.to_vec(),
        })
        .collect();
    records.push(Record::EndOfFile);
    Ok(ihex::create_object_file_representation(&records)?)
}

//! Error types for pdkprog-core

use core::fmt;
use std::io;

use thiserror::Error;

/// First value of the echo range the programmer reserves for error codes
///
/// Any echo at or above this value (up to 0xFFFF) is a device-side error.
/// The low nibble selects the message in [`DEVICE_ERROR_MESSAGES`].
pub const DEVICE_ERROR_BASE: u32 = 0xFFF0;

/// Last value of the reserved error range
pub const DEVICE_ERROR_LAST: u32 = 0xFFFF;

/// Messages for device error codes, indexed by the low 4 bits of the code
pub const DEVICE_ERROR_MESSAGES: [&str; 16] = [
    "general error",
    "high voltage supply too low",
    "high voltage supply too high",
    "VDD too low",
    "VDD too high",
    "IC not responding",
    "command not supported",
    "IC ID mismatch",
    "blank check failed",
    "verify failed",
    "buffer overflow",
    "calibration failed",
    "timeout",
    "invalid parameter",
    "protocol error",
    "unknown error",
];

/// An error code reported by the programmer in place of an ID echo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceError {
    code: u16,
}

impl DeviceError {
    /// Classify a raw echo value, returning `Some` if it lies in the
    /// reserved error range
    pub fn from_response(raw: u32) -> Option<Self> {
        if (DEVICE_ERROR_BASE..=DEVICE_ERROR_LAST).contains(&raw) {
            Some(Self { code: raw as u16 })
        } else {
            None
        }
    }

    /// Build the error for a given table index (0..16)
    pub fn from_index(index: u8) -> Self {
        Self {
            code: (DEVICE_ERROR_BASE as u16) | u16::from(index & 0x0F),
        }
    }

    /// The raw code as sent by the programmer
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Human readable message for this code
    pub fn message(&self) -> &'static str {
        DEVICE_ERROR_MESSAGES[usize::from(self.code & 0x000F)]
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:04X})", self.message(), self.code)
    }
}

/// Device operations, used to tell the user which step failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Probing for an attached IC
    Probe,
    /// Reading the code memory
    Read,
    /// Erasing a FLASH IC
    Erase,
    /// Checking the IC is blank
    BlankCheck,
    /// Writing the program image
    Write,
    /// Verifying the written image
    Verify,
    /// Writing the fuse word
    WriteFuse,
    /// Running the live calibration
    Calibrate,
    /// Rewriting the image with the calibration result
    WriteCalibration,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Probe => "probe",
            Self::Read => "read",
            Self::Erase => "erase",
            Self::BlankCheck => "blank check",
            Self::Write => "write",
            Self::Verify => "verify",
            Self::WriteFuse => "write fuse",
            Self::Calibrate => "calibration",
            Self::WriteCalibration => "write calibration",
        };
        f.write_str(s)
    }
}

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Neither an IC name nor an IC ID was given
    #[error("IC name and ID unspecified, use --icname or --icid")]
    NoChipSelected,

    /// The requested IC is not in the chip table
    #[error("unknown IC: {0}")]
    UnknownChip(String),

    /// The chip table itself is malformed
    #[error("invalid chip database: {0}")]
    Database(String),

    /// No IC has been resolved for this session yet
    #[error("no IC selected for this session")]
    ChipNotResolved,

    /// The programmer answered with a code from the reserved error range
    #[error("{operation} failed: programmer reported {error}")]
    Device {
        /// Operation that was running
        operation: Operation,
        /// Decoded device error
        error: DeviceError,
    },

    /// The programmer echoed an ID other than the one commanded
    #[error("{operation} failed (IC answered 0x{echo:03X}, expected 0x{expected:03X})")]
    OperationFailed {
        /// Operation that was running
        operation: Operation,
        /// Value echoed by the programmer
        echo: u32,
        /// The IC ID that was commanded
        expected: u16,
    },

    /// Erase requested for an IC without erasable memory
    #[error("only FLASH type IC can be erased ({0} is OTP)")]
    NotErasable(String),

    /// The loaded image contains no data
    #[error("nothing to write")]
    NothingToWrite,

    /// The loaded image does not fit into the IC
    #[error("image needs {needed} bytes but {chip} only holds {capacity} bytes")]
    ImageTooLarge {
        /// Chip name
        chip: String,
        /// Bytes needed by the image
        needed: usize,
        /// Capacity of the IC in bytes
        capacity: usize,
    },

    /// Data could not be moved to or from the programmer's buffer
    #[error("could not {0} data buffer of programmer")]
    BufferTransfer(&'static str),

    /// The live calibration did not produce a result
    #[error("calibration failed")]
    CalibrationFailed,

    /// The calibration result could not be patched into the image
    #[error("error removing calibration function")]
    CalibrationRemoval,

    /// No programmer could be found or opened
    #[error("no programmer found")]
    ProgrammerNotFound,

    /// Programmer communication failed
    #[error("programmer communication error: {0}")]
    Transport(String),

    /// Local I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Build the error for a failed ID echo
    ///
    /// Values in the reserved range become [`Error::Device`], everything
    /// else is an [`Error::OperationFailed`].
    pub fn from_echo(operation: Operation, echo: u32, expected: u16) -> Self {
        match DeviceError::from_response(echo) {
            Some(error) => Error::Device { operation, error },
            None => Error::OperationFailed {
                operation,
                echo,
                expected,
            },
        }
    }
}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;

//! Error types for EASY PDK communication

use pdkprog_core::programmer::Version;
use thiserror::Error;

/// EASY PDK specific errors
#[derive(Debug, Error)]
pub enum EasyPdkError {
    /// Failed to connect to the programmer
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// No port answered the version handshake
    #[error("No programmer found")]
    NotFound,

    /// The programmer speaks a protocol we do not
    #[error("Unsupported protocol version {0}")]
    UnsupportedProtocol(Version),

    /// The response frame did not belong to the command
    #[error("Invalid response 0x{response:02X} for command 0x{command:02X}")]
    InvalidResponse {
        /// Command sent
        command: u8,
        /// Command byte of the response frame
        response: u8,
    },

    /// The response payload was shorter than the command requires
    #[error("Short response for command 0x{command:02X}: {len} bytes, need {expected}")]
    ShortResponse {
        /// Command sent
        command: u8,
        /// Payload length received
        len: usize,
        /// Payload length required
        expected: usize,
    },

    /// A request payload does not fit into a frame
    #[error("Payload of {0} bytes is too long")]
    PayloadTooLong(usize),

    /// The programmer rejected a command
    #[error("Command 0x{0:02X} rejected by programmer")]
    Rejected(u8),

    /// I/O error during communication
    #[error("I/O error: {0}")]
    IoError(String),

    /// Serial port error
    #[error("Serial port error: {0}")]
    SerialError(#[from] serialport::Error),
}

/// Result type for EASY PDK operations
pub type Result<T> = core::result::Result<T, EasyPdkError>;

impl From<std::io::Error> for EasyPdkError {
    fn from(e: std::io::Error) -> Self {
        EasyPdkError::IoError(e.to_string())
    }
}

impl From<EasyPdkError> for pdkprog_core::Error {
    fn from(e: EasyPdkError) -> Self {
        match e {
            EasyPdkError::NotFound => pdkprog_core::Error::ProgrammerNotFound,
            other => pdkprog_core::Error::Transport(other.to_string()),
        }
    }
}

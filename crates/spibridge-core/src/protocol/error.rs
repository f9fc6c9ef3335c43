//! Protocol errors

use thiserror::Error;

/// Errors that can occur while talking to the SPI bridge
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Timed out waiting for response: got {received} of {expected} bytes")]
    Timeout { expected: usize, received: usize },

    #[error("Frame too short: need {expected} bytes, got {actual}")]
    FrameTooShort { expected: usize, actual: usize },

    #[error("CRC mismatch: calculated {expected:#06x}, frame carries {actual:#06x}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    #[error("Opcode mismatch: expected {expected:#04x}, got {actual:#04x}")]
    OpcodeMismatch { expected: u8, actual: u8 },

    #[error("Sync word mismatch: expected {expected:#06x}, got {actual:#06x}")]
    SyncMismatch { expected: u16, actual: u16 },

    #[error("Payload of {length} bytes exceeds limit of {max} for opcode {opcode:#04x}")]
    PayloadTooLarge { opcode: u8, length: usize, max: usize },

    #[error("Response payload too short: need {expected} bytes, got {actual}")]
    ShortPayload { expected: usize, actual: usize },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProtocolError {
    /// True for failures of the link itself rather than of a frame's contents
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            ProtocolError::SerialError(_) | ProtocolError::PortNotFound(_) | ProtocolError::IoError(_)
        )
    }
}

//! Bridge opcodes
//!
//! Defines the operations understood by the SPI bridge firmware.

use serde::{Deserialize, Serialize};

use super::{frame::FRAME_OVERHEAD, MAX_SPI_PAYLOAD};

/// One-byte operation selector carried in every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    /// Query firmware version and name
    Version = 0x00,

    /// Relay a full-duplex SPI transfer
    SpiTransfer = 0x01,

    /// Switch the status LED
    Led = 0x02,

    /// Sample the DIO0 and DIO5 lines
    ReadGpio = 0x03,
}

impl Opcode {
    /// Wire value of the opcode
    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Look up an opcode from its wire value
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Opcode::Version),
            0x01 => Some(Opcode::SpiTransfer),
            0x02 => Some(Opcode::Led),
            0x03 => Some(Opcode::ReadGpio),
            _ => None,
        }
    }

    /// Largest payload the device accepts for this opcode.
    ///
    /// Only SPI transfers are bounded by the relay buffer; everything else is
    /// limited by the 16-bit length field.
    pub fn max_payload(self) -> usize {
        match self {
            Opcode::SpiTransfer => MAX_SPI_PAYLOAD,
            _ => u16::MAX as usize,
        }
    }

    /// Whether oversized payloads are cut down instead of rejected
    pub fn truncates_payload(self) -> bool {
        matches!(self, Opcode::SpiTransfer)
    }

    /// Number of bytes the device sends back for a request frame of
    /// `request_len` bytes
    pub fn response_len(self, request_len: usize) -> usize {
        match self {
            // 3 version bytes + 14 byte name
            Opcode::Version => FRAME_OVERHEAD + 17,
            Opcode::ReadGpio => FRAME_OVERHEAD + 2,
            Opcode::Led | Opcode::SpiTransfer => request_len,
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Opcode::from_byte(byte).ok_or(byte)
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Opcode::Version => "VERSION",
            Opcode::SpiTransfer => "SPI_TRANSFER",
            Opcode::Led => "LED",
            Opcode::ReadGpio => "READ_GPIO",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_bytes() {
        assert_eq!(Opcode::Version.byte(), 0x00);
        assert_eq!(Opcode::SpiTransfer.byte(), 0x01);
        assert_eq!(Opcode::Led.byte(), 0x02);
        assert_eq!(Opcode::ReadGpio.byte(), 0x03);
    }

    #[test]
    fn test_opcode_from_byte() {
        for op in [Opcode::Version, Opcode::SpiTransfer, Opcode::Led, Opcode::ReadGpio] {
            assert_eq!(Opcode::try_from(op.byte()), Ok(op));
        }
        assert_eq!(Opcode::try_from(0x04), Err(0x04));
        assert!(Opcode::from_byte(0xFF).is_none());
    }

    #[test]
    fn test_response_lengths() {
        assert_eq!(Opcode::Version.response_len(7), 24);
        assert_eq!(Opcode::ReadGpio.response_len(7), 9);
        assert_eq!(Opcode::Led.response_len(8), 8);
        assert_eq!(Opcode::SpiTransfer.response_len(1031), 1031);
    }

    #[test]
    fn test_payload_limits() {
        assert_eq!(Opcode::SpiTransfer.max_payload(), 1024);
        assert!(Opcode::SpiTransfer.truncates_payload());
        assert!(!Opcode::Led.truncates_payload());
        assert_eq!(Opcode::Version.max_payload(), 65535);
    }

    #[test]
    fn test_display() {
        assert_eq!(Opcode::ReadGpio.to_string(), "READ_GPIO");
    }
}

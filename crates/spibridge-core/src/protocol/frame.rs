//! Frame encoding/decoding
//!
//! Frame format (all fields big-endian):
//! - 2 bytes: sync word (0xABCD), not covered by the CRC
//! - 1 byte: opcode
//! - 2 bytes: payload length
//! - N bytes: payload
//! - 2 bytes: CRC16-CCITT of opcode + length + payload

use byteorder::{BigEndian, ByteOrder};

use super::{crc, Opcode, ProtocolError, SYNC_WORD};

/// Bytes in front of the payload (sync + opcode + length)
pub const FRAME_HEADER_LEN: usize = 5;

/// Header plus trailing CRC; also the size of a frame with an empty payload
pub const FRAME_OVERHEAD: usize = FRAME_HEADER_LEN + 2;

/// A bridge frame.
///
/// Only built through [`Frame::new`] or [`Frame::from_bytes`], so the payload
/// always fits the opcode's limit and the 16-bit length field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    sync: u16,
    opcode: Opcode,
    payload: Vec<u8>,
}

impl Frame {
    /// Create an outbound frame.
    ///
    /// SPI transfer payloads longer than the device buffer are truncated.
    /// Other opcodes reject payloads that do not fit the length field.
    pub fn new(opcode: Opcode, mut payload: Vec<u8>) -> Result<Self, ProtocolError> {
        let max = opcode.max_payload();
        if payload.len() > max {
            if !opcode.truncates_payload() {
                return Err(ProtocolError::PayloadTooLarge {
                    opcode: opcode.byte(),
                    length: payload.len(),
                    max,
                });
            }
            tracing::warn!(
                %opcode,
                len = payload.len(),
                max,
                "payload exceeds device buffer, truncating"
            );
            payload.truncate(max);
        }

        Ok(Self {
            sync: SYNC_WORD,
            opcode,
            payload,
        })
    }

    /// Decode a received frame, slicing the payload by its length field.
    ///
    /// A payload over the opcode's limit is rejected rather than truncated.
    pub fn from_bytes(
        data: &[u8],
        expected: Opcode,
        validate_sync: bool,
    ) -> Result<Self, ProtocolError> {
        validate(data, expected, validate_sync)?;

        let length = BigEndian::read_u16(&data[3..5]) as usize;
        if length > expected.max_payload() {
            return Err(ProtocolError::PayloadTooLarge {
                opcode: expected.byte(),
                length,
                max: expected.max_payload(),
            });
        }
        Ok(Self {
            sync: BigEndian::read_u16(&data[0..2]),
            opcode: expected,
            payload: data[FRAME_HEADER_LEN..FRAME_HEADER_LEN + length].to_vec(),
        })
    }

    /// Framing marker as sent or received
    pub fn sync(&self) -> u16 {
        self.sync
    }

    /// Operation selector
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Opcode specific payload
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Take ownership of the payload
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    fn length_field(&self) -> u16 {
        // Construction keeps the payload within u16::MAX
        self.payload.len() as u16
    }

    /// CRC over opcode, length and payload
    pub fn crc(&self) -> u16 {
        let mut header = [0u8; 3];
        header[0] = self.opcode.byte();
        BigEndian::write_u16(&mut header[1..], self.length_field());
        self.payload
            .iter()
            .fold(crc::compute(&header), |acc, &b| crc::update(acc, b))
    }

    /// Encode the frame to raw bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.encoded_size()];

        BigEndian::write_u16(&mut bytes[0..2], self.sync);
        bytes[2] = self.opcode.byte();
        BigEndian::write_u16(&mut bytes[3..5], self.length_field());
        bytes[FRAME_HEADER_LEN..FRAME_HEADER_LEN + self.payload.len()]
            .copy_from_slice(&self.payload);

        let crc_offset = FRAME_HEADER_LEN + self.payload.len();
        BigEndian::write_u16(&mut bytes[crc_offset..], self.crc());

        bytes
    }

    /// Get the total encoded size
    pub fn encoded_size(&self) -> usize {
        FRAME_OVERHEAD + self.payload.len()
    }
}

/// Check a received frame.
///
/// Checks run in this order: minimum size, length field, optional sync word,
/// CRC, opcode. A corrupted opcode therefore surfaces as a CRC error.
pub fn validate(data: &[u8], expected: Opcode, validate_sync: bool) -> Result<(), ProtocolError> {
    if data.len() < FRAME_OVERHEAD {
        return Err(ProtocolError::FrameTooShort {
            expected: FRAME_OVERHEAD,
            actual: data.len(),
        });
    }

    let length = BigEndian::read_u16(&data[3..5]) as usize;
    if data.len() < FRAME_OVERHEAD + length {
        return Err(ProtocolError::FrameTooShort {
            expected: FRAME_OVERHEAD + length,
            actual: data.len(),
        });
    }

    let sync = BigEndian::read_u16(&data[0..2]);
    if validate_sync && sync != SYNC_WORD {
        return Err(ProtocolError::SyncMismatch {
            expected: SYNC_WORD,
            actual: sync,
        });
    }

    let crc_offset = data.len() - 2;
    let calculated = crc::compute(&data[2..crc_offset]);
    let received = BigEndian::read_u16(&data[crc_offset..]);
    if calculated != received {
        return Err(ProtocolError::ChecksumMismatch {
            expected: calculated,
            actual: received,
        });
    }

    if data[2] != expected.byte() {
        return Err(ProtocolError::OpcodeMismatch {
            expected: expected.byte(),
            actual: data[2],
        });
    }

    Ok(())
}

/// Everything between the header and the CRC of a validated frame, whatever
/// the length field says. Fixed-size responses are read at these offsets.
pub fn body(data: &[u8]) -> &[u8] {
    if data.len() < FRAME_OVERHEAD {
        return &[];
    }
    &data[FRAME_HEADER_LEN..data.len() - 2]
}

/// Build the wire bytes for `opcode` carrying `payload`
pub fn encode(opcode: Opcode, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    Ok(Frame::new(opcode, payload.to_vec())?.to_bytes())
}

/// Validate a received frame and return its payload.
///
/// The sync word is not checked; see [`Frame::from_bytes`] for the strict form.
pub fn decode_and_validate(data: &[u8], expected: Opcode) -> Result<Vec<u8>, ProtocolError> {
    Frame::from_bytes(data, expected, false).map(Frame::into_payload)
}

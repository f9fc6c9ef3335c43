//! Frame codec and CRC properties

use pretty_assertions::assert_eq;
use rand::{rngs::StdRng, Rng, SeedableRng};
use spibridge_core::protocol::{
    crc, decode_and_validate, encode, frame, Frame, Opcode, ProtocolError, MAX_SPI_PAYLOAD,
    MIN_FRAME_SIZE, SYNC_WORD,
};

const ALL_OPCODES: [Opcode; 4] = [
    Opcode::Version,
    Opcode::SpiTransfer,
    Opcode::Led,
    Opcode::ReadGpio,
];

fn random_payload(rng: &mut StdRng, max_len: usize) -> Vec<u8> {
    let len = rng.gen_range(0..=max_len);
    (0..len).map(|_| rng.gen()).collect()
}

fn assert_checksum_mismatch(result: Result<Vec<u8>, ProtocolError>) {
    match result {
        Err(ProtocolError::ChecksumMismatch { expected, actual }) => assert_ne!(expected, actual),
        other => panic!("expected ChecksumMismatch, got {:?}", other),
    }
}

#[test]
fn test_crc_check_vector() {
    assert_eq!(crc::compute(b"123456789"), 0x29B1);
}

#[test]
fn test_crc_deterministic() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..32 {
        let data = random_payload(&mut rng, 64);
        assert_eq!(crc::compute(&data), crc::compute(&data));
    }
}

#[test]
fn test_roundtrip_random_payloads() {
    let mut rng = StdRng::seed_from_u64(0x5B1D6E);
    for opcode in ALL_OPCODES {
        for _ in 0..16 {
            let payload = random_payload(&mut rng, MAX_SPI_PAYLOAD);
            let bytes = encode(opcode, &payload).unwrap();
            assert_eq!(bytes.len(), MIN_FRAME_SIZE + payload.len());
            assert_eq!(decode_and_validate(&bytes, opcode).unwrap(), payload);
        }
    }
}

#[test]
fn test_roundtrip_boundary_lengths() {
    for len in [0usize, 1, MAX_SPI_PAYLOAD] {
        let payload = vec![0xA5; len];
        let bytes = encode(Opcode::SpiTransfer, &payload).unwrap();
        assert_eq!(decode_and_validate(&bytes, Opcode::SpiTransfer).unwrap(), payload);
    }
}

#[test]
fn test_header_layout() {
    let bytes = encode(Opcode::SpiTransfer, &[0x11, 0x22, 0x33]).unwrap();
    assert_eq!(u16::from_be_bytes([bytes[0], bytes[1]]), SYNC_WORD);
    assert_eq!(bytes[2], 0x01);
    assert_eq!(&bytes[3..5], &[0x00, 0x03]);
    assert_eq!(&bytes[5..8], &[0x11, 0x22, 0x33]);

    let crc = crc::compute(&bytes[2..8]);
    assert_eq!(&bytes[8..], &crc.to_be_bytes());
}

#[test]
fn test_crc_excludes_sync() {
    let mut bytes = encode(Opcode::Led, &[0x01]).unwrap();
    bytes[0] ^= 0xFF;
    bytes[1] ^= 0x0F;
    assert_eq!(decode_and_validate(&bytes, Opcode::Led).unwrap(), vec![0x01]);
}

#[test]
fn test_bit_flip_in_payload_detected() {
    let payload: Vec<u8> = (0..32).collect();
    let clean = encode(Opcode::SpiTransfer, &payload).unwrap();

    for byte in 5..5 + payload.len() {
        for bit in 0..8 {
            let mut corrupted = clean.clone();
            corrupted[byte] ^= 1 << bit;
            assert_checksum_mismatch(decode_and_validate(&corrupted, Opcode::SpiTransfer));
        }
    }
}

#[test]
fn test_bit_flip_in_length_detected() {
    // Large buffer so a shorter length still fits; a longer one is caught first
    let payload = vec![0u8; 300];
    let clean = encode(Opcode::SpiTransfer, &payload).unwrap();

    for bit in 0..8 {
        let mut corrupted = clean.clone();
        corrupted[4] ^= 1 << bit;
        let claimed = u16::from_be_bytes([corrupted[3], corrupted[4]]) as usize;
        let result = decode_and_validate(&corrupted, Opcode::SpiTransfer);
        if claimed < payload.len() {
            assert_checksum_mismatch(result);
        } else {
            assert!(matches!(result, Err(ProtocolError::FrameTooShort { .. })));
        }
    }

    let mut corrupted = clean.clone();
    corrupted[3] ^= 0x01;
    assert_checksum_mismatch(decode_and_validate(&corrupted, Opcode::SpiTransfer));
}

#[test]
fn test_bit_flip_in_opcode_detected() {
    let clean = encode(Opcode::ReadGpio, &[0x01, 0x00]).unwrap();
    for bit in 0..8 {
        let mut corrupted = clean.clone();
        corrupted[2] ^= 1 << bit;
        assert_checksum_mismatch(decode_and_validate(&corrupted, Opcode::ReadGpio));
    }
}

#[test]
fn test_bit_flip_in_crc_detected() {
    let clean = encode(Opcode::Version, &[]).unwrap();
    let mut corrupted = clean.clone();
    corrupted[6] ^= 0x80;
    assert_checksum_mismatch(decode_and_validate(&corrupted, Opcode::Version));
}

#[test]
fn test_spi_truncation_keeps_prefix() {
    let mut rng = StdRng::seed_from_u64(1024);
    let payload: Vec<u8> = (0..1500).map(|_| rng.gen()).collect();

    let bytes = encode(Opcode::SpiTransfer, &payload).unwrap();
    assert_eq!(bytes.len(), MIN_FRAME_SIZE + MAX_SPI_PAYLOAD);
    assert_eq!(
        decode_and_validate(&bytes, Opcode::SpiTransfer).unwrap(),
        payload[..MAX_SPI_PAYLOAD].to_vec()
    );
}

#[test]
fn test_non_spi_opcode_not_truncated() {
    let payload = vec![0x33; 2048];
    let frame = Frame::new(Opcode::Version, payload.clone()).unwrap();
    assert_eq!(frame.payload(), payload.as_slice());
}

#[test]
fn test_frame_too_short() {
    for len in 0..MIN_FRAME_SIZE {
        let data = vec![0u8; len];
        match decode_and_validate(&data, Opcode::Version) {
            Err(ProtocolError::FrameTooShort { expected, actual }) => {
                assert_eq!(expected, MIN_FRAME_SIZE);
                assert_eq!(actual, len);
            }
            other => panic!("expected FrameTooShort for {} bytes, got {:?}", len, other),
        }
    }
}

#[test]
fn test_opcode_mismatch_after_valid_crc() {
    let bytes = encode(Opcode::SpiTransfer, &[0x42, 0x12]).unwrap();
    let err = decode_and_validate(&bytes, Opcode::Version).unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::OpcodeMismatch {
            expected: 0x00,
            actual: 0x01
        }
    ));
}

#[test]
fn test_strict_sync() {
    let mut bytes = encode(Opcode::Led, &[0x00]).unwrap();
    assert!(frame::validate(&bytes, Opcode::Led, true).is_ok());

    bytes[1] = 0xCE;
    assert!(matches!(
        frame::validate(&bytes, Opcode::Led, true),
        Err(ProtocolError::SyncMismatch {
            expected: 0xABCD,
            actual: 0xABCE
        })
    ));
    assert!(frame::validate(&bytes, Opcode::Led, false).is_ok());
}

#[test]
fn test_protocol_error_display() {
    let err = ProtocolError::Timeout {
        expected: 9,
        received: 0,
    };
    assert_eq!(
        err.to_string(),
        "Timed out waiting for response: got 0 of 9 bytes"
    );

    let err = ProtocolError::ChecksumMismatch {
        expected: 0x29B1,
        actual: 0x0000,
    };
    assert_eq!(
        err.to_string(),
        "CRC mismatch: calculated 0x29b1, frame carries 0x0000"
    );
}

//! SPI bridge commands
//!
//! Typed operations on top of a [`Session`]. Each method is one transaction;
//! nothing here retries, callers that want resilience re-issue the command.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::SessionConfig;
use crate::protocol::{frame, Frame, Opcode, ProtocolError, Session, MAX_SPI_PAYLOAD};

/// Returned by [`SpiBridge::read_version`] when the device answers with the
/// wrong opcode
pub const UNKNOWN_VERSION: &str = "unknown";

/// Address bit selecting a register write on SX127x-style SPI slaves
pub const REGISTER_WRITE_BIT: u8 = 0x80;

/// Firmware identification reported by the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareVersion {
    /// Major version
    pub major: u8,
    /// Minor version
    pub minor: u8,
    /// Patch level
    pub patch: u8,
    /// Firmware name, NUL padding removed
    pub name: String,
}

impl FirmwareVersion {
    fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
        if payload.len() < 3 {
            return Err(ProtocolError::ShortPayload {
                expected: 3,
                actual: payload.len(),
            });
        }

        let name = String::from_utf8_lossy(&payload[3..])
            .trim_end_matches('\0')
            .trim()
            .to_string();

        Ok(Self {
            major: payload[0],
            minor: payload[1],
            patch: payload[2],
            name,
        })
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{} {}", self.major, self.minor, self.patch, self.name)
    }
}

/// Host side of the SPI bridge
#[derive(Debug)]
pub struct SpiBridge {
    session: Session,
}

impl SpiBridge {
    /// Drive the bridge over an existing session
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// Open the serial link described by `config`
    pub fn open(config: SessionConfig) -> Result<Self, ProtocolError> {
        Ok(Self::new(Session::open(config)?))
    }

    /// The underlying session
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Mutable access for raw transactions
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Give the session back
    pub fn into_session(self) -> Session {
        self.session
    }

    /// Close the link
    pub fn close(self) -> Result<(), ProtocolError> {
        self.session.close()
    }

    /// Query the firmware version
    pub fn firmware_version(&mut self) -> Result<FirmwareVersion, ProtocolError> {
        let request = Frame::new(Opcode::Version, Vec::new())?;
        let response = self.session.transact(&request)?;
        FirmwareVersion::from_payload(frame::body(&response))
    }

    /// Firmware version as `"major.minor.patch name"`.
    ///
    /// A response carrying another opcode yields [`UNKNOWN_VERSION`] instead of
    /// an error; the version is informational only.
    pub fn read_version(&mut self) -> Result<String, ProtocolError> {
        match self.firmware_version() {
            Ok(version) => Ok(version.to_string()),
            Err(ProtocolError::OpcodeMismatch { actual, .. }) => {
                tracing::warn!(opcode = actual, "version response carried wrong opcode");
                Ok(UNKNOWN_VERSION.to_string())
            }
            Err(e) => Err(e),
        }
    }

    /// Switch the LED. The device echoes the request frame; `true` only if the
    /// echo matches byte for byte.
    ///
    /// A missing or mismatched echo is `Ok(false)`, not an error. Link
    /// failures ([`ProtocolError::is_link_failure`]) still come back as `Err`
    /// so a dead port is not mistaken for a bad echo.
    pub fn set_led(&mut self, on: bool) -> Result<bool, ProtocolError> {
        let request = Frame::new(Opcode::Led, vec![on as u8])?;
        let sent = request.to_bytes();

        match self.session.exchange(&request) {
            Ok(echo) if echo == sent => Ok(true),
            Ok(echo) => {
                tracing::debug!("LED echo mismatch: sent {:02x?}, got {:02x?}", sent, echo);
                Ok(false)
            }
            Err(e) if e.is_link_failure() => Err(e),
            Err(e) => {
                tracing::debug!("LED command failed: {e}");
                Ok(false)
            }
        }
    }

    /// Sample DIO0 and DIO5, returned in that order
    pub fn read_gpio(&mut self) -> Result<(u8, u8), ProtocolError> {
        let request = Frame::new(Opcode::ReadGpio, Vec::new())?;
        let response = self.session.transact(&request)?;
        match frame::body(&response) {
            [dio0, dio5, ..] => Ok((*dio0, *dio5)),
            body => Err(ProtocolError::ShortPayload {
                expected: 2,
                actual: body.len(),
            }),
        }
    }

    /// Relay a full-duplex SPI transfer and return the bytes clocked in.
    /// Input beyond the device's 1024 byte buffer is dropped.
    pub fn spi_transfer(&mut self, data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        let request = Frame::new(Opcode::SpiTransfer, data.to_vec())?;
        let response = self.session.transact(&request)?;
        Ok(frame::body(&response).to_vec())
    }

    /// Read one register: address byte followed by a dummy byte
    pub fn read_register(&mut self, register_id: u8) -> Result<u8, ProtocolError> {
        let response = self.spi_transfer(&[register_id, 0x00])?;
        second_byte(&response)
    }

    /// Write one register, returning the byte clocked out during the data phase
    pub fn write_register(&mut self, register_id: u8, value: u8) -> Result<u8, ProtocolError> {
        let response = self.spi_transfer(&[register_id | REGISTER_WRITE_BIT, value])?;
        second_byte(&response)
    }

    /// Burst read `count` consecutive registers starting at `start`
    pub fn read_registers(&mut self, start: u8, count: usize) -> Result<Vec<u8>, ProtocolError> {
        // One address byte plus `count` data bytes
        if count >= MAX_SPI_PAYLOAD {
            return Err(ProtocolError::PayloadTooLarge {
                opcode: Opcode::SpiTransfer.byte(),
                length: count.saturating_add(1),
                max: MAX_SPI_PAYLOAD,
            });
        }

        let mut request = vec![0u8; count + 1];
        request[0] = start & !REGISTER_WRITE_BIT;

        let response = self.spi_transfer(&request)?;
        if response.len() < count + 1 {
            return Err(ProtocolError::ShortPayload {
                expected: count + 1,
                actual: response.len(),
            });
        }
        Ok(response[1..=count].to_vec())
    }
}

fn second_byte(response: &[u8]) -> Result<u8, ProtocolError> {
    response
        .get(1)
        .copied()
        .ok_or(ProtocolError::ShortPayload {
            expected: 2,
            actual: response.len(),
        })
}

/// Cloneable handle for using one bridge from several threads. The lock is
/// held for a whole command, so transactions never interleave on the link.
#[derive(Debug, Clone)]
pub struct SharedBridge {
    inner: Arc<Mutex<SpiBridge>>,
}

impl SharedBridge {
    /// Share `bridge` between threads
    pub fn new(bridge: SpiBridge) -> Self {
        Self {
            inner: Arc::new(Mutex::new(bridge)),
        }
    }

    /// Run `f` with exclusive access to the bridge
    pub fn with<R>(&self, f: impl FnOnce(&mut SpiBridge) -> R) -> R {
        // Leftovers from a panicked holder are cleared by the next drain
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Recover the bridge once no other handles remain
    pub fn try_unwrap(self) -> Result<SpiBridge, Self> {
        Arc::try_unwrap(self.inner)
            .map(|mutex| mutex.into_inner().unwrap_or_else(PoisonError::into_inner))
            .map_err(|inner| Self { inner })
    }
}

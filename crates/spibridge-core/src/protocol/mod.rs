//! SPI bridge wire protocol
//!
//! Framing, CRC, opcodes and the transaction state machine used to talk to
//! the bridge firmware over a serial link.

pub mod crc;
mod error;
pub mod frame;
mod opcode;
pub mod serial;
mod session;
pub mod stream;

pub use error::ProtocolError;
pub use frame::{decode_and_validate, encode, Frame, FRAME_OVERHEAD};
pub use opcode::Opcode;
pub use serial::{list_ports, PortInfo};
pub use session::{Session, SessionStats, TransactionState};
pub use stream::{CommunicationChannel, SerialChannel, TcpChannel};

/// Start-of-frame marker
pub const SYNC_WORD: u16 = 0xABCD;

/// Baud rate the bridge firmware runs at
pub const DEFAULT_BAUD_RATE: u32 = 57600;

/// Default timeout for responses in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Settle time after opening the port; the board resets on open
pub const DEFAULT_BOOT_DELAY_MS: u64 = 2000;

/// Receive buffer polling interval in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2;

/// SPI relay buffer size on the device
pub const MAX_SPI_PAYLOAD: usize = 1024;

/// Smallest valid frame (empty payload)
pub const MIN_FRAME_SIZE: usize = FRAME_OVERHEAD;

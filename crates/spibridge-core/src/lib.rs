//! # SPI Bridge Core Library
//!
//! Host side of the serial SPI bridge: a microcontroller that relays SPI
//! transfers, drives a status LED and reports two GPIO lines on behalf of a
//! host computer.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - CRC16-CCITT framing of bridge messages
//! - A half-duplex transaction session over serial or TCP links
//! - Typed bridge commands (version, LED, GPIO, SPI transfer, registers)
//!
//! ## Example
//!
//! ```rust,ignore
//! use spibridge_core::{SessionConfig, SpiBridge};
//!
//! let mut bridge = SpiBridge::open(SessionConfig::new("/dev/ttyUSB0"))?;
//! println!("Firmware: {}", bridge.read_version()?);
//! bridge.set_led(true)?;
//! let (dio0, dio5) = bridge.read_gpio()?;
//! let version = bridge.read_register(0x42)?;
//! ```

pub mod bridge;
pub mod config;
pub mod protocol;

pub use bridge::{FirmwareVersion, SharedBridge, SpiBridge};
pub use config::{ConfigError, SessionConfig};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::bridge::{FirmwareVersion, SharedBridge, SpiBridge};
    pub use crate::config::SessionConfig;
    pub use crate::protocol::{Opcode, ProtocolError, Session, TransactionState};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

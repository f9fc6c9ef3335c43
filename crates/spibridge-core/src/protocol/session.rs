//! Transport session
//!
//! Owns the byte stream to the bridge and runs every request through the same
//! transaction: drain stale input, send the frame, wait for the expected
//! number of response bytes, validate. The link is half-duplex and has no
//! resynchronisation token, so the drain step is what recovers from a previous
//! failed exchange.

use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use super::{
    serial::{configure_port, open_port},
    stream::{CommunicationChannel, SerialChannel},
    frame, Frame, ProtocolError,
};
use crate::config::SessionConfig;

/// Upper bound on bytes discarded by one drain, so a babbling device cannot
/// stall the caller forever
const MAX_DRAIN_BYTES: usize = 64 * 1024;

/// Where the current (or last) transaction is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionState {
    /// No transaction has run yet
    Idle,
    /// Discarding stale input
    Draining,
    /// Writing the request frame
    Sending,
    /// Waiting for response bytes
    AwaitingResponse,
    /// Checking the response frame
    Validating,
    /// Last transaction succeeded
    Complete,
    /// Last transaction failed
    Failed,
}

/// Cumulative link counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Bytes written, frames included whole
    pub tx_bytes: u64,
    /// Bytes read, partial responses included
    pub rx_bytes: u64,
    /// Request frames sent
    pub tx_frames: u64,
    /// Complete responses received
    pub rx_frames: u64,
    /// Stale bytes thrown away by drain steps
    pub discarded_bytes: u64,
    /// Transactions that ended in [`TransactionState::Failed`]
    pub failed_transactions: u64,
}

/// Exclusive owner of a bridge link
pub struct Session {
    channel: Box<dyn CommunicationChannel>,
    config: SessionConfig,
    state: TransactionState,
    stats: SessionStats,
}

impl Session {
    /// Open the serial port named in `config` and wait for the bridge to boot
    pub fn open(config: SessionConfig) -> Result<Self, ProtocolError> {
        let mut port = open_port(&config.port_name, config.baud_rate, config.timeout())?;
        configure_port(port.as_mut())?;

        let mut session = Self::with_channel(Box::new(SerialChannel::new(port)), config);
        session.clear_buffers()?;

        // Opening the port resets the board; give the firmware time to come up
        tracing::info!(
            port = %session.config.port_name,
            delay_ms = session.config.boot_delay_ms,
            "waiting for bridge boot"
        );
        std::thread::sleep(session.config.boot_delay());

        // Drop whatever the bootloader printed
        session.clear_buffers()?;

        Ok(session)
    }

    /// Run a session over an already connected channel, applying the
    /// configured timeout to it
    pub fn with_channel(mut channel: Box<dyn CommunicationChannel>, config: SessionConfig) -> Self {
        if let Err(e) = channel.set_timeout(config.timeout()) {
            tracing::warn!(error = %e, "failed to set channel timeout, continuing");
        }

        Self {
            channel,
            config,
            state: TransactionState::Idle,
            stats: SessionStats::default(),
        }
    }

    /// Discard everything buffered in either direction
    pub fn clear_buffers(&mut self) -> Result<(), ProtocolError> {
        self.channel
            .clear_input_buffer()
            .and_then(|()| self.channel.clear_output_buffer())
            .map_err(|e| ProtocolError::SerialError(e.to_string()))
    }

    /// Flush pending output and release the link
    pub fn close(mut self) -> Result<(), ProtocolError> {
        tracing::debug!(stats = ?self.stats, "closing session");
        self.channel.flush()?;
        Ok(())
    }

    /// Settings the session was opened with
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// State reached by the most recent transaction
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Link counters since the session was opened
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Send `request` and return the response frame bytes once they pass
    /// CRC and opcode validation
    pub fn transact(&mut self, request: &Frame) -> Result<Vec<u8>, ProtocolError> {
        let raw = self.exchange_inner(request)?;

        self.enter(TransactionState::Validating);
        match frame::validate(&raw, request.opcode(), self.config.validate_sync) {
            Ok(()) => {
                self.enter(TransactionState::Complete);
                Ok(raw)
            }
            Err(e) => {
                tracing::debug!(opcode = %request.opcode(), "response rejected: {e}");
                self.fail();
                Err(e)
            }
        }
    }

    /// Like [`Session::transact`], decoding the response into a [`Frame`]
    pub fn transact_frame(&mut self, request: &Frame) -> Result<Frame, ProtocolError> {
        let raw = self.transact(request)?;
        Frame::from_bytes(&raw, request.opcode(), self.config.validate_sync)
    }

    /// Send `request` and return the raw response bytes without validating
    /// them. Used where the device echoes the request verbatim.
    pub fn exchange(&mut self, request: &Frame) -> Result<Vec<u8>, ProtocolError> {
        let raw = self.exchange_inner(request)?;
        self.enter(TransactionState::Complete);
        Ok(raw)
    }

    fn exchange_inner(&mut self, request: &Frame) -> Result<Vec<u8>, ProtocolError> {
        let bytes = request.to_bytes();
        let expected = request.opcode().response_len(bytes.len());

        self.enter(TransactionState::Draining);
        self.drain();

        self.enter(TransactionState::Sending);
        if let Err(e) = self.send(&bytes) {
            self.fail();
            return Err(e);
        }

        self.enter(TransactionState::AwaitingResponse);
        match self.read_response(expected) {
            Ok(response) => Ok(response),
            Err(e) => {
                self.fail();
                Err(e)
            }
        }
    }

    fn enter(&mut self, state: TransactionState) {
        tracing::trace!(from = ?self.state, to = ?state, "transaction state");
        self.state = state;
    }

    fn fail(&mut self) {
        self.stats.failed_transactions = self.stats.failed_transactions.saturating_add(1);
        self.enter(TransactionState::Failed);
    }

    /// Read and discard anything already buffered. Never fails: a broken
    /// receive side shows up later as a send or read error.
    fn drain(&mut self) -> usize {
        let mut discarded = Vec::new();
        let mut buf = [0u8; 256];

        while discarded.len() < MAX_DRAIN_BYTES {
            let available = match self.channel.bytes_to_read() {
                Ok(0) => break,
                Ok(n) => n as usize,
                Err(e) => {
                    tracing::warn!(error = %e, "cannot query receive buffer while draining");
                    break;
                }
            };

            let to_read = available.min(buf.len());
            match self.channel.read(&mut buf[..to_read]) {
                Ok(0) => break,
                Ok(n) => discarded.extend_from_slice(&buf[..n]),
                Err(ref e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    break
                }
                Err(e) => {
                    tracing::warn!(error = %e, "read failed while draining");
                    break;
                }
            }
        }

        if !discarded.is_empty() {
            tracing::debug!(
                len = discarded.len(),
                "discarded stale input: {:02x?}",
                discarded
            );
            self.stats.discarded_bytes = self
                .stats
                .discarded_bytes
                .saturating_add(discarded.len() as u64);
        }
        discarded.len()
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        tracing::debug!(len = bytes.len(), "tx: {:02x?}", bytes);
        self.channel.write_all(bytes)?;
        self.channel.flush()?;

        self.stats.tx_bytes = self.stats.tx_bytes.saturating_add(bytes.len() as u64);
        self.stats.tx_frames = self.stats.tx_frames.saturating_add(1);
        Ok(())
    }

    /// Poll until `expected` bytes have arrived or the timeout elapses
    fn read_response(&mut self, expected: usize) -> Result<Vec<u8>, ProtocolError> {
        let timeout = self.config.timeout();
        let poll = self.config.poll_interval().max(Duration::from_millis(1));
        let start = Instant::now();
        let mut response = vec![0u8; expected];
        let mut offset = 0;

        while offset < expected {
            if start.elapsed() > timeout {
                return Err(self.timed_out(&response[..offset], expected));
            }

            let available = self
                .channel
                .bytes_to_read()
                .map_err(|e| ProtocolError::SerialError(e.to_string()))?
                as usize;
            if available == 0 {
                std::thread::sleep(poll);
                continue;
            }

            let to_read = available.min(expected - offset);
            match self.channel.read(&mut response[offset..offset + to_read]) {
                Ok(0) => {
                    tracing::debug!(received = offset, "stream closed while awaiting response");
                    return Err(self.timed_out(&response[..offset], expected));
                }
                Ok(n) => offset += n,
                Err(ref e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    continue
                }
                Err(e) => return Err(ProtocolError::SerialError(e.to_string())),
            }
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(len = expected, elapsed_ms, "rx: {:02x?}", response);
        self.stats.rx_bytes = self.stats.rx_bytes.saturating_add(expected as u64);
        self.stats.rx_frames = self.stats.rx_frames.saturating_add(1);
        Ok(response)
    }

    fn timed_out(&mut self, partial: &[u8], expected: usize) -> ProtocolError {
        if !partial.is_empty() {
            tracing::debug!(expected, "partial response before timeout: {:02x?}", partial);
            self.stats.rx_bytes = self.stats.rx_bytes.saturating_add(partial.len() as u64);
        }
        ProtocolError::Timeout {
            expected,
            received: partial.len(),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

//! Serial port handling
//!
//! Discovery and opening of the USB-serial link to the bridge.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::time::Duration;

use super::ProtocolError;

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,
    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,
    /// USB product ID (if USB device)
    pub pid: Option<u16>,
    /// Product string (if available)
    pub product: Option<String>,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb) => Self {
                name: info.port_name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                product: usb.product,
            },
            _ => Self {
                name: info.port_name,
                vid: None,
                pid: None,
                product: None,
            },
        }
    }
}

impl PortInfo {
    /// USB-serial adapters are the usual way the bridge is attached
    pub fn is_usb(&self) -> bool {
        self.vid.is_some()
    }
}

/// Ordering: USB adapters first, then by name
fn port_sort_key(port: &PortInfo) -> (u8, String) {
    (if port.is_usb() { 0 } else { 1 }, port.name.clone())
}

/// List available serial ports
pub fn list_ports() -> Vec<PortInfo> {
    let mut ports: Vec<PortInfo> = match serialport::available_ports() {
        Ok(ports) => ports.into_iter().map(PortInfo::from).collect(),
        Err(e) => {
            tracing::warn!(error = %e, "failed to enumerate serial ports");
            Vec::new()
        }
    };
    ports.sort_by_key(port_sort_key);
    ports
}

/// Open a serial port
pub fn open_port(
    name: &str,
    baud_rate: u32,
    timeout: Duration,
) -> Result<Box<dyn SerialPort>, ProtocolError> {
    tracing::debug!(port = name, baud_rate, "opening serial port");
    serialport::new(name, baud_rate)
        .timeout(timeout)
        .open()
        .map_err(|e| match e.kind() {
            serialport::ErrorKind::NoDevice => ProtocolError::PortNotFound(name.to_string()),
            _ => ProtocolError::SerialError(e.to_string()),
        })
}

/// Configure the port for the bridge: 8N1, no flow control
pub fn configure_port(port: &mut dyn SerialPort) -> Result<(), ProtocolError> {
    let serial_err = |e: serialport::Error| ProtocolError::SerialError(e.to_string());

    port.set_data_bits(serialport::DataBits::Eight)
        .map_err(serial_err)?;
    port.set_parity(serialport::Parity::None).map_err(serial_err)?;
    port.set_stop_bits(serialport::StopBits::One)
        .map_err(serial_err)?;
    port.set_flow_control(serialport::FlowControl::None)
        .map_err(serial_err)?;

    // Toggling DTR resets Arduino-class boards, keep it asserted
    if let Err(e) = port.write_data_terminal_ready(true) {
        tracing::debug!(error = %e, "failed to assert DTR, continuing");
    }
    if let Err(e) = port.write_request_to_send(true) {
        tracing::debug!(error = %e, "failed to assert RTS, continuing");
    }

    Ok(())
}

//! pdkprog-easypdk - EASY PDK programmer support
//!
//! This crate talks to the EASY PDK programmer over its USB CDC serial
//! port and implements [`pdkprog_core::programmer::Programmer`] for it.
//!
//! # Example
//!
//! ```no_run
//! use pdkprog_core::programmer::Programmer;
//!
//! let (port, mut programmer) = pdkprog_easypdk::open_auto()?;
//! println!("found programmer on {}: {}", port, programmer.version()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod device;
pub mod error;
pub mod protocol;
pub mod transport;

use serialport::{available_ports, SerialPortType};

// Re-exports
pub use device::EasyPdk;
pub use error::{EasyPdkError, Result};
pub use transport::{SerialTransport, Transport};

use protocol::{USB_PID, USB_VID};

/// Open the programmer on a serial port
pub fn open(device: &str) -> Result<EasyPdk<SerialTransport>> {
    let transport = SerialTransport::open(device)
        .map_err(|e| EasyPdkError::ConnectionFailed(format!("{}: {}", device, e)))?;
    EasyPdk::new(transport)
}

/// Serial ports that may have a programmer attached
///
/// Ports with the programmer's USB IDs come first, followed by the other
/// USB serial ports.
pub fn candidate_ports() -> Result<Vec<String>> {
    let ports = available_ports()?;

    let mut matching = Vec::new();
    let mut other = Vec::new();
    for port in ports {
        match &port.port_type {
            SerialPortType::UsbPort(info) if info.vid == USB_VID && info.pid == USB_PID => {
                matching.push(port.port_name)
            }
            SerialPortType::UsbPort(_) | SerialPortType::Unknown => other.push(port.port_name),
            _ => {}
        }
    }

    matching.extend(other);
    Ok(matching)
}

/// Search all candidate ports for a programmer
///
/// Returns the port name together with the connected programmer.
pub fn open_auto() -> Result<(String, EasyPdk<SerialTransport>)> {
    for port in candidate_ports()? {
        log::debug!("easypdk: trying {}", port);
        match open(&port) {
            Ok(pdk) => return Ok((port, pdk)),
            Err(e) => log::debug!("easypdk: {}: {}", port, e),
        }
    }
    Err(EasyPdkError::NotFound)
}

pub mod framer;
pub mod interface;
pub mod mock;
pub mod protocol;

pub use framer::LineFramer;
pub use interface::{NativeTransport, OpenedPort, SerialLink, TransportEvent, TransportProvider};
pub use protocol::{CloseReason, DecodeError, ReadingState, SensorReading};

use serde::{Deserialize, Serialize};
use serialport::{SerialPortInfo, SerialPortType};

use crate::config::SensorIdentity;

/// One entry of the host's serial port enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDescriptor {
    pub path: String,
    pub vendor_id: Option<String>,
    pub product_id: Option<String>,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

impl PortDescriptor {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            vendor_id: None,
            product_id: None,
            serial_number: None,
            manufacturer: None,
            product: None,
        }
    }

    pub fn usb(
        path: impl Into<String>,
        vendor_id: impl Into<String>,
        product_id: impl Into<String>,
    ) -> Self {
        Self {
            vendor_id: Some(vendor_id.into()),
            product_id: Some(product_id.into()),
            ..Self::new(path)
        }
    }

    /// Ports without USB identifiers never match.
    pub fn matches(&self, identity: &SensorIdentity) -> bool {
        match (&self.vendor_id, &self.product_id) {
            (Some(vid), Some(pid)) => identity.matches(vid, pid),
            _ => false,
        }
    }
}

impl From<SerialPortInfo> for PortDescriptor {
    fn from(port: SerialPortInfo) -> Self {
        match port.port_type {
            SerialPortType::UsbPort(usb_info) => Self {
                path: port.port_name,
                vendor_id: Some(format!("{:04x}", usb_info.vid)),
                product_id: Some(format!("{:04x}", usb_info.pid)),
                serial_number: usb_info.serial_number,
                manufacturer: usb_info.manufacturer,
                product: usb_info.product,
            },
            _ => Self::new(port.port_name),
        }
    }
}

/// Filter an enumeration down to the sensor, keeping the provider's order.
pub fn find_sensor_ports<'a>(
    ports: &'a [PortDescriptor],
    identity: &SensorIdentity,
) -> Vec<&'a PortDescriptor> {
    ports.iter().filter(|p| p.matches(identity)).collect()
}

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Port is not open")]
    NotConnected,

    #[error("Port enumeration failed: {0}")]
    Enumeration(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialport error: {0}")]
    SerialportError(#[from] serialport::Error),
}

pub type Result<T> = std::result::Result<T, SerialError>;

//! Sources of serial device descriptors.

use tokio_serial::{SerialPortInfo, SerialPortType};

use super::DeviceDescriptor;
use crate::error::Result;

/// Something that can list the serial devices attached to the host.
pub trait DeviceRegistry: Send + Sync {
    /// An empty list is not an error.
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>>;
}

/// The host's serial ports, as seen by `tokio_serial::available_ports()`.
///
/// Ports that are not USB devices have no product string and are reported
/// with an empty identifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostRegistry;

impl DeviceRegistry for HostRegistry {
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>> {
        let ports = tokio_serial::available_ports()?;
        Ok(ports.into_iter().map(descriptor_from_port).collect())
    }
}

fn descriptor_from_port(port: SerialPortInfo) -> DeviceDescriptor {
    let product = match port.port_type {
        SerialPortType::UsbPort(usb) => usb.product.unwrap_or_default(),
        _ => String::new(),
    };
    DeviceDescriptor::new(port.port_name, product)
}

/// A fixed list of devices.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    descriptors: Vec<DeviceDescriptor>,
}

impl StaticRegistry {
    pub fn new(descriptors: Vec<DeviceDescriptor>) -> Self {
        Self { descriptors }
    }
}

impl DeviceRegistry for StaticRegistry {
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>> {
        Ok(self.descriptors.clone())
    }
}

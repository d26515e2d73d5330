//! Opening the byte channel to the device.

use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::io::AsyncWrite;
use tokio_serial::{SerialPortBuilderExt, SerialStream};

/// Opens a writable channel to a device path.
///
/// Each call opens a fresh channel; the streamer drops the old one before
/// asking for a new one.
#[async_trait]
pub trait Connector: Send + Sync {
    type Channel: AsyncWrite + Unpin + Send;

    async fn open(&self, device_path: &Path, baud_rate: u32) -> io::Result<Self::Channel>;
}

/// Opens the device as a native serial port.
///
/// tokio-serial puts the line in raw mode and, on unix, takes the port
/// exclusively, so a second writer on the same device fails to open.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialConnector;

#[async_trait]
impl Connector for SerialConnector {
    type Channel = SerialStream;

    async fn open(&self, device_path: &Path, baud_rate: u32) -> io::Result<SerialStream> {
        let stream = tokio_serial::new(device_path.to_string_lossy(), baud_rate)
            .open_native_async()?;
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_device_fails_to_open() {
        let result = SerialConnector
            .open(Path::new("/nonexistent/ttyACM9"), 9600)
            .await;
        assert!(result.is_err());
    }
}

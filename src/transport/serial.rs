//! # Serial Transport
//!
//! Reads a correction stream from a receiver attached over USB serial.

use async_trait::async_trait;
use tokio_serial::SerialPortBuilderExt;
use tracing::info;

use super::connector::{ByteStream, Connector};
use crate::error::{FieldLinkError, Result};

/// Serial port connector
///
/// Opens the port with 8N1 framing and no flow control each time a
/// connection is requested.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    /// Device path (e.g., /dev/ttyUSB0)
    device_path: String,
    baud_rate: u32,
}

impl SerialConnector {
    /// Create a connector
    ///
    /// # Arguments
    ///
    /// * `device_path` - Device path (e.g., "/dev/ttyUSB0")
    /// * `baud_rate` - Line speed of the receiver's correction output
    ///
    /// # Errors
    ///
    /// Returns error if the device path is empty
    pub fn new(device_path: &str, baud_rate: u32) -> Result<Self> {
        if device_path.trim().is_empty() {
            return Err(FieldLinkError::Serial("serial device path is not configured".to_string()));
        }

        Ok(Self {
            device_path: device_path.to_string(),
            baud_rate,
        })
    }

    /// Get the configured device path
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Open a specific serial port with 8N1 settings
    ///
    /// # Arguments
    ///
    /// * `path` - Device path (e.g., "/dev/ttyUSB0")
    /// * `baud_rate` - Line speed
    ///
    /// # Returns
    ///
    /// * `Result<SerialStream>` - Opened serial port
    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| FieldLinkError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }
}

#[async_trait]
impl Connector for SerialConnector {
    async fn connect(&self) -> Result<Box<dyn ByteStream>> {
        let port = Self::open_port(&self.device_path, self.baud_rate)?;
        info!("Opened serial port {} at {} baud", self.device_path, self.baud_rate);
        Ok(Box::new(port))
    }

    fn describe(&self) -> String {
        format!("serial://{}@{}", self.device_path, self.baud_rate)
    }
}

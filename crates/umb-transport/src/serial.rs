//! Serial port transport for RS485 UMB buses.
//!
//! This module provides [`SerialTransport`], which implements the
//! [`Transport`] trait for an RS485 bus attached through a USB dongle or a
//! native serial port.
//!
//! UMB fixes the character format at 8 data bits, no parity and one stop
//! bit without flow control; only the baud rate is configurable. Devices
//! ship at 19200 baud.
//!
//! # Example
//!
//! ```no_run
//! use umb_transport::SerialTransport;
//! use umb_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> umb_core::Result<()> {
//! let mut transport = SerialTransport::open("/dev/ttyUSB0", 19200).await?;
//!
//! let mut buf = [0u8; 256];
//! let n = transport.receive(&mut buf, Duration::from_millis(500)).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};
use umb_core::error::{Error, Result};
use umb_core::transport::Transport;

/// Factory default baud rate of UMB devices.
pub const DEFAULT_BAUD_RATE: u32 = 19200;

/// Serial port configuration.
///
/// The character format is fixed by the protocol (8N1, no flow control),
/// so only the baud rate is exposed.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Baud rate (e.g. 9600, 19200, 57600)
    pub baud_rate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// Serial port transport for UMB devices.
pub struct SerialTransport {
    /// The underlying serial port stream
    port: Option<SerialStream>,
    /// Port name for logging/debugging
    port_name: String,
}

impl SerialTransport {
    /// Open a serial port at the given baud rate.
    ///
    /// # Arguments
    ///
    /// * `port` - Serial port path (e.g., "/dev/ttyUSB0" on Linux, "COM3" on Windows)
    /// * `baud_rate` - Baud rate (UMB default is 19200)
    pub async fn open(port: &str, baud_rate: u32) -> Result<Self> {
        Self::open_with_config(port, SerialConfig { baud_rate }).await
    }

    /// Open a serial port with an explicit configuration.
    pub async fn open_with_config(port: &str, config: SerialConfig) -> Result<Self> {
        tracing::debug!(port = %port, baud_rate = config.baud_rate, "Opening serial port");

        let serial_stream = tokio_serial::new(port, config.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .stop_bits(tokio_serial::StopBits::One)
            .parity(tokio_serial::Parity::None)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| {
                tracing::error!(port = %port, error = %e, "Failed to open serial port");
                Error::Transport(format!("Failed to open serial port {}: {}", port, e))
            })?;

        tracing::info!(port = %port, baud_rate = config.baud_rate, "Serial port opened successfully");

        Ok(Self {
            port: Some(serial_stream),
            port_name: port.to_string(),
        })
    }

    /// Get the name of the serial port.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!(
            port = %self.port_name,
            bytes = data.len(),
            data = ?data,
            "Sending data"
        );

        port.write_all(data).await.map_err(|e| {
            tracing::error!(port = %self.port_name, error = %e, "Failed to send data");
            map_io_error(e)
        })?;

        port.flush().await.map_err(|e| {
            tracing::error!(port = %self.port_name, error = %e, "Failed to flush serial port");
            Error::Io(e)
        })?;

        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!(
            port = %self.port_name,
            buf_len = buf.len(),
            timeout_ms = timeout.as_millis(),
            "Waiting for data"
        );

        match tokio::time::timeout(timeout, port.read(buf)).await {
            Ok(Ok(n)) => {
                tracing::trace!(
                    port = %self.port_name,
                    bytes = n,
                    data = ?&buf[..n],
                    "Received data"
                );
                Ok(n)
            }
            Ok(Err(e)) => {
                tracing::error!(port = %self.port_name, error = %e, "Failed to receive data");
                Err(map_io_error(e))
            }
            Err(_) => {
                tracing::trace!(
                    port = %self.port_name,
                    timeout_ms = timeout.as_millis(),
                    "Timeout waiting for data"
                );
                Err(Error::Timeout)
            }
        }
    }

    async fn discard_input(&mut self) -> Result<usize> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;
        // Other stations on the bus, or a reply that came too late.
        let waiting = port.bytes_to_read().unwrap_or(0) as usize;
        if let Err(e) = port.clear(ClearBuffer::Input) {
            tracing::warn!(port = %self.port_name, error = %e, "Failed to clear input buffer");
            return Ok(0);
        }
        if waiting > 0 {
            tracing::debug!(port = %self.port_name, bytes = waiting, "Dropped late bytes");
        }
        Ok(waiting)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            tracing::debug!(port = %self.port_name, "Closing serial port");

            if let Err(e) = port.flush().await {
                tracing::warn!(
                    port = %self.port_name,
                    error = %e,
                    "Failed to flush before closing (continuing anyway)"
                );
            }

            tracing::info!(port = %self.port_name, "Serial port closed");
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        if self.port.is_some() {
            tracing::debug!(port = %self.port_name, "SerialTransport dropped, closing port");
        }
    }
}

fn map_io_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::NotConnected => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}

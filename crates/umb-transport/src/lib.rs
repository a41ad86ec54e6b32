//! Transport implementations for UMB devices.
//!
//! This crate provides concrete implementations of the [`Transport`](umb_core::Transport)
//! trait from `umb-core`:
//!
//! - [`TcpTransport`]: LAN connections, either to a device with a built-in
//!   Ethernet interface or to an RS485-to-Ethernet converter (port 52015)
//! - [`SerialTransport`]: RS485 buses attached through a USB dongle
//!
//! # Example
//!
//! ```no_run
//! use umb_transport::TcpTransport;
//! use umb_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> umb_core::Result<()> {
//! let mut transport = TcpTransport::connect("10.0.1.26:52015").await?;
//!
//! // Status request to weather station 1
//! transport
//!     .send(&[0x01, 0x10, 0x01, 0x70, 0x01, 0xF0, 0x02, 0x02, 0x26, 0x10, 0x03, 0x0C, 0xB0, 0x04])
//!     .await?;
//!
//! let mut buf = [0u8; 256];
//! let n = transport.receive(&mut buf, Duration::from_millis(500)).await?;
//! # Ok(())
//! # }
//! ```

pub mod serial;
pub mod tcp;

pub use serial::{SerialConfig, SerialTransport, DEFAULT_BAUD_RATE};
pub use tcp::{TcpTransport, DEFAULT_PORT};

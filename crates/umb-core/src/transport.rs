//! Transport trait for device communication.
//!
//! The [`Transport`] trait abstracts over the byte-level link to a UMB
//! device: a TCP socket to a LAN converter or a serial port on an RS485
//! bus. The protocol engine in `umb-protocol` operates on a `Transport`
//! rather than on a socket directly, so the same request logic runs against
//! real hardware and against `MockTransport` from `umb-test-harness`.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to a UMB device.
///
/// Implementations move raw bytes only. Frame boundaries, checksums and
/// addressing are handled by the protocol engine.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the device.
    ///
    /// Implementations should not return until all bytes have been handed
    /// to the underlying link (serial TX buffer, TCP socket).
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive up to `buf.len()` bytes from the device.
    ///
    /// Returns the number of bytes actually read. Waits at most `timeout`
    /// for data to arrive and returns [`Error::Timeout`](crate::error::Error::Timeout)
    /// if nothing was received within the deadline.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Drop bytes that have already arrived but were never read.
    ///
    /// Called before each request is sent, so a late answer to an earlier
    /// request is not mistaken for the reply to this one. Returns the number
    /// of bytes dropped when the link can tell; the default drops nothing.
    async fn discard_input(&mut self) -> Result<usize> {
        Ok(0)
    }

    /// Close the connection.
    ///
    /// After `close()`, subsequent `send()` and `receive()` calls return
    /// [`Error::NotConnected`](crate::error::Error::NotConnected). Closing
    /// twice is a no-op.
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}

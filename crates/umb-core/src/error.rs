//! Error types for the UMB client.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport failures, wire corruption,
//! payload decode problems, and device-reported failures are all captured
//! here as distinct, inspectable variants.

use crate::status::StatusCode;

/// The error type for all UMB operations.
///
/// Framing variants ([`Truncated`](Error::Truncated),
/// [`MalformedFrame`](Error::MalformedFrame),
/// [`ChecksumMismatch`](Error::ChecksumMismatch)) are transient: the client
/// retries them like a timeout. Everything else is surfaced to the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (serial port, TCP socket).
    #[error("transport error: {0}")]
    Transport(String),

    /// The command arguments cannot be represented on the wire.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Fewer bytes are available than the frame header declares.
    #[error("truncated frame: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    /// Frame markers are missing or the frame structure is inconsistent.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The received checksum does not match the one computed over the frame.
    #[error("checksum mismatch: expected 0x{expected:04X}, received 0x{received:04X}")]
    ChecksumMismatch { expected: u16, received: u16 },

    /// No valid matching response arrived within the retry budget.
    ///
    /// This typically indicates the device is powered off, the baud rate is
    /// wrong, or the device address is incorrect.
    #[error("timeout waiting for response")]
    Timeout,

    /// A structurally valid frame carried a payload that cannot be interpreted.
    #[error("decode error: {0}")]
    Decode(String),

    /// The device answered with a non-zero command status.
    #[error("device reported status 0x{:02X}: {}", .0.code(), .0.description())]
    DeviceStatus(StatusCode),

    /// No session is open.
    #[error("not connected")]
    NotConnected,

    /// The connection to the device was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// The request was cancelled before a response arrived.
    #[error("request cancelled")]
    Cancelled,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// `std::io::Error` is not `Clone`; the copy keeps its kind and message.
impl Clone for Error {
    fn clone(&self) -> Self {
        match self {
            Error::Transport(msg) => Error::Transport(msg.clone()),
            Error::Encoding(msg) => Error::Encoding(msg.clone()),
            Error::Truncated { needed, available } => Error::Truncated {
                needed: *needed,
                available: *available,
            },
            Error::MalformedFrame(msg) => Error::MalformedFrame(msg.clone()),
            Error::ChecksumMismatch { expected, received } => Error::ChecksumMismatch {
                expected: *expected,
                received: *received,
            },
            Error::Timeout => Error::Timeout,
            Error::Decode(msg) => Error::Decode(msg.clone()),
            Error::DeviceStatus(code) => Error::DeviceStatus(*code),
            Error::NotConnected => Error::NotConnected,
            Error::ConnectionLost => Error::ConnectionLost,
            Error::Cancelled => Error::Cancelled,
            Error::Io(e) => Error::Io(std::io::Error::new(e.kind(), e.to_string())),
        }
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

//! UMB protocol engine.
//!
//! This crate implements the binary UMB (Universal Measurement Bus)
//! request/response protocol spoken by Lufft weather stations and other
//! environmental sensors. It provides:
//!
//! - **Frame codec** ([`frame`]) -- encode and validate UMB frames and the
//!   CRC-16 that protects them.
//! - **Command builders** ([`commands`]) -- command codes, request payloads,
//!   and reply correlation.
//! - **Payload decoder** ([`payload`]) -- typed channel values, sentinel
//!   detection, device status, device clock, and device information.
//! - **Session** ([`io`]) -- one exchange at a time over a
//!   [`Transport`](umb_core::Transport), with timeout and retry handling.
//! - **UmbClient** ([`client`]) -- the query API.
//! - **UmbBuilder** ([`builder`]) -- endpoint, addressing, and retry policy.
//! - **Reply builders** ([`reply`]) -- the device side, for simulators and
//!   tests.
//!
//! # Example
//!
//! ```
//! use umb_core::{Address, Command};
//! use umb_protocol::commands::build_request;
//! use umb_protocol::frame::{decode_frame, encode_frame};
//!
//! // Online data request for channel 100 (temperature) to station 0x7001
//! let request = build_request(&Command::OnlineData { channel: 100 }, Address::default()).unwrap();
//! let bytes = encode_frame(&request).unwrap();
//! assert_eq!(
//!     bytes,
//!     vec![0x01, 0x10, 0x01, 0x70, 0x01, 0xF0, 0x04, 0x02, 0x23, 0x10, 0x64, 0x00, 0x03, 0x61, 0xD9, 0x04]
//! );
//!
//! let (frame, consumed) = decode_frame(&bytes).unwrap();
//! assert_eq!(consumed, bytes.len());
//! assert_eq!(frame, request);
//! ```

pub mod builder;
pub mod client;
pub mod commands;
pub mod frame;
pub mod io;
pub mod payload;
pub mod reply;

pub use builder::{Endpoint, UmbBuilder};
pub use client::{ClientConfig, UmbClient};
pub use io::ExchangeState;

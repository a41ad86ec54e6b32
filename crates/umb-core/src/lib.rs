//! umb-core: Core types, status codes, and error definitions for the UMB
//! (Universal Measurement Bus) client.
//!
//! This crate defines the protocol-agnostic pieces every other crate in the
//! workspace depends on. Applications that only consume readings can depend
//! on these types without pulling in a transport.
//!
//! # Key types
//!
//! - [`Command`] -- an immutable request to a device
//! - [`Response`] / [`Value`] -- a decoded answer
//! - [`Transport`] -- byte-level communication channel
//! - [`StatusCode`] -- the UMB status table
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod status;
pub mod transport;
pub mod types;

pub use error::{Error, Result};
pub use status::StatusCode;
pub use transport::Transport;
pub use types::*;

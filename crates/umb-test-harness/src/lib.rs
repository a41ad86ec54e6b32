//! umb-test-harness: mock transports for testing the UMB client without a
//! weather station.
//!
//! [`MockTransport`] scripts request/reply pairs at the [`Transport`]
//! level for deterministic unit tests. [`MockTcpServer`] does the same
//! over a real localhost socket for end-to-end tests of the TCP transport.
//!
//! [`Transport`]: umb_core::Transport

pub mod mock_tcp;
pub mod mock_transport;

pub use mock_tcp::MockTcpServer;
pub use mock_transport::{MockTransport, SentLog};

//! Scripted TCP peer for end-to-end tests of the TCP transport.
//!
//! [`MockTcpServer`] listens on a random localhost port and plays the role
//! of a LAN-attached station: it accepts one connection, reads each expected
//! request byte-for-byte, and writes back the scripted reply.
//!
//! # Example
//!
//! ```
//! use umb_test_harness::MockTcpServer;
//!
//! # async fn example() -> umb_core::Result<()> {
//! let mut server = MockTcpServer::new().await?;
//! server.expect(&[0x01, 0x10], &[0x01, 0x10]);
//! let addr = server.addr().to_string();
//! server.start();
//! // ... connect a TcpTransport to `addr` and exchange frames ...
//! server.wait().await.expect("all expectations met");
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use umb_core::error::{Error, Result};

#[derive(Debug, Clone)]
struct TcpExpectation {
    request: Vec<u8>,
    /// Written back after the request; empty means stay silent.
    response: Vec<u8>,
}

/// A single-connection scripted TCP peer.
pub struct MockTcpServer {
    listener: Option<TcpListener>,
    addr: String,
    expectations: VecDeque<TcpExpectation>,
    handle: Option<JoinHandle<std::result::Result<(), String>>>,
}

impl MockTcpServer {
    /// Bind a listener on `127.0.0.1` with an OS-assigned port.
    ///
    /// Connections queue in the backlog until [`start`](Self::start) is
    /// called, so expectations can be loaded after binding.
    pub async fn new() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock TCP server: {e}")))?;
        let addr = listener.local_addr()?.to_string();

        Ok(Self {
            listener: Some(listener),
            addr,
            expectations: VecDeque::new(),
            handle: None,
        })
    }

    /// Expect `request` and answer it with `response`.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.expectations.push_back(TcpExpectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Expect `request` and leave it unanswered.
    pub fn expect_silence(&mut self, request: &[u8]) {
        self.expect(request, &[]);
    }

    /// The `host:port` the server listens on.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Accept one client and play the script in a background task.
    ///
    /// After the last expectation the server keeps the connection open
    /// until the client closes it.
    pub fn start(&mut self) {
        let Some(listener) = self.listener.take() else {
            tracing::warn!(addr = %self.addr, "MockTcpServer already started");
            return;
        };
        let expectations: Vec<TcpExpectation> = self.expectations.drain(..).collect();

        self.handle = Some(tokio::spawn(async move {
            let (mut stream, peer) = listener
                .accept()
                .await
                .map_err(|e| format!("failed to accept connection: {e}"))?;
            tracing::debug!(%peer, "MockTcpServer accepted connection");

            for (i, expectation) in expectations.iter().enumerate() {
                play(&mut stream, i, expectation).await?;
            }

            // Hold the line until the client hangs up.
            let mut sink = [0u8; 64];
            while matches!(stream.read(&mut sink).await, Ok(n) if n > 0) {}
            Ok(())
        }));
    }

    /// Wait for the script to finish and report the first mismatch.
    pub async fn wait(self) -> std::result::Result<(), String> {
        match self.handle {
            Some(handle) => handle
                .await
                .map_err(|e| format!("server task panicked: {e}"))?,
            None => Ok(()),
        }
    }
}

async fn play(
    stream: &mut TcpStream,
    index: usize,
    expectation: &TcpExpectation,
) -> std::result::Result<(), String> {
    let mut buf = vec![0u8; expectation.request.len()];
    stream
        .read_exact(&mut buf)
        .await
        .map_err(|e| format!("expectation {index}: read error: {e}"))?;

    if buf != expectation.request {
        return Err(format!(
            "expectation {index}: request mismatch: expected {:02X?}, got {buf:02X?}",
            expectation.request
        ));
    }

    if !expectation.response.is_empty() {
        stream
            .write_all(&expectation.response)
            .await
            .map_err(|e| format!("expectation {index}: write error: {e}"))?;
        stream
            .flush()
            .await
            .map_err(|e| format!("expectation {index}: flush error: {e}"))?;
    }
    Ok(())
}

//! Scripted transport for deterministic tests of the UMB exchange logic.
//!
//! [`MockTransport`] implements [`Transport`] from a queue of expectations.
//! Each `send()` must match the next expected request exactly; the reply
//! scripted for it is then handed out by subsequent `receive()` calls, one
//! chunk per call. An empty script makes `receive()` time out, which is how
//! tests model a silent device. Chunks left unread stay queued ahead of the
//! next reply until `discard_input()` drops them, as on a real link.
//!
//! # Example
//!
//! ```
//! use umb_test_harness::MockTransport;
//!
//! const STATUS_REQUEST: [u8; 14] = [
//!     0x01, 0x10, 0x01, 0x70, 0x01, 0xF0, 0x02, 0x02, 0x26, 0x10, 0x03, 0x0C, 0xB0, 0x04,
//! ];
//!
//! let mut mock = MockTransport::new();
//! // First attempt goes unanswered, the resend gets a reply.
//! mock.expect_timeout(&STATUS_REQUEST);
//! mock.expect(&STATUS_REQUEST, &[0x01, 0x10]);
//! let log = mock.sent_log();
//! assert_eq!(log.len(), 0);
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use umb_core::error::{Error, Result};
use umb_core::transport::Transport;

/// What `receive()` produces after a matching send.
#[derive(Debug, Clone)]
enum Script {
    /// Reply bytes, delivered one chunk per `receive()` call.
    Reply(VecDeque<Vec<u8>>),
    /// The peer drops the connection.
    ConnectionLost,
}

#[derive(Debug, Clone)]
struct Expectation {
    request: Vec<u8>,
    script: Script,
}

/// Shared record of every frame written to a [`MockTransport`].
///
/// The transport is usually boxed and moved into the client under test;
/// keep a `SentLog` to inspect what went over the wire afterwards.
#[derive(Debug, Clone, Default)]
pub struct SentLog(Arc<Mutex<Vec<Vec<u8>>>>);

impl SentLog {
    fn lock(&self) -> MutexGuard<'_, Vec<Vec<u8>>> {
        // A poisoned log only means another test thread panicked.
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, data: &[u8]) {
        self.lock().push(data.to_vec());
    }

    /// Every `send()` payload so far, in order.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.lock().clone()
    }

    /// Number of `send()` calls so far.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A mock [`Transport`] driven by scripted request/reply pairs.
#[derive(Debug)]
pub struct MockTransport {
    expectations: VecDeque<Expectation>,
    /// Script armed by the last matching `send()`.
    pending: Option<Script>,
    connected: bool,
    sent: SentLog,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            expectations: VecDeque::new(),
            pending: None,
            connected: true,
            sent: SentLog::default(),
        }
    }

    /// Expect `request` and answer it with `response` in a single read.
    ///
    /// An empty `response` behaves like [`expect_timeout`](Self::expect_timeout).
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        let chunks = if response.is_empty() {
            VecDeque::new()
        } else {
            VecDeque::from([response.to_vec()])
        };
        self.push(request, Script::Reply(chunks));
    }

    /// Expect `request` and answer it in several reads, one per chunk.
    pub fn expect_chunked(&mut self, request: &[u8], chunks: &[&[u8]]) {
        let chunks = chunks.iter().map(|c| c.to_vec()).collect();
        self.push(request, Script::Reply(chunks));
    }

    /// Expect `request` and leave it unanswered.
    pub fn expect_timeout(&mut self, request: &[u8]) {
        self.push(request, Script::Reply(VecDeque::new()));
    }

    /// Expect `request`, then fail the next read with [`Error::ConnectionLost`].
    pub fn expect_connection_lost(&mut self, request: &[u8]) {
        self.push(request, Script::ConnectionLost);
    }

    fn push(&mut self, request: &[u8], script: Script) {
        self.expectations.push_back(Expectation {
            request: request.to_vec(),
            script,
        });
    }

    /// A handle on the log of sent data that outlives the transport.
    pub fn sent_log(&self) -> SentLog {
        self.sent.clone()
    }

    /// Every `send()` payload so far, in order.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.sent.frames()
    }

    /// Number of expectations not yet consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.expectations.len()
    }

    /// Force the connected state. While disconnected every call fails
    /// with [`Error::NotConnected`].
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        self.sent.push(data);

        let expectation = self.expectations.pop_front().ok_or_else(|| {
            Error::Transport(format!("unexpected send, no expectations left: {data:02X?}"))
        })?;
        if data != expectation.request.as_slice() {
            return Err(Error::Transport(format!(
                "unexpected send data: expected {:02X?}, got {:02X?}",
                expectation.request, data
            )));
        }

        tracing::trace!(bytes = data.len(), "MockTransport matched expectation");
        self.pending = Some(match (self.pending.take(), expectation.script) {
            (Some(Script::Reply(unread)), Script::Reply(chunks)) => {
                Script::Reply(unread.into_iter().chain(chunks).collect())
            }
            (_, script) => script,
        });
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        match self.pending.as_mut() {
            Some(Script::Reply(chunks)) => {
                let Some(chunk) = chunks.front_mut() else {
                    self.pending = None;
                    return Err(Error::Timeout);
                };
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                chunk.drain(..n);
                if chunk.is_empty() {
                    chunks.pop_front();
                }
                Ok(n)
            }
            Some(Script::ConnectionLost) => {
                self.pending = None;
                self.connected = false;
                Err(Error::ConnectionLost)
            }
            None => Err(Error::Timeout),
        }
    }

    async fn discard_input(&mut self) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        let Some(Script::Reply(chunks)) = self.pending.as_mut() else {
            return Ok(0);
        };
        let dropped = chunks.iter().map(Vec::len).sum();
        chunks.clear();
        Ok(dropped)
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        self.pending = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

//! Request/response exchange over an open transport.
//!
//! A [`Session`] owns the transport for the lifetime of one connection and
//! runs exactly one exchange at a time: encode, send, collect bytes until a
//! matching reply frame arrives, and retry on timeouts or wire corruption.
//! Payload decoding is left to the caller so that decode failures on a
//! structurally valid reply are never retried.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use umb_core::error::{Error, Result};
use umb_core::transport::Transport;
use umb_core::{Address, Command};

use crate::commands::{build_request, is_reply_to};
use crate::frame::{self, Frame};

/// Read chunk size; comfortably larger than the biggest UMB frame.
const RECV_CHUNK: usize = 512;

/// Where the current (or last) exchange stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// No request outstanding.
    Idle,
    /// Writing the request frame.
    Sending,
    /// Waiting for a matching reply within the timeout.
    AwaitingResponse,
    /// A matching reply arrived and is being decoded.
    Decoding,
    /// The previous attempt failed transiently; the frame will be resent.
    Retrying,
    /// The last exchange ended in an error.
    Failed,
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExchangeState::Idle => "idle",
            ExchangeState::Sending => "sending",
            ExchangeState::AwaitingResponse => "awaiting response",
            ExchangeState::Decoding => "decoding",
            ExchangeState::Retrying => "retrying",
            ExchangeState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// An open connection to one UMB device.
pub struct Session {
    transport: Box<dyn Transport>,
    device: Address,
    state: ExchangeState,
    /// Frames written to the transport, retries included.
    requests_sent: u64,
}

impl Session {
    pub fn new(transport: Box<dyn Transport>, device: Address) -> Self {
        Self {
            transport,
            device,
            state: ExchangeState::Idle,
            requests_sent: 0,
        }
    }

    pub fn device(&self) -> Address {
        self.device
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    pub fn requests_sent(&self) -> u64 {
        self.requests_sent
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Record the outcome of decoding the reply returned by [`exchange`](Self::exchange).
    pub fn finish<T>(&mut self, outcome: &Result<T>) {
        self.state = if outcome.is_ok() {
            ExchangeState::Idle
        } else {
            ExchangeState::Failed
        };
    }

    /// Close the transport and give it back.
    pub async fn close(mut self) -> Result<Box<dyn Transport>> {
        debug!(device = %self.device, requests = self.requests_sent, "Closing UMB session");
        self.transport.close().await?;
        Ok(self.transport)
    }

    /// Send `command` and wait for the matching reply frame.
    ///
    /// Each attempt waits up to `timeout` for a valid frame answering the
    /// request; corrupted bytes and frames that answer something else are
    /// skipped within that budget. An attempt that ends without one is
    /// retried immediately by resending the identical frame, up to
    /// `max_retries` times, after which the exchange fails with
    /// [`Error::Timeout`]. Cancellation is checked before every attempt, so
    /// an attempt in progress always runs to its timeout.
    ///
    /// On success the state is left at [`ExchangeState::Decoding`]; call
    /// [`finish`](Self::finish) with the decode result.
    pub async fn exchange(
        &mut self,
        command: &Command,
        timeout: Duration,
        max_retries: u32,
        cancel: &CancellationToken,
    ) -> Result<Frame> {
        let request = match build_request(command, self.device) {
            Ok(request) => request,
            Err(e) => return Err(self.fail(e)),
        };
        let bytes = match frame::encode_frame(&request) {
            Ok(bytes) => bytes,
            Err(e) => return Err(self.fail(e)),
        };

        for attempt in 0..=max_retries {
            if cancel.is_cancelled() {
                debug!(%command, attempt, "Exchange cancelled");
                return Err(self.fail(Error::Cancelled));
            }
            if attempt > 0 {
                self.state = ExchangeState::Retrying;
                debug!(%command, attempt, max_retries, "Resending UMB request");
            }

            self.state = ExchangeState::Sending;
            match self.transport.discard_input().await {
                Ok(0) => {}
                Ok(dropped) => debug!(%command, dropped, "Dropped unread input before request"),
                Err(e) => return Err(self.fail(e)),
            }
            self.requests_sent += 1;
            trace!(%command, device = %self.device, data = ?bytes, "Sending UMB request");
            if let Err(e) = self.transport.send(&bytes).await {
                return Err(self.fail(e));
            }

            self.state = ExchangeState::AwaitingResponse;
            match self.await_reply(&request, timeout).await {
                Ok(reply) => {
                    self.state = ExchangeState::Decoding;
                    return Ok(reply);
                }
                Err(Error::Timeout) => {
                    debug!(%command, attempt, timeout_ms = timeout.as_millis(), "No valid reply");
                }
                Err(e) => return Err(self.fail(e)),
            }
        }

        debug!(%command, retries = max_retries, "Retries exhausted");
        Err(self.fail(Error::Timeout))
    }

    fn fail(&mut self, e: Error) -> Error {
        self.state = ExchangeState::Failed;
        e
    }

    /// Collect bytes until a frame answering `request` arrives or the
    /// deadline passes.
    ///
    /// A start byte that does not begin a valid frame (line noise, or the
    /// tail of a reply that arrived after its timeout) is skipped and the
    /// buffer rescanned from the next start byte. Only the deadline ends the
    /// attempt.
    async fn await_reply(&mut self, request: &Frame, timeout: Duration) -> Result<Frame> {
        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; RECV_CHUNK];
        let mut pending = Vec::new();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout);
            }

            let n = match self.transport.receive(&mut buf, remaining).await {
                Ok(n) => n,
                Err(Error::Timeout) => {
                    if !pending.is_empty() {
                        debug!(buffered = pending.len(), "Timed out inside a partial frame");
                    }
                    return Err(Error::Timeout);
                }
                Err(e) => return Err(e),
            };
            pending.extend_from_slice(&buf[..n]);

            while let Some(reply) = next_frame(&mut pending) {
                if is_reply_to(&reply, request) {
                    return Ok(reply);
                }
                warn!(
                    cmd = reply.cmd,
                    from = %reply.from,
                    to = %reply.to,
                    "Discarding frame that does not answer the outstanding request"
                );
            }
        }
    }
}

/// Take the next valid frame out of `pending`.
///
/// Returns `None` once the buffer holds nothing but an incomplete frame
/// (kept for the next read) or no start byte at all (cleared).
fn next_frame(pending: &mut Vec<u8>) -> Option<Frame> {
    loop {
        match frame::find_start(pending) {
            None => {
                if !pending.is_empty() {
                    trace!(bytes = pending.len(), "Dropping bytes without start of frame");
                    pending.clear();
                }
                return None;
            }
            Some(0) => {}
            Some(start) => {
                trace!(bytes = start, "Dropping bytes before start of frame");
                pending.drain(..start);
            }
        }

        match frame::decode_frame(pending) {
            Ok((reply, consumed)) => {
                pending.drain(..consumed);
                return Some(reply);
            }
            Err(Error::Truncated { .. }) => match later_frame_start(pending) {
                // The incomplete frame in front cannot be the one behind it.
                Some(skip) => {
                    debug!(bytes = skip, "Skipping incomplete frame ahead of a complete one");
                    pending.drain(..skip);
                }
                None => return None,
            },
            Err(e) => {
                debug!(error = %e, "Skipping start byte that does not begin a valid frame");
                pending.drain(..1);
            }
        }
    }
}

/// Offset of the first start byte after the head of `pending` that begins
/// a complete, valid frame.
fn later_frame_start(pending: &[u8]) -> Option<usize> {
    (1..pending.len())
        .filter(|&i| pending[i] == frame::SOH)
        .find(|&i| frame::decode_frame(&pending[i..]).is_ok())
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("device", &self.device)
            .field("state", &self.state)
            .field("requests_sent", &self.requests_sent)
            .field("connected", &self.transport.is_connected())
            .finish()
    }
}

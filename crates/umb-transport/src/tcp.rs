//! TCP transport for LAN-attached UMB devices.
//!
//! Stations with a built-in LAN interface and RS485-to-Ethernet converters
//! both pass raw UMB frames over a plain TCP stream, on port 52015 unless
//! reconfigured. UMB frames carry no line terminator, so a single
//! `receive()` may return part of a frame; reassembly is the protocol
//! engine's job.
//!
//! A converter forwards whatever the bus produces. A station that answers
//! after the client gave up leaves its reply in the socket, which
//! [`discard_input`](Transport::discard_input) drops before the next request.

use std::io::ErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use umb_core::error::{Error, Result};
use umb_core::transport::Transport;

/// Default UMB TCP port.
pub const DEFAULT_PORT: u16 = 52015;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Scratch size for dropping late bytes; larger than any UMB frame.
const DISCARD_CHUNK: usize = 512;

/// TCP link to one UMB station or converter.
#[derive(Debug)]
pub struct TcpTransport {
    /// `None` once closed or once the peer hung up.
    stream: Option<TcpStream>,
    addr: String,
}

impl TcpTransport {
    /// Connect to `host[:port]`; a bare host uses [`DEFAULT_PORT`].
    pub async fn connect(addr: &str) -> Result<Self> {
        Self::connect_with_timeout(addr, DEFAULT_CONNECT_TIMEOUT).await
    }

    pub async fn connect_with_timeout(addr: &str, timeout: Duration) -> Result<Self> {
        let addr = with_default_port(addr);
        tracing::debug!(%addr, timeout_ms = timeout.as_millis(), "Connecting to UMB station");

        let stream = match tokio::time::timeout(timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                tracing::error!(%addr, error = %e, "UMB station unreachable");
                return Err(connect_error(e, &addr));
            }
            Err(_) => {
                tracing::error!(%addr, "Timed out connecting to UMB station");
                return Err(Error::Timeout);
            }
        };

        // One small frame per request, each waiting for its answer.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(%addr, error = %e, "Could not disable Nagle's algorithm");
        }
        tracing::info!(%addr, "Connected to UMB station");

        Ok(Self::from_stream(stream, addr))
    }

    /// Wrap an already-connected stream.
    pub fn from_stream(stream: TcpStream, addr: String) -> Self {
        Self {
            stream: Some(stream),
            addr,
        }
    }

    /// The `host:port` this transport talks to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn stream(&mut self) -> Result<&mut TcpStream> {
        self.stream.as_mut().ok_or(Error::NotConnected)
    }

    /// The peer hung up: forget the stream so the link reads as down.
    fn lost(&mut self) -> Error {
        tracing::warn!(addr = %self.addr, "UMB station closed the connection");
        self.stream = None;
        Error::ConnectionLost
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let addr = self.addr.clone();
        let stream = self.stream()?;
        tracing::trace!(%addr, data = ?data, "Sending frame");

        let written = match stream.write_all(data).await {
            Ok(()) => stream.flush().await,
            Err(e) => Err(e),
        };
        written.map_err(|e| {
            tracing::error!(%addr, error = %e, "Failed to send frame");
            io_error(e)
        })
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let stream = self.stream()?;
        match tokio::time::timeout(timeout, stream.read(buf)).await {
            Ok(Ok(0)) => Err(self.lost()),
            Ok(Ok(n)) => {
                tracing::trace!(addr = %self.addr, data = ?&buf[..n], "Received bytes");
                Ok(n)
            }
            Ok(Err(e)) => {
                tracing::error!(addr = %self.addr, error = %e, "Failed to receive");
                Err(io_error(e))
            }
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn discard_input(&mut self) -> Result<usize> {
        let stream = self.stream()?;
        let mut scratch = [0u8; DISCARD_CHUNK];
        let mut dropped = 0;
        loop {
            match stream.try_read(&mut scratch) {
                Ok(0) => return Err(self.lost()),
                Ok(n) => dropped += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => return Err(io_error(e)),
            }
        }
        if dropped > 0 {
            tracing::debug!(addr = %self.addr, bytes = dropped, "Dropped late bytes");
        }
        Ok(dropped)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                tracing::debug!(addr = %self.addr, error = %e, "Shutdown failed; dropping stream");
            }
            tracing::info!(addr = %self.addr, "Disconnected from UMB station");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

/// Append [`DEFAULT_PORT`] to an address that does not name a port.
fn with_default_port(addr: &str) -> String {
    let has_port = match addr.rsplit_once(':') {
        // Bracketed IPv6 literal: "[::1]:52015" has a port, "[::1]" does not.
        Some((host, port)) if host.ends_with(']') || !host.contains(':') => {
            port.parse::<u16>().is_ok()
        }
        _ => false,
    };
    if has_port {
        addr.to_string()
    } else {
        format!("{addr}:{DEFAULT_PORT}")
    }
}

fn connect_error(e: std::io::Error, addr: &str) -> Error {
    match e.kind() {
        ErrorKind::ConnectionRefused => {
            Error::Transport(format!("no UMB station listening on {addr} (connection refused)"))
        }
        ErrorKind::TimedOut => Error::Timeout,
        _ => Error::Io(e),
    }
}

fn io_error(e: std::io::Error) -> Error {
    match e.kind() {
        ErrorKind::ConnectionReset
        | ErrorKind::BrokenPipe
        | ErrorKind::NotConnected
        | ErrorKind::ConnectionAborted => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    const STATUS_REQUEST: [u8; 14] = [
        0x01, 0x10, 0x01, 0x70, 0x01, 0xF0, 0x02, 0x02, 0x26, 0x10, 0x03, 0x0C, 0xB0, 0x04,
    ];

    const STATUS_REPLY: [u8; 16] = [
        0x01, 0x10, 0x01, 0xF0, 0x01, 0x70, 0x04, 0x02, 0x26, 0x10, 0x00, 0x00, 0x03, 0x0D, 0xF0,
        0x04,
    ];

    async fn test_listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    #[test]
    fn default_port_is_appended() {
        assert_eq!(with_default_port("10.0.1.26"), "10.0.1.26:52015");
        assert_eq!(with_default_port("10.0.1.26:4000"), "10.0.1.26:4000");
        assert_eq!(with_default_port("station.local"), "station.local:52015");
        assert_eq!(with_default_port("[::1]:4000"), "[::1]:4000");
        assert_eq!(with_default_port("[::1]"), "[::1]:52015");
    }

    #[test]
    fn reset_and_broken_pipe_are_connection_lost() {
        for kind in [ErrorKind::ConnectionReset, ErrorKind::BrokenPipe] {
            assert!(matches!(io_error(kind.into()), Error::ConnectionLost));
        }
        assert!(matches!(io_error(ErrorKind::Other.into()), Error::Io(_)));
    }

    #[tokio::test]
    async fn request_and_reply_through_socket() {
        let (listener, addr) = test_listener().await;
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; STATUS_REQUEST.len()];
            stream.read_exact(&mut buf).await.unwrap();
            assert_eq!(buf, STATUS_REQUEST);
            stream.write_all(&STATUS_REPLY).await.unwrap();
        });

        let mut transport = TcpTransport::connect(&addr).await.unwrap();
        assert!(transport.is_connected());
        assert_eq!(transport.addr(), addr);

        transport.send(&STATUS_REQUEST).await.unwrap();
        let mut buf = [0u8; 64];
        let mut got = Vec::new();
        while got.len() < STATUS_REPLY.len() {
            let n = transport
                .receive(&mut buf, Duration::from_secs(2))
                .await
                .unwrap();
            got.extend_from_slice(&buf[..n]);
        }
        assert_eq!(got, STATUS_REPLY);

        transport.close().await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn late_reply_is_discarded_before_next_request() {
        let (listener, addr) = test_listener().await;
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            // Answer nobody is waiting for any more.
            stream.write_all(&STATUS_REPLY).await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut transport = TcpTransport::connect(&addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(transport.discard_input().await.unwrap(), STATUS_REPLY.len());
        assert_eq!(transport.discard_input().await.unwrap(), 0);

        let mut buf = [0u8; 64];
        let result = transport.receive(&mut buf, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(Error::Timeout)));

        transport.close().await.unwrap();
        server.abort();
    }

    #[tokio::test]
    async fn connect_refused_names_the_station() {
        let (listener, addr) = test_listener().await;
        drop(listener);

        match TcpTransport::connect(&addr).await {
            Err(Error::Transport(msg)) => {
                assert!(msg.contains("connection refused"), "{msg}");
                assert!(msg.contains(&addr), "{msg}");
            }
            other => panic!("expected Transport error, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn receive_timeout() {
        let (listener, addr) = test_listener().await;
        let server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut transport = TcpTransport::connect(&addr).await.unwrap();
        let mut buf = [0u8; 64];
        let result = transport.receive(&mut buf, Duration::from_millis(100)).await;
        assert!(matches!(result, Err(Error::Timeout)));
        assert!(transport.is_connected());

        transport.close().await.unwrap();
        server.abort();
    }

    #[tokio::test]
    async fn peer_close_marks_link_down() {
        let (listener, addr) = test_listener().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let mut transport = TcpTransport::connect(&addr).await.unwrap();
        server.await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut buf = [0u8; 64];
        let result = transport.receive(&mut buf, Duration::from_secs(2)).await;
        assert!(matches!(result, Err(Error::ConnectionLost)), "{result:?}");
        assert!(!transport.is_connected());
        assert!(matches!(
            transport.send(&STATUS_REQUEST).await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn closed_transport_is_not_connected() {
        let (listener, addr) = test_listener().await;
        let server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut transport = TcpTransport::connect(&addr).await.unwrap();
        transport.close().await.unwrap();
        assert!(!transport.is_connected());

        assert!(matches!(
            transport.send(&STATUS_REQUEST).await,
            Err(Error::NotConnected)
        ));
        assert!(matches!(
            transport.discard_input().await,
            Err(Error::NotConnected)
        ));

        // Closing again is a no-op.
        transport.close().await.unwrap();
        server.abort();
    }
}

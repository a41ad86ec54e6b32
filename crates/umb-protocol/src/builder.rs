//! UmbBuilder -- fluent builder for [`UmbClient`] instances.
//!
//! Separates configuration from construction so that callers can choose
//! the endpoint, the station address on the bus, and the timeout and retry
//! policy before any connection is opened.
//!
//! # Example
//!
//! ```no_run
//! use umb_protocol::UmbBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> umb_core::Result<()> {
//! let mut client = UmbBuilder::new()
//!     .tcp("192.168.1.50")
//!     .device_id(1)
//!     .command_timeout(Duration::from_millis(800))
//!     .connect()
//!     .await?;
//! let temperature = client.query_one(100).await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::time::Duration;

use umb_core::error::{Error, Result};
use umb_core::transport::Transport;
use umb_core::types::Address;
use umb_transport::{DEFAULT_BAUD_RATE, SerialConfig, SerialTransport, TcpTransport};

use crate::client::{ClientConfig, UmbClient};

/// Where a device is reached.
#[derive(Debug, Clone)]
pub enum Endpoint {
    /// LAN interface or RS485-to-Ethernet converter, `host[:port]`.
    Tcp { addr: String },
    /// RS485 bus on a local serial port.
    Serial { path: String, config: SerialConfig },
}

impl Endpoint {
    /// Open a transport to this endpoint.
    pub async fn open(&self, connect_timeout: Duration) -> Result<Box<dyn Transport>> {
        match self {
            Endpoint::Tcp { addr } => Ok(Box::new(
                TcpTransport::connect_with_timeout(addr, connect_timeout).await?,
            )),
            Endpoint::Serial { path, config } => Ok(Box::new(
                SerialTransport::open_with_config(path, config.clone()).await?,
            )),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { addr } => write!(f, "tcp://{addr}"),
            Endpoint::Serial { path, config } => write!(f, "{path}@{}", config.baud_rate),
        }
    }
}

/// Fluent builder for [`UmbClient`].
///
/// Defaults: weather station id 1 (`0x7001`), 500 ms per attempt, 3
/// retries, 5 s to connect, 19200 baud on serial ports.
#[derive(Debug, Clone)]
pub struct UmbBuilder {
    host: Option<String>,
    serial_port: Option<String>,
    baud_rate: u32,
    device_class: u8,
    device_id: u16,
    device_address: Option<Address>,
    command_timeout: Duration,
    max_retries: u32,
    connect_timeout: Duration,
}

impl UmbBuilder {
    pub fn new() -> Self {
        UmbBuilder {
            host: None,
            serial_port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            device_class: Address::CLASS_WEATHER_STATION,
            device_id: 1,
            device_address: None,
            command_timeout: Duration::from_millis(500),
            max_retries: 3,
            connect_timeout: Duration::from_secs(5),
        }
    }

    /// Reach the device over TCP. A bare host uses port 52015.
    pub fn tcp(mut self, host: &str) -> Self {
        self.host = Some(host.to_string());
        self
    }

    /// Reach the device on a serial port (e.g. `/dev/ttyUSB0` or `COM3`).
    pub fn serial_port(mut self, port: &str) -> Self {
        self.serial_port = Some(port.to_string());
        self
    }

    /// Serial baud rate (default: 19200). Ignored for TCP.
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.baud_rate = baud;
        self
    }

    /// Device id of the station on the bus (default: 1).
    pub fn device_id(mut self, id: u16) -> Self {
        self.device_id = id;
        self
    }

    /// Device class of the station (default: 7, compact weather station).
    pub fn device_class(mut self, class: u8) -> Self {
        self.device_class = class;
        self
    }

    /// Full station address; overrides [`device_class`](Self::device_class)
    /// and [`device_id`](Self::device_id).
    pub fn device_address(mut self, address: Address) -> Self {
        self.device_address = Some(address);
        self
    }

    /// Time to wait for a reply to one attempt (default: 500ms).
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Resends after a timeout or corrupted reply (default: 3).
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Time allowed to establish a TCP connection (default: 5s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn config(&self) -> Result<ClientConfig> {
        let device = match self.device_address {
            Some(address) => address,
            None => Address::new(self.device_class, self.device_id)?,
        };
        Ok(ClientConfig {
            device,
            command_timeout: self.command_timeout,
            max_retries: self.max_retries,
            connect_timeout: self.connect_timeout,
        })
    }

    fn endpoint(&self) -> Result<Endpoint> {
        match (&self.host, &self.serial_port) {
            (Some(host), None) => Ok(Endpoint::Tcp { addr: host.clone() }),
            (None, Some(path)) => Ok(Endpoint::Serial {
                path: path.clone(),
                config: SerialConfig {
                    baud_rate: self.baud_rate,
                },
            }),
            (Some(_), Some(_)) => Err(Error::Transport(
                "both a TCP host and a serial port were configured".into(),
            )),
            (None, None) => Err(Error::Transport("no endpoint configured".into())),
        }
    }

    /// Build a disconnected client; call [`UmbClient::connect`] to open it.
    pub fn build(self) -> Result<UmbClient> {
        let config = self.config()?;
        let endpoint = self.endpoint()?;
        Ok(UmbClient::new(Some(endpoint), config))
    }

    /// Build a client and open its connection.
    pub async fn connect(self) -> Result<UmbClient> {
        let mut client = self.build()?;
        client.connect().await?;
        Ok(client)
    }

    /// Build a connected client around a caller-provided transport.
    ///
    /// This is the entry point for tests (pass a `MockTransport` from
    /// `umb-test-harness`) and for callers that manage the transport
    /// themselves. Endpoint settings are ignored; such a client cannot
    /// reconnect after [`UmbClient::disconnect`].
    pub fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<UmbClient> {
        let config = self.config()?;
        Ok(UmbClient::with_transport(transport, config))
    }
}

impl Default for UmbBuilder {
    fn default() -> Self {
        Self::new()
    }
}

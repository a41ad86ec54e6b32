//! # umb -- Async client for UMB weather stations
//!
//! `umb` talks to Lufft weather stations and other environmental sensors
//! over the binary UMB (Universal Measurement Bus) protocol, either through
//! a LAN interface / RS485-to-Ethernet converter or directly on an RS485
//! bus. It is meant for data loggers, dashboards, and station automation
//! that poll measurement channels at a steady rate.
//!
//! ## Quick Start
//!
//! ```no_run
//! use umb::UmbBuilder;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut client = UmbBuilder::new()
//!         .tcp("10.0.1.26")
//!         .connect()
//!         .await?;
//!
//!     let temperature = client.query_one(100).await?;
//!     println!("air temperature: {} degC", temperature.value);
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate              | Purpose                                           |
//! |--------------------|---------------------------------------------------|
//! | `umb-core`         | Types ([`Command`], [`Response`], [`Value`]), errors, [`Transport`] |
//! | `umb-transport`    | TCP and serial transport implementations          |
//! | `umb-protocol`     | Frame codec, payload decoder, session, client     |
//! | **`umb`**          | This facade crate -- re-exports everything        |
//!
//! ## Per-channel outcomes
//!
//! A channel the station cannot measure is not an error: it decodes to
//! [`Value::ChannelInvalid`]. Batched queries return one `Result` per
//! requested channel, in request order, so one bad channel never hides
//! the others:
//!
//! ```no_run
//! # async fn example(client: &mut umb::UmbClient) {
//! for (channel, outcome) in [100, 200, 999]
//!     .iter()
//!     .zip(client.query_many_batched(&[100, 200, 999]).await)
//! {
//!     match outcome {
//!         Ok(response) => println!("{channel}: {}", response.value),
//!         Err(e) => println!("{channel}: {e}"),
//!     }
//! }
//! # }
//! ```

use std::ops::RangeInclusive;

pub use umb_core::*;
pub use umb_protocol::{ClientConfig, Endpoint, ExchangeState, UmbBuilder, UmbClient};

/// TCP and serial transports.
pub mod transport {
    pub use umb_transport::*;
}

/// Frame codec, command builders, payload decoder, and device-side reply
/// builders.
pub mod protocol {
    pub use umb_protocol::{commands, frame, io, payload, reply};
}

/// Channel numbers that carry measurements.
///
/// Lower numbers are reserved for system values; numbers above this range
/// are not assigned by any UMB device.
pub const MEASUREMENT_CHANNELS: RangeInclusive<u32> = 100..=29999;

/// Keep the measurement channels from `requested`, preserving order.
///
/// # Example
///
/// ```
/// assert_eq!(umb::measurement_channels(&[100, 42, 4630, 30000]), vec![100, 4630]);
/// ```
pub fn measurement_channels(requested: &[u32]) -> Vec<u32> {
    requested
        .iter()
        .copied()
        .filter(|channel| MEASUREMENT_CHANNELS.contains(channel))
        .collect()
}

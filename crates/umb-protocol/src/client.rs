//! UmbClient -- the public request API for one UMB device.
//!
//! `UmbClient` owns at most one [`Session`] at a time and issues strictly
//! one request at a time over it. Each query builds an immutable
//! [`Command`], runs the exchange (with timeout, retries, and stale frame
//! filtering), and decodes the reply into a [`Response`] owned by the
//! caller.
//!
//! Clients for different devices share nothing and may run concurrently
//! on separate tasks.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use umb_core::error::{Error, Result};
use umb_core::transport::Transport;
use umb_core::types::{Address, Command, DeviceInfo, DeviceStatus, InfoOption, Response, Value};

use crate::builder::{Endpoint, UmbBuilder};
use crate::commands::MAX_MULTI_CHANNELS;
use crate::io::{ExchangeState, Session};
use crate::payload;

/// Per-client settings, normally filled in by [`UmbBuilder`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Station address requests are sent to.
    pub device: Address,
    /// Time to wait for a reply to one attempt.
    pub command_timeout: Duration,
    /// Resends after a timeout or corrupted reply.
    pub max_retries: u32,
    /// Time allowed to establish a TCP connection.
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            device: Address::default(),
            command_timeout: Duration::from_millis(500),
            max_retries: 3,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Client for a single UMB device.
pub struct UmbClient {
    endpoint: Option<Endpoint>,
    config: ClientConfig,
    session: Option<Session>,
    cancel: CancellationToken,
}

impl UmbClient {
    /// Start configuring a client.
    pub fn builder() -> UmbBuilder {
        UmbBuilder::new()
    }

    pub(crate) fn new(endpoint: Option<Endpoint>, config: ClientConfig) -> Self {
        Self {
            endpoint,
            config,
            session: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Wrap an already-open transport in a connected client.
    pub fn with_transport(transport: Box<dyn Transport>, config: ClientConfig) -> Self {
        let session = Session::new(transport, config.device);
        Self {
            endpoint: None,
            config,
            session: Some(session),
            cancel: CancellationToken::new(),
        }
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Open a session to the configured endpoint. No-op when connected.
    pub async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        let endpoint = self.endpoint.as_ref().ok_or_else(|| {
            Error::Transport("no endpoint to reconnect to; client was built around a transport".into())
        })?;

        let transport = endpoint.open(self.config.connect_timeout).await?;
        info!(%endpoint, device = %self.config.device, "Connected to UMB device");
        self.session = Some(Session::new(transport, self.config.device));
        Ok(())
    }

    /// Close the session. The transport is dropped even if closing fails.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(session) = self.session.take() {
            session.close().await?;
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.session.as_ref().is_some_and(Session::is_connected)
    }

    /// Run `f` inside a session and close it afterwards.
    ///
    /// Connects first if needed. The session is closed whether `f` succeeds
    /// or fails; an error from `f` takes precedence over one from closing.
    ///
    /// ```no_run
    /// # async fn example(client: &mut umb_protocol::UmbClient) -> umb_core::Result<()> {
    /// let readings = client
    ///     .scoped(|c| Box::pin(async move { Ok(c.query_many(&[100, 200]).await) }))
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn scoped<T, F>(&mut self, f: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut UmbClient) -> Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>,
    {
        self.connect().await?;
        let result = f(&mut *self).await;
        let closed = self.disconnect().await;
        let value = result?;
        closed?;
        Ok(value)
    }

    // -----------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------

    /// Station address requests go to.
    pub fn device(&self) -> Address {
        self.config.device
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// State of the current or last exchange; `Idle` without a session.
    pub fn state(&self) -> ExchangeState {
        self.session
            .as_ref()
            .map_or(ExchangeState::Idle, Session::state)
    }

    /// Frames sent in the current session, retries included.
    pub fn requests_sent(&self) -> u64 {
        self.session.as_ref().map_or(0, Session::requests_sent)
    }

    /// Token that stops further attempts once cancelled.
    ///
    /// Cancellation is cooperative: an attempt already waiting for a reply
    /// runs to its timeout, after which no retry is made and the request
    /// fails with [`Error::Cancelled`]. The token stays cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    // -----------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------

    /// Run one command with an explicit timeout and retry budget.
    ///
    /// Timeouts and corrupted replies are retried; a reply that is
    /// structurally valid but cannot be decoded is returned as
    /// [`Error::Decode`] without retrying. Multi-channel commands produce
    /// one outcome per channel and go through
    /// [`query_many_batched`](Self::query_many_batched) instead.
    pub async fn request(
        &mut self,
        command: &Command,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Response> {
        let session = self.session.as_mut().ok_or(Error::NotConnected)?;
        if matches!(command, Command::MultiChannel { .. }) {
            return Err(Error::Encoding(
                "multi-channel commands yield one response per channel".into(),
            ));
        }

        let reply = session
            .exchange(command, timeout, max_retries, &self.cancel)
            .await?;
        let response = payload::decode(&reply, command);
        session.finish(&response);
        if let Err(e) = &response {
            warn!(%command, error = %e, "Reply could not be decoded");
        }
        response
    }

    /// Current value of one channel.
    ///
    /// A channel the device cannot measure is not an error: the response
    /// carries [`Value::ChannelInvalid`].
    pub async fn query_one(&mut self, channel: u32) -> Result<Response> {
        let (timeout, retries) = self.policy();
        self.request(&Command::OnlineData { channel }, timeout, retries)
            .await
    }

    /// Current values of several channels, one request per channel.
    ///
    /// Results are in input order and independent: one channel failing
    /// does not stop the others.
    pub async fn query_many(&mut self, channels: &[u32]) -> Vec<Result<Response>> {
        let mut results = Vec::with_capacity(channels.len());
        for &channel in channels {
            results.push(self.query_one(channel).await);
        }
        results
    }

    /// Current values of several channels using multi-channel requests of
    /// up to 20 channels each.
    ///
    /// Same contract as [`query_many`](Self::query_many): results in input
    /// order, each channel reported independently. A failed request fails
    /// every channel it carried.
    pub async fn query_many_batched(&mut self, channels: &[u32]) -> Vec<Result<Response>> {
        let mut results: Vec<Option<Result<Response>>> = channels
            .iter()
            .map(|&channel| {
                (channel > u16::MAX as u32).then(|| {
                    Err(Error::Encoding(format!(
                        "channel {channel} out of range 0..={}",
                        u16::MAX
                    )))
                })
            })
            .collect();
        let queued: Vec<usize> = (0..channels.len())
            .filter(|&i| results[i].is_none())
            .collect();

        for chunk in queued.chunks(MAX_MULTI_CHANNELS) {
            let batch: Vec<u32> = chunk.iter().map(|&i| channels[i]).collect();
            match self.request_batch(&batch).await {
                Ok(outcomes) => {
                    for (&i, outcome) in chunk.iter().zip(outcomes) {
                        results[i] = Some(outcome);
                    }
                }
                Err(e) => {
                    debug!(channels = batch.len(), error = %e, "Multi-channel request failed");
                    for &i in chunk {
                        results[i] = Some(Err(e.clone()));
                    }
                }
            }
        }

        results
            .into_iter()
            .map(|r| r.unwrap_or_else(|| Err(Error::Decode("channel was not queried".into()))))
            .collect()
    }

    async fn request_batch(&mut self, channels: &[u32]) -> Result<Vec<Result<Response>>> {
        let (timeout, retries) = self.policy();
        let session = self.session.as_mut().ok_or(Error::NotConnected)?;
        let command = Command::MultiChannel {
            channels: channels.to_vec(),
        };

        let reply = session
            .exchange(&command, timeout, retries, &self.cancel)
            .await?;
        let outcomes = payload::decode_multi(&reply, channels);
        session.finish(&outcomes);
        outcomes
    }

    /// Device status report.
    pub async fn query_status(&mut self) -> Result<DeviceStatus> {
        let (timeout, retries) = self.policy();
        let response = self.request(&Command::Status, timeout, retries).await?;
        match response.value {
            Value::Status(status) => Ok(status),
            other => Err(unexpected("status", &other)),
        }
    }

    /// The device's onboard clock.
    ///
    /// This is the clock of the device at the time of the query, not the
    /// sample time of any channel value.
    pub async fn query_time(&mut self) -> Result<DateTime<Utc>> {
        let (timeout, retries) = self.policy();
        let response = self.request(&Command::Time, timeout, retries).await?;
        match response.value {
            Value::Time(time) => Ok(time),
            other => Err(unexpected("time", &other)),
        }
    }

    /// Best-effort device information.
    ///
    /// Queries every information option and merges what parses. Options
    /// the device refuses or leaves unanswered stay
    /// [`Unavailable`](umb_core::Field::Unavailable); the call only fails
    /// if no option was answered at all, or on errors that end the session
    /// (connection loss, cancellation).
    pub async fn query_device_info(&mut self) -> Result<DeviceInfo> {
        let (timeout, retries) = self.policy();
        let mut info = DeviceInfo::default();
        let mut answered = 0;

        for option in InfoOption::ALL {
            match self
                .request(&Command::DeviceInfo(option), timeout, retries)
                .await
            {
                Ok(Response {
                    value: Value::Info(part),
                    ..
                }) => {
                    answered += 1;
                    info = info.merge(part);
                }
                Ok(other) => return Err(unexpected("device info", &other.value)),
                Err(Error::Timeout) => {
                    debug!(option = option.code(), "Device info option unanswered");
                }
                Err(e) => return Err(e),
            }
        }

        if answered == 0 {
            return Err(Error::Timeout);
        }
        Ok(info)
    }

    fn policy(&self) -> (Duration, u32) {
        (self.config.command_timeout, self.config.max_retries)
    }
}

fn unexpected(what: &str, value: &Value) -> Error {
    Error::Decode(format!("expected {what} value, got {value}"))
}

impl Drop for UmbClient {
    fn drop(&mut self) {
        if let Some(session) = &self.session {
            debug!(
                device = %session.device(),
                requests = session.requests_sent(),
                "UmbClient dropped with an open session"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{CMD_DEVICE_INFO, CMD_STATUS, build_request};
    use crate::frame::encode_frame;
    use crate::reply::{self, Reading};
    use chrono::TimeZone;
    use umb_core::{Field, InvalidReason, Query, StatusCode};
    use umb_test_harness::MockTransport;

    fn station() -> Address {
        Address::from_raw(0x7001)
    }

    fn req(command: &Command) -> Vec<u8> {
        encode_frame(&build_request(command, station()).unwrap()).unwrap()
    }

    fn online(channel: u32) -> Vec<u8> {
        req(&Command::OnlineData { channel })
    }

    fn wire(frame: crate::frame::Frame) -> Vec<u8> {
        encode_frame(&frame).unwrap()
    }

    fn client(mock: MockTransport) -> UmbClient {
        UmbClient::with_transport(
            Box::new(mock),
            ClientConfig {
                command_timeout: Duration::from_millis(50),
                max_retries: 1,
                ..Default::default()
            },
        )
    }

    // ---------------------------------------------------------------
    // Single channel
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn query_one_float() {
        let mut mock = MockTransport::new();
        mock.expect(
            &online(100),
            &wire(reply::online_data(station(), 100, &Reading::F32(21.5))),
        );

        let mut client = client(mock);
        let response = client.query_one(100).await.unwrap();
        assert_eq!(response.channel(), Some(100));
        assert_eq!(response.value, Value::Float(21.5));
        assert_eq!(client.state(), ExchangeState::Idle);
        assert_eq!(client.requests_sent(), 1);
    }

    #[tokio::test]
    async fn query_one_invalid_channel_is_a_value() {
        let mut mock = MockTransport::new();
        mock.expect(
            &online(999),
            &wire(reply::online_data(
                station(),
                999,
                &Reading::Failed(StatusCode::InvalidChannel),
            )),
        );

        let mut client = client(mock);
        let response = client.query_one(999).await.unwrap();
        assert_eq!(
            response.value,
            Value::ChannelInvalid(InvalidReason::Status(StatusCode::InvalidChannel))
        );
    }

    #[tokio::test]
    async fn decode_error_is_not_retried() {
        // Valid frame, unknown type tag 0x30.
        let mut frame = reply::online_data(station(), 100, &Reading::U8(1));
        frame.payload[3] = 0x30;

        let mut mock = MockTransport::new();
        mock.expect(&online(100), &wire(frame));
        let log = mock.sent_log();

        let mut client = client(mock);
        let result = client.query_one(100).await;
        assert!(matches!(result, Err(Error::Decode(_))));
        assert_eq!(log.len(), 1);
        assert_eq!(client.state(), ExchangeState::Failed);
    }

    #[tokio::test]
    async fn out_of_range_channel_is_encoding_error() {
        let mock = MockTransport::new();
        let log = mock.sent_log();
        let mut client = client(mock);

        let result = client.query_one(65_536).await;
        assert!(matches!(result, Err(Error::Encoding(_))));
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn request_honours_explicit_retry_budget() {
        let mut mock = MockTransport::new();
        mock.expect_timeout(&online(100));
        mock.expect_timeout(&online(100));
        mock.expect(
            &online(100),
            &wire(reply::online_data(station(), 100, &Reading::U16(7))),
        );

        let mut client = client(mock);
        let response = client
            .request(
                &Command::OnlineData { channel: 100 },
                Duration::from_millis(20),
                2,
            )
            .await
            .unwrap();
        assert_eq!(response.value, Value::Unsigned(7));
        assert_eq!(client.requests_sent(), 3);
    }

    #[tokio::test]
    async fn request_rejects_multi_channel_command() {
        let mut client = client(MockTransport::new());
        let result = client
            .request(
                &Command::MultiChannel {
                    channels: vec![100],
                },
                Duration::from_millis(20),
                0,
            )
            .await;
        assert!(matches!(result, Err(Error::Encoding(_))));
    }

    // ---------------------------------------------------------------
    // Several channels
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn query_many_middle_channel_invalid() {
        let mut mock = MockTransport::new();
        mock.expect(
            &online(100),
            &wire(reply::online_data(station(), 100, &Reading::F32(21.5))),
        );
        mock.expect(
            &online(999),
            &wire(reply::online_data(
                station(),
                999,
                &Reading::Failed(StatusCode::InvalidChannel),
            )),
        );
        mock.expect(
            &online(200),
            &wire(reply::online_data(station(), 200, &Reading::F32(1013.25))),
        );

        let mut client = client(mock);
        let results = client.query_many(&[100, 999, 200]).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().value, Value::Float(21.5));
        assert!(results[1].as_ref().unwrap().value.is_channel_invalid());
        assert_eq!(results[2].as_ref().unwrap().value, Value::Float(1013.25));
    }

    #[tokio::test]
    async fn query_many_continues_after_timeout() {
        let mut mock = MockTransport::new();
        mock.expect(
            &online(100),
            &wire(reply::online_data(station(), 100, &Reading::F32(21.5))),
        );
        mock.expect_timeout(&online(999));
        mock.expect_timeout(&online(999));
        mock.expect(
            &online(200),
            &wire(reply::online_data(station(), 200, &Reading::F32(1013.25))),
        );

        let mut client = client(mock);
        let results = client.query_many(&[100, 999, 200]).await;
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(Error::Timeout)));
        assert_eq!(results[2].as_ref().unwrap().channel(), Some(200));
    }

    #[tokio::test]
    async fn query_many_batched_single_frame() {
        let mut mock = MockTransport::new();
        mock.expect(
            &req(&Command::MultiChannel {
                channels: vec![100, 999, 200],
            }),
            &wire(reply::multi_channel(
                station(),
                &[
                    (100, Reading::F32(21.5)),
                    (999, Reading::Failed(StatusCode::InvalidChannel)),
                    (200, Reading::F32(1013.25)),
                ],
            )),
        );
        let log = mock.sent_log();

        let mut client = client(mock);
        let results = client.query_many_batched(&[100, 999, 200]).await;
        assert_eq!(log.len(), 1);
        assert_eq!(results[0].as_ref().unwrap().value, Value::Float(21.5));
        assert!(results[1].as_ref().unwrap().value.is_channel_invalid());
        assert_eq!(results[2].as_ref().unwrap().value, Value::Float(1013.25));
    }

    #[tokio::test]
    async fn query_many_batched_skips_reply_to_earlier_batch() {
        let mut response = wire(reply::multi_channel(
            station(),
            &[(300, Reading::F32(1.0)), (400, Reading::F32(2.0))],
        ));
        response.extend(wire(reply::multi_channel(
            station(),
            &[(100, Reading::F32(21.5)), (200, Reading::F32(48.0))],
        )));

        let mut mock = MockTransport::new();
        mock.expect(
            &req(&Command::MultiChannel {
                channels: vec![100, 200],
            }),
            &response,
        );

        let mut client = client(mock);
        let results = client.query_many_batched(&[100, 200]).await;
        assert_eq!(results[0].as_ref().unwrap().value, Value::Float(21.5));
        assert_eq!(results[1].as_ref().unwrap().value, Value::Float(48.0));
        assert_eq!(client.requests_sent(), 1);
    }

    #[tokio::test]
    async fn query_many_batched_splits_into_frames_of_twenty() {
        let channels: Vec<u32> = (100..125).collect();
        let readings = |range: std::ops::Range<u32>| -> Vec<(u16, Reading)> {
            range.map(|c| (c as u16, Reading::U16(c as u16))).collect()
        };

        let mut mock = MockTransport::new();
        mock.expect(
            &req(&Command::MultiChannel {
                channels: channels[..20].to_vec(),
            }),
            &wire(reply::multi_channel(station(), &readings(100..120))),
        );
        mock.expect(
            &req(&Command::MultiChannel {
                channels: channels[20..].to_vec(),
            }),
            &wire(reply::multi_channel(station(), &readings(120..125))),
        );

        let mut client = client(mock);
        let results = client.query_many_batched(&channels).await;
        assert_eq!(results.len(), 25);
        for (channel, result) in channels.iter().zip(&results) {
            let response = result.as_ref().unwrap();
            assert_eq!(response.channel(), Some(*channel));
            assert_eq!(response.value, Value::Unsigned(*channel as u64));
        }
    }

    #[tokio::test]
    async fn query_many_batched_isolates_unencodable_channels() {
        let mut mock = MockTransport::new();
        mock.expect(
            &req(&Command::MultiChannel {
                channels: vec![100, 200],
            }),
            &wire(reply::multi_channel(
                station(),
                &[(100, Reading::I16(-5)), (200, Reading::I16(5))],
            )),
        );

        let mut client = client(mock);
        let results = client.query_many_batched(&[100, 70_000, 200]).await;
        assert_eq!(results[0].as_ref().unwrap().value, Value::Signed(-5));
        assert!(matches!(results[1], Err(Error::Encoding(_))));
        assert_eq!(results[2].as_ref().unwrap().value, Value::Signed(5));
    }

    #[tokio::test]
    async fn query_many_batched_failure_fails_each_channel() {
        let command = Command::MultiChannel {
            channels: vec![100, 200],
        };
        let mut mock = MockTransport::new();
        mock.expect_timeout(&req(&command));
        mock.expect_timeout(&req(&command));

        let mut client = client(mock);
        let results = client.query_many_batched(&[100, 200]).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| matches!(r, Err(Error::Timeout))));
    }

    // ---------------------------------------------------------------
    // Status, time, device info
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn query_status_decodes_codes() {
        let mut mock = MockTransport::new();
        mock.expect(
            &req(&Command::Status),
            &wire(reply::status(station(), &[StatusCode::Undervoltage])),
        );

        let mut client = client(mock);
        let status = client.query_status().await.unwrap();
        assert!(status.contains(StatusCode::Undervoltage));
        assert_eq!(status.raw, 0x29);
    }

    #[tokio::test]
    async fn query_status_refused_is_device_status_error() {
        let mut mock = MockTransport::new();
        mock.expect(
            &req(&Command::Status),
            &wire(reply::refused(station(), CMD_STATUS, StatusCode::Busy)),
        );
        let log = mock.sent_log();

        let mut client = client(mock);
        let result = client.query_status().await;
        assert!(matches!(result, Err(Error::DeviceStatus(StatusCode::Busy))));
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn query_time_is_device_clock() {
        let at = Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap();
        let mut mock = MockTransport::new();
        mock.expect(&req(&Command::Time), &wire(reply::time(station(), at)));

        let mut client = client(mock);
        assert_eq!(client.query_time().await.unwrap(), at);
    }

    #[tokio::test]
    async fn query_device_info_merges_options() {
        let mut mock = MockTransport::new();
        mock.expect(
            &req(&Command::DeviceInfo(InfoOption::Identification)),
            &wire(reply::device_info(
                station(),
                InfoOption::Identification,
                &600u16.to_le_bytes(),
            )),
        );
        mock.expect(
            &req(&Command::DeviceInfo(InfoOption::Description)),
            &wire(reply::refused(
                station(),
                CMD_DEVICE_INFO,
                StatusCode::UnknownCommand,
            )),
        );
        mock.expect_timeout(&req(&Command::DeviceInfo(InfoOption::Versions)));
        mock.expect_timeout(&req(&Command::DeviceInfo(InfoOption::Versions)));
        mock.expect(
            &req(&Command::DeviceInfo(InfoOption::ChannelCount)),
            &wire(reply::device_info(
                station(),
                InfoOption::ChannelCount,
                &[40, 0, 2],
            )),
        );

        let mut client = client(mock);
        let info = client.query_device_info().await.unwrap();
        assert_eq!(info.device_type, Field::Available(600));
        assert_eq!(info.description, Field::Unavailable);
        assert_eq!(info.hardware_version, Field::Unavailable);
        assert_eq!(info.channel_count, Field::Available(40));
        assert_eq!(info.block_count, Field::Available(2));
    }

    #[tokio::test]
    async fn query_device_info_silent_device_times_out() {
        let mut mock = MockTransport::new();
        for option in InfoOption::ALL {
            mock.expect_timeout(&req(&Command::DeviceInfo(option)));
            mock.expect_timeout(&req(&Command::DeviceInfo(option)));
        }

        let mut client = client(mock);
        assert!(matches!(
            client.query_device_info().await,
            Err(Error::Timeout)
        ));
    }

    // ---------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn requests_after_disconnect_are_not_connected() {
        let mut client = client(MockTransport::new());
        assert!(client.is_connected());
        client.disconnect().await.unwrap();
        assert!(!client.is_connected());
        assert_eq!(client.state(), ExchangeState::Idle);

        assert!(matches!(
            client.query_one(100).await,
            Err(Error::NotConnected)
        ));
        assert!(matches!(
            client.query_status().await,
            Err(Error::NotConnected)
        ));
        assert!(matches!(client.query_time().await, Err(Error::NotConnected)));
        assert!(matches!(
            client.query_device_info().await,
            Err(Error::NotConnected)
        ));
        let results = client.query_many(&[100, 200]).await;
        assert!(results.iter().all(|r| matches!(r, Err(Error::NotConnected))));
        let results = client.query_many_batched(&[100, 200]).await;
        assert!(results.iter().all(|r| matches!(r, Err(Error::NotConnected))));
    }

    #[tokio::test]
    async fn transport_client_cannot_reconnect() {
        let mut client = client(MockTransport::new());
        client.disconnect().await.unwrap();
        assert!(matches!(client.connect().await, Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn scoped_closes_on_success() {
        let mut mock = MockTransport::new();
        mock.expect(
            &online(100),
            &wire(reply::online_data(station(), 100, &Reading::U8(3))),
        );

        let mut client = client(mock);
        let response = client
            .scoped(|c| Box::pin(async move { c.query_one(100).await }))
            .await
            .unwrap();
        assert_eq!(response.query, Query::Channel(100));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn scoped_closes_on_failure() {
        let mut mock = MockTransport::new();
        mock.expect_timeout(&online(100));
        mock.expect_timeout(&online(100));

        let mut client = client(mock);
        let result = client
            .scoped(|c| Box::pin(async move { c.query_one(100).await }))
            .await;
        assert!(matches!(result, Err(Error::Timeout)));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn cancelled_client_sends_nothing() {
        let mut mock = MockTransport::new();
        mock.expect_timeout(&online(100));
        let log = mock.sent_log();

        let mut client = client(mock);
        let token = client.cancellation_token();
        token.cancel();

        let result = client.query_one(100).await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(log.is_empty());
        assert_eq!(client.state(), ExchangeState::Failed);
    }
}

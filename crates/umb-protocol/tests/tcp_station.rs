//! End-to-end tests: UmbClient over TcpTransport against a scripted
//! station on localhost.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use umb_core::{Address, Command, Error, InfoOption, StatusCode, Value};
use umb_protocol::commands::build_request;
use umb_protocol::frame::{Frame, encode_frame};
use umb_protocol::reply::{self, Reading};
use umb_protocol::UmbBuilder;
use umb_test_harness::MockTcpServer;

fn station() -> Address {
    Address::from_raw(0x7001)
}

fn req(command: &Command) -> Vec<u8> {
    encode_frame(&build_request(command, station()).unwrap()).unwrap()
}

fn wire(frame: Frame) -> Vec<u8> {
    encode_frame(&frame).unwrap()
}

#[tokio::test]
async fn polls_channels_status_and_clock() {
    let clock = Utc.with_ymd_and_hms(2024, 3, 15, 12, 30, 45).unwrap();

    let mut server = MockTcpServer::new().await.unwrap();
    server.expect(
        &req(&Command::OnlineData { channel: 100 }),
        &wire(reply::online_data(station(), 100, &Reading::F32(21.5))),
    );
    server.expect(
        &req(&Command::OnlineData { channel: 999 }),
        &wire(reply::online_data(
            station(),
            999,
            &Reading::Failed(StatusCode::InvalidChannel),
        )),
    );
    server.expect(
        &req(&Command::OnlineData { channel: 200 }),
        &wire(reply::online_data(station(), 200, &Reading::F32(1013.25))),
    );
    server.expect(
        &req(&Command::Status),
        &wire(reply::status(station(), &[StatusCode::Ok])),
    );
    server.expect(&req(&Command::Time), &wire(reply::time(station(), clock)));
    let addr = server.addr().to_string();
    server.start();

    let mut client = UmbBuilder::new()
        .tcp(&addr)
        .command_timeout(Duration::from_millis(500))
        .connect()
        .await
        .unwrap();

    let results = client.query_many(&[100, 999, 200]).await;
    assert_eq!(results[0].as_ref().unwrap().value, Value::Float(21.5));
    assert!(results[1].as_ref().unwrap().value.is_channel_invalid());
    assert_eq!(results[2].as_ref().unwrap().value, Value::Float(1013.25));

    assert!(client.query_status().await.unwrap().is_ok());
    assert_eq!(client.query_time().await.unwrap(), clock);
    assert_eq!(client.requests_sent(), 5);

    client.disconnect().await.unwrap();
    server.wait().await.unwrap();
}

#[tokio::test]
async fn silent_station_is_retried_then_answers() {
    let command = Command::DeviceInfo(InfoOption::ChannelCount);

    let mut server = MockTcpServer::new().await.unwrap();
    server.expect_silence(&req(&command));
    server.expect(
        &req(&command),
        &wire(reply::device_info(
            station(),
            InfoOption::ChannelCount,
            &[40, 0, 2],
        )),
    );
    let addr = server.addr().to_string();
    server.start();

    let mut client = UmbBuilder::new().tcp(&addr).connect().await.unwrap();
    let response = client
        .request(&command, Duration::from_millis(100), 1)
        .await
        .unwrap();
    match response.value {
        Value::Info(info) => assert_eq!(info.channel_count.as_option(), Some(&40)),
        other => panic!("expected device info, got {other:?}"),
    }
    assert_eq!(client.requests_sent(), 2);

    client.disconnect().await.unwrap();
    server.wait().await.unwrap();
}

#[tokio::test]
async fn scoped_session_closes_connection() {
    let mut server = MockTcpServer::new().await.unwrap();
    server.expect(
        &req(&Command::OnlineData { channel: 4630 }),
        &wire(reply::online_data(station(), 4630, &Reading::U16(12))),
    );
    let addr = server.addr().to_string();
    server.start();

    let mut client = UmbBuilder::new().tcp(&addr).build().unwrap();
    assert!(!client.is_connected());

    let response = client
        .scoped(|c| Box::pin(async move { c.query_one(4630).await }))
        .await
        .unwrap();
    assert_eq!(response.value, Value::Unsigned(12));
    assert!(!client.is_connected());

    // The server only finishes once the client has hung up.
    server.wait().await.unwrap();
    assert!(matches!(
        client.query_one(4630).await,
        Err(Error::NotConnected)
    ));
}

#[tokio::test]
async fn addresses_selected_station() {
    let other = Address::weather_station(3).unwrap();
    let request = encode_frame(&build_request(&Command::Status, other).unwrap()).unwrap();

    let mut server = MockTcpServer::new().await.unwrap();
    server.expect(&request, &wire(reply::status(other, &[StatusCode::Ok])));
    let addr = server.addr().to_string();
    server.start();

    let mut client = UmbBuilder::new()
        .tcp(&addr)
        .device_id(3)
        .connect()
        .await
        .unwrap();
    assert!(client.query_status().await.unwrap().is_ok());

    client.disconnect().await.unwrap();
    server.wait().await.unwrap();
}

//! Read channels from a simulated weather station.
//!
//! Starts a small UMB station on localhost that answers from a fixed table,
//! then connects to it the same way a real LAN-attached station is reached
//! and runs every query the client offers: single channels, a batched
//! multi-channel read, device status, the device clock, and device
//! information.
//!
//! Point `UmbBuilder::tcp` at a real station to read live values instead.
//!
//! # Usage
//!
//! ```sh
//! RUST_LOG=umb_protocol=debug cargo run -p umb --example read_channels
//! ```

use chrono::Utc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use umb::protocol::reply::{self, Reading};
use umb::protocol::{commands, frame};
use umb::{Address, Command, InfoOption, StatusCode, UmbBuilder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?.to_string();
    let station = tokio::spawn(simulate_station(listener));
    println!("Simulated station listening on {addr}");

    let mut client = UmbBuilder::new().tcp(&addr).connect().await?;

    // One request per channel.
    let reading = client.query_one(100).await?;
    println!("channel 100 (air temperature): {}", reading.value);

    // Up to 20 channels per request; 999 is not measured by this station.
    let channels = [100, 200, 300, 999];
    for (channel, outcome) in channels
        .iter()
        .zip(client.query_many_batched(&channels).await)
    {
        match outcome {
            Ok(response) => println!("channel {channel}: {}", response.value),
            Err(e) => println!("channel {channel}: error: {e}"),
        }
    }

    let status = client.query_status().await?;
    println!("device status: {status}");

    let clock = client.query_time().await?;
    println!("device clock: {clock}");

    let info = client.query_device_info().await?;
    println!(
        "device: {} (type {}), hw {} sw {}, {} channels",
        info.description,
        info.device_type,
        info.hardware_version,
        info.software_version,
        info.channel_count
    );

    println!("{} requests sent", client.requests_sent());
    client.disconnect().await?;
    station.await??;
    Ok(())
}

/// Answer requests on the first accepted connection until it closes.
async fn simulate_station(listener: TcpListener) -> anyhow::Result<()> {
    let (mut stream, _) = listener.accept().await?;
    let station = Address::default();
    let mut pending = Vec::new();
    let mut chunk = [0u8; 256];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        pending.extend_from_slice(&chunk[..n]);

        // Requests may arrive split across reads; wait for whole frames.
        while let Ok((request, consumed)) = frame::decode_frame(&pending) {
            pending.drain(..consumed);
            let reply = answer(station, &commands::parse_request(&request)?);
            stream.write_all(&frame::encode_frame(&reply)?).await?;
        }
    }
}

fn answer(station: Address, command: &Command) -> frame::Frame {
    match command {
        Command::OnlineData { channel } => {
            reply::online_data(station, wire_channel(*channel), &measure(*channel))
        }
        Command::MultiChannel { channels } => {
            let readings: Vec<(u16, Reading)> = channels
                .iter()
                .map(|&channel| (wire_channel(channel), measure(channel)))
                .collect();
            reply::multi_channel(station, &readings)
        }
        Command::Status => reply::status(station, &[StatusCode::Ok]),
        Command::Time => reply::time(station, Utc::now()),
        Command::DeviceInfo(option) => {
            let data: &[u8] = match option {
                InfoOption::Identification => &[0x1E, 0x00],
                InfoOption::Description => b"WS600 simulated\0",
                InfoOption::Versions => &[18, 42],
                InfoOption::ChannelCount => &[3, 0, 1],
            };
            reply::device_info(station, *option, data)
        }
    }
}

fn measure(channel: u32) -> Reading {
    match channel {
        100 => Reading::F32(21.5),
        200 => Reading::F32(48.0),
        300 => Reading::F32(1013.25),
        _ => Reading::Failed(StatusCode::InvalidChannel),
    }
}

fn wire_channel(channel: u32) -> u16 {
    u16::try_from(channel).unwrap_or(u16::MAX)
}

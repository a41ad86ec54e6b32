// umb-cli -- read measurement channels from a UMB weather station.
//
// Usage:
//   umb-cli --host 10.0.1.26 100 200 300 460 580
//   umb-cli --host 10.0.1.26 --loop --batched 100 200
//   umb-cli --serial /dev/ttyUSB0 --baud 19200 --device-id 2 --status --time
//   umb-cli --host 10.0.1.26 --info
//
// One-shot mode prints a single JSON line. Loop mode polls once per second
// and prints a line only when a channel value changed. Ctrl-C stops both.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{SecondsFormat, Utc};
use clap::{ArgAction, ArgGroup, Parser};
use serde::{Serialize, Serializer};
use serde_json::{Value as Json, json};
use tracing_subscriber::EnvFilter;

use umb::transport::{DEFAULT_BAUD_RATE, DEFAULT_PORT};
use umb::{Response, UmbBuilder, UmbClient, Value};

/// Read measurement channels from a UMB weather station.
#[derive(Parser, Debug)]
#[command(name = "umb-cli", version, about)]
#[command(group(ArgGroup::new("endpoint").required(true).args(["host", "serial"])))]
struct Cli {
    /// IP address or hostname of the station or RS485-to-Ethernet converter.
    #[arg(long)]
    host: Option<String>,

    /// TCP port.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Serial port of an RS485 adapter (e.g. /dev/ttyUSB0, COM3).
    #[arg(long)]
    serial: Option<String>,

    /// Serial baud rate.
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Device id of the weather station on the bus.
    #[arg(long, default_value_t = 1)]
    device_id: u16,

    /// Poll once per second and print only when values change.
    #[arg(long = "loop")]
    poll: bool,

    /// Read up to 20 channels per request instead of one request each.
    #[arg(long)]
    batched: bool,

    /// Also report the device status.
    #[arg(long)]
    status: bool,

    /// Also report the device clock.
    #[arg(long)]
    time: bool,

    /// Also report the device identification.
    #[arg(long)]
    info: bool,

    /// Reply timeout per attempt, in milliseconds.
    #[arg(long, default_value_t = 500)]
    timeout_ms: u64,

    /// Resends after a timeout or corrupted reply.
    #[arg(long, default_value_t = 3)]
    retries: u32,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Channels to read (100..=29999; others are ignored).
    channels: Vec<u32>,
}

impl Cli {
    fn builder(&self) -> UmbBuilder {
        let builder = UmbBuilder::new()
            .device_id(self.device_id)
            .command_timeout(Duration::from_millis(self.timeout_ms))
            .max_retries(self.retries);

        match (&self.host, &self.serial) {
            (Some(host), _) => builder.tcp(&host_with_port(host, self.port)),
            (None, Some(path)) => builder.serial_port(path).baud_rate(self.baud),
            (None, None) => builder,
        }
    }

    fn wants_device_queries(&self) -> bool {
        self.status || self.time || self.info
    }
}

fn host_with_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// Channel outcomes in the order the channels were given, duplicates kept.
///
/// Serialized as a `{channel: value}` object whose keys follow that order.
#[derive(Debug, Clone, Default, PartialEq)]
struct Channels(Vec<(u32, Json)>);

impl Channels {
    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

impl Serialize for Channels {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(channel, value)| (channel, value)))
    }
}

/// One line of output.
#[derive(Serialize, Debug)]
struct Report {
    timestamp: String,
    /// Number of channels whose value differs from the previous line.
    #[serde(skip_serializing_if = "Option::is_none")]
    changed: Option<usize>,
    #[serde(skip_serializing_if = "Channels::is_empty")]
    channels: Channels,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_time: Option<Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    info: Option<Json>,
}

impl Report {
    fn new(channels: Channels) -> Self {
        Report {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            changed: None,
            channels,
            status: None,
            device_time: None,
            info: None,
        }
    }

    fn print(&self) -> Result<()> {
        println!("{}", serde_json::to_string(self).context("serializing report")?);
        Ok(())
    }
}

fn channel_json(outcome: &umb::Result<Response>) -> Json {
    match outcome {
        Ok(response) => match &response.value {
            Value::Float(v) => json!(v),
            Value::Unsigned(v) => json!(v),
            Value::Signed(v) => json!(v),
            Value::ChannelInvalid(reason) => json!({ "invalid": reason.to_string() }),
            other => json!(other.to_string()),
        },
        Err(e) => json!({ "error": e.to_string() }),
    }
}

fn error_json(e: &umb::Error) -> Json {
    json!({ "error": e.to_string() })
}

async fn read_channels(
    client: &mut UmbClient,
    channels: &[u32],
    batched: bool,
) -> Channels {
    let outcomes = if batched {
        client.query_many_batched(channels).await
    } else {
        client.query_many(channels).await
    };
    Channels(
        channels
            .iter()
            .copied()
            .zip(outcomes.iter().map(channel_json))
            .collect(),
    )
}

/// Fill in the status, clock, and identification sections that were asked for.
async fn read_device(client: &mut UmbClient, cli: &Cli, report: &mut Report) {
    if cli.status {
        report.status = Some(match client.query_status().await {
            Ok(status) => json!({
                "ok": status.is_ok(),
                "raw": status.raw,
                "text": status.to_string(),
            }),
            Err(e) => error_json(&e),
        });
    }
    if cli.time {
        report.device_time = Some(match client.query_time().await {
            Ok(at) => json!(at.to_rfc3339_opts(SecondsFormat::Secs, true)),
            Err(e) => error_json(&e),
        });
    }
    if cli.info {
        report.info = Some(match client.query_device_info().await {
            Ok(info) => json!({
                "device_type": info.device_type.as_option(),
                "description": info.description.as_option(),
                "hardware_version": info.hardware_version.as_option(),
                "software_version": info.software_version.as_option(),
                "channel_count": info.channel_count.as_option(),
                "block_count": info.block_count.as_option(),
            }),
            Err(e) => error_json(&e),
        });
    }
}

/// Positions whose entry differs from the same position last time.
fn count_changed(previous: &Channels, current: &Channels) -> usize {
    current
        .0
        .iter()
        .enumerate()
        .filter(|&(i, entry)| previous.0.get(i) != Some(entry))
        .count()
}

async fn run(cli: Cli) -> Result<()> {
    let channels = umb::measurement_channels(&cli.channels);
    for &ignored in cli
        .channels
        .iter()
        .filter(|&c| !umb::MEASUREMENT_CHANNELS.contains(c))
    {
        tracing::warn!(channel = ignored, "Ignoring channel outside 100..=29999");
    }
    if channels.is_empty() && !cli.wants_device_queries() {
        bail!("nothing to read: give at least one channel in 100..=29999, or --status, --time, --info");
    }

    let mut client = cli
        .builder()
        .connect()
        .await
        .context("connecting to station")?;

    let cancel = client.cancellation_token();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, stopping");
                cancel.cancel();
            }
        }
    });

    let mut report = Report::new(read_channels(&mut client, &channels, cli.batched).await);
    read_device(&mut client, &cli, &mut report).await;

    if cli.poll {
        let mut previous = report.channels.clone();
        report.changed = Some(report.channels.len());
        report.print()?;

        while !cancel.is_cancelled() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            }
            let current = read_channels(&mut client, &channels, cli.batched).await;
            if cancel.is_cancelled() {
                break;
            }
            let changed = count_changed(&previous, &current);
            if changed > 0 {
                let mut line = Report::new(current.clone());
                line.changed = Some(changed);
                line.print()?;
                previous = current;
            }
        }
    } else if !cancel.is_cancelled() {
        report.print()?;
    }

    client.disconnect().await.context("closing connection")?;
    Ok(())
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    run(cli).await
}

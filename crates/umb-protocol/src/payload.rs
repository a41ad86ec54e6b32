//! Payload decoder.
//!
//! Turns the payload of a validated reply frame into a typed [`Response`].
//! Channel values are decoded from the type tag the device sends, never
//! from a caller-side assumption about the channel.
//!
//! # Payload layouts
//!
//! Every reply payload starts with the command status byte.
//!
//! | Command        | Reply payload                                         |
//! |----------------|-------------------------------------------------------|
//! | online data    | `status, channel (u16), type, value`                  |
//! | multi-channel  | `status, count, { sublen, status, channel, type, value }*` |
//! | status         | `status, device status code(s)`                       |
//! | time           | `status, seconds since epoch (u32)`                   |
//! | device info    | `status, option, data`                                |
//!
//! All multi-byte fields are little-endian.

use bytes::Buf;
use chrono::DateTime;
use umb_core::{
    Command, DataType, DeviceInfo, DeviceStatus, Error, Field, InfoOption, InvalidReason, Query,
    Response, Result, StatusCode, Value,
};

use crate::frame::Frame;

/// Decode the reply to a command that yields a single [`Response`].
///
/// Multi-channel replies go through [`decode_multi`] instead.
///
/// Errors:
/// - [`Error::DeviceStatus`] if a status or time query was refused
/// - [`Error::Decode`] if the payload cannot be interpreted
///
/// A refused channel reading is not an error; it decodes to
/// [`Value::ChannelInvalid`].
pub fn decode(frame: &Frame, command: &Command) -> Result<Response> {
    match command {
        Command::OnlineData { channel } => decode_channel_record(&frame.payload, *channel),
        Command::MultiChannel { .. } => Err(Error::Decode(
            "multi-channel replies decode to one response per channel".into(),
        )),
        Command::Status => decode_status(&frame.payload),
        Command::Time => decode_time(&frame.payload),
        Command::DeviceInfo(option) => Ok(decode_device_info(&frame.payload, *option)),
    }
}

/// Decode a multi-channel reply into one outcome per requested channel.
///
/// Sub-records are matched to `channels` by position, so duplicate channel
/// numbers are reported independently. A sub-record that is missing, cut
/// short, or answers a different channel only fails its own entry.
///
/// The outer error is reserved for replies that carry no usable records at
/// all: a refused command or a payload without a record count.
pub fn decode_multi(frame: &Frame, channels: &[u32]) -> Result<Vec<Result<Response>>> {
    let (status, mut rest) = split_status(&frame.payload)?;
    if !status.is_ok() {
        return Err(Error::DeviceStatus(status));
    }
    if rest.is_empty() {
        return Err(Error::Decode("multi-channel reply has no record count".into()));
    }
    let count = rest.get_u8() as usize;
    if count != channels.len() {
        tracing::debug!(
            requested = channels.len(),
            returned = count,
            "Multi-channel record count differs from request"
        );
    }

    let mut results = Vec::with_capacity(channels.len());
    for (index, &channel) in channels.iter().enumerate() {
        if index >= count || rest.is_empty() {
            results.push(Err(Error::Decode(format!(
                "no record for channel {channel}"
            ))));
            continue;
        }
        let sublen = rest[0] as usize;
        if rest.len() < 1 + sublen {
            results.push(Err(Error::Decode(format!(
                "record for channel {channel} needs {sublen} bytes, have {}",
                rest.len() - 1
            ))));
            rest = &[];
            continue;
        }
        let (record, tail) = rest[1..].split_at(sublen);
        rest = tail;
        results.push(decode_channel_record(record, channel));
    }

    Ok(results)
}

/// Split the leading command status byte off a payload.
fn split_status(payload: &[u8]) -> Result<(StatusCode, &[u8])> {
    match payload.split_first() {
        Some((&status, rest)) => Ok((StatusCode::from(status), rest)),
        None => Err(Error::Decode("empty payload, missing status byte".into())),
    }
}

/// Decode `status, channel, type, value` for `channel`.
fn decode_channel_record(record: &[u8], channel: u32) -> Result<Response> {
    let (status, mut rest) = split_status(record)?;
    if rest.len() < 2 {
        return Err(Error::Decode(format!(
            "reply for channel {channel} is missing the channel number"
        )));
    }
    let echoed = rest.get_u16_le() as u32;
    if echoed != channel {
        return Err(Error::Decode(format!(
            "reply is for channel {echoed}, expected {channel}"
        )));
    }

    if !status.is_ok() {
        return Ok(Response {
            query: Query::Channel(channel),
            data_type: rest.first().copied().and_then(DataType::from_tag),
            value: Value::ChannelInvalid(InvalidReason::Status(status)),
            raw: record.to_vec(),
        });
    }

    if rest.is_empty() {
        return Err(Error::Decode(format!(
            "reply for channel {channel} has no data type"
        )));
    }
    let tag = rest.get_u8();
    let data_type = DataType::from_tag(tag)
        .ok_or_else(|| Error::Decode(format!("unknown data type 0x{tag:02X}")))?;
    if rest.len() < data_type.width() {
        return Err(Error::Decode(format!(
            "{data_type} value needs {} bytes, have {}",
            data_type.width(),
            rest.len()
        )));
    }

    Ok(Response {
        query: Query::Channel(channel),
        data_type: Some(data_type),
        value: decode_value(data_type, &mut rest),
        raw: record.to_vec(),
    })
}

/// Read one value of `data_type`, mapping the reserved invalid pattern of
/// that type to [`Value::ChannelInvalid`].
///
/// The caller guarantees `buf` holds at least `data_type.width()` bytes.
fn decode_value(data_type: DataType, buf: &mut &[u8]) -> Value {
    let sentinel = Value::ChannelInvalid(InvalidReason::Sentinel);
    match data_type {
        DataType::U8 => match buf.get_u8() {
            u8::MAX => sentinel,
            v => Value::Unsigned(v as u64),
        },
        DataType::I8 => match buf.get_i8() {
            i8::MIN => sentinel,
            v => Value::Signed(v as i64),
        },
        DataType::U16 => match buf.get_u16_le() {
            u16::MAX => sentinel,
            v => Value::Unsigned(v as u64),
        },
        DataType::I16 => match buf.get_i16_le() {
            i16::MIN => sentinel,
            v => Value::Signed(v as i64),
        },
        DataType::U32 => match buf.get_u32_le() {
            u32::MAX => sentinel,
            v => Value::Unsigned(v as u64),
        },
        DataType::I32 => match buf.get_i32_le() {
            i32::MIN => sentinel,
            v => Value::Signed(v as i64),
        },
        DataType::F32 => float_value(buf.get_f32_le() as f64),
        DataType::F64 => float_value(buf.get_f64_le()),
    }
}

fn float_value(v: f64) -> Value {
    if v.is_finite() {
        Value::Float(v)
    } else {
        Value::ChannelInvalid(InvalidReason::Sentinel)
    }
}

fn decode_status(payload: &[u8]) -> Result<Response> {
    let (status, codes) = split_status(payload)?;
    if !status.is_ok() {
        return Err(Error::DeviceStatus(status));
    }
    if codes.is_empty() {
        return Err(Error::Decode("status reply carries no device status".into()));
    }

    let raw = codes
        .iter()
        .take(4)
        .rev()
        .fold(0u32, |acc, &b| (acc << 8) | b as u32);
    let device_status = DeviceStatus {
        codes: codes.iter().map(|&b| StatusCode::from(b)).collect(),
        raw,
    };

    Ok(Response {
        query: Query::Status,
        data_type: None,
        value: Value::Status(device_status),
        raw: payload.to_vec(),
    })
}

fn decode_time(payload: &[u8]) -> Result<Response> {
    let (status, mut rest) = split_status(payload)?;
    if !status.is_ok() {
        return Err(Error::DeviceStatus(status));
    }
    if rest.len() < 4 {
        return Err(Error::Decode(format!(
            "time reply needs 4 bytes, have {}",
            rest.len()
        )));
    }

    let seconds = rest.get_u32_le();
    let timestamp = DateTime::from_timestamp(seconds as i64, 0)
        .ok_or_else(|| Error::Decode(format!("timestamp {seconds} out of range")))?;

    Ok(Response {
        query: Query::Time,
        data_type: None,
        value: Value::Time(timestamp),
        raw: payload.to_vec(),
    })
}

/// Best-effort device information decode. Never fails: anything that does
/// not parse is left [`Field::Unavailable`].
fn decode_device_info(payload: &[u8], option: InfoOption) -> Response {
    let info = parse_device_info(payload, option).unwrap_or_default();
    Response {
        query: Query::DeviceInfo(option),
        data_type: None,
        value: Value::Info(info),
        raw: payload.to_vec(),
    }
}

fn parse_device_info(payload: &[u8], option: InfoOption) -> Option<DeviceInfo> {
    let (&status, rest) = payload.split_first()?;
    if status != 0 {
        tracing::debug!(
            option = option.code(),
            status = %StatusCode::from(status),
            "Device info option not supported"
        );
        return None;
    }
    let (&echoed, mut data) = rest.split_first()?;
    if echoed != option.code() {
        return None;
    }

    let mut info = DeviceInfo::default();
    match option {
        InfoOption::Identification => {
            if data.len() >= 2 {
                info.device_type = Field::Available(data.get_u16_le());
            }
        }
        InfoOption::Description => {
            let text = data.split(|&b| b == 0).next().unwrap_or_default();
            if !text.is_empty() && text.is_ascii() {
                info.description =
                    Field::Available(String::from_utf8_lossy(text).trim().to_string());
            }
        }
        InfoOption::Versions => {
            info.hardware_version = data.first().copied().into();
            info.software_version = data.get(1).copied().into();
        }
        InfoOption::ChannelCount => {
            if data.len() >= 2 {
                info.channel_count = Field::Available(data.get_u16_le());
                info.block_count = data.first().copied().into();
            }
        }
    }
    Some(info)
}

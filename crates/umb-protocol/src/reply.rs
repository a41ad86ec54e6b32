//! Device-side reply builders.
//!
//! Constructs the frames a UMB station sends back to the controller. The
//! client never needs these; they exist for device simulators, mock
//! stations in tests, and the demos.
//!
//! # Example
//!
//! ```
//! use umb_core::Address;
//! use umb_protocol::frame::encode_frame;
//! use umb_protocol::reply::{self, Reading};
//!
//! let station = Address::from_raw(0x7001);
//! let frame = reply::online_data(station, 100, &Reading::F32(21.5));
//! let bytes = encode_frame(&frame).unwrap();
//! assert_eq!(bytes.len(), 22);
//! ```

use bytes::{BufMut, BytesMut};
use chrono::{DateTime, Utc};
use umb_core::{Address, DataType, InfoOption, StatusCode};

use crate::commands::{
    CMD_DEVICE_INFO, CMD_MULTI_CHANNEL, CMD_ONLINE_DATA, CMD_READ_TIME, CMD_STATUS,
    COMMAND_VERSION,
};
use crate::frame::Frame;

/// One channel value as a device reports it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    F32(f32),
    F64(f64),
    /// No value; the channel status byte carries the reason.
    Failed(StatusCode),
}

impl Reading {
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Reading::U8(_) => Some(DataType::U8),
            Reading::I8(_) => Some(DataType::I8),
            Reading::U16(_) => Some(DataType::U16),
            Reading::I16(_) => Some(DataType::I16),
            Reading::U32(_) => Some(DataType::U32),
            Reading::I32(_) => Some(DataType::I32),
            Reading::F32(_) => Some(DataType::F32),
            Reading::F64(_) => Some(DataType::F64),
            Reading::Failed(_) => None,
        }
    }

    /// `status, channel, type, value` as carried in online data replies.
    fn put_record(&self, channel: u16, buf: &mut BytesMut) {
        let status = match self {
            Reading::Failed(code) => code.code(),
            _ => StatusCode::Ok.code(),
        };
        buf.put_u8(status);
        buf.put_u16_le(channel);
        if let Some(data_type) = self.data_type() {
            buf.put_u8(data_type.tag());
        }
        match *self {
            Reading::U8(v) => buf.put_u8(v),
            Reading::I8(v) => buf.put_i8(v),
            Reading::U16(v) => buf.put_u16_le(v),
            Reading::I16(v) => buf.put_i16_le(v),
            Reading::U32(v) => buf.put_u32_le(v),
            Reading::I32(v) => buf.put_i32_le(v),
            Reading::F32(v) => buf.put_f32_le(v),
            Reading::F64(v) => buf.put_f64_le(v),
            Reading::Failed(_) => {}
        }
    }
}

fn reply(station: Address, cmd: u8, payload: BytesMut) -> Frame {
    Frame {
        to: Address::CONTROLLER,
        from: station,
        cmd,
        verc: COMMAND_VERSION,
        payload: payload.to_vec(),
    }
}

/// Reply to an online data request.
pub fn online_data(station: Address, channel: u16, reading: &Reading) -> Frame {
    let mut payload = BytesMut::new();
    reading.put_record(channel, &mut payload);
    reply(station, CMD_ONLINE_DATA, payload)
}

/// Reply to a multi-channel request, one record per entry in order.
pub fn multi_channel(station: Address, readings: &[(u16, Reading)]) -> Frame {
    let mut payload = BytesMut::new();
    payload.put_u8(StatusCode::Ok.code());
    payload.put_u8(readings.len() as u8);
    for (channel, reading) in readings {
        let mut record = BytesMut::new();
        reading.put_record(*channel, &mut record);
        payload.put_u8(record.len() as u8);
        payload.put_slice(&record);
    }
    reply(station, CMD_MULTI_CHANNEL, payload)
}

/// Reply to a status request reporting `codes`.
pub fn status(station: Address, codes: &[StatusCode]) -> Frame {
    let mut payload = BytesMut::new();
    payload.put_u8(StatusCode::Ok.code());
    for code in codes {
        payload.put_u8(code.code());
    }
    reply(station, CMD_STATUS, payload)
}

/// Reply to a time request with the device clock at `at`.
///
/// The wire field holds whole seconds; sub-second precision is dropped and
/// times outside the `u32` range saturate.
pub fn time(station: Address, at: DateTime<Utc>) -> Frame {
    let seconds = at.timestamp().clamp(0, u32::MAX as i64) as u32;
    let mut payload = BytesMut::new();
    payload.put_u8(StatusCode::Ok.code());
    payload.put_u32_le(seconds);
    reply(station, CMD_READ_TIME, payload)
}

/// Reply to a device information request with raw option `data`.
pub fn device_info(station: Address, option: InfoOption, data: &[u8]) -> Frame {
    let mut payload = BytesMut::new();
    payload.put_u8(StatusCode::Ok.code());
    payload.put_u8(option.code());
    payload.put_slice(data);
    reply(station, CMD_DEVICE_INFO, payload)
}

/// A bare refusal: the command status byte and nothing else.
pub fn refused(station: Address, cmd: u8, code: StatusCode) -> Frame {
    let mut payload = BytesMut::new();
    payload.put_u8(code.code());
    reply(station, cmd, payload)
}

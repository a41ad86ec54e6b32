//! UMB command builders and request parsing.
//!
//! Maps each [`Command`] to its command code and payload layout, builds
//! request frames, and decides whether a received frame answers a given
//! request. Everything here is pure; the session performs the I/O.

use bytes::{Buf, BufMut, BytesMut};
use umb_core::{Address, Command, Error, InfoOption, Result};

use crate::frame::Frame;

// ---------------------------------------------------------------
// Command codes
// ---------------------------------------------------------------

/// Online data request for one channel.
pub const CMD_ONLINE_DATA: u8 = 0x23;

/// Device status request.
pub const CMD_STATUS: u8 = 0x26;

/// Read the device clock.
pub const CMD_READ_TIME: u8 = 0x28;

/// Device information request.
pub const CMD_DEVICE_INFO: u8 = 0x2D;

/// Online data request for several channels in one frame.
pub const CMD_MULTI_CHANNEL: u8 = 0x2F;

/// Command version used for every supported command.
pub const COMMAND_VERSION: u8 = 0x10;

/// Most channels one multi-channel request may carry.
pub const MAX_MULTI_CHANNELS: usize = 20;

/// Command code for a command.
pub fn command_code(command: &Command) -> u8 {
    match command {
        Command::OnlineData { .. } => CMD_ONLINE_DATA,
        Command::MultiChannel { .. } => CMD_MULTI_CHANNEL,
        Command::Status => CMD_STATUS,
        Command::Time => CMD_READ_TIME,
        Command::DeviceInfo(_) => CMD_DEVICE_INFO,
    }
}

fn channel_number(channel: u32) -> Result<u16> {
    u16::try_from(channel).map_err(|_| {
        Error::Encoding(format!(
            "channel {channel} out of range 0..={}",
            u16::MAX
        ))
    })
}

/// Build the request frame for `command` addressed to `to`.
///
/// Fails with [`Error::Encoding`] for channel numbers that do not fit in
/// 16 bits and for empty or oversized multi-channel lists.
pub fn build_request(command: &Command, to: Address) -> Result<Frame> {
    let mut payload = BytesMut::new();
    match command {
        Command::OnlineData { channel } => {
            payload.put_u16_le(channel_number(*channel)?);
        }
        Command::MultiChannel { channels } => {
            if channels.is_empty() {
                return Err(Error::Encoding(
                    "multi-channel request needs at least one channel".into(),
                ));
            }
            if channels.len() > MAX_MULTI_CHANNELS {
                return Err(Error::Encoding(format!(
                    "{} channels requested, at most {MAX_MULTI_CHANNELS} per frame",
                    channels.len()
                )));
            }
            payload.put_u8(channels.len() as u8);
            for &channel in channels {
                payload.put_u16_le(channel_number(channel)?);
            }
        }
        Command::Status | Command::Time => {}
        Command::DeviceInfo(option) => payload.put_u8(option.code()),
    }

    Ok(Frame {
        to,
        from: Address::CONTROLLER,
        cmd: command_code(command),
        verc: COMMAND_VERSION,
        payload: payload.to_vec(),
    })
}

/// Recover the command a request frame encodes.
///
/// This is the inverse of [`build_request`]; it is what a device (or a
/// device simulator) does with an incoming frame.
pub fn parse_request(frame: &Frame) -> Result<Command> {
    let mut payload = frame.payload.as_slice();
    let short = || Error::Decode(format!("request 0x{:02X} payload too short", frame.cmd));

    match frame.cmd {
        CMD_ONLINE_DATA => {
            if payload.remaining() < 2 {
                return Err(short());
            }
            Ok(Command::OnlineData {
                channel: payload.get_u16_le() as u32,
            })
        }
        CMD_MULTI_CHANNEL => {
            if payload.remaining() < 1 {
                return Err(short());
            }
            let count = payload.get_u8() as usize;
            if payload.remaining() < count * 2 {
                return Err(short());
            }
            let channels = (0..count).map(|_| payload.get_u16_le() as u32).collect();
            Ok(Command::MultiChannel { channels })
        }
        CMD_STATUS => Ok(Command::Status),
        CMD_READ_TIME => Ok(Command::Time),
        CMD_DEVICE_INFO => {
            if payload.remaining() < 1 {
                return Err(short());
            }
            let code = payload.get_u8();
            InfoOption::from_code(code)
                .map(Command::DeviceInfo)
                .ok_or_else(|| Error::Decode(format!("unknown info option 0x{code:02X}")))
        }
        other => Err(Error::Decode(format!("unsupported command 0x{other:02X}"))),
    }
}

/// Whether `frame` is the device's answer to `request`.
///
/// Command, version and both addresses must mirror the request. The echoed
/// channel, channel list or option must match too, so a late answer to an
/// earlier request is not mistaken for the current one. Frames whose
/// payload is too short to carry the echo are left for the payload decoder
/// to reject.
pub fn is_reply_to(frame: &Frame, request: &Frame) -> bool {
    if frame.cmd != request.cmd
        || frame.verc != request.verc
        || frame.from != request.to
        || frame.to != request.from
    {
        return false;
    }

    match request.cmd {
        // Reply: status, channel lo, channel hi, ...
        CMD_ONLINE_DATA if frame.payload.len() >= 3 => frame.payload[1..3] == request.payload[..2],
        // Reply: status, option, ... (option only echoed on success)
        CMD_DEVICE_INFO if frame.payload.len() >= 2 && frame.payload[0] == 0 => {
            frame.payload[1] == request.payload[0]
        }
        CMD_MULTI_CHANNEL if frame.payload.first() == Some(&0) => {
            multi_records_match(&frame.payload, &request.payload)
        }
        _ => true,
    }
}

/// Every complete record of a multi-channel reply echoes the channel
/// requested at its position, and there are no more records than channels.
///
/// Missing or cut-off records are not held against the reply; the decoder
/// fails those channels individually.
fn multi_records_match(reply: &[u8], request: &[u8]) -> bool {
    // Reply: status, count, then per record: length, status, channel lo, channel hi, ...
    // Request: count, then channel lo, channel hi per channel.
    let (Some(&count), Some(&requested)) = (reply.get(1), request.first()) else {
        return true;
    };
    if count > requested {
        return false;
    }

    let mut records = &reply[2..];
    let mut wanted = request[1..].chunks_exact(2);
    for _ in 0..count {
        let (Some(&len), Some(expected)) = (records.first(), wanted.next()) else {
            break;
        };
        let len = len as usize;
        if records.len() < 1 + len {
            break;
        }
        let record = &records[1..1 + len];
        if record.len() >= 3 && &record[1..3] != expected {
            return false;
        }
        records = &records[1 + len..];
    }
    true
}

//! UMB frame encoder/decoder.
//!
//! UMB uses binary frames on a half-duplex bus (RS485) or tunnelled over
//! TCP. This module handles the pure byte-level encoding and validation of
//! frames and the CRC that protects them.
//!
//! # Frame format
//!
//! ```text
//! SOH VER <to lo> <to hi> <from lo> <from hi> LEN STX CMD VERC [payload...] ETX <crc lo> <crc hi> EOT
//! ```
//!
//! - `SOH` (`0x01`) start of header, `VER` (`0x10`) header version
//! - `to` / `from`: 16-bit little-endian addresses (class in the high nibble)
//! - `LEN`: byte count of `CMD`, `VERC` and the payload
//! - `STX` (`0x02`) start of text, `ETX` (`0x03`) end of text
//! - CRC-16 over `SOH..=ETX`, little-endian
//! - `EOT` (`0x04`) end of transmission, outside the checksum

use bytes::{Buf, BufMut, BytesMut};
use umb_core::{Address, Error, Result};

/// Start of header.
pub const SOH: u8 = 0x01;

/// Start of text, precedes the command byte.
pub const STX: u8 = 0x02;

/// End of text, last byte covered by the checksum.
pub const ETX: u8 = 0x03;

/// End of transmission.
pub const EOT: u8 = 0x04;

/// Header version byte.
pub const HEADER_VERSION: u8 = 0x10;

/// Bytes from `SOH` through the `LEN` field.
pub const HEADER_LEN: usize = 7;

/// Framing bytes around the payload: header, `STX`, `CMD`, `VERC`, `ETX`,
/// CRC and `EOT`.
pub const FRAME_OVERHEAD: usize = 14;

/// Largest payload the one-byte length field can describe.
pub const MAX_PAYLOAD: usize = u8::MAX as usize - 2;

/// A parsed UMB frame.
///
/// The same structure represents requests from the controller and
/// responses from a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Destination address.
    pub to: Address,
    /// Source address.
    pub from: Address,
    /// Command byte.
    pub cmd: u8,
    /// Command version byte.
    pub verc: u8,
    /// Payload bytes following `VERC` (may be empty).
    pub payload: Vec<u8>,
}

impl Frame {
    /// Total encoded size of this frame.
    pub fn wire_len(&self) -> usize {
        FRAME_OVERHEAD + self.payload.len()
    }
}

/// Compute the UMB CRC-16 over `data`.
///
/// Reflected CCITT polynomial (`0x8408`), initial value `0xFFFF`, no final
/// XOR.
///
/// # Example
///
/// ```
/// use umb_protocol::frame::crc16;
///
/// assert_eq!(crc16(b"123456789"), 0x6F91);
/// ```
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0xFFFF, |crc, &byte| crc16_step(crc, byte))
}

fn crc16_step(mut crc: u16, mut byte: u8) -> u16 {
    for _ in 0..8 {
        let mix = (crc ^ byte as u16) & 0x0001;
        crc >>= 1;
        if mix != 0 {
            crc ^= 0x8408;
        }
        byte >>= 1;
    }
    crc
}

/// Encode a frame into raw bytes ready for transmission.
///
/// Fails with [`Error::Encoding`] if the payload does not fit the one-byte
/// length field.
///
/// # Example
///
/// ```
/// use umb_core::Address;
/// use umb_protocol::frame::{encode_frame, Frame};
///
/// // Status request from the controller to weather station 1
/// let frame = Frame {
///     to: Address::from_raw(0x7001),
///     from: Address::CONTROLLER,
///     cmd: 0x26,
///     verc: 0x10,
///     payload: vec![],
/// };
/// let bytes = encode_frame(&frame).unwrap();
/// assert_eq!(
///     bytes,
///     vec![0x01, 0x10, 0x01, 0x70, 0x01, 0xF0, 0x02, 0x02, 0x26, 0x10, 0x03, 0x0C, 0xB0, 0x04]
/// );
/// ```
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>> {
    if frame.payload.len() > MAX_PAYLOAD {
        return Err(Error::Encoding(format!(
            "payload of {} bytes exceeds the {MAX_PAYLOAD}-byte frame limit",
            frame.payload.len()
        )));
    }

    let mut buf = BytesMut::with_capacity(frame.wire_len());
    buf.put_u8(SOH);
    buf.put_u8(HEADER_VERSION);
    buf.put_u16_le(frame.to.raw());
    buf.put_u16_le(frame.from.raw());
    buf.put_u8((frame.payload.len() + 2) as u8);
    buf.put_u8(STX);
    buf.put_u8(frame.cmd);
    buf.put_u8(frame.verc);
    buf.put_slice(&frame.payload);
    buf.put_u8(ETX);
    let crc = crc16(&buf);
    buf.put_u16_le(crc);
    buf.put_u8(EOT);
    Ok(buf.to_vec())
}

/// Position of the first start-of-header byte in `buf`.
pub fn find_start(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == SOH)
}

/// Decode and validate one frame from the start of a byte buffer.
///
/// Bytes before the first `SOH` are skipped. On success returns the frame
/// and the number of bytes consumed from `buf` (skipped bytes included).
///
/// Errors:
/// - [`Error::Truncated`] if the buffer ends before the frame does
/// - [`Error::ChecksumMismatch`] if the CRC does not match
/// - [`Error::MalformedFrame`] if there is no `SOH`, the length field is
///   impossible, or a marker byte is wrong
///
/// The checksum is verified before the markers it covers, so corruption
/// inside the checksummed span is always reported as a checksum mismatch.
pub fn decode_frame(buf: &[u8]) -> Result<(Frame, usize)> {
    if buf.is_empty() {
        return Err(Error::Truncated {
            needed: HEADER_LEN,
            available: 0,
        });
    }

    let start = find_start(buf)
        .ok_or_else(|| Error::MalformedFrame("no start-of-header byte".into()))?;
    let data = &buf[start..];

    if data.len() < HEADER_LEN {
        return Err(Error::Truncated {
            needed: HEADER_LEN,
            available: data.len(),
        });
    }

    let len = data[6] as usize;
    if len < 2 {
        return Err(Error::MalformedFrame(format!(
            "length field {len} is shorter than command and version"
        )));
    }

    let total = len + FRAME_OVERHEAD - 2;
    if data.len() < total {
        return Err(Error::Truncated {
            needed: total,
            available: data.len(),
        });
    }
    let raw = &data[..total];

    let expected = crc16(&raw[..total - 3]);
    let received = (&raw[total - 3..total - 1]).get_u16_le();
    if expected != received {
        return Err(Error::ChecksumMismatch { expected, received });
    }

    if raw[1] != HEADER_VERSION {
        return Err(Error::MalformedFrame(format!(
            "unsupported header version 0x{:02X}",
            raw[1]
        )));
    }
    if raw[7] != STX {
        return Err(Error::MalformedFrame("missing STX".into()));
    }
    if raw[total - 4] != ETX {
        return Err(Error::MalformedFrame("missing ETX".into()));
    }
    if raw[total - 1] != EOT {
        return Err(Error::MalformedFrame("missing EOT".into()));
    }

    let mut header = &raw[2..6];
    let to = Address::from_raw(header.get_u16_le());
    let from = Address::from_raw(header.get_u16_le());

    let frame = Frame {
        to,
        from,
        cmd: raw[8],
        verc: raw[9],
        payload: raw[10..total - 4].to_vec(),
    };

    Ok((frame, start + total))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Online data request for channel 100 to station 0x7001, as captured
    /// from the wire.
    const ONLINE_100: [u8; 16] = [
        0x01, 0x10, 0x01, 0x70, 0x01, 0xF0, 0x04, 0x02, 0x23, 0x10, 0x64, 0x00, 0x03, 0x61, 0xD9,
        0x04,
    ];

    /// Reply to the request above: status OK, channel 100, FLOAT 21.5.
    const REPLY_100: [u8; 22] = [
        0x01, 0x10, 0x01, 0xF0, 0x01, 0x70, 0x0A, 0x02, 0x23, 0x10, 0x00, 0x64, 0x00, 0x16, 0x00,
        0x00, 0xAC, 0x41, 0x03, 0x91, 0x61, 0x04,
    ];

    fn station() -> Address {
        Address::from_raw(0x7001)
    }

    // ---------------------------------------------------------------
    // CRC
    // ---------------------------------------------------------------

    #[test]
    fn crc_check_value() {
        assert_eq!(crc16(b"123456789"), 0x6F91);
    }

    #[test]
    fn crc_of_empty_input_is_initial_value() {
        assert_eq!(crc16(&[]), 0xFFFF);
    }

    #[test]
    fn crc_matches_captured_frame() {
        assert_eq!(crc16(&ONLINE_100[..13]), 0xD961);
    }

    // ---------------------------------------------------------------
    // Encoding
    // ---------------------------------------------------------------

    #[test]
    fn encode_online_data_request() {
        let frame = Frame {
            to: station(),
            from: Address::CONTROLLER,
            cmd: 0x23,
            verc: 0x10,
            payload: vec![0x64, 0x00],
        };
        assert_eq!(encode_frame(&frame).unwrap(), ONLINE_100.to_vec());
        assert_eq!(frame.wire_len(), ONLINE_100.len());
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let frame = Frame {
            to: station(),
            from: Address::CONTROLLER,
            cmd: 0x2F,
            verc: 0x10,
            payload: vec![0; MAX_PAYLOAD + 1],
        };
        assert!(matches!(encode_frame(&frame), Err(Error::Encoding(_))));
    }

    #[test]
    fn encode_accepts_largest_payload() {
        let frame = Frame {
            to: station(),
            from: Address::CONTROLLER,
            cmd: 0x2F,
            verc: 0x10,
            payload: vec![0xAA; MAX_PAYLOAD],
        };
        let bytes = encode_frame(&frame).unwrap();
        assert_eq!(bytes[6], 0xFF);
        let (decoded, consumed) = decode_frame(&bytes).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(consumed, bytes.len());
    }

    // ---------------------------------------------------------------
    // Decoding
    // ---------------------------------------------------------------

    #[test]
    fn decode_captured_reply() {
        let (frame, consumed) = decode_frame(&REPLY_100).unwrap();
        assert_eq!(consumed, REPLY_100.len());
        assert_eq!(frame.to, Address::CONTROLLER);
        assert_eq!(frame.from, station());
        assert_eq!(frame.cmd, 0x23);
        assert_eq!(frame.verc, 0x10);
        assert_eq!(
            frame.payload,
            vec![0x00, 0x64, 0x00, 0x16, 0x00, 0x00, 0xAC, 0x41]
        );
    }

    #[test]
    fn decode_skips_leading_noise() {
        let mut buf = vec![0xFF, 0x00, 0x7E];
        buf.extend_from_slice(&REPLY_100);
        let (frame, consumed) = decode_frame(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(frame.cmd, 0x23);
    }

    #[test]
    fn decode_leaves_trailing_bytes() {
        let mut buf = REPLY_100.to_vec();
        buf.extend_from_slice(&ONLINE_100[..4]);
        let (_, consumed) = decode_frame(&buf).unwrap();
        assert_eq!(consumed, REPLY_100.len());
    }

    #[test]
    fn decode_without_start_is_malformed() {
        let result = decode_frame(&[0x10, 0x02, 0x03]);
        assert!(matches!(result, Err(Error::MalformedFrame(_))));
    }

    #[test]
    fn every_strict_prefix_is_truncated() {
        for n in 0..REPLY_100.len() {
            let result = decode_frame(&REPLY_100[..n]);
            assert!(
                matches!(result, Err(Error::Truncated { .. })),
                "prefix of {n} bytes gave {result:?}"
            );
        }
    }

    #[test]
    fn single_bit_flip_in_checksummed_span_is_checksum_mismatch() {
        // Everything after SOH up to the CRC bytes, except the length
        // field, which moves the frame boundary instead.
        for index in 1..REPLY_100.len() - 1 {
            if index == 6 {
                continue;
            }
            for bit in 0..8 {
                let mut corrupted = REPLY_100;
                corrupted[index] ^= 1 << bit;
                let result = decode_frame(&corrupted);
                assert!(
                    matches!(result, Err(Error::ChecksumMismatch { .. })),
                    "flip of bit {bit} at byte {index} gave {result:?}"
                );
            }
        }
    }

    #[test]
    fn bit_flips_outside_checksum_are_still_rejected() {
        for index in [0, 6, REPLY_100.len() - 1] {
            for bit in 0..8 {
                let mut corrupted = REPLY_100;
                corrupted[index] ^= 1 << bit;
                assert!(
                    decode_frame(&corrupted).is_err(),
                    "flip of bit {bit} at byte {index} decoded as valid"
                );
            }
        }
    }

    #[test]
    fn wrong_end_marker_is_malformed() {
        let mut corrupted = REPLY_100;
        let last = corrupted.len() - 1;
        corrupted[last] = 0x05;
        assert!(matches!(
            decode_frame(&corrupted),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn wrong_header_version_with_valid_crc_is_malformed() {
        let frame = Frame {
            to: Address::CONTROLLER,
            from: station(),
            cmd: 0x26,
            verc: 0x10,
            payload: vec![0x00, 0x00],
        };
        let mut bytes = encode_frame(&frame).unwrap();
        bytes[1] = 0x20;
        let end = bytes.len() - 3;
        let crc = crc16(&bytes[..end]);
        bytes[end..end + 2].copy_from_slice(&crc.to_le_bytes());
        assert!(matches!(
            decode_frame(&bytes),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn impossible_length_field_is_malformed() {
        let mut bytes = ONLINE_100;
        bytes[6] = 0x01;
        assert!(matches!(
            decode_frame(&bytes),
            Err(Error::MalformedFrame(_))
        ));
    }
}

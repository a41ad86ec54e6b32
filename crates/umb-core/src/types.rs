//! Core types used throughout the UMB client.
//!
//! Commands are immutable value objects built per call. Responses are
//! constructed once per completed exchange and owned by the caller.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::status::StatusCode;

/// A 16-bit UMB bus address.
///
/// The high nibble is the device class, the low 12 bits the device id.
/// On the wire the address is transmitted little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(u16);

impl Address {
    /// Device class of the controlling PC / master.
    pub const CLASS_MASTER: u8 = 0x0F;

    /// Device class of compact weather stations (WS family).
    pub const CLASS_WEATHER_STATION: u8 = 0x07;

    /// The address this client transmits from (class 15, id 1).
    pub const CONTROLLER: Address = Address(0xF001);

    /// Build an address from a device class (0..=15) and id (0..=4095).
    pub fn new(class: u8, id: u16) -> Result<Self> {
        if class > 0x0F {
            return Err(Error::Encoding(format!(
                "device class {class} out of range 0..=15"
            )));
        }
        if id > 0x0FFF {
            return Err(Error::Encoding(format!(
                "device id {id} out of range 0..=4095"
            )));
        }
        Ok(Address(((class as u16) << 12) | id))
    }

    /// Address of a weather station with the given device id.
    pub fn weather_station(id: u16) -> Result<Self> {
        Self::new(Self::CLASS_WEATHER_STATION, id)
    }

    /// Wrap a raw 16-bit address word.
    pub fn from_raw(raw: u16) -> Self {
        Address(raw)
    }

    pub fn raw(&self) -> u16 {
        self.0
    }

    pub fn class(&self) -> u8 {
        (self.0 >> 12) as u8
    }

    pub fn id(&self) -> u16 {
        self.0 & 0x0FFF
    }
}

impl Default for Address {
    fn default() -> Self {
        Address(0x7001)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// Data type tag carried in front of every measurement value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
}

impl DataType {
    /// Wire tag for this type.
    pub fn tag(&self) -> u8 {
        match self {
            DataType::U8 => 0x10,
            DataType::I8 => 0x11,
            DataType::U16 => 0x12,
            DataType::I16 => 0x13,
            DataType::U32 => 0x14,
            DataType::I32 => 0x15,
            DataType::F32 => 0x16,
            DataType::F64 => 0x17,
        }
    }

    /// Look up a type from its wire tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x10 => Some(DataType::U8),
            0x11 => Some(DataType::I8),
            0x12 => Some(DataType::U16),
            0x13 => Some(DataType::I16),
            0x14 => Some(DataType::U32),
            0x15 => Some(DataType::I32),
            0x16 => Some(DataType::F32),
            0x17 => Some(DataType::F64),
            _ => None,
        }
    }

    /// Encoded width of a value of this type, in bytes.
    pub fn width(&self) -> usize {
        match self {
            DataType::U8 | DataType::I8 => 1,
            DataType::U16 | DataType::I16 => 2,
            DataType::U32 | DataType::I32 | DataType::F32 => 4,
            DataType::F64 => 8,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataType::U8 => "UNSIGNED_CHAR",
            DataType::I8 => "SIGNED_CHAR",
            DataType::U16 => "UNSIGNED_SHORT",
            DataType::I16 => "SIGNED_SHORT",
            DataType::U32 => "UNSIGNED_LONG",
            DataType::I32 => "SIGNED_LONG",
            DataType::F32 => "FLOAT",
            DataType::F64 => "DOUBLE",
        };
        write!(f, "{s}")
    }
}

/// Sub-query of the device information command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InfoOption {
    /// Device type identification.
    Identification,
    /// Free-text device description.
    Description,
    /// Hardware and software version.
    Versions,
    /// Number of channels and channel blocks.
    ChannelCount,
}

impl InfoOption {
    pub const ALL: [InfoOption; 4] = [
        InfoOption::Identification,
        InfoOption::Description,
        InfoOption::Versions,
        InfoOption::ChannelCount,
    ];

    pub fn code(&self) -> u8 {
        match self {
            InfoOption::Identification => 0x10,
            InfoOption::Description => 0x11,
            InfoOption::Versions => 0x12,
            InfoOption::ChannelCount => 0x15,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x10 => Some(InfoOption::Identification),
            0x11 => Some(InfoOption::Description),
            0x12 => Some(InfoOption::Versions),
            0x15 => Some(InfoOption::ChannelCount),
            _ => None,
        }
    }
}

/// A request to a UMB device.
///
/// Channel numbers are validated when the command is encoded: anything
/// above `u16::MAX` is rejected with [`Error::Encoding`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Current value of one channel.
    OnlineData { channel: u32 },
    /// Current values of several channels in one frame. Duplicates are
    /// allowed and reported independently.
    MultiChannel { channels: Vec<u32> },
    /// Device status.
    Status,
    /// Device clock.
    Time,
    /// One device information record.
    DeviceInfo(InfoOption),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::OnlineData { channel } => write!(f, "online data (channel {channel})"),
            Command::MultiChannel { channels } => {
                write!(f, "multi-channel online data ({} channels)", channels.len())
            }
            Command::Status => write!(f, "status"),
            Command::Time => write!(f, "time"),
            Command::DeviceInfo(option) => write!(f, "device info (0x{:02X})", option.code()),
        }
    }
}

/// What a [`Response`] answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Query {
    Channel(u32),
    Status,
    Time,
    DeviceInfo(InfoOption),
}

/// Why a channel reading is not a usable number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    /// The device flagged the reading with a non-zero status.
    Status(StatusCode),
    /// The value field holds the reserved "no valid reading" pattern.
    Sentinel,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidReason::Status(status) => write!(f, "status {status}"),
            InvalidReason::Sentinel => write!(f, "reserved invalid value"),
        }
    }
}

/// Device status report.
///
/// `codes` holds every status code the device reported, `raw` the same
/// bytes as a little-endian integer for forward compatibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStatus {
    pub codes: Vec<StatusCode>,
    pub raw: u32,
}

impl DeviceStatus {
    /// `true` when every reported code is OK.
    pub fn is_ok(&self) -> bool {
        self.codes.iter().all(StatusCode::is_ok)
    }

    pub fn contains(&self, code: StatusCode) -> bool {
        self.codes.contains(&code)
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            return write!(f, "ok");
        }
        let mut first = true;
        for code in self.codes.iter().filter(|code| !code.is_ok()) {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{code}")?;
            first = false;
        }
        Ok(())
    }
}

/// A device information field that may not have been decodable.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Field<T> {
    Available(T),
    #[default]
    Unavailable,
}

impl<T> Field<T> {
    pub fn as_option(&self) -> Option<&T> {
        match self {
            Field::Available(value) => Some(value),
            Field::Unavailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Field::Available(_))
    }

    /// Keep `self` if available, otherwise take `other`.
    fn or(self, other: Field<T>) -> Field<T> {
        match self {
            Field::Available(_) => self,
            Field::Unavailable => other,
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Field::Available(v),
            None => Field::Unavailable,
        }
    }
}

impl<T: fmt::Display> fmt::Display for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Available(value) => write!(f, "{value}"),
            Field::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Best-effort device information.
///
/// The device information layout is not reliably implemented by every
/// device; fields that did not parse are [`Field::Unavailable`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceInfo {
    pub device_type: Field<u16>,
    pub description: Field<String>,
    pub hardware_version: Field<u8>,
    pub software_version: Field<u8>,
    pub channel_count: Field<u16>,
    pub block_count: Field<u8>,
}

impl DeviceInfo {
    /// Combine two partial records, preferring fields already present in `self`.
    pub fn merge(self, other: DeviceInfo) -> DeviceInfo {
        DeviceInfo {
            device_type: self.device_type.or(other.device_type),
            description: self.description.or(other.description),
            hardware_version: self.hardware_version.or(other.hardware_version),
            software_version: self.software_version.or(other.software_version),
            channel_count: self.channel_count.or(other.channel_count),
            block_count: self.block_count.or(other.block_count),
        }
    }
}

/// A decoded value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Float(f64),
    Unsigned(u64),
    Signed(i64),
    Status(DeviceStatus),
    /// The device's onboard clock. Not the sample time of any channel.
    Time(DateTime<Utc>),
    Info(DeviceInfo),
    /// The device reported no valid reading for the channel.
    ChannelInvalid(InvalidReason),
}

impl Value {
    /// Numeric readings as `f64`; `None` for everything else.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Unsigned(v) => Some(*v as f64),
            Value::Signed(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn is_channel_invalid(&self) -> bool {
        matches!(self, Value::ChannelInvalid(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Float(v) => write!(f, "{v}"),
            Value::Unsigned(v) => write!(f, "{v}"),
            Value::Signed(v) => write!(f, "{v}"),
            Value::Status(status) => write!(f, "status 0x{:X}", status.raw),
            Value::Time(ts) => write!(f, "{}", ts.format("%Y-%m-%dT%H:%M:%SZ")),
            Value::Info(info) => write!(f, "device type {}", info.device_type),
            Value::ChannelInvalid(reason) => write!(f, "invalid ({reason})"),
        }
    }
}

/// The decoded result of one completed exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub query: Query,
    /// Declared type of a channel value; `None` for non-channel queries
    /// and for readings the device flagged before sending a type.
    pub data_type: Option<DataType>,
    pub value: Value,
    /// Payload bytes the value was decoded from, kept for diagnostics.
    pub raw: Vec<u8>,
}

impl Response {
    /// The channel this response answers, if it is a channel reading.
    pub fn channel(&self) -> Option<u32> {
        match self.query {
            Query::Channel(channel) => Some(channel),
            _ => None,
        }
    }
}

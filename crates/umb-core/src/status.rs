//! UMB status codes.
//!
//! Every UMB response carries a status byte. The same code table is used
//! for command results, per-channel measurement status, and the device
//! status reported by the status query.

use std::fmt;

/// A UMB status code.
///
/// Codes not in the published table are preserved as [`StatusCode::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    UnknownCommand,
    InvalidParameter,
    InvalidHeader,
    InvalidCommandVersion,
    InvalidPassword,
    ReadError,
    WriteError,
    LengthTooGreat,
    InvalidAddress,
    InvalidChannel,
    NotPossibleInMode,
    UnknownCalibrationCommand,
    CalibrationError,
    Busy,
    Undervoltage,
    HardwareError,
    MeasurementError,
    InitError,
    OsError,
    DefaultConfigLoaded,
    CalibrationInvalid,
    ConfigCrcError,
    CalibrationCrcError,
    CalibrationStep1,
    CalibrationOk,
    ChannelDeactivated,
    /// Measured value above the valid range of the channel.
    ValueOverflow,
    /// Measured value below the valid range of the channel.
    ValueUnderflow,
    ChannelOverrange,
    ChannelUnderrange,
    DataError,
    MeasurementUnavailable,
    Other(u8),
}

impl StatusCode {
    /// The raw status byte.
    pub fn code(&self) -> u8 {
        match self {
            StatusCode::Ok => 0x00,
            StatusCode::UnknownCommand => 0x10,
            StatusCode::InvalidParameter => 0x11,
            StatusCode::InvalidHeader => 0x12,
            StatusCode::InvalidCommandVersion => 0x13,
            StatusCode::InvalidPassword => 0x14,
            StatusCode::ReadError => 0x20,
            StatusCode::WriteError => 0x21,
            StatusCode::LengthTooGreat => 0x22,
            StatusCode::InvalidAddress => 0x23,
            StatusCode::InvalidChannel => 0x24,
            StatusCode::NotPossibleInMode => 0x25,
            StatusCode::UnknownCalibrationCommand => 0x26,
            StatusCode::CalibrationError => 0x27,
            StatusCode::Busy => 0x28,
            StatusCode::Undervoltage => 0x29,
            StatusCode::HardwareError => 0x2A,
            StatusCode::MeasurementError => 0x2B,
            StatusCode::InitError => 0x2C,
            StatusCode::OsError => 0x2D,
            StatusCode::DefaultConfigLoaded => 0x30,
            StatusCode::CalibrationInvalid => 0x31,
            StatusCode::ConfigCrcError => 0x32,
            StatusCode::CalibrationCrcError => 0x33,
            StatusCode::CalibrationStep1 => 0x34,
            StatusCode::CalibrationOk => 0x35,
            StatusCode::ChannelDeactivated => 0x36,
            StatusCode::ValueOverflow => 0x50,
            StatusCode::ValueUnderflow => 0x51,
            StatusCode::ChannelOverrange => 0x52,
            StatusCode::ChannelUnderrange => 0x53,
            StatusCode::DataError => 0x54,
            StatusCode::MeasurementUnavailable => 0x55,
            StatusCode::Other(code) => *code,
        }
    }

    /// Returns `true` for the all-OK code.
    pub fn is_ok(&self) -> bool {
        *self == StatusCode::Ok
    }

    /// Human-readable description from the UMB status table.
    pub fn description(&self) -> &'static str {
        match self {
            StatusCode::Ok => "Command successful; no error; all OK",
            StatusCode::UnknownCommand => "Unknown command; not supported by this device",
            StatusCode::InvalidParameter => "Invalid parameter",
            StatusCode::InvalidHeader => "Invalid header version",
            StatusCode::InvalidCommandVersion => "Invalid version of the command",
            StatusCode::InvalidPassword => "Invalid password for command",
            StatusCode::ReadError => "Read error",
            StatusCode::WriteError => "Write error",
            StatusCode::LengthTooGreat => "Length too great",
            StatusCode::InvalidAddress => "Invalid address / storage location",
            StatusCode::InvalidChannel => "Invalid channel",
            StatusCode::NotPossibleInMode => "Command not possible in this mode",
            StatusCode::UnknownCalibrationCommand => "Unknown calibration command",
            StatusCode::CalibrationError => "Calibration error",
            StatusCode::Busy => "Device not ready; e.g. initialisation / calibration running",
            StatusCode::Undervoltage => "Undervoltage",
            StatusCode::HardwareError => "Hardware error",
            StatusCode::MeasurementError => "Measurement error",
            StatusCode::InitError => "Error on device initialization",
            StatusCode::OsError => "Error in operating system",
            StatusCode::DefaultConfigLoaded => {
                "Configuration error, default configuration was loaded"
            }
            StatusCode::CalibrationInvalid => {
                "Calibration error / the calibration is invalid, measurement not possible"
            }
            StatusCode::ConfigCrcError => {
                "CRC error on loading configuration; default configuration was loaded"
            }
            StatusCode::CalibrationCrcError => {
                "CRC error on loading calibration; measurement not possible"
            }
            StatusCode::CalibrationStep1 => "Calibration step 1",
            StatusCode::CalibrationOk => "Calibration OK",
            StatusCode::ChannelDeactivated => "Channel deactivated",
            StatusCode::ValueOverflow => "Measured value above the valid range",
            StatusCode::ValueUnderflow => "Measured value below the valid range",
            StatusCode::ChannelOverrange => "Measuring channel overrange",
            StatusCode::ChannelUnderrange => "Measuring channel underrange",
            StatusCode::DataError => "Data error in measurement data",
            StatusCode::MeasurementUnavailable => "Measurement not possible",
            StatusCode::Other(_) => "Unknown status code",
        }
    }
}

impl From<u8> for StatusCode {
    fn from(code: u8) -> Self {
        match code {
            0x00 => StatusCode::Ok,
            0x10 => StatusCode::UnknownCommand,
            0x11 => StatusCode::InvalidParameter,
            0x12 => StatusCode::InvalidHeader,
            0x13 => StatusCode::InvalidCommandVersion,
            0x14 => StatusCode::InvalidPassword,
            0x20 => StatusCode::ReadError,
            0x21 => StatusCode::WriteError,
            0x22 => StatusCode::LengthTooGreat,
            0x23 => StatusCode::InvalidAddress,
            0x24 => StatusCode::InvalidChannel,
            0x25 => StatusCode::NotPossibleInMode,
            0x26 => StatusCode::UnknownCalibrationCommand,
            0x27 => StatusCode::CalibrationError,
            0x28 => StatusCode::Busy,
            0x29 => StatusCode::Undervoltage,
            0x2A => StatusCode::HardwareError,
            0x2B => StatusCode::MeasurementError,
            0x2C => StatusCode::InitError,
            0x2D => StatusCode::OsError,
            0x30 => StatusCode::DefaultConfigLoaded,
            0x31 => StatusCode::CalibrationInvalid,
            0x32 => StatusCode::ConfigCrcError,
            0x33 => StatusCode::CalibrationCrcError,
            0x34 => StatusCode::CalibrationStep1,
            0x35 => StatusCode::CalibrationOk,
            0x36 => StatusCode::ChannelDeactivated,
            0x50 => StatusCode::ValueOverflow,
            0x51 => StatusCode::ValueUnderflow,
            0x52 => StatusCode::ChannelOverrange,
            0x53 => StatusCode::ChannelUnderrange,
            0x54 => StatusCode::DataError,
            0x55 => StatusCode::MeasurementUnavailable,
            other => StatusCode::Other(other),
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X} ({})", self.code(), self.description())
    }
}

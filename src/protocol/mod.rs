//! SmartREST wire format.
//!
//! Topics, template ids and renderers for every outbound line. Each
//! renderer formats exactly one line into a [`LineSink`]; the sink owns
//! the `\r\n` terminator and rejects lines that do not fit.
//!
//! | Template | Direction | Meaning                                  |
//! |----------|-----------|------------------------------------------|
//! | 100      | up        | create device                            |
//! | 113      | up        | configuration / capability summary       |
//! | 114      | up        | supported operations                     |
//! | 115      | up        | firmware name, version, url              |
//! | 117      | up        | required availability interval (minutes) |
//! | 212      | up        | battery level                            |
//! | 400      | up        | event                                    |
//! | 500      | up        | request pending operations               |
//! | 501-503  | up        | operation executing / failed / successful|
//! | 990-998  | up        | measurements (data stream)               |
//! | 1990-1998| up        | inventory mirror of the last measurement |
//! | 510      | down      | restart                                  |
//! | 511      | down      | command (`c8y_Command`)                  |
//! | 515      | down      | firmware update                          |
//! | 999      | down      | message                                  |
//! | 70       | down      | device credentials (registration)        |

pub mod command;

use core::fmt;

use crate::error::BufferError;
use command::OperationType;

// ───────────────────────────────────────────────────────────────
// Topics
// ───────────────────────────────────────────────────────────────

/// Asset stream: registration, acknowledgments, events.
pub const TOPIC_ASSET_STREAM: &str = "s/us";
/// Measurement stream (device-specific custom templates).
pub const TOPIC_DATA_STREAM: &str = "s/uc/XDK";
/// Standard operations (restart, command, firmware).
pub const TOPIC_STANDARD_OPERATIONS: &str = "s/ds";
/// Custom operations (messages).
pub const TOPIC_CUSTOM_OPERATIONS: &str = "s/dc/XDK";
/// Registration requests while waiting for credentials.
pub const TOPIC_REGISTRATION_UP: &str = "s/ucr";
/// Credentials issued by the platform.
pub const TOPIC_REGISTRATION_DOWN: &str = "s/dcr";

/// Every outbound line ends with this.
pub const LINE_END: &str = "\r\n";

/// Longest single line a renderer may produce, terminator included.
pub const MAX_LINE_LEN: usize = 256;

/// Required availability interval reported at registration.
pub const REQUIRED_INTERVAL_MINUTES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qos {
    AtMostOnce,
    AtLeastOnce,
}

// ───────────────────────────────────────────────────────────────
// Line sink
// ───────────────────────────────────────────────────────────────

/// Destination for rendered protocol lines.
pub trait LineSink {
    /// Append one line; the implementation adds [`LINE_END`].
    /// A line that does not fit is rejected whole.
    fn push_line(&mut self, line: fmt::Arguments<'_>) -> Result<(), BufferError>;
}

// ───────────────────────────────────────────────────────────────
// Asset stream renderers
// ───────────────────────────────────────────────────────────────

pub fn device_registration(out: &mut impl LineSink, device_id: &str) -> Result<(), BufferError> {
    out.push_line(format_args!("100,\"{device_id}\",c8y_XDKDevice"))
}

pub fn supported_operations(out: &mut impl LineSink) -> Result<(), BufferError> {
    out.push_line(format_args!(
        "114,{},{},{},{}",
        OperationType::Restart.name(),
        OperationType::Message.name(),
        OperationType::Command.name(),
        OperationType::Firmware.name(),
    ))
}

/// `summary` is the `KEY=VALUE` body, lines separated by `\n`.
pub fn capability_summary(out: &mut impl LineSink, summary: &str) -> Result<(), BufferError> {
    out.push_line(format_args!("113,\"{summary}\""))
}

pub fn required_interval(out: &mut impl LineSink, minutes: u32) -> Result<(), BufferError> {
    out.push_line(format_args!("117,{minutes}"))
}

pub fn firmware(out: &mut impl LineSink, name: &str, version: &str, url: &str) -> Result<(), BufferError> {
    out.push_line(format_args!("115,{name},{version},{url}"))
}

pub fn request_operations(out: &mut impl LineSink) -> Result<(), BufferError> {
    out.push_line(format_args!("500"))
}

pub fn ack_executing(out: &mut impl LineSink, op: OperationType) -> Result<(), BufferError> {
    out.push_line(format_args!("501,{}", op.name()))
}

pub fn ack_failed(out: &mut impl LineSink, op: OperationType, reason: &str) -> Result<(), BufferError> {
    out.push_line(format_args!("502,{},\"{reason}\"", op.name()))
}

pub fn ack_successful(out: &mut impl LineSink, op: OperationType) -> Result<(), BufferError> {
    out.push_line(format_args!("503,{}", op.name()))
}

pub fn event(out: &mut impl LineSink, event_type: &str, text: fmt::Arguments<'_>) -> Result<(), BufferError> {
    out.push_line(format_args!("400,{event_type},\"{text}\""))
}

pub fn battery(out: &mut impl LineSink, percent: u8) -> Result<(), BufferError> {
    out.push_line(format_args!("212,{percent}"))
}

/// Registration request while waiting for credentials: an empty line.
pub fn registration_request(out: &mut impl LineSink) -> Result<(), BufferError> {
    out.push_line(format_args!(""))
}

// ───────────────────────────────────────────────────────────────
// Measurements
// ───────────────────────────────────────────────────────────────

/// One measured quantity and its template id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Orientation,
    Accel,
    Gyro,
    Mag,
    Light,
    Humidity,
    Temperature,
    Pressure,
    Noise,
}

impl Channel {
    /// Measurement template id on the data stream.
    pub fn code(self) -> u16 {
        match self {
            Self::Orientation => 990,
            Self::Accel => 991,
            Self::Gyro => 992,
            Self::Mag => 993,
            Self::Light => 994,
            Self::Humidity => 995,
            Self::Temperature => 996,
            Self::Pressure => 997,
            Self::Noise => 998,
        }
    }

    /// Template id of the inventory mirror line.
    pub fn inventory_code(self) -> u16 {
        1000 + self.code()
    }
}

/// Formatted payload of a measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Vector(i32, i32, i32),
    Scalar(u32),
    /// Printed with two decimals.
    Fixed(f32),
    /// Printed with two decimals each.
    FixedVector(f32, f32, f32),
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Vector(x, y, z) => write!(f, "{x},{y},{z}"),
            Self::Scalar(v) => write!(f, "{v}"),
            Self::Fixed(v) => write!(f, "{v:.2}"),
            Self::FixedVector(x, y, z) => write!(f, "{x:.2},{y:.2},{z:.2}"),
        }
    }
}

pub fn measurement(out: &mut impl LineSink, channel: Channel, reading: Reading) -> Result<(), BufferError> {
    out.push_line(format_args!("{},,{reading}", channel.code()))
}

pub fn inventory_mirror(
    out: &mut impl LineSink,
    channel: Channel,
    device_id: &str,
    reading: Reading,
) -> Result<(), BufferError> {
    out.push_line(format_args!("{},{device_id},{reading}", channel.inventory_code()))
}

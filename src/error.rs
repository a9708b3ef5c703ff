//! Unified error types for the agent.
//!
//! Every subsystem owns a small error enum with a hand-written `Display`
//! impl and converts into the top-level [`Error`], keeping the engine's
//! error handling uniform. All variants are `Copy` so they can be logged,
//! stored in counters and passed across ports without allocation.

use core::fmt;

use crate::config::ConfigKey;
use crate::protocol::command::OperationType;

// ---------------------------------------------------------------------------
// Top-level agent error
// ---------------------------------------------------------------------------

/// Every fallible operation in the agent funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Configuration text was malformed.
    Parse(ParseError),
    /// Configuration could not be assembled from any source.
    Config(ConfigError),
    /// An inbound protocol line could not be decoded.
    Decode(DecodeError),
    /// The MQTT session or the link underneath it failed.
    Transport(TransportError),
    /// A telemetry buffer rejected an append.
    Buffer(BufferError),
    /// Persistent storage failed.
    Storage(StorageError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "parse: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Decode(e) => write!(f, "decode: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Buffer(e) => write!(f, "buffer: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
        }
    }
}

impl std::error::Error for Error {}

/// Convenience alias used across the library.
pub type Result<T> = core::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// Config text parsing
// ---------------------------------------------------------------------------

/// Token class the parser was waiting for when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    AttributeName,
    Equals,
    Value,
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AttributeName => write!(f, "attribute name"),
            Self::Equals => write!(f, "'='"),
            Self::Value => write!(f, "value"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// The token at `offset` does not fit the parser state.
    UnexpectedToken { expected: Expected },
    /// Attribute already defined and the pass does not allow overwrites.
    DuplicateAttribute(ConfigKey),
    /// Value exceeds [`crate::config::MAX_VALUE_LEN`].
    ValueTooLong,
    /// The buffer ended between an attribute name and its `=`.
    Truncated,
    /// The buffer is not valid UTF-8 from `offset` on.
    InvalidUtf8,
}

/// Malformed config text, with the byte offset where parsing stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub offset: usize,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ParseErrorKind::UnexpectedToken { expected } => {
                write!(f, "expected {expected} at byte {}", self.offset)
            }
            ParseErrorKind::DuplicateAttribute(key) => {
                write!(f, "attribute {} defined twice (byte {})", key.name(), self.offset)
            }
            ParseErrorKind::ValueTooLong => write!(f, "value too long at byte {}", self.offset),
            ParseErrorKind::Truncated => write!(f, "truncated line at byte {}", self.offset),
            ParseErrorKind::InvalidUtf8 => write!(f, "invalid UTF-8 at byte {}", self.offset),
        }
    }
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

// ---------------------------------------------------------------------------
// Config assembly
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// At least one source exists but none of them parsed.
    NoValidSource,
    /// A single source failed to parse.
    Parse(ParseError),
    /// Persisting or reading the configuration failed.
    Storage(StorageError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoValidSource => write!(f, "no configuration source parsed successfully"),
            Self::Parse(e) => write!(f, "{e}"),
            Self::Storage(e) => write!(f, "{e}"),
        }
    }
}

impl From<ParseError> for ConfigError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

impl From<StorageError> for ConfigError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Inbound command decoding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeFailure {
    /// Blank line; not an operation.
    Empty,
    /// Line exceeds the inbound line capacity.
    LineTooLong,
    /// Token 0 is not a known template id.
    UnknownTemplate,
    /// Token 2 of a generic command is not a known verb.
    UnknownVerb,
    /// A required token is missing.
    MissingToken,
    /// A numeric token has no leading digits.
    InvalidNumber,
    /// Sensor name not in the sensor table.
    UnknownSensor,
    /// Config key not in the attribute table.
    UnknownConfigKey,
    /// A free-form value exceeds the attribute value capacity.
    ValueTooLong,
    /// A value the configuration file could not read back.
    InvalidValue,
}

impl DecodeFailure {
    /// Reason text carried in the `502` failure acknowledgment.
    pub fn reason(self) -> &'static str {
        match self {
            Self::Empty | Self::UnknownTemplate | Self::UnknownVerb => "Command unknown",
            Self::LineTooLong => "Command too long",
            Self::MissingToken => "Command incomplete",
            Self::InvalidNumber => "Invalid number",
            Self::UnknownSensor => "Sensor unknown",
            Self::UnknownConfigKey => "Config key unknown",
            Self::ValueTooLong => "Value too long",
            Self::InvalidValue => "Invalid value",
        }
    }
}

impl fmt::Display for DecodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// A line that could not be turned into a complete [`Command`](crate::protocol::command::Command).
///
/// Carries the operation type so the failure can still be acknowledged
/// against the right fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeError {
    pub op: OperationType,
    pub failure: DecodeFailure,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.failure, self.op.name())
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

// ---------------------------------------------------------------------------
// Transport / connectivity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The WLAN link is down and could not be brought back.
    LinkDown,
    /// MQTT connect was refused or timed out.
    ConnectFailed,
    /// A topic subscription failed.
    SubscribeFailed,
    /// A publish failed.
    PublishFailed,
    /// The operation did not complete within its timeout.
    Timeout,
    /// Consecutive failures exceeded the reconnect budget.
    RetryBudgetExhausted,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LinkDown => write!(f, "link down"),
            Self::ConnectFailed => write!(f, "connect failed"),
            Self::SubscribeFailed => write!(f, "subscribe failed"),
            Self::PublishFailed => write!(f, "publish failed"),
            Self::Timeout => write!(f, "timed out"),
            Self::RetryBudgetExhausted => write!(f, "reconnect budget exhausted"),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Telemetry buffers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    /// Appending `needed` bytes would exceed the remaining `available`.
    Overflow { needed: usize, available: usize },
    /// The buffer lock was not acquired before the deadline.
    LockTimeout,
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overflow { needed, available } => {
                write!(f, "overflow ({needed} bytes needed, {available} available)")
            }
            Self::LockTimeout => write!(f, "lock timeout"),
        }
    }
}

impl From<BufferError> for Error {
    fn from(e: BufferError) -> Self {
        Self::Buffer(e)
    }
}

// ---------------------------------------------------------------------------
// Persistent storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// The medium is not mounted or not present.
    Unavailable,
    /// The named file does not exist.
    NotFound,
    /// Read or write failed.
    Io,
    /// File exceeds the size the caller can handle.
    TooLarge,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "storage unavailable"),
            Self::NotFound => write!(f, "file not found"),
            Self::Io => write!(f, "storage I/O error"),
            Self::TooLarge => write!(f, "file too large"),
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

//! Inbound operation decoding.
//!
//! One SmartREST line becomes one [`Command`]. Token 0 is the template id,
//! token 1 the target device id (ignored), the rest depends on the
//! template. Tokens are separated by `,` or `:`; free-form trailing fields
//! (config values, firmware URL, password) take the rest of the line so
//! they may contain separators themselves.
//!
//! Decoding never drops input silently: anything that is not a complete
//! command comes back as a [`DecodeError`] carrying the operation type the
//! failure must be acknowledged against.

use crate::config::{
    is_storable_value, parse_bool_lenient, parse_int_prefix, ConfigKey, SensorKey, MAX_VALUE_LEN,
};
use crate::error::{DecodeError, DecodeFailure};

/// Sensor period granularity; `speed` is never accepted below twice this.
pub const MINIMAL_SPEED_MS: u32 = 100;

/// Lowest stream rate a `speed` command can set.
pub const SPEED_FLOOR_MS: u32 = 2 * MINIMAL_SPEED_MS;

/// Longest inbound line accepted.
pub const MAX_INBOUND_LINE: usize = 256;

/// Bounded text field carried by a command.
pub type Field = heapless::String<MAX_VALUE_LEN>;

// ───────────────────────────────────────────────────────────────
// Operation types
// ───────────────────────────────────────────────────────────────

/// Platform fragment an acknowledgment refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Restart,
    Command,
    Firmware,
    Message,
}

impl OperationType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Restart => "c8y_Restart",
            Self::Command => "c8y_Command",
            Self::Firmware => "c8y_Firmware",
            Self::Message => "c8y_Message",
        }
    }
}

/// Who asked for a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Issued by an operator through the platform.
    Operator,
    /// Generated on the device by a button gesture.
    Button,
}

// ───────────────────────────────────────────────────────────────
// Commands
// ───────────────────────────────────────────────────────────────

/// A fully decoded operation.
///
/// Template 511 (`c8y_Command`) is a family of verbs; each verb is its own
/// variant here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 510: restart the device.
    Restart,
    /// `speed:<ms>`: new stream rate, already clamped to [`SPEED_FLOOR_MS`].
    Speed(u32),
    /// `toggle`: toggle the indicator LED.
    Toggle,
    /// `start` / `startButton`.
    PublishStart(Origin),
    /// `stop` / `stopButton`.
    PublishStop(Origin),
    /// `sensor:<NAME>:<TRUE|FALSE>`.
    Sensor { sensor: SensorKey, enabled: bool },
    /// `config:<KEY>:<value>`.
    Config { key: ConfigKey, value: Field },
    /// 515: firmware name, version and URL.
    Firmware { name: Field, version: Field, url: Field },
    /// 999: operator message.
    Message,
    /// `printConfig`.
    PrintConfig,
    /// `resetBootstatus`.
    ResetBootStatus,
    /// `requestCommands`: ask the platform for pending operations.
    RequestCommands,
    /// `restartConfirm`: re-send the pending restart confirmation.
    RestartConfirm,
    /// 70: device credentials during registration.
    Credentials { tenant: Field, user: Field, password: Field },
}

impl Command {
    /// Fragment the acknowledgment is sent for.
    pub fn operation_type(&self) -> OperationType {
        match self {
            Self::Restart => OperationType::Restart,
            Self::Firmware { .. } => OperationType::Firmware,
            Self::Message => OperationType::Message,
            _ => OperationType::Command,
        }
    }

    /// Short human-readable name used in event text and logs.
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Restart => "restart",
            Self::Speed(_) => "speed",
            Self::Toggle => "toggle",
            Self::PublishStart(_) => "start publishing",
            Self::PublishStop(_) => "stop publishing",
            Self::Sensor { .. } => "sensor",
            Self::Config { .. } => "config",
            Self::Firmware { .. } => "firmware",
            Self::Message => "message",
            Self::PrintConfig => "print config",
            Self::ResetBootStatus => "reset boot status",
            Self::RequestCommands => "request commands",
            Self::RestartConfirm => "restart confirm",
            Self::Credentials { .. } => "credentials",
        }
    }

    /// Device-initiated commands; never attributed to an operator.
    pub fn is_device_initiated(&self) -> bool {
        matches!(
            self,
            Self::PublishStart(Origin::Button)
                | Self::PublishStop(Origin::Button)
                | Self::PrintConfig
                | Self::ResetBootStatus
                | Self::RequestCommands
        )
    }
}

// ───────────────────────────────────────────────────────────────
// Verb table
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Speed,
    Toggle,
    Start,
    StartButton,
    Stop,
    StopButton,
    Sensor,
    Config,
    PrintConfig,
    ResetBootStatus,
    RequestCommands,
    RestartConfirm,
}

static VERBS: [(&str, Verb); 12] = [
    ("speed", Verb::Speed),
    ("toggle", Verb::Toggle),
    ("start", Verb::Start),
    ("startButton", Verb::StartButton),
    ("stop", Verb::Stop),
    ("stopButton", Verb::StopButton),
    ("sensor", Verb::Sensor),
    ("config", Verb::Config),
    ("printConfig", Verb::PrintConfig),
    ("resetBootstatus", Verb::ResetBootStatus),
    ("requestCommands", Verb::RequestCommands),
    ("restartConfirm", Verb::RestartConfirm),
];

fn lookup_verb(name: &str) -> Option<Verb> {
    VERBS.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
}

/// Command line a device-side trigger feeds into the inbound queue.
pub fn device_line(verb: &str) -> heapless::String<48> {
    let mut line = heapless::String::new();
    let _ = core::fmt::Write::write_fmt(&mut line, format_args!("511,DEVICE,{verb}"));
    line
}

// ───────────────────────────────────────────────────────────────
// Tokenizer
// ───────────────────────────────────────────────────────────────

const SEPARATORS: [char; 2] = [',', ':'];

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

struct Tokens<'a> {
    rest: &'a str,
}

impl<'a> Tokens<'a> {
    fn new(line: &'a str) -> Self {
        Self { rest: line }
    }

    /// Next non-empty token; runs of separators count as one.
    fn next(&mut self) -> Option<&'a str> {
        let s = self.rest.trim_start_matches(SEPARATORS);
        if s.is_empty() {
            self.rest = s;
            return None;
        }
        let end = s.find(SEPARATORS).unwrap_or(s.len());
        let (token, rest) = s.split_at(end);
        self.rest = rest;
        Some(unquote(token.trim()))
    }

    /// Everything after the next separator, unsplit.
    fn remainder(&mut self) -> Option<&'a str> {
        let s = self.rest.strip_prefix(SEPARATORS).unwrap_or(self.rest);
        self.rest = "";
        let s = unquote(s.trim());
        (!s.is_empty()).then_some(s)
    }
}

// ───────────────────────────────────────────────────────────────
// Decoder
// ───────────────────────────────────────────────────────────────

struct Decoder<'a> {
    tokens: Tokens<'a>,
    op: OperationType,
}

impl<'a> Decoder<'a> {
    fn fail(&self, failure: DecodeFailure) -> DecodeError {
        DecodeError { op: self.op, failure }
    }

    fn required(&mut self) -> Result<&'a str, DecodeError> {
        self.tokens.next().ok_or(self.fail(DecodeFailure::MissingToken))
    }

    fn required_rest(&mut self) -> Result<&'a str, DecodeError> {
        self.tokens
            .remainder()
            .ok_or(self.fail(DecodeFailure::MissingToken))
    }

    fn field(&self, s: &str) -> Result<Field, DecodeError> {
        Field::try_from(s).map_err(|()| self.fail(DecodeFailure::ValueTooLong))
    }

    /// A field that ends up in `config.txt`.
    fn stored(&self, s: &str) -> Result<Field, DecodeError> {
        let field = self.field(s)?;
        if !is_storable_value(&field) {
            return Err(self.fail(DecodeFailure::InvalidValue));
        }
        Ok(field)
    }

    fn generic(&mut self) -> Result<Command, DecodeError> {
        let verb = self.required()?;
        let verb = lookup_verb(verb).ok_or(self.fail(DecodeFailure::UnknownVerb))?;

        Ok(match verb {
            Verb::Speed => {
                let raw = self.required()?;
                let ms = parse_int_prefix(raw).ok_or(self.fail(DecodeFailure::InvalidNumber))?;
                Command::Speed(ms.clamp(i64::from(SPEED_FLOOR_MS), i64::from(u32::MAX)) as u32)
            }
            Verb::Toggle => Command::Toggle,
            Verb::Start => Command::PublishStart(Origin::Operator),
            Verb::StartButton => Command::PublishStart(Origin::Button),
            Verb::Stop => Command::PublishStop(Origin::Operator),
            Verb::StopButton => Command::PublishStop(Origin::Button),
            Verb::Sensor => {
                let name = self.required()?;
                let sensor = SensorKey::from_name(name).ok_or(self.fail(DecodeFailure::UnknownSensor))?;
                let enabled = parse_bool_lenient(self.required()?);
                Command::Sensor { sensor, enabled }
            }
            Verb::Config => {
                let name = self.required()?;
                let key = ConfigKey::from_name(name).ok_or(self.fail(DecodeFailure::UnknownConfigKey))?;
                let value = self.required_rest()?;
                Command::Config {
                    key,
                    value: self.stored(value)?,
                }
            }
            Verb::PrintConfig => Command::PrintConfig,
            Verb::ResetBootStatus => Command::ResetBootStatus,
            Verb::RequestCommands => Command::RequestCommands,
            Verb::RestartConfirm => Command::RestartConfirm,
        })
    }

    fn firmware(&mut self) -> Result<Command, DecodeError> {
        let name = self.required()?;
        let version = self.required()?;
        let url = self.required_rest()?;
        Ok(Command::Firmware {
            name: self.stored(name)?,
            version: self.stored(version)?,
            url: self.stored(url)?,
        })
    }

    fn credentials(&mut self) -> Result<Command, DecodeError> {
        let tenant = self.required()?;
        let user = self.required()?;
        let password = self.required_rest()?;
        Ok(Command::Credentials {
            tenant: self.stored(tenant)?,
            user: self.stored(user)?,
            password: self.stored(password)?,
        })
    }
}

/// Decode one inbound line.
pub fn decode(line: &str) -> Result<Command, DecodeError> {
    let line = line.trim();
    let mut decoder = Decoder {
        tokens: Tokens::new(line),
        op: OperationType::Command,
    };

    if line.is_empty() {
        return Err(decoder.fail(DecodeFailure::Empty));
    }
    if line.len() > MAX_INBOUND_LINE {
        return Err(decoder.fail(DecodeFailure::LineTooLong));
    }

    let template = decoder.required()?;
    if template == "70" {
        return decoder.credentials();
    }

    decoder.op = match template {
        "510" => OperationType::Restart,
        "511" => OperationType::Command,
        "515" => OperationType::Firmware,
        "999" => OperationType::Message,
        _ => return Err(decoder.fail(DecodeFailure::UnknownTemplate)),
    };

    // Target device id.
    let _ = decoder.tokens.next();

    match decoder.op {
        OperationType::Restart => Ok(Command::Restart),
        OperationType::Command => decoder.generic(),
        OperationType::Firmware => decoder.firmware(),
        OperationType::Message => Ok(Command::Message),
    }
}

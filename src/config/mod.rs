//! Device configuration store.
//!
//! An ordered, fixed table of named attributes with compiled defaults.
//! Values come from `KEY=VALUE` text files (see [`parser`]) and can be
//! changed at runtime by cloud commands; they are persisted only when a
//! caller explicitly writes the configuration back.
//!
//! ```text
//!  config.txt (primary) ──┐
//!                         ├──▶ parser ──▶ ConfigStore ──▶ typed getters
//!  config.txt (override) ─┘                    │
//!                                              └──▶ serialize() ──▶ write_config
//! ```
//!
//! Boolean and integer accessors are lenient: anything that is not `TRUE`
//! or `1` reads as `false`, and an integer without a leading number reads
//! as `0`. Operators have always been able to rely on this.

pub mod parser;

use core::fmt::Write as _;

use log::{info, warn};

pub use parser::{factory_reset, merge_config, parse, write_config, MergeOutcome, SourceStatus};

/// Longest value the parser accepts.
pub const MAX_VALUE_LEN: usize = 64;

/// Name of the configuration file on both storage sources.
pub const CONFIG_FILE: &str = "config.txt";

/// MQTTUSER value that puts the device into registration mode.
pub const REGISTRATION_USER: &str = "REGISTRATION";

// ───────────────────────────────────────────────────────────────
// Attribute table
// ───────────────────────────────────────────────────────────────

/// Every attribute the configuration file may contain, in table order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConfigKey {
    WifiSsid,
    WifiPassword,
    BrokerName,
    BrokerPort,
    MqttSecure,
    MqttUser,
    MqttPassword,
    MqttAnonymous,
    StreamRate,
    Accel,
    Gyro,
    Mag,
    Env,
    Light,
    Noise,
    Orientation,
    SntpName,
    SntpPort,
    FirmwareName,
    FirmwareVersion,
    FirmwareUrl,
    StaticIp,
}

struct Attribute {
    name: &'static str,
    default: &'static str,
    deprecated: bool,
}

const fn attr(name: &'static str, default: &'static str) -> Attribute {
    Attribute {
        name,
        default,
        deprecated: false,
    }
}

/// Number of attributes in the table.
pub const KEY_COUNT: usize = 22;

static ATTRIBUTES: [Attribute; KEY_COUNT] = [
    attr("WIFISSID", "TBD"),
    attr("WIFIPASSWORD", "TBD"),
    attr("MQTTBROKERNAME", "mqtt.cumulocity.com"),
    attr("MQTTBROKERPORT", "8883"),
    attr("MQTTSECURE", "TRUE"),
    attr("MQTTUSER", REGISTRATION_USER),
    attr("MQTTPASSWORD", REGISTRATION_USER),
    attr("MQTTANONYMOUS", "FALSE"),
    attr("STREAMRATE", "5000"),
    attr("ACCEL", "TRUE"),
    attr("GYRO", "TRUE"),
    attr("MAG", "TRUE"),
    attr("ENV", "TRUE"),
    attr("LIGHT", "TRUE"),
    attr("NOISE", "FALSE"),
    attr("ORIENTATION", "FALSE"),
    attr("SNTPNAME", "0.de.pool.ntp.org"),
    attr("SNTPPORT", "123"),
    attr("FIRMWARENAME", "XDK_C8Y_Agent"),
    attr("FIRMWAREVERSION", "1.0"),
    attr("FIRMWAREURL", ""),
    Attribute {
        name: "STATICIP",
        default: "",
        deprecated: true,
    },
];

impl ConfigKey {
    /// All keys in table order.
    pub const ALL: [ConfigKey; KEY_COUNT] = [
        Self::WifiSsid,
        Self::WifiPassword,
        Self::BrokerName,
        Self::BrokerPort,
        Self::MqttSecure,
        Self::MqttUser,
        Self::MqttPassword,
        Self::MqttAnonymous,
        Self::StreamRate,
        Self::Accel,
        Self::Gyro,
        Self::Mag,
        Self::Env,
        Self::Light,
        Self::Noise,
        Self::Orientation,
        Self::SntpName,
        Self::SntpPort,
        Self::FirmwareName,
        Self::FirmwareVersion,
        Self::FirmwareUrl,
        Self::StaticIp,
    ];

    fn attribute(self) -> &'static Attribute {
        &ATTRIBUTES[self as usize]
    }

    /// Name as written in the configuration file.
    pub fn name(self) -> &'static str {
        self.attribute().name
    }

    pub fn default_value(self) -> &'static str {
        self.attribute().default
    }

    pub fn is_deprecated(self) -> bool {
        self.attribute().deprecated
    }

    /// Exact, case-sensitive lookup by file name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }

    fn is_secret(self) -> bool {
        matches!(self, Self::WifiPassword | Self::MqttPassword)
    }
}

// ───────────────────────────────────────────────────────────────
// Sensor channel flags
// ───────────────────────────────────────────────────────────────

/// Sensor channels that can be switched on and off by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKey {
    Accel,
    Gyro,
    Mag,
    /// Humidity, temperature and pressure together.
    Env,
    Light,
    Noise,
    Orientation,
}

impl SensorKey {
    pub const ALL: [SensorKey; 7] = [
        Self::Accel,
        Self::Gyro,
        Self::Mag,
        Self::Env,
        Self::Light,
        Self::Noise,
        Self::Orientation,
    ];

    /// Attribute holding this channel's enable flag.
    pub fn config_key(self) -> ConfigKey {
        match self {
            Self::Accel => ConfigKey::Accel,
            Self::Gyro => ConfigKey::Gyro,
            Self::Mag => ConfigKey::Mag,
            Self::Env => ConfigKey::Env,
            Self::Light => ConfigKey::Light,
            Self::Noise => ConfigKey::Noise,
            Self::Orientation => ConfigKey::Orientation,
        }
    }

    pub fn name(self) -> &'static str {
        self.config_key().name()
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.name() == name)
    }
}

// ───────────────────────────────────────────────────────────────
// Lenient value parsing
// ───────────────────────────────────────────────────────────────

/// `TRUE` or `1` is true, anything else false.
pub fn parse_bool_lenient(value: &str) -> bool {
    value == "TRUE" || value == "1"
}

/// Leading integer of `value` after optional whitespace and sign.
/// `None` when there are no digits at all.
pub fn parse_int_prefix(value: &str) -> Option<i64> {
    let s = value.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let magnitude = digits[..end].bytes().fold(0i64, |acc, b| {
        acc.saturating_mul(10).saturating_add(i64::from(b - b'0'))
    });
    Some(if negative { -magnitude } else { magnitude })
}

/// Leading integer of `value`, or `0`.
pub fn parse_int_lenient(value: &str) -> i64 {
    parse_int_prefix(value).unwrap_or(0)
}

/// Whether `value` reads back unchanged once written to `config.txt`.
///
/// The parser ends a value at CR, LF, TAB or a `#` after a blank and
/// drops surrounding blanks, so values like that cannot be stored.
pub fn is_storable_value(value: &str) -> bool {
    value.len() <= MAX_VALUE_LEN
        && value.trim_matches(' ') == value
        && !value.bytes().any(|b| matches!(b, b'\r' | b'\n' | b'\t'))
        && !value.contains(" #")
}

// ───────────────────────────────────────────────────────────────
// ConfigStore
// ───────────────────────────────────────────────────────────────

/// Which MQTT account the device runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootMode {
    /// Bootstrap credentials; waiting for the platform to issue real ones.
    Registration,
    /// Device credentials present.
    Operation,
}

/// Attribute values, indexed by [`ConfigKey`].
#[derive(Debug, Clone)]
pub struct ConfigStore {
    values: [Option<String>; KEY_COUNT],
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore {
    /// Every attribute undefined, so every getter yields its default.
    pub fn new() -> Self {
        Self {
            values: core::array::from_fn(|_| None),
        }
    }

    pub fn reset(&mut self) {
        for v in &mut self.values {
            *v = None;
        }
    }

    /// Effective value: the defined value, else the compiled default.
    pub fn get(&self, key: ConfigKey) -> &str {
        self.values[key as usize]
            .as_deref()
            .unwrap_or(key.default_value())
    }

    /// Effective value by file name; `""` for unknown names.
    pub fn get_by_name(&self, name: &str) -> &str {
        ConfigKey::from_name(name).map_or("", |k| self.get(k))
    }

    /// Explicitly defined value, if any.
    pub fn value(&self, key: ConfigKey) -> Option<&str> {
        self.values[key as usize].as_deref()
    }

    pub fn is_defined(&self, key: ConfigKey) -> bool {
        self.values[key as usize].is_some()
    }

    pub fn set(&mut self, key: ConfigKey, value: &str) {
        self.values[key as usize] = Some(value.to_owned());
    }

    pub fn get_bool(&self, key: ConfigKey) -> bool {
        parse_bool_lenient(self.get(key))
    }

    pub fn set_bool(&mut self, key: ConfigKey, value: bool) {
        self.set(key, if value { "TRUE" } else { "FALSE" });
    }

    pub fn get_int(&self, key: ConfigKey) -> i64 {
        parse_int_lenient(self.get(key))
    }

    pub fn set_int(&mut self, key: ConfigKey, value: i64) {
        let mut s = heapless::String::<24>::new();
        let _ = write!(s, "{value}");
        self.set(key, &s);
    }

    pub fn is_sensor_enabled(&self, sensor: SensorKey) -> bool {
        self.get_bool(sensor.config_key())
    }

    /// Stores the flag normalized to `TRUE`/`FALSE`.
    pub fn set_sensor(&mut self, sensor: SensorKey, enabled: bool) {
        self.set_bool(sensor.config_key(), enabled);
    }

    /// Sensor period in milliseconds. Negative values read as zero.
    pub fn stream_rate_ms(&self) -> u32 {
        self.get_int(ConfigKey::StreamRate).clamp(0, i64::from(u32::MAX)) as u32
    }

    pub fn boot_mode(&self) -> BootMode {
        if self.get(ConfigKey::MqttUser) == REGISTRATION_USER {
            BootMode::Registration
        } else {
            BootMode::Operation
        }
    }

    /// Render `KEY=VALUE\n` lines.
    ///
    /// Defined attributes always render their value. Undefined attributes
    /// render their default, except with `defaults_only`, where empty
    /// defaults are left out. Deprecated attributes never render; a
    /// defined one is reported as a warning.
    pub fn serialize(&self, defaults_only: bool) -> String {
        let mut out = String::new();
        for key in ConfigKey::ALL {
            if key.is_deprecated() {
                if self.is_defined(key) {
                    warn!("Config: deprecated attribute {} is set and ignored", key.name());
                }
                continue;
            }
            let value = match self.value(key) {
                Some(v) => v,
                None if defaults_only && key.default_value().is_empty() => continue,
                None => key.default_value(),
            };
            let _ = writeln!(out, "{}={}", key.name(), value);
        }
        out
    }

    /// Stream rate and sensor flags as `KEY=VALUE` lines joined by `\n`,
    /// the body of the capability summary sent to the platform.
    pub fn capability_summary(&self) -> String {
        let mut out = String::new();
        let _ = write!(out, "{}={}", ConfigKey::StreamRate.name(), self.stream_rate_ms());
        for sensor in SensorKey::ALL {
            let flag = if self.is_sensor_enabled(sensor) { "TRUE" } else { "FALSE" };
            let _ = write!(out, "\n{}={}", sensor.name(), flag);
        }
        out
    }

    /// Log the effective configuration, secrets masked.
    pub fn list(&self) {
        info!("Config: effective configuration ({:?} mode)", self.boot_mode());
        for key in ConfigKey::ALL {
            if key.is_deprecated() {
                continue;
            }
            let origin = if self.is_defined(key) { "set" } else { "default" };
            if key.is_secret() {
                info!("Config:   {} = ******** ({origin})", key.name());
            } else {
                info!("Config:   {} = {} ({origin})", key.name(), self.get(key));
            }
        }
    }
}

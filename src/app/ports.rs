//! Port traits — the hexagonal boundary between the protocol engine and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Engine (domain)
//! ```
//!
//! Driven adapters (MQTT session, WLAN link, sensors, board, storage)
//! implement these traits. The [`Engine`](super::service::Engine) consumes
//! them as trait objects handed in per call, so the domain core never
//! touches hardware directly and every port can be mocked on the host.
//!
//! Inbound MQTT messages do not flow through a port method: the transport
//! adapter hands them to the bounded [`CommandInbox`](super::inbox::CommandInbox)
//! from its callback context and returns immediately.

use crate::error::{StorageError, TransportError};
use crate::protocol::Qos;

// ───────────────────────────────────────────────────────────────
// Transport (MQTT session)
// ───────────────────────────────────────────────────────────────

/// Broker address and session identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    /// TLS session; also means the clock must be synchronized first.
    pub secure: bool,
    pub client_id: heapless::String<40>,
    pub keepalive_secs: u16,
}

/// MQTT login. `None` user means an anonymous session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: Option<String>,
    pub password: Option<String>,
}

/// One MQTT session over the WLAN link.
pub trait Transport {
    fn connect(
        &mut self,
        endpoint: &Endpoint,
        credentials: &Credentials,
        timeout_ms: u32,
    ) -> Result<(), TransportError>;

    /// Subscribe; inbound messages on `topic` are delivered to the inbox.
    fn subscribe(&mut self, topic: &str, qos: Qos) -> Result<(), TransportError>;

    fn publish(&mut self, topic: &str, payload: &[u8], qos: Qos, timeout_ms: u32) -> Result<(), TransportError>;

    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Network link (WLAN + time sync)
// ───────────────────────────────────────────────────────────────

/// The radio link underneath the transport, and the SNTP client that
/// depends on it.
pub trait NetworkPort {
    fn link_up(&self) -> bool;

    /// Tear down and re-establish the link.
    fn reconnect_link(&mut self) -> Result<(), TransportError>;

    /// Start or stop the time-sync service.
    fn set_time_sync(&mut self, enabled: bool);
}

// ───────────────────────────────────────────────────────────────
// Sensors
// ───────────────────────────────────────────────────────────────

/// Raw readings of one acquisition cycle. A `None` field means the
/// hardware channel is off or failed to read.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorValues {
    /// Acceleration in mg, x/y/z.
    pub accel: Option<[i32; 3]>,
    /// Angular rate in mdeg/s, x/y/z.
    pub gyro: Option<[i32; 3]>,
    /// Magnetic field in µT, x/y/z.
    pub mag: Option<[i32; 3]>,
    pub light_millilux: Option<u32>,
    pub humidity_percent: Option<u32>,
    /// Raw temperature, milli-degrees before calibration.
    pub temperature_raw: Option<i32>,
    pub pressure_pa: Option<u32>,
    /// Acoustic sensor output before the sound-pressure transform.
    pub noise_raw: Option<f32>,
    /// Heading, pitch, roll in degrees.
    pub orientation: Option<[f32; 3]>,
}

pub trait SensorSource {
    /// Read every enabled channel once.
    fn snapshot(&mut self) -> SensorValues;
}

// ───────────────────────────────────────────────────────────────
// Board (reset, indicator LED, battery)
// ───────────────────────────────────────────────────────────────

pub trait DevicePort {
    /// Hard reset. Does not return on real hardware.
    fn restart(&mut self);

    fn toggle_led(&mut self);

    /// Battery charge in percent, `None` when not measurable.
    fn battery_percent(&mut self) -> Option<u8>;
}

// ───────────────────────────────────────────────────────────────
// Persistent storage
// ───────────────────────────────────────────────────────────────

/// Whole-file storage on one medium (internal flash or SD card).
///
/// Writes replace the file; implementations should make them atomic where
/// the medium allows it.
pub trait PersistentStore {
    /// Whether the medium is mounted.
    fn is_available(&self) -> bool;

    fn read_file(&self, name: &str) -> Result<Vec<u8>, StorageError>;

    fn write_file(&mut self, name: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Returns [`StorageError::NotFound`] if the file does not exist.
    fn delete_file(&mut self, name: &str) -> Result<(), StorageError>;
}

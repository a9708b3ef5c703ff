//! Mock adapters for integration tests.
//!
//! The transport records every call so tests can assert on the exact
//! payloads the engine put on the wire. The board records resets and LED
//! toggles. Network, sensors and storage use the crate's own host
//! adapters.

use std::sync::{mpsc, Arc};
use std::thread;

use c8y_agent::adapters::sensors::SimulatedSensors;
use c8y_agent::adapters::storage::MemoryStore;
use c8y_agent::adapters::wifi::SimulatedLink;
use c8y_agent::app::ports::{Credentials, DevicePort, Endpoint, SensorValues, Transport};
use c8y_agent::app::service::{Engine, EngineSettings, Ports};
use c8y_agent::app::telemetry::Telemetry;
use c8y_agent::config::{ConfigKey, ConfigStore};
use c8y_agent::error::TransportError;
use c8y_agent::protocol::Qos;

pub const DEVICE_ID: &str = "XDK_DE_AD_BE_EF_CA_FE";

// ── Transport call record ─────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: String,
    pub qos: Qos,
}

// ── MockTransport ─────────────────────────────────────────────

#[derive(Default)]
pub struct MockTransport {
    pub connected: bool,
    pub connects: u32,
    pub disconnects: u32,
    pub refuse_connect: bool,
    /// Fail this many upcoming publishes.
    pub fail_publishes: u32,
    pub subscriptions: Vec<String>,
    pub published: Vec<Published>,
    pub last_client_id: Option<String>,
    pub last_user: Option<String>,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_topic(&self, topic: &str) -> Vec<&str> {
        self.published
            .iter()
            .filter(|p| p.topic == topic)
            .map(|p| p.payload.as_str())
            .collect()
    }

    /// Every line published on `topic`, in order.
    pub fn lines(&self, topic: &str) -> Vec<String> {
        self.on_topic(topic)
            .iter()
            .flat_map(|p| p.split("\r\n"))
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect()
    }

    pub fn count_lines(&self, topic: &str, line: &str) -> usize {
        self.lines(topic).iter().filter(|l| *l == line).count()
    }
}

impl Transport for MockTransport {
    fn connect(
        &mut self,
        endpoint: &Endpoint,
        credentials: &Credentials,
        _timeout_ms: u32,
    ) -> Result<(), TransportError> {
        self.connects += 1;
        self.last_client_id = Some(endpoint.client_id.as_str().to_owned());
        self.last_user = credentials.user.clone();
        if self.refuse_connect {
            return Err(TransportError::ConnectFailed);
        }
        self.connected = true;
        Ok(())
    }

    fn subscribe(&mut self, topic: &str, _qos: Qos) -> Result<(), TransportError> {
        self.subscriptions.push(topic.to_owned());
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8], qos: Qos, _timeout_ms: u32) -> Result<(), TransportError> {
        if self.fail_publishes > 0 {
            self.fail_publishes -= 1;
            self.connected = false;
            return Err(TransportError::PublishFailed);
        }
        self.published.push(Published {
            topic: topic.to_owned(),
            payload: String::from_utf8_lossy(payload).into_owned(),
            qos,
        });
        Ok(())
    }

    fn disconnect(&mut self) {
        self.disconnects += 1;
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

// ── MockDevice ────────────────────────────────────────────────

#[derive(Default)]
pub struct MockDevice {
    pub restarts: u32,
    pub led_toggles: u32,
    pub battery: Option<u8>,
}

impl DevicePort for MockDevice {
    fn restart(&mut self) {
        self.restarts += 1;
    }

    fn toggle_led(&mut self) {
        self.led_toggles += 1;
    }

    fn battery_percent(&mut self) -> Option<u8> {
        self.battery
    }
}

// ── Rig ───────────────────────────────────────────────────────

/// An engine wired to mocks, driven by explicit timestamps.
pub struct Rig {
    pub engine: Engine,
    pub transport: MockTransport,
    pub network: SimulatedLink,
    pub sensors: SimulatedSensors,
    pub device: MockDevice,
    pub store: MemoryStore,
}

#[allow(dead_code)]
impl Rig {
    pub fn with(config: ConfigStore, settings: EngineSettings, store: MemoryStore) -> Self {
        let mut rig = Self {
            engine: Engine::new(config, DEVICE_ID, settings),
            transport: MockTransport::new(),
            network: SimulatedLink::new(),
            sensors: SimulatedSensors::fixed(SensorValues {
                accel: Some([1, 2, 3]),
                light_millilux: Some(500),
                ..SensorValues::default()
            }),
            device: MockDevice::default(),
            store,
        };
        rig.engine.start(0, &mut rig.store);
        rig
    }

    /// Operation mode with device credentials.
    pub fn operating() -> Self {
        Self::with(operation_config(), EngineSettings::default(), MemoryStore::new())
    }

    pub fn poll(&mut self, now_ms: u64) -> u64 {
        let mut ports = Ports {
            transport: &mut self.transport,
            network: &mut self.network,
            sensors: &mut self.sensors,
            device: &mut self.device,
            store: &mut self.store,
        };
        self.engine.poll(now_ms, &mut ports)
    }

    /// Poll once per `step_ms` from `from_ms` through `to_ms` inclusive.
    pub fn run(&mut self, from_ms: u64, to_ms: u64, step_ms: u64) {
        let mut t = from_ms;
        while t <= to_ms {
            self.poll(t);
            t += step_ms;
        }
    }

    /// Deliver an inbound payload as if it arrived on `topic`.
    pub fn receive(&self, topic: &str, payload: &str) {
        self.engine.inbox().deliver(topic, payload.as_bytes());
    }
}

// ── Contended buffers ─────────────────────────────────────────

/// Keeps the asset stream locked from another thread until dropped.
pub struct HeldAssetLock {
    release: mpsc::Sender<()>,
    holder: Option<thread::JoinHandle<()>>,
}

impl HeldAssetLock {
    pub fn take(telemetry: Arc<Telemetry>) -> Self {
        let (locked_tx, locked_rx) = mpsc::channel();
        let (release, release_rx) = mpsc::channel::<()>();
        let holder = thread::spawn(move || {
            telemetry
                .asset()
                .with_lock(|_| {
                    locked_tx.send(()).unwrap();
                    let _ = release_rx.recv();
                })
                .unwrap();
        });
        locked_rx.recv().unwrap();
        Self {
            release,
            holder: Some(holder),
        }
    }
}

impl Drop for HeldAssetLock {
    fn drop(&mut self) {
        let _ = self.release.send(());
        if let Some(holder) = self.holder.take() {
            let _ = holder.join();
        }
    }
}

pub fn operation_config() -> ConfigStore {
    let mut config = ConfigStore::new();
    config.set(ConfigKey::MqttUser, "t100/device_xdk");
    config.set(ConfigKey::MqttPassword, "secret");
    config
}

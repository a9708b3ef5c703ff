//! Connectivity supervision.
//!
//! Keeps the MQTT session alive on top of the WLAN link. Every publish
//! cycle asks [`ConnectivitySupervisor::ensure_connected`] first; a healthy
//! session costs two status reads, a broken one gets a full reconnect:
//!
//! ```text
//!   disconnect transport
//!        │
//!        ├── link down? ── time sync off ── reconnect link ── time sync on
//!        │                 (secure sessions only)
//!        ▼
//!   connect transport ──▶ resubscribe (once subscriptions are armed)
//! ```
//!
//! Failed attempts back off exponentially. Once consecutive failures pass
//! the budget the supervisor latches [`TransportError::RetryBudgetExhausted`]
//! and stops trying; recovery from there is a restart.

use log::{error, info, warn};

use crate::adapters::device_id::client_id;
use crate::app::ports::{Credentials, Endpoint, NetworkPort, Transport};
use crate::config::{BootMode, ConfigKey, ConfigStore};
use crate::error::TransportError;
use crate::protocol::{
    Qos, TOPIC_CUSTOM_OPERATIONS, TOPIC_REGISTRATION_DOWN, TOPIC_STANDARD_OPERATIONS,
};

/// Consecutive failed reconnects tolerated before giving up.
pub const MAX_RECONNECT_FAILURES: u32 = 10;

/// Connect, subscribe and publish timeout.
pub const TRANSPORT_TIMEOUT_MS: u32 = 20_000;

/// MQTT keep-alive interval.
pub const MQTT_KEEPALIVE_SECS: u16 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorSettings {
    pub max_failures: u32,
    pub initial_backoff_ms: u32,
    pub max_backoff_ms: u32,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            max_failures: MAX_RECONNECT_FAILURES,
            initial_backoff_ms: 2_000,
            max_backoff_ms: 60_000,
        }
    }
}

/// Everything needed to (re)build the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub endpoint: Endpoint,
    pub credentials: Credentials,
    pub subscriptions: heapless::Vec<&'static str, 2>,
}

impl SessionSettings {
    pub fn from_config(config: &ConfigStore, device_id: &str) -> Self {
        let port = config.get_int(ConfigKey::BrokerPort).clamp(0, i64::from(u16::MAX)) as u16;
        let endpoint = Endpoint {
            host: config.get(ConfigKey::BrokerName).to_owned(),
            port,
            secure: config.get_bool(ConfigKey::MqttSecure),
            client_id: client_id(device_id),
            keepalive_secs: MQTT_KEEPALIVE_SECS,
        };
        let credentials = if config.get_bool(ConfigKey::MqttAnonymous) {
            Credentials {
                user: None,
                password: None,
            }
        } else {
            Credentials {
                user: Some(config.get(ConfigKey::MqttUser).to_owned()),
                password: Some(config.get(ConfigKey::MqttPassword).to_owned()),
            }
        };
        let mut subscriptions = heapless::Vec::new();
        match config.boot_mode() {
            BootMode::Registration => {
                let _ = subscriptions.push(TOPIC_REGISTRATION_DOWN);
            }
            BootMode::Operation => {
                let _ = subscriptions.push(TOPIC_STANDARD_OPERATIONS);
                let _ = subscriptions.push(TOPIC_CUSTOM_OPERATIONS);
            }
        }
        Self {
            endpoint,
            credentials,
            subscriptions,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionHealth {
    pub consecutive_failures: u32,
    pub last_known_up: bool,
}

pub struct ConnectivitySupervisor {
    session: SessionSettings,
    settings: SupervisorSettings,
    health: ConnectionHealth,
    subscriptions_armed: bool,
    exhausted: bool,
    backoff_ms: u32,
    next_attempt_ms: u64,
    last_error: TransportError,
}

impl ConnectivitySupervisor {
    pub fn new(session: SessionSettings, settings: SupervisorSettings) -> Self {
        Self {
            session,
            settings,
            health: ConnectionHealth::default(),
            subscriptions_armed: false,
            exhausted: false,
            backoff_ms: settings.initial_backoff_ms,
            next_attempt_ms: 0,
            last_error: TransportError::LinkDown,
        }
    }

    pub fn health(&self) -> ConnectionHealth {
        self.health
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn subscriptions_armed(&self) -> bool {
        self.subscriptions_armed
    }

    /// Make sure the session is up, reconnecting if it is not or if
    /// `force` is set.
    ///
    /// Within a backoff window the last error is returned without a new
    /// attempt; those calls do not count against the budget.
    pub fn ensure_connected(
        &mut self,
        now_ms: u64,
        network: &mut dyn NetworkPort,
        transport: &mut dyn Transport,
        force: bool,
    ) -> Result<(), TransportError> {
        if self.exhausted {
            return Err(TransportError::RetryBudgetExhausted);
        }
        if !force && network.link_up() && transport.is_connected() {
            self.health.last_known_up = true;
            return Ok(());
        }
        if self.health.last_known_up {
            warn!("Supervisor: session lost, reconnecting");
            self.health.last_known_up = false;
        }
        if now_ms < self.next_attempt_ms {
            return Err(self.last_error);
        }

        match self.reconnect(network, transport) {
            Ok(()) => {
                info!(
                    "Supervisor: connected to {}:{} after {} failures",
                    self.session.endpoint.host, self.session.endpoint.port, self.health.consecutive_failures
                );
                self.health = ConnectionHealth {
                    consecutive_failures: 0,
                    last_known_up: true,
                };
                self.backoff_ms = self.settings.initial_backoff_ms;
                self.next_attempt_ms = 0;
                Ok(())
            }
            Err(e) => {
                self.health.consecutive_failures += 1;
                self.last_error = e;
                if self.health.consecutive_failures > self.settings.max_failures {
                    error!(
                        "Supervisor: {} consecutive failures, giving up ({e})",
                        self.health.consecutive_failures
                    );
                    self.exhausted = true;
                    return Err(TransportError::RetryBudgetExhausted);
                }
                warn!(
                    "Supervisor: reconnect failed ({e}), attempt {}/{}, retry in {} ms",
                    self.health.consecutive_failures, self.settings.max_failures, self.backoff_ms
                );
                self.next_attempt_ms = now_ms + u64::from(self.backoff_ms);
                self.backoff_ms = self.backoff_ms.saturating_mul(2).min(self.settings.max_backoff_ms);
                Err(e)
            }
        }
    }

    /// Subscribe now and after every future reconnect.
    pub fn arm_subscriptions(&mut self, transport: &mut dyn Transport) -> Result<(), TransportError> {
        self.subscriptions_armed = true;
        self.subscribe_all(transport)
    }

    fn subscribe_all(&self, transport: &mut dyn Transport) -> Result<(), TransportError> {
        for topic in &self.session.subscriptions {
            transport.subscribe(topic, Qos::AtMostOnce)?;
            info!("Supervisor: subscribed to {topic}");
        }
        Ok(())
    }

    fn reconnect(&self, network: &mut dyn NetworkPort, transport: &mut dyn Transport) -> Result<(), TransportError> {
        transport.disconnect();
        if !network.link_up() {
            let secure = self.session.endpoint.secure;
            if secure {
                network.set_time_sync(false);
            }
            let link = network.reconnect_link();
            if secure {
                network.set_time_sync(true);
            }
            link?;
        }
        transport.connect(&self.session.endpoint, &self.session.credentials, TRANSPORT_TIMEOUT_MS)?;
        if self.subscriptions_armed {
            self.subscribe_all(transport)?;
        }
        Ok(())
    }
}

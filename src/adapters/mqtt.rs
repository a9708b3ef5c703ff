//! MQTT session over the ESP-IDF client, behind [`Transport`].
//!
//! ```text
//!   esp-mqtt task ──callback──▶ CommandInbox ──try_next──▶ Engine
//!                       │
//!                       └── Connected / Disconnected ──▶ AtomicBool
//! ```
//!
//! The client callback never blocks: inbound payloads are split into
//! lines and offered to the bounded inbox, connection state goes into an
//! atomic the engine reads through [`Transport::is_connected`].
//!
//! Host builds have no broker client; tests drive the engine through a
//! recording mock instead.

#![cfg(target_os = "espidf")]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use esp_idf_svc::mqtt::client::{EspMqttClient, EventPayload, MqttClientConfiguration, QoS};
use log::{debug, info, warn};

use crate::app::inbox::CommandInbox;
use crate::app::ports::{Credentials, Endpoint, Transport};
use crate::error::TransportError;
use crate::protocol::Qos;

const CONNECT_POLL: Duration = Duration::from_millis(50);

fn esp_qos(qos: Qos) -> QoS {
    match qos {
        Qos::AtMostOnce => QoS::AtMostOnce,
        Qos::AtLeastOnce => QoS::AtLeastOnce,
    }
}

pub struct EspMqttTransport {
    client: Option<EspMqttClient<'static>>,
    connected: Arc<AtomicBool>,
    inbox: Arc<CommandInbox>,
}

impl EspMqttTransport {
    pub fn new(inbox: Arc<CommandInbox>) -> Self {
        Self {
            client: None,
            connected: Arc::new(AtomicBool::new(false)),
            inbox,
        }
    }
}

impl Transport for EspMqttTransport {
    fn connect(
        &mut self,
        endpoint: &Endpoint,
        credentials: &Credentials,
        timeout_ms: u32,
    ) -> Result<(), TransportError> {
        self.disconnect();

        let scheme = if endpoint.secure { "mqtts" } else { "mqtt" };
        let url = format!("{scheme}://{}:{}", endpoint.host, endpoint.port);
        let conf = MqttClientConfiguration {
            client_id: Some(endpoint.client_id.as_str()),
            username: credentials.user.as_deref(),
            password: credentials.password.as_deref(),
            keep_alive_interval: Some(Duration::from_secs(u64::from(endpoint.keepalive_secs))),
            network_timeout: Duration::from_millis(u64::from(timeout_ms)),
            crt_bundle_attach: if endpoint.secure {
                Some(esp_idf_sys::esp_crt_bundle_attach)
            } else {
                None
            },
            ..Default::default()
        };

        let connected = Arc::clone(&self.connected);
        let inbox = Arc::clone(&self.inbox);
        let client = EspMqttClient::new_cb(&url, &conf, move |event| match event.payload() {
            EventPayload::Connected(_) => connected.store(true, Ordering::Release),
            EventPayload::Disconnected => connected.store(false, Ordering::Release),
            EventPayload::Received { topic, data, .. } => {
                let accepted = inbox.deliver(topic.unwrap_or(""), data);
                debug!("MQTT: {accepted} line(s) queued");
            }
            EventPayload::Error(e) => warn!("MQTT: client error {e:?}"),
            _ => {}
        })
        .map_err(|e| {
            warn!("MQTT: client setup for {url} failed: {e}");
            TransportError::ConnectFailed
        })?;
        self.client = Some(client);

        let deadline = Instant::now() + Duration::from_millis(u64::from(timeout_ms));
        while !self.connected.load(Ordering::Acquire) {
            if Instant::now() >= deadline {
                warn!("MQTT: no CONNACK from {url} within {timeout_ms} ms");
                self.disconnect();
                return Err(TransportError::Timeout);
            }
            std::thread::sleep(CONNECT_POLL);
        }
        info!("MQTT: connected to {url} as {}", endpoint.client_id);
        Ok(())
    }

    fn subscribe(&mut self, topic: &str, qos: Qos) -> Result<(), TransportError> {
        let client = self.client.as_mut().ok_or(TransportError::SubscribeFailed)?;
        client.subscribe(topic, esp_qos(qos)).map_err(|e| {
            warn!("MQTT: subscribe {topic} failed: {e}");
            TransportError::SubscribeFailed
        })?;
        info!("MQTT: subscribed to {topic}");
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8], qos: Qos, _timeout_ms: u32) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(TransportError::PublishFailed);
        }
        let client = self.client.as_mut().ok_or(TransportError::PublishFailed)?;
        client.publish(topic, esp_qos(qos), false, payload).map_err(|e| {
            warn!("MQTT: publish to {topic} failed: {e}");
            TransportError::PublishFailed
        })?;
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.client.take().is_some() {
            info!("MQTT: session closed");
        }
        self.connected.store(false, Ordering::Release);
    }

    fn is_connected(&self) -> bool {
        self.client.is_some() && self.connected.load(Ordering::Acquire)
    }
}

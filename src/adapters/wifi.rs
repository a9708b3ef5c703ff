//! WLAN station link and SNTP client.
//!
//! Implements [`NetworkPort`], the boundary the connectivity supervisor
//! uses to check and rebuild the radio link underneath the MQTT session.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: [`WifiLink`] drives `esp_idf_svc::wifi`
//!   in blocking mode and owns the `EspSntp` service.
//! - **all other targets**: [`SimulatedLink`], a scriptable link for
//!   host-side tests and the simulator.
//!
//! Reconnect pacing (2 s doubling to 60 s) lives in the supervisor; a call
//! to [`NetworkPort::reconnect_link`] is always one immediate attempt.

use core::fmt;
use log::{info, warn};

use crate::app::ports::NetworkPort;
use crate::error::TransportError;

// ───────────────────────────────────────────────────────────────
// Credential validation
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkConfigError {
    InvalidSsid,
    InvalidPassword,
}

impl fmt::Display for LinkConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => {
                write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)")
            }
        }
    }
}

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

pub fn validate_ssid(ssid: &str) -> Result<(), LinkConfigError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(LinkConfigError::InvalidSsid);
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), LinkConfigError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(LinkConfigError::InvalidPassword);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF link
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use esp::WifiLink;

#[cfg(target_os = "espidf")]
mod esp {
    use esp_idf_svc::sntp::{EspSntp, SntpConf};
    use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};
    use esp_idf_sys::EspError;
    use log::{info, warn};

    use super::{validate_password, validate_ssid, LinkConfigError};
    use crate::app::ports::NetworkPort;
    use crate::error::TransportError;

    #[derive(Debug)]
    pub enum WifiSetupError {
        Config(LinkConfigError),
        Driver(EspError),
    }

    impl From<EspError> for WifiSetupError {
        fn from(e: EspError) -> Self {
            Self::Driver(e)
        }
    }

    impl core::fmt::Display for WifiSetupError {
        fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
            match self {
                Self::Config(e) => write!(f, "{e}"),
                Self::Driver(e) => write!(f, "wifi driver: {e}"),
            }
        }
    }

    impl std::error::Error for WifiSetupError {}

    pub struct WifiLink {
        wifi: BlockingWifi<EspWifi<'static>>,
        sntp: Option<EspSntp<'static>>,
        sntp_server: &'static str,
    }

    impl WifiLink {
        /// Configure station mode and start the driver. Association happens
        /// on the first [`NetworkPort::reconnect_link`].
        pub fn new(
            mut wifi: BlockingWifi<EspWifi<'static>>,
            ssid: &str,
            password: &str,
            sntp_server: &'static str,
        ) -> Result<Self, WifiSetupError> {
            validate_ssid(ssid).map_err(WifiSetupError::Config)?;
            validate_password(password).map_err(WifiSetupError::Config)?;

            let client = ClientConfiguration {
                ssid: ssid
                    .try_into()
                    .map_err(|_| WifiSetupError::Config(LinkConfigError::InvalidSsid))?,
                password: password
                    .try_into()
                    .map_err(|_| WifiSetupError::Config(LinkConfigError::InvalidPassword))?,
                auth_method: if password.is_empty() {
                    AuthMethod::None
                } else {
                    AuthMethod::WPA2Personal
                },
                ..Default::default()
            };
            wifi.set_configuration(&Configuration::Client(client))?;
            wifi.start()?;
            info!("WiFi: station started for '{ssid}'");

            Ok(Self {
                wifi,
                sntp: None,
                sntp_server,
            })
        }
    }

    impl NetworkPort for WifiLink {
        fn link_up(&self) -> bool {
            self.wifi.is_connected().unwrap_or(false)
        }

        fn reconnect_link(&mut self) -> Result<(), TransportError> {
            if self.wifi.is_connected().unwrap_or(false) {
                let _ = self.wifi.disconnect();
            }
            self.wifi.connect().map_err(|e| {
                warn!("WiFi: association failed: {e}");
                TransportError::LinkDown
            })?;
            self.wifi.wait_netif_up().map_err(|e| {
                warn!("WiFi: no IP: {e}");
                TransportError::LinkDown
            })?;
            info!("WiFi: link up");
            Ok(())
        }

        fn set_time_sync(&mut self, enabled: bool) {
            if !enabled {
                if self.sntp.take().is_some() {
                    info!("SNTP: stopped");
                }
                return;
            }
            if self.sntp.is_some() {
                return;
            }
            let conf = SntpConf {
                servers: [self.sntp_server],
                ..Default::default()
            };
            match EspSntp::new(&conf) {
                Ok(sntp) => {
                    info!("SNTP: started ({})", self.sntp_server);
                    self.sntp = Some(sntp);
                }
                Err(e) => warn!("SNTP: start failed: {e}"),
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Simulated link
// ───────────────────────────────────────────────────────────────

/// Host-side link: up after the first successful reconnect, with
/// scriptable failures and drops.
#[derive(Debug, Default)]
pub struct SimulatedLink {
    up: bool,
    time_sync: bool,
    fail_next: u32,
    reconnects: u32,
}

impl SimulatedLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A link that starts associated.
    pub fn connected() -> Self {
        Self {
            up: true,
            ..Self::default()
        }
    }

    /// Simulate losing the access point.
    pub fn drop_link(&mut self) {
        warn!("WiFi(sim): link dropped");
        self.up = false;
    }

    /// Make the next `n` reconnect attempts fail.
    pub fn fail_next(&mut self, n: u32) {
        self.fail_next = n;
    }

    pub fn time_sync_enabled(&self) -> bool {
        self.time_sync
    }

    pub fn reconnects(&self) -> u32 {
        self.reconnects
    }
}

impl NetworkPort for SimulatedLink {
    fn link_up(&self) -> bool {
        self.up
    }

    fn reconnect_link(&mut self) -> Result<(), TransportError> {
        self.reconnects += 1;
        if self.fail_next > 0 {
            self.fail_next -= 1;
            self.up = false;
            warn!("WiFi(sim): reconnect attempt {} failed", self.reconnects);
            return Err(TransportError::LinkDown);
        }
        self.up = true;
        info!("WiFi(sim): link up (attempt {})", self.reconnects);
        Ok(())
    }

    fn set_time_sync(&mut self, enabled: bool) {
        self.time_sync = enabled;
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────

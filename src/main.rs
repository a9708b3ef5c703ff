//! XDK Cumulocity agent — firmware entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  EspMqttTransport  WifiLink        SimulatedSensors  Board     │
//! │  (Transport)       (NetworkPort)   (SensorSource)    (Device)  │
//! │  FileStore ×2      ButtonPanel ──▶ CommandInbox                │
//! │  (PersistentStore)                                             │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │                Engine (pure logic)                     │    │
//! │  │  executor · progress · telemetry · supervisor          │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  Scheduler (asset tick · sensor tick · restart)                │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::time::Duration;

use anyhow::Result;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_hal::gpio::{PinDriver, Pull};
use esp_idf_hal::prelude::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};
use log::{error, info, warn};

use c8y_agent::adapters::board::Board;
use c8y_agent::adapters::device_id;
use c8y_agent::adapters::mqtt::EspMqttTransport;
use c8y_agent::adapters::sensors::SimulatedSensors;
use c8y_agent::adapters::storage::{FileStore, FLASH_MOUNT, SD_CARD_MOUNT};
use c8y_agent::adapters::time::MonotonicClock;
use c8y_agent::adapters::wifi::WifiLink;
use c8y_agent::app::ports::{DevicePort, PersistentStore};
use c8y_agent::app::service::{Engine, EngineSettings, Ports};
use c8y_agent::config::parser::{factory_reset, merge_config};
use c8y_agent::config::{ConfigKey, ConfigStore};
use c8y_agent::diagnostics::{save_restart_record, RestartReason, RestartRecord};
use c8y_agent::drivers::button::ButtonPanel;

/// Upper bound on one main-loop sleep so buttons stay responsive.
const MAX_LOOP_SLEEP_MS: u64 = 20;

/// Register the internal flash partition at [`FLASH_MOUNT`].
fn mount_flash() -> Result<()> {
    let base = std::ffi::CString::new(FLASH_MOUNT)?;
    let conf = esp_idf_sys::esp_vfs_spiffs_conf_t {
        base_path: base.as_ptr(),
        partition_label: core::ptr::null(),
        max_files: 4,
        format_if_mount_failed: true,
    };
    // SAFETY: `conf` and the path it points to outlive the call; the VFS
    // copies the base path.
    esp_idf_sys::esp!(unsafe { esp_idf_sys::esp_vfs_spiffs_register(&conf) })?;
    Ok(())
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  XDK C8Y Agent v{}                ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    // ── 2. Buttons, LED, storage ──────────────────────────────
    let mut button1 = PinDriver::input(peripherals.pins.gpio0)?;
    button1.set_pull(Pull::Up)?;
    let mut button2 = PinDriver::input(peripherals.pins.gpio4)?;
    button2.set_pull(Pull::Up)?;
    let mut buttons = ButtonPanel::new(button1, button2);
    let mut board = Board::new(PinDriver::output(peripherals.pins.gpio2)?);

    if let Err(e) = mount_flash() {
        warn!("Storage: flash mount failed ({e}), running without persistence");
    }
    let mut flash = FileStore::new(FLASH_MOUNT);
    let sd_card = FileStore::new(SD_CARD_MOUNT);

    if buttons.factory_reset_requested() {
        warn!("Boot: button 2 held, factory reset");
        if let Err(e) = factory_reset(&mut flash) {
            error!("Boot: factory reset failed: {e}");
        }
    }

    // ── 3. Configuration ──────────────────────────────────────
    let mut config = ConfigStore::new();
    let override_source: Option<&dyn PersistentStore> = Some(&sd_card);
    match merge_config(&mut config, &flash, override_source) {
        Ok(outcome) => info!("Config: primary {:?}, override {:?}", outcome.primary, outcome.secondary),
        Err(e) => {
            error!("Config: {e}, restarting");
            let record = RestartRecord {
                reason: RestartReason::ConfigInvalid,
                uptime_ms: 0,
                consecutive_failures: 0,
            };
            if let Err(e) = save_restart_record(&mut flash, &record) {
                warn!("Config: restart record not saved: {e}");
            }
            std::thread::sleep(Duration::from_secs(5));
            board.restart();
            return Ok(());
        }
    }
    config.list();

    // ── 4. Identity and network ───────────────────────────────
    let mac = device_id::read_mac();
    let dev_id = device_id::device_id(&mac);
    info!("Device ID: {dev_id}");

    let sntp_server: &'static str = Box::leak(config.get(ConfigKey::SntpName).to_owned().into_boxed_str());
    let wifi = BlockingWifi::wrap(EspWifi::new(peripherals.modem, sysloop.clone(), Some(nvs))?, sysloop)?;
    let mut network = WifiLink::new(
        wifi,
        config.get(ConfigKey::WifiSsid),
        config.get(ConfigKey::WifiPassword),
        sntp_server,
    )?;

    // ── 5. Engine ─────────────────────────────────────────────
    let clock = MonotonicClock::new();
    let mut engine = Engine::new(config, &dev_id, EngineSettings::default());
    let inbox = engine.inbox();
    let mut transport = EspMqttTransport::new(engine.inbox());
    let mut sensors = SimulatedSensors::new();

    engine.start(clock.now_ms(), &mut flash);
    info!("System ready. Entering main loop.");

    // ── 6. Main loop ──────────────────────────────────────────
    loop {
        let now = clock.now_ms();
        buttons.poll(now as u32, engine.is_publishing(), &inbox);

        let mut ports = Ports {
            transport: &mut transport,
            network: &mut network,
            sensors: &mut sensors,
            device: &mut board,
            store: &mut flash,
        };
        let wait_ms = engine.poll(now, &mut ports);
        std::thread::sleep(Duration::from_millis(wait_ms.clamp(1, MAX_LOOP_SLEEP_MS)));
    }
}

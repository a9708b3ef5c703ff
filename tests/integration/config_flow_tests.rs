//! Configuration across storage media and restarts.

use c8y_agent::adapters::storage::MemoryStore;
use c8y_agent::app::ports::PersistentStore;
use c8y_agent::config::parser::{factory_reset, merge_config, write_config, SourceStatus};
use c8y_agent::config::{BootMode, ConfigKey, ConfigStore, CONFIG_FILE};
use c8y_agent::error::ConfigError;

use c8y_agent::protocol::TOPIC_ASSET_STREAM;

use crate::mock_hw::{operation_config, Rig};

#[test]
fn override_card_wins_over_flash() {
    let flash = MemoryStore::with_file(CONFIG_FILE, b"WIFISSID=home\nSTREAMRATE=2000\n");
    let card = MemoryStore::with_file(CONFIG_FILE, b"STREAMRATE=1000");

    let mut config = ConfigStore::new();
    let outcome = merge_config(&mut config, &flash, Some(&card)).unwrap();

    assert_eq!(outcome.primary, SourceStatus::Parsed);
    assert_eq!(outcome.secondary, SourceStatus::Parsed);
    assert_eq!(config.get(ConfigKey::WifiSsid), "home");
    assert_eq!(config.stream_rate_ms(), 1000);
}

#[test]
fn broken_flash_is_rescued_by_card() {
    let flash = MemoryStore::with_file(CONFIG_FILE, b"WIFISSID home\n");
    let card = MemoryStore::with_file(CONFIG_FILE, b"WIFISSID=cafe\n");

    let mut config = ConfigStore::new();
    let outcome = merge_config(&mut config, &flash, Some(&card)).unwrap();

    assert!(matches!(outcome.primary, SourceStatus::Invalid(_)));
    assert_eq!(config.get(ConfigKey::WifiSsid), "cafe");
}

#[test]
fn only_broken_sources_is_an_error() {
    let flash = MemoryStore::with_file(CONFIG_FILE, b"=oops\n");

    let mut config = ConfigStore::new();
    assert_eq!(
        merge_config(&mut config, &flash, None),
        Err(ConfigError::NoValidSource)
    );
}

#[test]
fn no_sources_means_registration_defaults() {
    let mut card = MemoryStore::new();
    card.set_available(false);

    let mut config = ConfigStore::new();
    let outcome = merge_config(&mut config, &MemoryStore::new(), Some(&card)).unwrap();

    assert!(outcome.is_defaults_only());
    assert_eq!(config.boot_mode(), BootMode::Registration);
}

#[test]
fn runtime_change_survives_restart() {
    let mut first = ConfigStore::new();
    first.set(ConfigKey::MqttUser, "t100/device_xdk");
    let mut flash = MemoryStore::new();
    write_config(&first, &mut flash).unwrap();

    let mut rig = Rig::with(first, Default::default(), flash);
    rig.poll(0);
    rig.receive("s/dc/XDK", "511,XDK,sensor:LIGHT:FALSE");
    rig.poll(500);

    let mut reloaded = ConfigStore::new();
    merge_config(&mut reloaded, &rig.store, None).unwrap();
    assert_eq!(reloaded.get(ConfigKey::Light), "FALSE");
    assert_eq!(reloaded.boot_mode(), BootMode::Operation);
}

fn rig_with_saved_config() -> Rig {
    let mut first = operation_config();
    first.set(ConfigKey::WifiSsid, "home");
    let mut flash = MemoryStore::new();
    write_config(&first, &mut flash).unwrap();
    let mut rig = Rig::with(first, Default::default(), flash);
    rig.poll(0);
    rig
}

fn reload(store: &MemoryStore) -> ConfigStore {
    let mut reloaded = ConfigStore::new();
    merge_config(&mut reloaded, store, None).expect("saved config must parse");
    reloaded
}

#[test]
fn config_value_with_comment_marker_is_refused_and_flash_stays_readable() {
    let mut rig = rig_with_saved_config();
    rig.receive("s/ds", "511,XDK,config:WIFIPASSWORD:my pass #1");
    rig.run(1000, 3000, 1000);

    let lines = rig.transport.lines(TOPIC_ASSET_STREAM);
    assert!(lines.contains(&"502,c8y_Command,\"Invalid value\"".to_owned()));
    assert!(!lines.contains(&"503,c8y_Command".to_owned()));
    assert_eq!(rig.engine.config().get(ConfigKey::WifiPassword), "TBD");
    let reloaded = reload(&rig.store);
    assert_eq!(reloaded.get(ConfigKey::WifiPassword), "TBD");
    assert_eq!(reloaded.get(ConfigKey::MqttPassword), "secret");
}

#[test]
fn tab_in_config_value_is_refused() {
    let mut rig = rig_with_saved_config();
    rig.receive("s/ds", "511,XDK,config:WIFISSID:Lab\tNet");
    rig.run(1000, 3000, 1000);

    assert_eq!(rig.engine.config().get(ConfigKey::WifiSsid), "home");
    assert_eq!(reload(&rig.store).get(ConfigKey::WifiSsid), "home");
}

#[test]
fn accepted_config_value_reads_back_after_restart() {
    let mut rig = rig_with_saved_config();
    rig.receive("s/ds", "511,XDK,config:WIFIPASSWORD:p#ss word");
    rig.run(1000, 3000, 1000);

    let lines = rig.transport.lines(TOPIC_ASSET_STREAM);
    assert!(lines.contains(&"503,c8y_Command".to_owned()));
    assert_eq!(reload(&rig.store).get(ConfigKey::WifiPassword), "p#ss word");
}

#[test]
fn factory_reset_removes_config_file() {
    let mut flash = MemoryStore::with_file(CONFIG_FILE, b"WIFISSID=home\n");
    factory_reset(&mut flash).unwrap();
    assert!(!flash.contains(CONFIG_FILE));
    assert!(flash.read_file(CONFIG_FILE).is_err());

    // A second reset is harmless.
    factory_reset(&mut flash).unwrap();
}

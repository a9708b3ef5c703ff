//! Engine end-to-end: inbound lines → acknowledgments → published payloads.

use c8y_agent::adapters::storage::MemoryStore;
use c8y_agent::app::ports::PersistentStore;
use c8y_agent::app::service::{AssetUpdatePhase, EngineSettings, RestartState};
use c8y_agent::app::supervisor::SupervisorSettings;
use c8y_agent::config::{ConfigKey, ConfigStore, CONFIG_FILE};
use c8y_agent::diagnostics::{
    save_restart_record, take_restart_record, RestartReason, RestartRecord, BOOT_STATUS_FILE,
    RESTART_RECORD_FILE,
};
use c8y_agent::protocol::command::device_line;
use c8y_agent::protocol::{Qos, TOPIC_ASSET_STREAM, TOPIC_DATA_STREAM, TOPIC_REGISTRATION_UP};

use crate::mock_hw::{operation_config, HeldAssetLock, Rig, DEVICE_ID};

fn op_line(body: &str) -> String {
    format!("511,{DEVICE_ID},{body}")
}

// ── Registration metadata ─────────────────────────────────────

#[test]
fn first_tick_publishes_device_registration() {
    let mut rig = Rig::operating();
    rig.poll(0);

    let first = &rig.transport.published[0];
    assert_eq!(first.topic, TOPIC_ASSET_STREAM);
    assert_eq!(first.qos, Qos::AtLeastOnce);

    let lines = rig.transport.lines(TOPIC_ASSET_STREAM);
    assert_eq!(lines[0], format!("100,\"{DEVICE_ID}\",c8y_XDKDevice"));
    assert_eq!(lines[1], "114,c8y_Restart,c8y_Message,c8y_Command,c8y_Firmware");
    assert!(lines[2].starts_with("113,\"STREAMRATE=5000\nACCEL=TRUE"));
    assert_eq!(lines[3], "117,5");
    assert_eq!(lines[4], "115,XDK_C8Y_Agent,1.0,");
    assert_eq!(rig.engine.asset_phase(), AssetUpdatePhase::Completed);
}

#[test]
fn session_uses_device_identity_and_time_sync() {
    let mut rig = Rig::operating();
    rig.poll(0);

    assert_eq!(rig.transport.connects, 1);
    assert_eq!(rig.transport.last_client_id.as_deref(), Some("d:XDK_DE_AD_BE_EF_CA_FE"));
    assert_eq!(rig.transport.last_user.as_deref(), Some("t100/device_xdk"));
    assert!(rig.network.time_sync_enabled());
}

#[test]
fn subscriptions_follow_first_publish_after_delay() {
    let mut rig = Rig::operating();
    rig.poll(0);
    rig.run(1000, 4000, 1000);
    assert!(rig.transport.subscriptions.is_empty());

    rig.poll(5000);
    assert_eq!(rig.transport.subscriptions, vec!["s/ds", "s/dc/XDK"]);
}

// ── Acknowledgments ───────────────────────────────────────────

#[test]
fn config_change_resends_summary_and_acks() {
    let mut rig = Rig::operating();
    rig.poll(0);

    rig.receive("s/ds", &op_line("speed:1000"));
    rig.poll(500);
    assert_eq!(rig.engine.asset_phase(), AssetUpdatePhase::Waiting);
    rig.poll(1000);
    rig.poll(2000);

    let lines = rig.transport.lines(TOPIC_ASSET_STREAM);
    let summary = lines
        .iter()
        .position(|l| l.starts_with("113,\"STREAMRATE=1000"))
        .expect("summary re-sent");
    let executing = lines.iter().position(|l| l == "501,c8y_Command").expect("501");
    let successful = lines.iter().position(|l| l == "503,c8y_Command").expect("503");
    assert!(summary < successful);
    assert!(executing < successful);

    let saved = rig.store.read_file(CONFIG_FILE).unwrap();
    assert!(String::from_utf8(saved).unwrap().contains("STREAMRATE=1000\n"));
    assert_eq!(rig.engine.asset_phase(), AssetUpdatePhase::Completed);
}

#[test]
fn unknown_verb_fails_with_reason() {
    let mut rig = Rig::operating();
    rig.poll(0);

    rig.receive("s/dc/XDK", &op_line("dance"));
    rig.run(1000, 2000, 1000);

    let lines = rig.transport.lines(TOPIC_ASSET_STREAM);
    assert!(lines.contains(&"501,c8y_Command".to_owned()));
    assert!(lines.contains(&"502,c8y_Command,\"Command unknown\"".to_owned()));
    assert!(rig.engine.progress().is_idle());
}

#[test]
fn toggle_completes_in_one_tick() {
    let mut rig = Rig::operating();
    rig.poll(0);

    rig.receive("s/dc/XDK", &op_line("toggle"));
    rig.poll(1000);

    assert_eq!(rig.device.led_toggles, 1);
    let lines = rig.transport.lines(TOPIC_ASSET_STREAM);
    let tail = &lines[lines.len() - 3..];
    assert_eq!(tail[0], "501,c8y_Command");
    assert_eq!(tail[1], "503,c8y_Command");
    assert_eq!(tail[2], "400,c8y_CommandEvent,\"Executed toggle\"");
}

#[test]
fn button_gesture_is_acknowledged_as_button_event() {
    let mut rig = Rig::operating();
    rig.poll(0);

    rig.receive("local", &device_line("startButton"));
    rig.poll(1000);

    let lines = rig.transport.lines(TOPIC_ASSET_STREAM);
    assert_eq!(
        lines.last().map(String::as_str),
        Some("400,c8y_ButtonEvent,\"start publishing by button\"")
    );
}

#[test]
fn commands_queue_while_an_ack_is_in_flight() {
    let mut rig = Rig::operating();
    rig.poll(0);

    rig.receive("s/ds", &format!("{}\r\n{}", op_line("speed:1000"), op_line("toggle")));
    rig.poll(100);
    assert_eq!(rig.device.led_toggles, 0);

    // 501 then 503 for speed, then toggle runs.
    rig.run(1000, 3000, 1000);
    assert_eq!(rig.device.led_toggles, 1);
}

// ── Measurements ──────────────────────────────────────────────

#[test]
fn measurements_go_to_data_stream() {
    let mut rig = Rig::operating();
    rig.run(0, 5000, 1000);

    let data = rig.transport.lines(TOPIC_DATA_STREAM);
    assert_eq!(data, vec!["991,,1,2,3", "994,,500"]);
    let published = rig
        .transport
        .published
        .iter()
        .find(|p| p.topic == TOPIC_DATA_STREAM)
        .unwrap();
    assert_eq!(published.qos, Qos::AtMostOnce);
}

#[test]
fn stop_suppresses_only_measurements() {
    let mut rig = Rig::operating();
    rig.run(0, 5000, 1000);
    let before = rig.transport.on_topic(TOPIC_DATA_STREAM).len();
    assert_eq!(before, 1);

    rig.receive("s/dc/XDK", &op_line("stop"));
    rig.poll(5500);
    rig.run(6000, 20_000, 1000);

    assert!(!rig.engine.is_publishing());
    assert_eq!(rig.transport.on_topic(TOPIC_DATA_STREAM).len(), before);
    assert_eq!(rig.transport.count_lines(TOPIC_ASSET_STREAM, "503,c8y_Command"), 1);
}

#[test]
fn measurements_are_dropped_while_offline() {
    let mut rig = Rig::operating();
    rig.poll(0);
    rig.transport.refuse_connect = true;
    rig.transport.connected = false;
    rig.run(1000, 5000, 1000);
    rig.transport.refuse_connect = false;
    rig.run(6000, 9000, 1000);

    assert!(rig.transport.on_topic(TOPIC_DATA_STREAM).is_empty());
}

// ── Publish failures ──────────────────────────────────────────

#[test]
fn asset_lines_survive_a_failed_publish() {
    let mut rig = Rig::operating();
    rig.transport.fail_publishes = 1;
    rig.poll(0);
    assert!(rig.transport.published.is_empty());

    rig.poll(1000);
    assert_eq!(rig.transport.connects, 2);
    let lines = rig.transport.lines(TOPIC_ASSET_STREAM);
    assert_eq!(lines[0], format!("100,\"{DEVICE_ID}\",c8y_XDKDevice"));
    assert_eq!(rig.engine.diagnostics().publish_failures, 1);
}

// ── Restart ───────────────────────────────────────────────────

#[test]
fn operator_restart_acks_once_and_resets_after_grace() {
    let mut rig = Rig::operating();
    rig.poll(0);

    rig.receive("s/ds", &format!("510,{DEVICE_ID}"));
    rig.poll(100);
    rig.poll(1000);
    assert_eq!(rig.engine.restart_state(), RestartState::Scheduled(RestartReason::Operator));

    rig.receive("s/dc/XDK", &op_line("toggle"));
    rig.poll(1500);
    assert_eq!(rig.device.led_toggles, 0);

    rig.run(2000, 5000, 1000);
    assert_eq!(rig.device.restarts, 0);

    rig.poll(6000);
    assert_eq!(rig.device.restarts, 1);
    assert_eq!(rig.engine.restart_state(), RestartState::Done(RestartReason::Operator));
    assert_eq!(rig.store.read_file(BOOT_STATUS_FILE).unwrap(), b"1");
    assert!(!rig.transport.connected);

    rig.run(7000, 12_000, 1000);
    assert_eq!(rig.device.restarts, 1);
    assert_eq!(rig.transport.count_lines(TOPIC_ASSET_STREAM, "501,c8y_Restart"), 1);
    assert_eq!(
        rig.transport
            .count_lines(TOPIC_ASSET_STREAM, "502,c8y_Command,\"Restart pending\""),
        1
    );
}

#[test]
fn pending_restart_is_confirmed_after_boot() {
    let mut store = MemoryStore::with_file(BOOT_STATUS_FILE, b"1");
    save_restart_record(
        &mut store,
        &RestartRecord {
            reason: RestartReason::Operator,
            uptime_ms: 6000,
            consecutive_failures: 0,
        },
    )
    .unwrap();

    let mut rig = Rig::with(operation_config(), EngineSettings::default(), store);
    assert!(!rig.store.contains(RESTART_RECORD_FILE));
    rig.poll(0);

    let lines = rig.transport.lines(TOPIC_ASSET_STREAM);
    assert!(lines.contains(&"503,c8y_Restart".to_owned()));
    assert!(lines.contains(&"400,c8y_RestartEvent,\"Restarted: operator request\"".to_owned()));
    assert_eq!(rig.store.read_file(BOOT_STATUS_FILE).unwrap(), b"0");

    rig.run(1000, 3000, 1000);
    assert_eq!(rig.transport.count_lines(TOPIC_ASSET_STREAM, "503,c8y_Restart"), 1);
}

#[test]
fn refusal_lost_to_a_held_lock_does_not_stop_the_restart() {
    let settings = EngineSettings {
        lock_timeout_ms: 5,
        ..EngineSettings::default()
    };
    let mut rig = Rig::with(operation_config(), settings, MemoryStore::new());
    rig.poll(0);
    rig.receive("s/ds", &format!("510,{DEVICE_ID}"));
    rig.poll(100);
    rig.poll(1000);

    let held = HeldAssetLock::take(rig.engine.telemetry());
    rig.receive("s/dc/XDK", &op_line("toggle"));
    rig.poll(1500);
    drop(held);

    assert!(rig.engine.diagnostics().asset_lock_timeouts >= 1);
    rig.run(2000, 6000, 1000);
    assert_eq!(rig.device.restarts, 1);
    assert_eq!(rig.device.led_toggles, 0);
    assert_eq!(
        rig.transport
            .count_lines(TOPIC_ASSET_STREAM, "502,c8y_Command,\"Restart pending\""),
        0
    );
}

#[test]
fn starved_buffer_lock_restarts_the_device() {
    let settings = EngineSettings {
        lock_timeout_ms: 1,
        lock_starvation_limit: 3,
        ..EngineSettings::default()
    };
    let mut rig = Rig::with(operation_config(), settings, MemoryStore::new());

    let held = HeldAssetLock::take(rig.engine.telemetry());
    rig.run(0, 1000, 1000);
    assert_eq!(rig.engine.restart_state(), RestartState::None);

    rig.run(2000, 5000, 1000);
    drop(held);

    assert_eq!(
        rig.engine.restart_state(),
        RestartState::Done(RestartReason::LockStarvation)
    );
    assert_eq!(rig.device.restarts, 1);
    let record = take_restart_record(&mut rig.store).expect("record saved");
    assert_eq!(record.reason, RestartReason::LockStarvation);
}

#[test]
fn exhausted_reconnects_restart_exactly_once() {
    let settings = EngineSettings {
        exhausted_restart_cooldown_ms: 1000,
        supervisor: SupervisorSettings {
            max_failures: 2,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        },
        ..EngineSettings::default()
    };
    let mut rig = Rig::with(operation_config(), settings, MemoryStore::new());
    rig.transport.refuse_connect = true;

    rig.run(0, 2000, 1000);
    assert_eq!(
        rig.engine.restart_state(),
        RestartState::Scheduled(RestartReason::ConnectivityExhausted)
    );
    assert_eq!(rig.device.restarts, 0);

    rig.run(3000, 10_000, 1000);
    assert_eq!(rig.device.restarts, 1);
    assert!(!rig.store.contains(BOOT_STATUS_FILE));

    let record = take_restart_record(&mut rig.store).expect("record saved");
    assert_eq!(record.reason, RestartReason::ConnectivityExhausted);
    assert_eq!(record.consecutive_failures, 3);
}

#[test]
fn keepalive_reports_battery_and_uptime() {
    let mut rig = Rig::operating();
    rig.device.battery = Some(77);
    rig.run(0, 59_000, 1000);

    assert_eq!(rig.transport.count_lines(TOPIC_ASSET_STREAM, "212,77"), 1);
    assert_eq!(
        rig.transport
            .count_lines(TOPIC_ASSET_STREAM, "400,c8y_UptimeEvent,\"Uptime 59 s\""),
        1
    );
}

// ── Registration mode ─────────────────────────────────────────

#[test]
fn registration_mode_polls_for_credentials() {
    let mut rig = Rig::with(ConfigStore::new(), EngineSettings::default(), MemoryStore::new());
    rig.poll(0);

    assert_eq!(rig.transport.subscriptions, vec!["s/dcr"]);
    assert_eq!(rig.transport.on_topic(TOPIC_REGISTRATION_UP), vec!["\r\n"]);

    rig.run(1000, 4000, 1000);
    assert_eq!(rig.transport.on_topic(TOPIC_REGISTRATION_UP).len(), 1);
    rig.poll(5000);
    assert_eq!(rig.transport.on_topic(TOPIC_REGISTRATION_UP).len(), 2);
    assert!(rig.transport.on_topic(TOPIC_ASSET_STREAM).is_empty());
    assert!(rig.transport.on_topic(TOPIC_DATA_STREAM).is_empty());
}

#[test]
fn credentials_are_stored_and_trigger_restart() {
    let mut rig = Rig::with(ConfigStore::new(), EngineSettings::default(), MemoryStore::new());
    rig.poll(0);

    rig.receive("s/dcr", &format!("510,{DEVICE_ID}"));
    rig.receive("s/dcr", "70,t100,device_xdk,pw");
    rig.poll(500);
    assert_eq!(rig.engine.restart_state(), RestartState::Scheduled(RestartReason::Registered));

    let saved = String::from_utf8(rig.store.read_file(CONFIG_FILE).unwrap()).unwrap();
    assert!(saved.contains("MQTTUSER=t100/device_xdk\n"));
    assert!(saved.contains("MQTTPASSWORD=pw\n"));

    rig.run(1000, 3000, 1000);
    assert_eq!(rig.device.restarts, 1);
    assert!(rig.transport.lines(TOPIC_REGISTRATION_UP).is_empty());
}

// ── Inventory mirror ──────────────────────────────────────────

#[test]
fn inventory_mirror_follows_every_twelfth_sensor_tick() {
    let mut config = operation_config();
    config.set(ConfigKey::StreamRate, "1000");
    let mut rig = Rig::with(config, EngineSettings::default(), MemoryStore::new());
    let accel = format!("1991,{DEVICE_ID},1,2,3");
    let light = format!("1994,{DEVICE_ID},500");

    rig.run(0, 11_000, 1000);
    assert_eq!(rig.transport.count_lines(TOPIC_DATA_STREAM, "991,,1,2,3"), 11);
    assert_eq!(rig.transport.count_lines(TOPIC_ASSET_STREAM, &accel), 0);

    rig.poll(12_000);
    assert_eq!(rig.transport.count_lines(TOPIC_ASSET_STREAM, &accel), 1);
    assert_eq!(rig.transport.count_lines(TOPIC_ASSET_STREAM, &light), 1);
    assert!(rig
        .transport
        .lines(TOPIC_DATA_STREAM)
        .iter()
        .all(|l| !l.starts_with("199")));

    rig.run(13_000, 23_000, 1000);
    assert_eq!(rig.transport.count_lines(TOPIC_ASSET_STREAM, &accel), 1);
    rig.poll(24_000);
    assert_eq!(rig.transport.count_lines(TOPIC_ASSET_STREAM, &accel), 2);
}

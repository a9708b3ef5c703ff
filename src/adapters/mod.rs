//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements       | Connects to                     |
//! |-------------|------------------|---------------------------------|
//! | `board`     | DevicePort       | Reset, LED pin, battery gauge   |
//! | `device_id` | —                | eFuse MAC → `XDK_…` identity    |
//! | `mqtt`      | Transport        | ESP-IDF MQTT client (espidf)    |
//! | `sensors`   | SensorSource     | Simulated sensor cluster        |
//! | `storage`   | PersistentStore  | SPIFFS / SD card / memory       |
//! | `time`      | —                | Monotonic millisecond clock     |
//! | `wifi`      | NetworkPort      | ESP-IDF WiFi STA + SNTP         |

pub mod board;
pub mod device_id;
#[cfg(target_os = "espidf")]
pub mod mqtt;
pub mod sensors;
pub mod storage;
pub mod time;
pub mod wifi;

//! Device identity derived from the factory MAC address.
//!
//! The platform knows the device by `XDK_` followed by the six MAC bytes
//! in uppercase hex, underscore-separated (e.g. `XDK_DE_AD_BE_EF_CA_FE`).
//! The MQTT client id is the same string prefixed with `d:`.

use core::fmt::Write;

/// "XDK_XX_XX_XX_XX_XX_XX" is 21 chars.
pub type DeviceIdString = heapless::String<24>;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the station MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    // SAFETY: the buffer is exactly the six bytes the call writes.
    unsafe {
        esp_idf_sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

pub fn device_id(mac: &MacAddress) -> DeviceIdString {
    let mut id = DeviceIdString::new();
    let _ = write!(
        id,
        "XDK_{:02X}_{:02X}_{:02X}_{:02X}_{:02X}_{:02X}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    );
    id
}

/// MQTT client identifier for `device_id`.
pub fn client_id(device_id: &str) -> heapless::String<40> {
    let mut id = heapless::String::new();
    let _ = write!(id, "d:{device_id}");
    id
}

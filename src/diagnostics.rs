//! Restart bookkeeping and runtime diagnostics.
//!
//! Two small files survive a reset:
//!
//! - `reboot.txt` holds the boot status: `1` while an operator-requested
//!   restart still has to be confirmed to the platform, `0` otherwise.
//! - `restart.bin` holds the [`RestartRecord`] of the last deliberate
//!   restart, postcard-encoded. It is consumed on the next boot and
//!   reported as an event.
//!
//! [`EngineDiagnostics`] is the counter snapshot the engine exposes at
//! runtime.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::PersistentStore;
use crate::error::StorageError;

pub const BOOT_STATUS_FILE: &str = "reboot.txt";
pub const RESTART_RECORD_FILE: &str = "restart.bin";

// ───────────────────────────────────────────────────────────────
// Boot status
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootStatus {
    Clear,
    /// The previous run restarted on operator request and the platform
    /// has not seen the success acknowledgment yet.
    RestartPending,
}

/// A missing or unreadable file reads as [`BootStatus::Clear`].
pub fn read_boot_status(store: &dyn PersistentStore) -> BootStatus {
    match store.read_file(BOOT_STATUS_FILE) {
        Ok(bytes) if bytes.first() == Some(&b'1') => BootStatus::RestartPending,
        Ok(_) | Err(StorageError::NotFound) => BootStatus::Clear,
        Err(e) => {
            warn!("Diagnostics: boot status unreadable: {e}");
            BootStatus::Clear
        }
    }
}

pub fn write_boot_status(store: &mut dyn PersistentStore, status: BootStatus) -> Result<(), StorageError> {
    let flag: &[u8] = match status {
        BootStatus::Clear => b"0",
        BootStatus::RestartPending => b"1",
    };
    store.write_file(BOOT_STATUS_FILE, flag)
}

// ───────────────────────────────────────────────────────────────
// Restart record
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestartReason {
    /// `c8y_Restart` from the platform.
    Operator,
    /// Device credentials received in registration mode.
    Registered,
    /// Reconnect budget exhausted.
    ConnectivityExhausted,
    /// A telemetry buffer lock timed out too often in a row.
    LockStarvation,
    /// No configuration source could be parsed.
    ConfigInvalid,
}

impl RestartReason {
    pub fn describe(self) -> &'static str {
        match self {
            Self::Operator => "operator request",
            Self::Registered => "device registered",
            Self::ConnectivityExhausted => "connection lost",
            Self::LockStarvation => "buffer lock starvation",
            Self::ConfigInvalid => "invalid configuration",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartRecord {
    pub reason: RestartReason,
    pub uptime_ms: u64,
    pub consecutive_failures: u32,
}

pub fn save_restart_record(store: &mut dyn PersistentStore, record: &RestartRecord) -> Result<(), StorageError> {
    let bytes = postcard::to_allocvec(record).map_err(|_| StorageError::Io)?;
    store.write_file(RESTART_RECORD_FILE, &bytes)
}

/// Read and delete the record left by the previous run.
pub fn take_restart_record(store: &mut dyn PersistentStore) -> Option<RestartRecord> {
    let bytes = store.read_file(RESTART_RECORD_FILE).ok()?;
    if let Err(e) = store.delete_file(RESTART_RECORD_FILE) {
        warn!("Diagnostics: could not clear restart record: {e}");
    }
    match postcard::from_bytes::<RestartRecord>(&bytes) {
        Ok(record) => {
            info!(
                "Diagnostics: previous run restarted ({}) after {} ms",
                record.reason.describe(),
                record.uptime_ms
            );
            Some(record)
        }
        Err(_) => {
            warn!("Diagnostics: discarding corrupt restart record ({} bytes)", bytes.len());
            None
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Runtime counters
// ───────────────────────────────────────────────────────────────

/// Counter snapshot taken by [`Engine::diagnostics`](crate::app::service::Engine::diagnostics).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineDiagnostics {
    pub uptime_ms: u64,
    pub asset_ticks: u64,
    pub sensor_ticks: u64,
    pub sensor_lock_timeouts: u32,
    pub asset_lock_timeouts: u32,
    /// Inbound lines dropped because the command queue was full.
    pub dropped_commands: u32,
    /// Telemetry lines lost to buffer overflow.
    pub overflowed_lines: u32,
    pub publish_failures: u32,
    pub consecutive_connect_failures: u32,
    pub link_up: bool,
}

//! Cumulocity SmartREST agent library.
//!
//! Exposes the protocol engine, configuration store and adapters for the
//! firmware binary and for host-side integration testing. All
//! ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]`
//! within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod protocol;
pub mod scheduler;

pub mod adapters;
pub mod drivers;

mod esp_link_shims;

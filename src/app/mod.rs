//! Application core — pure domain logic, zero I/O.
//!
//! This module contains the protocol rules of the agent: command
//! execution and acknowledgment, telemetry buffering, connectivity
//! supervision and the engine that drives them on a timer cadence.
//! All interaction with hardware and the network happens through
//! **port traits** defined in [`ports`], keeping this layer fully
//! testable without real peripherals.

pub mod executor;
pub mod inbox;
pub mod ports;
pub mod progress;
pub mod service;
pub mod supervisor;
pub mod telemetry;

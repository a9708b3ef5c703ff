//! Telemetry buffers.
//!
//! Two bounded text buffers sit between the producers (sensor tick, asset
//! tick) and the publish loop:
//!
//! ```text
//!  sensor tick ──▶ SensorLines ──append──▶ ┌───────────────┐
//!                                          │ sensor buffer │──drain──▶ s/uc/XDK
//!                                          └───────────────┘
//!  asset tick  ──▶ AssetLines  ──append──▶ ┌───────────────┐
//!  mirror lines ─────────────────append──▶ │ asset buffer  │──drain──▶ s/us
//!                                          └───────────────┘   ▲
//!                                                 restore ─────┘ (publish failed)
//! ```
//!
//! Producers render into a private [`LineBuffer`] first and append it in
//! one step, so a buffer only ever holds whole `\r\n`-terminated lines.
//! Every lock acquisition has a deadline; a missed deadline is reported as
//! [`BufferError::LockTimeout`] and counted, never waited out.

use core::fmt::{self, Write as _};
use core::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use log::warn;

use crate::app::ports::SensorValues;
use crate::config::{ConfigStore, SensorKey};
use crate::error::BufferError;
use crate::protocol::{Channel, LineSink, Reading, LINE_END, MAX_LINE_LEN};

pub const SENSOR_BUFFER_CAPACITY: usize = 1024;
pub const ASSET_BUFFER_CAPACITY: usize = 1024;

/// Pause between lock attempts while waiting for a deadline.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Raw temperature divisor of the environmental sensor.
pub const TEMPERATURE_DIVISOR: f32 = 972.3;

/// Acoustic sensor output at the 94 dB reference level, 10^(-38/20).
pub const NOISE_REFERENCE_RATIO: f32 = 0.012_589_254;

// ───────────────────────────────────────────────────────────────
// LineBuffer
// ───────────────────────────────────────────────────────────────

/// Fixed-capacity text of whole protocol lines.
#[derive(Debug, Clone, Default)]
pub struct LineBuffer<const N: usize> {
    text: heapless::String<N>,
    lines: u32,
}

pub type SensorLines = LineBuffer<SENSOR_BUFFER_CAPACITY>;
pub type AssetLines = LineBuffer<ASSET_BUFFER_CAPACITY>;

/// Contents taken out of a buffer for publishing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    pub payload: String,
    pub lines: u32,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

impl<const N: usize> LineBuffer<N> {
    pub const fn new() -> Self {
        Self {
            text: heapless::String::new(),
            lines: 0,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn line_count(&self) -> u32 {
        self.lines
    }

    pub fn remaining(&self) -> usize {
        N - self.text.len()
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.lines = 0;
    }

    /// Append all of `other`, or nothing.
    pub fn append<const M: usize>(&mut self, other: &LineBuffer<M>) -> Result<(), BufferError> {
        self.append_text(other.as_str(), other.line_count())
    }

    fn append_text(&mut self, text: &str, lines: u32) -> Result<(), BufferError> {
        let available = self.remaining();
        if text.len() > available {
            return Err(BufferError::Overflow {
                needed: text.len(),
                available,
            });
        }
        self.text
            .push_str(text)
            .map_err(|()| BufferError::Overflow { needed: text.len(), available })?;
        self.lines += lines;
        Ok(())
    }

    /// Copy out the contents and clear.
    pub fn take(&mut self) -> Batch {
        let batch = Batch {
            payload: self.text.as_str().to_owned(),
            lines: self.lines,
        };
        self.clear();
        batch
    }

    /// Put a batch back in front of whatever was appended since it was
    /// taken. Fails without change if both no longer fit.
    pub fn restore(&mut self, batch: &Batch) -> Result<(), BufferError> {
        let available = self.remaining();
        if batch.payload.len() > available {
            return Err(BufferError::Overflow {
                needed: batch.payload.len(),
                available,
            });
        }
        let newer = core::mem::take(&mut self.text);
        let newer_lines = self.lines;
        self.lines = 0;
        self.append_text(&batch.payload, batch.lines)?;
        self.append_text(&newer, newer_lines)
    }
}

impl<const N: usize> LineSink for LineBuffer<N> {
    fn push_line(&mut self, line: fmt::Arguments<'_>) -> Result<(), BufferError> {
        let mut rendered = heapless::String::<MAX_LINE_LEN>::new();
        write!(rendered, "{line}{LINE_END}").map_err(|_| BufferError::Overflow {
            needed: MAX_LINE_LEN + 1,
            available: MAX_LINE_LEN,
        })?;
        self.append_text(&rendered, 1)
    }
}

// ───────────────────────────────────────────────────────────────
// SharedBuffer
// ───────────────────────────────────────────────────────────────

/// A [`LineBuffer`] behind a try-lock with a deadline.
pub struct SharedBuffer<const N: usize> {
    name: &'static str,
    lock_timeout: Duration,
    inner: Mutex<CriticalSectionRawMutex, LineBuffer<N>>,
    lock_timeouts: AtomicU32,
    consecutive_timeouts: AtomicU32,
    overflowed_lines: AtomicU32,
}

impl<const N: usize> SharedBuffer<N> {
    pub const fn new(name: &'static str, lock_timeout: Duration) -> Self {
        Self {
            name,
            lock_timeout,
            inner: Mutex::new(LineBuffer::new()),
            lock_timeouts: AtomicU32::new(0),
            consecutive_timeouts: AtomicU32::new(0),
            overflowed_lines: AtomicU32::new(0),
        }
    }

    /// Run `f` on the buffer once the lock is held, or give up at the
    /// deadline.
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut LineBuffer<N>) -> R) -> Result<R, BufferError> {
        let deadline = Instant::now() + self.lock_timeout;
        loop {
            if let Ok(mut guard) = self.inner.try_lock() {
                self.consecutive_timeouts.store(0, Ordering::Relaxed);
                return Ok(f(&mut guard));
            }
            if Instant::now() >= deadline {
                self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
                let streak = self.consecutive_timeouts.fetch_add(1, Ordering::Relaxed) + 1;
                warn!("Telemetry: {} buffer lock timeout ({} in a row)", self.name, streak);
                return Err(BufferError::LockTimeout);
            }
            std::thread::sleep(LOCK_POLL_INTERVAL);
        }
    }

    /// Append a rendered batch of lines, whole or not at all.
    pub fn append<const M: usize>(&self, lines: &LineBuffer<M>) -> Result<(), BufferError> {
        if lines.is_empty() {
            return Ok(());
        }
        let result = self.with_lock(|buf| buf.append(lines))?;
        if let Err(e) = result {
            self.overflowed_lines.fetch_add(lines.line_count(), Ordering::Relaxed);
            warn!("Telemetry: {} buffer dropped {} lines: {e}", self.name, lines.line_count());
        }
        result
    }

    /// Copy out and clear under one lock hold.
    pub fn drain(&self) -> Result<Batch, BufferError> {
        self.with_lock(LineBuffer::take)
    }

    /// Return an unpublished batch to the front of the buffer.
    pub fn restore(&self, batch: &Batch) -> Result<(), BufferError> {
        let result = self.with_lock(|buf| buf.restore(batch))?;
        if let Err(e) = result {
            self.overflowed_lines.fetch_add(batch.lines, Ordering::Relaxed);
            warn!("Telemetry: {} buffer could not keep {} unsent lines: {e}", self.name, batch.lines);
        }
        result
    }

    pub fn lock_timeouts(&self) -> u32 {
        self.lock_timeouts.load(Ordering::Relaxed)
    }

    /// Timeouts since the last successful acquisition.
    pub fn consecutive_timeouts(&self) -> u32 {
        self.consecutive_timeouts.load(Ordering::Relaxed)
    }

    pub fn overflowed_lines(&self) -> u32 {
        self.overflowed_lines.load(Ordering::Relaxed)
    }
}

/// The sensor (measurement) and asset (everything else) buffers.
pub struct Telemetry {
    sensor: SharedBuffer<SENSOR_BUFFER_CAPACITY>,
    asset: SharedBuffer<ASSET_BUFFER_CAPACITY>,
}

impl Telemetry {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            sensor: SharedBuffer::new("sensor", lock_timeout),
            asset: SharedBuffer::new("asset", lock_timeout),
        }
    }

    pub fn sensor(&self) -> &SharedBuffer<SENSOR_BUFFER_CAPACITY> {
        &self.sensor
    }

    pub fn asset(&self) -> &SharedBuffer<ASSET_BUFFER_CAPACITY> {
        &self.asset
    }
}

// ───────────────────────────────────────────────────────────────
// Readings
// ───────────────────────────────────────────────────────────────

pub type Readings = heapless::Vec<(Channel, Reading), 9>;

/// Sound pressure relative to the acoustic reference level.
pub fn noise_level(raw: f32) -> f32 {
    raw / NOISE_REFERENCE_RATIO
}

/// Measurements for every channel that is enabled in `config` and was
/// read successfully.
pub fn collect_readings(values: &SensorValues, config: &ConfigStore) -> Readings {
    let mut out = Readings::new();
    let mut put = |channel, reading| {
        let _ = out.push((channel, reading));
    };
    let on = |sensor| config.is_sensor_enabled(sensor);

    if on(SensorKey::Accel) {
        if let Some([x, y, z]) = values.accel {
            put(Channel::Accel, Reading::Vector(x, y, z));
        }
    }
    if on(SensorKey::Gyro) {
        if let Some([x, y, z]) = values.gyro {
            put(Channel::Gyro, Reading::Vector(x, y, z));
        }
    }
    if on(SensorKey::Mag) {
        if let Some([x, y, z]) = values.mag {
            put(Channel::Mag, Reading::Vector(x, y, z));
        }
    }
    if on(SensorKey::Light) {
        if let Some(lux) = values.light_millilux {
            put(Channel::Light, Reading::Scalar(lux));
        }
    }
    if on(SensorKey::Env) {
        if let Some(rh) = values.humidity_percent {
            put(Channel::Humidity, Reading::Scalar(rh));
        }
        if let Some(raw) = values.temperature_raw {
            put(Channel::Temperature, Reading::Fixed(raw as f32 / TEMPERATURE_DIVISOR));
        }
        if let Some(pa) = values.pressure_pa {
            put(Channel::Pressure, Reading::Scalar(pa));
        }
    }
    if on(SensorKey::Noise) {
        if let Some(raw) = values.noise_raw {
            put(Channel::Noise, Reading::Fixed(noise_level(raw)));
        }
    }
    if on(SensorKey::Orientation) {
        if let Some([heading, pitch, roll]) = values.orientation {
            put(Channel::Orientation, Reading::FixedVector(heading, pitch, roll));
        }
    }
    out
}

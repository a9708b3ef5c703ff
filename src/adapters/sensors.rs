//! Simulated sensor board behind [`SensorSource`].
//!
//! Produces slowly varying, deterministic readings for every channel so
//! the measurement pipeline can run on the host and on boards without the
//! sensor cluster fitted. Tests can pin the output with
//! [`SimulatedSensors::fixed`] or knock out single channels.

use crate::app::ports::{SensorSource, SensorValues};

/// Readings repeat after this many samples.
const PERIOD: u32 = 64;

#[derive(Debug, Default)]
pub struct SimulatedSensors {
    sample: u32,
    fixed: Option<SensorValues>,
    failed_env: bool,
}

impl SimulatedSensors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always return `values`.
    pub fn fixed(values: SensorValues) -> Self {
        Self {
            fixed: Some(values),
            ..Self::default()
        }
    }

    /// Simulate a failed environmental sensor (humidity, temperature,
    /// pressure read as absent).
    pub fn fail_environment(&mut self, failed: bool) {
        self.failed_env = failed;
    }

    pub fn samples(&self) -> u32 {
        self.sample
    }

    fn waveform(&self) -> SensorValues {
        // Triangle wave 0..=PERIOD/2..0, signed around zero.
        let phase = self.sample % PERIOD;
        let tri = if phase < PERIOD / 2 { phase } else { PERIOD - phase } as i32;
        let swing = tri - (PERIOD as i32 / 4);

        SensorValues {
            accel: Some([swing * 4, -swing * 2, 1000 + swing]),
            gyro: Some([swing * 100, 0, -swing * 100]),
            mag: Some([20 + swing, -5, 40 - swing]),
            light_millilux: Some(150_000 + (tri as u32) * 1000),
            humidity_percent: Some(40 + (tri as u32) / 4),
            // 21.0 °C at the centre of the swing.
            temperature_raw: Some(20_418 + swing * 100),
            pressure_pa: Some(101_325u32.saturating_add_signed(swing * 10)),
            noise_raw: Some(0.02 + tri as f32 * 0.001),
            orientation: Some([(tri * 10) as f32, swing as f32, 0.0]),
        }
    }
}

impl SensorSource for SimulatedSensors {
    fn snapshot(&mut self) -> SensorValues {
        let mut values = self.fixed.unwrap_or_else(|| self.waveform());
        self.sample = self.sample.wrapping_add(1);
        if self.failed_env {
            values.humidity_percent = None;
            values.temperature_raw = None;
            values.pressure_pa = None;
        }
        values
    }
}

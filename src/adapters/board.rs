//! Board adapter: reset, indicator LED and battery gauge behind
//! [`DevicePort`].
//!
//! The LED is any `embedded_hal` output pin. The battery gauge is an
//! optional closure so the binary can wire an ADC channel without this
//! module depending on a particular HAL.
//!
//! On ESP-IDF `restart()` calls `esp_restart` and never returns. On the
//! host it only records the request so tests can assert on it.

use embedded_hal::digital::OutputPin;
use log::{info, warn};

use crate::app::ports::DevicePort;

pub type BatteryGauge = Box<dyn FnMut() -> Option<u8> + Send>;

pub struct Board<L> {
    led: L,
    led_on: bool,
    battery: Option<BatteryGauge>,
    restart_requests: u32,
}

impl<L: OutputPin> Board<L> {
    pub fn new(led: L) -> Self {
        Self {
            led,
            led_on: false,
            battery: None,
            restart_requests: 0,
        }
    }

    pub fn with_battery(mut self, gauge: BatteryGauge) -> Self {
        self.battery = Some(gauge);
        self
    }

    pub fn led_on(&self) -> bool {
        self.led_on
    }

    /// Restarts requested so far (host builds never actually reset).
    pub fn restart_requests(&self) -> u32 {
        self.restart_requests
    }
}

impl<L: OutputPin> DevicePort for Board<L> {
    fn restart(&mut self) {
        self.restart_requests += 1;
        info!("Board: restarting");

        #[cfg(target_os = "espidf")]
        unsafe {
            esp_idf_sys::esp_restart();
        }
    }

    fn toggle_led(&mut self) {
        let next = !self.led_on;
        let res = if next { self.led.set_high() } else { self.led.set_low() };
        match res {
            Ok(()) => self.led_on = next,
            Err(_) => warn!("Board: LED pin write failed"),
        }
    }

    fn battery_percent(&mut self) -> Option<u8> {
        self.battery.as_mut().and_then(|gauge| gauge()).map(|p| p.min(100))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;

    #[derive(Default)]
    struct FakeLed {
        high: bool,
    }

    impl embedded_hal::digital::ErrorType for FakeLed {
        type Error = Infallible;
    }

    impl OutputPin for FakeLed {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.high = false;
            Ok(())
        }
        fn set_high(&mut self) -> Result<(), Infallible> {
            self.high = true;
            Ok(())
        }
    }

    #[test]
    fn toggle_alternates() {
        let mut board = Board::new(FakeLed::default());
        board.toggle_led();
        assert!(board.led_on());
        assert!(board.led.high);
        board.toggle_led();
        assert!(!board.led_on());
        assert!(!board.led.high);
    }

    #[test]
    fn battery_absent_without_gauge() {
        let mut board = Board::new(FakeLed::default());
        assert_eq!(board.battery_percent(), None);
    }

    #[test]
    fn battery_is_clamped() {
        let mut board = Board::new(FakeLed::default()).with_battery(Box::new(|| Some(140)));
        assert_eq!(board.battery_percent(), Some(100));
    }

    #[test]
    fn restart_is_recorded_on_host() {
        let mut board = Board::new(FakeLed::default());
        board.restart();
        assert_eq!(board.restart_requests(), 1);
    }
}

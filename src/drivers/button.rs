//! Polled, debounced push buttons with short and long press detection.
//!
//! ## Hardware
//!
//! Two active-low momentary switches with pull-ups, read through
//! `embedded_hal::digital::InputPin`. `tick()` is called from the main
//! loop and runs the debounce + gesture state machine.
//!
//! ## Gestures
//!
//! | Gesture     | Condition                    | Event        |
//! |-------------|------------------------------|--------------|
//! | Short press | Released before 2 s          | `ShortPress` |
//! | Long press  | Held for 2 s (fires once)    | `LongPress`  |
//!
//! ## Commands
//!
//! Gestures become ordinary `511,DEVICE,<verb>` lines in the command
//! inbox, so they are executed and acknowledged like operator commands:
//!
//! | Button | Short press                    | Long press        |
//! |--------|--------------------------------|-------------------|
//! | 1      | `startButton` / `stopButton`   | `requestCommands` |
//! | 2      | `printConfig`                  | `resetBootstatus` |

use embedded_hal::digital::InputPin;
use log::{info, warn};

use crate::app::inbox::CommandInbox;
use crate::protocol::command::device_line;

const DEBOUNCE_MS: u32 = 50;
const LONG_PRESS_MS: u32 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    ShortPress,
    LongPress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonId {
    One,
    Two,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GestureState {
    Idle,
    DebounceWait { since_ms: u32 },
    Pressed { since_ms: u32 },
    /// Long press already reported; wait for release.
    Held,
}

pub struct ButtonDriver<P> {
    pin: P,
    state: GestureState,
}

impl<P: InputPin> ButtonDriver<P> {
    pub fn new(pin: P) -> Self {
        Self {
            pin,
            state: GestureState::Idle,
        }
    }

    /// Raw level; a read error counts as released.
    pub fn is_pressed(&mut self) -> bool {
        self.pin.is_low().unwrap_or(false)
    }

    /// Advance the gesture machine. `now_ms` is monotonic milliseconds.
    pub fn tick(&mut self, now_ms: u32) -> Option<ButtonEvent> {
        let pressed = self.is_pressed();
        match self.state {
            GestureState::Idle => {
                if pressed {
                    self.state = GestureState::DebounceWait { since_ms: now_ms };
                }
                None
            }
            GestureState::DebounceWait { since_ms } => {
                if !pressed {
                    self.state = GestureState::Idle;
                } else if now_ms.wrapping_sub(since_ms) >= DEBOUNCE_MS {
                    self.state = GestureState::Pressed { since_ms };
                }
                None
            }
            GestureState::Pressed { since_ms } => {
                if !pressed {
                    self.state = GestureState::Idle;
                    return Some(ButtonEvent::ShortPress);
                }
                if now_ms.wrapping_sub(since_ms) >= LONG_PRESS_MS {
                    self.state = GestureState::Held;
                    return Some(ButtonEvent::LongPress);
                }
                None
            }
            GestureState::Held => {
                if !pressed {
                    self.state = GestureState::Idle;
                }
                None
            }
        }
    }
}

/// Command verb for a gesture. Button 1's short press depends on whether
/// measurements are currently published.
pub fn gesture_verb(button: ButtonId, event: ButtonEvent, publishing: bool) -> &'static str {
    match (button, event) {
        (ButtonId::One, ButtonEvent::ShortPress) if publishing => "stopButton",
        (ButtonId::One, ButtonEvent::ShortPress) => "startButton",
        (ButtonId::One, ButtonEvent::LongPress) => "requestCommands",
        (ButtonId::Two, ButtonEvent::ShortPress) => "printConfig",
        (ButtonId::Two, ButtonEvent::LongPress) => "resetBootstatus",
    }
}

/// Both buttons, feeding the command inbox.
pub struct ButtonPanel<P1, P2> {
    one: ButtonDriver<P1>,
    two: ButtonDriver<P2>,
}

impl<P1: InputPin, P2: InputPin> ButtonPanel<P1, P2> {
    pub fn new(one: P1, two: P2) -> Self {
        Self {
            one: ButtonDriver::new(one),
            two: ButtonDriver::new(two),
        }
    }

    /// Button 2 held while booting requests a factory reset.
    pub fn factory_reset_requested(&mut self) -> bool {
        self.two.is_pressed()
    }

    /// Poll both buttons and enqueue a command line per gesture.
    pub fn poll(&mut self, now_ms: u32, publishing: bool, inbox: &CommandInbox) {
        let gestures = [
            (ButtonId::One, self.one.tick(now_ms)),
            (ButtonId::Two, self.two.tick(now_ms)),
        ];
        for (button, event) in gestures {
            let Some(event) = event else { continue };
            let verb = gesture_verb(button, event, publishing);
            info!("Button: {:?} {:?} -> {}", button, event, verb);
            if !inbox.push_line(&device_line(verb)) {
                warn!("Button: {verb} dropped, command queue full");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Pin whose level the test controls; `true` means pressed (low).
    #[derive(Clone, Default)]
    struct FakePin(Rc<Cell<bool>>);

    impl embedded_hal::digital::ErrorType for FakePin {
        type Error = Infallible;
    }

    impl InputPin for FakePin {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            Ok(!self.0.get())
        }
        fn is_low(&mut self) -> Result<bool, Infallible> {
            Ok(self.0.get())
        }
    }

    #[test]
    fn no_events_without_press() {
        let mut btn = ButtonDriver::new(FakePin::default());
        assert_eq!(btn.tick(100), None);
        assert_eq!(btn.tick(200), None);
    }

    #[test]
    fn bounce_is_filtered() {
        let pin = FakePin::default();
        let mut btn = ButtonDriver::new(pin.clone());
        pin.0.set(true);
        assert_eq!(btn.tick(100), None);
        pin.0.set(false);
        assert_eq!(btn.tick(120), None);
        assert_eq!(btn.tick(200), None);
    }

    #[test]
    fn short_press_on_release() {
        let pin = FakePin::default();
        let mut btn = ButtonDriver::new(pin.clone());
        pin.0.set(true);
        btn.tick(0);
        btn.tick(60);
        pin.0.set(false);
        assert_eq!(btn.tick(300), Some(ButtonEvent::ShortPress));
    }

    #[test]
    fn long_press_fires_once_while_held() {
        let pin = FakePin::default();
        let mut btn = ButtonDriver::new(pin.clone());
        pin.0.set(true);
        btn.tick(0);
        btn.tick(60);
        assert_eq!(btn.tick(2100), Some(ButtonEvent::LongPress));
        assert_eq!(btn.tick(4000), None);
        pin.0.set(false);
        assert_eq!(btn.tick(4100), None);
    }

    #[test]
    fn verbs_per_button() {
        assert_eq!(gesture_verb(ButtonId::One, ButtonEvent::ShortPress, true), "stopButton");
        assert_eq!(gesture_verb(ButtonId::One, ButtonEvent::ShortPress, false), "startButton");
        assert_eq!(gesture_verb(ButtonId::One, ButtonEvent::LongPress, true), "requestCommands");
        assert_eq!(gesture_verb(ButtonId::Two, ButtonEvent::ShortPress, true), "printConfig");
        assert_eq!(gesture_verb(ButtonId::Two, ButtonEvent::LongPress, true), "resetBootstatus");
    }

    #[test]
    fn panel_enqueues_device_lines() {
        let one = FakePin::default();
        let mut panel = ButtonPanel::new(one.clone(), FakePin::default());
        let inbox = CommandInbox::new();

        one.0.set(true);
        panel.poll(0, true, &inbox);
        panel.poll(60, true, &inbox);
        one.0.set(false);
        panel.poll(200, true, &inbox);

        assert_eq!(inbox.try_next().as_deref(), Some("511,DEVICE,stopButton"));
    }

    #[test]
    fn button_two_at_boot_requests_reset() {
        let two = FakePin::default();
        let mut panel = ButtonPanel::new(FakePin::default(), two.clone());
        assert!(!panel.factory_reset_requested());
        two.0.set(true);
        assert!(panel.factory_reset_requested());
    }
}

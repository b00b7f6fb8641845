//! Wake-on-input filter
//!
//! While the panel is blanked the backend puts a [`WakeFilter`] in front of
//! normal input handling. It swallows everything and reports a wake on:
//!
//! - a pointer button press
//! - a scroll
//! - release of the power key
//! - a double tap: two single-finger taps where the second goes down and
//!   comes up within the double-tap interval of the first going down

use std::time::Duration;

use smithay::backend::input::{
    ButtonState, Event, InputBackend, InputEvent, KeyState, KeyboardKeyEvent, PointerButtonEvent,
    TouchEvent, TouchSlot,
};

/// evdev `KEY_POWER`
pub const KEY_POWER: u32 = 116;

/// xkb keycodes are evdev codes shifted by 8
const XKB_KEYCODE_OFFSET: u32 = 8;

/// The parts of an input event the filter looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterEvent<S = TouchSlot> {
    PointerButton { button: u32, state: ButtonState },
    PointerAxis,
    /// `keycode` is an evdev code
    Key { keycode: u32, state: KeyState },
    TouchDown { slot: S, time_msec: u32 },
    TouchMotion { slot: S },
    TouchUp { slot: S, time_msec: u32 },
    /// Anything else (motion, gestures, tablets, switches)
    Other,
}

impl FilterEvent<TouchSlot> {
    pub fn from_input<B: InputBackend>(event: &InputEvent<B>) -> Self {
        match event {
            InputEvent::Keyboard { event } => FilterEvent::Key {
                keycode: event
                    .key_code()
                    .raw()
                    .saturating_sub(XKB_KEYCODE_OFFSET),
                state: event.state(),
            },
            InputEvent::PointerButton { event } => FilterEvent::PointerButton {
                button: event.button_code(),
                state: event.state(),
            },
            InputEvent::PointerAxis { .. } => FilterEvent::PointerAxis,
            InputEvent::TouchDown { event } => FilterEvent::TouchDown {
                slot: event.slot(),
                time_msec: event.time_msec(),
            },
            InputEvent::TouchMotion { event } => FilterEvent::TouchMotion { slot: event.slot() },
            InputEvent::TouchUp { event } => FilterEvent::TouchUp {
                slot: event.slot(),
                time_msec: event.time_msec(),
            },
            _ => FilterEvent::Other,
        }
    }
}

/// What the filter decided about one event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterAction {
    /// Normal input handling must not see the event
    pub consumed: bool,
    /// The panel should be unblanked
    pub wake: bool,
}

impl FilterAction {
    const PASS: FilterAction = FilterAction {
        consumed: false,
        wake: false,
    };
    const SWALLOW: FilterAction = FilterAction {
        consumed: true,
        wake: false,
    };
    const WAKE: FilterAction = FilterAction {
        consumed: true,
        wake: true,
    };
}

/// Blanked-state input filter with double-tap detection
#[derive(Debug)]
pub struct WakeFilter<S = TouchSlot> {
    double_tap_interval_ms: u32,
    touch_points: Vec<S>,
    /// Time the current tap sequence started
    first_tap: Option<u32>,
    second_tap: bool,
}

impl<S: Copy + PartialEq> WakeFilter<S> {
    pub fn new(double_tap_interval: Duration) -> Self {
        Self {
            double_tap_interval_ms: u32::try_from(double_tap_interval.as_millis())
                .unwrap_or(u32::MAX),
            touch_points: Vec::new(),
            first_tap: None,
            second_tap: false,
        }
    }

    fn within_interval(&self, start: u32, now: u32) -> bool {
        now.wrapping_sub(start) < self.double_tap_interval_ms
    }

    pub fn handle(&mut self, event: &FilterEvent<S>, blanked: bool) -> FilterAction {
        // Lifted touches are forgotten whatever the state
        if let FilterEvent::TouchUp { slot, .. } = event {
            self.touch_points.retain(|s| s != slot);
        }

        if !blanked {
            return FilterAction::PASS;
        }

        match *event {
            FilterEvent::PointerButton { state, .. } => {
                // The release of a waking click is swallowed without a second wake
                if state == ButtonState::Pressed {
                    FilterAction::WAKE
                } else {
                    FilterAction::SWALLOW
                }
            }
            FilterEvent::PointerAxis => FilterAction::WAKE,
            FilterEvent::Key { keycode, state } => {
                if keycode == KEY_POWER && state == KeyState::Released {
                    FilterAction::WAKE
                } else {
                    FilterAction::SWALLOW
                }
            }
            FilterEvent::TouchDown { slot, time_msec } => {
                self.touch_down(slot, time_msec);
                FilterAction::SWALLOW
            }
            FilterEvent::TouchUp { time_msec, .. } => {
                if self.touch_up(time_msec) {
                    FilterAction::WAKE
                } else {
                    FilterAction::SWALLOW
                }
            }
            FilterEvent::TouchMotion { .. } | FilterEvent::Other => FilterAction::SWALLOW,
        }
    }

    fn touch_down(&mut self, slot: S, time_msec: u32) {
        if self.touch_points.is_empty() {
            match self.first_tap {
                None => self.first_tap = Some(time_msec),
                Some(start) if self.within_interval(start, time_msec) => self.second_tap = true,
                // Too slow, this starts a new sequence
                Some(_) => {
                    self.first_tap = Some(time_msec);
                    self.second_tap = false;
                }
            }
        } else {
            // A second finger is not a tap
            self.first_tap = None;
            self.second_tap = false;
        }
        self.touch_points.push(slot);
    }

    /// Returns whether the lift completed a double tap
    fn touch_up(&mut self, time_msec: u32) -> bool {
        if !self.touch_points.is_empty() || !self.second_tap {
            return false;
        }
        let wake = self
            .first_tap
            .map_or(false, |start| self.within_interval(start, time_msec));
        self.first_tap = None;
        self.second_tap = false;
        wake
    }
}

//! Wake-on-input tests
//!
//! Events go through `filter_input` the way the compositor's input handler
//! would feed them, and the resulting unblank runs on the event loop.

use hwcomposer::hal::hwc2::POWER_MODE_ON;
use hwcomposer::input::KEY_POWER;
use hwcomposer::Config;
use smithay::backend::input::{ButtonState, KeyState};
use test_harness::assertions::{assert_blanked, assert_unblanked};
use test_harness::fixtures::{hwc2_backend, hwc2_device};
use test_harness::headless::inject;
use test_harness::{HalCall, MockModule, TestBackend};

const BTN_LEFT: u32 = 0x110;
const KEY_A: u32 = 30;

fn blanked_backend() -> TestBackend {
    let (mut tb, _device) = hwc2_backend();
    tb.backend.toggle_blank_output();
    assert_blanked(&tb);
    tb
}

fn feed(tb: &mut TestBackend, events: &[inject::TestEvent]) -> Vec<bool> {
    events.iter().map(|e| tb.backend.filter_input(e)).collect()
}

// ========== Pointer tests ==========

#[test]
fn click_wakes_once() {
    let (mut tb, device) = hwc2_backend();
    tb.backend.toggle_blank_output();

    let consumed = feed(
        &mut tb,
        &[
            inject::button(BTN_LEFT, ButtonState::Pressed, 10),
            inject::button(BTN_LEFT, ButtonState::Released, 60),
            inject::button(BTN_LEFT, ButtonState::Pressed, 70),
        ],
    );
    assert_eq!(consumed, vec![true, true, true]);
    // Queued, not applied inside the filter
    assert!(tb.backend.is_blanked());

    tb.dispatch();
    assert_unblanked(&tb, 0x7f);
    // Init, then a single wake
    assert_eq!(
        device.log().count(|c| *c == HalCall::PowerMode(POWER_MODE_ON)),
        2
    );
}

#[test]
fn scroll_wakes() {
    let mut tb = blanked_backend();
    assert!(tb.backend.filter_input(&inject::scroll(1.0, 10)));
    tb.dispatch();
    assert!(!tb.backend.is_blanked());
}

#[test]
fn events_pass_through_when_unblanked() {
    let (mut tb, _device) = hwc2_backend();
    let consumed = feed(
        &mut tb,
        &[
            inject::button(BTN_LEFT, ButtonState::Pressed, 10),
            inject::scroll(1.0, 20),
            inject::key(KEY_A, KeyState::Pressed, 30),
            inject::touch_down(0, 40),
            inject::touch_up(0, 50),
        ],
    );
    assert_eq!(consumed, vec![false; 5]);
    assert!(!tb.backend.filter_installed());
}

// ========== Key tests ==========

#[test]
fn power_key_wakes_on_release() {
    let mut tb = blanked_backend();

    assert!(tb.backend.filter_input(&inject::key(KEY_POWER, KeyState::Pressed, 10)));
    tb.dispatch();
    assert!(tb.backend.is_blanked());

    assert!(tb.backend.filter_input(&inject::key(KEY_POWER, KeyState::Released, 80)));
    tb.dispatch();
    assert!(!tb.backend.is_blanked());
}

#[test]
fn other_keys_are_swallowed_while_blanked() {
    let mut tb = blanked_backend();
    assert!(tb.backend.filter_input(&inject::key(KEY_A, KeyState::Pressed, 10)));
    assert!(tb.backend.filter_input(&inject::key(KEY_A, KeyState::Released, 20)));
    tb.dispatch();
    assert_blanked(&tb);
}

// ========== Touch tests ==========

#[test]
fn double_tap_wakes() {
    let mut tb = blanked_backend();
    let [down, up] = inject::tap(0, 50);
    let [down2, up2] = inject::tap(150, 200);

    let consumed = feed(&mut tb, &[down, up, down2, up2]);
    assert_eq!(consumed, vec![true; 4]);

    tb.dispatch();
    assert!(!tb.backend.is_blanked());
}

#[test]
fn slow_double_tap_does_not_wake() {
    let mut tb = blanked_backend();
    let [down, up] = inject::tap(0, 50);
    let [down2, up2] = inject::tap(600, 650);

    feed(&mut tb, &[down, up, down2, up2]);
    tb.dispatch();
    assert_blanked(&tb);
}

#[test]
fn single_tap_and_drag_are_swallowed() {
    let mut tb = blanked_backend();
    let consumed = feed(
        &mut tb,
        &[
            inject::touch_down(0, 0),
            inject::touch_motion(0, 20),
            inject::touch_motion(0, 40),
            inject::touch_up(0, 60),
        ],
    );
    assert_eq!(consumed, vec![true; 4]);
    tb.dispatch();
    assert_blanked(&tb);
}

#[test]
fn two_finger_tap_does_not_wake() {
    let mut tb = blanked_backend();
    feed(
        &mut tb,
        &[
            inject::touch_down(0, 0),
            inject::touch_up(0, 40),
            inject::touch_down(0, 100),
            inject::touch_down(1, 110),
            inject::touch_up(1, 130),
            inject::touch_up(0, 140),
        ],
    );
    tb.dispatch();
    assert_blanked(&tb);
}

#[test]
fn double_tap_interval_is_configurable() {
    let device = hwc2_device();
    let config = Config {
        double_tap_interval_ms: 1000,
        ..Config::default()
    };
    let mut tb = TestBackend::new(&MockModule::hwc2(device), config).unwrap();
    tb.backend.toggle_blank_output();

    let [down, up] = inject::tap(0, 50);
    let [down2, up2] = inject::tap(600, 650);
    feed(&mut tb, &[down, up, down2, up2]);
    tb.dispatch();
    assert!(!tb.backend.is_blanked());
}

#[test]
fn filter_starts_fresh_after_each_blank() {
    let mut tb = blanked_backend();
    // First half of a double tap, then an unrelated wake
    let [down, up] = inject::tap(0, 50);
    feed(&mut tb, &[down, up]);
    tb.backend.filter_input(&inject::scroll(1.0, 60));
    tb.dispatch();
    assert!(!tb.backend.is_blanked());

    tb.backend.toggle_blank_output();
    // A lone tap inside the old interval is only a first tap now
    let [down, up] = inject::tap(100, 150);
    feed(&mut tb, &[down, up]);
    tb.dispatch();
    assert_blanked(&tb);
}

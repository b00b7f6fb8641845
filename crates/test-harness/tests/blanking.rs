//! Blank/unblank and backlight tests

use hwcomposer::hal::hwc2::{POWER_MODE_OFF, POWER_MODE_ON};
use hwcomposer::hal::OpenError;
use hwcomposer::output::DpmsMode;
use hwcomposer::{BackendMessage, Config, DebugOverrides, HwcomposerBackend};
use test_harness::assertions::{assert_blanked, assert_unblanked};
use test_harness::fixtures::{hwc2_backend, hwc2_device};
use test_harness::headless::RecordingRenderLoop;
use test_harness::{HalCall, MockModule};

const DEFAULT_BRIGHTNESS: u8 = 0x7f;

// ========== Startup tests ==========

#[test]
fn backend_starts_unblanked() {
    let (tb, device) = hwc2_backend();

    assert_unblanked(&tb, DEFAULT_BRIGHTNESS);
    assert_eq!(device.log().power_calls(), vec![HalCall::PowerMode(POWER_MODE_ON)]);
    assert_eq!(tb.render_loop.repaints(), 1);
}

#[test]
fn configured_default_brightness_is_used() {
    let device = hwc2_device();
    let config = Config {
        default_brightness: 200,
        ..Config::default()
    };
    let tb = test_harness::TestBackend::new(&MockModule::hwc2(device), config).unwrap();
    assert_unblanked(&tb, 200);
}

// ========== Toggle tests ==========

#[test]
fn toggle_blanks_and_unblanks() {
    let (mut tb, device) = hwc2_backend();

    tb.backend.toggle_blank_output();
    assert_blanked(&tb);

    tb.backend.toggle_blank_output();
    assert_unblanked(&tb, DEFAULT_BRIGHTNESS);

    assert_eq!(
        device.log().power_calls(),
        vec![
            HalCall::PowerMode(POWER_MODE_ON),
            HalCall::PowerMode(POWER_MODE_OFF),
            HalCall::PowerMode(POWER_MODE_ON),
        ]
    );
}

#[test]
fn double_toggle_restores_state() {
    let (mut tb, _device) = hwc2_backend();
    let repaints = tb.render_loop.repaints();

    for _ in 0..3 {
        tb.backend.toggle_blank_output();
        tb.backend.toggle_blank_output();
    }

    assert_unblanked(&tb, DEFAULT_BRIGHTNESS);
    assert_eq!(tb.render_loop.repaints(), repaints + 3);
}

#[test]
fn blanking_turns_vsync_off() {
    let (mut tb, device) = hwc2_backend();
    tb.backend.vsync().set_enabled(true);

    tb.backend.toggle_blank_output();
    assert!(!tb.backend.vsync().is_enabled());
    assert_eq!(device.log().vsync_calls(), vec![true, false]);

    // Unblanking leaves it to the next present
    tb.backend.toggle_blank_output();
    assert!(!tb.backend.vsync().is_enabled());
}

#[test]
fn toggle_message_flips_state() {
    let (mut tb, _device) = hwc2_backend();
    tb.backend
        .message_sender()
        .send(BackendMessage::ToggleBlank)
        .unwrap();
    tb.dispatch();
    assert_blanked(&tb);
}

// ========== Brightness tests ==========

#[test]
fn brightness_change_is_restored_on_unblank() {
    let (mut tb, _device) = hwc2_backend();
    tb.backend
        .message_sender()
        .send(BackendMessage::BrightnessChanged(42))
        .unwrap();
    tb.dispatch();
    assert_eq!(tb.backend.brightness(), 42);

    tb.backend.toggle_blank_output();
    assert_blanked(&tb);
    tb.backend.toggle_blank_output();
    assert_unblanked(&tb, 42);
}

#[test]
fn backlight_color_packs_level() {
    let (mut tb, _device) = hwc2_backend();
    tb.backend.toggle_blank_output();
    tb.backend.toggle_blank_output();

    let colors = tb.lights.colors();
    assert_eq!(colors, vec![0xff7f_7f7f, 0xff00_0000, 0xff7f_7f7f]);
}

#[test]
fn missing_lights_hal_still_blanks() {
    let device = hwc2_device();
    let (mut backend, _sources) = HwcomposerBackend::new(
        &MockModule::hwc2(device.clone()),
        Err(OpenError::ModuleNotFound("lights")),
        Config::default(),
        DebugOverrides::default(),
        Box::new(RecordingRenderLoop::default()),
    )
    .unwrap();

    backend.toggle_blank_output();
    assert!(backend.is_blanked());
    assert_eq!(
        device.log().power_calls().last(),
        Some(&HalCall::PowerMode(POWER_MODE_OFF))
    );
}

// ========== DPMS tests ==========

#[test]
fn dpms_request_blanks_through_event_loop() {
    let (mut tb, _device) = hwc2_backend();

    tb.backend.output().request_dpms_mode(DpmsMode::Off);
    // Nothing happens until the backend handles it
    assert!(!tb.backend.is_blanked());
    tb.dispatch();
    assert_blanked(&tb);

    tb.backend.output().request_dpms_mode(DpmsMode::On);
    tb.dispatch();
    assert_unblanked(&tb, DEFAULT_BRIGHTNESS);
}

#[test]
fn repeated_dpms_request_is_a_no_op() {
    let (mut tb, device) = hwc2_backend();
    tb.backend.output().request_dpms_mode(DpmsMode::Off);
    tb.backend.output().request_dpms_mode(DpmsMode::Off);
    tb.dispatch();

    assert_blanked(&tb);
    assert_eq!(
        device.log().count(|c| *c == HalCall::PowerMode(POWER_MODE_OFF)),
        1
    );
}

// ========== Shutdown tests ==========

#[test]
fn drop_while_blanked_turns_panel_back_on() {
    let (mut tb, device) = hwc2_backend();
    let lights = tb.lights.clone();
    tb.backend.toggle_blank_output();
    assert_eq!(lights.last_level(), Some(0));

    drop(tb);

    assert_eq!(lights.last_level(), Some(DEFAULT_BRIGHTNESS));
    assert_eq!(
        device.log().power_calls().last(),
        Some(&HalCall::PowerMode(POWER_MODE_ON))
    );
}

#[test]
fn drop_while_unblanked_leaves_panel_alone() {
    let (tb, device) = hwc2_backend();
    let calls = device.log().power_calls().len();
    drop(tb);
    assert_eq!(device.log().power_calls().len(), calls);
}


//! Presentation surface tests
//!
//! Frame submission order, fence ownership and frame-drop recovery on the
//! HWC2 path.

use std::ffi::c_void;
use std::sync::Arc;

use hwcomposer::hal::hwc2::{self, POWER_MODE_ON};
use hwcomposer::hal::{BufferHandle, HalError};
use hwcomposer::surface::DropReason;
use hwcomposer::{Config, FrameOutcome};
use test_harness::assertions::{assert_call_order, assert_presented};
use test_harness::fixtures::{fence_pair, hwc2_backend, hwc2_config, signalled_fence_pair};
use test_harness::{HalCall, MockHwc2Device, MockModule, TestBackend};

fn buffer(n: usize) -> BufferHandle {
    BufferHandle::from_ptr((0x1000 * n) as *const c_void)
}

// ========== Submission order tests ==========

#[test]
fn frame_follows_validate_accept_target_present() {
    let (tb, device) = hwc2_backend();
    let mut surface = tb.backend.create_surface().unwrap();
    device.log().clear();

    let outcome = surface.present(buffer(1), None);
    assert!(outcome.is_presented());

    assert_call_order(
        device.log(),
        &[
            HalCall::PowerMode(POWER_MODE_ON),
            HalCall::Validate,
            HalCall::AcceptChanges,
            HalCall::SetClientTarget { fenced: false },
            HalCall::Present,
            HalCall::VsyncEnabled(true),
        ],
    );
    assert_eq!(surface.frames_presented(), 1);
}

#[test]
fn client_layer_covers_the_panel() {
    let (tb, device) = hwc2_backend();
    let surface = tb.backend.create_surface().unwrap();
    let setups = device.layer_setups();

    assert_eq!(setups.len(), 1);
    let setup = setups[0];
    assert_eq!(setup.composition_type, hwc2::COMPOSITION_CLIENT);
    assert_eq!(setup.blend_mode, hwc2::BLEND_MODE_NONE);
    assert_eq!(setup.display_frame, [0, 0, 1080, 1920]);
    assert_eq!(setup.source_crop, [0.0, 0.0, 1080.0, 1920.0]);
    assert_eq!(surface.buffer_count(), 3);
    assert_eq!(surface.size(), tb.backend.size());
}

#[test]
fn vsync_is_enabled_only_after_first_present() {
    let (tb, device) = hwc2_backend();
    let mut surface = tb.backend.create_surface().unwrap();
    assert!(!tb.backend.vsync().is_enabled());
    assert!(device.log().vsync_calls().is_empty());

    surface.present(buffer(1), None);
    surface.present(buffer(2), None);

    assert!(tb.backend.vsync().is_enabled());
    // Second frame found vsync already on
    assert_eq!(device.log().vsync_calls(), vec![true]);
}

// ========== Fence tests ==========

#[test]
fn previous_present_fence_closes_on_next_present() {
    let (tb, device) = hwc2_backend();
    let mut surface = tb.backend.create_surface().unwrap();

    let first = assert_presented(surface.present(buffer(1), None));
    assert!(first.is_some());
    drop(first);
    // The surface still holds its own copy
    assert!(device.present_probes()[0].is_open());
    assert!(surface.last_present_fence().is_some());

    drop(assert_presented(surface.present(buffer(2), None)));
    let probes = device.present_probes();
    assert!(!probes[0].is_open(), "first present fence should be retired");
    assert!(probes[1].is_open(), "latest present fence should be held");
}

#[test]
fn surface_drop_closes_held_fence() {
    let (tb, device) = hwc2_backend();
    let mut surface = tb.backend.create_surface().unwrap();
    drop(surface.present(buffer(1), None));
    assert!(device.present_probes()[0].is_open());

    drop(surface);
    assert!(!device.present_probes()[0].is_open());
}

#[test]
fn acquire_fence_is_waited_and_closed_before_set() {
    let (tb, device) = hwc2_backend();
    let mut surface = tb.backend.create_surface().unwrap();
    let (acquire, probe) = signalled_fence_pair();

    assert!(surface.present(buffer(1), Some(acquire)).is_presented());

    assert!(!probe.is_open());
    assert_eq!(device.log().count(|c| *c == HalCall::SetClientTarget { fenced: true }), 0);
    assert_eq!(device.log().count(|c| *c == HalCall::SetClientTarget { fenced: false }), 1);
}

#[test]
fn acquire_fence_is_handed_over_without_sync_before_set() {
    let device = Arc::new(MockHwc2Device::new(hwc2_config()));
    let config = Config {
        sync_before_set: false,
        ..Config::default()
    };
    let tb = TestBackend::new(&MockModule::hwc2(device.clone()), config).unwrap();
    let mut surface = tb.backend.create_surface().unwrap();
    // Unsignalled: the composer waits, not us
    let (acquire, probe) = fence_pair();

    assert!(surface.present(buffer(1), Some(acquire)).is_presented());

    assert_eq!(device.log().count(|c| *c == HalCall::SetClientTarget { fenced: true }), 1);
    // The mock composer closed it
    assert!(!probe.is_open());
}

// ========== Frame drop tests ==========

#[test]
fn validate_requesting_changes_drops_frame() {
    let (tb, device) = hwc2_backend();
    let mut surface = tb.backend.create_surface().unwrap();
    device.set_validate_result(hwc2::error::HAS_CHANGES, 1, 0);

    match surface.present(buffer(1), None) {
        FrameOutcome::Dropped(DropReason::Validate(HalError::ValidateRequiresChanges {
            types,
            requests,
        })) => assert_eq!((types, requests), (1, 0)),
        other => panic!("expected validate drop, got {other:?}"),
    }
    assert_eq!(device.log().count(|c| *c == HalCall::AcceptChanges), 0);
    assert_eq!(device.log().count(|c| *c == HalCall::Present), 0);
    assert_eq!(surface.frames_dropped(), 1);

    // The next frame goes through once the composer is happy
    device.set_validate_result(hwc2::error::NONE, 0, 0);
    assert!(surface.present(buffer(2), None).is_presented());
    assert_eq!(surface.frames_presented(), 1);
}

#[test]
fn validate_error_drops_frame() {
    let (tb, device) = hwc2_backend();
    let mut surface = tb.backend.create_surface().unwrap();
    device.set_validate_result(hwc2::error::BAD_DISPLAY, 0, 0);

    let outcome = surface.present(buffer(1), None);
    assert!(matches!(
        outcome,
        FrameOutcome::Dropped(DropReason::Validate(HalError::Fatal(hwc2::error::BAD_DISPLAY)))
    ));
    assert!(outcome.into_release_fence().is_none());
}

#[test]
fn failed_present_drops_frame_and_closes_its_fence() {
    let (tb, device) = hwc2_backend();
    let mut surface = tb.backend.create_surface().unwrap();
    drop(surface.present(buffer(1), None));

    device.set_present_code(hwc2::error::NO_RESOURCES);
    let outcome = surface.present(buffer(2), None);
    assert!(matches!(
        outcome,
        FrameOutcome::Dropped(DropReason::Present(HalError::Transient(hwc2::error::NO_RESOURCES)))
    ));

    let probes = device.present_probes();
    assert!(!probes[1].is_open(), "fence of the failed present must be closed");
    assert!(probes[0].is_open(), "last good fence stays held");
    drop(probes);

    device.set_present_code(hwc2::error::NONE);
    assert!(surface.present(buffer(3), None).is_presented());
    assert_eq!(surface.frames_presented(), 2);
    assert_eq!(surface.frames_dropped(), 1);
}

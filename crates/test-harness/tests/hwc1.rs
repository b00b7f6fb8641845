//! Legacy composer path tests
//!
//! The layer list, fence handling and power calls of the HWC1 adapter,
//! driven through the backend and the presentation surface.

use std::ffi::c_void;

use hwcomposer::hal::hwc1::{HWC_GEOMETRY_CHANGED, HWC_POWER_MODE_NORMAL, HWC_POWER_MODE_OFF};
use hwcomposer::hal::{ApiVersion, BufferHandle, HalError};
use hwcomposer::surface::DropReason;
use hwcomposer::FrameOutcome;
use smithay::utils::Size;
use test_harness::assertions::{assert_call_order, assert_presented};
use test_harness::fixtures::{hwc1_backend, signalled_fence_pair, TEST_HEIGHT, TEST_WIDTH};
use test_harness::HalCall;

const HWC_1_4: u32 = 0x0104_0001;
const HWC_1_3: u32 = 0x0103_0001;

fn buffer(n: usize) -> BufferHandle {
    BufferHandle::from_ptr((0x1000 * n) as *const c_void)
}

// ========== Open tests ==========

#[test]
fn attributes_become_output_geometry() {
    let (tb, _device) = hwc1_backend(HWC_1_4);
    let output = tb.backend.output();

    assert_eq!(tb.backend.version(), ApiVersion::new(1, 4));
    assert_eq!(output.pixel_size(), Size::from((TEST_WIDTH, TEST_HEIGHT)));
    assert_eq!(output.refresh_rate(), 60_000);
    // DPI arrives in dots per thousand inches
    assert_eq!(output.physical_size(), Size::from((68, 121)));
}

#[test]
fn legacy_version_number_is_understood() {
    let (tb, _device) = hwc1_backend(0x0102);
    assert_eq!(tb.backend.version(), ApiVersion::new(1, 2));
}

// ========== Power tests ==========

#[test]
fn newer_devices_use_set_power_mode() {
    let (mut tb, device) = hwc1_backend(HWC_1_4);
    tb.backend.toggle_blank_output();
    tb.backend.toggle_blank_output();

    assert_eq!(
        device.log().power_calls(),
        vec![
            HalCall::PowerMode(HWC_POWER_MODE_NORMAL),
            HalCall::PowerMode(HWC_POWER_MODE_OFF),
            HalCall::PowerMode(HWC_POWER_MODE_NORMAL),
        ]
    );
}

#[test]
fn older_devices_use_blank() {
    let (mut tb, device) = hwc1_backend(HWC_1_3);
    tb.backend.toggle_blank_output();

    assert_eq!(
        device.log().power_calls(),
        vec![HalCall::Blank(false), HalCall::Blank(true)]
    );
}

#[test]
fn power_on_per_frame_reaches_device_once() {
    let (tb, device) = hwc1_backend(HWC_1_4);
    let mut surface = tb.backend.create_surface().unwrap();
    surface.present(buffer(1), None);
    surface.present(buffer(2), None);

    assert_eq!(
        device.log().power_calls(),
        vec![HalCall::PowerMode(HWC_POWER_MODE_NORMAL)]
    );
}

// ========== Frame tests ==========

#[test]
fn frame_runs_prepare_then_set() {
    let (tb, device) = hwc1_backend(HWC_1_4);
    let mut surface = tb.backend.create_surface().unwrap();
    device.log().clear();

    let (acquire, probe) = signalled_fence_pair();
    assert!(surface.present(buffer(1), Some(acquire)).is_presented());

    assert_call_order(
        device.log(),
        &[
            HalCall::Prepare,
            HalCall::Set { fenced: false },
            HalCall::VsyncEnabled(true),
        ],
    );
    assert!(!probe.is_open());
}

#[test]
fn geometry_flag_is_cleared_after_first_set() {
    let (tb, device) = hwc1_backend(HWC_1_4);
    let mut surface = tb.backend.create_surface().unwrap();

    surface.present(buffer(1), None);
    assert_eq!(device.last_contents(), Some((2, HWC_GEOMETRY_CHANGED)));

    surface.present(buffer(2), None);
    assert_eq!(device.last_contents(), Some((2, 0)));
}

#[test]
fn release_fence_is_returned_and_retire_fence_closed() {
    let (tb, device) = hwc1_backend(HWC_1_4);
    let mut surface = tb.backend.create_surface().unwrap();

    let release = assert_presented(surface.present(buffer(1), None));
    assert!(release.is_some());
    assert!(device.release_probes()[0].is_open());
    assert!(!device.retire_probes()[0].is_open());

    drop(release);
    drop(surface.present(buffer(2), None));
    assert!(!device.release_probes()[0].is_open());
    assert!(device.release_probes()[1].is_open());
}

#[test]
fn failed_set_drops_frame() {
    let (tb, device) = hwc1_backend(HWC_1_4);
    let mut surface = tb.backend.create_surface().unwrap();
    device.set_set_code(-libc::EBUSY);

    let outcome = surface.present(buffer(1), None);
    assert!(matches!(
        outcome,
        FrameOutcome::Dropped(DropReason::Present(HalError::Transient(code))) if code == -libc::EBUSY
    ));
    // The release fence of a failed set is not handed out
    assert!(!device.release_probes()[0].is_open());
}

#[test]
fn failed_prepare_drops_frame() {
    let (tb, device) = hwc1_backend(HWC_1_4);
    let mut surface = tb.backend.create_surface().unwrap();
    device.set_prepare_code(-libc::EINVAL);

    let outcome = surface.present(buffer(1), None);
    assert!(matches!(
        outcome,
        FrameOutcome::Dropped(DropReason::Validate(HalError::Fatal(_)))
    ));
    assert_eq!(device.log().count(|c| matches!(c, HalCall::Set { .. })), 0);
}

// ========== Vsync tests ==========

#[test]
fn only_primary_display_vsync_is_delivered() {
    let (mut tb, device) = hwc1_backend(HWC_1_4);
    tb.render_loop.set_pending(1);

    device.fire_vsync(1, 1_000);
    tb.dispatch();
    assert!(tb.render_loop.completed().is_empty());

    device.fire_vsync(0, 2_000);
    tb.dispatch();
    assert_eq!(tb.render_loop.completed().len(), 1);
}

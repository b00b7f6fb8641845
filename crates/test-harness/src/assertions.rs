//! Test assertions for backend state

use hwcomposer::output::DpmsMode;
use hwcomposer::FrameOutcome;

use crate::headless::{CallLog, HalCall, TestBackend};

/// Assert the backend is fully blanked: backlight off, output disabled, filter in place
pub fn assert_blanked(tb: &TestBackend) {
    let backend = &tb.backend;
    assert!(backend.is_blanked(), "backend should be blanked");
    assert!(backend.filter_installed(), "wake filter should be installed while blanked");
    assert!(!backend.output().is_enabled(), "output should be disabled while blanked");
    assert_eq!(backend.output().dpms_mode(), DpmsMode::Off);
    assert!(!backend.vsync().is_enabled(), "vsync should be off while blanked");
    assert_eq!(tb.lights.last_level(), Some(0), "backlight should be at 0");
}

/// Assert the backend is unblanked with the backlight at `brightness`
pub fn assert_unblanked(tb: &TestBackend, brightness: u8) {
    let backend = &tb.backend;
    assert!(!backend.is_blanked(), "backend should be unblanked");
    assert!(!backend.filter_installed(), "wake filter should be removed when unblanked");
    assert!(backend.output().is_enabled(), "output should be enabled");
    assert_eq!(backend.output().dpms_mode(), DpmsMode::On);
    assert_eq!(tb.lights.last_level(), Some(brightness));
}

/// Assert `calls` contains `expected` as a subsequence, in order
pub fn assert_call_order(log: &CallLog, expected: &[HalCall]) {
    let calls = log.calls();
    let mut remaining = expected.iter().peekable();
    for call in &calls {
        if remaining.peek() == Some(&call) {
            remaining.next();
        }
    }
    assert!(
        remaining.peek().is_none(),
        "expected calls {:?} in order, got {:?}",
        expected,
        calls
    );
}

/// Assert the frame was presented, returning its release fence
pub fn assert_presented(outcome: FrameOutcome) -> Option<hwcomposer::Fence> {
    match outcome {
        FrameOutcome::Presented { release_fence } => release_fence,
        FrameOutcome::Dropped(reason) => panic!("frame dropped: {reason:?}"),
    }
}

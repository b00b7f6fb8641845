//! Test fixtures for common test scenarios

use std::io;
use std::os::fd::OwnedFd;
use std::sync::Arc;

use hwcomposer::hal::hwc2::Hwc2Config;
use hwcomposer::hal::DisplayConfig;
use hwcomposer::{Config, Fence};

use crate::headless::{MockHwc1Device, MockHwc2Device, MockModule, TestBackend};

/// Standard test panel: 1080x1920 at 60 Hz, 403 dpi
pub const TEST_WIDTH: i32 = 1080;
pub const TEST_HEIGHT: i32 = 1920;
pub const TEST_DPI: f32 = 403.0;
pub const TEST_VSYNC_PERIOD_NS: i64 = 16_666_666;

/// The standard test panel as an HWC2 active config
pub fn hwc2_config() -> Hwc2Config {
    Hwc2Config {
        id: 0,
        display: 0,
        width: TEST_WIDTH,
        height: TEST_HEIGHT,
        vsync_period: TEST_VSYNC_PERIOD_NS,
        dpi_x: TEST_DPI,
        dpi_y: TEST_DPI,
    }
}

/// The standard test panel as a generation-independent config
pub fn display_config() -> DisplayConfig {
    DisplayConfig {
        width: TEST_WIDTH,
        height: TEST_HEIGHT,
        dpi_x: TEST_DPI,
        dpi_y: TEST_DPI,
        vsync_period_ns: TEST_VSYNC_PERIOD_NS,
    }
}

/// Write end of a pipe standing in for a sync fence
///
/// The read end is the [`Fence`]; it signals once the probe writes. The probe
/// can also tell whether every copy of the fence has been closed.
#[derive(Debug)]
pub struct FenceProbe {
    write: OwnedFd,
}

impl FenceProbe {
    /// Make the fence readable, i.e. signalled
    pub fn signal(&self) {
        rustix::io::write(&self.write, &[1]).expect("signal fence");
    }

    /// Whether any descriptor for the fence is still open
    ///
    /// Writing to a pipe with no readers fails with `EPIPE`.
    pub fn is_open(&self) -> bool {
        match rustix::io::write(&self.write, &[0]) {
            Ok(_) => true,
            Err(rustix::io::Errno::PIPE) => false,
            Err(e) => panic!("unexpected fence probe error: {}", io::Error::from(e)),
        }
    }
}

/// An unsignalled fence and its probe
pub fn fence_pair() -> (Fence, FenceProbe) {
    let (read, write) = rustix::pipe::pipe().expect("pipe");
    (Fence::new(read), FenceProbe { write })
}

/// A fence that has already signalled, and its probe
pub fn signalled_fence_pair() -> (Fence, FenceProbe) {
    let (fence, probe) = fence_pair();
    probe.signal();
    (fence, probe)
}

/// HWC2 device for the standard test panel
pub fn hwc2_device() -> Arc<MockHwc2Device> {
    Arc::new(MockHwc2Device::new(hwc2_config()))
}

/// HWC1 device of `version` for the standard test panel
pub fn hwc1_device(version: u32) -> Arc<MockHwc1Device> {
    Arc::new(MockHwc1Device::new(version, &hwc2_config()))
}

/// Backend on an HWC2 device with default config
pub fn hwc2_backend() -> (TestBackend, Arc<MockHwc2Device>) {
    let device = hwc2_device();
    let backend = TestBackend::new(&MockModule::hwc2(device.clone()), Config::default())
        .expect("backend on mock HWC2");
    (backend, device)
}

/// Backend on an HWC1 device of `version` with default config
pub fn hwc1_backend(version: u32) -> (TestBackend, Arc<MockHwc1Device>) {
    let device = hwc1_device(version);
    let backend = TestBackend::new(&MockModule::hwc1(device.clone()), Config::default())
        .expect("backend on mock HWC1");
    (backend, device)
}

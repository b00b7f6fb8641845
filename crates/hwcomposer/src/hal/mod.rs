//! Display HAL abstraction
//!
//! The vendor composer comes in two incompatible generations. HWC1 exposes a
//! `prepare`/`set` function table, HWC2 (through the libhybris compat layer)
//! exposes `validate`/`acceptChanges`/`setClientTarget`/`present`. Both are
//! wrapped behind [`DisplayHal`], chosen once by [`open`]; nothing above this
//! module branches on the generation.
//!
//! # Modules
//!
//! - [`hwc1`]: legacy function table and its adapter
//! - [`hwc2`]: compat-layer function table, adapter and hotplug wait
//! - `hybris` (feature `hybris`): the real libhybris bindings

pub mod hwc1;
pub mod hwc2;

#[cfg(feature = "hybris")]
pub mod hybris;

use std::ffi::c_void;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use smithay::utils::{Physical, Rectangle, Size};
use thiserror::Error;

use crate::fence::Fence;

pub use hwc1::{Hwc1Device, Hwc1Display};
pub use hwc2::{Hwc2Device, Hwc2Display};

/// Display index of the built-in panel
pub const PRIMARY_DISPLAY: DisplayId = 0;

/// How long HWC2 is given to report the primary display
pub const DEFAULT_HOTPLUG_TIMEOUT: Duration = Duration::from_millis(5000);

/// HAL display identifier
pub type DisplayId = u64;

/// Errors surfaced by a [`DisplayHal`] call
///
/// Raw vendor codes are translated inside the adapters; callers only see
/// these three classes.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    /// The call failed but the device is usable; the next frame retries
    #[error("transient HAL failure (code {0})")]
    Transient(i32),

    /// The call failed in a way retrying will not fix
    #[error("fatal HAL failure (code {0})")]
    Fatal(i32),

    /// Validation wants the compositor to change layer composition
    #[error("validate requires changes ({types} type changes, {requests} requests)")]
    ValidateRequiresChanges { types: u32, requests: u32 },
}

/// Errors opening a vendor device
#[derive(Error, Debug)]
pub enum OpenError {
    #[error("hardware module {0:?} not found")]
    ModuleNotFound(&'static str),

    #[error("failed to open {device:?} device (code {code})")]
    Device { device: &'static str, code: i32 },

    #[error("no display connected within {0:?}")]
    NoDisplay(Duration),

    #[error("failed to query display configuration: {0}")]
    Config(HalError),
}

/// Composer API version as `major.minor` with the header version in the low bits
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion(u32);

impl ApiVersion {
    pub const HWC_1_0: ApiVersion = ApiVersion::new(1, 0);
    pub const HWC_1_3: ApiVersion = ApiVersion::new(1, 3);
    pub const HWC_2_0: ApiVersion = ApiVersion::new(2, 0);

    /// `HWC_DEVICE_API_VERSION(major, minor)` with header version 1
    pub const fn new(major: u8, minor: u8) -> Self {
        ApiVersion(((major as u32) << 24) | ((minor as u32) << 16) | 1)
    }

    /// Decode the version a device reports in its common header
    ///
    /// Old devices put the bare `0xMMmm` version in the low half; those are
    /// shifted up and given header version 1.
    pub fn from_device_version(raw: u32) -> Self {
        if raw & 0xffff_0000 == 0 {
            ApiVersion((raw << 16) | 1)
        } else {
            ApiVersion(raw)
        }
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn major(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub fn minor(&self) -> u8 {
        (self.0 >> 16) as u8
    }

    /// Version ordering ignoring the header bits
    fn api(&self) -> u32 {
        self.0 & 0xffff_0000
    }

    pub fn is_hwc2(&self) -> bool {
        self.major() >= 2
    }

    /// Devices after 1.3 replace `blank` with `setPowerMode`
    pub fn has_power_mode(&self) -> bool {
        self.api() > Self::HWC_1_3.api()
    }
}

impl fmt::Debug for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HWC {}.{}", self.major(), self.minor())
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Panel power state as the HAL understands it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerMode {
    On,
    Off,
}

/// Immutable display configuration read once at startup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayConfig {
    pub width: i32,
    pub height: i32,
    /// Dots per inch, 0.0 when unreported
    pub dpi_x: f32,
    pub dpi_y: f32,
    /// 0 when unreported
    pub vsync_period_ns: i64,
}

impl DisplayConfig {
    pub fn has_valid_size(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub fn has_dpi(&self) -> bool {
        self.dpi_x > 0.0 && self.dpi_y > 0.0
    }
}

/// Result of a successful validate pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Validation {
    pub types: u32,
    pub requests: u32,
}

impl Validation {
    pub fn changes_required(&self) -> bool {
        self.types != 0 || self.requests != 0
    }
}

/// Rotation/flip applied by the composer to the client layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayerTransform {
    #[default]
    Normal,
    FlipH,
    FlipV,
    #[serde(rename = "rot-90")]
    Rot90,
    #[serde(rename = "rot-180")]
    Rot180,
    #[serde(rename = "rot-270")]
    Rot270,
}

impl LayerTransform {
    /// `HWC_TRANSFORM_*` value
    pub fn raw(&self) -> i32 {
        match self {
            LayerTransform::Normal => 0,
            LayerTransform::FlipH => 1,
            LayerTransform::FlipV => 2,
            LayerTransform::Rot180 => 3,
            LayerTransform::Rot90 => 4,
            LayerTransform::Rot270 => 7,
        }
    }
}

/// Color space of the client target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dataspace {
    #[default]
    Unknown,
}

impl Dataspace {
    pub fn raw(&self) -> i32 {
        match self {
            Dataspace::Unknown => 0,
        }
    }
}

/// Opaque native buffer (an `ANativeWindowBuffer*` on real hardware)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(usize);

impl BufferHandle {
    pub fn from_ptr(ptr: *const c_void) -> Self {
        BufferHandle(ptr as usize)
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.0 as *mut c_void
    }
}

impl fmt::Debug for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BufferHandle({:#x})", self.0)
    }
}

/// Handle of the client composition layer on the display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerId(pub u64);

/// Description of the single client layer every frame is composed into
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientLayer {
    pub frame: Rectangle<i32, Physical>,
    pub transform: LayerTransform,
}

impl ClientLayer {
    /// Full-screen layer for a display of `size`
    pub fn fullscreen(size: Size<i32, Physical>, transform: LayerTransform) -> Self {
        Self {
            frame: Rectangle::new((0, 0).into(), size),
            transform,
        }
    }
}

/// Callbacks the vendor HAL invokes on its own threads
pub trait HalCallbacks: Send + Sync {
    /// A vertical blank started on `display`
    fn vsync(&self, display: DisplayId, timestamp_ns: i64);

    /// A display was connected or removed
    fn hotplug(&self, id: DisplayId, connected: bool) {
        tracing::debug!(display = id, connected, "display hotplug");
    }

    /// The HAL asks for a new frame
    fn refresh(&self, _display: DisplayId) {}
}

/// Uniform capability surface over both composer generations
///
/// Implementations are shared between the backend controller and the
/// presentation surface, and are only called from the render thread.
pub trait DisplayHal: Send + Sync {
    /// Negotiated device API version
    fn version(&self) -> ApiVersion;

    /// The display this handle drives
    fn display(&self) -> DisplayId;

    /// Active mode of the display
    fn active_config(&self) -> Result<DisplayConfig, HalError>;

    fn set_power_mode(&self, mode: PowerMode) -> Result<(), HalError>;

    /// Raw vsync event control; idempotence is handled by the caller
    fn set_vsync_enabled(&self, enabled: bool) -> Result<(), HalError>;

    /// Create the client layer frames are composed into
    fn create_client_layer(&self, layer: ClientLayer) -> Result<LayerId, HalError>;

    /// Preview composition of the pending frame
    fn validate(&self) -> Result<Validation, HalError>;

    fn accept_changes(&self) -> Result<(), HalError>;

    /// Hand the rendered buffer to the composer; the acquire fence is consumed
    fn set_client_target(
        &self,
        buffer: BufferHandle,
        acquire_fence: Option<Fence>,
        dataspace: Dataspace,
    ) -> Result<(), HalError>;

    /// Commit the frame, returning the fence that signals when it is shown
    fn present(&self) -> Result<Option<Fence>, HalError>;
}

/// A loaded composer module before its generation is known
pub trait ComposerModule {
    /// Open the legacy composer device, `None` when the module refuses
    fn open_hwc1(&self) -> Option<Arc<dyn Hwc1Device>>;

    /// Create the HWC2 compat device
    fn open_hwc2(&self) -> Result<Arc<dyn Hwc2Device>, OpenError>;
}

/// Open the primary display on whichever composer generation the module implements
///
/// Callbacks are registered before the display is looked up, since HWC2
/// announces displays through hotplug.
pub fn open(
    module: &dyn ComposerModule,
    callbacks: Arc<dyn HalCallbacks>,
    hotplug_timeout: Duration,
) -> Result<Arc<dyn DisplayHal>, OpenError> {
    match module.open_hwc1() {
        Some(device) => {
            let hwc = Hwc1Display::new(device, callbacks);
            tracing::info!(version = %hwc.version(), "opened hwcomposer device");
            Ok(Arc::new(hwc))
        }
        None => {
            tracing::warn!("failed to open legacy hwcomposer device, assuming HWC2");
            let device = module.open_hwc2()?;
            let hwc = Hwc2Display::open(device, callbacks, hotplug_timeout)?;
            tracing::info!(display = hwc.display(), "opened HWC2 display");
            Ok(Arc::new(hwc))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========== ApiVersion tests ==========

    #[test]
    fn legacy_version_is_shifted() {
        let version = ApiVersion::from_device_version(0x0102);
        assert_eq!(version, ApiVersion::new(1, 2));
        assert_eq!(version.major(), 1);
        assert_eq!(version.minor(), 2);
    }

    #[test]
    fn modern_version_is_kept() {
        let version = ApiVersion::from_device_version(0x0104_0001);
        assert_eq!(version, ApiVersion::new(1, 4));
    }

    #[test]
    fn power_mode_starts_after_1_3() {
        assert!(!ApiVersion::HWC_1_0.has_power_mode());
        assert!(!ApiVersion::HWC_1_3.has_power_mode());
        assert!(ApiVersion::new(1, 4).has_power_mode());
        assert!(ApiVersion::new(1, 5).has_power_mode());
    }

    #[test]
    fn power_mode_ignores_header_version() {
        // 1.3 with a newer header is still 1.3
        let version = ApiVersion::from_device_version(0x0103_0002);
        assert!(!version.has_power_mode());
    }

    #[test]
    fn hwc2_detection() {
        assert!(ApiVersion::HWC_2_0.is_hwc2());
        assert!(!ApiVersion::new(1, 5).is_hwc2());
    }

    #[test]
    fn version_display() {
        assert_eq!(ApiVersion::new(1, 4).to_string(), "HWC 1.4");
    }

    // ========== DisplayConfig tests ==========

    #[test]
    fn zero_dimension_is_invalid() {
        let mut config = DisplayConfig {
            width: 1080,
            height: 0,
            dpi_x: 0.0,
            dpi_y: 0.0,
            vsync_period_ns: 0,
        };
        assert!(!config.has_valid_size());
        config.height = 1920;
        assert!(config.has_valid_size());
        assert!(!config.has_dpi());
    }

    #[test]
    fn validation_changes() {
        assert!(!Validation::default().changes_required());
        assert!(Validation { types: 1, requests: 0 }.changes_required());
        assert!(Validation { types: 0, requests: 2 }.changes_required());
    }

    #[test]
    fn transform_raw_values() {
        assert_eq!(LayerTransform::Normal.raw(), 0);
        assert_eq!(LayerTransform::Rot90.raw(), 4);
        assert_eq!(LayerTransform::Rot270.raw(), 7);
    }
}

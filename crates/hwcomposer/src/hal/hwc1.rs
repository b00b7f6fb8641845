//! Legacy HWC1 composer
//!
//! HWC1 composes a `hwc_display_contents_1` layer list with `prepare` and
//! `set`. The list is owned here as plain values; the FFI layer marshals it
//! into the C structures for each call and copies the fences back out.

use std::sync::{Arc, Mutex, MutexGuard};

use smithay::utils::{Physical, Rectangle};

use crate::fence::Fence;

use super::{
    ApiVersion, BufferHandle, ClientLayer, Dataspace, DisplayConfig, DisplayHal, DisplayId,
    HalCallbacks, HalError, LayerId, PowerMode, Validation, PRIMARY_DISPLAY,
};

pub const HWC_FRAMEBUFFER: i32 = 0;
pub const HWC_FRAMEBUFFER_TARGET: i32 = 3;

pub const HWC_BLENDING_NONE: i32 = 0x0100;

/// `hwc_display_contents_1::flags` bit requesting a full geometry pass
pub const HWC_GEOMETRY_CHANGED: u32 = 0x0000_0001;

pub const HWC_EVENT_VSYNC: i32 = 0;

pub const HWC_POWER_MODE_OFF: i32 = 0;
pub const HWC_POWER_MODE_NORMAL: i32 = 2;

pub const HWC_DISPLAY_NO_ATTRIBUTE: u32 = 0;
pub const HWC_DISPLAY_VSYNC_PERIOD: u32 = 1;
pub const HWC_DISPLAY_WIDTH: u32 = 2;
pub const HWC_DISPLAY_HEIGHT: u32 = 3;
pub const HWC_DISPLAY_DPI_X: u32 = 4;
pub const HWC_DISPLAY_DPI_Y: u32 = 5;

/// Attributes queried for the active config, in this order
pub const DISPLAY_ATTRIBUTES: [u32; 5] = [
    HWC_DISPLAY_WIDTH,
    HWC_DISPLAY_HEIGHT,
    HWC_DISPLAY_DPI_X,
    HWC_DISPLAY_DPI_Y,
    HWC_DISPLAY_VSYNC_PERIOD,
];

/// HWC1 reports DPI in dots per thousand inches
const DPI_SCALE: f32 = 1000.0;

/// One entry of the layer list
#[derive(Debug)]
pub struct Layer {
    pub composition_type: i32,
    pub handle: Option<BufferHandle>,
    pub transform: i32,
    pub blending: i32,
    pub source_crop: Rectangle<i32, Physical>,
    pub display_frame: Rectangle<i32, Physical>,
    pub acquire_fence: Option<Fence>,
    /// Filled in by `set`
    pub release_fence: Option<Fence>,
    pub plane_alpha: u8,
}

impl Layer {
    fn new(frame: Rectangle<i32, Physical>, transform: i32, composition_type: i32) -> Self {
        Self {
            composition_type,
            handle: None,
            transform,
            blending: HWC_BLENDING_NONE,
            source_crop: frame,
            display_frame: frame,
            acquire_fence: None,
            release_fence: None,
            plane_alpha: 0xff,
        }
    }
}

/// Owned `hwc_display_contents_1`
#[derive(Debug)]
pub struct DisplayContents {
    pub layers: Vec<Layer>,
    /// Filled in by `set`
    pub retire_fence: Option<Fence>,
    pub flags: u32,
}

impl DisplayContents {
    /// Framebuffer layer plus the framebuffer target that carries the
    /// client buffer
    ///
    /// Only the target gets a buffer; handing the same buffer to both
    /// layers tears on some devices.
    pub fn client(layer: &ClientLayer) -> Self {
        let transform = layer.transform.raw();
        Self {
            layers: vec![
                Layer::new(layer.frame, transform, HWC_FRAMEBUFFER),
                Layer::new(layer.frame, transform, HWC_FRAMEBUFFER_TARGET),
            ],
            retire_fence: None,
            flags: HWC_GEOMETRY_CHANGED,
        }
    }

    pub fn target_mut(&mut self) -> Option<&mut Layer> {
        self.layers
            .iter_mut()
            .find(|layer| layer.composition_type == HWC_FRAMEBUFFER_TARGET)
    }
}

/// The `hwc_composer_device_1` function table
///
/// Status returns are raw: 0 on success, a negative errno otherwise.
pub trait Hwc1Device: Send + Sync {
    /// `common.version` as reported by the device
    fn version(&self) -> u32;

    fn register_procs(&self, callbacks: Arc<dyn HalCallbacks>);

    fn display_configs(&self, display: i32) -> Result<Vec<u32>, i32>;

    /// Values for `attributes`, in the same order
    fn display_attributes(
        &self,
        display: i32,
        config: u32,
        attributes: &[u32],
    ) -> Result<Vec<i32>, i32>;

    /// Only present after API 1.3
    fn set_power_mode(&self, display: i32, mode: i32) -> i32;

    /// Only present up to API 1.3
    fn blank(&self, display: i32, blank: bool) -> i32;

    fn event_control(&self, display: i32, event: i32, enabled: bool) -> i32;

    fn prepare(&self, contents: &mut DisplayContents) -> i32;

    fn set(&self, contents: &mut DisplayContents) -> i32;
}

/// Translate a negative-errno status
pub fn translate(status: i32) -> Result<(), HalError> {
    if status == 0 {
        return Ok(());
    }
    let errno = -status;
    if errno == libc::EAGAIN || errno == libc::EBUSY || errno == libc::ETIMEDOUT {
        Err(HalError::Transient(status))
    } else {
        Err(HalError::Fatal(status))
    }
}

/// Drops vsync events for secondary displays
struct PrimaryOnly(Arc<dyn HalCallbacks>);

impl HalCallbacks for PrimaryOnly {
    fn vsync(&self, display: DisplayId, timestamp_ns: i64) {
        if display == PRIMARY_DISPLAY {
            self.0.vsync(display, timestamp_ns);
        }
    }

    fn hotplug(&self, display: DisplayId, connected: bool) {
        self.0.hotplug(display, connected);
    }

    fn refresh(&self, display: DisplayId) {
        self.0.refresh(display);
    }
}

/// [`DisplayHal`] over an HWC1 device
pub struct Hwc1Display {
    device: Arc<dyn Hwc1Device>,
    version: ApiVersion,
    /// Created with the client layer
    contents: Mutex<Option<DisplayContents>>,
    power: Mutex<Option<PowerMode>>,
}

impl Hwc1Display {
    pub fn new(device: Arc<dyn Hwc1Device>, callbacks: Arc<dyn HalCallbacks>) -> Self {
        let version = ApiVersion::from_device_version(device.version());
        device.register_procs(Arc::new(PrimaryOnly(callbacks)));
        Self {
            device,
            version,
            contents: Mutex::new(None),
            power: Mutex::new(None),
        }
    }

    fn contents(&self) -> MutexGuard<'_, Option<DisplayContents>> {
        self.contents.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `f` on the layer list, failing if no client layer was created yet
    fn with_contents<T>(
        &self,
        f: impl FnOnce(&mut DisplayContents) -> Result<T, HalError>,
    ) -> Result<T, HalError> {
        let mut guard = self.contents();
        let contents = guard.as_mut().ok_or(HalError::Fatal(-libc::EINVAL))?;
        f(contents)
    }
}

impl DisplayHal for Hwc1Display {
    fn version(&self) -> ApiVersion {
        self.version
    }

    fn display(&self) -> DisplayId {
        PRIMARY_DISPLAY
    }

    fn active_config(&self) -> Result<DisplayConfig, HalError> {
        let display = PRIMARY_DISPLAY as i32;
        let configs = self.device.display_configs(display).map_err(|status| {
            translate(status).err().unwrap_or(HalError::Fatal(status))
        })?;
        let config = *configs.first().ok_or(HalError::Fatal(-libc::ENODEV))?;

        let values = self
            .device
            .display_attributes(display, config, &DISPLAY_ATTRIBUTES)
            .map_err(|status| translate(status).err().unwrap_or(HalError::Fatal(status)))?;
        let value = |index: usize| values.get(index).copied().unwrap_or(0);

        Ok(DisplayConfig {
            width: value(0),
            height: value(1),
            dpi_x: value(2) as f32 / DPI_SCALE,
            dpi_y: value(3) as f32 / DPI_SCALE,
            vsync_period_ns: i64::from(value(4)),
        })
    }

    fn set_power_mode(&self, mode: PowerMode) -> Result<(), HalError> {
        let mut power = self.power.lock().unwrap_or_else(|e| e.into_inner());
        if *power == Some(mode) {
            return Ok(());
        }

        let display = PRIMARY_DISPLAY as i32;
        let status = if self.version.has_power_mode() {
            let raw = match mode {
                PowerMode::On => HWC_POWER_MODE_NORMAL,
                PowerMode::Off => HWC_POWER_MODE_OFF,
            };
            self.device.set_power_mode(display, raw)
        } else {
            self.device.blank(display, mode == PowerMode::Off)
        };
        translate(status)?;
        *power = Some(mode);
        Ok(())
    }

    fn set_vsync_enabled(&self, enabled: bool) -> Result<(), HalError> {
        translate(
            self.device
                .event_control(PRIMARY_DISPLAY as i32, HWC_EVENT_VSYNC, enabled),
        )
    }

    fn create_client_layer(&self, layer: ClientLayer) -> Result<LayerId, HalError> {
        *self.contents() = Some(DisplayContents::client(&layer));
        Ok(LayerId(1))
    }

    fn validate(&self) -> Result<Validation, HalError> {
        // prepare may reassign layers, but the framebuffer target is always used
        self.with_contents(|contents| translate(self.device.prepare(contents)))?;
        Ok(Validation::default())
    }

    fn accept_changes(&self) -> Result<(), HalError> {
        Ok(())
    }

    fn set_client_target(
        &self,
        buffer: BufferHandle,
        acquire_fence: Option<Fence>,
        _dataspace: Dataspace,
    ) -> Result<(), HalError> {
        self.with_contents(|contents| {
            let target = contents
                .target_mut()
                .ok_or(HalError::Fatal(-libc::EINVAL))?;
            target.handle = Some(buffer);
            target.acquire_fence = acquire_fence;
            target.release_fence = None;
            Ok(())
        })
    }

    fn present(&self) -> Result<Option<Fence>, HalError> {
        self.with_contents(|contents| {
            let status = self.device.set(contents);

            // The retire fence is not needed; closing it here keeps set
            // failures from leaking it too
            contents.retire_fence = None;
            contents.flags = 0;
            let release = contents
                .target_mut()
                .and_then(|target| {
                    target.acquire_fence = None;
                    target.release_fence.take()
                });

            translate(status)?;
            Ok(release)
        })
    }
}

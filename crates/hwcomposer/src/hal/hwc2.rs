//! HWC2 through the libhybris compat layer
//!
//! Displays are announced asynchronously through the hotplug callback, so
//! opening a display means registering callbacks first and then polling for
//! the primary display to appear.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use crate::fence::Fence;

use super::{
    ApiVersion, BufferHandle, ClientLayer, Dataspace, DisplayConfig, DisplayHal, DisplayId,
    HalCallbacks, HalError, LayerId, OpenError, PowerMode, Validation, PRIMARY_DISPLAY,
};

/// `hwc2_error_t` values
pub mod error {
    pub const NONE: i32 = 0;
    pub const BAD_CONFIG: i32 = 1;
    pub const BAD_DISPLAY: i32 = 2;
    pub const BAD_LAYER: i32 = 3;
    pub const BAD_PARAMETER: i32 = 4;
    pub const HAS_CHANGES: i32 = 5;
    pub const NO_RESOURCES: i32 = 6;
    pub const NOT_VALIDATED: i32 = 7;
    pub const UNSUPPORTED: i32 = 8;
}

pub const POWER_MODE_OFF: i32 = 0;
pub const POWER_MODE_ON: i32 = 2;

pub const VSYNC_ENABLE: i32 = 1;
pub const VSYNC_DISABLE: i32 = 2;

pub const COMPOSITION_CLIENT: i32 = 1;
pub const BLEND_MODE_NONE: i32 = 1;

/// Interval between hotplug polls
const HOTPLUG_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Each callback registration gets a fresh sequence id
static COMPOSER_SEQUENCE: AtomicI32 = AtomicI32::new(0);

/// Active configuration as reported by the compat layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hwc2Config {
    pub id: u32,
    pub display: DisplayId,
    pub width: i32,
    pub height: i32,
    pub vsync_period: i64,
    pub dpi_x: f32,
    pub dpi_y: f32,
}

/// Everything applied to a freshly created layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerSetup {
    pub composition_type: i32,
    pub blend_mode: i32,
    pub transform: i32,
    pub source_crop: [f32; 4],
    pub display_frame: [i32; 4],
    pub visible_region: [i32; 4],
}

impl LayerSetup {
    /// Client-composited, unblended layer covering `layer.frame`
    pub fn client(layer: &ClientLayer) -> Self {
        let rect = layer.frame;
        let (left, top) = (rect.loc.x, rect.loc.y);
        let (right, bottom) = (rect.loc.x + rect.size.w, rect.loc.y + rect.size.h);
        Self {
            composition_type: COMPOSITION_CLIENT,
            blend_mode: BLEND_MODE_NONE,
            transform: layer.transform.raw(),
            source_crop: [0.0, 0.0, rect.size.w as f32, rect.size.h as f32],
            display_frame: [left, top, right, bottom],
            visible_region: [left, top, right, bottom],
        }
    }
}

/// The `hwc2_compat_*` function table
///
/// Methods return raw `hwc2_error_t` codes; [`Hwc2Display`] translates them.
pub trait Hwc2Device: Send + Sync {
    fn register_callback(&self, callbacks: Arc<dyn HalCallbacks>, sequence_id: i32);

    /// Feed a hotplug event back into the compat layer's display list
    fn on_hotplug(&self, display: DisplayId, connected: bool);

    /// Whether the compat layer knows `display`
    fn has_display(&self, display: DisplayId) -> bool;

    fn active_config(&self, display: DisplayId) -> Option<Hwc2Config>;

    fn create_layer(&self, display: DisplayId) -> Option<u64>;

    fn setup_layer(&self, layer: u64, setup: &LayerSetup) -> i32;

    fn set_power_mode(&self, display: DisplayId, mode: i32) -> i32;

    fn set_vsync_enabled(&self, display: DisplayId, enabled: i32) -> i32;

    /// Returns `(error, num_types, num_requests)`
    fn validate(&self, display: DisplayId) -> (i32, u32, u32);

    fn accept_changes(&self, display: DisplayId) -> i32;

    fn set_client_target(
        &self,
        display: DisplayId,
        slot: u32,
        buffer: BufferHandle,
        acquire_fence: Option<Fence>,
        dataspace: i32,
    ) -> i32;

    /// Returns `(error, present_fence)`
    fn present(&self, display: DisplayId) -> (i32, Option<Fence>);
}

/// Translate an `hwc2_error_t` into the backend taxonomy
pub fn translate(code: i32) -> Result<(), HalError> {
    match code {
        error::NONE => Ok(()),
        error::HAS_CHANGES | error::NO_RESOURCES | error::NOT_VALIDATED => {
            Err(HalError::Transient(code))
        }
        _ => Err(HalError::Fatal(code)),
    }
}

/// Routes compat-layer hotplug events back into the device before passing
/// everything on to the backend's callbacks
struct HotplugForwarder {
    device: Weak<dyn Hwc2Device>,
    callbacks: Arc<dyn HalCallbacks>,
}

impl HalCallbacks for HotplugForwarder {
    fn vsync(&self, display: DisplayId, timestamp_ns: i64) {
        self.callbacks.vsync(display, timestamp_ns);
    }

    fn hotplug(&self, display: DisplayId, connected: bool) {
        if let Some(device) = self.device.upgrade() {
            device.on_hotplug(display, connected);
        }
        self.callbacks.hotplug(display, connected);
    }

    fn refresh(&self, display: DisplayId) {
        self.callbacks.refresh(display);
    }
}

/// Poll until `display` is known to the device, at 1ms granularity
///
/// Returns `None` once `timeout` has elapsed.
pub fn wait_for_hotplug(
    device: &dyn Hwc2Device,
    display: DisplayId,
    timeout: Duration,
) -> Option<DisplayId> {
    let deadline = Instant::now() + timeout;
    loop {
        if device.has_display(display) {
            return Some(display);
        }
        if Instant::now() >= deadline {
            return None;
        }
        thread::sleep(HOTPLUG_POLL_INTERVAL);
    }
}

/// [`DisplayHal`] over an HWC2 compat device
pub struct Hwc2Display {
    device: Arc<dyn Hwc2Device>,
    display: DisplayId,
}

impl Hwc2Display {
    /// Register callbacks and wait for the primary display
    pub fn open(
        device: Arc<dyn Hwc2Device>,
        callbacks: Arc<dyn HalCallbacks>,
        hotplug_timeout: Duration,
    ) -> Result<Self, OpenError> {
        let forwarder = Arc::new(HotplugForwarder {
            device: Arc::downgrade(&device),
            callbacks,
        });
        let sequence_id = COMPOSER_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        device.register_callback(forwarder, sequence_id);

        let display = wait_for_hotplug(device.as_ref(), PRIMARY_DISPLAY, hotplug_timeout)
            .ok_or_else(|| {
                tracing::error!(timeout = ?hotplug_timeout, "no primary display reported");
                OpenError::NoDisplay(hotplug_timeout)
            })?;

        Ok(Self { device, display })
    }
}

impl DisplayHal for Hwc2Display {
    fn version(&self) -> ApiVersion {
        ApiVersion::HWC_2_0
    }

    fn display(&self) -> DisplayId {
        self.display
    }

    fn active_config(&self) -> Result<DisplayConfig, HalError> {
        let config = self
            .device
            .active_config(self.display)
            .ok_or(HalError::Fatal(error::BAD_CONFIG))?;
        Ok(DisplayConfig {
            width: config.width,
            height: config.height,
            dpi_x: config.dpi_x,
            dpi_y: config.dpi_y,
            vsync_period_ns: config.vsync_period,
        })
    }

    fn set_power_mode(&self, mode: PowerMode) -> Result<(), HalError> {
        let raw = match mode {
            PowerMode::On => POWER_MODE_ON,
            PowerMode::Off => POWER_MODE_OFF,
        };
        translate(self.device.set_power_mode(self.display, raw))
    }

    fn set_vsync_enabled(&self, enabled: bool) -> Result<(), HalError> {
        let raw = if enabled { VSYNC_ENABLE } else { VSYNC_DISABLE };
        translate(self.device.set_vsync_enabled(self.display, raw))
    }

    fn create_client_layer(&self, layer: ClientLayer) -> Result<LayerId, HalError> {
        let id = self
            .device
            .create_layer(self.display)
            .ok_or(HalError::Fatal(error::NO_RESOURCES))?;
        translate(self.device.setup_layer(id, &LayerSetup::client(&layer)))?;
        Ok(LayerId(id))
    }

    fn validate(&self) -> Result<Validation, HalError> {
        let (code, types, requests) = self.device.validate(self.display);
        match code {
            // HAS_CHANGES is an expected outcome here, the counts tell the story
            error::NONE | error::HAS_CHANGES => Ok(Validation { types, requests }),
            _ => Err(translate(code).err().unwrap_or(HalError::Fatal(code))),
        }
    }

    fn accept_changes(&self) -> Result<(), HalError> {
        translate(self.device.accept_changes(self.display))
    }

    fn set_client_target(
        &self,
        buffer: BufferHandle,
        acquire_fence: Option<Fence>,
        dataspace: Dataspace,
    ) -> Result<(), HalError> {
        translate(self.device.set_client_target(
            self.display,
            0,
            buffer,
            acquire_fence,
            dataspace.raw(),
        ))
    }

    fn present(&self) -> Result<Option<Fence>, HalError> {
        let (code, fence) = self.device.present(self.display);
        // On failure the fence (if any) is dropped, and with it closed
        translate(code)?;
        Ok(fence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smithay::utils::Size;

    use crate::hal::LayerTransform;

    #[test]
    fn success_translates_to_ok() {
        assert_eq!(translate(error::NONE), Ok(()));
    }

    #[test]
    fn resource_errors_are_transient() {
        assert_eq!(translate(error::NO_RESOURCES), Err(HalError::Transient(6)));
        assert_eq!(translate(error::NOT_VALIDATED), Err(HalError::Transient(7)));
    }

    #[test]
    fn bad_arguments_are_fatal() {
        for code in [
            error::BAD_CONFIG,
            error::BAD_DISPLAY,
            error::BAD_LAYER,
            error::BAD_PARAMETER,
            error::UNSUPPORTED,
            -1,
        ] {
            assert_eq!(translate(code), Err(HalError::Fatal(code)), "code {code}");
        }
    }

    #[test]
    fn client_layer_setup_covers_the_screen() {
        let layer = ClientLayer::fullscreen(Size::from((1080, 2340)), LayerTransform::Rot90);
        let setup = LayerSetup::client(&layer);
        assert_eq!(setup.composition_type, COMPOSITION_CLIENT);
        assert_eq!(setup.blend_mode, BLEND_MODE_NONE);
        assert_eq!(setup.transform, 4);
        assert_eq!(setup.source_crop, [0.0, 0.0, 1080.0, 2340.0]);
        assert_eq!(setup.display_frame, [0, 0, 1080, 2340]);
        assert_eq!(setup.visible_region, setup.display_frame);
    }
}

//! Backlight control through the vendor lights HAL
//!
//! The lights HAL is optional. When it cannot be opened the backend keeps
//! running and brightness changes are silently dropped.

use crate::hal::OpenError;

pub const LIGHT_FLASH_NONE: i32 = 0;
pub const BRIGHTNESS_MODE_USER: i32 = 0;

/// Owned `light_state_t`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightState {
    /// Packed ARGB
    pub color: u32,
    pub flash_mode: i32,
    pub brightness_mode: i32,
}

impl LightState {
    /// User-mode, non-flashing state for a grayscale brightness level
    pub fn brightness(level: u8) -> Self {
        Self {
            color: pack_brightness(level),
            flash_mode: LIGHT_FLASH_NONE,
            brightness_mode: BRIGHTNESS_MODE_USER,
        }
    }
}

/// Pack a brightness level as opaque gray
pub fn pack_brightness(level: u8) -> u32 {
    let level = u32::from(level);
    (0xff << 24) | (level << 16) | (level << 8) | level
}

/// The backlight `light_device_t`
pub trait LightsDevice: Send {
    /// Raw `set_light`, 0 on success
    fn set_light(&self, state: &LightState) -> i32;
}

/// Backlight handle that degrades to a no-op without a lights HAL
pub struct Backlight {
    device: Option<Box<dyn LightsDevice>>,
}

impl Backlight {
    pub fn new(device: Result<Box<dyn LightsDevice>, OpenError>) -> Self {
        let device = match device {
            Ok(device) => Some(device),
            Err(e) => {
                tracing::warn!(error = %e, "backlight control unavailable");
                None
            }
        };
        Self { device }
    }

    pub fn is_available(&self) -> bool {
        self.device.is_some()
    }

    pub fn set_brightness(&self, level: u8) {
        let Some(device) = &self.device else {
            return;
        };
        let status = device.set_light(&LightState::brightness(level));
        if status != 0 {
            tracing::warn!(level, status, "failed to set backlight brightness");
        } else {
            tracing::debug!(level, "backlight brightness set");
        }
    }
}

impl std::fmt::Debug for Backlight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backlight")
            .field("available", &self.is_available())
            .finish()
    }
}

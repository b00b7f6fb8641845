//! Output descriptor
//!
//! Geometry, refresh rate and power state of the panel, derived once from
//! the display configuration. The descriptor owns the smithay [`Output`] the
//! compositor advertises; the composer supports a single fixed mode, which
//! is both current and preferred.
//!
//! Power changes requested through the descriptor are only forwarded to the
//! backend. The backend performs them and then records the result here.

use calloop::channel::Sender;
use smithay::output::{Mode, Output, PhysicalProperties, Scale, Subpixel};
use smithay::utils::{Logical, Physical, Raw, Size, Transform};
use thiserror::Error;

use crate::backend::BackendMessage;
use crate::config::{Config, DebugOverrides};
use crate::hal::DisplayConfig;

/// Refresh rate assumed when the panel reports no vsync period (mHz)
pub const DEFAULT_REFRESH_RATE: i32 = 60_000;

const MM_PER_INCH: f64 = 25.4;

/// Errors building the descriptor
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputError {
    #[error("display reports an empty pixel size ({width}x{height})")]
    InvalidSize { width: i32, height: i32 },
}

/// Display power state as seen by the compositor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DpmsMode {
    On,
    Off,
}

/// Refresh rate in mHz for a vsync period
pub fn refresh_rate(vsync_period_ns: i64) -> i32 {
    if vsync_period_ns <= 0 {
        return DEFAULT_REFRESH_RATE;
    }
    let rate = 1e12 / vsync_period_ns as f64;
    rate.round().clamp(1.0, f64::from(i32::MAX)) as i32
}

/// Physical size in millimetres
///
/// Uses the reported DPI per axis, or `fallback_pixels_per_mm` when either
/// axis is unreported.
pub fn physical_size(
    pixels: Size<i32, Physical>,
    dpi: (f32, f32),
    fallback_pixels_per_mm: f64,
) -> Size<i32, Raw> {
    let (dpi_x, dpi_y) = (f64::from(dpi.0), f64::from(dpi.1));
    let (w, h) = if dpi_x > 0.0 && dpi_y > 0.0 {
        (
            f64::from(pixels.w) / dpi_x * MM_PER_INCH,
            f64::from(pixels.h) / dpi_y * MM_PER_INCH,
        )
    } else {
        (
            f64::from(pixels.w) / fallback_pixels_per_mm,
            f64::from(pixels.h) / fallback_pixels_per_mm,
        )
    };
    (w.round() as i32, h.round() as i32).into()
}

/// Single source of truth for the panel's geometry and power state
#[derive(Debug)]
pub struct OutputDescriptor {
    output: Output,
    mode: Mode,
    physical_size: Size<i32, Raw>,
    scale: f64,
    dpms: DpmsMode,
    enabled: bool,
    requests: Sender<BackendMessage>,
}

impl OutputDescriptor {
    /// Build the descriptor for `panel`
    ///
    /// Panel quirks are applied first, then the debug overrides. An empty
    /// pixel size after both is rejected.
    pub fn new(
        panel: DisplayConfig,
        config: &Config,
        overrides: &DebugOverrides,
        requests: Sender<BackendMessage>,
    ) -> Result<Self, OutputError> {
        let mut panel = panel;

        if let Some(quirk) = config.panel_quirk(panel.width, panel.height) {
            tracing::info!(
                width = panel.width,
                reported = panel.vsync_period_ns,
                vsync_period_ns = quirk.vsync_period_ns,
                "applying panel vsync quirk"
            );
            panel.vsync_period_ns = quirk.vsync_period_ns;
        }

        if let Some(width) = overrides.width {
            panel.width = width;
        }
        if let Some(height) = overrides.height {
            panel.height = height;
        }
        // A zero DPI override keeps what the panel reported
        if let Some(dpi) = overrides.dpi.filter(|dpi| *dpi > 0.0) {
            panel.dpi_x = dpi;
            panel.dpi_y = dpi;
        }

        if !panel.has_valid_size() {
            tracing::error!(
                width = panel.width,
                height = panel.height,
                "display reports an empty pixel size"
            );
            return Err(OutputError::InvalidSize {
                width: panel.width,
                height: panel.height,
            });
        }

        let pixel_size: Size<i32, Physical> = (panel.width, panel.height).into();
        let physical_size = physical_size(
            pixel_size,
            (panel.dpi_x, panel.dpi_y),
            config.fallback_pixels_per_mm,
        );
        let mode = Mode {
            size: pixel_size,
            refresh: refresh_rate(panel.vsync_period_ns),
        };

        let scale = overrides
            .scale
            .filter(|scale| scale.is_finite() && *scale > 0.0)
            .unwrap_or_else(|| config.output_scale(0));

        let output = Output::new(
            "HWC-0".to_string(),
            PhysicalProperties {
                size: physical_size,
                subpixel: Subpixel::Unknown,
                make: "hwcomposer".to_string(),
                model: "Internal".to_string(),
            },
        );
        output.change_current_state(
            Some(mode),
            Some(Transform::Normal),
            Some(output_scale(scale)),
            Some((0, 0).into()),
        );
        output.set_preferred(mode);

        tracing::info!(
            size = ?pixel_size,
            physical_mm = ?physical_size,
            refresh = mode.refresh,
            scale,
            "output configured"
        );

        Ok(Self {
            output,
            mode,
            physical_size,
            scale,
            dpms: DpmsMode::Off,
            enabled: false,
            requests,
        })
    }

    /// The smithay output advertised to clients
    pub fn output(&self) -> &Output {
        &self.output
    }

    /// The one mode of this panel
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn pixel_size(&self) -> Size<i32, Physical> {
        self.mode.size
    }

    /// Pixel size divided by the scale
    pub fn logical_size(&self) -> Size<i32, Logical> {
        self.mode
            .size
            .to_f64()
            .to_logical(self.scale)
            .to_i32_round()
    }

    /// Size in millimetres
    pub fn physical_size(&self) -> Size<i32, Raw> {
        self.physical_size
    }

    /// Refresh rate in mHz
    pub fn refresh_rate(&self) -> i32 {
        self.mode.refresh
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn dpms_mode(&self) -> DpmsMode {
        self.dpms
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Ask the backend to change the panel power state
    ///
    /// Nothing changes here until the backend acknowledges.
    pub fn request_dpms_mode(&self, mode: DpmsMode) {
        tracing::debug!(?mode, "dpms mode requested");
        if self.requests.send(BackendMessage::DpmsRequested(mode)).is_err() {
            tracing::warn!(?mode, "dpms request dropped, backend is gone");
        }
    }

    pub(crate) fn set_dpms_mode(&mut self, mode: DpmsMode) {
        self.dpms = mode;
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

fn output_scale(scale: f64) -> Scale {
    if scale.fract() == 0.0 {
        Scale::Integer(scale as i32)
    } else {
        Scale::Fractional(scale)
    }
}

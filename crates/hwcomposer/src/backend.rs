//! Backend controller
//!
//! Owns the display HAL, the output descriptor, the backlight and the blank
//! state. Everything that happens on other threads (HAL callbacks, power
//! manager signals, the wake filter) reaches the controller as a
//! [`BackendMessage`] on a calloop channel, so all state changes run on the
//! thread that dispatches the event loop.

use std::sync::Arc;
use std::time::Duration;

use calloop::channel::{Channel, Sender};
use smithay::backend::input::{InputBackend, InputEvent};
use smithay::utils::{Logical, Physical, Size};
use thiserror::Error;

use crate::config::{Config, DebugOverrides};
use crate::hal::{self, ApiVersion, ComposerModule, DisplayHal, HalError, OpenError, PowerMode};
use crate::input::{FilterEvent, WakeFilter};
use crate::lights::{Backlight, LightsDevice};
use crate::output::{DpmsMode, OutputDescriptor, OutputError};
use crate::surface::{PresentPolicy, PresentationSurface};
use crate::vsync::{interval_for_refresh, VsyncControl, VsyncSignal};

/// Work handed to the controller from other threads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMessage {
    /// A vsync happened; at most one is queued at a time
    Vsync { timestamp: Duration },
    /// The compositor asked for a power state change
    DpmsRequested(DpmsMode),
    /// The power manager reported a new backlight level
    BrightnessChanged(u8),
    /// Flip the blank state
    ToggleBlank,
    /// The composer asked for a new frame
    Refresh,
}

/// The compositor's frame scheduler
pub trait RenderLoop {
    /// Frames submitted but not yet completed
    fn pending_frame_count(&self) -> usize;

    fn notify_frame_completed(&mut self, timestamp: Duration);

    /// Repaint everything on the next frame
    fn schedule_repaint(&mut self);
}

/// Backend initialization failed
#[derive(Error, Debug)]
pub enum BackendError {
    #[error(transparent)]
    Open(#[from] OpenError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error("failed to create presentation surface: {0}")]
    Surface(HalError),
}

/// Event sources the embedding compositor inserts into its loop
pub struct BackendSources {
    /// Dispatch with [`HwcomposerBackend::handle_message`]
    pub messages: Channel<BackendMessage>,
}

/// The hwcomposer backend
pub struct HwcomposerBackend {
    hal: Arc<dyn DisplayHal>,
    signal: VsyncSignal,
    vsync: VsyncControl,
    output: OutputDescriptor,
    backlight: Backlight,
    blanked: bool,
    /// Level restored on unblank
    brightness: u8,
    filter: Option<WakeFilter>,
    render_loop: Box<dyn RenderLoop>,
    config: Config,
    sender: Sender<BackendMessage>,
}

impl HwcomposerBackend {
    /// Open the display and bring the panel up
    ///
    /// Fails when the composer cannot be opened, no display shows up, or
    /// the display has no usable geometry. A missing lights HAL only
    /// disables backlight control.
    pub fn new(
        module: &dyn ComposerModule,
        lights: Result<Box<dyn LightsDevice>, OpenError>,
        config: Config,
        overrides: DebugOverrides,
        render_loop: Box<dyn RenderLoop>,
    ) -> Result<(Self, BackendSources), BackendError> {
        let (sender, messages) = calloop::channel::channel();
        let signal = VsyncSignal::new(sender.clone());

        let hal = hal::open(module, Arc::new(signal.clone()), config.hotplug_timeout())
            .map_err(|e| {
                tracing::error!(error = %e, "failed to open hwcomposer");
                e
            })?;

        let active = hal.active_config().map_err(OpenError::Config)?;
        tracing::debug!(config = ?active, "active display config");

        let output = OutputDescriptor::new(active, &config, &overrides, sender.clone())?;
        let refresh = u32::try_from(output.refresh_rate()).unwrap_or(0);
        signal.set_interval(interval_for_refresh(refresh));

        let vsync = VsyncControl::new(hal.clone(), signal.clone());
        let backlight = Backlight::new(lights);

        let mut backend = Self {
            hal,
            signal,
            vsync,
            output,
            backlight,
            // Starts blanked; the toggle below powers the panel up
            blanked: true,
            brightness: config.default_brightness,
            filter: None,
            render_loop,
            config,
            sender,
        };
        backend.toggle_blank_output();

        tracing::info!(
            version = %backend.hal.version(),
            size = ?backend.output.pixel_size(),
            refresh = backend.output.refresh_rate(),
            backlight = backend.backlight.is_available(),
            "hwcomposer backend ready"
        );

        Ok((backend, BackendSources { messages }))
    }

    pub fn version(&self) -> ApiVersion {
        self.hal.version()
    }

    pub fn hal(&self) -> &Arc<dyn DisplayHal> {
        &self.hal
    }

    pub fn output(&self) -> &OutputDescriptor {
        &self.output
    }

    pub fn vsync(&self) -> &VsyncControl {
        &self.vsync
    }

    /// Pixel size of the panel
    pub fn size(&self) -> Size<i32, Physical> {
        self.output.pixel_size()
    }

    /// Pixel size divided by the output scale
    pub fn screen_size(&self) -> Size<i32, Logical> {
        self.output.logical_size()
    }

    pub fn is_blanked(&self) -> bool {
        self.blanked
    }

    /// Brightness restored on the next unblank
    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    /// Whether the wake filter is in front of input handling
    pub fn filter_installed(&self) -> bool {
        self.filter.is_some()
    }

    /// Handle for posting messages from other threads
    pub fn message_sender(&self) -> Sender<BackendMessage> {
        self.sender.clone()
    }

    /// Create the presentation surface for the panel
    pub fn create_surface(&self) -> Result<PresentationSurface, BackendError> {
        PresentationSurface::new(
            self.hal.clone(),
            self.vsync.clone(),
            self.output.pixel_size(),
            self.config.layer_transform,
            PresentPolicy {
                sync_before_set: self.config.sync_before_set,
            },
        )
        .map_err(BackendError::Surface)
    }

    /// Block the render thread until the next vsync, at most one interval
    pub fn wait_vsync(&self) -> bool {
        self.vsync.wait()
    }

    pub fn handle_message(&mut self, message: BackendMessage) {
        match message {
            BackendMessage::Vsync { timestamp } => {
                self.signal.complete();
                if self.render_loop.pending_frame_count() > 0 {
                    self.render_loop.notify_frame_completed(timestamp);
                }
            }
            BackendMessage::DpmsRequested(mode) => self.set_dpms_mode(mode),
            BackendMessage::BrightnessChanged(level) => {
                tracing::debug!(level, "screen brightness changed");
                self.brightness = level;
            }
            BackendMessage::ToggleBlank => self.toggle_blank_output(),
            BackendMessage::Refresh => {
                if !self.blanked {
                    self.render_loop.schedule_repaint();
                }
            }
        }
    }

    fn set_dpms_mode(&mut self, mode: DpmsMode) {
        let blank = mode == DpmsMode::Off;
        if blank != self.blanked {
            self.toggle_blank_output();
        } else {
            // Already there; republish so the requester sees an answer
            self.output.set_dpms_mode(self.current_dpms_mode());
        }
    }

    fn current_dpms_mode(&self) -> DpmsMode {
        if self.blanked {
            DpmsMode::Off
        } else {
            DpmsMode::On
        }
    }

    /// Flip between blanked and unblanked
    ///
    /// Blanking turns the backlight to 0, stops vsync, powers the panel off
    /// and installs the wake filter. Unblanking reverses that, except vsync,
    /// which comes back after the next successful present.
    pub fn toggle_blank_output(&mut self) {
        self.blanked = !self.blanked;
        let blanked = self.blanked;

        self.backlight
            .set_brightness(if blanked { 0 } else { self.brightness });

        if blanked {
            self.vsync.set_enabled(false);
        }

        let power = if blanked { PowerMode::Off } else { PowerMode::On };
        if let Err(e) = self.hal.set_power_mode(power) {
            tracing::warn!(?power, error = %e, "failed to set display power mode");
        }

        self.output.set_enabled(!blanked);
        self.output.set_dpms_mode(self.current_dpms_mode());

        if blanked {
            self.filter = Some(WakeFilter::new(self.config.double_tap_interval()));
        } else {
            self.filter = None;
            // Whatever was on screen before blanking is stale
            self.render_loop.schedule_repaint();
        }

        tracing::info!(blanked, "output blank state changed");
    }

    /// Run an input event through the wake filter
    ///
    /// Returns whether the event was consumed. The unblank itself is queued
    /// as a power-on request, so the filter is never removed while it is
    /// running and several wake events in one batch unblank only once.
    pub fn filter_input<B: InputBackend>(&mut self, event: &InputEvent<B>) -> bool {
        self.filter_event(&FilterEvent::from_input(event))
    }

    pub fn filter_event(&mut self, event: &FilterEvent) -> bool {
        let Some(filter) = self.filter.as_mut() else {
            return false;
        };
        let action = filter.handle(event, self.blanked);
        if action.wake {
            tracing::debug!(?event, "wake gesture");
            if self.sender.send(BackendMessage::DpmsRequested(DpmsMode::On)).is_err() {
                tracing::warn!("wake gesture dropped, event loop is gone");
            }
        }
        action.consumed
    }
}

impl Drop for HwcomposerBackend {
    fn drop(&mut self) {
        // Never leave the panel off behind us
        if self.blanked {
            self.toggle_blank_output();
        }
        tracing::info!("hwcomposer backend shut down");
    }
}

impl std::fmt::Debug for HwcomposerBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HwcomposerBackend")
            .field("version", &self.hal.version())
            .field("output", &self.output)
            .field("blanked", &self.blanked)
            .field("brightness", &self.brightness)
            .field("backlight", &self.backlight)
            .finish()
    }
}

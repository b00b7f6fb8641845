//! Android hwcomposer display backend
//!
//! Drives the built-in panel of a libhybris device: opens the vendor
//! composer (HWC1 or HWC2), describes the panel as a smithay output,
//! presents client-composited frames, paces rendering on vsync and handles
//! blanking with wake-on-input.
//!
//! The vendor HALs sit behind traits ([`hal::Hwc1Device`], [`hal::Hwc2Device`],
//! [`lights::LightsDevice`]); the real bindings are in `hal::hybris` behind
//! the `hybris` feature.

pub mod backend;
pub mod config;
pub mod fence;
pub mod hal;
pub mod input;
pub mod lights;
pub mod output;
pub mod surface;
pub mod vsync;

pub use backend::{BackendError, BackendMessage, BackendSources, HwcomposerBackend, RenderLoop};
pub use config::{Config, DebugOverrides};
pub use fence::Fence;
pub use surface::{FrameOutcome, PresentationSurface};

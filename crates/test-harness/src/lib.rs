//! Test harness for the hwcomposer backend
//!
//! Runs the backend headless on scripted vendor devices.
//!
//! # Modules
//!
//! - `headless`: Mock HWC1/HWC2/lights devices, render loop and input backend
//! - `assertions`: Common test assertions
//! - `fixtures`: Test fixture helpers

pub mod assertions;
pub mod fixtures;
pub mod headless;

pub use headless::{CallLog, HalCall, Hotplug, MockHwc1Device, MockHwc2Device, MockModule, TestBackend};

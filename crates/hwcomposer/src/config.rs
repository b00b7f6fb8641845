//! Runtime configuration

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hal::LayerTransform;

/// Errors reading a configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Wait on the acquire fence before handing a buffer to the composer
    pub sync_before_set: bool,

    /// How long HWC2 gets to report the primary display (ms)
    pub hotplug_timeout_ms: u64,

    /// Brightness restored on unblank until the power manager reports one
    pub default_brightness: u8,

    /// Double-tap-to-wake window (ms)
    pub double_tap_interval_ms: u32,

    /// Pixels per millimetre assumed when the panel reports no DPI
    pub fallback_pixels_per_mm: f64,

    /// Transform of the HWC2 client layer
    pub layer_transform: LayerTransform,

    /// Per-display settings keyed by display index ("0" is the panel)
    pub outputs: BTreeMap<String, OutputConfig>,

    /// Vsync period overrides for panels that misreport it
    pub panel_quirks: Vec<PanelQuirk>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync_before_set: true,
            hotplug_timeout_ms: 5000,
            default_brightness: 0x7f,
            double_tap_interval_ms: 400,
            fallback_pixels_per_mm: 3.8,
            layer_transform: LayerTransform::Normal,
            outputs: BTreeMap::new(),
            panel_quirks: vec![PanelQuirk {
                width: 2072,
                height: None,
                vsync_period_ns: 20_000_000,
            }],
        }
    }
}

/// Persisted per-display settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub scale: f64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { scale: 1.0 }
    }
}

/// Vsync period override keyed by panel geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelQuirk {
    pub width: i32,
    /// Matches any height when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<i32>,
    pub vsync_period_ns: i64,
}

impl PanelQuirk {
    pub fn matches(&self, width: i32, height: i32) -> bool {
        self.width == width && self.height.map_or(true, |h| h == height)
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults
    pub fn load() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("hwcomposer/config.toml")),
            Some(PathBuf::from("/etc/hwcomposer/config.toml")),
        ];

        for path in config_paths.into_iter().flatten() {
            if path.exists() {
                match Self::from_file(&path) {
                    Ok(config) => {
                        tracing::info!(?path, "loaded configuration");
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "ignoring configuration file");
                    }
                }
            }
        }

        tracing::info!("using default configuration");
        Self::default()
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn hotplug_timeout(&self) -> Duration {
        Duration::from_millis(self.hotplug_timeout_ms)
    }

    pub fn double_tap_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.double_tap_interval_ms))
    }

    /// Persisted scale of display `index`, 1.0 when unset or not positive
    pub fn output_scale(&self, index: u64) -> f64 {
        self.outputs
            .get(&index.to_string())
            .map(|output| output.scale)
            .filter(|scale| scale.is_finite() && *scale > 0.0)
            .unwrap_or(1.0)
    }

    /// First quirk matching the panel geometry
    pub fn panel_quirk(&self, width: i32, height: i32) -> Option<&PanelQuirk> {
        self.panel_quirks
            .iter()
            .find(|quirk| quirk.matches(width, height))
    }
}

/// Environment overrides for bringing the backend up on emulators or
/// misreporting panels
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DebugOverrides {
    pub width: Option<i32>,
    pub height: Option<i32>,
    /// Dots per inch
    pub dpi: Option<f32>,
    pub scale: Option<f64>,
}

impl DebugOverrides {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let overrides = Self {
            width: parse_var(&lookup, "HWC_DEBUG_WIDTH"),
            height: parse_var(&lookup, "HWC_DEBUG_HEIGHT"),
            dpi: parse_var(&lookup, "HWC_DEBUG_DPI"),
            scale: parse_var(&lookup, "HWC_DEBUG_SCALE"),
        };
        if overrides != Self::default() {
            tracing::info!(?overrides, "debug overrides active");
        }
        overrides
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Option<T> {
    let value = lookup(name)?;
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(name, value, "ignoring unparsable debug override");
            None
        }
    }
}

/// Helper for getting XDG directories
mod dirs {
    use std::path::PathBuf;

    pub fn config_dir() -> Option<PathBuf> {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
    }
}

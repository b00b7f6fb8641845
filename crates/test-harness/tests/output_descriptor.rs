//! Output descriptor tests
//!
//! The geometry the backend advertises, derived from the mock panel's
//! active config plus configuration and debug overrides.

use std::sync::Arc;

use hwcomposer::config::{OutputConfig, PanelQuirk};
use hwcomposer::output::{physical_size, refresh_rate, OutputError, DEFAULT_REFRESH_RATE};
use hwcomposer::{BackendError, Config, DebugOverrides};
use proptest::prelude::*;
use smithay::output::Scale;
use smithay::utils::Size;
use test_harness::fixtures::{hwc2_backend, hwc2_config, TEST_HEIGHT, TEST_WIDTH};
use test_harness::{MockHwc2Device, MockModule, TestBackend};

fn backend_for(config: hwcomposer::hal::hwc2::Hwc2Config, settings: Config) -> Result<TestBackend, BackendError> {
    let device = Arc::new(MockHwc2Device::new(config));
    TestBackend::new(&MockModule::hwc2(device), settings)
}

// ========== Geometry tests ==========

#[test]
fn output_matches_active_config() {
    let (tb, _device) = hwc2_backend();
    let output = tb.backend.output();

    assert_eq!(output.pixel_size(), Size::from((TEST_WIDTH, TEST_HEIGHT)));
    assert_eq!(tb.backend.size(), Size::from((TEST_WIDTH, TEST_HEIGHT)));
    assert_eq!(output.refresh_rate(), 60_000);
    // 1080 px at 403 dpi is 68.07 mm, 1920 px is 121.01 mm
    assert_eq!(output.physical_size(), Size::from((68, 121)));
    assert_eq!(output.scale(), 1.0);
    assert_eq!(tb.backend.screen_size(), Size::from((TEST_WIDTH, TEST_HEIGHT)));
}

#[test]
fn smithay_output_has_single_preferred_mode() {
    let (tb, _device) = hwc2_backend();
    let output = tb.backend.output().output();
    let mode = tb.backend.output().mode();

    assert_eq!(output.current_mode(), Some(mode));
    assert_eq!(output.preferred_mode(), Some(mode));
    assert_eq!(output.modes(), vec![mode]);
    assert_eq!(output.name(), "HWC-0");
    assert_eq!(output.physical_properties().size, Size::from((68, 121)));
}

#[test]
fn missing_dpi_falls_back_to_fixed_density() {
    let mut config = hwc2_config();
    config.dpi_x = 0.0;
    config.dpi_y = 0.0;
    let tb = backend_for(config, Config::default()).unwrap();
    // 1080 / 3.8 = 284.2, 1920 / 3.8 = 505.3
    assert_eq!(tb.backend.output().physical_size(), Size::from((284, 505)));
}

#[test]
fn zero_vsync_period_reports_default_refresh() {
    let mut config = hwc2_config();
    config.vsync_period = 0;
    let tb = backend_for(config, Config::default()).unwrap();
    assert_eq!(tb.backend.output().refresh_rate(), DEFAULT_REFRESH_RATE);
}

#[test]
fn empty_size_is_rejected() {
    let mut config = hwc2_config();
    config.height = 0;
    match backend_for(config, Config::default()) {
        Err(BackendError::Output(OutputError::InvalidSize { width, height })) => {
            assert_eq!((width, height), (TEST_WIDTH, 0));
        }
        other => panic!("expected InvalidSize, got {:?}", other.map(|tb| tb.backend)),
    }
}

// ========== Scale tests ==========

#[test]
fn scale_comes_from_output_config() {
    let mut settings = Config::default();
    settings
        .outputs
        .insert("0".to_string(), OutputConfig { scale: 2.0 });
    let tb = backend_for(hwc2_config(), settings).unwrap();

    assert_eq!(tb.backend.output().scale(), 2.0);
    assert_eq!(tb.backend.screen_size(), Size::from((540, 960)));
    assert!(matches!(
        tb.backend.output().output().current_scale(),
        Scale::Integer(2)
    ));
}

#[test]
fn fractional_scale_is_kept() {
    let mut settings = Config::default();
    settings
        .outputs
        .insert("0".to_string(), OutputConfig { scale: 1.5 });
    let tb = backend_for(hwc2_config(), settings).unwrap();
    assert_eq!(tb.backend.screen_size(), Size::from((720, 1280)));
    assert!(matches!(
        tb.backend.output().output().current_scale(),
        Scale::Fractional(f) if f == 1.5
    ));
}

// ========== Quirk and override tests ==========

#[test]
fn panel_quirk_replaces_vsync_period() {
    let mut config = hwc2_config();
    config.width = 2072;
    config.height = 1104;
    let tb = backend_for(config, Config::default()).unwrap();
    // Default quirk: 2072 px wide panels run at 20 ms
    assert_eq!(tb.backend.output().refresh_rate(), 50_000);
}

#[test]
fn quirk_matching_height_only_applies_to_that_panel() {
    let mut settings = Config::default();
    settings.panel_quirks = vec![PanelQuirk {
        width: TEST_WIDTH,
        height: Some(TEST_HEIGHT + 1),
        vsync_period_ns: 33_333_333,
    }];
    let tb = backend_for(hwc2_config(), settings).unwrap();
    assert_eq!(tb.backend.output().refresh_rate(), 60_000);
}

#[test]
fn debug_overrides_replace_geometry() {
    let device = Arc::new(MockHwc2Device::new(hwc2_config()));
    let overrides = DebugOverrides::from_lookup(|name| match name {
        "HWC_DEBUG_WIDTH" => Some("720".to_string()),
        "HWC_DEBUG_HEIGHT" => Some("1280".to_string()),
        "HWC_DEBUG_DPI" => Some("254".to_string()),
        "HWC_DEBUG_SCALE" => Some("2".to_string()),
        _ => None,
    });
    let tb = TestBackend::with_overrides(&MockModule::hwc2(device), Config::default(), overrides)
        .unwrap();
    let output = tb.backend.output();

    assert_eq!(output.pixel_size(), Size::from((720, 1280)));
    // 254 dpi is 10 px per mm
    assert_eq!(output.physical_size(), Size::from((72, 128)));
    assert_eq!(output.scale(), 2.0);
}

#[test]
fn override_rescues_empty_panel() {
    let mut config = hwc2_config();
    config.width = 0;
    let device = Arc::new(MockHwc2Device::new(config));
    let overrides = DebugOverrides {
        width: Some(800),
        ..DebugOverrides::default()
    };
    let tb = TestBackend::with_overrides(&MockModule::hwc2(device), Config::default(), overrides)
        .unwrap();
    assert_eq!(tb.backend.size(), Size::from((800, TEST_HEIGHT)));
}

// ========== Property tests ==========

proptest! {
    #[test]
    fn refresh_rate_is_positive(period in 1i64..1_000_000_000) {
        prop_assert!(refresh_rate(period) > 0);
    }

    #[test]
    fn refresh_rate_inverts_period(hz in 24u32..=240) {
        let period = 1_000_000_000i64 / i64::from(hz);
        let rate = refresh_rate(period);
        // Integer division of the period loses at most a few mHz per Hz
        prop_assert!((rate - hz as i32 * 1000).abs() <= hz as i32);
    }

    #[test]
    fn physical_size_scales_with_pixels(w in 1i32..8000, h in 1i32..8000, dpi in 50.0f32..800.0) {
        let small = physical_size((w, h).into(), (dpi, dpi), 3.8);
        let large = physical_size((w * 2, h * 2).into(), (dpi, dpi), 3.8);
        prop_assert!(large.w >= small.w * 2 - 1 && large.w <= small.w * 2 + 1);
        prop_assert!(large.h >= small.h * 2 - 1 && large.h <= small.h * 2 + 1);
    }

    #[test]
    fn fallback_density_ignores_partial_dpi(w in 1i32..8000, h in 1i32..8000, dpi in 50.0f32..800.0) {
        let partial = physical_size((w, h).into(), (dpi, 0.0), 3.8);
        let none = physical_size((w, h).into(), (0.0, 0.0), 3.8);
        prop_assert_eq!(partial, none);
    }
}

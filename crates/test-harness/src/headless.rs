//! Mock vendor HALs and a headless backend for testing
//!
//! The mocks implement the raw device traits ([`Hwc1Device`], [`Hwc2Device`],
//! [`LightsDevice`]) so the real adapters, vsync engine and controller run on
//! top of them unchanged. Every call is recorded in a [`CallLog`].

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use calloop::channel::Event as ChannelEvent;
use calloop::EventLoop;
use smithay::backend::input::{
    AbsolutePositionEvent, Axis, AxisRelativeDirection, AxisSource, ButtonState, Device,
    DeviceCapability, Event, InputBackend, InputEvent, KeyState, Keycode, KeyboardKeyEvent,
    PointerAxisEvent, PointerButtonEvent, TouchDownEvent, TouchEvent, TouchMotionEvent, TouchSlot,
    TouchUpEvent, UnusedEvent,
};

use hwcomposer::hal::hwc1::{self, DisplayContents, Hwc1Device};
use hwcomposer::hal::hwc2::{self, Hwc2Config, Hwc2Device, LayerSetup};
use hwcomposer::hal::{BufferHandle, ComposerModule, DisplayId, HalCallbacks, OpenError};
use hwcomposer::lights::{LightState, LightsDevice};
use hwcomposer::{BackendError, Config, DebugOverrides, Fence, HwcomposerBackend, RenderLoop};
use thiserror::Error;

use crate::fixtures::{signalled_fence_pair, FenceProbe};

#[derive(Error, Debug)]
pub enum TestError {
    #[error("timeout waiting for condition")]
    Timeout,
}

/// Poll `condition` every millisecond until it holds or `timeout` passes
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> Result<(), TestError> {
    let deadline = Instant::now() + timeout;
    while !condition() {
        if Instant::now() >= deadline {
            return Err(TestError::Timeout);
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    Ok(())
}

/// One call that reached a mock device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalCall {
    RegisterCallback,
    PowerMode(i32),
    Blank(bool),
    VsyncEnabled(bool),
    CreateLayer,
    Validate,
    AcceptChanges,
    SetClientTarget { fenced: bool },
    Present,
    Prepare,
    Set { fenced: bool },
}

/// Shared, ordered record of device calls
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<HalCall>>>);

impl CallLog {
    fn push(&self, call: HalCall) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<HalCall> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&HalCall) -> bool) -> usize {
        self.0.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    /// Power-related calls only, in order
    pub fn power_calls(&self) -> Vec<HalCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, HalCall::PowerMode(_) | HalCall::Blank(_)))
            .collect()
    }

    pub fn vsync_calls(&self) -> Vec<bool> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                HalCall::VsyncEnabled(enabled) => Some(enabled),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

fn fire<F: FnOnce(&dyn HalCallbacks)>(callbacks: &Mutex<Option<Arc<dyn HalCallbacks>>>, f: F) {
    // Cloned out so callbacks never run under the mock's lock
    let callbacks = callbacks.lock().unwrap().clone();
    if let Some(callbacks) = callbacks {
        f(callbacks.as_ref());
    }
}

// ========== HWC2 ==========

/// When the mock announces the primary display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hotplug {
    /// From inside callback registration
    Immediate,
    /// From another thread after a delay
    After(Duration),
    Never,
}

/// Scripted HWC2 compat device
pub struct MockHwc2Device {
    log: CallLog,
    config: Hwc2Config,
    hotplug: Hotplug,
    connected: AtomicBool,
    callbacks: Mutex<Option<Arc<dyn HalCallbacks>>>,
    validate_result: Mutex<(i32, u32, u32)>,
    present_code: AtomicI32,
    vsync_code: AtomicI32,
    power_code: AtomicI32,
    present_probes: Mutex<Vec<FenceProbe>>,
    layers: Mutex<Vec<LayerSetup>>,
    next_layer: AtomicU64,
}

impl MockHwc2Device {
    pub fn new(config: Hwc2Config) -> Self {
        Self {
            log: CallLog::default(),
            config,
            hotplug: Hotplug::Immediate,
            connected: AtomicBool::new(false),
            callbacks: Mutex::new(None),
            validate_result: Mutex::new((hwc2::error::NONE, 0, 0)),
            present_code: AtomicI32::new(hwc2::error::NONE),
            vsync_code: AtomicI32::new(hwc2::error::NONE),
            power_code: AtomicI32::new(hwc2::error::NONE),
            present_probes: Mutex::new(Vec::new()),
            layers: Mutex::new(Vec::new()),
            next_layer: AtomicU64::new(1),
        }
    }

    pub fn with_hotplug(mut self, hotplug: Hotplug) -> Self {
        self.hotplug = hotplug;
        self
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }

    /// `(error, num_types, num_requests)` returned by the next validates
    pub fn set_validate_result(&self, code: i32, types: u32, requests: u32) {
        *self.validate_result.lock().unwrap() = (code, types, requests);
    }

    pub fn set_present_code(&self, code: i32) {
        self.present_code.store(code, Ordering::SeqCst);
    }

    pub fn set_vsync_code(&self, code: i32) {
        self.vsync_code.store(code, Ordering::SeqCst);
    }

    pub fn set_power_code(&self, code: i32) {
        self.power_code.store(code, Ordering::SeqCst);
    }

    /// Probes for every present fence handed out, oldest first
    pub fn present_probes(&self) -> std::sync::MutexGuard<'_, Vec<FenceProbe>> {
        self.present_probes.lock().unwrap()
    }

    pub fn layer_setups(&self) -> Vec<LayerSetup> {
        self.layers.lock().unwrap().clone()
    }

    pub fn fire_vsync(&self, display: DisplayId, timestamp_ns: i64) {
        fire(&self.callbacks, |cb| cb.vsync(display, timestamp_ns));
    }

    pub fn fire_refresh(&self, display: DisplayId) {
        fire(&self.callbacks, |cb| cb.refresh(display));
    }
}

impl Hwc2Device for MockHwc2Device {
    fn register_callback(&self, callbacks: Arc<dyn HalCallbacks>, _sequence_id: i32) {
        self.log.push(HalCall::RegisterCallback);
        *self.callbacks.lock().unwrap() = Some(callbacks.clone());
        match self.hotplug {
            Hotplug::Immediate => callbacks.hotplug(0, true),
            Hotplug::After(delay) => {
                std::thread::spawn(move || {
                    std::thread::sleep(delay);
                    callbacks.hotplug(0, true);
                });
            }
            Hotplug::Never => {}
        }
    }

    fn on_hotplug(&self, display: DisplayId, connected: bool) {
        if display == 0 {
            self.connected.store(connected, Ordering::SeqCst);
        }
    }

    fn has_display(&self, display: DisplayId) -> bool {
        display == 0 && self.connected.load(Ordering::SeqCst)
    }

    fn active_config(&self, display: DisplayId) -> Option<Hwc2Config> {
        self.has_display(display).then_some(self.config)
    }

    fn create_layer(&self, _display: DisplayId) -> Option<u64> {
        self.log.push(HalCall::CreateLayer);
        Some(self.next_layer.fetch_add(1, Ordering::SeqCst))
    }

    fn setup_layer(&self, _layer: u64, setup: &LayerSetup) -> i32 {
        self.layers.lock().unwrap().push(*setup);
        hwc2::error::NONE
    }

    fn set_power_mode(&self, _display: DisplayId, mode: i32) -> i32 {
        self.log.push(HalCall::PowerMode(mode));
        self.power_code.load(Ordering::SeqCst)
    }

    fn set_vsync_enabled(&self, _display: DisplayId, enabled: i32) -> i32 {
        self.log
            .push(HalCall::VsyncEnabled(enabled == hwc2::VSYNC_ENABLE));
        self.vsync_code.load(Ordering::SeqCst)
    }

    fn validate(&self, _display: DisplayId) -> (i32, u32, u32) {
        self.log.push(HalCall::Validate);
        *self.validate_result.lock().unwrap()
    }

    fn accept_changes(&self, _display: DisplayId) -> i32 {
        self.log.push(HalCall::AcceptChanges);
        hwc2::error::NONE
    }

    fn set_client_target(
        &self,
        _display: DisplayId,
        _slot: u32,
        _buffer: BufferHandle,
        acquire_fence: Option<Fence>,
        _dataspace: i32,
    ) -> i32 {
        self.log.push(HalCall::SetClientTarget {
            fenced: acquire_fence.is_some(),
        });
        hwc2::error::NONE
    }

    fn present(&self, _display: DisplayId) -> (i32, Option<Fence>) {
        self.log.push(HalCall::Present);
        let (fence, probe) = signalled_fence_pair();
        self.present_probes.lock().unwrap().push(probe);
        (self.present_code.load(Ordering::SeqCst), Some(fence))
    }
}

// ========== HWC1 ==========

/// Scripted legacy composer device
pub struct MockHwc1Device {
    log: CallLog,
    version: u32,
    /// Width, height, dpi x/y (per thousand inches), vsync period
    attributes: [i32; 5],
    callbacks: Mutex<Option<Arc<dyn HalCallbacks>>>,
    prepare_code: AtomicI32,
    set_code: AtomicI32,
    release_probes: Mutex<Vec<FenceProbe>>,
    retire_probes: Mutex<Vec<FenceProbe>>,
    last_contents: Mutex<Option<(usize, u32)>>,
}

impl MockHwc1Device {
    pub fn new(version: u32, config: &Hwc2Config) -> Self {
        Self {
            log: CallLog::default(),
            version,
            attributes: [
                config.width,
                config.height,
                (config.dpi_x * 1000.0) as i32,
                (config.dpi_y * 1000.0) as i32,
                config.vsync_period as i32,
            ],
            callbacks: Mutex::new(None),
            prepare_code: AtomicI32::new(0),
            set_code: AtomicI32::new(0),
            release_probes: Mutex::new(Vec::new()),
            retire_probes: Mutex::new(Vec::new()),
            last_contents: Mutex::new(None),
        }
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }

    pub fn set_prepare_code(&self, code: i32) {
        self.prepare_code.store(code, Ordering::SeqCst);
    }

    pub fn set_set_code(&self, code: i32) {
        self.set_code.store(code, Ordering::SeqCst);
    }

    pub fn release_probes(&self) -> std::sync::MutexGuard<'_, Vec<FenceProbe>> {
        self.release_probes.lock().unwrap()
    }

    pub fn retire_probes(&self) -> std::sync::MutexGuard<'_, Vec<FenceProbe>> {
        self.retire_probes.lock().unwrap()
    }

    /// Layer count and flags of the last list passed to `set`
    pub fn last_contents(&self) -> Option<(usize, u32)> {
        *self.last_contents.lock().unwrap()
    }

    pub fn fire_vsync(&self, display: i32, timestamp_ns: i64) {
        fire(&self.callbacks, |cb| cb.vsync(display as DisplayId, timestamp_ns));
    }
}

impl Hwc1Device for MockHwc1Device {
    fn version(&self) -> u32 {
        self.version
    }

    fn register_procs(&self, callbacks: Arc<dyn HalCallbacks>) {
        self.log.push(HalCall::RegisterCallback);
        *self.callbacks.lock().unwrap() = Some(callbacks);
    }

    fn display_configs(&self, display: i32) -> Result<Vec<u32>, i32> {
        if display == 0 {
            Ok(vec![0])
        } else {
            Err(-libc::EINVAL)
        }
    }

    fn display_attributes(&self, _display: i32, _config: u32, attributes: &[u32]) -> Result<Vec<i32>, i32> {
        Ok(attributes
            .iter()
            .map(|attribute| match *attribute {
                hwc1::HWC_DISPLAY_WIDTH => self.attributes[0],
                hwc1::HWC_DISPLAY_HEIGHT => self.attributes[1],
                hwc1::HWC_DISPLAY_DPI_X => self.attributes[2],
                hwc1::HWC_DISPLAY_DPI_Y => self.attributes[3],
                hwc1::HWC_DISPLAY_VSYNC_PERIOD => self.attributes[4],
                _ => 0,
            })
            .collect())
    }

    fn set_power_mode(&self, _display: i32, mode: i32) -> i32 {
        self.log.push(HalCall::PowerMode(mode));
        0
    }

    fn blank(&self, _display: i32, blank: bool) -> i32 {
        self.log.push(HalCall::Blank(blank));
        0
    }

    fn event_control(&self, _display: i32, event: i32, enabled: bool) -> i32 {
        if event == hwc1::HWC_EVENT_VSYNC {
            self.log.push(HalCall::VsyncEnabled(enabled));
        }
        0
    }

    fn prepare(&self, _contents: &mut DisplayContents) -> i32 {
        self.log.push(HalCall::Prepare);
        self.prepare_code.load(Ordering::SeqCst)
    }

    fn set(&self, contents: &mut DisplayContents) -> i32 {
        *self.last_contents.lock().unwrap() = Some((contents.layers.len(), contents.flags));
        let target = contents.target_mut();
        let fenced = target.as_ref().map_or(false, |t| t.acquire_fence.is_some());
        self.log.push(HalCall::Set { fenced });

        if let Some(target) = target {
            // The composer owns the acquire fence from here on
            target.acquire_fence = None;
            let (release, probe) = signalled_fence_pair();
            target.release_fence = Some(release);
            self.release_probes.lock().unwrap().push(probe);
        }
        let (retire, probe) = signalled_fence_pair();
        contents.retire_fence = Some(retire);
        self.retire_probes.lock().unwrap().push(probe);

        self.set_code.load(Ordering::SeqCst)
    }
}

// ========== module, lights, render loop ==========

/// Composer module offering a legacy device, an HWC2 device, or both
#[derive(Default)]
pub struct MockModule {
    pub hwc1: Option<Arc<MockHwc1Device>>,
    pub hwc2: Option<Arc<MockHwc2Device>>,
}

impl MockModule {
    pub fn hwc1(device: Arc<MockHwc1Device>) -> Self {
        Self {
            hwc1: Some(device),
            hwc2: None,
        }
    }

    pub fn hwc2(device: Arc<MockHwc2Device>) -> Self {
        Self {
            hwc1: None,
            hwc2: Some(device),
        }
    }
}

impl ComposerModule for MockModule {
    fn open_hwc1(&self) -> Option<Arc<dyn Hwc1Device>> {
        self.hwc1
            .clone()
            .map(|device| device as Arc<dyn Hwc1Device>)
    }

    fn open_hwc2(&self) -> Result<Arc<dyn Hwc2Device>, OpenError> {
        self.hwc2
            .clone()
            .map(|device| device as Arc<dyn Hwc2Device>)
            .ok_or(OpenError::Device {
                device: "hwc2",
                code: -libc::ENODEV,
            })
    }
}

/// Lights device recording every color written
#[derive(Debug, Clone, Default)]
pub struct MockLights {
    colors: Arc<Mutex<Vec<u32>>>,
}

impl MockLights {
    pub fn boxed(&self) -> Box<dyn LightsDevice> {
        Box::new(self.clone())
    }

    pub fn colors(&self) -> Vec<u32> {
        self.colors.lock().unwrap().clone()
    }

    /// Low byte of the last color, the brightness level
    pub fn last_level(&self) -> Option<u8> {
        self.colors.lock().unwrap().last().map(|c| (c & 0xff) as u8)
    }
}

impl LightsDevice for MockLights {
    fn set_light(&self, state: &LightState) -> i32 {
        self.colors.lock().unwrap().push(state.color);
        0
    }
}

#[derive(Debug, Default)]
struct RenderLoopState {
    pending: usize,
    completed: Vec<Duration>,
    repaints: usize,
}

/// Render loop recording what the backend asked of it
#[derive(Debug, Clone, Default)]
pub struct RecordingRenderLoop {
    state: Arc<Mutex<RenderLoopState>>,
}

impl RecordingRenderLoop {
    pub fn set_pending(&self, pending: usize) {
        self.state.lock().unwrap().pending = pending;
    }

    pub fn completed(&self) -> Vec<Duration> {
        self.state.lock().unwrap().completed.clone()
    }

    pub fn repaints(&self) -> usize {
        self.state.lock().unwrap().repaints
    }
}

impl RenderLoop for RecordingRenderLoop {
    fn pending_frame_count(&self) -> usize {
        self.state.lock().unwrap().pending
    }

    fn notify_frame_completed(&mut self, timestamp: Duration) {
        self.state.lock().unwrap().completed.push(timestamp);
    }

    fn schedule_repaint(&mut self) {
        self.state.lock().unwrap().repaints += 1;
    }
}

// ========== backend ==========

/// A backend on mock devices with its own event loop
pub struct TestBackend {
    pub backend: HwcomposerBackend,
    pub render_loop: RecordingRenderLoop,
    pub lights: MockLights,
    event_loop: EventLoop<'static, HwcomposerBackend>,
}

impl TestBackend {
    pub fn new(module: &MockModule, config: Config) -> Result<Self, BackendError> {
        Self::with_overrides(module, config, DebugOverrides::default())
    }

    pub fn with_overrides(
        module: &MockModule,
        config: Config,
        overrides: DebugOverrides,
    ) -> Result<Self, BackendError> {
        let render_loop = RecordingRenderLoop::default();
        let lights = MockLights::default();
        let (backend, sources) = HwcomposerBackend::new(
            module,
            Ok(lights.boxed()),
            config,
            overrides,
            Box::new(render_loop.clone()),
        )?;

        let event_loop: EventLoop<'static, HwcomposerBackend> =
            EventLoop::try_new().expect("event loop");
        event_loop
            .handle()
            .insert_source(sources.messages, |event, _, backend| {
                if let ChannelEvent::Msg(message) = event {
                    backend.handle_message(message);
                }
            })
            .expect("insert backend channel");

        Ok(Self {
            backend,
            render_loop,
            lights,
            event_loop,
        })
    }

    /// Handle every queued backend message
    pub fn dispatch(&mut self) {
        self.event_loop
            .dispatch(Some(Duration::ZERO), &mut self.backend)
            .expect("dispatch");
    }
}

// ========== input ==========

/// Input backend for injecting events into the wake filter
#[derive(Debug, Clone)]
pub struct TestInputBackend;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct TestDevice;

/// xkb keycodes are evdev codes shifted by 8
const XKB_OFFSET: u32 = 8;

#[derive(Debug, Clone)]
pub struct TestKeyboardEvent {
    pub time_msec: u32,
    /// evdev code
    pub key: u32,
    pub state: KeyState,
}

#[derive(Debug, Clone)]
pub struct TestPointerButtonEvent {
    pub time_msec: u32,
    pub button: u32,
    pub state: ButtonState,
}

#[derive(Debug, Clone)]
pub struct TestPointerAxisEvent {
    pub time_msec: u32,
    pub vertical: f64,
}

/// Shared by touch down, motion and up
#[derive(Debug, Clone)]
pub struct TestTouchEvent {
    pub time_msec: u32,
    pub slot: u32,
    pub x: f64,
    pub y: f64,
}

impl InputBackend for TestInputBackend {
    type Device = TestDevice;
    type KeyboardKeyEvent = TestKeyboardEvent;
    type PointerAxisEvent = TestPointerAxisEvent;
    type PointerButtonEvent = TestPointerButtonEvent;
    type PointerMotionEvent = UnusedEvent;
    type PointerMotionAbsoluteEvent = UnusedEvent;
    type GestureSwipeBeginEvent = UnusedEvent;
    type GestureSwipeUpdateEvent = UnusedEvent;
    type GestureSwipeEndEvent = UnusedEvent;
    type GesturePinchBeginEvent = UnusedEvent;
    type GesturePinchUpdateEvent = UnusedEvent;
    type GesturePinchEndEvent = UnusedEvent;
    type GestureHoldBeginEvent = UnusedEvent;
    type GestureHoldEndEvent = UnusedEvent;
    type TouchDownEvent = TestTouchEvent;
    type TouchUpEvent = TestTouchEvent;
    type TouchMotionEvent = TestTouchEvent;
    type TouchCancelEvent = UnusedEvent;
    type TouchFrameEvent = UnusedEvent;
    type TabletToolAxisEvent = UnusedEvent;
    type TabletToolProximityEvent = UnusedEvent;
    type TabletToolTipEvent = UnusedEvent;
    type TabletToolButtonEvent = UnusedEvent;
    type SwitchToggleEvent = UnusedEvent;
    type SpecialEvent = UnusedEvent;
}

impl Device for TestDevice {
    fn id(&self) -> String {
        "test-device".to_string()
    }

    fn name(&self) -> String {
        "test-device".to_string()
    }

    fn has_capability(&self, capability: DeviceCapability) -> bool {
        matches!(
            capability,
            DeviceCapability::Keyboard | DeviceCapability::Pointer | DeviceCapability::Touch
        )
    }

    fn usb_id(&self) -> Option<(u32, u32)> {
        None
    }

    fn syspath(&self) -> Option<std::path::PathBuf> {
        None
    }
}

/// `Event::time` is in microseconds
fn micros(time_msec: u32) -> u64 {
    u64::from(time_msec) * 1000
}

impl Event<TestInputBackend> for TestKeyboardEvent {
    fn time(&self) -> u64 {
        micros(self.time_msec)
    }

    fn device(&self) -> TestDevice {
        TestDevice
    }
}

impl KeyboardKeyEvent<TestInputBackend> for TestKeyboardEvent {
    fn key_code(&self) -> Keycode {
        Keycode::new(self.key + XKB_OFFSET)
    }

    fn state(&self) -> KeyState {
        self.state
    }

    fn count(&self) -> u32 {
        1
    }
}

impl Event<TestInputBackend> for TestPointerButtonEvent {
    fn time(&self) -> u64 {
        micros(self.time_msec)
    }

    fn device(&self) -> TestDevice {
        TestDevice
    }
}

impl PointerButtonEvent<TestInputBackend> for TestPointerButtonEvent {
    fn button_code(&self) -> u32 {
        self.button
    }

    fn state(&self) -> ButtonState {
        self.state
    }
}

impl Event<TestInputBackend> for TestPointerAxisEvent {
    fn time(&self) -> u64 {
        micros(self.time_msec)
    }

    fn device(&self) -> TestDevice {
        TestDevice
    }
}

impl PointerAxisEvent<TestInputBackend> for TestPointerAxisEvent {
    fn amount(&self, axis: Axis) -> Option<f64> {
        match axis {
            Axis::Horizontal => Some(0.0),
            Axis::Vertical => Some(self.vertical),
        }
    }

    fn amount_v120(&self, axis: Axis) -> Option<f64> {
        self.amount(axis).map(|amount| amount * 120.0)
    }

    fn source(&self) -> AxisSource {
        AxisSource::Wheel
    }

    fn relative_direction(&self, _axis: Axis) -> AxisRelativeDirection {
        AxisRelativeDirection::Identical
    }
}

impl Event<TestInputBackend> for TestTouchEvent {
    fn time(&self) -> u64 {
        micros(self.time_msec)
    }

    fn device(&self) -> TestDevice {
        TestDevice
    }
}

impl TouchEvent<TestInputBackend> for TestTouchEvent {
    fn slot(&self) -> TouchSlot {
        Some(self.slot).into()
    }
}

impl AbsolutePositionEvent<TestInputBackend> for TestTouchEvent {
    fn x(&self) -> f64 {
        self.x
    }

    fn y(&self) -> f64 {
        self.y
    }

    fn x_transformed(&self, width: i32) -> f64 {
        self.x * width as f64
    }

    fn y_transformed(&self, height: i32) -> f64 {
        self.y * height as f64
    }
}

impl TouchDownEvent<TestInputBackend> for TestTouchEvent {}
impl TouchUpEvent<TestInputBackend> for TestTouchEvent {}
impl TouchMotionEvent<TestInputBackend> for TestTouchEvent {}

/// Constructors for [`InputEvent`]s of the test backend
pub mod inject {
    use super::*;

    pub type TestEvent = InputEvent<TestInputBackend>;

    pub fn key(key: u32, state: KeyState, time_msec: u32) -> TestEvent {
        InputEvent::Keyboard {
            event: TestKeyboardEvent {
                time_msec,
                key,
                state,
            },
        }
    }

    pub fn button(button: u32, state: ButtonState, time_msec: u32) -> TestEvent {
        InputEvent::PointerButton {
            event: TestPointerButtonEvent {
                time_msec,
                button,
                state,
            },
        }
    }

    pub fn scroll(vertical: f64, time_msec: u32) -> TestEvent {
        InputEvent::PointerAxis {
            event: TestPointerAxisEvent {
                time_msec,
                vertical,
            },
        }
    }

    fn touch(slot: u32, time_msec: u32) -> TestTouchEvent {
        TestTouchEvent {
            time_msec,
            slot,
            x: 0.5,
            y: 0.5,
        }
    }

    pub fn touch_down(slot: u32, time_msec: u32) -> TestEvent {
        InputEvent::TouchDown {
            event: touch(slot, time_msec),
        }
    }

    pub fn touch_motion(slot: u32, time_msec: u32) -> TestEvent {
        InputEvent::TouchMotion {
            event: touch(slot, time_msec),
        }
    }

    pub fn touch_up(slot: u32, time_msec: u32) -> TestEvent {
        InputEvent::TouchUp {
            event: touch(slot, time_msec),
        }
    }

    /// Down then up on slot 0
    pub fn tap(down_msec: u32, up_msec: u32) -> [TestEvent; 2] {
        [touch_down(0, down_msec), touch_up(0, up_msec)]
    }
}

//! libhybris bindings
//!
//! Implements the device traits on top of the Android HALs that libhybris
//! loads: `hwcomposer` (HWC1 function table), the `hwc2_compat_*` layer for
//! HWC2, and the `lights` module. Also wraps `HWCNativeWindow`, the EGL
//! native window whose present callback feeds [`PresentationSurface`].

#![allow(non_camel_case_types, non_snake_case)]

use std::collections::HashMap;
use std::ffi::{c_char, c_int, c_uint, c_void, CStr};
use std::os::fd::{AsRawFd, RawFd};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::fence::Fence;
use crate::lights::{LightState, LightsDevice};
use crate::surface::{PresentationSurface, BUFFER_COUNT};

use super::hwc1::{self, DisplayContents, Hwc1Device, Layer};
use super::hwc2::{Hwc2Config, Hwc2Device, LayerSetup};
use super::{BufferHandle, ComposerModule, DisplayId, HalCallbacks, OpenError};

const HWC_HARDWARE_MODULE_ID: &CStr = c"hwcomposer";
const HWC_HARDWARE_COMPOSER: &CStr = c"composer";
const LIGHTS_HARDWARE_MODULE_ID: &CStr = c"lights";
const LIGHT_ID_BACKLIGHT: &CStr = c"backlight";

const HAL_PIXEL_FORMAT_RGBA_8888: c_uint = 1;

/// Layers in the HWC1 list
const MAX_LAYERS: usize = 2;

// ========== hardware.h ==========

#[repr(C)]
pub struct hw_module_methods_t {
    pub open: Option<
        unsafe extern "C" fn(
            module: *const hw_module_t,
            id: *const c_char,
            device: *mut *mut hw_device_t,
        ) -> c_int,
    >,
}

#[repr(C)]
pub struct hw_module_t {
    pub tag: u32,
    pub module_api_version: u16,
    pub hal_api_version: u16,
    pub id: *const c_char,
    pub name: *const c_char,
    pub author: *const c_char,
    pub methods: *mut hw_module_methods_t,
    pub dso: *mut c_void,
    pub reserved: [usize; 32 - 7],
}

#[repr(C)]
pub struct hw_device_t {
    pub tag: u32,
    pub version: u32,
    pub module: *mut hw_module_t,
    pub reserved: [usize; 12],
    pub close: Option<unsafe extern "C" fn(device: *mut hw_device_t) -> c_int>,
}

#[link(name = "hardware")]
extern "C" {
    fn hw_get_module(id: *const c_char, module: *mut *const hw_module_t) -> c_int;
}

fn get_module(id: &'static CStr) -> Result<NonNull<hw_module_t>, OpenError> {
    let mut module: *const hw_module_t = ptr::null();
    let status = unsafe { hw_get_module(id.as_ptr(), &mut module) };
    if status != 0 {
        tracing::warn!(module = ?id, status, "hw_get_module failed");
    }
    NonNull::new(module as *mut hw_module_t)
        .filter(|_| status == 0)
        .ok_or(OpenError::ModuleNotFound(module_name(id)))
}

/// Open `device` on `module`, returning the raw status on failure
fn open_device(module: NonNull<hw_module_t>, device: &CStr) -> Result<NonNull<hw_device_t>, i32> {
    let mut raw: *mut hw_device_t = ptr::null_mut();
    let status = unsafe {
        let methods = module.as_ref().methods;
        match methods.as_ref().and_then(|m| m.open) {
            Some(open) => open(module.as_ptr(), device.as_ptr(), &mut raw),
            None => -libc::ENOSYS,
        }
    };
    match NonNull::new(raw) {
        Some(raw) if status == 0 => Ok(raw),
        _ => Err(if status == 0 { -libc::ENODEV } else { status }),
    }
}

fn module_name(id: &'static CStr) -> &'static str {
    id.to_str().unwrap_or("unknown")
}

// ========== hwcomposer.h (HWC1) ==========

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct hwc_rect_t {
    pub left: c_int,
    pub top: c_int,
    pub right: c_int,
    pub bottom: c_int,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct hwc_frect_t {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct hwc_region_t {
    pub numRects: usize,
    pub rects: *const hwc_rect_t,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct hwc_layer_1_t {
    pub compositionType: i32,
    pub hints: u32,
    pub flags: u32,
    pub handle: *const c_void,
    pub transform: u32,
    pub blending: i32,
    pub sourceCropf: hwc_frect_t,
    pub displayFrame: hwc_rect_t,
    pub visibleRegionScreen: hwc_region_t,
    pub acquireFenceFd: c_int,
    pub releaseFenceFd: c_int,
    pub planeAlpha: u8,
    pub _pad: [u8; 3],
    pub surfaceDamage: hwc_region_t,
    #[cfg(target_pointer_width = "64")]
    pub reserved: [u8; 120 - 112],
    #[cfg(not(target_pointer_width = "64"))]
    pub reserved: [u8; 96 - 84],
}

#[repr(C)]
pub struct hwc_display_contents_1_t {
    pub retireFenceFd: c_int,
    pub dpy: *mut c_void,
    pub sur: *mut c_void,
    pub flags: u32,
    pub numHwLayers: usize,
    // hwLayers[] follows
}

#[repr(C)]
pub struct hwc_procs_t {
    pub invalidate: Option<unsafe extern "C" fn(procs: *const hwc_procs_t)>,
    pub vsync: Option<unsafe extern "C" fn(procs: *const hwc_procs_t, disp: c_int, timestamp: i64)>,
    pub hotplug:
        Option<unsafe extern "C" fn(procs: *const hwc_procs_t, disp: c_int, connected: c_int)>,
}

type Hwc1Fn = Option<unsafe extern "C" fn(dev: *mut hwc_composer_device_1_t, disp: c_int, value: c_int) -> c_int>;

#[repr(C)]
pub struct hwc_composer_device_1_t {
    pub common: hw_device_t,
    pub prepare: Option<
        unsafe extern "C" fn(
            dev: *mut hwc_composer_device_1_t,
            num_displays: usize,
            displays: *mut *mut hwc_display_contents_1_t,
        ) -> c_int,
    >,
    pub set: Option<
        unsafe extern "C" fn(
            dev: *mut hwc_composer_device_1_t,
            num_displays: usize,
            displays: *mut *mut hwc_display_contents_1_t,
        ) -> c_int,
    >,
    pub eventControl: Option<
        unsafe extern "C" fn(
            dev: *mut hwc_composer_device_1_t,
            disp: c_int,
            event: c_int,
            enabled: c_int,
        ) -> c_int,
    >,
    /// `blank` up to 1.3, `setPowerMode` after; same signature
    pub blankOrSetPowerMode: Hwc1Fn,
    pub query: Option<
        unsafe extern "C" fn(dev: *mut hwc_composer_device_1_t, what: c_int, value: *mut c_int) -> c_int,
    >,
    pub registerProcs:
        Option<unsafe extern "C" fn(dev: *mut hwc_composer_device_1_t, procs: *const hwc_procs_t)>,
    pub dump: Option<
        unsafe extern "C" fn(dev: *mut hwc_composer_device_1_t, buff: *mut c_char, buff_len: c_int),
    >,
    pub getDisplayConfigs: Option<
        unsafe extern "C" fn(
            dev: *mut hwc_composer_device_1_t,
            disp: c_int,
            configs: *mut u32,
            num_configs: *mut usize,
        ) -> c_int,
    >,
    pub getDisplayAttributes: Option<
        unsafe extern "C" fn(
            dev: *mut hwc_composer_device_1_t,
            disp: c_int,
            config: u32,
            attributes: *const u32,
            values: *mut i32,
        ) -> c_int,
    >,
    pub getActiveConfig: *mut c_void,
    pub setActiveConfig: *mut c_void,
    pub setCursorPositionAsync: *mut c_void,
    pub reserved_proc: [*mut c_void; 1],
}

/// `android_native_base_t` followed by the leading `ANativeWindowBuffer`
/// fields, up to `handle`
#[repr(C)]
pub struct ANativeWindowBuffer {
    pub magic: c_int,
    pub version: c_int,
    pub base_reserved: [*mut c_void; 4],
    pub incRef: *mut c_void,
    pub decRef: *mut c_void,
    pub width: c_int,
    pub height: c_int,
    pub stride: c_int,
    pub format: c_int,
    pub usage: c_int,
    pub reserved: [*mut c_void; 2],
    pub handle: *const c_void,
}

#[repr(C)]
pub struct ANativeWindow {
    _opaque: [u8; 0],
}

/// `hwc_procs_t` with the callback sink behind it
#[repr(C)]
struct ProcsBridge {
    procs: hwc_procs_t,
    callbacks: Arc<dyn HalCallbacks>,
}

unsafe extern "C" fn procs_invalidate(procs: *const hwc_procs_t) {
    let bridge = &*(procs as *const ProcsBridge);
    bridge.callbacks.refresh(0);
}

unsafe extern "C" fn procs_vsync(procs: *const hwc_procs_t, disp: c_int, timestamp: i64) {
    let bridge = &*(procs as *const ProcsBridge);
    bridge.callbacks.vsync(disp as DisplayId, timestamp);
}

unsafe extern "C" fn procs_hotplug(procs: *const hwc_procs_t, disp: c_int, connected: c_int) {
    let bridge = &*(procs as *const ProcsBridge);
    bridge.callbacks.hotplug(disp as DisplayId, connected != 0);
}

/// Display contents header with its layer array, laid out as C expects
#[repr(C)]
struct RawContents {
    header: hwc_display_contents_1_t,
    layers: [hwc_layer_1_t; MAX_LAYERS],
}

impl RawContents {
    /// Marshal `contents`; acquire fences are handed over only when `transfer` is set
    fn new(contents: &mut DisplayContents, transfer: bool) -> Option<Box<Self>> {
        if contents.layers.len() > MAX_LAYERS {
            return None;
        }
        let mut raw = Box::new(RawContents {
            header: hwc_display_contents_1_t {
                retireFenceFd: -1,
                dpy: ptr::null_mut(),
                sur: ptr::null_mut(),
                flags: contents.flags,
                numHwLayers: contents.layers.len(),
            },
            layers: [empty_layer(); MAX_LAYERS],
        });
        for (slot, layer) in raw.layers.iter_mut().zip(contents.layers.iter_mut()) {
            fill_layer(slot, layer, transfer);
        }
        // The visible region points at the layer's own display frame
        for slot in raw.layers.iter_mut() {
            slot.visibleRegionScreen.rects = &slot.displayFrame;
        }
        Some(raw)
    }

    /// Take ownership of the fences the HAL filled in
    fn collect(&self, contents: &mut DisplayContents) {
        contents.retire_fence = unsafe { Fence::from_raw_fd(self.header.retireFenceFd) };
        for (slot, layer) in self.layers.iter().zip(contents.layers.iter_mut()) {
            layer.release_fence = unsafe { Fence::from_raw_fd(slot.releaseFenceFd) };
        }
    }
}

fn empty_layer() -> hwc_layer_1_t {
    hwc_layer_1_t {
        compositionType: hwc1::HWC_FRAMEBUFFER,
        hints: 0,
        flags: 0,
        handle: ptr::null(),
        transform: 0,
        blending: hwc1::HWC_BLENDING_NONE,
        sourceCropf: hwc_frect_t::default(),
        displayFrame: hwc_rect_t::default(),
        visibleRegionScreen: hwc_region_t {
            numRects: 1,
            rects: ptr::null(),
        },
        acquireFenceFd: -1,
        releaseFenceFd: -1,
        planeAlpha: 0xff,
        _pad: [0; 3],
        surfaceDamage: hwc_region_t {
            numRects: 0,
            rects: ptr::null(),
        },
        reserved: Default::default(),
    }
}

fn fill_layer(slot: &mut hwc_layer_1_t, layer: &mut Layer, transfer: bool) {
    let crop = layer.source_crop;
    let frame = layer.display_frame;
    slot.compositionType = layer.composition_type;
    slot.handle = layer
        .handle
        .map(|buffer| unsafe { native_handle(buffer) })
        .unwrap_or(ptr::null());
    slot.transform = layer.transform as u32;
    slot.blending = layer.blending;
    slot.sourceCropf = hwc_frect_t {
        left: crop.loc.x as f32,
        top: crop.loc.y as f32,
        right: (crop.loc.x + crop.size.w) as f32,
        bottom: (crop.loc.y + crop.size.h) as f32,
    };
    slot.displayFrame = hwc_rect_t {
        left: frame.loc.x,
        top: frame.loc.y,
        right: frame.loc.x + frame.size.w,
        bottom: frame.loc.y + frame.size.h,
    };
    slot.planeAlpha = layer.plane_alpha;
    slot.acquireFenceFd = if transfer {
        layer.acquire_fence.take().map_or(-1, Fence::into_raw_fd)
    } else {
        layer.acquire_fence.as_ref().map_or(-1, |f| f.as_raw_fd())
    };
    slot.releaseFenceFd = -1;
}

/// The gralloc handle inside a window buffer
///
/// # Safety
/// `buffer` must point at a live `ANativeWindowBuffer`.
unsafe fn native_handle(buffer: BufferHandle) -> *const c_void {
    let buffer = buffer.as_ptr() as *const ANativeWindowBuffer;
    match buffer.as_ref() {
        Some(buffer) => buffer.handle,
        None => ptr::null(),
    }
}

/// HWC1 device opened through `hw_get_module`
pub struct HybrisHwc1Device {
    device: NonNull<hwc_composer_device_1_t>,
    procs: Mutex<Option<Box<ProcsBridge>>>,
}

// The function table is safe to call from any thread; the render thread
// is the only caller apart from callback registration
unsafe impl Send for HybrisHwc1Device {}
unsafe impl Sync for HybrisHwc1Device {}

impl HybrisHwc1Device {
    fn raw(&self) -> *mut hwc_composer_device_1_t {
        self.device.as_ptr()
    }

    fn table(&self) -> &hwc_composer_device_1_t {
        unsafe { self.device.as_ref() }
    }

    fn run_list(
        &self,
        contents: &mut DisplayContents,
        transfer: bool,
        call: Option<
            unsafe extern "C" fn(
                *mut hwc_composer_device_1_t,
                usize,
                *mut *mut hwc_display_contents_1_t,
            ) -> c_int,
        >,
    ) -> i32 {
        let Some(call) = call else {
            return -libc::ENOSYS;
        };
        let Some(mut raw) = RawContents::new(contents, transfer) else {
            return -libc::EINVAL;
        };
        let mut displays = [&mut raw.header as *mut hwc_display_contents_1_t];
        let status = unsafe { call(self.raw(), 1, displays.as_mut_ptr()) };
        if transfer {
            raw.collect(contents);
        }
        status
    }
}

impl Hwc1Device for HybrisHwc1Device {
    fn version(&self) -> u32 {
        self.table().common.version
    }

    fn register_procs(&self, callbacks: Arc<dyn HalCallbacks>) {
        let bridge = Box::new(ProcsBridge {
            procs: hwc_procs_t {
                invalidate: Some(procs_invalidate),
                vsync: Some(procs_vsync),
                hotplug: Some(procs_hotplug),
            },
            callbacks,
        });
        if let Some(register) = self.table().registerProcs {
            unsafe { register(self.raw(), &bridge.procs) };
        }
        // The HAL keeps the pointer for the device's lifetime
        *self.procs.lock().unwrap_or_else(|e| e.into_inner()) = Some(bridge);
    }

    fn display_configs(&self, display: i32) -> Result<Vec<u32>, i32> {
        let call = self.table().getDisplayConfigs.ok_or(-libc::ENOSYS)?;
        let mut configs = [0u32; 5];
        let mut count = configs.len();
        let status = unsafe { call(self.raw(), display, configs.as_mut_ptr(), &mut count) };
        if status != 0 {
            return Err(status);
        }
        Ok(configs[..count.min(configs.len())].to_vec())
    }

    fn display_attributes(
        &self,
        display: i32,
        config: u32,
        attributes: &[u32],
    ) -> Result<Vec<i32>, i32> {
        let call = self.table().getDisplayAttributes.ok_or(-libc::ENOSYS)?;
        let mut request = attributes.to_vec();
        request.push(hwc1::HWC_DISPLAY_NO_ATTRIBUTE);
        let mut values = vec![0i32; request.len()];
        let status =
            unsafe { call(self.raw(), display, config, request.as_ptr(), values.as_mut_ptr()) };
        if status != 0 {
            return Err(status);
        }
        values.truncate(attributes.len());
        Ok(values)
    }

    fn set_power_mode(&self, display: i32, mode: i32) -> i32 {
        match self.table().blankOrSetPowerMode {
            Some(call) => unsafe { call(self.raw(), display, mode) },
            None => -libc::ENOSYS,
        }
    }

    fn blank(&self, display: i32, blank: bool) -> i32 {
        match self.table().blankOrSetPowerMode {
            Some(call) => unsafe { call(self.raw(), display, c_int::from(blank)) },
            None => -libc::ENOSYS,
        }
    }

    fn event_control(&self, display: i32, event: i32, enabled: bool) -> i32 {
        match self.table().eventControl {
            Some(call) => unsafe { call(self.raw(), display, event, c_int::from(enabled)) },
            None => -libc::ENOSYS,
        }
    }

    fn prepare(&self, contents: &mut DisplayContents) -> i32 {
        self.run_list(contents, false, self.table().prepare)
    }

    fn set(&self, contents: &mut DisplayContents) -> i32 {
        self.run_list(contents, true, self.table().set)
    }
}

impl Drop for HybrisHwc1Device {
    fn drop(&mut self) {
        let common = self.device.as_ptr() as *mut hw_device_t;
        unsafe {
            if let Some(close) = (*common).close {
                close(common);
            }
        }
    }
}

// ========== hwc2_compat ==========

#[repr(C)]
pub struct hwc2_compat_device_t {
    _opaque: [u8; 0],
}

#[repr(C)]
pub struct hwc2_compat_display_t {
    _opaque: [u8; 0],
}

#[repr(C)]
pub struct hwc2_compat_layer_t {
    _opaque: [u8; 0],
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct HWC2DisplayConfig {
    pub id: u32,
    pub display: u64,
    pub width: i32,
    pub height: i32,
    pub vsyncPeriod: i64,
    pub dpiX: f32,
    pub dpiY: f32,
}

#[repr(C)]
pub struct HWC2EventListener {
    pub on_vsync_received: Option<
        unsafe extern "C" fn(listener: *mut HWC2EventListener, sequence_id: i32, display: u64, timestamp: i64),
    >,
    pub on_hotplug_received: Option<
        unsafe extern "C" fn(
            listener: *mut HWC2EventListener,
            sequence_id: i32,
            display: u64,
            connected: bool,
            primary_display: bool,
        ),
    >,
    pub on_refresh_received:
        Option<unsafe extern "C" fn(listener: *mut HWC2EventListener, sequence_id: i32, display: u64)>,
}

#[link(name = "hwc2")]
extern "C" {
    fn hwc2_compat_device_new(use_vr_composer: bool) -> *mut hwc2_compat_device_t;
    fn hwc2_compat_device_register_callback(
        device: *mut hwc2_compat_device_t,
        listener: *mut HWC2EventListener,
        composer_sequence_id: c_int,
    );
    fn hwc2_compat_device_on_hotplug(device: *mut hwc2_compat_device_t, display: u64, connected: bool);
    fn hwc2_compat_device_get_display_by_id(
        device: *mut hwc2_compat_device_t,
        id: u64,
    ) -> *mut hwc2_compat_display_t;

    fn hwc2_compat_display_get_active_config(display: *mut hwc2_compat_display_t) -> *mut HWC2DisplayConfig;
    fn hwc2_compat_display_accept_changes(display: *mut hwc2_compat_display_t) -> i32;
    fn hwc2_compat_display_create_layer(display: *mut hwc2_compat_display_t) -> *mut hwc2_compat_layer_t;
    fn hwc2_compat_display_destroy_layer(display: *mut hwc2_compat_display_t, layer: *mut hwc2_compat_layer_t);
    fn hwc2_compat_display_present(display: *mut hwc2_compat_display_t, out_present_fence: *mut i32) -> i32;
    fn hwc2_compat_display_set_client_target(
        display: *mut hwc2_compat_display_t,
        slot: u32,
        buffer: *mut c_void,
        acquire_fence_fd: i32,
        dataspace: i32,
    ) -> i32;
    fn hwc2_compat_display_set_power_mode(display: *mut hwc2_compat_display_t, mode: c_int) -> i32;
    fn hwc2_compat_display_set_vsync_enabled(display: *mut hwc2_compat_display_t, enabled: c_int) -> i32;
    fn hwc2_compat_display_validate(
        display: *mut hwc2_compat_display_t,
        out_num_types: *mut u32,
        out_num_requests: *mut u32,
    ) -> i32;

    fn hwc2_compat_layer_set_blend_mode(layer: *mut hwc2_compat_layer_t, mode: c_int) -> i32;
    fn hwc2_compat_layer_set_composition_type(layer: *mut hwc2_compat_layer_t, comp_type: c_int) -> i32;
    fn hwc2_compat_layer_set_transform(layer: *mut hwc2_compat_layer_t, transform: c_int) -> i32;
    fn hwc2_compat_layer_set_source_crop(
        layer: *mut hwc2_compat_layer_t,
        left: f32,
        top: f32,
        right: f32,
        bottom: f32,
    ) -> i32;
    fn hwc2_compat_layer_set_display_frame(
        layer: *mut hwc2_compat_layer_t,
        left: i32,
        top: i32,
        right: i32,
        bottom: i32,
    ) -> i32;
    fn hwc2_compat_layer_set_visible_region(
        layer: *mut hwc2_compat_layer_t,
        left: i32,
        top: i32,
        right: i32,
        bottom: i32,
    ) -> i32;
}

/// `HWC2EventListener` with the callback sink behind it
#[repr(C)]
struct ListenerBridge {
    listener: HWC2EventListener,
    callbacks: Arc<dyn HalCallbacks>,
}

unsafe extern "C" fn hwc2_vsync(listener: *mut HWC2EventListener, _sequence: i32, display: u64, timestamp: i64) {
    let bridge = &*(listener as *const ListenerBridge);
    bridge.callbacks.vsync(display, timestamp);
}

unsafe extern "C" fn hwc2_hotplug(
    listener: *mut HWC2EventListener,
    sequence: i32,
    id: u64,
    connected: bool,
    primary: bool,
) {
    tracing::debug!(sequence, display = id, connected, primary, "hwc2 hotplug received");
    let bridge = &*(listener as *const ListenerBridge);
    bridge.callbacks.hotplug(id, connected);
}

unsafe extern "C" fn hwc2_refresh(listener: *mut HWC2EventListener, _sequence: i32, display: u64) {
    let bridge = &*(listener as *const ListenerBridge);
    bridge.callbacks.refresh(display);
}

/// HWC2 compat device
pub struct HybrisHwc2Device {
    device: NonNull<hwc2_compat_device_t>,
    displays: Mutex<HashMap<DisplayId, NonNull<hwc2_compat_display_t>>>,
    layers: Mutex<HashMap<u64, (NonNull<hwc2_compat_display_t>, NonNull<hwc2_compat_layer_t>)>>,
    listeners: Mutex<Vec<Box<ListenerBridge>>>,
    next_layer: AtomicU64,
}

unsafe impl Send for HybrisHwc2Device {}
unsafe impl Sync for HybrisHwc2Device {}

impl HybrisHwc2Device {
    pub fn new() -> Result<Self, OpenError> {
        let device = NonNull::new(unsafe { hwc2_compat_device_new(false) }).ok_or(OpenError::Device {
            device: "hwc2",
            code: -libc::ENODEV,
        })?;
        Ok(Self {
            device,
            displays: Mutex::new(HashMap::new()),
            layers: Mutex::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
            next_layer: AtomicU64::new(1),
        })
    }

    fn display_ptr(&self, display: DisplayId) -> Option<NonNull<hwc2_compat_display_t>> {
        let mut displays = self.displays.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(ptr) = displays.get(&display) {
            return Some(*ptr);
        }
        let ptr = NonNull::new(unsafe {
            hwc2_compat_device_get_display_by_id(self.device.as_ptr(), display)
        })?;
        displays.insert(display, ptr);
        Some(ptr)
    }

    fn layer_ptr(&self, layer: u64) -> Option<NonNull<hwc2_compat_layer_t>> {
        let layers = self.layers.lock().unwrap_or_else(|e| e.into_inner());
        layers.get(&layer).map(|(_, ptr)| *ptr)
    }

    fn with_display(&self, display: DisplayId, f: impl FnOnce(*mut hwc2_compat_display_t) -> i32) -> i32 {
        match self.display_ptr(display) {
            Some(ptr) => f(ptr.as_ptr()),
            None => super::hwc2::error::BAD_DISPLAY,
        }
    }
}

impl Hwc2Device for HybrisHwc2Device {
    fn register_callback(&self, callbacks: Arc<dyn HalCallbacks>, sequence_id: i32) {
        let mut bridge = Box::new(ListenerBridge {
            listener: HWC2EventListener {
                on_vsync_received: Some(hwc2_vsync),
                on_hotplug_received: Some(hwc2_hotplug),
                on_refresh_received: Some(hwc2_refresh),
            },
            callbacks,
        });
        unsafe {
            hwc2_compat_device_register_callback(self.device.as_ptr(), &mut bridge.listener, sequence_id);
        }
        self.listeners.lock().unwrap_or_else(|e| e.into_inner()).push(bridge);
    }

    fn on_hotplug(&self, display: DisplayId, connected: bool) {
        unsafe { hwc2_compat_device_on_hotplug(self.device.as_ptr(), display, connected) };
    }

    fn has_display(&self, display: DisplayId) -> bool {
        self.display_ptr(display).is_some()
    }

    fn active_config(&self, display: DisplayId) -> Option<Hwc2Config> {
        let display = self.display_ptr(display)?;
        let raw = unsafe { hwc2_compat_display_get_active_config(display.as_ptr()) };
        let config = unsafe { raw.as_ref() }.copied()?;
        // Allocated with malloc by the compat layer
        unsafe { libc::free(raw as *mut c_void) };
        Some(Hwc2Config {
            id: config.id,
            display: config.display,
            width: config.width,
            height: config.height,
            vsync_period: config.vsyncPeriod,
            dpi_x: config.dpiX,
            dpi_y: config.dpiY,
        })
    }

    fn create_layer(&self, display: DisplayId) -> Option<u64> {
        let display = self.display_ptr(display)?;
        let layer = NonNull::new(unsafe { hwc2_compat_display_create_layer(display.as_ptr()) })?;
        let id = self.next_layer.fetch_add(1, Ordering::Relaxed);
        self.layers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, (display, layer));
        Some(id)
    }

    fn setup_layer(&self, layer: u64, setup: &LayerSetup) -> i32 {
        let Some(layer) = self.layer_ptr(layer) else {
            return super::hwc2::error::BAD_LAYER;
        };
        let layer = layer.as_ptr();
        let [cl, ct, cr, cb] = setup.source_crop;
        let [fl, ft, fr, fb] = setup.display_frame;
        let [vl, vt, vr, vb] = setup.visible_region;
        let results = unsafe {
            [
                hwc2_compat_layer_set_composition_type(layer, setup.composition_type),
                hwc2_compat_layer_set_blend_mode(layer, setup.blend_mode),
                hwc2_compat_layer_set_transform(layer, setup.transform),
                hwc2_compat_layer_set_source_crop(layer, cl, ct, cr, cb),
                hwc2_compat_layer_set_display_frame(layer, fl, ft, fr, fb),
                hwc2_compat_layer_set_visible_region(layer, vl, vt, vr, vb),
            ]
        };
        results.into_iter().find(|&code| code != 0).unwrap_or(0)
    }

    fn set_power_mode(&self, display: DisplayId, mode: i32) -> i32 {
        self.with_display(display, |d| unsafe { hwc2_compat_display_set_power_mode(d, mode) })
    }

    fn set_vsync_enabled(&self, display: DisplayId, enabled: i32) -> i32 {
        self.with_display(display, |d| unsafe { hwc2_compat_display_set_vsync_enabled(d, enabled) })
    }

    fn validate(&self, display: DisplayId) -> (i32, u32, u32) {
        let (mut types, mut requests) = (0u32, 0u32);
        let code = self.with_display(display, |d| unsafe {
            hwc2_compat_display_validate(d, &mut types, &mut requests)
        });
        (code, types, requests)
    }

    fn accept_changes(&self, display: DisplayId) -> i32 {
        self.with_display(display, |d| unsafe { hwc2_compat_display_accept_changes(d) })
    }

    fn set_client_target(
        &self,
        display: DisplayId,
        slot: u32,
        buffer: BufferHandle,
        acquire_fence: Option<Fence>,
        dataspace: i32,
    ) -> i32 {
        let fd: RawFd = acquire_fence.map_or(-1, Fence::into_raw_fd);
        self.with_display(display, |d| unsafe {
            hwc2_compat_display_set_client_target(d, slot, buffer.as_ptr(), fd, dataspace)
        })
    }

    fn present(&self, display: DisplayId) -> (i32, Option<Fence>) {
        let mut fd: i32 = -1;
        let code = self.with_display(display, |d| unsafe { hwc2_compat_display_present(d, &mut fd) });
        (code, unsafe { Fence::from_raw_fd(fd) })
    }
}

impl Drop for HybrisHwc2Device {
    fn drop(&mut self) {
        let layers = self.layers.get_mut().unwrap_or_else(|e| e.into_inner());
        for (_, (display, layer)) in layers.drain() {
            unsafe { hwc2_compat_display_destroy_layer(display.as_ptr(), layer.as_ptr()) };
        }
    }
}

// ========== lights.h ==========

#[repr(C)]
pub struct light_state_t {
    pub color: c_uint,
    pub flashMode: c_int,
    pub flashOnMS: c_int,
    pub flashOffMS: c_int,
    pub brightnessMode: c_int,
}

#[repr(C)]
pub struct light_device_t {
    pub common: hw_device_t,
    pub set_light:
        Option<unsafe extern "C" fn(dev: *mut light_device_t, state: *const light_state_t) -> c_int>,
}

/// Backlight device of the lights HAL
pub struct HybrisLights {
    device: NonNull<light_device_t>,
}

unsafe impl Send for HybrisLights {}

impl HybrisLights {
    pub fn open() -> Result<Self, OpenError> {
        let module = get_module(LIGHTS_HARDWARE_MODULE_ID)?;
        let device = open_device(module, LIGHT_ID_BACKLIGHT).map_err(|code| OpenError::Device {
            device: "backlight",
            code,
        })?;
        Ok(Self {
            device: device.cast(),
        })
    }
}

impl LightsDevice for HybrisLights {
    fn set_light(&self, state: &LightState) -> i32 {
        let raw = light_state_t {
            color: state.color,
            flashMode: state.flash_mode,
            flashOnMS: 0,
            flashOffMS: 0,
            brightnessMode: state.brightness_mode,
        };
        let device = self.device.as_ptr();
        match unsafe { (*device).set_light } {
            Some(set_light) => unsafe { set_light(device, &raw) },
            None => -libc::ENOSYS,
        }
    }
}

impl Drop for HybrisLights {
    fn drop(&mut self) {
        let common = self.device.as_ptr() as *mut hw_device_t;
        unsafe {
            if let Some(close) = (*common).close {
                close(common);
            }
        }
    }
}

// ========== module ==========

/// The hwcomposer module as loaded by libhybris
pub struct HybrisModule {
    module: NonNull<hw_module_t>,
}

impl HybrisModule {
    pub fn load() -> Result<Self, OpenError> {
        Ok(Self {
            module: get_module(HWC_HARDWARE_MODULE_ID)?,
        })
    }

    /// The backlight device, for [`crate::HwcomposerBackend::new`]
    pub fn open_lights(&self) -> Result<Box<dyn LightsDevice>, OpenError> {
        Ok(Box::new(HybrisLights::open()?))
    }
}

impl ComposerModule for HybrisModule {
    fn open_hwc1(&self) -> Option<Arc<dyn Hwc1Device>> {
        match open_device(self.module, HWC_HARDWARE_COMPOSER) {
            Ok(device) => Some(Arc::new(HybrisHwc1Device {
                device: device.cast(),
                procs: Mutex::new(None),
            })),
            Err(code) => {
                tracing::debug!(code, "legacy composer device refused to open");
                None
            }
        }
    }

    fn open_hwc2(&self) -> Result<Arc<dyn Hwc2Device>, OpenError> {
        Ok(Arc::new(HybrisHwc2Device::new()?))
    }
}

// ========== hybris-hwcomposerwindow ==========

type HWCPresentCallback = Option<
    unsafe extern "C" fn(user_data: *mut c_void, window: *mut ANativeWindow, buffer: *mut ANativeWindowBuffer),
>;

#[link(name = "hybris-hwcomposerwindow")]
extern "C" {
    fn HWCNativeWindowCreate(
        width: c_uint,
        height: c_uint,
        format: c_uint,
        present: HWCPresentCallback,
        cb_data: *mut c_void,
    ) -> *mut ANativeWindow;
    fn HWCNativeWindowDestroy(window: *mut ANativeWindow);
    fn HWCNativeWindowSetBufferCount(window: *mut ANativeWindow, cnt: c_int) -> c_int;
    fn HWCNativeBufferGetFence(buf: *mut ANativeWindowBuffer) -> c_int;
    fn HWCNativeBufferSetFence(buf: *mut ANativeWindowBuffer, fd: c_int);
}

unsafe extern "C" fn present_buffer(
    user_data: *mut c_void,
    _window: *mut ANativeWindow,
    buffer: *mut ANativeWindowBuffer,
) {
    let surface = &mut *(user_data as *mut PresentationSurface);
    let acquire_fence = Fence::from_raw_fd(HWCNativeBufferGetFence(buffer));
    let outcome = surface.present(BufferHandle::from_ptr(buffer as *const c_void), acquire_fence);
    let fd = outcome.into_release_fence().map_or(-1, Fence::into_raw_fd);
    HWCNativeBufferSetFence(buffer, fd);
}

/// EGL native window presenting through a [`PresentationSurface`]
pub struct NativeWindow {
    window: NonNull<ANativeWindow>,
    surface: NonNull<PresentationSurface>,
}

impl NativeWindow {
    pub fn new(surface: PresentationSurface) -> Result<Self, OpenError> {
        let size = surface.size();
        let surface = NonNull::from(Box::leak(Box::new(surface)));
        let window = unsafe {
            HWCNativeWindowCreate(
                size.w as c_uint,
                size.h as c_uint,
                HAL_PIXEL_FORMAT_RGBA_8888,
                Some(present_buffer),
                surface.as_ptr() as *mut c_void,
            )
        };
        let Some(window) = NonNull::new(window) else {
            drop(unsafe { Box::from_raw(surface.as_ptr()) });
            return Err(OpenError::Device {
                device: "native window",
                code: -libc::ENOMEM,
            });
        };

        let status = unsafe { HWCNativeWindowSetBufferCount(window.as_ptr(), BUFFER_COUNT as c_int) };
        if status != 0 {
            tracing::warn!(status, count = BUFFER_COUNT, "failed to set buffer count");
        }
        Ok(Self { window, surface })
    }

    /// For `eglCreateWindowSurface`
    pub fn as_ptr(&self) -> *mut c_void {
        self.window.as_ptr() as *mut c_void
    }

    pub fn surface(&self) -> &PresentationSurface {
        unsafe { self.surface.as_ref() }
    }
}

impl Drop for NativeWindow {
    fn drop(&mut self) {
        unsafe {
            HWCNativeWindowDestroy(self.window.as_ptr());
            drop(Box::from_raw(self.surface.as_ptr()));
        }
    }
}

//! Vsync wait/wake engine
//!
//! The composer delivers vsync on a thread of its own. [`VsyncSignal`] is the
//! only state shared with that thread: a mutex and condition variable the
//! render thread blocks on, plus a channel that carries the "frame completed"
//! notification back onto the event loop. [`VsyncControl`] owns the HAL side
//! of enabling and disabling the event.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use calloop::channel::Sender;
use smithay::utils::{Clock, Monotonic};

use crate::backend::BackendMessage;
use crate::hal::{DisplayHal, DisplayId, HalCallbacks, PRIMARY_DISPLAY};

/// Interval used until the output reports a refresh rate
pub const DEFAULT_VSYNC_INTERVAL: Duration = Duration::from_millis(16);

/// Vsync interval for a refresh rate in millihertz
pub fn interval_for_refresh(refresh_mhz: u32) -> Duration {
    if refresh_mhz == 0 {
        return DEFAULT_VSYNC_INTERVAL;
    }
    Duration::from_micros(1_000_000_000 / u64::from(refresh_mhz))
}

/// State guarded by the vsync mutex
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VsyncState {
    pub enabled: bool,
    pub interval: Duration,
    /// Bumped on every delivered vsync
    pub sequence: u64,
}

struct Shared {
    state: Mutex<VsyncState>,
    condvar: Condvar,
    /// A completion notification is queued and not yet handled
    scheduled: AtomicBool,
    sender: Mutex<Sender<BackendMessage>>,
    clock: Clock<Monotonic>,
}

/// Cross-thread vsync signal
///
/// Registered as the HAL's callback sink. Callback threads only touch the
/// condition variable and the message channel.
#[derive(Clone)]
pub struct VsyncSignal {
    shared: Arc<Shared>,
}

impl VsyncSignal {
    pub fn new(sender: Sender<BackendMessage>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(VsyncState {
                    enabled: false,
                    interval: DEFAULT_VSYNC_INTERVAL,
                    sequence: 0,
                }),
                condvar: Condvar::new(),
                scheduled: AtomicBool::new(false),
                sender: Mutex::new(sender),
                clock: Clock::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, VsyncState> {
        self.shared.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> VsyncState {
        *self.state()
    }

    pub fn is_enabled(&self) -> bool {
        self.state().enabled
    }

    pub fn interval(&self) -> Duration {
        self.state().interval
    }

    pub fn set_interval(&self, interval: Duration) {
        self.state().interval = interval;
    }

    fn set_enabled_flag(&self, enabled: bool) {
        self.state().enabled = enabled;
    }

    /// Block until the next vsync, for at most one interval
    ///
    /// Returns immediately when vsync is disabled. Returns whether a vsync
    /// arrived before the timeout.
    pub fn wait(&self) -> bool {
        let state = self.state();
        if !state.enabled {
            return false;
        }
        let start = state.sequence;
        let interval = state.interval;
        let (state, _) = self
            .shared
            .condvar
            .wait_timeout_while(state, interval, |s| s.enabled && s.sequence == start)
            .unwrap_or_else(|e| e.into_inner());
        state.sequence != start
    }

    /// Deliver a vsync that happened at `timestamp`
    ///
    /// Queues at most one completion notification until the event loop has
    /// handled it, then releases every waiter.
    pub fn wake(&self, timestamp: Duration) {
        if !self.shared.scheduled.swap(true, Ordering::AcqRel) {
            let sender = self.shared.sender.lock().unwrap_or_else(|e| e.into_inner());
            if sender.send(BackendMessage::Vsync { timestamp }).is_err() {
                // Event loop is gone; nothing will ever clear the flag
                tracing::debug!("vsync after event loop shutdown");
            }
        }

        let mut state = self.state();
        state.sequence = state.sequence.wrapping_add(1);
        drop(state);
        self.shared.condvar.notify_all();
    }

    /// The queued completion notification was handled
    pub fn complete(&self) {
        self.shared.scheduled.store(false, Ordering::Release);
    }

    /// Whether a completion notification is queued
    pub fn is_scheduled(&self) -> bool {
        self.shared.scheduled.load(Ordering::Acquire)
    }

    fn post(&self, message: BackendMessage) {
        let sender = self.shared.sender.lock().unwrap_or_else(|e| e.into_inner());
        if sender.send(message).is_err() {
            tracing::debug!("dropping backend message after event loop shutdown");
        }
    }

    fn now(&self) -> Duration {
        self.shared.clock.now().into()
    }
}

impl HalCallbacks for VsyncSignal {
    fn vsync(&self, display: DisplayId, timestamp_ns: i64) {
        if display != PRIMARY_DISPLAY {
            return;
        }
        let timestamp = match u64::try_from(timestamp_ns) {
            Ok(ns) if ns > 0 => Duration::from_nanos(ns),
            _ => self.now(),
        };
        self.wake(timestamp);
    }

    fn refresh(&self, id: DisplayId) {
        tracing::debug!(display = id, "composer requested refresh");
        self.post(BackendMessage::Refresh);
    }
}

impl std::fmt::Debug for VsyncSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VsyncSignal")
            .field("state", &self.snapshot())
            .field("scheduled", &self.is_scheduled())
            .finish()
    }
}

/// HAL-side vsync switch shared by the backend and the presentation surface
#[derive(Clone)]
pub struct VsyncControl {
    hal: Arc<dyn DisplayHal>,
    signal: VsyncSignal,
}

impl VsyncControl {
    pub fn new(hal: Arc<dyn DisplayHal>, signal: VsyncSignal) -> Self {
        Self { hal, signal }
    }

    pub fn signal(&self) -> &VsyncSignal {
        &self.signal
    }

    pub fn is_enabled(&self) -> bool {
        self.signal.is_enabled()
    }

    /// Turn vsync events on or off
    ///
    /// Repeating the current state does not reach the HAL. A failed HAL call
    /// leaves vsync marked disabled.
    pub fn set_enabled(&self, enabled: bool) {
        if self.signal.is_enabled() == enabled {
            return;
        }
        // The lock is not held across the HAL call; some HALs deliver the
        // first vsync from inside it
        let result = self.hal.set_vsync_enabled(enabled);
        if let Err(e) = result {
            tracing::warn!(enabled, error = %e, "failed to switch vsync");
        } else {
            tracing::debug!(enabled, "vsync switched");
        }
        self.signal.set_enabled_flag(enabled && result.is_ok());
    }

    /// See [`VsyncSignal::wait`]
    pub fn wait(&self) -> bool {
        self.signal.wait()
    }
}

impl std::fmt::Debug for VsyncControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VsyncControl")
            .field("signal", &self.signal)
            .finish()
    }
}

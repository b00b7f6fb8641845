//! Presentation surface
//!
//! Drives one frame through the composer:
//!
//! 1. wait for vsync (bounded by one interval)
//! 2. optionally wait on the buffer's acquire fence
//! 3. power the display on
//! 4. validate; any required change drops the frame
//! 5. accept changes
//! 6. hand over the client target
//! 7. present
//! 8. wait on and close the previous present fence, keep the new one
//! 9. enable vsync
//!
//! At most one present fence is held between frames, so the producer is
//! never more than one frame ahead of the display.

use std::sync::Arc;

use smithay::utils::{Physical, Size};

use crate::fence::Fence;
use crate::hal::{
    BufferHandle, ClientLayer, Dataspace, DisplayHal, HalError, LayerId, LayerTransform, PowerMode,
};
use crate::vsync::VsyncControl;

/// Buffers in the native window's swap chain
pub const BUFFER_COUNT: usize = 3;

/// Why a frame was not shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Validate(HalError),
    AcceptChanges(HalError),
    SetClientTarget(HalError),
    Present(HalError),
}

/// Terminal state of a frame
#[derive(Debug)]
pub enum FrameOutcome {
    /// The frame was committed; the fence signals once it is on screen
    Presented { release_fence: Option<Fence> },
    Dropped(DropReason),
}

impl FrameOutcome {
    pub fn is_presented(&self) -> bool {
        matches!(self, FrameOutcome::Presented { .. })
    }

    /// Fence to attach to the buffer, `None` for "no fence"
    pub fn into_release_fence(self) -> Option<Fence> {
        match self {
            FrameOutcome::Presented { release_fence } => release_fence,
            FrameOutcome::Dropped(_) => None,
        }
    }
}

/// Submission policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentPolicy {
    /// Wait on the acquire fence before handing the buffer over
    pub sync_before_set: bool,
}

impl Default for PresentPolicy {
    fn default() -> Self {
        Self {
            sync_before_set: true,
        }
    }
}

/// Per-display frame submission state
pub struct PresentationSurface {
    hal: Arc<dyn DisplayHal>,
    vsync: VsyncControl,
    layer: LayerId,
    size: Size<i32, Physical>,
    policy: PresentPolicy,
    last_present_fence: Option<Fence>,
    frames_presented: u64,
    frames_dropped: u64,
}

impl PresentationSurface {
    /// Create the client layer covering `size`
    pub fn new(
        hal: Arc<dyn DisplayHal>,
        vsync: VsyncControl,
        size: Size<i32, Physical>,
        transform: LayerTransform,
        policy: PresentPolicy,
    ) -> Result<Self, HalError> {
        let layer = hal.create_client_layer(ClientLayer::fullscreen(size, transform))?;
        tracing::debug!(?layer, ?size, ?transform, "created client layer");
        Ok(Self {
            hal,
            vsync,
            layer,
            size,
            policy,
            last_present_fence: None,
            frames_presented: 0,
            frames_dropped: 0,
        })
    }

    pub fn size(&self) -> Size<i32, Physical> {
        self.size
    }

    pub fn layer(&self) -> LayerId {
        self.layer
    }

    pub fn buffer_count(&self) -> usize {
        BUFFER_COUNT
    }

    /// Present fence of the last committed frame, still held for the next retire wait
    pub fn last_present_fence(&self) -> Option<&Fence> {
        self.last_present_fence.as_ref()
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    /// Show `buffer` once `acquire_fence` signals
    ///
    /// A dropped frame leaves the surface ready for the next call.
    pub fn present(&mut self, buffer: BufferHandle, acquire_fence: Option<Fence>) -> FrameOutcome {
        self.vsync.wait();

        let outcome = self.submit(buffer, acquire_fence);
        match &outcome {
            Ok(_) => self.frames_presented += 1,
            Err(reason) => {
                self.frames_dropped += 1;
                tracing::warn!(?reason, ?buffer, "dropped frame");
            }
        }

        match outcome {
            Ok(release_fence) => {
                // Only now is the display known to be on
                self.vsync.set_enabled(true);
                FrameOutcome::Presented { release_fence }
            }
            Err(reason) => FrameOutcome::Dropped(reason),
        }
    }

    fn submit(
        &mut self,
        buffer: BufferHandle,
        acquire_fence: Option<Fence>,
    ) -> Result<Option<Fence>, DropReason> {
        let acquire_fence = match acquire_fence {
            Some(fence) if self.policy.sync_before_set => {
                if let Err(e) = fence.wait() {
                    tracing::warn!(error = %e, "acquire fence wait failed");
                }
                // Closed here; the composer gets no fence
                None
            }
            fence => fence,
        };

        if let Err(e) = self.hal.set_power_mode(PowerMode::On) {
            tracing::debug!(error = %e, "power on before present failed");
        }

        let validation = self.hal.validate().map_err(DropReason::Validate)?;
        if validation.changes_required() {
            return Err(DropReason::Validate(HalError::ValidateRequiresChanges {
                types: validation.types,
                requests: validation.requests,
            }));
        }

        self.hal.accept_changes().map_err(DropReason::AcceptChanges)?;

        self.hal
            .set_client_target(buffer, acquire_fence, Dataspace::Unknown)
            .map_err(DropReason::SetClientTarget)?;

        let present_fence = self.hal.present().map_err(DropReason::Present)?;

        self.retire_previous();

        self.last_present_fence = match &present_fence {
            Some(fence) => match fence.try_clone() {
                Ok(copy) => Some(copy),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to duplicate present fence");
                    None
                }
            },
            None => None,
        };

        tracing::trace!(?buffer, fenced = present_fence.is_some(), "frame presented");
        Ok(present_fence)
    }

    /// Wait on and close the previous frame's present fence
    fn retire_previous(&mut self) {
        if let Some(fence) = self.last_present_fence.take() {
            if let Err(e) = fence.wait() {
                tracing::warn!(error = %e, "present fence wait failed");
            }
        }
    }
}

impl Drop for PresentationSurface {
    fn drop(&mut self) {
        // The held fence closes with the surface
        tracing::debug!(
            presented = self.frames_presented,
            dropped = self.frames_dropped,
            "presentation surface destroyed"
        );
    }
}

impl std::fmt::Debug for PresentationSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresentationSurface")
            .field("layer", &self.layer)
            .field("size", &self.size)
            .field("policy", &self.policy)
            .field("last_present_fence", &self.last_present_fence)
            .finish()
    }
}

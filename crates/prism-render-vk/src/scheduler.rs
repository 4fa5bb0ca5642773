// SPDX-License-Identifier: CEPL-1.0
//! The steady-state frame loop.
//!
//! Each frame uses slot f = frame_counter mod N, in this order:
//! 1) wait on f's in-flight fence (the only blocking wait)
//! 2) acquire an image, signaling f's image-available semaphore
//! 3) reset f's fence, then re-record f's command buffer for that image
//! 4) submit: wait image-available at COLOR_ATTACHMENT_OUTPUT, signal
//!    render-finished + f's fence
//! 5) present, waiting on render-finished
//! 6) advance frame_counter
//!
//! The fence is only reset once an image was actually acquired. Resetting it
//! before a failed acquire would leave it unsignaled with nothing queued to
//! signal it, and the next wait on that slot would never return.
use crate::error::Result;
use prism_render::{FrameOutcome, RenderSize, Renderer};
use tracing::{debug, trace};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired { image_index: u32, suboptimal: bool },
    /// The swapchain no longer matches the surface; nothing was acquired.
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameState {
    #[default]
    Idle,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
}

/// GPU-facing half of the frame loop. Slots are frame-in-flight indices in
/// `0..frames_in_flight()`.
pub trait FrameBackend {
    fn frames_in_flight(&self) -> usize;
    fn wait_for_slot(&mut self, slot: usize) -> Result<()>;
    fn reset_slot(&mut self, slot: usize) -> Result<()>;
    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome>;
    fn record(&mut self, slot: usize, image_index: u32) -> Result<()>;
    fn submit(&mut self, slot: usize) -> Result<()>;
    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome>;
    /// Rebuild everything that depends on the swapchain.
    fn recreate_swapchain(&mut self, size: RenderSize) -> Result<()>;
    fn wait_idle(&mut self) -> Result<()>;
}

pub struct FrameScheduler<B: FrameBackend> {
    backend: B,
    frame_counter: u64,
    slots: Vec<FrameState>,
    resize_pending: bool,
}

impl<B: FrameBackend> FrameScheduler<B> {
    pub fn new(backend: B) -> Self {
        let slots = vec![FrameState::Idle; backend.frames_in_flight().max(1)];
        Self {
            backend,
            frame_counter: 0,
            slots,
            resize_pending: false,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    pub fn current_slot(&self) -> usize {
        (self.frame_counter % self.slots.len() as u64) as usize
    }

    pub fn slot_state(&self, slot: usize) -> FrameState {
        self.slots[slot]
    }

    /// Mark the swapchain stale; it is rebuilt after the next present.
    pub fn notify_resized(&mut self) {
        self.resize_pending = true;
    }

    fn enter(&mut self, slot: usize, state: FrameState) {
        trace!("frame slot {}: {:?} -> {:?}", slot, self.slots[slot], state);
        self.slots[slot] = state;
    }

    fn recreate(&mut self, size: RenderSize) -> Result<()> {
        self.resize_pending = false;
        if size.is_empty() {
            // Minimized; try again once the window has an area.
            self.resize_pending = true;
            return Ok(());
        }
        debug!("recreating swapchain for {}x{}", size.width, size.height);
        self.backend.recreate_swapchain(size)
    }

    pub fn draw_frame(&mut self, size: RenderSize) -> Result<FrameOutcome> {
        if size.is_empty() {
            return Ok(FrameOutcome::Skipped);
        }

        let slot = self.current_slot();

        self.enter(slot, FrameState::Acquiring);
        self.backend.wait_for_slot(slot)?;
        let image_index = match self.backend.acquire_image(slot)? {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => {
                self.resize_pending |= suboptimal;
                image_index
            }
            AcquireOutcome::OutOfDate => {
                self.enter(slot, FrameState::Idle);
                self.recreate(size)?;
                return Ok(FrameOutcome::Skipped);
            }
        };
        self.backend.reset_slot(slot)?;

        self.enter(slot, FrameState::Recording);
        self.backend.record(slot, image_index)?;

        self.backend.submit(slot)?;
        self.enter(slot, FrameState::Submitted);

        self.enter(slot, FrameState::Presenting);
        let presented = self.backend.present(slot, image_index)?;
        self.enter(slot, FrameState::Idle);

        self.frame_counter = self.frame_counter.wrapping_add(1);

        if presented != PresentOutcome::Presented || self.resize_pending {
            self.recreate(size)?;
        }
        Ok(FrameOutcome::Presented)
    }
}

impl<B: FrameBackend> Renderer for FrameScheduler<B> {
    fn render(&mut self, size: RenderSize) -> anyhow::Result<FrameOutcome> {
        Ok(self.draw_frame(size)?)
    }

    fn resize(&mut self, _size: RenderSize) {
        self.notify_resized();
    }

    fn wait_idle(&mut self) -> anyhow::Result<()> {
        Ok(self.backend.wait_idle()?)
    }
}

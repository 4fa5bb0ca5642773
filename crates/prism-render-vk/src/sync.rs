// SPDX-License-Identifier: CEPL-1.0
//! Per-frame-in-flight synchronization objects and command buffers.
use crate::error::{InitStage, RenderError, Result};
use crate::handles::{Device, Owned};
use ash::vk;
use std::sync::Arc;

/// A semaphore the GPU waits on, paired with the stage that waits.
#[derive(Clone, Copy, Debug)]
pub struct SubmitWaitSet {
    pub semaphore: vk::Semaphore,
    pub stage_mask: vk::PipelineStageFlags,
}

/// What a submission signals once it completes.
#[derive(Clone, Copy, Debug)]
pub struct SubmitSignalSet {
    pub semaphore: vk::Semaphore,
    pub fence: vk::Fence,
}

pub struct FrameSync {
    pub image_available: Owned<vk::Semaphore>,
    pub render_finished: Owned<vk::Semaphore>,
    pub in_flight: Owned<vk::Fence>,
}

impl FrameSync {
    /// The fence starts signaled so the first wait on each slot returns at once.
    ///
    /// # Safety
    /// `device` must be a live logical device.
    pub unsafe fn new(device: &Arc<Device>) -> Result<Self> {
        let sem_info = vk::SemaphoreCreateInfo::default();
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
        let image_available = device
            .create_semaphore(&sem_info, None)
            .map_err(RenderError::init(InitStage::SyncObjects))?;
        let image_available = Owned::new(device, image_available);
        let render_finished = device
            .create_semaphore(&sem_info, None)
            .map_err(RenderError::init(InitStage::SyncObjects))?;
        let render_finished = Owned::new(device, render_finished);
        let in_flight = device
            .create_fence(&fence_info, None)
            .map_err(RenderError::init(InitStage::SyncObjects))?;

        Ok(Self {
            image_available,
            render_finished,
            in_flight: Owned::new(device, in_flight),
        })
    }

    /// Wait on image-available where the first color write happens.
    pub fn acquire_wait(&self) -> SubmitWaitSet {
        SubmitWaitSet {
            semaphore: self.image_available.raw(),
            stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        }
    }

    pub fn submit_signal(&self) -> SubmitSignalSet {
        SubmitSignalSet {
            semaphore: self.render_finished.raw(),
            fence: self.in_flight.raw(),
        }
    }
}

/// # Safety
/// `device` must be a live logical device.
pub unsafe fn create_frame_syncs(
    device: &Arc<Device>,
    frames_in_flight: usize,
) -> Result<Vec<FrameSync>> {
    (0..frames_in_flight).map(|_| FrameSync::new(device)).collect()
}

/// Buffers are freed together with the pool.
pub struct CommandResources {
    pub buffers: Vec<vk::CommandBuffer>,
    pub pool: Owned<vk::CommandPool>,
}

impl CommandResources {
    /// # Safety
    /// `queue_family` must be a valid graphics family of `device`.
    pub unsafe fn new(device: &Arc<Device>, queue_family: u32, count: usize) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family);
        let pool = device
            .create_command_pool(&pool_info, None)
            .map_err(RenderError::init(InitStage::CommandPool))?;
        let pool = Owned::new(device, pool);

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool.raw())
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count as u32);
        let buffers = device
            .allocate_command_buffers(&alloc_info)
            .map_err(RenderError::init(InitStage::CommandBuffers))?;

        Ok(Self { buffers, pool })
    }
}

/// # Safety
/// The command buffer and every handle in the sets must belong to `device`.
pub unsafe fn submit_frame(
    device: &ash::Device,
    queue: vk::Queue,
    cmd: vk::CommandBuffer,
    wait: SubmitWaitSet,
    signal: SubmitSignalSet,
) -> Result<()> {
    let wait_semaphores = [wait.semaphore];
    let wait_stages = [wait.stage_mask];
    let command_buffers = [cmd];
    let signal_semaphores = [signal.semaphore];
    let submit = vk::SubmitInfo::default()
        .wait_semaphores(&wait_semaphores)
        .wait_dst_stage_mask(&wait_stages)
        .command_buffers(&command_buffers)
        .signal_semaphores(&signal_semaphores);
    device
        .queue_submit(queue, std::slice::from_ref(&submit), signal.fence)
        .map_err(RenderError::Submit)
}

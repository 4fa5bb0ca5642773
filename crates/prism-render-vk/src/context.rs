// SPDX-License-Identifier: CEPL-1.0
//! Owns every Vulkan object of the renderer and drives them for the
//! [`FrameScheduler`].
use crate::device::{create_logical_device, select_device, Queues};
use crate::error::{RenderError, Result};
use crate::handles::{Device, Instance, Owned, Surface};
use crate::instance::{
    create_instance, create_surface, load_entry, DebugMessenger, ValidationSupport,
};
use crate::pipeline::{build_pipeline, load_shader, PipelineState};
use crate::recorder::{record_frame, FrameTarget};
use crate::scheduler::{AcquireOutcome, FrameBackend, FrameScheduler, PresentOutcome};
use crate::settings::{RenderSettings, VkPolygonMode};
use crate::swapchain::{create_framebuffers, create_swapchain, SwapchainState};
use crate::sync::{create_frame_syncs, submit_frame, CommandResources, FrameSync};
use ash::vk;
use prism_render::RenderSize;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;
use tracing::{debug, info};

/// Fields are released top to bottom, children before the objects they were
/// created from.
pub struct RenderContext {
    frames: Vec<FrameSync>,
    commands: CommandResources,
    framebuffers: Vec<Owned<vk::Framebuffer>>,
    pipeline: PipelineState,
    swapchain: SwapchainState,
    queues: Queues,
    device: Arc<Device>,
    surface: Surface,
    _debug: Option<DebugMessenger>,
    instance: Arc<Instance>,

    physical: vk::PhysicalDevice,
    device_name: String,
    polygon_mode: vk::PolygonMode,
    settings: RenderSettings,
}

impl RenderContext {
    /// Bring up the whole renderer for `window`.
    ///
    /// # Safety
    /// The window and display behind the handles must outlive the context.
    pub unsafe fn new(
        display: &dyn HasDisplayHandle,
        window: &dyn HasWindowHandle,
        size: RenderSize,
        settings: RenderSettings,
    ) -> Result<Self> {
        let raw_display = display.display_handle()?.as_raw();
        let raw_window = window.window_handle()?.as_raw();

        let entry = load_entry()?;
        let validation = ValidationSupport::detect(&entry, settings.validation);
        let instance =
            create_instance(entry, raw_display, &settings.app_name, validation.as_ref())?;
        let debug = match &validation {
            Some(v) => Some(DebugMessenger::create(&instance, v)?),
            None => None,
        };
        let surface = create_surface(&instance, raw_display, raw_window)?;

        let selected = select_device(&instance, &surface)?;
        let want_wireframe = settings.polygon_mode != VkPolygonMode::Fill;
        let logical = create_logical_device(&instance, &selected, want_wireframe)?;
        let device = logical.device;
        let queues = logical.queues;
        let polygon_mode = if logical.wireframe {
            settings.polygon_mode.to_vk()
        } else {
            vk::PolygonMode::FILL
        };

        let physical = selected.candidate.handle;
        let swapchain = create_swapchain(
            &instance,
            &device,
            &surface,
            physical,
            queues.families,
            size,
            vk::SwapchainKHR::null(),
        )?;

        let vertex = load_shader(&settings.vertex_shader)?;
        let fragment = load_shader(&settings.fragment_shader)?;
        let pipeline = build_pipeline(&device, swapchain.format, &vertex, &fragment, polygon_mode)?;
        let framebuffers = create_framebuffers(&device, pipeline.render_pass.raw(), &swapchain)?;

        let frames_in_flight = settings.frames_in_flight();
        let commands = CommandResources::new(&device, queues.families.graphics, frames_in_flight)?;
        let frames = create_frame_syncs(&device, frames_in_flight)?;

        info!(
            "renderer ready on {} ({} frames in flight)",
            selected.candidate.name, frames_in_flight
        );

        Ok(Self {
            frames,
            commands,
            framebuffers,
            pipeline,
            swapchain,
            queues,
            device,
            surface,
            _debug: debug,
            instance,
            physical,
            device_name: selected.candidate.name,
            polygon_mode,
            settings,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    fn rebuild(&mut self, size: RenderSize) -> Result<()> {
        unsafe {
            self.device.device_wait_idle().map_err(RenderError::Wait)?;

            // Framebuffers reference the old image views.
            self.framebuffers.clear();
            let swapchain = create_swapchain(
                &self.instance,
                &self.device,
                &self.surface,
                self.physical,
                self.queues.families,
                size,
                self.swapchain.raw(),
            )?;
            self.swapchain = swapchain;

            if self.swapchain.format != self.pipeline.color_format {
                info!(
                    "surface format changed {:?} -> {:?}, rebuilding pipeline",
                    self.pipeline.color_format, self.swapchain.format
                );
                let vertex = load_shader(&self.settings.vertex_shader)?;
                let fragment = load_shader(&self.settings.fragment_shader)?;
                self.pipeline = build_pipeline(
                    &self.device,
                    self.swapchain.format,
                    &vertex,
                    &fragment,
                    self.polygon_mode,
                )?;
            }

            self.framebuffers = create_framebuffers(
                &self.device,
                self.pipeline.render_pass.raw(),
                &self.swapchain,
            )?;
        }
        Ok(())
    }
}

impl FrameBackend for RenderContext {
    fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        let fence = self.frames[slot].in_flight.raw();
        unsafe { self.device.wait_for_fences(&[fence], true, u64::MAX) }.map_err(RenderError::Wait)
    }

    fn reset_slot(&mut self, slot: usize) -> Result<()> {
        let fence = self.frames[slot].in_flight.raw();
        unsafe { self.device.reset_fences(&[fence]) }.map_err(RenderError::Wait)
    }

    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome> {
        let semaphore = self.frames[slot].image_available.raw();
        let acquired = unsafe {
            self.swapchain.loader().acquire_next_image(
                self.swapchain.raw(),
                self.settings.acquire_timeout_ns(),
                semaphore,
                vk::Fence::null(),
            )
        };
        match acquired {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => Err(RenderError::AcquireTimeout),
            Err(e) => Err(RenderError::Acquire(e)),
        }
    }

    fn record(&mut self, slot: usize, image_index: u32) -> Result<()> {
        let target = FrameTarget {
            render_pass: self.pipeline.render_pass.raw(),
            framebuffer: self.framebuffers[image_index as usize].raw(),
            extent: self.swapchain.extent,
            pipeline: self.pipeline.pipeline.raw(),
            clear_color: self.settings.clear_color,
        };
        unsafe { record_frame(&self.device, self.commands.buffers[slot], &target) }
    }

    fn submit(&mut self, slot: usize) -> Result<()> {
        let frame = &self.frames[slot];
        unsafe {
            submit_frame(
                &self.device,
                self.queues.graphics,
                self.commands.buffers[slot],
                frame.acquire_wait(),
                frame.submit_signal(),
            )
        }
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome> {
        let wait = [self.frames[slot].render_finished.raw()];
        let swapchains = [self.swapchain.raw()];
        let indices = [image_index];
        let info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait)
            .swapchains(&swapchains)
            .image_indices(&indices);
        match unsafe { self.swapchain.loader().queue_present(self.queues.present, &info) } {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(RenderError::Presentation(e)),
        }
    }

    fn recreate_swapchain(&mut self, size: RenderSize) -> Result<()> {
        self.rebuild(size)?;
        let sc = &self.swapchain;
        debug!(
            "swapchain rebuilt at {}x{} ({:?}/{:?}, {:?})",
            sc.extent.width, sc.extent.height, sc.format, sc.color_space, sc.present_mode
        );
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.map_err(RenderError::Wait)
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        // Nothing below may be released while the GPU still uses it.
        unsafe {
            let _ = self.device.device_wait_idle();
        }
        debug!("render context released");
    }
}

/// The Vulkan renderer as the render loop sees it.
pub type VkRenderer = FrameScheduler<RenderContext>;

impl FrameScheduler<RenderContext> {
    /// # Safety
    /// See [`RenderContext::new`].
    pub unsafe fn create<W>(window: &W, size: RenderSize, settings: RenderSettings) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let context = RenderContext::new(window, window, size, settings)?;
        Ok(FrameScheduler::new(context))
    }
}

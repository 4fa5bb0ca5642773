// SPDX-License-Identifier: CEPL-1.0
//! Scoped owners for Vulkan handles.
//!
//! Every child keeps an `Arc` to the object it was created from, so parents
//! can only be destroyed after the last child is gone. Locals and struct
//! fields drop in reverse order of acquisition, which also covers the
//! half-built state when initialization bails out with `?`.
use ash::khr::{surface, swapchain};
use ash::{vk, Entry};
use std::ops::Deref;
use std::sync::Arc;
use tracing::debug;

pub struct Instance {
    entry: Entry,
    raw: ash::Instance,
}

impl Instance {
    /// # Safety
    /// `raw` must have been created from `entry` and must not be destroyed elsewhere.
    pub unsafe fn from_raw(entry: Entry, raw: ash::Instance) -> Arc<Self> {
        Arc::new(Self { entry, raw })
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }
}

impl Deref for Instance {
    type Target = ash::Instance;
    fn deref(&self) -> &ash::Instance {
        &self.raw
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe { self.raw.destroy_instance(None) };
        debug!("instance destroyed");
    }
}

pub struct Surface {
    loader: surface::Instance,
    raw: vk::SurfaceKHR,
    _instance: Arc<Instance>,
}

impl Surface {
    /// # Safety
    /// `raw` must belong to `instance` and must not be destroyed elsewhere.
    pub unsafe fn from_raw(instance: &Arc<Instance>, raw: vk::SurfaceKHR) -> Self {
        Self {
            loader: surface::Instance::new(instance.entry(), instance),
            raw,
            _instance: Arc::clone(instance),
        }
    }

    pub fn raw(&self) -> vk::SurfaceKHR {
        self.raw
    }

    pub fn loader(&self) -> &surface::Instance {
        &self.loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.raw, None) };
        debug!("surface destroyed");
    }
}

pub struct Device {
    raw: ash::Device,
    _instance: Arc<Instance>,
}

impl Device {
    /// # Safety
    /// `raw` must have been created from a physical device of `instance`.
    pub unsafe fn from_raw(instance: &Arc<Instance>, raw: ash::Device) -> Arc<Self> {
        Arc::new(Self {
            raw,
            _instance: Arc::clone(instance),
        })
    }
}

impl Deref for Device {
    type Target = ash::Device;
    fn deref(&self) -> &ash::Device {
        &self.raw
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            // Children hold an Arc to us, so nothing is left but queue work.
            let _ = self.raw.device_wait_idle();
            self.raw.destroy_device(None);
        }
        debug!("device destroyed");
    }
}

pub struct SwapchainHandle {
    loader: swapchain::Device,
    raw: vk::SwapchainKHR,
    _device: Arc<Device>,
}

impl SwapchainHandle {
    /// # Safety
    /// `raw` must have been created through `loader` on `device`.
    pub unsafe fn from_raw(
        device: &Arc<Device>,
        loader: swapchain::Device,
        raw: vk::SwapchainKHR,
    ) -> Self {
        Self {
            loader,
            raw,
            _device: Arc::clone(device),
        }
    }

    pub fn raw(&self) -> vk::SwapchainKHR {
        self.raw
    }

    pub fn loader(&self) -> &swapchain::Device {
        &self.loader
    }
}

impl Drop for SwapchainHandle {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_swapchain(self.raw, None) };
        debug!("swapchain destroyed");
    }
}

/// A handle released with a single `vkDestroy*` call on its device.
pub trait DeviceChild: Copy {
    /// # Safety
    /// The handle must belong to `device` and must not be in use by the GPU.
    unsafe fn destroy(self, device: &ash::Device);
}

macro_rules! device_child {
    ($($ty:ty => $destroy:ident),* $(,)?) => {
        $(
            impl DeviceChild for $ty {
                unsafe fn destroy(self, device: &ash::Device) {
                    device.$destroy(self, None);
                }
            }
        )*
    };
}

device_child! {
    vk::ImageView => destroy_image_view,
    vk::Framebuffer => destroy_framebuffer,
    vk::RenderPass => destroy_render_pass,
    vk::PipelineLayout => destroy_pipeline_layout,
    vk::Pipeline => destroy_pipeline,
    vk::ShaderModule => destroy_shader_module,
    vk::CommandPool => destroy_command_pool,
    vk::Semaphore => destroy_semaphore,
    vk::Fence => destroy_fence,
}

pub struct Owned<H: DeviceChild> {
    raw: H,
    device: Arc<Device>,
}

impl<H: DeviceChild> Owned<H> {
    /// # Safety
    /// `raw` must have been created from `device` and must not be owned elsewhere.
    pub unsafe fn new(device: &Arc<Device>, raw: H) -> Self {
        Self {
            raw,
            device: Arc::clone(device),
        }
    }

    pub fn raw(&self) -> H {
        self.raw
    }
}

impl<H: DeviceChild> Drop for Owned<H> {
    fn drop(&mut self) {
        unsafe { self.raw.destroy(&self.device) };
    }
}

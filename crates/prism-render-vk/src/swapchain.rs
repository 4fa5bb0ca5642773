// SPDX-License-Identifier: CEPL-1.0
//! Swapchain negotiation: format, present mode, extent and image count, plus
//! the image views and framebuffers that depend on the chosen swapchain.
use crate::device::QueueFamilies;
use crate::error::{InitStage, RenderError, Result};
use crate::handles::{Device, Instance, Owned, Surface, SwapchainHandle};
use ash::khr::swapchain;
use ash::prelude::VkResult;
use ash::vk;
use prism_render::RenderSize;
use std::sync::Arc;
use tracing::info;

#[derive(Clone, Debug)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// # Safety
    /// `phys` must belong to the instance that owns `surface`.
    pub unsafe fn query(surface: &Surface, phys: vk::PhysicalDevice) -> VkResult<Self> {
        let loader = surface.loader();
        Ok(Self {
            capabilities: loader.get_physical_device_surface_capabilities(phys, surface.raw())?,
            formats: loader.get_physical_device_surface_formats(phys, surface.raw())?,
            present_modes: loader.get_physical_device_surface_present_modes(phys, surface.raw())?,
        })
    }

    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// BGRA8 sRGB when offered, otherwise whatever the driver lists first.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
}

/// Mailbox when available; FIFO is always supported.
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, framebuffer: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    let (min, max) = (caps.min_image_extent, caps.max_image_extent);
    vk::Extent2D {
        width: framebuffer.width.max(min.width).min(max.width),
        height: framebuffer.height.max(min.height).min(max.height),
    }
}

/// One more than the minimum; a maximum of 0 means unbounded.
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        wanted.min(caps.max_image_count)
    } else {
        wanted
    }
}

/// Everything decided before the swapchain is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainPlan {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub sharing_mode: vk::SharingMode,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainPlan {
    pub fn negotiate(
        support: &SwapchainSupportDetails,
        families: QueueFamilies,
        framebuffer: RenderSize,
    ) -> Option<Self> {
        let caps = &support.capabilities;
        Some(Self {
            format: choose_surface_format(&support.formats)?,
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(caps, framebuffer),
            image_count: choose_image_count(caps),
            sharing_mode: if families.is_shared() {
                vk::SharingMode::EXCLUSIVE
            } else {
                vk::SharingMode::CONCURRENT
            },
            pre_transform: caps.current_transform,
        })
    }
}

/// Views are declared first so they are released before the swapchain.
pub struct SwapchainState {
    pub image_views: Vec<Owned<vk::ImageView>>,
    /// Owned by the presentation engine; never destroyed here.
    pub images: Vec<vk::Image>,
    pub handle: SwapchainHandle,
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
}

impl SwapchainState {
    pub fn raw(&self) -> vk::SwapchainKHR {
        self.handle.raw()
    }

    pub fn loader(&self) -> &swapchain::Device {
        self.handle.loader()
    }
}

/// Pass the current swapchain as `old` when rebuilding; it is retired but
/// still has to be dropped by the caller.
///
/// # Safety
/// `device` must have been created on `phys`, with `surface` from `instance`.
pub unsafe fn create_swapchain(
    instance: &Instance,
    device: &Arc<Device>,
    surface: &Surface,
    phys: vk::PhysicalDevice,
    families: QueueFamilies,
    framebuffer: RenderSize,
    old: vk::SwapchainKHR,
) -> Result<SwapchainState> {
    let support =
        SwapchainSupportDetails::query(surface, phys).map_err(RenderError::SwapchainCreation)?;
    let plan = SwapchainPlan::negotiate(&support, families, framebuffer)
        .ok_or(RenderError::SwapchainCreation(vk::Result::ERROR_FORMAT_NOT_SUPPORTED))?;

    let family_indices = families.unique();
    let mut create_info = vk::SwapchainCreateInfoKHR::default()
        .surface(surface.raw())
        .min_image_count(plan.image_count)
        .image_format(plan.format.format)
        .image_color_space(plan.format.color_space)
        .image_extent(plan.extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
        .image_sharing_mode(plan.sharing_mode)
        .pre_transform(plan.pre_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(plan.present_mode)
        .clipped(true)
        .old_swapchain(old);
    if plan.sharing_mode == vk::SharingMode::CONCURRENT {
        create_info = create_info.queue_family_indices(&family_indices);
    }

    let loader = swapchain::Device::new(instance, device);
    let raw = loader
        .create_swapchain(&create_info, None)
        .map_err(RenderError::SwapchainCreation)?;
    let handle = SwapchainHandle::from_raw(device, loader, raw);

    // The driver may hand out more images than requested.
    let images = handle
        .loader()
        .get_swapchain_images(raw)
        .map_err(RenderError::SwapchainCreation)?;

    let mut image_views = Vec::with_capacity(images.len());
    for &image in &images {
        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(plan.format.format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        let view = device
            .create_image_view(&view_info, None)
            .map_err(RenderError::ImageViewCreation)?;
        image_views.push(Owned::new(device, view));
    }

    info!(
        "swapchain ready: {}x{}, {:?}/{:?}, {:?}, {} images (asked {}), {:?}",
        plan.extent.width,
        plan.extent.height,
        plan.format.format,
        plan.format.color_space,
        plan.present_mode,
        images.len(),
        plan.image_count,
        plan.sharing_mode
    );

    Ok(SwapchainState {
        image_views,
        images,
        handle,
        format: plan.format.format,
        color_space: plan.format.color_space,
        present_mode: plan.present_mode,
        extent: plan.extent,
    })
}

/// One framebuffer per swapchain image view.
///
/// # Safety
/// `render_pass` must be compatible with the swapchain format.
pub unsafe fn create_framebuffers(
    device: &Arc<Device>,
    render_pass: vk::RenderPass,
    swapchain: &SwapchainState,
) -> Result<Vec<Owned<vk::Framebuffer>>> {
    let mut framebuffers = Vec::with_capacity(swapchain.image_views.len());
    for view in &swapchain.image_views {
        let attachments = [view.raw()];
        let info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&attachments)
            .width(swapchain.extent.width)
            .height(swapchain.extent.height)
            .layers(1);
        let fb = device
            .create_framebuffer(&info, None)
            .map_err(RenderError::init(InitStage::Framebuffer))?;
        framebuffers.push(Owned::new(device, fb));
    }
    Ok(framebuffers)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn fmt(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn caps(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        }
    }

    /// A typical fixed 512x512 surface.
    pub(crate) fn support_512() -> SwapchainSupportDetails {
        SwapchainSupportDetails {
            capabilities: caps((512, 512), (1, 1), (4096, 4096)),
            formats: vec![
                fmt(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
                fmt(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        }
    }

    #[test]
    fn prefers_bgra_srgb() {
        let formats = support_512().formats;
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(choose_surface_format(&formats), Some(chosen));
    }

    #[test]
    fn falls_back_to_first_format() {
        let formats = [
            fmt(vk::Format::A2B10G10R10_UNORM_PACK32, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            // right format, wrong color space
            fmt(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
        ];
        assert_eq!(
            choose_surface_format(&formats).map(|f| f.format),
            Some(vk::Format::A2B10G10R10_UNORM_PACK32)
        );
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let cases: &[&[vk::PresentModeKHR]] = &[
            &[],
            &[vk::PresentModeKHR::FIFO],
            &[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO],
            &[vk::PresentModeKHR::FIFO_RELAXED, vk::PresentModeKHR::IMMEDIATE],
        ];
        for modes in cases {
            assert_eq!(choose_present_mode(modes), vk::PresentModeKHR::FIFO);
        }
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
    }

    #[test]
    fn sentinel_extent_uses_framebuffer_size() {
        let c = caps((u32::MAX, u32::MAX), (1, 1), (4096, 4096));
        let e = choose_extent(&c, RenderSize::new(800, 600));
        assert_eq!((e.width, e.height), (800, 600));
    }

    #[test]
    fn sentinel_extent_is_clamped() {
        let c = caps((u32::MAX, u32::MAX), (64, 64), (1024, 1024));
        let e = choose_extent(&c, RenderSize::new(4000, 10));
        assert_eq!((e.width, e.height), (1024, 64));
    }

    #[test]
    fn fixed_extent_is_used_verbatim() {
        let c = caps((512, 512), (1, 1), (4096, 4096));
        for size in [RenderSize::new(800, 600), RenderSize::new(1, 1), RenderSize::new(0, 0)] {
            let e = choose_extent(&c, size);
            assert_eq!((e.width, e.height), (512, 512));
        }
    }

    #[test]
    fn image_count_is_min_plus_one_capped() {
        let mut c = caps((512, 512), (1, 1), (4096, 4096));
        c.min_image_count = 2;
        c.max_image_count = 0;
        assert_eq!(choose_image_count(&c), 3);
        c.max_image_count = 3;
        assert_eq!(choose_image_count(&c), 3);
        c.max_image_count = 2;
        assert_eq!(choose_image_count(&c), 2);
    }

    #[test]
    fn sharing_mode_follows_queue_families() {
        let support = support_512();
        let shared = QueueFamilies {
            graphics: 0,
            present: 0,
        };
        let split = QueueFamilies {
            graphics: 0,
            present: 1,
        };
        let size = RenderSize::new(512, 512);
        assert_eq!(
            SwapchainPlan::negotiate(&support, shared, size).unwrap().sharing_mode,
            vk::SharingMode::EXCLUSIVE
        );
        assert_eq!(
            SwapchainPlan::negotiate(&support, split, size).unwrap().sharing_mode,
            vk::SharingMode::CONCURRENT
        );
    }

    #[test]
    fn renegotiating_unchanged_surface_is_equivalent() {
        let support = support_512();
        let families = QueueFamilies {
            graphics: 0,
            present: 0,
        };
        let size = RenderSize::new(512, 512);
        let first = SwapchainPlan::negotiate(&support, families, size).unwrap();
        let second = SwapchainPlan::negotiate(&support, families, size).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.format.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(first.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!(first.image_count, 3);
    }

    #[test]
    fn adequacy_needs_formats_and_modes() {
        let mut support = support_512();
        assert!(support.is_adequate());
        support.present_modes.clear();
        assert!(!support.is_adequate());
    }
}

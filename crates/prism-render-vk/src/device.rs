// SPDX-License-Identifier: CEPL-1.0
//! Physical device selection and logical device creation.
use crate::error::{InitStage, RenderError, Result};
use crate::handles::{Device, Instance, Surface};
use crate::swapchain::SwapchainSupportDetails;
use ash::khr::swapchain;
use ash::vk;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyInfo {
    pub graphics: bool,
    pub present: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueFamilyIndices {
    Incomplete {
        graphics: Option<u32>,
        present: Option<u32>,
    },
    Complete(QueueFamilies),
}

impl QueueFamilyIndices {
    /// First family with graphics and first family that can present,
    /// looked up independently of each other.
    pub fn from_families(families: &[QueueFamilyInfo]) -> Self {
        let position = |pred: fn(&QueueFamilyInfo) -> bool| {
            families.iter().position(pred).map(|i| i as u32)
        };
        match (position(|f| f.graphics), position(|f| f.present)) {
            (Some(graphics), Some(present)) => {
                QueueFamilyIndices::Complete(QueueFamilies { graphics, present })
            }
            (graphics, present) => QueueFamilyIndices::Incomplete { graphics, present },
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, QueueFamilyIndices::Complete(_))
    }
}

#[derive(Clone, Debug)]
pub struct PhysicalDeviceCandidate {
    pub handle: vk::PhysicalDevice,
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub queue_families: Vec<QueueFamilyInfo>,
    pub has_swapchain_extension: bool,
    pub supports_wireframe: bool,
    pub support: SwapchainSupportDetails,
}

impl PhysicalDeviceCandidate {
    /// # Safety
    /// `handle` must come from `instance`, and `surface` must belong to it.
    pub unsafe fn query(
        instance: &Instance,
        surface: &Surface,
        handle: vk::PhysicalDevice,
    ) -> Result<Self> {
        let props = instance.get_physical_device_properties(handle);
        let name = props
            .device_name_as_c_str()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "<unnamed>".to_owned());

        let families = instance.get_physical_device_queue_family_properties(handle);
        let mut queue_families = Vec::with_capacity(families.len());
        for (i, family) in families.iter().enumerate() {
            let present = surface
                .loader()
                .get_physical_device_surface_support(handle, i as u32, surface.raw())
                .map_err(RenderError::init(InitStage::DeviceEnumeration))?;
            queue_families.push(QueueFamilyInfo {
                graphics: family.queue_flags.contains(vk::QueueFlags::GRAPHICS),
                present,
            });
        }

        let has_swapchain_extension = instance
            .enumerate_device_extension_properties(handle)
            .map_err(RenderError::init(InitStage::DeviceEnumeration))?
            .iter()
            .any(|e| e.extension_name_as_c_str().is_ok_and(|n| n == swapchain::NAME));

        let features = instance.get_physical_device_features(handle);
        let support = SwapchainSupportDetails::query(surface, handle)
            .map_err(RenderError::init(InitStage::DeviceEnumeration))?;

        Ok(Self {
            handle,
            name,
            device_type: props.device_type,
            queue_families,
            has_swapchain_extension,
            supports_wireframe: features.fill_mode_non_solid == vk::TRUE,
            support,
        })
    }

    pub fn queue_family_indices(&self) -> QueueFamilyIndices {
        QueueFamilyIndices::from_families(&self.queue_families)
    }

    /// Complete queue families if the device meets every requirement.
    pub fn suitable_queues(&self) -> Option<QueueFamilies> {
        if self.device_type != vk::PhysicalDeviceType::DISCRETE_GPU
            || !self.has_swapchain_extension
            || !self.support.is_adequate()
        {
            return None;
        }
        match self.queue_family_indices() {
            QueueFamilyIndices::Complete(queues) => Some(queues),
            QueueFamilyIndices::Incomplete { .. } => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SelectedDevice {
    pub candidate: PhysicalDeviceCandidate,
    pub queues: QueueFamilies,
}

/// First suitable device in enumeration order. Integrated GPUs are never
/// picked and several discrete GPUs are not ranked.
pub fn select_first_suitable(candidates: &[PhysicalDeviceCandidate]) -> Result<SelectedDevice> {
    candidates
        .iter()
        .find_map(|c| {
            c.suitable_queues().map(|queues| SelectedDevice {
                candidate: c.clone(),
                queues,
            })
        })
        .ok_or(RenderError::NoSuitableDevice)
}

/// Keeps the devices that could be queried, in enumeration order. A device
/// whose queries fail is treated as unsuitable.
pub fn usable_candidates<I>(queried: I) -> Vec<PhysicalDeviceCandidate>
where
    I: IntoIterator<Item = Result<PhysicalDeviceCandidate>>,
{
    let mut candidates = Vec::new();
    for (i, result) in queried.into_iter().enumerate() {
        match result {
            Ok(c) => {
                debug!(
                    "candidate {:?} ({:?}): queues {:?}, swapchain ext {}, {} formats, {} modes",
                    c.name,
                    c.device_type,
                    c.queue_family_indices(),
                    c.has_swapchain_extension,
                    c.support.formats.len(),
                    c.support.present_modes.len()
                );
                candidates.push(c);
            }
            Err(e) => warn!("skipping physical device {}: {}", i, e),
        }
    }
    candidates
}

/// # Safety
/// `surface` must belong to `instance`.
pub unsafe fn select_device(instance: &Instance, surface: &Surface) -> Result<SelectedDevice> {
    let handles = instance
        .enumerate_physical_devices()
        .map_err(RenderError::init(InitStage::DeviceEnumeration))?;

    let candidates = usable_candidates(
        handles
            .into_iter()
            .map(|handle| PhysicalDeviceCandidate::query(instance, surface, handle)),
    );

    let selected = select_first_suitable(&candidates)?;
    info!(
        "selected GPU: {} (graphics family {}, present family {})",
        selected.candidate.name, selected.queues.graphics, selected.queues.present
    );
    Ok(selected)
}

pub struct Queues {
    pub families: QueueFamilies,
    pub graphics: vk::Queue,
    pub present: vk::Queue,
}

pub struct LogicalDevice {
    pub device: Arc<Device>,
    pub queues: Queues,
    /// Whether `fillModeNonSolid` was enabled.
    pub wireframe: bool,
}

/// # Safety
/// `selected` must have been produced from `instance`.
pub unsafe fn create_logical_device(
    instance: &Arc<Instance>,
    selected: &SelectedDevice,
    want_wireframe: bool,
) -> Result<LogicalDevice> {
    let families = selected.queues;
    let priorities = [1.0_f32];
    let queue_infos: Vec<_> = families
        .unique()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(&priorities)
        })
        .collect();

    let wireframe = want_wireframe && selected.candidate.supports_wireframe;
    if want_wireframe && !wireframe {
        warn!("wireframe requested but fillModeNonSolid is unsupported; using fill");
    }
    let features = vk::PhysicalDeviceFeatures::default().fill_mode_non_solid(wireframe);

    let device_exts = [swapchain::NAME.as_ptr()];
    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_infos)
        .enabled_extension_names(&device_exts)
        .enabled_features(&features);

    let raw = instance
        .create_device(selected.candidate.handle, &create_info, None)
        .map_err(RenderError::init(InitStage::Device))?;
    let device = Device::from_raw(instance, raw);

    let queues = Queues {
        families,
        graphics: device.get_device_queue(families.graphics, 0),
        present: device.get_device_queue(families.present, 0),
    };
    Ok(LogicalDevice {
        device,
        queues,
        wireframe,
    })
}

// SPDX-License-Identifier: CEPL-1.0
use crate::error::{InitStage, RenderError, Result};
use crate::handles::{Instance, Surface};
use ash::ext::debug_utils;
use ash::{vk, Entry};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::{c_char, c_void, CStr, CString};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
const ENGINE_NAME: &CStr = c"prism";

/// Proof that the validation layer and the debug-utils extension are both
/// present. Only obtainable through [`ValidationSupport::detect`].
#[derive(Debug)]
pub struct ValidationSupport {
    _detected: (),
}

impl ValidationSupport {
    /// # Safety
    /// `entry` must be a loaded Vulkan entry point.
    pub unsafe fn detect(entry: &Entry, requested: bool) -> Option<Self> {
        if !requested {
            return None;
        }

        let has_layer = entry
            .enumerate_instance_layer_properties()
            .unwrap_or_default()
            .iter()
            .any(|l| l.layer_name_as_c_str().is_ok_and(|n| n == VALIDATION_LAYER));
        let has_debug_utils = entry
            .enumerate_instance_extension_properties(None)
            .unwrap_or_default()
            .iter()
            .any(|e| e.extension_name_as_c_str().is_ok_and(|n| n == debug_utils::NAME));

        if has_layer && has_debug_utils {
            Some(Self { _detected: () })
        } else {
            warn!(
                "validation unavailable (layer: {}, debug utils: {}); continuing without",
                has_layer, has_debug_utils
            );
            None
        }
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!("[vulkan {:?}] {}", types, msg);
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!("[vulkan {:?}] {}", types, msg);
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        debug!("[vulkan {:?}] {}", types, msg);
    } else {
        trace!("[vulkan {:?}] {}", types, msg);
    }
    vk::FALSE
}

fn messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
}

pub struct DebugMessenger {
    loader: debug_utils::Instance,
    raw: vk::DebugUtilsMessengerEXT,
    _instance: Arc<Instance>,
}

impl DebugMessenger {
    /// # Safety
    /// `instance` must have been created with the debug-utils extension enabled.
    pub unsafe fn create(instance: &Arc<Instance>, _support: &ValidationSupport) -> Result<Self> {
        let loader = debug_utils::Instance::new(instance.entry(), instance);
        let raw = loader
            .create_debug_utils_messenger(&messenger_create_info(), None)
            .map_err(RenderError::init(InitStage::DebugMessenger))?;
        Ok(Self {
            loader,
            raw,
            _instance: Arc::clone(instance),
        })
    }
}

impl Drop for DebugMessenger {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_debug_utils_messenger(self.raw, None) };
    }
}

pub fn load_entry() -> Result<Entry> {
    unsafe { Entry::load() }.map_err(|e| RenderError::Loader(e.to_string()))
}

/// # Safety
/// `display` must stay valid for the lifetime of the instance.
pub unsafe fn create_instance(
    entry: Entry,
    display: RawDisplayHandle,
    app_name: &str,
    validation: Option<&ValidationSupport>,
) -> Result<Arc<Instance>> {
    let app_name = CString::new(app_name).unwrap_or_default();
    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 1, 0, 0))
        .engine_name(ENGINE_NAME)
        .engine_version(vk::make_api_version(0, 1, 0, 0))
        .api_version(vk::API_VERSION_1_0);

    let mut extensions: Vec<*const c_char> = ash_window::enumerate_required_extensions(display)
        .map_err(RenderError::init(InitStage::Instance))?
        .to_vec();
    let mut layers: Vec<*const c_char> = Vec::new();
    if validation.is_some() {
        extensions.push(debug_utils::NAME.as_ptr());
        layers.push(VALIDATION_LAYER.as_ptr());
    }

    // Chained so instance creation and destruction are validated too.
    let mut debug_info = messenger_create_info();
    let mut create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layers);
    if validation.is_some() {
        create_info = create_info.push_next(&mut debug_info);
    }

    let raw = entry
        .create_instance(&create_info, None)
        .map_err(RenderError::init(InitStage::Instance))?;
    info!(
        "vulkan instance ready ({} extensions, validation {})",
        extensions.len(),
        if validation.is_some() { "on" } else { "off" }
    );
    Ok(Instance::from_raw(entry, raw))
}

/// # Safety
/// Both handles must outlive the returned surface.
pub unsafe fn create_surface(
    instance: &Arc<Instance>,
    display: RawDisplayHandle,
    window: RawWindowHandle,
) -> Result<Surface> {
    let raw = ash_window::create_surface(instance.entry(), instance, display, window, None)
        .map_err(RenderError::init(InitStage::Surface))?;
    Ok(Surface::from_raw(instance, raw))
}

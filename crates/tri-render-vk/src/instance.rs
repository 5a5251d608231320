// SPDX-License-Identifier: CEPL-1.0
//! Instance creation: window-system extensions, validation layers and the
//! debug messenger that forwards driver messages into `tracing`.

use std::ffi::{c_void, CStr};
use std::os::raw::c_char;

use ash::ext::debug_utils;
use ash::{vk, Entry, Instance};
use raw_window_handle::RawDisplayHandle;
use tracing::{debug, error, info, trace, warn};
use tri_core::{RenderError, RenderResult, Stage, StageExt};
use tri_render::ValidationPolicy;

pub const VALIDATION_LAYERS: &[&CStr] = &[c"VK_LAYER_KHRONOS_validation"];

const APP_NAME: &CStr = c"Basic Triangle";
const ENGINE_NAME: &CStr = c"tri";

/// Whether layers get enabled, given the policy and what the loader offers.
pub fn resolve_validation(policy: ValidationPolicy, available: bool) -> RenderResult<bool> {
    match (policy, available) {
        (ValidationPolicy::Off, _) => Ok(false),
        (_, true) => Ok(true),
        (ValidationPolicy::Strict, false) => Err(RenderError::new(
            Stage::Validation,
            "VK_LAYER_KHRONOS_validation is missing from the loader (policy: strict)",
        )),
        (ValidationPolicy::Permissive, false) => {
            warn!("validation layers not available, continuing without them");
            Ok(false)
        }
    }
}

fn layers_available(entry: &Entry) -> RenderResult<bool> {
    let props = unsafe { entry.enumerate_instance_layer_properties() }.stage(Stage::Validation)?;
    Ok(VALIDATION_LAYERS.iter().all(|want| {
        props
            .iter()
            .any(|p| p.layer_name_as_c_str().is_ok_and(|name| name == *want))
    }))
}

/// Window-system extensions plus debug utils when validating.
pub fn instance_extensions(
    window_system: &[*const c_char],
    validation: bool,
) -> Vec<*const c_char> {
    let mut exts = window_system.to_vec();
    if validation {
        exts.push(debug_utils::NAME.as_ptr());
    }
    exts
}

pub struct InstanceBundle {
    pub instance: Instance,
    pub debug: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

pub fn create_instance(
    entry: &Entry,
    display: RawDisplayHandle,
    policy: ValidationPolicy,
) -> RenderResult<InstanceBundle> {
    let available = policy != ValidationPolicy::Off && layers_available(entry)?;
    let validation = resolve_validation(policy, available)?;

    let window_exts =
        ash_window::enumerate_required_extensions(display).stage(Stage::Instance)?;
    let extensions = instance_extensions(window_exts, validation);
    let layers: Vec<*const c_char> = if validation {
        VALIDATION_LAYERS.iter().map(|l| l.as_ptr()).collect()
    } else {
        Vec::new()
    };

    let app_info = vk::ApplicationInfo::default()
        .application_name(APP_NAME)
        .application_version(vk::make_api_version(0, 1, 0, 0))
        .engine_name(ENGINE_NAME)
        .engine_version(vk::make_api_version(0, 1, 0, 0))
        .api_version(vk::API_VERSION_1_0);
    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layers);

    let instance = unsafe { entry.create_instance(&create_info, None) }.stage(Stage::Instance)?;
    info!(
        "instance ready ({} extension(s), validation {})",
        extensions.len(),
        if validation { "on" } else { "off" }
    );

    if !validation {
        return Ok(InstanceBundle {
            instance,
            debug: None,
        });
    }

    let loader = debug_utils::Instance::new(entry, &instance);
    match unsafe { loader.create_debug_utils_messenger(&messenger_info(), None) } {
        Ok(messenger) => Ok(InstanceBundle {
            instance,
            debug: Some((loader, messenger)),
        }),
        Err(e) => {
            unsafe { instance.destroy_instance(None) };
            Err(e).stage(Stage::DebugMessenger)
        }
    }
}

fn messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
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

/// Severity of a driver message as a tracing level.
pub fn severity_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> tracing::Level {
    use vk::DebugUtilsMessageSeverityFlagsEXT as S;
    if severity.contains(S::ERROR) {
        tracing::Level::ERROR
    } else if severity.contains(S::WARNING) {
        tracing::Level::WARN
    } else if severity.contains(S::INFO) {
        tracing::Level::DEBUG
    } else {
        tracing::Level::TRACE
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    kind: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() {
        return vk::FALSE;
    }
    let msg = unsafe { (*data).message_as_c_str() }
        .map(|m| m.to_string_lossy())
        .unwrap_or_default();

    match severity_level(severity) {
        tracing::Level::ERROR => error!("[vulkan {kind:?}] {msg}"),
        tracing::Level::WARN => warn!("[vulkan {kind:?}] {msg}"),
        tracing::Level::DEBUG => debug!("[vulkan {kind:?}] {msg}"),
        _ => trace!("[vulkan {kind:?}] {msg}"),
    }
    vk::FALSE
}

//! Vulkan instance, validation layer and debug messenger.
//!
//! Validation output is routed into `tracing`, tagged with the message kind
//! so shader and synchronisation reports can be filtered with `RUST_LOG`.
//!
//! # Example
//!
//! ```no_run
//! use vbparts_rhi::instance::Instance;
//!
//! let instance = Instance::new(cfg!(debug_assertions)).expect("Failed to create Vulkan instance");
//! assert_eq!(instance.has_validation(), cfg!(debug_assertions));
//! ```

use std::borrow::Cow;
use std::ffi::{CStr, c_char, c_void};

use ash::{Entry, vk};
use tracing::{debug, error, info, warn};

use crate::error::{RhiError, RhiResult};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Requested API version.
///
/// Everything the techniques use is core 1.0; 1.1 makes validation apply the
/// stricter queue-family ownership rules.
pub const API_VERSION: u32 = vk::API_VERSION_1_1;

/// Validation messages below this severity are never delivered.
const REPORTED_SEVERITY: vk::DebugUtilsMessageSeverityFlagsEXT =
    vk::DebugUtilsMessageSeverityFlagsEXT::from_raw(
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING.as_raw()
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR.as_raw(),
    );

/// Debug-utils loader and the messenger it created.
struct Messenger {
    loader: ash::ext::debug_utils::Instance,
    handle: vk::DebugUtilsMessengerEXT,
}

impl Messenger {
    fn new(entry: &Entry, instance: &ash::Instance) -> RhiResult<Self> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(REPORTED_SEVERITY)
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(forward_to_tracing));
        let handle = unsafe { loader.create_debug_utils_messenger(&create_info, None)? };
        Ok(Self { loader, handle })
    }
}

/// Owns the `ash` entry, the instance and, in debug builds, the validation
/// messenger.
pub struct Instance {
    messenger: Option<Messenger>,
    instance: ash::Instance,
    entry: Entry,
}

impl Instance {
    /// Loads Vulkan and creates the instance with the surface extensions for
    /// this platform.
    ///
    /// Validation is enabled only when requested and the Khronos layer is
    /// installed; a missing layer is logged and otherwise ignored.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::LoadingError`] when no Vulkan loader is found, or a
    /// Vulkan error if the instance or messenger cannot be created.
    pub fn new(validation: bool) -> RhiResult<Self> {
        let entry = unsafe { Entry::load()? };

        let validation = validation && {
            let found = has_layer(&entry, VALIDATION_LAYER)?;
            if !found {
                warn!("Validation requested but VK_LAYER_KHRONOS_validation is not installed");
            }
            found
        };

        let app_info = vk::ApplicationInfo::default()
            .application_name(c"Visibility Buffer Particles")
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"vbparts")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(API_VERSION);

        let mut extensions = surface_extensions();
        let mut layers = Vec::new();
        if validation {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
            layers.push(VALIDATION_LAYER.as_ptr());
        }

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);
        let instance = unsafe { entry.create_instance(&create_info, None)? };

        let messenger = if validation {
            match Messenger::new(&entry, &instance) {
                Ok(messenger) => Some(messenger),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        info!(
            "Vulkan {}.{} instance created (validation {})",
            vk::api_version_major(API_VERSION),
            vk::api_version_minor(API_VERSION),
            if messenger.is_some() { "on" } else { "off" }
        );

        Ok(Self {
            messenger,
            instance,
            entry,
        })
    }

    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// True when validation messages are being forwarded.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.messenger.is_some()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let Some(messenger) = self.messenger.take() {
                messenger
                    .loader
                    .destroy_debug_utils_messenger(messenger.handle, None);
            }
            self.instance.destroy_instance(None);
        }
        debug!("Vulkan instance destroyed");
    }
}

/// `VK_KHR_surface` plus whatever window-system surface this target needs.
fn surface_extensions() -> Vec<*const c_char> {
    let mut extensions = vec![ash::khr::surface::NAME.as_ptr()];

    #[cfg(target_os = "windows")]
    extensions.push(ash::khr::win32_surface::NAME.as_ptr());

    #[cfg(target_os = "linux")]
    extensions.extend([
        ash::khr::xlib_surface::NAME.as_ptr(),
        ash::khr::wayland_surface::NAME.as_ptr(),
    ]);

    #[cfg(target_os = "macos")]
    extensions.push(ash::ext::metal_surface::NAME.as_ptr());

    extensions
}

fn has_layer(entry: &Entry, name: &CStr) -> RhiResult<bool> {
    let layers = unsafe { entry.enumerate_instance_layer_properties()? };
    Ok(layers
        .iter()
        .any(|layer| layer.layer_name_as_c_str().is_ok_and(|n| n == name)))
}

/// Short tag for a message type, used as the log prefix.
fn message_kind(kind: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if kind.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "validation"
    } else if kind.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "performance"
    } else {
        "general"
    }
}

/// # Safety
///
/// Called by the loader with a valid or null callback data pointer.
unsafe extern "system" fn forward_to_tracing(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    kind: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    let Some(data) = (unsafe { data.as_ref() }) else {
        return vk::FALSE;
    };
    let message = if data.p_message.is_null() {
        Cow::Borrowed("(empty)")
    } else {
        unsafe { CStr::from_ptr(data.p_message) }.to_string_lossy()
    };
    let kind = message_kind(kind);

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "vulkan", "[{}] {}", kind, message);
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(target: "vulkan", "[{}] {}", kind, message);
    } else {
        debug!(target: "vulkan", "[{}] {}", kind, message);
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_without_validation() {
        match Instance::new(false) {
            Ok(instance) => assert!(!instance.has_validation()),
            Err(RhiError::LoadingError(_)) => {
                eprintln!("Skipping test: Vulkan not available");
            }
            Err(e) => panic!("Unexpected error: {:?}", e),
        }
    }

    #[test]
    fn test_surface_extension_comes_first() {
        let extensions = surface_extensions();
        assert_eq!(extensions[0], ash::khr::surface::NAME.as_ptr());

        #[cfg(target_os = "linux")]
        assert_eq!(extensions.len(), 3);
    }

    #[test]
    fn test_message_kind_prefers_validation() {
        let both = vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE;
        assert_eq!(message_kind(both), "validation");
        assert_eq!(
            message_kind(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE),
            "performance"
        );
        assert_eq!(
            message_kind(vk::DebugUtilsMessageTypeFlagsEXT::GENERAL),
            "general"
        );
    }

    #[test]
    fn test_only_warnings_and_errors_are_reported() {
        assert!(REPORTED_SEVERITY.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING));
        assert!(!REPORTED_SEVERITY.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO));
    }
}

//! Vulkan instance management.
//!
//! This module handles VkInstance creation, validation layers, and the debug
//! messenger that routes validation output into `tracing`.
//!
//! Whether validation is used is decided by the [`ValidationConfig`] passed
//! to [`Instance::new`]; nothing here reads build flags or globals.
//!
//! # Example
//!
//! ```no_run
//! use vkframe_core::ValidationConfig;
//! use vkframe_rhi::instance::Instance;
//!
//! let validation = ValidationConfig { enabled: true, verbose: false };
//! let instance = Instance::new(c"demo", validation, &[]).expect("Failed to create Vulkan instance");
//! println!("validation active: {}", instance.has_validation());
//! ```

use std::ffi::{CStr, c_char};

use ash::{Entry, vk};
use tracing::{debug, error, info, warn};
use vkframe_core::ValidationConfig;

use crate::error::RhiError;

/// The Khronos validation layer name.
const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Vulkan instance wrapper with optional validation layer support.
///
/// Dropping the instance destroys the debug messenger first, then the
/// instance itself. Every object created from it must already be gone.
pub struct Instance {
    entry: Entry,
    instance: ash::Instance,
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl Instance {
    /// Creates a new Vulkan instance.
    ///
    /// # Arguments
    ///
    /// * `application_name` - Reported to the driver
    /// * `validation` - Whether to enable the validation layer and how chatty it is
    /// * `surface_extensions` - Platform surface extensions for the target window
    ///
    /// # Errors
    ///
    /// Returns an error if the Vulkan library cannot be loaded, instance
    /// creation fails, or the debug messenger cannot be created.
    /// A requested but missing validation layer only logs a warning.
    pub fn new(
        application_name: &CStr,
        validation: ValidationConfig,
        surface_extensions: &[*const c_char],
    ) -> Result<Self, RhiError> {
        let entry = unsafe { Entry::load()? };

        let validation_available = if validation.enabled {
            let available = Self::is_validation_layer_available(&entry)?;
            if !available {
                warn!("Validation layer requested but not available, proceeding without it");
            }
            available
        } else {
            false
        };

        let app_info = vk::ApplicationInfo::default()
            .application_name(application_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"vkframe")
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_1);

        let mut extensions = surface_extensions.to_vec();
        if !extensions.contains(&ash::khr::surface::NAME.as_ptr()) {
            extensions.push(ash::khr::surface::NAME.as_ptr());
        }
        if validation_available {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let layers = if validation_available {
            vec![VALIDATION_LAYER_NAME.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe { entry.create_instance(&create_info, None) }.map_err(|result| {
            error!("Instance::new: failed to create instance: {:?}", result);
            RhiError::Creation {
                object: "instance",
                result,
            }
        })?;

        info!(
            "Vulkan instance created with {} extension(s)",
            extensions.len()
        );

        let (debug_utils, debug_messenger) = if validation_available {
            let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
            match Self::setup_debug_messenger(&debug_utils, validation.verbose) {
                Ok(messenger) => (Some(debug_utils), Some(messenger)),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            (None, None)
        };

        if validation_available {
            info!("Validation layers enabled");
        }

        Ok(Self {
            entry,
            instance,
            debug_utils,
            debug_messenger,
        })
    }

    /// Returns the Vulkan instance handle.
    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    /// Returns the Vulkan entry point loader.
    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Returns whether validation layers are active.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.debug_messenger.is_some()
    }

    fn is_validation_layer_available(entry: &Entry) -> Result<bool, RhiError> {
        let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };

        let found = available_layers.iter().any(|layer| {
            layer
                .layer_name_as_c_str()
                .is_ok_and(|name| name == VALIDATION_LAYER_NAME)
        });

        Ok(found)
    }

    fn setup_debug_messenger(
        debug_utils: &ash::ext::debug_utils::Instance,
        verbose: bool,
    ) -> Result<vk::DebugUtilsMessengerEXT, RhiError> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(message_severities(verbose))
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .map_err(|result| {
                error!(
                    "Instance::setup_debug_messenger: failed to create messenger: {:?}",
                    result
                );
                RhiError::Creation {
                    object: "debug messenger",
                    result,
                }
            })?;

        debug!("Debug messenger created");
        Ok(messenger)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

/// Severities forwarded by the debug messenger.
fn message_severities(verbose: bool) -> vk::DebugUtilsMessageSeverityFlagsEXT {
    let base = vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
        | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR;
    if verbose {
        base | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
            | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
    } else {
        base
    }
}

/// Routes validation layer messages to `tracing`.
///
/// # Safety
///
/// Called by the Vulkan loader with a valid (or null) callback data pointer.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = unsafe { &*p_callback_data };
    let message = if callback_data.p_message.is_null() {
        std::borrow::Cow::Borrowed("(no message)")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };

    let type_str = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "General",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "Validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "Performance",
        _ => "Unknown",
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            error!("[Vulkan {}] {}", type_str, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            warn!("[Vulkan {}] {}", type_str, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            info!("[Vulkan {}] {}", type_str, message);
        }
        _ => {
            debug!("[Vulkan {}] {}", type_str, message);
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_creation_without_validation() {
        let validation = ValidationConfig {
            enabled: false,
            verbose: false,
        };
        match Instance::new(c"vkframe-test", validation, &[]) {
            Ok(instance) => assert!(!instance.has_validation()),
            Err(RhiError::LoadingError(_)) => {
                eprintln!("Skipping test: Vulkan not available");
            }
            Err(e) => {
                // Loader present but no ICD, common on CI machines.
                eprintln!("Skipping test: {}", e);
            }
        }
    }

    #[test]
    fn test_default_severities_exclude_info() {
        let severities = message_severities(false);
        assert!(severities.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR));
        assert!(severities.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING));
        assert!(!severities.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO));
    }

    #[test]
    fn test_verbose_severities_include_everything() {
        let severities = message_severities(true);
        assert!(severities.contains(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE));
        assert!(severities.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO));
    }
}

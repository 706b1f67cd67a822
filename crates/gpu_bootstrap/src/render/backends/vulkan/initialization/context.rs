//! Vulkan context management
//!
//! Instance creation with optional diagnostics, and the error taxonomy shared by
//! every bootstrap stage.

use ash::extensions::ext::DebugUtils;
use ash::{vk, Entry, Instance};
use std::ffi::{c_void, CStr, CString};
use thiserror::Error;

use crate::core::config::VulkanRendererConfig;
use crate::render::backends::vulkan::{Stage, TeardownStack, WindowError};

/// Diagnostic layers enabled when validation is on
pub const VALIDATION_LAYERS: [&str; 1] = ["VK_LAYER_KHRONOS_validation"];

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// A required extension, layer, queue family or swapchain capability is missing
    #[error("Unsupported capability: {0}")]
    UnsupportedCapability(String),

    /// Object creation failed for a reason other than a missing capability
    #[error("{call} failed: {result:?}")]
    Initialization {
        /// The API entry point that failed
        call: &'static str,
        /// Driver result code
        result: vk::Result,
    },

    /// Host or device memory allocation failed
    #[error("Out of memory in {call}: {result:?}")]
    ResourceExhaustion {
        /// The API entry point that failed
        call: &'static str,
        /// Driver result code
        result: vk::Result,
    },

    /// Shader bytecode could not be loaded
    #[error("Failed to load shader '{path}': {reason}")]
    ShaderLoad {
        /// Path handed to the loader
        path: String,
        /// What went wrong
        reason: String,
    },

    /// The surface changed and the swapchain no longer matches it
    #[error("Swapchain is out of date with its surface")]
    SurfaceOutOfDate,

    /// A name could not be passed to the driver
    #[error("Invalid {what} name: {name:?}")]
    InvalidName {
        /// Kind of name (application, extension, ...)
        what: &'static str,
        /// Offending value
        name: String,
    },

    /// Window system failure
    #[error("Window error: {0}")]
    Window(#[from] WindowError),
}

impl VulkanError {
    /// Classify a driver result code from `call`
    pub fn from_vk(call: &'static str, result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_HOST_MEMORY
            | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
            | vk::Result::ERROR_OUT_OF_POOL_MEMORY
            | vk::Result::ERROR_TOO_MANY_OBJECTS => Self::ResourceExhaustion { call, result },
            vk::Result::ERROR_EXTENSION_NOT_PRESENT
            | vk::Result::ERROR_LAYER_NOT_PRESENT
            | vk::Result::ERROR_FEATURE_NOT_PRESENT
            | vk::Result::ERROR_INCOMPATIBLE_DRIVER
            | vk::Result::ERROR_FORMAT_NOT_SUPPORTED => {
                Self::UnsupportedCapability(format!("{} returned {:?}", call, result))
            }
            vk::Result::ERROR_OUT_OF_DATE_KHR => Self::SurfaceOutOfDate,
            _ => Self::Initialization { call, result },
        }
    }

    /// Mapper for `map_err` at a call site
    pub fn api(call: &'static str) -> impl Fn(vk::Result) -> Self {
        move |result| Self::from_vk(call, result)
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

pub(crate) fn c_string(what: &'static str, name: &str) -> VulkanResult<CString> {
    CString::new(name).map_err(|_| VulkanError::InvalidName {
        what,
        name: name.to_string(),
    })
}

pub(crate) fn c_name(raw: &[std::os::raw::c_char]) -> String {
    // SAFETY: the driver fills fixed-size name arrays with NUL-terminated strings
    unsafe { CStr::from_ptr(raw.as_ptr()) }.to_string_lossy().into_owned()
}

/// Names from `required` that are absent from `available`, in request order
pub fn missing_names<'a, S: AsRef<str>>(required: &'a [S], available: &[String]) -> Vec<&'a str> {
    required
        .iter()
        .map(AsRef::as_ref)
        .filter(|name| !available.iter().any(|have| have == name))
        .collect()
}

/// Vulkan instance with its optional diagnostic messenger
///
/// Destruction is registered on the bootstrap teardown stack, not on drop.
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    /// Debug utilities loader and messenger when diagnostics are enabled
    pub debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Verify layer and extension availability, then create the instance
    pub fn new(
        config: &VulkanRendererConfig,
        window_extensions: &[String],
        teardown: &mut TeardownStack,
    ) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }.map_err(|e| {
            VulkanError::UnsupportedCapability(format!("Vulkan loader unavailable: {}", e))
        })?;

        let enable_validation = config.validation_enabled();
        if enable_validation {
            Self::verify_layers(&entry, &VALIDATION_LAYERS)?;
        }

        let mut extension_names: Vec<String> = window_extensions.to_vec();
        if enable_validation {
            extension_names.push(DebugUtils::name().to_string_lossy().into_owned());
        }
        Self::verify_extensions(&entry, &extension_names)?;

        let app_name = c_string("application", &config.application_name)?;
        let engine_name = c_string("engine", &config.engine_name)?;
        let (app_major, app_minor, app_patch) = config.application_version;
        let (engine_major, engine_minor, engine_patch) = config.engine_version;
        let (api_major, api_minor) = config.api_version;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, app_major, app_minor, app_patch))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, engine_major, engine_minor, engine_patch))
            .api_version(vk::make_api_version(0, api_major, api_minor, 0));

        let extension_cstrings = extension_names
            .iter()
            .map(|name| c_string("extension", name))
            .collect::<VulkanResult<Vec<_>>>()?;
        let extension_ptrs: Vec<*const std::os::raw::c_char> =
            extension_cstrings.iter().map(|name| name.as_ptr()).collect();

        let layer_cstrings = if enable_validation {
            VALIDATION_LAYERS
                .iter()
                .map(|name| c_string("layer", name))
                .collect::<VulkanResult<Vec<_>>>()?
        } else {
            Vec::new()
        };
        let layer_ptrs: Vec<*const std::os::raw::c_char> =
            layer_cstrings.iter().map(|name| name.as_ptr()).collect();

        // Chained so instance creation and destruction are reported too
        let mut instance_debug_info = Self::messenger_create_info();
        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);
        if enable_validation {
            create_info = create_info.push_next(&mut instance_debug_info);
        }

        let instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .map_err(VulkanError::api("vkCreateInstance"))?
        };
        {
            // The entry keeps the loader library mapped until the instance is gone
            let entry = entry.clone();
            let instance = instance.clone();
            teardown.push(Stage::Context, "instance", move || unsafe {
                instance.destroy_instance(None);
                drop(entry);
            });
        }
        log::info!(
            "Vulkan instance created (API {}.{}, validation {})",
            api_major,
            api_minor,
            if enable_validation { "on" } else { "off" }
        );

        let debug = if enable_validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            let messenger = unsafe {
                debug_utils
                    .create_debug_utils_messenger(&Self::messenger_create_info(), None)
                    .map_err(VulkanError::api("vkCreateDebugUtilsMessengerEXT"))?
            };
            let loader = debug_utils.clone();
            teardown.push(Stage::Context, "debug messenger", move || unsafe {
                loader.destroy_debug_utils_messenger(messenger, None);
            });
            Some((debug_utils, messenger))
        } else {
            None
        };

        Ok(Self {
            entry,
            instance,
            debug,
        })
    }

    /// Whether the diagnostic messenger is attached
    pub fn has_validation(&self) -> bool {
        self.debug.is_some()
    }

    fn verify_layers(entry: &Entry, layers: &[&str]) -> VulkanResult<()> {
        let available: Vec<String> = entry
            .enumerate_instance_layer_properties()
            .map_err(VulkanError::api("vkEnumerateInstanceLayerProperties"))?
            .iter()
            .map(|layer| c_name(&layer.layer_name))
            .collect();

        let missing = missing_names(layers, &available);
        if let Some(first) = missing.first() {
            log::error!("Validation layer '{}' not supported", first);
            return Err(VulkanError::UnsupportedCapability(format!(
                "validation layers not available: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    fn verify_extensions(entry: &Entry, extensions: &[String]) -> VulkanResult<()> {
        let available: Vec<String> = entry
            .enumerate_instance_extension_properties(None)
            .map_err(VulkanError::api("vkEnumerateInstanceExtensionProperties"))?
            .iter()
            .map(|extension| c_name(&extension.extension_name))
            .collect();

        let missing = missing_names(extensions, &available);
        if let Some(first) = missing.first() {
            log::error!("Instance extension '{}' not supported", first);
            return Err(VulkanError::UnsupportedCapability(format!(
                "instance extensions not available: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    fn messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT {
        vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback))
            .build()
    }
}

/// Log level a driver message of `severity` is reported at
pub fn severity_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> log::Level {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::Level::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::Level::Warn
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        log::Level::Info
    } else {
        log::Level::Debug
    }
}

/// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();
    log::log!(severity_level(message_severity), "[Vulkan] {:?} - {}", message_type, message);

    vk::FALSE
}

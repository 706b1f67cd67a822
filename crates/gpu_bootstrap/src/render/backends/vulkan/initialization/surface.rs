//! Vulkan surface management
//!
//! Handles window surface creation and the per-device capability queries used
//! by device selection and swapchain negotiation.

use ash::{extensions::khr, vk};

use crate::render::backends::vulkan::{
    Stage, SurfaceSupport, TeardownStack, VulkanError, VulkanInstance, VulkanResult,
};
use crate::render::window::SurfaceProvider;

/// Vulkan surface bound to a provider's native window
///
/// The handle is destroyed by the teardown stack before the instance.
#[derive(Clone)]
pub struct Surface {
    surface_loader: khr::Surface,
    surface: vk::SurfaceKHR,
}

impl Surface {
    /// Create a surface through the window system and register its destruction
    pub fn new(
        context: &VulkanInstance,
        provider: &dyn SurfaceProvider,
        teardown: &mut TeardownStack,
    ) -> VulkanResult<Self> {
        let surface_loader = khr::Surface::new(&context.entry, &context.instance);
        let surface = provider.create_surface(&context.instance)?;

        let loader = surface_loader.clone();
        teardown.push(Stage::Surface, "surface", move || unsafe {
            loader.destroy_surface(surface, None);
        });
        log::info!("Window surface created");

        Ok(Self {
            surface_loader,
            surface,
        })
    }

    /// Get the underlying surface handle
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Get the surface loader
    pub fn loader(&self) -> &khr::Surface {
        &self.surface_loader
    }

    /// Get surface capabilities for a physical device
    pub fn capabilities(&self, physical_device: vk::PhysicalDevice) -> VulkanResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)
                .map_err(VulkanError::api("vkGetPhysicalDeviceSurfaceCapabilitiesKHR"))
        }
    }

    /// Get surface formats for a physical device
    pub fn formats(&self, physical_device: vk::PhysicalDevice) -> VulkanResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(physical_device, self.surface)
                .map_err(VulkanError::api("vkGetPhysicalDeviceSurfaceFormatsKHR"))
        }
    }

    /// Get surface present modes for a physical device
    pub fn present_modes(&self, physical_device: vk::PhysicalDevice) -> VulkanResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(physical_device, self.surface)
                .map_err(VulkanError::api("vkGetPhysicalDeviceSurfacePresentModesKHR"))
        }
    }

    /// Check if a queue family supports presentation to this surface
    pub fn supports_present(&self, physical_device: vk::PhysicalDevice, queue_family_index: u32) -> VulkanResult<bool> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_support(physical_device, queue_family_index, self.surface)
                .map_err(VulkanError::api("vkGetPhysicalDeviceSurfaceSupportKHR"))
        }
    }

    /// Raw capabilities, formats and present modes in one query
    pub fn support(&self, physical_device: vk::PhysicalDevice) -> VulkanResult<SurfaceSupport> {
        Ok(SurfaceSupport {
            capabilities: self.capabilities(physical_device)?,
            formats: self.formats(physical_device)?,
            present_modes: self.present_modes(physical_device)?,
        })
    }
}

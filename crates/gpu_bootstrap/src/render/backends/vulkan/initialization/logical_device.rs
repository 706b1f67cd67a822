//! Logical device creation and queue retrieval

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device, Instance};

use crate::render::backends::vulkan::{
    c_string, PhysicalDeviceInfo, QueueFamilies, Stage, TeardownStack, VulkanError, VulkanResult,
};

static QUEUE_PRIORITIES: [f32; 1] = [1.0];

/// Distinct family indices in graphics, present order
pub fn unique_queue_families(families: QueueFamilies) -> Vec<u32> {
    if families.is_shared() {
        vec![families.graphics]
    } else {
        vec![families.graphics, families.present]
    }
}

/// One single-queue request per distinct family
pub fn queue_create_infos(families: QueueFamilies) -> Vec<vk::DeviceQueueCreateInfo> {
    unique_queue_families(families)
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(family)
                .queue_priorities(&QUEUE_PRIORITIES)
                .build()
        })
        .collect()
}

/// Logical device with its graphics and present queues
///
/// Everything created against the device is registered on the teardown stack
/// above it, so the device is destroyed last among device-level objects.
#[derive(Clone)]
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// Graphics operations queue
    pub graphics_queue: vk::Queue,
    /// Surface presentation queue
    pub present_queue: vk::Queue,
    /// Graphics and present family indices
    pub queue_families: QueueFamilies,
    /// Swapchain extension loader
    pub swapchain_loader: SwapchainLoader,
}

impl LogicalDevice {
    /// Create the device with the required extensions and fetch queue 0 of each family
    pub fn new(
        instance: &Instance,
        physical_device: &PhysicalDeviceInfo,
        required_extensions: &[String],
        teardown: &mut TeardownStack,
    ) -> VulkanResult<Self> {
        let queue_families = physical_device.queue_families;
        let queue_infos = queue_create_infos(queue_families);

        let extension_names = required_extensions
            .iter()
            .map(|name| c_string("device extension", name))
            .collect::<VulkanResult<Vec<_>>>()?;
        let extension_ptrs: Vec<*const std::os::raw::c_char> =
            extension_names.iter().map(|name| name.as_ptr()).collect();

        let device_features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&device_features);

        let device = unsafe {
            instance
                .create_device(physical_device.device, &create_info, None)
                .map_err(VulkanError::api("vkCreateDevice"))?
        };
        {
            let device = device.clone();
            teardown.push(Stage::LogicalDevice, "logical device", move || unsafe {
                device.destroy_device(None);
            });
        }

        let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(queue_families.present, 0) };

        let swapchain_loader = SwapchainLoader::new(instance, &device);

        log::info!(
            "Logical device created with {} queue famil{}",
            queue_infos.len(),
            if queue_infos.len() == 1 { "y" } else { "ies" }
        );

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            queue_families,
            swapchain_loader,
        })
    }

    /// Block until every queue of the device is idle
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe {
            self.device
                .device_wait_idle()
                .map_err(VulkanError::api("vkDeviceWaitIdle"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_family_requests_one_queue() {
        let families = QueueFamilies { graphics: 2, present: 2 };
        let infos = queue_create_infos(families);

        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].queue_family_index, 2);
        assert_eq!(infos[0].queue_count, 1);
    }

    #[test]
    fn test_distinct_families_request_two_queues() {
        let families = QueueFamilies { graphics: 0, present: 1 };
        let infos = queue_create_infos(families);

        assert_eq!(infos.len(), 2);
        assert_eq!(
            infos.iter().map(|info| info.queue_family_index).collect::<Vec<_>>(),
            vec![0, 1]
        );
        assert!(infos.iter().all(|info| info.queue_count == 1));
    }

    #[test]
    fn test_queue_priority_is_fixed() {
        let infos = queue_create_infos(QueueFamilies { graphics: 0, present: 0 });
        let priority = unsafe { *infos[0].p_queue_priorities };
        assert_eq!(priority, 1.0);
    }

    #[test]
    fn test_unique_families_order() {
        assert_eq!(unique_queue_families(QueueFamilies { graphics: 3, present: 1 }), vec![3, 1]);
        assert_eq!(unique_queue_families(QueueFamilies { graphics: 1, present: 1 }), vec![1]);
    }
}

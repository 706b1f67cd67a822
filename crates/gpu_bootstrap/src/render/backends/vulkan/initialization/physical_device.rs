//! Physical device selection and queue family resolution
//!
//! Devices are evaluated in driver order and the first one that passes every
//! check wins. There is no scoring: a discrete GPU listed after a suitable
//! integrated one is not preferred.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::vk;

use crate::render::backends::vulkan::{
    c_name, missing_names, Surface, SurfaceSupport, VulkanError, VulkanResult,
};

/// Device extensions every selected GPU must expose
pub fn required_device_extensions() -> Vec<String> {
    vec![SwapchainLoader::name().to_string_lossy().into_owned()]
}

/// Queue family indices as discovered; either may be missing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// First family with graphics capability
    pub graphics: Option<u32>,
    /// First family that can present to the surface
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Both indices found
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Resolved pair, only when both indices are set
    pub fn complete(&self) -> Option<QueueFamilies> {
        Some(QueueFamilies {
            graphics: self.graphics?,
            present: self.present?,
        })
    }
}

/// Resolved graphics and present queue families (possibly equal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    /// Graphics family index
    pub graphics: u32,
    /// Present family index
    pub present: u32,
}

impl QueueFamilies {
    /// True when one family serves both roles
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }
}

/// Find the first graphics family and the first present-capable family
///
/// Families advertising zero queues are skipped. `supports_present` is asked
/// about each family in index order until a present family is found, and the
/// scan stops as soon as both indices are known.
pub fn resolve_queue_families<F>(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: F,
) -> VulkanResult<QueueFamilyIndices>
where
    F: FnMut(u32) -> VulkanResult<bool>,
{
    let mut indices = QueueFamilyIndices::default();

    for (index, family) in (0u32..).zip(families.iter()) {
        if family.queue_count == 0 {
            continue;
        }

        if indices.graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            indices.graphics = Some(index);
        }

        if indices.present.is_none() && supports_present(index)? {
            indices.present = Some(index);
        }

        if indices.is_complete() {
            break;
        }
    }

    Ok(indices)
}

/// Capability queries needed to judge a physical device
///
/// Implemented over a live instance and surface; tests provide fixed device lists.
pub trait DeviceProbe {
    /// Physical devices in driver enumeration order
    fn devices(&self) -> VulkanResult<Vec<vk::PhysicalDevice>>;

    /// Human readable device name
    fn device_name(&self, device: vk::PhysicalDevice) -> String;

    /// Queue family properties in index order
    fn queue_families(&self, device: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties>;

    /// Whether `family` can present to the surface
    fn supports_present(&self, device: vk::PhysicalDevice, family: u32) -> VulkanResult<bool>;

    /// Names of the extensions the device exposes
    fn device_extensions(&self, device: vk::PhysicalDevice) -> VulkanResult<Vec<String>>;

    /// Surface capabilities, formats and present modes for the device
    fn surface_support(&self, device: vk::PhysicalDevice) -> VulkanResult<SurfaceSupport>;
}

/// [`DeviceProbe`] backed by a live instance and surface
pub struct InstanceProbe<'a> {
    instance: &'a ash::Instance,
    surface: &'a Surface,
}

impl<'a> InstanceProbe<'a> {
    /// Probe devices of `instance` against `surface`
    pub fn new(instance: &'a ash::Instance, surface: &'a Surface) -> Self {
        Self { instance, surface }
    }
}

impl DeviceProbe for InstanceProbe<'_> {
    fn devices(&self) -> VulkanResult<Vec<vk::PhysicalDevice>> {
        unsafe {
            self.instance
                .enumerate_physical_devices()
                .map_err(VulkanError::api("vkEnumeratePhysicalDevices"))
        }
    }

    fn device_name(&self, device: vk::PhysicalDevice) -> String {
        let properties = unsafe { self.instance.get_physical_device_properties(device) };
        c_name(&properties.device_name)
    }

    fn queue_families(&self, device: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties> {
        unsafe { self.instance.get_physical_device_queue_family_properties(device) }
    }

    fn supports_present(&self, device: vk::PhysicalDevice, family: u32) -> VulkanResult<bool> {
        self.surface.supports_present(device, family)
    }

    fn device_extensions(&self, device: vk::PhysicalDevice) -> VulkanResult<Vec<String>> {
        let extensions = unsafe {
            self.instance
                .enumerate_device_extension_properties(device)
                .map_err(VulkanError::api("vkEnumerateDeviceExtensionProperties"))?
        };
        Ok(extensions.iter().map(|ext| c_name(&ext.extension_name)).collect())
    }

    fn surface_support(&self, device: vk::PhysicalDevice) -> VulkanResult<SurfaceSupport> {
        self.surface.support(device)
    }
}

/// The selected GPU and its resolved queue families
#[derive(Debug, Clone)]
pub struct PhysicalDeviceInfo {
    /// Physical device handle (not owned)
    pub device: vk::PhysicalDevice,
    /// Device name
    pub name: String,
    /// Graphics and present families
    pub queue_families: QueueFamilies,
}

impl PhysicalDeviceInfo {
    /// Select the first device passing queue, extension and swapchain checks
    pub fn select_suitable_device(
        probe: &dyn DeviceProbe,
        required_extensions: &[String],
    ) -> VulkanResult<Self> {
        let devices = probe.devices()?;
        if devices.is_empty() {
            return Err(VulkanError::UnsupportedCapability(
                "no Vulkan capable GPU found".to_string(),
            ));
        }

        for device in devices {
            let name = probe.device_name(device);
            match Self::evaluate_device(probe, device, required_extensions) {
                Ok(Ok(queue_families)) => {
                    log::info!(
                        "Selected GPU: {} (graphics family {}, present family {})",
                        name,
                        queue_families.graphics,
                        queue_families.present
                    );
                    return Ok(Self {
                        device,
                        name,
                        queue_families,
                    });
                }
                Ok(Err(reason)) => log::debug!("Skipping GPU {}: {}", name, reason),
                Err(e) => log::warn!("Skipping GPU {}: query failed: {}", name, e),
            }
        }

        Err(VulkanError::UnsupportedCapability("no suitable GPU found".to_string()))
    }

    /// Outer error: a query failed. Inner error: the device is unsuitable.
    fn evaluate_device(
        probe: &dyn DeviceProbe,
        device: vk::PhysicalDevice,
        required_extensions: &[String],
    ) -> VulkanResult<Result<QueueFamilies, String>> {
        let families = probe.queue_families(device);
        let indices = resolve_queue_families(&families, |index| probe.supports_present(device, index))?;
        let Some(queue_families) = indices.complete() else {
            return Ok(Err(format!("incomplete queue families {:?}", indices)));
        };

        let available = probe.device_extensions(device)?;
        let missing = missing_names(required_extensions, &available);
        if !missing.is_empty() {
            return Ok(Err(format!("missing extensions {}", missing.join(", "))));
        }

        let support = probe.surface_support(device)?;
        if support.formats.is_empty() || support.present_modes.is_empty() {
            return Ok(Err(format!(
                "inadequate swapchain support ({} formats, {} present modes)",
                support.formats.len(),
                support.present_modes.len()
            )));
        }

        Ok(Ok(queue_families))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use std::cell::RefCell;

    fn family(flags: vk::QueueFlags, count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: count,
            ..Default::default()
        }
    }

    struct FakeDevice {
        name: &'static str,
        families: Vec<vk::QueueFamilyProperties>,
        present: Vec<bool>,
        extensions: Vec<String>,
        formats: usize,
        modes: usize,
    }

    impl FakeDevice {
        fn suitable(name: &'static str) -> Self {
            Self {
                name,
                families: vec![family(vk::QueueFlags::GRAPHICS, 1)],
                present: vec![true],
                extensions: required_device_extensions(),
                formats: 1,
                modes: 1,
            }
        }
    }

    struct FakeProbe {
        devices: Vec<FakeDevice>,
        present_queries: RefCell<Vec<(u64, u32)>>,
    }

    impl FakeProbe {
        fn new(devices: Vec<FakeDevice>) -> Self {
            Self {
                devices,
                present_queries: RefCell::default(),
            }
        }

        fn get(&self, device: vk::PhysicalDevice) -> &FakeDevice {
            &self.devices[(device.as_raw() - 1) as usize]
        }
    }

    impl DeviceProbe for FakeProbe {
        fn devices(&self) -> VulkanResult<Vec<vk::PhysicalDevice>> {
            Ok((1..=self.devices.len() as u64).map(vk::PhysicalDevice::from_raw).collect())
        }

        fn device_name(&self, device: vk::PhysicalDevice) -> String {
            self.get(device).name.to_string()
        }

        fn queue_families(&self, device: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties> {
            self.get(device).families.clone()
        }

        fn supports_present(&self, device: vk::PhysicalDevice, family: u32) -> VulkanResult<bool> {
            self.present_queries.borrow_mut().push((device.as_raw(), family));
            Ok(self.get(device).present[family as usize])
        }

        fn device_extensions(&self, device: vk::PhysicalDevice) -> VulkanResult<Vec<String>> {
            Ok(self.get(device).extensions.clone())
        }

        fn surface_support(&self, device: vk::PhysicalDevice) -> VulkanResult<SurfaceSupport> {
            let fake = self.get(device);
            Ok(SurfaceSupport {
                capabilities: vk::SurfaceCapabilitiesKHR::default(),
                formats: vec![
                    vk::SurfaceFormatKHR {
                        format: vk::Format::B8G8R8A8_UNORM,
                        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                    };
                    fake.formats
                ],
                present_modes: vec![vk::PresentModeKHR::FIFO; fake.modes],
            })
        }
    }

    #[test]
    fn test_first_suitable_device_wins() {
        let mut no_extensions = FakeDevice::suitable("no swapchain extension");
        no_extensions.extensions.clear();

        let probe = FakeProbe::new(vec![
            no_extensions,
            FakeDevice::suitable("first suitable"),
            FakeDevice::suitable("second suitable"),
        ]);

        let selected = PhysicalDeviceInfo::select_suitable_device(&probe, &required_device_extensions()).unwrap();
        assert_eq!(selected.device.as_raw(), 2);
        assert_eq!(selected.name, "first suitable");
    }

    #[test]
    fn test_only_device_one_passes_every_check() {
        let mut no_present = FakeDevice::suitable("no present");
        no_present.present = vec![false];

        let mut no_formats = FakeDevice::suitable("no formats");
        no_formats.formats = 0;

        let mut no_modes = FakeDevice::suitable("no present modes");
        no_modes.modes = 0;

        let mut no_graphics = FakeDevice::suitable("compute only");
        no_graphics.families = vec![family(vk::QueueFlags::COMPUTE, 4)];

        let probe = FakeProbe::new(vec![
            no_present,
            FakeDevice::suitable("target"),
            no_formats,
            no_modes,
            no_graphics,
        ]);

        let selected = PhysicalDeviceInfo::select_suitable_device(&probe, &required_device_extensions()).unwrap();
        assert_eq!(selected.device.as_raw(), 2);
        assert_eq!(selected.name, "target");
    }

    #[test]
    fn test_no_suitable_device_is_unsupported() {
        let mut no_formats = FakeDevice::suitable("no formats");
        no_formats.formats = 0;
        let probe = FakeProbe::new(vec![no_formats]);

        assert!(matches!(
            PhysicalDeviceInfo::select_suitable_device(&probe, &required_device_extensions()),
            Err(VulkanError::UnsupportedCapability(_))
        ));
    }

    #[test]
    fn test_empty_device_list_is_unsupported() {
        let probe = FakeProbe::new(Vec::new());
        assert!(matches!(
            PhysicalDeviceInfo::select_suitable_device(&probe, &required_device_extensions()),
            Err(VulkanError::UnsupportedCapability(_))
        ));
    }

    #[test]
    fn test_resolver_shared_family() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 16)];
        let indices = resolve_queue_families(&families, |_| Ok(true)).unwrap();

        let resolved = indices.complete().unwrap();
        assert_eq!(resolved, QueueFamilies { graphics: 0, present: 0 });
        assert!(resolved.is_shared());
    }

    #[test]
    fn test_resolver_separate_families() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 1),
            family(vk::QueueFlags::TRANSFER, 1),
            family(vk::QueueFlags::COMPUTE, 1),
        ];
        let indices = resolve_queue_families(&families, |index| Ok(index == 2)).unwrap();

        assert_eq!(indices.complete(), Some(QueueFamilies { graphics: 0, present: 2 }));
    }

    #[test]
    fn test_resolver_skips_empty_families() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 0),
            family(vk::QueueFlags::GRAPHICS, 2),
        ];
        let mut asked = Vec::new();
        let indices = resolve_queue_families(&families, |index| {
            asked.push(index);
            Ok(true)
        })
        .unwrap();

        assert_eq!(indices.complete(), Some(QueueFamilies { graphics: 1, present: 1 }));
        assert_eq!(asked, vec![1]);
    }

    #[test]
    fn test_resolver_keeps_first_graphics_family() {
        let families = [
            family(vk::QueueFlags::COMPUTE, 1),
            family(vk::QueueFlags::GRAPHICS, 1),
            family(vk::QueueFlags::GRAPHICS, 1),
        ];
        let indices = resolve_queue_families(&families, |index| Ok(index == 2)).unwrap();

        assert_eq!(indices.graphics, Some(1));
        assert_eq!(indices.present, Some(2));
    }

    #[test]
    fn test_resolver_stops_once_complete() {
        let families = vec![family(vk::QueueFlags::GRAPHICS, 1); 4];
        let mut asked = Vec::new();
        resolve_queue_families(&families, |index| {
            asked.push(index);
            Ok(true)
        })
        .unwrap();

        assert_eq!(asked, vec![0]);
    }

    #[test]
    fn test_resolver_incomplete_without_present() {
        let families = [family(vk::QueueFlags::GRAPHICS, 1)];
        let indices = resolve_queue_families(&families, |_| Ok(false)).unwrap();

        assert_eq!(indices.graphics, Some(0));
        assert!(!indices.is_complete());
        assert_eq!(indices.complete(), None);
    }

    #[test]
    fn test_resolver_propagates_query_errors() {
        let families = [family(vk::QueueFlags::GRAPHICS, 1)];
        let result = resolve_queue_families(&families, |_| {
            Err(VulkanError::from_vk("vkGetPhysicalDeviceSurfaceSupportKHR", vk::Result::ERROR_SURFACE_LOST_KHR))
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_selection_queries_present_per_device() {
        let mut two_families = FakeDevice::suitable("two families");
        two_families.families = vec![
            family(vk::QueueFlags::GRAPHICS, 1),
            family(vk::QueueFlags::TRANSFER, 1),
        ];
        two_families.present = vec![false, true];
        let probe = FakeProbe::new(vec![two_families]);

        let selected = PhysicalDeviceInfo::select_suitable_device(&probe, &required_device_extensions()).unwrap();
        assert_eq!(selected.queue_families, QueueFamilies { graphics: 0, present: 1 });
        assert_eq!(*probe.present_queries.borrow(), vec![(1, 0), (1, 1)]);
    }
}

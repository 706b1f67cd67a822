//! Vulkan swapchain negotiation and creation
//!
//! The selection policy is a set of pure functions over the raw surface data so
//! that every fallback can be exercised without a driver. [`SwapchainSupport`]
//! carries the raw data through negotiation and only exposes a
//! [`SwapchainConfig`] once it has been resolved.

use ash::vk;

use crate::render::backends::vulkan::{
    LogicalDevice, PhysicalDeviceInfo, QueueFamilies, Stage, Surface, TeardownStack, VulkanError,
    VulkanResult,
};

/// Format preferred whenever the surface allows it
pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::R8G8B8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Raw surface data reported by the driver for one physical device
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    /// Image count, extent and transform limits
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported format / color space pairs
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

/// Resolved swapchain parameters; recomputed for every swapchain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainConfig {
    /// Image format and color space
    pub surface_format: vk::SurfaceFormatKHR,
    /// Presentation policy
    pub present_mode: vk::PresentModeKHR,
    /// Image size
    pub extent: vk::Extent2D,
    /// Minimum number of swapchain images requested
    pub image_count: u32,
}

/// Swapchain support data before and after negotiation
#[derive(Debug, Clone)]
pub enum SwapchainSupport {
    /// Raw capabilities, formats and present modes only
    Queried(SurfaceSupport),
    /// Raw data plus the chosen configuration
    Resolved {
        /// Raw data the configuration was derived from
        support: SurfaceSupport,
        /// Negotiated configuration
        config: SwapchainConfig,
    },
}

impl SwapchainSupport {
    /// Raw data, regardless of state
    pub fn support(&self) -> &SurfaceSupport {
        match self {
            Self::Queried(support) | Self::Resolved { support, .. } => support,
        }
    }

    /// Configuration, only once resolved
    pub fn config(&self) -> Option<&SwapchainConfig> {
        match self {
            Self::Queried(_) => None,
            Self::Resolved { config, .. } => Some(config),
        }
    }

    /// Split a resolved value into its raw data and configuration
    pub fn into_resolved(self) -> Option<(SurfaceSupport, SwapchainConfig)> {
        match self {
            Self::Queried(_) => None,
            Self::Resolved { support, config } => Some((support, config)),
        }
    }

    /// Apply the selection policy against the live drawable size
    ///
    /// Resolving an already resolved value recomputes the configuration.
    pub fn resolve(self, drawable_size: (u32, u32)) -> VulkanResult<Self> {
        let support = match self {
            Self::Queried(support) | Self::Resolved { support, .. } => support,
        };

        let surface_format = choose_surface_format(&support.formats).ok_or_else(|| {
            VulkanError::UnsupportedCapability("surface reports no formats".to_string())
        })?;
        if support.present_modes.is_empty() {
            return Err(VulkanError::UnsupportedCapability(
                "surface reports no present modes".to_string(),
            ));
        }

        let config = SwapchainConfig {
            surface_format,
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(&support.capabilities, drawable_size),
            image_count: choose_image_count(&support.capabilities),
        };

        Ok(Self::Resolved { support, config })
    }
}

/// Pick the surface format
///
/// A single `UNDEFINED` entry means any format is accepted. Otherwise the
/// preferred pair is used when listed, else the first reported entry.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    if let [only] = formats {
        if only.format == vk::Format::UNDEFINED {
            return Some(PREFERRED_SURFACE_FORMAT);
        }
    }

    formats
        .iter()
        .find(|candidate| {
            candidate.format == PREFERRED_SURFACE_FORMAT.format
                && candidate.color_space == PREFERRED_SURFACE_FORMAT.color_space
        })
        .or_else(|| formats.first())
        .copied()
}

/// Mailbox when available, otherwise FIFO (always supported)
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    present_modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Surface extent, or the drawable size clamped to the surface limits when the
/// surface reports the `u32::MAX` sentinel width
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, drawable_size: (u32, u32)) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let (width, height) = drawable_size;
    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    vk::Extent2D {
        width: width.max(min.width).min(max.width),
        height: height.max(min.height).min(max.height),
    }
}

/// One image above the minimum, capped by the maximum when it is non-zero
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

/// Image sharing between the graphics and present families
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharingConfig {
    /// Exclusive or concurrent
    pub mode: vk::SharingMode,
    /// Families listed for concurrent sharing; empty when exclusive
    pub queue_family_indices: Vec<u32>,
}

impl SharingConfig {
    /// Exclusive when one family does both, concurrent across the two otherwise
    pub fn for_families(families: QueueFamilies) -> Self {
        if families.is_shared() {
            Self {
                mode: vk::SharingMode::EXCLUSIVE,
                queue_family_indices: Vec::new(),
            }
        } else {
            Self {
                mode: vk::SharingMode::CONCURRENT,
                queue_family_indices: vec![families.graphics, families.present],
            }
        }
    }
}

/// Created swapchain with one view per image
///
/// The swapchain and its views are destroyed by the teardown stack.
pub struct Swapchain {
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    support: SurfaceSupport,
    config: SwapchainConfig,
}

impl Swapchain {
    /// Negotiate a configuration and create the swapchain and its image views
    pub fn new(
        device: &LogicalDevice,
        surface: &Surface,
        physical_device: &PhysicalDeviceInfo,
        drawable_size: (u32, u32),
        teardown: &mut TeardownStack,
    ) -> VulkanResult<Self> {
        let (support, config) = SwapchainSupport::Queried(surface.support(physical_device.device)?)
            .resolve(drawable_size)?
            .into_resolved()
            .ok_or_else(|| {
                VulkanError::UnsupportedCapability("swapchain configuration unresolved".to_string())
            })?;

        let sharing = SharingConfig::for_families(device.queue_families);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.handle())
            .min_image_count(config.image_count)
            .image_format(config.surface_format.format)
            .image_color_space(config.surface_format.color_space)
            .image_extent(config.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing.mode)
            .queue_family_indices(&sharing.queue_family_indices)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(config.present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let loader = &device.swapchain_loader;
        let swapchain = unsafe {
            loader
                .create_swapchain(&create_info, None)
                .map_err(VulkanError::api("vkCreateSwapchainKHR"))?
        };
        {
            let loader = loader.clone();
            teardown.push(Stage::Swapchain, "swapchain", move || unsafe {
                loader.destroy_swapchain(swapchain, None);
            });
        }

        let images = unsafe {
            loader
                .get_swapchain_images(swapchain)
                .map_err(VulkanError::api("vkGetSwapchainImagesKHR"))?
        };

        let mut image_views = Vec::with_capacity(images.len());
        for &image in &images {
            let create_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(config.surface_format.format)
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

            let view = unsafe {
                device
                    .device
                    .create_image_view(&create_info, None)
                    .map_err(VulkanError::api("vkCreateImageView"))?
            };
            let owner = device.device.clone();
            teardown.push(Stage::Swapchain, "swapchain image view", move || unsafe {
                owner.destroy_image_view(view, None);
            });
            image_views.push(view);
        }

        log::info!(
            "Swapchain created: {} images ({} requested), {}x{}, {:?}/{:?}, {:?}, {:?} sharing",
            images.len(),
            config.image_count,
            config.extent.width,
            config.extent.height,
            config.surface_format.format,
            config.surface_format.color_space,
            config.present_mode,
            sharing.mode
        );

        Ok(Self {
            swapchain,
            images,
            image_views,
            support,
            config,
        })
    }

    /// Get the swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Presentable images in driver order
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// One view per image, same order as [`Self::images`]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Negotiated configuration
    pub fn config(&self) -> SwapchainConfig {
        self.config
    }

    /// Raw surface data the swapchain was negotiated from
    pub fn support(&self) -> &SurfaceSupport {
        &self.support
    }
}

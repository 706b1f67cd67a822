//! Framebuffers, one per swapchain image view

use ash::{vk, Device};

use crate::render::backends::vulkan::{RenderPass, Stage, TeardownStack, VulkanError, VulkanResult};

/// Framebuffers in swapchain image order
#[derive(Debug, Clone, Default)]
pub struct Framebuffers {
    framebuffers: Vec<vk::Framebuffer>,
}

impl Framebuffers {
    /// Create a single-attachment framebuffer for every image view
    pub fn new(
        device: &Device,
        render_pass: &RenderPass,
        image_views: &[vk::ImageView],
        extent: vk::Extent2D,
        teardown: &mut TeardownStack,
    ) -> VulkanResult<Self> {
        let mut framebuffers = Vec::with_capacity(image_views.len());

        for &view in image_views {
            let attachments = [view];
            let create_info = vk::FramebufferCreateInfo::builder()
                .render_pass(render_pass.handle())
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            let framebuffer = unsafe {
                device
                    .create_framebuffer(&create_info, None)
                    .map_err(VulkanError::api("vkCreateFramebuffer"))?
            };
            let owner = device.clone();
            teardown.push(Stage::Framebuffers, "framebuffer", move || unsafe {
                owner.destroy_framebuffer(framebuffer, None);
            });
            framebuffers.push(framebuffer);
        }

        log::debug!("Created {} framebuffers", framebuffers.len());
        Ok(Self { framebuffers })
    }

    /// Handles in swapchain image order
    pub fn handles(&self) -> &[vk::Framebuffer] {
        &self.framebuffers
    }

    /// Number of framebuffers
    pub fn len(&self) -> usize {
        self.framebuffers.len()
    }

    /// True when no framebuffer exists
    pub fn is_empty(&self) -> bool {
        self.framebuffers.is_empty()
    }
}

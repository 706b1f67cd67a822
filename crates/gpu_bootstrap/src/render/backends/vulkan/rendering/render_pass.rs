//! Render pass creation
//!
//! A single color attachment cleared on load and left in present layout, with
//! explicit dependencies guarding both layout transitions.

use ash::{vk, Device};

use crate::render::backends::vulkan::{Stage, TeardownStack, VulkanError, VulkanResult};

/// The two external dependencies of the single subpass
///
/// The first keeps color writes from starting before the acquired image is
/// available. The second keeps presentation from reading the image before the
/// color writes have landed.
pub fn subpass_dependencies() -> [vk::SubpassDependency; 2] {
    let color_access = vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE;

    [
        vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::MEMORY_READ)
            .dst_access_mask(color_access)
            .build(),
        vk::SubpassDependency::builder()
            .src_subpass(0)
            .dst_subpass(vk::SUBPASS_EXTERNAL)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
            .src_access_mask(color_access)
            .dst_access_mask(vk::AccessFlags::MEMORY_READ)
            .build(),
    ]
}

/// Color attachment in the negotiated surface format
pub fn color_attachment(color_format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription::builder()
        .format(color_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .build()
}

/// Render pass handle; destruction is registered on the teardown stack
#[derive(Debug, Clone, Copy)]
pub struct RenderPass {
    render_pass: vk::RenderPass,
}

impl RenderPass {
    /// Create the presentation render pass for `color_format`
    pub fn new(device: &Device, color_format: vk::Format, teardown: &mut TeardownStack) -> VulkanResult<Self> {
        let attachments = [color_attachment(color_format)];

        let color_attachment_refs = [vk::AttachmentReference::builder()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .build()];

        let subpasses = [vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_attachment_refs)
            .build()];

        let dependencies = subpass_dependencies();

        let render_pass_create_info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe {
            device
                .create_render_pass(&render_pass_create_info, None)
                .map_err(VulkanError::api("vkCreateRenderPass"))?
        };
        let owner = device.clone();
        teardown.push(Stage::RenderPass, "render pass", move || unsafe {
            owner.destroy_render_pass(render_pass, None);
        });

        log::info!("Render pass created for {:?}", color_format);
        Ok(Self { render_pass })
    }

    /// Get the render pass handle
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_dependency_waits_for_image_availability() {
        let [acquire, _] = subpass_dependencies();

        assert_eq!(acquire.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(acquire.dst_subpass, 0);
        assert_eq!(acquire.src_stage_mask, vk::PipelineStageFlags::BOTTOM_OF_PIPE);
        assert_eq!(acquire.src_access_mask, vk::AccessFlags::MEMORY_READ);
        assert_eq!(acquire.dst_stage_mask, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert!(acquire.dst_access_mask.contains(vk::AccessFlags::COLOR_ATTACHMENT_WRITE));
        assert!(acquire.dst_access_mask.contains(vk::AccessFlags::COLOR_ATTACHMENT_READ));
    }

    #[test]
    fn test_present_dependency_waits_for_color_writes() {
        let [_, present] = subpass_dependencies();

        assert_eq!(present.src_subpass, 0);
        assert_eq!(present.dst_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(present.src_stage_mask, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert!(present.src_access_mask.contains(vk::AccessFlags::COLOR_ATTACHMENT_WRITE));
        assert_eq!(present.dst_stage_mask, vk::PipelineStageFlags::BOTTOM_OF_PIPE);
        assert_eq!(present.dst_access_mask, vk::AccessFlags::MEMORY_READ);
    }

    #[test]
    fn test_color_attachment_transitions_to_present() {
        let attachment = color_attachment(vk::Format::R8G8B8A8_UNORM);

        assert_eq!(attachment.format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(attachment.samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(attachment.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(attachment.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(attachment.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }
}

//! Command pool and pre-recorded command buffers

use ash::{vk, Device};

use crate::render::backends::vulkan::{
    CommandSource, Framebuffers, GraphicsPipeline, RenderPass, Stage, TeardownStack, VulkanError,
    VulkanResult,
};

/// Background color every frame is cleared to
pub const CLEAR_COLOR: [f32; 4] = [0.5, 0.6, 0.4, 1.0];

/// Vertices drawn per frame; positions come from the vertex shader
pub const TRIANGLE_VERTEX_COUNT: u32 = 3;

/// Clear values for the single color attachment
pub fn clear_values() -> [vk::ClearValue; 1] {
    [vk::ClearValue {
        color: vk::ClearColorValue { float32: CLEAR_COLOR },
    }]
}

/// Command pool on the graphics family; destruction is registered on the teardown stack
#[derive(Debug, Clone, Copy)]
pub struct CommandPool {
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a new command pool
    pub fn new(device: &Device, queue_family_index: u32, teardown: &mut TeardownStack) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);

        let command_pool = unsafe {
            device
                .create_command_pool(&pool_create_info, None)
                .map_err(VulkanError::api("vkCreateCommandPool"))?
        };
        // Frees every buffer allocated from the pool
        let owner = device.clone();
        teardown.push(Stage::Commands, "command pool", move || unsafe {
            owner.destroy_command_pool(command_pool, None);
        });

        Ok(Self { command_pool })
    }

    /// Allocate primary command buffers
    pub fn allocate_command_buffers(&self, device: &Device, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe {
            device
                .allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::api("vkAllocateCommandBuffers"))
        }
    }

    /// Get the command pool handle
    pub fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }
}

/// One command buffer per swapchain image, recorded once at startup
#[derive(Debug, Clone, Default)]
pub struct PrerecordedCommands {
    command_buffers: Vec<vk::CommandBuffer>,
}

impl PrerecordedCommands {
    /// Record the clear-and-draw pass for every framebuffer
    pub fn record(
        device: &Device,
        pool: &CommandPool,
        render_pass: &RenderPass,
        pipeline: &GraphicsPipeline,
        framebuffers: &Framebuffers,
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let count = u32::try_from(framebuffers.len()).map_err(|_| VulkanError::Initialization {
            call: "vkAllocateCommandBuffers",
            result: vk::Result::ERROR_TOO_MANY_OBJECTS,
        })?;
        let command_buffers = pool.allocate_command_buffers(device, count)?;
        let clear_values = clear_values();

        for (&command_buffer, &framebuffer) in command_buffers.iter().zip(framebuffers.handles()) {
            let begin_info = vk::CommandBufferBeginInfo::builder()
                .flags(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE);

            let render_pass_info = vk::RenderPassBeginInfo::builder()
                .render_pass(render_pass.handle())
                .framebuffer(framebuffer)
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                })
                .clear_values(&clear_values);

            unsafe {
                device
                    .begin_command_buffer(command_buffer, &begin_info)
                    .map_err(VulkanError::api("vkBeginCommandBuffer"))?;
                device.cmd_begin_render_pass(command_buffer, &render_pass_info, vk::SubpassContents::INLINE);
                device.cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, pipeline.handle());
                device.cmd_draw(command_buffer, TRIANGLE_VERTEX_COUNT, 1, 0, 0);
                device.cmd_end_render_pass(command_buffer);
                device
                    .end_command_buffer(command_buffer)
                    .map_err(VulkanError::api("vkEndCommandBuffer"))?;
            }
        }

        log::info!("Recorded {} command buffers", command_buffers.len());
        Ok(Self { command_buffers })
    }

    /// Recorded buffers in swapchain image order
    pub fn handles(&self) -> &[vk::CommandBuffer] {
        &self.command_buffers
    }
}

impl CommandSource for PrerecordedCommands {
    fn command_buffer(&self, image_index: u32) -> VulkanResult<vk::CommandBuffer> {
        self.command_buffers
            .get(image_index as usize)
            .copied()
            .ok_or_else(|| {
                VulkanError::UnsupportedCapability(format!(
                    "no command buffer recorded for swapchain image {} ({} recorded)",
                    image_index,
                    self.command_buffers.len()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_clear_color() {
        let [clear] = clear_values();
        let color = unsafe { clear.color.float32 };
        assert_eq!(color, [0.5, 0.6, 0.4, 1.0]);
    }

    #[test]
    fn test_command_buffer_lookup_by_image_index() {
        let commands = PrerecordedCommands {
            command_buffers: vec![vk::CommandBuffer::from_raw(7), vk::CommandBuffer::from_raw(8)],
        };

        assert_eq!(commands.command_buffer(1).unwrap().as_raw(), 8);
        assert_eq!(commands.command_buffer(0).unwrap().as_raw(), 7);
        assert!(commands.command_buffer(2).is_err());
    }
}

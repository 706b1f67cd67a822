//! Shader loading and graphics pipeline creation
//!
//! Bytecode comes from a [`ShaderSource`] and is consumed verbatim. Shader
//! modules only live for the duration of pipeline creation.

use ash::{vk, Device};
use std::io::Cursor;
use std::path::Path;

use crate::render::backends::vulkan::{
    c_string, RenderPass, Stage, TeardownStack, VulkanError, VulkanResult,
};

/// First word of every SPIR-V module
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Supplies precompiled SPIR-V bytecode
pub trait ShaderSource {
    /// Load the module at `path` as 32-bit words
    fn load(&self, path: &str) -> VulkanResult<Vec<u32>>;
}

/// Reads SPIR-V files from disk
#[derive(Debug, Default, Clone, Copy)]
pub struct SpirvFileLoader;

impl SpirvFileLoader {
    /// Decode SPIR-V bytes into words, rejecting empty or malformed input
    pub fn decode(path: &str, bytes: &[u8]) -> VulkanResult<Vec<u32>> {
        let load_error = |reason: String| VulkanError::ShaderLoad {
            path: path.to_string(),
            reason,
        };

        if bytes.is_empty() {
            return Err(load_error("file is empty".to_string()));
        }

        let words = ash::util::read_spv(&mut Cursor::new(bytes)).map_err(|e| load_error(e.to_string()))?;
        match words.first() {
            Some(&SPIRV_MAGIC) => Ok(words),
            Some(&word) => Err(load_error(format!("bad magic number {:#010x}", word))),
            None => Err(load_error("no SPIR-V words".to_string())),
        }
    }
}

impl ShaderSource for SpirvFileLoader {
    fn load(&self, path: &str) -> VulkanResult<Vec<u32>> {
        if !Path::new(path).exists() {
            return Err(VulkanError::ShaderLoad {
                path: path.to_string(),
                reason: "file not found".to_string(),
            });
        }

        let bytes = std::fs::read(path).map_err(|e| VulkanError::ShaderLoad {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        let words = Self::decode(path, &bytes)?;
        log::debug!("Loaded shader {} ({} words)", path, words.len());
        Ok(words)
    }
}

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create shader module from SPIR-V words
    pub fn from_words(device: &Device, words: &[u32]) -> VulkanResult<Self> {
        let create_info = vk::ShaderModuleCreateInfo::builder().code(words);

        let module = unsafe {
            device
                .create_shader_module(&create_info, None)
                .map_err(VulkanError::api("vkCreateShaderModule"))?
        };

        Ok(Self {
            device: device.clone(),
            module,
        })
    }

    /// Get shader module handle
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// Create shader stage create info
    pub fn create_stage_info(&self, stage: vk::ShaderStageFlags, entry_point: &std::ffi::CStr) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(stage)
            .module(self.module)
            .name(entry_point)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

/// Standard alpha-over blending on every color channel
pub fn alpha_blend_attachment() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::builder()
        .blend_enable(true)
        .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
        .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::ONE)
        .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
        .alpha_blend_op(vk::BlendOp::ADD)
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .build()
}

/// Full-extent viewport with a [0, 1] depth range
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport::builder()
        .x(0.0)
        .y(0.0)
        .width(extent.width as f32)
        .height(extent.height as f32)
        .min_depth(0.0)
        .max_depth(1.0)
        .build()
}

/// Graphics pipeline and its layout; destruction is registered on the teardown stack
#[derive(Debug, Clone, Copy)]
pub struct GraphicsPipeline {
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    /// Create the fixed-function pipeline for `render_pass` at `extent`
    pub fn new(
        device: &Device,
        render_pass: &RenderPass,
        extent: vk::Extent2D,
        vertex_words: &[u32],
        fragment_words: &[u32],
        teardown: &mut TeardownStack,
    ) -> VulkanResult<Self> {
        let vertex_shader = ShaderModule::from_words(device, vertex_words)?;
        let fragment_shader = ShaderModule::from_words(device, fragment_words)?;
        let entry_point = c_string("entry point", "main")?;

        let shader_stages = [
            vertex_shader.create_stage_info(vk::ShaderStageFlags::VERTEX, &entry_point),
            fragment_shader.create_stage_info(vk::ShaderStageFlags::FRAGMENT, &entry_point),
        ];

        // Vertices are generated in the vertex shader
        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder();

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewports = [full_viewport(extent)];
        let scissors = [vk::Rect2D::builder()
            .offset(vk::Offset2D { x: 0, y: 0 })
            .extent(extent)
            .build()];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .min_sample_shading(1.0);

        let color_blend_attachments = [alpha_blend_attachment()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(&color_blend_attachments);

        // No descriptor sets or push constants yet
        let layout_info = vk::PipelineLayoutCreateInfo::builder();
        let layout = unsafe {
            device
                .create_pipeline_layout(&layout_info, None)
                .map_err(VulkanError::api("vkCreatePipelineLayout"))?
        };
        {
            let owner = device.clone();
            teardown.push(Stage::Pipeline, "pipeline layout", move || unsafe {
                owner.destroy_pipeline_layout(layout, None);
            });
        }

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .layout(layout)
            .render_pass(render_pass.handle())
            .subpass(0);

        let pipelines = unsafe {
            device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
                .map_err(|(_, err)| VulkanError::from_vk("vkCreateGraphicsPipelines", err))?
        };
        let pipeline = pipelines.first().copied().ok_or(VulkanError::Initialization {
            call: "vkCreateGraphicsPipelines",
            result: vk::Result::ERROR_UNKNOWN,
        })?;
        {
            let owner = device.clone();
            teardown.push(Stage::Pipeline, "graphics pipeline", move || unsafe {
                owner.destroy_pipeline(pipeline, None);
            });
        }

        log::info!("Graphics pipeline created ({}x{})", extent.width, extent.height);
        Ok(Self { pipeline, layout })
    }

    /// Get pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Get layout handle
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

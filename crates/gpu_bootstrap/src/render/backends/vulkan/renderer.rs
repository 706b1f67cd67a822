//! Vulkan renderer: staged bootstrap, per-frame drawing and swapchain recreation
//!
//! Construction runs every stage in dependency order through [`Bootstrap`]:
//! context, surface, device selection, logical device, then the
//! swapchain-dependent resources. The teardown stack collected on the way is
//! owned by the renderer and unwound on drop once the device is idle.
//!
//! Swapchain-dependent resources are registered above a checkpoint recorded
//! right after the logical device, so [`VulkanRenderer::recreate_swapchain`]
//! can destroy and rebuild exactly that part.

use ash::vk;

use crate::core::config::{ShaderConfig, VulkanRendererConfig};
use crate::render::backends::vulkan::*;
use crate::render::window::SurfaceProvider;
use crate::render::RenderBackend;

/// Swapchain-dependent state used per frame
///
/// The render pass, pipeline and framebuffers live only on the teardown stack;
/// the recorded command buffers reference them.
struct SwapchainResources {
    swapchain: Swapchain,
    commands: PrerecordedCommands,
    sync: FrameSynchronizer,
}

impl SwapchainResources {
    fn build(
        bootstrap: &mut Bootstrap,
        device: &LogicalDevice,
        surface: &Surface,
        physical_device: &PhysicalDeviceInfo,
        drawable_size: (u32, u32),
        shaders: &ShaderConfig,
        shader_source: &dyn ShaderSource,
    ) -> Result<Self, BootstrapError> {
        let swapchain = bootstrap.step(Stage::Swapchain, |t| {
            Swapchain::new(device, surface, physical_device, drawable_size, t)
        })?;
        let config = swapchain.config();

        let render_pass = bootstrap.step(Stage::RenderPass, |t| {
            RenderPass::new(&device.device, config.surface_format.format, t)
        })?;

        let pipeline = bootstrap.step(Stage::Pipeline, |t| {
            let vertex = shader_source.load(&shaders.vertex_shader_path)?;
            let fragment = shader_source.load(&shaders.fragment_shader_path)?;
            GraphicsPipeline::new(&device.device, &render_pass, config.extent, &vertex, &fragment, t)
        })?;

        let framebuffers = bootstrap.step(Stage::Framebuffers, |t| {
            Framebuffers::new(&device.device, &render_pass, swapchain.image_views(), config.extent, t)
        })?;

        let commands = bootstrap.step(Stage::Commands, |t| {
            let pool = CommandPool::new(&device.device, device.queue_families.graphics, t)?;
            PrerecordedCommands::record(&device.device, &pool, &render_pass, &pipeline, &framebuffers, config.extent)
        })?;

        let sync = bootstrap.step(Stage::FrameSync, |t| {
            FrameSlot::create_ring(&device.device, MAX_FRAMES_IN_FLIGHT, t).map(FrameSynchronizer::new)
        })?;

        Ok(Self {
            swapchain,
            commands,
            sync,
        })
    }
}

/// Vulkan renderer owning every object created during bootstrap
pub struct VulkanRenderer {
    teardown: TeardownStack,
    swapchain_checkpoint: usize,
    context: VulkanInstance,
    surface: Surface,
    physical_device: PhysicalDeviceInfo,
    device: LogicalDevice,
    shaders: ShaderConfig,
    shader_source: Box<dyn ShaderSource>,
    frame: Option<SwapchainResources>,
}

impl VulkanRenderer {
    /// Bootstrap against `window`, loading shaders from disk
    pub fn new(window: &dyn SurfaceProvider, config: &VulkanRendererConfig) -> Result<Self, BootstrapError> {
        Self::with_shader_source(window, config, Box::new(SpirvFileLoader))
    }

    /// Bootstrap against `window` with a custom shader source
    ///
    /// On failure every object created so far has been destroyed in reverse
    /// creation order and the error names the failing stage.
    pub fn with_shader_source(
        window: &dyn SurfaceProvider,
        config: &VulkanRendererConfig,
        shader_source: Box<dyn ShaderSource>,
    ) -> Result<Self, BootstrapError> {
        let mut bootstrap = Bootstrap::new();
        let device_extensions = required_device_extensions();

        let context = bootstrap.step(Stage::Context, |t| {
            let window_extensions = window.required_instance_extensions()?;
            VulkanInstance::new(config, &window_extensions, t)
        })?;

        let surface = bootstrap.step(Stage::Surface, |t| Surface::new(&context, window, t))?;

        let physical_device = bootstrap.step(Stage::DeviceSelection, |_| {
            let probe = InstanceProbe::new(&context.instance, &surface);
            PhysicalDeviceInfo::select_suitable_device(&probe, &device_extensions)
        })?;

        let device = bootstrap.step(Stage::LogicalDevice, |t| {
            LogicalDevice::new(&context.instance, &physical_device, &device_extensions, t)
        })?;

        let swapchain_checkpoint = bootstrap.depth();
        let frame = SwapchainResources::build(
            &mut bootstrap,
            &device,
            &surface,
            &physical_device,
            window.current_drawable_size(),
            &config.shaders,
            shader_source.as_ref(),
        )?;

        let teardown = bootstrap.finish();
        log::info!(
            "Vulkan renderer ready on {} ({} objects registered for teardown)",
            physical_device.name,
            teardown.depth()
        );

        Ok(Self {
            teardown,
            swapchain_checkpoint,
            context,
            surface,
            physical_device,
            device,
            shaders: config.shaders.clone(),
            shader_source,
            frame: Some(frame),
        })
    }

    /// Selected GPU
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    /// Whether diagnostic messages are being forwarded
    pub fn has_validation(&self) -> bool {
        self.context.has_validation()
    }

    /// Configuration of the current swapchain, if one exists
    pub fn swapchain_config(&self) -> Option<SwapchainConfig> {
        self.frame.as_ref().map(|frame| frame.swapchain.config())
    }

    /// True while the device and its objects exist
    pub fn is_alive(&self) -> bool {
        !self.teardown.is_empty()
    }

    /// Wait for the device, destroy the swapchain-dependent resources and build them again
    ///
    /// A new configuration is negotiated from the current drawable size and the
    /// frame ring restarts at slot 0. If rebuilding fails the whole renderer is
    /// torn down and later calls to [`Self::draw_frame`] fail.
    pub fn recreate_swapchain(&mut self, window: &dyn SurfaceProvider) -> Result<(), BootstrapError> {
        if !self.is_alive() {
            return Err(BootstrapError {
                stage: Stage::Swapchain,
                source: device_gone(),
            });
        }
        self.device.wait_idle().map_err(|source| BootstrapError {
            stage: Stage::Swapchain,
            source,
        })?;

        self.frame = None;
        let mut teardown = std::mem::take(&mut self.teardown);
        teardown.unwind_to(self.swapchain_checkpoint);
        log::info!("Recreating swapchain");

        let mut bootstrap = Bootstrap::resume(teardown);
        let rebuilt = SwapchainResources::build(
            &mut bootstrap,
            &self.device,
            &self.surface,
            &self.physical_device,
            window.current_drawable_size(),
            &self.shaders,
            self.shader_source.as_ref(),
        );
        self.teardown = bootstrap.finish();

        self.frame = Some(rebuilt?);
        Ok(())
    }

    /// Draw one frame with the current slot
    pub fn draw_frame(&mut self) -> VulkanResult<FrameReport> {
        let frame = self.frame.as_mut().ok_or_else(device_gone)?;

        let mut queue = DeviceFrameQueue::new(
            &self.device.device,
            &self.device.swapchain_loader,
            frame.swapchain.handle(),
            self.device.graphics_queue,
            self.device.present_queue,
        );
        frame.sync.draw_frame(&mut queue, &frame.commands)
    }
}

fn device_gone() -> VulkanError {
    VulkanError::from_vk("draw", vk::Result::ERROR_DEVICE_LOST)
}

impl RenderBackend for VulkanRenderer {
    type Error = VulkanError;

    fn draw(&mut self) -> VulkanResult<()> {
        self.draw_frame().map(|_| ())
    }

    fn wait_idle(&self) -> VulkanResult<()> {
        if self.is_alive() {
            self.device.wait_idle()
        } else {
            Ok(())
        }
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        if !self.is_alive() {
            return;
        }
        if let Err(e) = self.device.wait_idle() {
            log::error!("Failed to wait for device idle before teardown: {}", e);
        }
        self.frame = None;
        self.teardown.unwind();
        log::info!("Vulkan renderer destroyed");
    }
}

//! Vulkan backend implementation
//!
//! Organized into initialization, rendering and state modules, driven in
//! order by the staged [`bootstrap`] sequence.

/// Staged creation with reverse-order teardown
pub mod bootstrap;

/// Vulkan initialization types (context, surface, devices, window)
pub mod initialization;

/// Vulkan rendering objects (render pass, shaders, pipeline, commands)
pub mod rendering;

/// Vulkan state management (swapchain, framebuffers, frame synchronization)
pub mod state;

/// Main Vulkan renderer implementation
pub mod renderer;

/// Number of frames the CPU may record ahead of the GPU
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

pub use bootstrap::{Bootstrap, BootstrapError, Stage, TeardownStack};
pub use initialization::*;
pub use renderer::VulkanRenderer;
pub use rendering::*;
pub use state::*;

//! # Rendering System
//!
//! The window abstraction the renderer draws into, the renderer capability
//! trait used by the engine loop, and the Vulkan backend implementing both
//! sides of the bootstrap.

pub mod window;

/// Graphics backend implementations
pub mod backends;

pub use backends::vulkan::{VulkanError, VulkanRenderer, VulkanResult};
pub use window::{SurfaceProvider, WindowOptions};

/// What the engine loop needs from a renderer
pub trait RenderBackend {
    /// Backend error type
    type Error: std::error::Error + 'static;

    /// Render and present one frame
    fn draw(&mut self) -> Result<(), Self::Error>;

    /// Block until all submitted GPU work has finished
    fn wait_idle(&self) -> Result<(), Self::Error>;
}

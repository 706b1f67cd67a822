//! Backend-agnostic surface provider trait
//!
//! The renderer never creates or destroys the native window. It only asks the
//! provider for instance extensions, a surface, and the live drawable size.

use ash::vk;
use bitflags::bitflags;

use crate::render::backends::vulkan::WindowError;

bitflags! {
    /// Window creation options
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WindowOptions: u32 {
        /// The user may resize the window
        const RESIZABLE = 1 << 0;
        /// Center the window on the primary monitor
        const CENTERED = 1 << 1;
    }
}

/// Native window plus its drawable surface
///
/// Window operations must happen on the main thread, so no `Send` bound.
pub trait SurfaceProvider {
    /// True once the user or the application asked the window to close
    fn should_close(&self) -> bool;

    /// Process pending window system events
    fn poll_events(&mut self);

    /// Current drawable size in pixels
    fn current_drawable_size(&self) -> (u32, u32);

    /// Instance extensions the window system needs for surface creation
    fn required_instance_extensions(&self) -> Result<Vec<String>, WindowError>;

    /// Create a presentable surface for `instance`
    ///
    /// The caller owns the returned surface and destroys it before the instance.
    fn create_surface(&self, instance: &ash::Instance) -> Result<vk::SurfaceKHR, WindowError>;
}

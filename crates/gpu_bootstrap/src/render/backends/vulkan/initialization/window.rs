//! Window management using GLFW
//!
//! Provides the surface provider used by the Vulkan renderer.

use ash::vk;
use thiserror::Error;

use crate::core::config::WindowConfig;
use crate::render::window::{SurfaceProvider, WindowOptions};

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// GLFW could not be initialized
    #[error("GLFW initialization failed: {0}")]
    InitializationFailed(String),

    /// The native window could not be created
    #[error("Window creation failed ({width}x{height} '{title}')")]
    CreationFailed {
        /// Requested title
        title: String,
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
    },

    /// The platform has no usable Vulkan loader
    #[error("Vulkan is not supported by the window system")]
    VulkanUnsupported,

    /// The window system did not report its instance extensions
    #[error("Failed to query required instance extensions")]
    MissingExtensions,

    /// Surface creation failed
    #[error("Failed to create window surface: {0:?}")]
    SurfaceCreation(vk::Result),
}

/// Result type for window operations
pub type WindowResult<T> = Result<T, WindowError>;

/// GLFW window configured for Vulkan (no client API)
///
/// The window is created hidden; call [`GlfwWindow::show`] once rendering is ready.
pub struct GlfwWindow {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    _events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
}

impl GlfwWindow {
    /// Create a hidden window from the configuration
    pub fn new(config: &WindowConfig) -> WindowResult<Self> {
        Self::with_options(&config.title, config.width, config.height, config.options())
    }

    /// Create a hidden window with explicit options
    pub fn with_options(title: &str, width: u32, height: u32, options: WindowOptions) -> WindowResult<Self> {
        let mut glfw = glfw::init(glfw::fail_on_errors)
            .map_err(|e| WindowError::InitializationFailed(format!("{:?}", e)))?;

        if !glfw.vulkan_supported() {
            return Err(WindowError::VulkanUnsupported);
        }

        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(options.contains(WindowOptions::RESIZABLE)));
        glfw.window_hint(glfw::WindowHint::Visible(false));

        let (mut window, events) = glfw
            .create_window(width, height, title, glfw::WindowMode::Windowed)
            .ok_or_else(|| WindowError::CreationFailed {
                title: title.to_string(),
                width,
                height,
            })?;

        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);

        if options.contains(WindowOptions::CENTERED) {
            let video_mode = glfw.with_primary_monitor(|_, monitor| monitor.and_then(|m| m.get_video_mode()));
            match video_mode {
                Some(mode) => {
                    let (x, y) = centered_position((mode.width, mode.height), (width, height));
                    window.set_pos(x, y);
                }
                None => log::warn!("No primary monitor video mode, window left at default position"),
            }
        }

        log::info!("Created {}x{} window '{}'", width, height, title);
        Ok(Self {
            glfw,
            window,
            _events: events,
        })
    }

    /// Make the window visible
    pub fn show(&mut self) {
        self.window.show();
    }

    /// Request the window to close
    pub fn set_should_close(&mut self, should_close: bool) {
        self.window.set_should_close(should_close);
    }
}

/// Top-left position that centers a window of `window` size on a `screen`
pub fn centered_position(screen: (u32, u32), window: (u32, u32)) -> (i32, i32) {
    let offset = |screen: u32, window: u32| ((i64::from(screen) - i64::from(window)) / 2) as i32;
    (offset(screen.0, window.0), offset(screen.1, window.1))
}

impl SurfaceProvider for GlfwWindow {
    fn should_close(&self) -> bool {
        self.window.should_close()
    }

    fn poll_events(&mut self) {
        self.glfw.poll_events();
    }

    fn current_drawable_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (width.max(0) as u32, height.max(0) as u32)
    }

    fn required_instance_extensions(&self) -> WindowResult<Vec<String>> {
        self.glfw
            .get_required_instance_extensions()
            .ok_or(WindowError::MissingExtensions)
    }

    fn create_surface(&self, instance: &ash::Instance) -> WindowResult<vk::SurfaceKHR> {
        let mut surface = vk::SurfaceKHR::null();
        let result = self
            .window
            .create_window_surface(instance.handle(), std::ptr::null(), &mut surface);

        if result == vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(WindowError::SurfaceCreation(result))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centered_position() {
        assert_eq!(centered_position((1920, 1080), (800, 600)), (560, 240));
    }

    #[test]
    fn test_centered_position_window_larger_than_screen() {
        assert_eq!(centered_position((800, 600), (1000, 700)), (-100, -50));
    }
}

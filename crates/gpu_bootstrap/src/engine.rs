//! Top-level engine object
//!
//! One [`Engine`] owns the window and the renderer. It is built once by the
//! entry point; nothing global guards against a second instance.

use crate::core::config::ApplicationConfig;
use crate::render::backends::vulkan::{BootstrapError, GlfwWindow, Stage, VulkanError, VulkanRenderer};
use crate::render::window::SurfaceProvider;
use crate::render::RenderBackend;

/// Window plus renderer
///
/// Field order matters: the renderer drops first, so the surface is destroyed
/// while its window still exists.
pub struct Engine {
    renderer: VulkanRenderer,
    window: GlfwWindow,
}

impl Engine {
    /// Create the window, bootstrap the renderer against it, then show the window
    pub fn new(config: &ApplicationConfig) -> Result<Self, BootstrapError> {
        let mut window = GlfwWindow::new(&config.window).map_err(|e| {
            log::error!("{} failed: {}", Stage::Window, e);
            BootstrapError {
                stage: Stage::Window,
                source: e.into(),
            }
        })?;

        let renderer = VulkanRenderer::new(&window, &config.renderer)?;
        window.show();

        Ok(Self { renderer, window })
    }

    /// Poll and draw until the window closes, then wait for the GPU
    ///
    /// Any per-frame error ends the loop, including an out-of-date swapchain.
    /// Returns the number of frames drawn.
    pub fn run(&mut self) -> Result<u64, VulkanError> {
        run_loop(&mut self.window, &mut self.renderer)
    }

    /// Rebuild the swapchain for the window's current size
    pub fn recreate_swapchain(&mut self) -> Result<(), BootstrapError> {
        self.renderer.recreate_swapchain(&self.window)
    }

    /// The renderer
    pub fn renderer(&self) -> &VulkanRenderer {
        &self.renderer
    }
}

/// Drive `renderer` once per polled iteration of `window`
pub fn run_loop<W, R>(window: &mut W, renderer: &mut R) -> Result<u64, R::Error>
where
    W: SurfaceProvider + ?Sized,
    R: RenderBackend + ?Sized,
{
    let mut frames = 0u64;

    while !window.should_close() {
        window.poll_events();
        if let Err(e) = renderer.draw() {
            log::error!("Frame {} failed: {}", frames, e);
            return Err(e);
        }
        frames += 1;
    }

    renderer.wait_idle()?;
    log::info!("Render loop finished after {} frames", frames);
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::vulkan::WindowError;
    use ash::vk;

    struct ClosingWindow {
        polls_left: u32,
        polled: u32,
    }

    impl SurfaceProvider for ClosingWindow {
        fn should_close(&self) -> bool {
            self.polls_left == 0
        }

        fn poll_events(&mut self) {
            self.polls_left -= 1;
            self.polled += 1;
        }

        fn current_drawable_size(&self) -> (u32, u32) {
            (800, 600)
        }

        fn required_instance_extensions(&self) -> Result<Vec<String>, WindowError> {
            Ok(Vec::new())
        }

        fn create_surface(&self, _instance: &ash::Instance) -> Result<vk::SurfaceKHR, WindowError> {
            Err(WindowError::SurfaceCreation(vk::Result::ERROR_INITIALIZATION_FAILED))
        }
    }

    #[derive(Default)]
    struct CountingRenderer {
        draws: u32,
        fail_on: Option<u32>,
    }

    impl RenderBackend for CountingRenderer {
        type Error = VulkanError;

        fn draw(&mut self) -> Result<(), VulkanError> {
            if self.fail_on == Some(self.draws) {
                return Err(VulkanError::SurfaceOutOfDate);
            }
            self.draws += 1;
            Ok(())
        }

        fn wait_idle(&self) -> Result<(), VulkanError> {
            Ok(())
        }
    }

    #[test]
    fn test_loop_draws_once_per_poll() {
        let mut window = ClosingWindow { polls_left: 4, polled: 0 };
        let mut renderer = CountingRenderer::default();

        let frames = run_loop(&mut window, &mut renderer).unwrap();

        assert_eq!(frames, 4);
        assert_eq!(renderer.draws, 4);
        assert_eq!(window.polled, 4);
    }

    #[test]
    fn test_closed_window_draws_nothing() {
        let mut window = ClosingWindow { polls_left: 0, polled: 0 };
        let mut renderer = CountingRenderer::default();

        assert_eq!(run_loop(&mut window, &mut renderer).unwrap(), 0);
        assert_eq!(renderer.draws, 0);
    }

    #[test]
    fn test_frame_error_stops_loop() {
        let mut window = ClosingWindow { polls_left: 10, polled: 0 };
        let mut renderer = CountingRenderer {
            fail_on: Some(2),
            ..CountingRenderer::default()
        };

        let result = run_loop(&mut window, &mut renderer);

        assert!(matches!(result, Err(VulkanError::SurfaceOutOfDate)));
        assert_eq!(renderer.draws, 2);
        assert_eq!(window.polled, 3);
    }
}

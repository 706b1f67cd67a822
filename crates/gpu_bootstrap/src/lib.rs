//! # GPU Bootstrap
//!
//! Turns a bare window into a Vulkan pipeline that can draw frames with correct
//! CPU/GPU synchronization.
//!
//! ## Features
//!
//! - **Staged bootstrap**: instance, surface, device, swapchain, render pass,
//!   pipeline and frame synchronization built in dependency order
//! - **Rollback**: a failing stage destroys everything created before it in
//!   reverse creation order
//! - **Frames in flight**: fence-bounded ring of per-frame semaphores and fences
//! - **Configuration**: TOML or RON files with defaults for every field
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gpu_bootstrap::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ApplicationConfig::default();
//!     logging::init(&config.engine.log_level);
//!
//!     let mut engine = Engine::new(&config)?;
//!     engine.run()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

// Core engine modules
pub mod config;
pub mod core;
pub mod engine;
pub mod foundation;
pub mod render;

pub use engine::Engine;

/// Commonly used types for applications
pub mod prelude {
    pub use crate::config::{Config, ConfigError};
    pub use crate::core::config::{
        ApplicationConfig, EngineConfig, ShaderConfig, VulkanRendererConfig, WindowConfig,
    };
    pub use crate::engine::{run_loop, Engine};
    pub use crate::foundation::logging;
    pub use crate::render::backends::vulkan::{
        BootstrapError, Stage, VulkanError, VulkanRenderer, VulkanResult, MAX_FRAMES_IN_FLIGHT,
    };
    pub use crate::render::{RenderBackend, SurfaceProvider, WindowOptions};
}

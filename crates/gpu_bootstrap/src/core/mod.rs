//! Core engine types

pub mod config;

pub use config::{ApplicationConfig, EngineConfig, ShaderConfig, VulkanRendererConfig, WindowConfig};

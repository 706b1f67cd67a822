// Vulkan initialization components

pub mod context;
pub mod logical_device;
pub mod physical_device;
pub mod surface;
pub mod window;

pub use context::*;
pub use logical_device::*;
pub use physical_device::*;
pub use surface::*;
pub use window::*;

//! Window system abstraction consumed by the renderer

mod backend;

pub use backend::{SurfaceProvider, WindowOptions};

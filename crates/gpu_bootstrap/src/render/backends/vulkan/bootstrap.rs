//! Staged bootstrap with explicit reverse-order teardown
//!
//! Every creation step registers its destroy action on a [`TeardownStack`] only
//! after it succeeds. A failing step unwinds the whole stack before the error is
//! returned, so no partially built graphics state stays reachable. The same
//! stack is kept by the renderer for shutdown, which keeps the teardown order
//! auditable in one place.

use std::fmt;
use thiserror::Error;
use crate::render::backends::vulkan::VulkanError;

/// Bootstrap stages in creation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Native window creation (before any graphics object exists)
    Window,
    /// Instance and diagnostic messenger
    Context,
    /// Window surface
    Surface,
    /// Physical device and queue family selection
    DeviceSelection,
    /// Logical device and queue retrieval
    LogicalDevice,
    /// Swapchain negotiation, swapchain and image views
    Swapchain,
    /// Render pass with layout-transition dependencies
    RenderPass,
    /// Pipeline layout and graphics pipeline
    Pipeline,
    /// One framebuffer per swapchain image
    Framebuffers,
    /// Command pool and pre-recorded command buffers
    Commands,
    /// Per-frame semaphores and fences
    FrameSync,
}

impl Stage {
    /// Human readable stage name used in diagnostics
    pub fn name(self) -> &'static str {
        match self {
            Stage::Window => "window creation",
            Stage::Context => "context bootstrap",
            Stage::Surface => "surface creation",
            Stage::DeviceSelection => "device selection",
            Stage::LogicalDevice => "logical device creation",
            Stage::Swapchain => "swapchain creation",
            Stage::RenderPass => "render pass creation",
            Stage::Pipeline => "pipeline creation",
            Stage::Framebuffers => "framebuffer creation",
            Stage::Commands => "command recording",
            Stage::FrameSync => "frame synchronization setup",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Failure of a bootstrap stage, raised after everything created so far was destroyed
#[derive(Error, Debug)]
#[error("{stage} failed: {source}")]
pub struct BootstrapError {
    /// Stage that failed
    pub stage: Stage,
    /// Underlying error
    #[source]
    pub source: VulkanError,
}

struct TeardownEntry {
    stage: Stage,
    label: &'static str,
    action: Box<dyn FnOnce()>,
}

/// Ordered destroy actions for created graphics objects
///
/// Actions run strictly last-in first-out. Dropping the stack unwinds it.
#[derive(Default)]
pub struct TeardownStack {
    entries: Vec<TeardownEntry>,
}

impl TeardownStack {
    /// Create an empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the destroy action for an object that was just created
    pub fn push(&mut self, stage: Stage, label: &'static str, action: impl FnOnce() + 'static) {
        log::trace!("Registered teardown for {} ({})", label, stage);
        self.entries.push(TeardownEntry {
            stage,
            label,
            action: Box::new(action),
        });
    }

    /// Number of registered actions, usable as a checkpoint for [`Self::unwind_to`]
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Labels in creation order
    pub fn labels(&self) -> Vec<&'static str> {
        self.entries.iter().map(|entry| entry.label).collect()
    }

    /// Run every action registered above `depth`, newest first
    pub fn unwind_to(&mut self, depth: usize) {
        while self.entries.len() > depth {
            if let Some(entry) = self.entries.pop() {
                log::debug!("Destroying {} ({})", entry.label, entry.stage);
                (entry.action)();
            }
        }
    }

    /// Run every registered action, newest first
    pub fn unwind(&mut self) {
        self.unwind_to(0);
    }
}

impl Drop for TeardownStack {
    fn drop(&mut self) {
        self.unwind();
    }
}

/// Drives bootstrap stages in order against one teardown stack
pub struct Bootstrap {
    teardown: TeardownStack,
}

impl Bootstrap {
    /// Start a fresh bootstrap
    pub fn new() -> Self {
        Self::resume(TeardownStack::new())
    }

    /// Continue building on top of an existing stack (swapchain recreation)
    pub fn resume(teardown: TeardownStack) -> Self {
        Self { teardown }
    }

    /// Current stack depth
    pub fn depth(&self) -> usize {
        self.teardown.depth()
    }

    /// Run one stage; on failure unwind everything and report the stage
    pub fn step<T, F>(&mut self, stage: Stage, create: F) -> Result<T, BootstrapError>
    where
        F: FnOnce(&mut TeardownStack) -> Result<T, VulkanError>,
    {
        log::debug!("Starting {}", stage);
        match create(&mut self.teardown) {
            Ok(value) => Ok(value),
            Err(source) => {
                log::error!("{} failed: {}", stage, source);
                self.teardown.unwind();
                Err(BootstrapError { stage, source })
            }
        }
    }

    /// Hand the populated stack to its long-term owner
    pub fn finish(self) -> TeardownStack {
        self.teardown
    }
}

impl Default for Bootstrap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<&'static str>>>;

    fn record(log: &Log, label: &'static str) -> impl FnOnce() + 'static {
        let log = Rc::clone(log);
        move || log.borrow_mut().push(label)
    }

    #[test]
    fn test_unwind_runs_in_reverse_order() {
        let log: Log = Rc::default();
        let mut stack = TeardownStack::new();
        stack.push(Stage::Context, "instance", record(&log, "instance"));
        stack.push(Stage::Surface, "surface", record(&log, "surface"));
        stack.push(Stage::LogicalDevice, "device", record(&log, "device"));

        stack.unwind();

        assert_eq!(*log.borrow(), vec!["device", "surface", "instance"]);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_unwind_to_checkpoint_keeps_older_entries() {
        let log: Log = Rc::default();
        let mut stack = TeardownStack::new();
        stack.push(Stage::Context, "instance", record(&log, "instance"));
        stack.push(Stage::LogicalDevice, "device", record(&log, "device"));
        let checkpoint = stack.depth();
        stack.push(Stage::Swapchain, "swapchain", record(&log, "swapchain"));
        stack.push(Stage::RenderPass, "render pass", record(&log, "render pass"));

        stack.unwind_to(checkpoint);

        assert_eq!(*log.borrow(), vec!["render pass", "swapchain"]);
        assert_eq!(stack.labels(), vec!["instance", "device"]);
    }

    #[test]
    fn test_drop_unwinds_remaining_entries() {
        let log: Log = Rc::default();
        {
            let mut stack = TeardownStack::new();
            stack.push(Stage::Context, "instance", record(&log, "instance"));
            stack.push(Stage::Surface, "surface", record(&log, "surface"));
        }
        assert_eq!(*log.borrow(), vec!["surface", "instance"]);
    }

    #[test]
    fn test_failure_at_swapchain_rolls_back_in_reverse_creation_order() {
        let log: Log = Rc::default();
        let mut bootstrap = Bootstrap::new();

        bootstrap
            .step(Stage::Context, |t| {
                t.push(Stage::Context, "instance", record(&log, "instance"));
                Ok(())
            })
            .unwrap();
        bootstrap
            .step(Stage::Surface, |t| {
                t.push(Stage::Surface, "surface", record(&log, "surface"));
                Ok(())
            })
            .unwrap();
        bootstrap.step(Stage::DeviceSelection, |_| Ok(())).unwrap();
        bootstrap
            .step(Stage::LogicalDevice, |t| {
                t.push(Stage::LogicalDevice, "logical device", record(&log, "logical device"));
                Ok(())
            })
            .unwrap();

        let result: Result<(), BootstrapError> = bootstrap.step(Stage::Swapchain, |_| {
            Err(VulkanError::from_vk("vkCreateSwapchainKHR", vk::Result::ERROR_INITIALIZATION_FAILED))
        });

        let err = result.unwrap_err();
        assert_eq!(err.stage, Stage::Swapchain);
        assert!(matches!(err.source, VulkanError::Initialization { .. }));
        assert_eq!(*log.borrow(), vec!["logical device", "surface", "instance"]);
        assert_eq!(bootstrap.depth(), 0);

        // Nothing left for the final owner to destroy a second time
        let stack = bootstrap.finish();
        drop(stack);
        assert_eq!(log.borrow().len(), 3);
    }

    #[test]
    fn test_partial_step_registration_is_rolled_back() {
        let log: Log = Rc::default();
        let mut bootstrap = Bootstrap::new();
        bootstrap
            .step(Stage::Context, |t| {
                t.push(Stage::Context, "instance", record(&log, "instance"));
                Ok(())
            })
            .unwrap();

        let result: Result<(), _> = bootstrap.step(Stage::Context, |t| {
            t.push(Stage::Context, "debug messenger", record(&log, "debug messenger"));
            Err(VulkanError::UnsupportedCapability("layer".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(*log.borrow(), vec!["debug messenger", "instance"]);
    }

    #[test]
    fn test_error_message_names_stage() {
        let err = BootstrapError {
            stage: Stage::DeviceSelection,
            source: VulkanError::UnsupportedCapability("no suitable GPU".to_string()),
        };
        let message = err.to_string();
        assert!(message.starts_with("device selection failed"));
        assert!(message.contains("no suitable GPU"));
    }
}

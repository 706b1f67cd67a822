//! Per-frame synchronization objects
//!
//! Each slot owns the semaphores ordering acquire, render and present on the
//! GPU, and the fence the CPU waits on before reusing the slot.

use ash::{vk, Device};

use crate::render::backends::vulkan::{Stage, TeardownStack, VulkanError, VulkanResult};

/// Synchronization objects for one in-flight frame
#[derive(Debug, Clone, Copy)]
pub struct FrameSlot {
    /// Signaled by the presentation engine when the acquired image is usable
    pub image_available: vk::Semaphore,
    /// Signaled by the graphics queue when rendering to the image is done
    pub render_finished: vk::Semaphore,
    /// Signaled when the slot's submission completes; created signaled
    pub in_flight: vk::Fence,
}

impl FrameSlot {
    /// Create one slot and register its destruction
    pub fn new(device: &Device, teardown: &mut TeardownStack) -> VulkanResult<Self> {
        let image_available = create_semaphore(device, "image available semaphore", teardown)?;
        let render_finished = create_semaphore(device, "render finished semaphore", teardown)?;

        // Signaled so the first wait on a fresh slot returns immediately
        let create_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);
        let in_flight = unsafe {
            device
                .create_fence(&create_info, None)
                .map_err(VulkanError::api("vkCreateFence"))?
        };
        let owner = device.clone();
        teardown.push(Stage::FrameSync, "in-flight fence", move || unsafe {
            owner.destroy_fence(in_flight, None);
        });

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }

    /// Create `count` slots
    pub fn create_ring(device: &Device, count: usize, teardown: &mut TeardownStack) -> VulkanResult<Vec<Self>> {
        let slots = (0..count)
            .map(|_| Self::new(device, teardown))
            .collect::<VulkanResult<Vec<_>>>()?;
        log::info!("Created synchronization objects for {} frames in flight", count);
        Ok(slots)
    }
}

fn create_semaphore(device: &Device, label: &'static str, teardown: &mut TeardownStack) -> VulkanResult<vk::Semaphore> {
    let create_info = vk::SemaphoreCreateInfo::builder();
    let semaphore = unsafe {
        device
            .create_semaphore(&create_info, None)
            .map_err(VulkanError::api("vkCreateSemaphore"))?
    };
    let owner = device.clone();
    teardown.push(Stage::FrameSync, label, move || unsafe {
        owner.destroy_semaphore(semaphore, None);
    });
    Ok(semaphore)
}

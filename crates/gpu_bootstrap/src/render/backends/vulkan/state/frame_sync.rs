//! Per-frame acquire, submit and present protocol
//!
//! Every frame runs one slot of the ring through
//! `Idle -> WaitFence -> Acquiring -> Submitted -> Presenting -> Idle`.
//! The fence wait is the only point where the CPU blocks, and it bounds the
//! number of frames with outstanding GPU work to the ring length. Semaphores
//! order the GPU side only and are never waited on by the host.
//!
//! The ring index belongs to the caller and advances by one after every
//! successful frame. The image index comes from the driver and is unrelated.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

use crate::render::backends::vulkan::{FrameSlot, VulkanError, VulkanResult};

/// Ring of frame slot indices advancing modulo its length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRing {
    current: usize,
    len: usize,
}

impl FrameRing {
    /// Ring of `len` slots starting at slot 0; a zero length is treated as one
    pub fn new(len: usize) -> Self {
        Self {
            current: 0,
            len: len.max(1),
        }
    }

    /// Slot used by the next frame
    pub fn current(&self) -> usize {
        self.current
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false; a ring has at least one slot
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Move to the next slot
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.len;
    }

    /// Return to slot 0
    pub fn reset(&mut self) {
        self.current = 0;
    }
}

/// Where a frame slot is in the per-frame protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// No frame in progress on the host
    Idle,
    /// Blocking on the slot fence
    WaitFence,
    /// Requesting the next presentable image
    Acquiring,
    /// Command buffer submitted to the graphics queue
    Submitted,
    /// Present request queued
    Presenting,
}

/// Image handed out by the presentation engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredImage {
    /// Swapchain image index
    pub index: u32,
    /// The swapchain still works but no longer matches the surface exactly
    pub suboptimal: bool,
}

/// Queue-level operations used by one frame
///
/// Implemented over a live device; tests record the calls instead.
pub trait FrameQueue {
    /// Block until `fence` is signaled (no timeout)
    fn wait_for_fence(&mut self, fence: vk::Fence) -> VulkanResult<()>;

    /// Return `fence` to the unsignaled state
    fn reset_fence(&mut self, fence: vk::Fence) -> VulkanResult<()>;

    /// Acquire the next image, signaling `signal` once it is usable
    fn acquire_next_image(&mut self, signal: vk::Semaphore) -> VulkanResult<AcquiredImage>;

    /// Submit `command_buffer` to the graphics queue
    ///
    /// Waits on `wait` at color attachment output, signals `signal` and `fence`.
    fn submit(
        &mut self,
        command_buffer: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> VulkanResult<()>;

    /// Queue presentation of `image_index` after `wait`; returns true when suboptimal
    fn present(&mut self, image_index: u32, wait: vk::Semaphore) -> VulkanResult<bool>;
}

/// Provides the command buffer to submit for an acquired image
///
/// The pre-recorded source returns the same buffer every time; a source that
/// re-records per frame can replace it without touching the synchronizer.
pub trait CommandSource {
    /// Command buffer rendering into swapchain image `image_index`
    fn command_buffer(&self, image_index: u32) -> VulkanResult<vk::CommandBuffer>;
}

/// Outcome of one completed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    /// Ring slot that was used
    pub slot: usize,
    /// Swapchain image that was rendered and presented
    pub image_index: u32,
    /// Acquire or present reported a suboptimal swapchain
    pub suboptimal: bool,
}

/// Owns the frame slots and drives the per-frame protocol
pub struct FrameSynchronizer {
    slots: Vec<FrameSlot>,
    ring: FrameRing,
    state: FrameState,
    frames_presented: u64,
}

impl FrameSynchronizer {
    /// Synchronizer over `slots`, starting at slot 0
    pub fn new(slots: Vec<FrameSlot>) -> Self {
        let ring = FrameRing::new(slots.len());
        Self {
            slots,
            ring,
            state: FrameState::Idle,
            frames_presented: 0,
        }
    }

    /// Slot the next frame will use
    pub fn current_slot(&self) -> usize {
        self.ring.current()
    }

    /// Current protocol state
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Frames completed since creation
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Synchronization objects of every slot
    pub fn slots(&self) -> &[FrameSlot] {
        &self.slots
    }

    fn transition(&mut self, next: FrameState) {
        log::trace!(
            "Frame slot {}: {:?} -> {:?}",
            self.ring.current(),
            self.state,
            next
        );
        self.state = next;
    }

    /// Run one frame: wait, acquire, submit, present, then advance the ring
    ///
    /// On error the ring does not advance and the state returns to `Idle`.
    pub fn draw_frame(
        &mut self,
        queue: &mut dyn FrameQueue,
        commands: &dyn CommandSource,
    ) -> VulkanResult<FrameReport> {
        let result = self.run_slot(queue, commands);
        self.transition(FrameState::Idle);

        let report = result?;
        self.ring.advance();
        self.frames_presented += 1;
        Ok(report)
    }

    fn run_slot(
        &mut self,
        queue: &mut dyn FrameQueue,
        commands: &dyn CommandSource,
    ) -> VulkanResult<FrameReport> {
        let slot_index = self.ring.current();
        let slot = *self.slots.get(slot_index).ok_or_else(|| {
            VulkanError::UnsupportedCapability(format!("frame slot {} does not exist", slot_index))
        })?;

        self.transition(FrameState::WaitFence);
        queue.wait_for_fence(slot.in_flight)?;

        self.transition(FrameState::Acquiring);
        let acquired = queue.acquire_next_image(slot.image_available)?;
        if acquired.suboptimal {
            log::warn!("Acquired image {} from a suboptimal swapchain", acquired.index);
        }
        let command_buffer = commands.command_buffer(acquired.index)?;

        // Reset only once work for this slot is certain to be submitted
        queue.reset_fence(slot.in_flight)?;
        queue.submit(command_buffer, slot.image_available, slot.render_finished, slot.in_flight)?;
        self.transition(FrameState::Submitted);

        self.transition(FrameState::Presenting);
        let present_suboptimal = queue.present(acquired.index, slot.render_finished)?;
        if present_suboptimal {
            log::warn!("Presented image {} to a suboptimal swapchain", acquired.index);
        }

        Ok(FrameReport {
            slot: slot_index,
            image_index: acquired.index,
            suboptimal: acquired.suboptimal || present_suboptimal,
        })
    }
}

/// [`FrameQueue`] over a live device, swapchain and queues
pub struct DeviceFrameQueue<'a> {
    device: &'a Device,
    swapchain_loader: &'a SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
}

impl<'a> DeviceFrameQueue<'a> {
    /// Queue operations for `swapchain`
    pub fn new(
        device: &'a Device,
        swapchain_loader: &'a SwapchainLoader,
        swapchain: vk::SwapchainKHR,
        graphics_queue: vk::Queue,
        present_queue: vk::Queue,
    ) -> Self {
        Self {
            device,
            swapchain_loader,
            swapchain,
            graphics_queue,
            present_queue,
        }
    }
}

impl FrameQueue for DeviceFrameQueue<'_> {
    fn wait_for_fence(&mut self, fence: vk::Fence) -> VulkanResult<()> {
        unsafe {
            self.device
                .wait_for_fences(&[fence], true, u64::MAX)
                .map_err(VulkanError::api("vkWaitForFences"))
        }
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> VulkanResult<()> {
        unsafe {
            self.device
                .reset_fences(&[fence])
                .map_err(VulkanError::api("vkResetFences"))
        }
    }

    fn acquire_next_image(&mut self, signal: vk::Semaphore) -> VulkanResult<AcquiredImage> {
        let (index, suboptimal) = unsafe {
            self.swapchain_loader
                .acquire_next_image(self.swapchain, u64::MAX, signal, vk::Fence::null())
                .map_err(VulkanError::api("vkAcquireNextImageKHR"))?
        };
        Ok(AcquiredImage { index, suboptimal })
    }

    fn submit(
        &mut self,
        command_buffer: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> VulkanResult<()> {
        let wait_semaphores = [wait];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let signal_semaphores = [signal];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            self.device
                .queue_submit(self.graphics_queue, &[submit_info], fence)
                .map_err(VulkanError::api("vkQueueSubmit"))
        }
    }

    fn present(&mut self, image_index: u32, wait: vk::Semaphore) -> VulkanResult<bool> {
        let wait_semaphores = [wait];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe {
            self.swapchain_loader
                .queue_present(self.present_queue, &present_info)
                .map_err(VulkanError::api("vkQueuePresentKHR"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Wait(u64),
        Reset(u64),
        Acquire(u64),
        Submit { command_buffer: u64, wait: u64, signal: u64, fence: u64 },
        Present { image: u32, wait: u64 },
    }

    #[derive(Default)]
    struct FakeQueue {
        calls: Vec<Call>,
        images: Vec<u32>,
        next_image: usize,
        fail_acquire: bool,
        fail_submit: bool,
        suboptimal_present: bool,
    }

    impl FakeQueue {
        fn cycling(images: Vec<u32>) -> Self {
            Self {
                images,
                ..Self::default()
            }
        }
    }

    impl FrameQueue for FakeQueue {
        fn wait_for_fence(&mut self, fence: vk::Fence) -> VulkanResult<()> {
            self.calls.push(Call::Wait(fence.as_raw()));
            Ok(())
        }

        fn reset_fence(&mut self, fence: vk::Fence) -> VulkanResult<()> {
            self.calls.push(Call::Reset(fence.as_raw()));
            Ok(())
        }

        fn acquire_next_image(&mut self, signal: vk::Semaphore) -> VulkanResult<AcquiredImage> {
            self.calls.push(Call::Acquire(signal.as_raw()));
            if self.fail_acquire {
                return Err(VulkanError::from_vk("vkAcquireNextImageKHR", vk::Result::ERROR_OUT_OF_DATE_KHR));
            }
            let index = self.images[self.next_image % self.images.len()];
            self.next_image += 1;
            Ok(AcquiredImage { index, suboptimal: false })
        }

        fn submit(
            &mut self,
            command_buffer: vk::CommandBuffer,
            wait: vk::Semaphore,
            signal: vk::Semaphore,
            fence: vk::Fence,
        ) -> VulkanResult<()> {
            self.calls.push(Call::Submit {
                command_buffer: command_buffer.as_raw(),
                wait: wait.as_raw(),
                signal: signal.as_raw(),
                fence: fence.as_raw(),
            });
            if self.fail_submit {
                return Err(VulkanError::from_vk("vkQueueSubmit", vk::Result::ERROR_DEVICE_LOST));
            }
            Ok(())
        }

        fn present(&mut self, image_index: u32, wait: vk::Semaphore) -> VulkanResult<bool> {
            self.calls.push(Call::Present {
                image: image_index,
                wait: wait.as_raw(),
            });
            Ok(self.suboptimal_present)
        }
    }

    /// Command buffer handle for image i is 1000 + i
    struct PerImageCommands {
        count: u32,
    }

    impl CommandSource for PerImageCommands {
        fn command_buffer(&self, image_index: u32) -> VulkanResult<vk::CommandBuffer> {
            if image_index >= self.count {
                return Err(VulkanError::UnsupportedCapability(format!("no command buffer for image {}", image_index)));
            }
            Ok(vk::CommandBuffer::from_raw(1000 + u64::from(image_index)))
        }
    }

    /// Slot i: image available 10 + i, render finished 20 + i, fence 30 + i
    fn slots(count: u64) -> Vec<FrameSlot> {
        (0..count)
            .map(|i| FrameSlot {
                image_available: vk::Semaphore::from_raw(10 + i),
                render_finished: vk::Semaphore::from_raw(20 + i),
                in_flight: vk::Fence::from_raw(30 + i),
            })
            .collect()
    }

    #[test]
    fn test_ring_wraps() {
        let mut ring = FrameRing::new(3);
        let mut seen = Vec::new();
        for _ in 0..7 {
            seen.push(ring.current());
            ring.advance();
        }
        assert_eq!(seen, vec![0, 1, 2, 0, 1, 2, 0]);

        ring.reset();
        assert_eq!(ring.current(), 0);
    }

    #[test]
    fn test_zero_length_ring_has_one_slot() {
        let mut ring = FrameRing::new(0);
        ring.advance();
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.current(), 0);
    }

    #[test]
    fn test_five_frames_use_slots_0_1_0_1_0() {
        let mut sync = FrameSynchronizer::new(slots(crate::render::backends::vulkan::MAX_FRAMES_IN_FLIGHT as u64));
        let mut queue = FakeQueue::cycling(vec![0, 1, 2]);
        let commands = PerImageCommands { count: 3 };

        let used: Vec<usize> = (0..5)
            .map(|_| sync.draw_frame(&mut queue, &commands).unwrap().slot)
            .collect();

        assert_eq!(used, vec![0, 1, 0, 1, 0]);
        assert_eq!(sync.frames_presented(), 5);
        assert_eq!(sync.current_slot(), 1);
    }

    #[test]
    fn test_frame_call_order() {
        let mut sync = FrameSynchronizer::new(slots(2));
        let mut queue = FakeQueue::cycling(vec![2]);
        let commands = PerImageCommands { count: 3 };

        let report = sync.draw_frame(&mut queue, &commands).unwrap();

        assert_eq!(report, FrameReport { slot: 0, image_index: 2, suboptimal: false });
        assert_eq!(
            queue.calls,
            vec![
                Call::Wait(30),
                Call::Acquire(10),
                Call::Reset(30),
                Call::Submit { command_buffer: 1002, wait: 10, signal: 20, fence: 30 },
                Call::Present { image: 2, wait: 20 },
            ]
        );
        assert_eq!(sync.state(), FrameState::Idle);
    }

    #[test]
    fn test_second_frame_uses_second_slot_objects() {
        let mut sync = FrameSynchronizer::new(slots(2));
        let mut queue = FakeQueue::cycling(vec![0, 1]);
        let commands = PerImageCommands { count: 2 };

        sync.draw_frame(&mut queue, &commands).unwrap();
        queue.calls.clear();
        sync.draw_frame(&mut queue, &commands).unwrap();

        assert_eq!(queue.calls[0], Call::Wait(31));
        assert_eq!(queue.calls[1], Call::Acquire(11));
        assert_eq!(
            queue.calls[3],
            Call::Submit { command_buffer: 1001, wait: 11, signal: 21, fence: 31 }
        );
        assert_eq!(queue.calls[4], Call::Present { image: 1, wait: 21 });
    }

    #[test]
    fn test_image_index_independent_of_slot() {
        let mut sync = FrameSynchronizer::new(slots(2));
        let mut queue = FakeQueue::cycling(vec![2, 0, 1]);
        let commands = PerImageCommands { count: 3 };

        let reports: Vec<(usize, u32)> = (0..3)
            .map(|_| {
                let report = sync.draw_frame(&mut queue, &commands).unwrap();
                (report.slot, report.image_index)
            })
            .collect();

        assert_eq!(reports, vec![(0, 2), (1, 0), (0, 1)]);
    }

    #[test]
    fn test_acquire_failure_keeps_slot_and_fence() {
        let mut sync = FrameSynchronizer::new(slots(2));
        let mut queue = FakeQueue {
            fail_acquire: true,
            ..FakeQueue::cycling(vec![0])
        };
        let commands = PerImageCommands { count: 1 };

        let result = sync.draw_frame(&mut queue, &commands);

        assert!(matches!(result, Err(VulkanError::SurfaceOutOfDate)));
        assert_eq!(queue.calls, vec![Call::Wait(30), Call::Acquire(10)]);
        assert_eq!(sync.current_slot(), 0);
        assert_eq!(sync.state(), FrameState::Idle);
        assert_eq!(sync.frames_presented(), 0);
    }

    #[test]
    fn test_submit_failure_does_not_advance() {
        let mut sync = FrameSynchronizer::new(slots(2));
        let mut queue = FakeQueue {
            fail_submit: true,
            ..FakeQueue::cycling(vec![0])
        };
        let commands = PerImageCommands { count: 1 };

        assert!(sync.draw_frame(&mut queue, &commands).is_err());
        assert_eq!(sync.current_slot(), 0);
        assert!(!queue.calls.iter().any(|call| matches!(call, Call::Present { .. })));
    }

    #[test]
    fn test_missing_command_buffer_leaves_fence_signaled() {
        let mut sync = FrameSynchronizer::new(slots(2));
        let mut queue = FakeQueue::cycling(vec![5]);
        let commands = PerImageCommands { count: 3 };

        assert!(sync.draw_frame(&mut queue, &commands).is_err());
        assert!(!queue.calls.contains(&Call::Reset(30)));
    }

    #[test]
    fn test_suboptimal_present_still_advances() {
        let mut sync = FrameSynchronizer::new(slots(2));
        let mut queue = FakeQueue {
            suboptimal_present: true,
            ..FakeQueue::cycling(vec![0, 1])
        };
        let commands = PerImageCommands { count: 2 };

        let report = sync.draw_frame(&mut queue, &commands).unwrap();

        assert!(report.suboptimal);
        assert_eq!(sync.current_slot(), 1);
    }
}

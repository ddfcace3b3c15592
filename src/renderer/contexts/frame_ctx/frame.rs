use std::sync::Arc;
use ash::vk;
use color_eyre::Result;

/// Synchronization objects of one in-flight slot
pub struct Frame {
    // Signals when the acquired swapchain image is ready to be rendered into.
    pub image_available: vk::Semaphore,

    // Signals when rendering commands have finished and the image can be presented.
    pub render_finished: vk::Semaphore,

    // Signals when all commands submitted from this slot have finished execution.
    pub in_flight_fence: vk::Fence,

    device: Arc<ash::Device>,
}

impl Frame {
    pub fn new(device: Arc<ash::Device>) -> Result<Self> {
        let image_available = unsafe {
            device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?
        };
        let render_finished = unsafe {
            device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?
        };
        // Created signaled so the very first wait on this slot returns immediately
        let in_flight_fence = unsafe {
            device.create_fence(
                &vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED),
                None,
            )?
        };

        Ok(Self {
            image_available,
            render_finished,
            in_flight_fence,
            device,
        })
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.image_available, None);
            self.device.destroy_semaphore(self.render_finished, None);
            self.device.destroy_fence(self.in_flight_fence, None);
        }
    }
}

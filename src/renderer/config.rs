use std::time::Duration;
use color_eyre::eyre::eyre;
use color_eyre::Result;

/// Contains configuration options for the renderer like vsync, frames in flight, and clear color
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    /// FIFO presentation when set, otherwise MAILBOX if the surface offers it
    pub vsync: bool,
    /// Number of frames the CPU may record ahead of the GPU
    pub max_frames_in_flight: usize,
    pub clear_color: [f32; 4],
    /// Upper bound on waiting for an in-flight fence or an image
    pub acquire_timeout: Duration,
}

impl RenderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_frames_in_flight == 0 {
            return Err(eyre!("max_frames_in_flight must be at least 1"));
        }
        Ok(())
    }

    /// Timeout in nanoseconds as Vulkan expects it; saturates to "forever"
    pub fn acquire_timeout_ns(&self) -> u64 {
        u64::try_from(self.acquire_timeout.as_nanos()).unwrap_or(u64::MAX)
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            vsync: false,
            max_frames_in_flight: 2,
            clear_color: [0.1, 0.1, 0.1, 1.0],
            acquire_timeout: Duration::MAX,
        }
    }
}

pub mod frame;

/// Where the renderer is in recording the current frame.
///
/// Responsibilities:
/// - `Idle` until an image has been acquired and its command buffer begun
/// - `FrameOpen` while commands may be recorded outside a render pass
/// - `PassOpen` between beginning and ending the swapchain render pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    #[default]
    Idle,
    FrameOpen,
    PassOpen,
}

impl FrameState {
    pub fn is_frame_in_progress(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

/// Round-robin index over the in-flight slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSlots {
    count: usize,
    current: usize,
}

impl FrameSlots {
    pub fn new(count: usize) -> Self {
        assert!(count > 0, "at least one frame slot is required");
        Self { count, current: 0 }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.count;
    }
}

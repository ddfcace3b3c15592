//! Seams between the frame orchestrator and the things it drives.
//!
//! [`Renderer`](crate::renderer::Renderer) only ever talks to the window through
//! [`PresentationSurface`] and to the GPU through [`RenderDeviceExt`] and [`SwapchainExt`].
//! The Vulkan implementations live in `contexts` and `internals`.

use std::fmt::Debug;
use ash::vk;
use color_eyre::Result;
use crate::renderer::config::RenderConfig;

/// Size of the drawable area in presentable pixels
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A minimized window reports a zero dimension; no swapchain can be built for it
    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            return 1.0;
        }
        self.width as f32 / self.height as f32
    }
}

impl From<vk::Extent2D> for Extent {
    fn from(extent: vk::Extent2D) -> Self {
        Self::new(extent.width, extent.height)
    }
}

impl From<Extent> for vk::Extent2D {
    fn from(extent: Extent) -> Self {
        vk::Extent2D {
            width: extent.width,
            height: extent.height,
        }
    }
}

impl From<winit::dpi::PhysicalSize<u32>> for Extent {
    fn from(size: winit::dpi::PhysicalSize<u32>) -> Self {
        Self::new(size.width, size.height)
    }
}

/// Outcome of acquiring the next presentable image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    /// The image at `index` is ready to be rendered into.
    /// `suboptimal` means it can still be presented but the swapchain should be rebuilt soon.
    Image { index: u32, suboptimal: bool },
    /// The surface no longer matches the swapchain; nothing was acquired
    SurfaceStale,
}

/// Outcome of submitting a frame and presenting it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainStatus {
    Success,
    Suboptimal,
    SurfaceStale,
}

/// The window side of presentation
pub trait PresentationSurface {
    /// Current size of the drawable area, read fresh every call
    fn drawable_extent(&self) -> Extent;

    /// Whether the window was resized since the flag was last reset
    fn was_resized(&self) -> bool;

    fn reset_resized_flag(&mut self);

    /// Block until at least one window event has been processed
    fn wait_events(&mut self) -> Result<()>;
}

/// The GPU side of the frame loop: command buffers and swapchain creation
pub trait RenderDeviceExt {
    type CommandBuffer: Copy + PartialEq + Debug;
    type Swapchain: SwapchainExt<CommandBuffer = Self::CommandBuffer>;

    fn wait_idle(&self) -> Result<()>;

    /// Build a swapchain for `extent`, consuming `previous` so its compatible state can be reused
    fn create_swapchain(
        &self,
        extent: Extent,
        previous: Option<Self::Swapchain>,
        config: &RenderConfig,
    ) -> Result<Self::Swapchain>;

    fn allocate_command_buffers(&self, count: usize) -> Result<Vec<Self::CommandBuffer>>;

    fn free_command_buffers(&self, command_buffers: &[Self::CommandBuffer]);

    fn begin_command_buffer(&self, command_buffer: Self::CommandBuffer) -> Result<()>;

    fn end_command_buffer(&self, command_buffer: Self::CommandBuffer) -> Result<()>;
}

/// A chain of presentable images plus everything sized after them
pub trait SwapchainExt {
    type CommandBuffer: Copy + PartialEq + Debug;
    type RenderPass: Copy + PartialEq + Debug;

    fn image_count(&self) -> usize;

    fn extent(&self) -> Extent;

    fn render_pass(&self) -> Self::RenderPass;

    /// Wait for the current in-flight slot and acquire the next image
    fn acquire_next_image(&mut self) -> Result<Acquire>;

    /// Submit `command_buffer` for `image_index` and queue the image for presentation
    fn submit_command_buffers(
        &mut self,
        command_buffer: Self::CommandBuffer,
        image_index: u32,
    ) -> Result<SwapchainStatus>;

    fn cmd_begin_render_pass(
        &self,
        command_buffer: Self::CommandBuffer,
        image_index: u32,
        clear_color: [f32; 4],
    );

    /// Cover the whole swapchain extent with the dynamic viewport and scissor
    fn cmd_set_viewport_and_scissor(&self, command_buffer: Self::CommandBuffer);

    fn cmd_end_render_pass(&self, command_buffer: Self::CommandBuffer);
}

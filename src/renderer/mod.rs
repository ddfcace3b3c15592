pub mod backend;
pub mod config;
pub mod contexts;
pub mod internals;
pub mod resources;
pub mod shader_data;
pub mod systems;

#[cfg(test)]
mod mock;

use std::sync::Arc;
use color_eyre::eyre::{OptionExt, WrapErr};
use color_eyre::Result;
use crate::renderer::backend::{
    Acquire, Extent, PresentationSurface, RenderDeviceExt, SwapchainExt, SwapchainStatus,
};
use crate::renderer::config::RenderConfig;
use crate::renderer::contexts::frame_ctx::FrameState;

/// How a frame ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEnd {
    Presented,
    /// The frame was submitted and the swapchain was rebuilt afterwards
    Rebuilt,
}

/// Drives one frame at a time through acquire, record, submit and present.
///
/// Responsibilities:
/// - Own the swapchain and rebuild it when the surface changes
/// - Keep one command buffer per swapchain image
/// - Enforce the begin/end ordering of frames and of the swapchain render pass
pub struct Renderer<D: RenderDeviceExt> {
    swapchain: Option<D::Swapchain>,
    command_buffers: Vec<D::CommandBuffer>,

    state: FrameState,
    current_image_index: u32,
    // Set when an image was acquired suboptimally; the swapchain is rebuilt once that frame is out
    rebuild_pending: bool,

    config: RenderConfig,
    device: Arc<D>,
}

impl<D: RenderDeviceExt> Renderer<D> {
    pub fn new<S: PresentationSurface>(
        device: Arc<D>,
        surface: &mut S,
        config: RenderConfig,
    ) -> Result<Self> {
        config.validate()?;

        let mut renderer = Self {
            swapchain: None,
            command_buffers: Vec::new(),
            state: FrameState::Idle,
            current_image_index: 0,
            rebuild_pending: false,
            config,
            device,
        };
        renderer.rebuild_swapchain(surface)?;

        Ok(renderer)
    }

    /// Acquire the next image and begin recording its command buffer.
    ///
    /// Returns `None` when the surface went stale; the swapchain has then been rebuilt
    /// and the caller should simply skip this frame.
    pub fn begin_frame<S: PresentationSurface>(
        &mut self,
        surface: &mut S,
    ) -> Result<Option<D::CommandBuffer>> {
        assert_eq!(
            self.state,
            FrameState::Idle,
            "Can't call begin_frame while a frame is already in progress",
        );

        let acquire = self
            .swapchain_mut()?
            .acquire_next_image()
            .wrap_err("Failed to acquire swap chain image")?;

        let image_index = match acquire {
            Acquire::SurfaceStale => {
                log::debug!("Surface is stale at acquire, rebuilding swapchain");
                self.rebuild_swapchain(surface)?;
                return Ok(None);
            }
            Acquire::Image { index, suboptimal } => {
                if suboptimal {
                    log::debug!("Acquired suboptimal image {}, rebuilding after this frame", index);
                    self.rebuild_pending = true;
                }
                index
            }
        };

        let command_buffer = self
            .command_buffers
            .get(image_index as usize)
            .copied()
            .ok_or_eyre("Acquired image index has no command buffer")?;
        self.device
            .begin_command_buffer(command_buffer)
            .wrap_err("Failed to begin recording command buffer")?;

        self.current_image_index = image_index;
        self.state = FrameState::FrameOpen;

        Ok(Some(command_buffer))
    }

    /// Finish recording, submit and present the open frame.
    /// Rebuilds the swapchain afterwards if presentation reported it stale or suboptimal,
    /// or if the window was resized.
    pub fn end_frame<S: PresentationSurface>(&mut self, surface: &mut S) -> Result<FrameEnd> {
        assert!(
            self.state.is_frame_in_progress(),
            "Can't call end_frame while frame is not in progress",
        );
        assert_ne!(
            self.state,
            FrameState::PassOpen,
            "Can't call end_frame while the swapchain render pass is still open",
        );

        let command_buffer = self.current_command_buffer();
        self.device
            .end_command_buffer(command_buffer)
            .wrap_err("Failed to record command buffer")?;

        let image_index = self.current_image_index;
        let status = self
            .swapchain_mut()?
            .submit_command_buffers(command_buffer, image_index);
        self.state = FrameState::Idle;
        let status = status.wrap_err("Failed to present swap chain image")?;

        let resized = surface.was_resized();
        if status != SwapchainStatus::Success || resized || self.rebuild_pending {
            log::debug!(
                "Rebuilding swapchain after present (status: {:?}, resized: {}, suboptimal acquire: {})",
                status,
                resized,
                self.rebuild_pending,
            );
            surface.reset_resized_flag();
            self.rebuild_pending = false;
            self.rebuild_swapchain(surface)?;
            return Ok(FrameEnd::Rebuilt);
        }

        Ok(FrameEnd::Presented)
    }

    pub fn begin_swapchain_render_pass(&mut self, command_buffer: D::CommandBuffer) -> Result<()> {
        assert!(
            self.state.is_frame_in_progress(),
            "Can't begin render pass when frame is not in progress",
        );
        assert_ne!(
            self.state,
            FrameState::PassOpen,
            "Can't begin render pass while one is already open",
        );
        assert_eq!(
            command_buffer,
            self.current_command_buffer(),
            "Can't begin render pass on command buffer from a different frame",
        );

        let clear_color = self.config.clear_color;
        let image_index = self.current_image_index;
        let swapchain = self.swapchain()?;
        swapchain.cmd_begin_render_pass(command_buffer, image_index, clear_color);
        swapchain.cmd_set_viewport_and_scissor(command_buffer);

        self.state = FrameState::PassOpen;
        Ok(())
    }

    pub fn end_swapchain_render_pass(&mut self, command_buffer: D::CommandBuffer) -> Result<()> {
        assert!(
            self.state.is_frame_in_progress(),
            "Can't end render pass when frame is not in progress",
        );
        assert_eq!(
            self.state,
            FrameState::PassOpen,
            "Can't end render pass that was never begun",
        );
        assert_eq!(
            command_buffer,
            self.current_command_buffer(),
            "Can't end render pass on command buffer from a different frame",
        );

        self.swapchain()?.cmd_end_render_pass(command_buffer);

        self.state = FrameState::FrameOpen;
        Ok(())
    }

    pub fn current_command_buffer(&self) -> D::CommandBuffer {
        assert!(
            self.state.is_frame_in_progress(),
            "Cannot get command buffer when frame not in progress",
        );
        self.command_buffers[self.current_image_index as usize]
    }

    pub fn swapchain_render_pass(&self) -> Result<<D::Swapchain as SwapchainExt>::RenderPass> {
        Ok(self.swapchain()?.render_pass())
    }

    pub fn swapchain_extent(&self) -> Result<Extent> {
        Ok(self.swapchain()?.extent())
    }

    pub fn aspect_ratio(&self) -> Result<f32> {
        Ok(self.swapchain_extent()?.aspect_ratio())
    }

    pub fn image_count(&self) -> Result<usize> {
        Ok(self.swapchain()?.image_count())
    }

    pub fn command_buffer_count(&self) -> usize {
        self.command_buffers.len()
    }

    pub fn frame_state(&self) -> FrameState {
        self.state
    }

    pub fn is_frame_in_progress(&self) -> bool {
        self.state.is_frame_in_progress()
    }

    /// Replace the swapchain with one matching the current drawable extent.
    /// Blocks on window events while the surface has a zero dimension.
    fn rebuild_swapchain<S: PresentationSurface>(&mut self, surface: &mut S) -> Result<()> {
        let mut extent = surface.drawable_extent();
        while extent.is_degenerate() {
            surface.wait_events()?;
            extent = surface.drawable_extent();
        }

        self.device
            .wait_idle()
            .wrap_err("Failed to wait for device idle before rebuilding swapchain")?;

        let previous = self.swapchain.take();
        let swapchain = self
            .device
            .create_swapchain(extent, previous, &self.config)
            .wrap_err("Failed to create swapchain")?;

        let image_count = swapchain.image_count();
        if image_count != self.command_buffers.len() {
            log::debug!(
                "Reallocating command buffers: {} -> {}",
                self.command_buffers.len(),
                image_count,
            );
            self.free_command_buffers();
            self.command_buffers = self
                .device
                .allocate_command_buffers(image_count)
                .wrap_err("Failed to allocate command buffers")?;
        }

        log::info!(
            "Swapchain ready: {}x{} with {} images",
            extent.width,
            extent.height,
            image_count,
        );
        self.swapchain = Some(swapchain);

        Ok(())
    }

    fn free_command_buffers(&mut self) {
        if !self.command_buffers.is_empty() {
            self.device.free_command_buffers(&self.command_buffers);
            self.command_buffers.clear();
        }
    }

    fn swapchain(&self) -> Result<&D::Swapchain> {
        self.swapchain
            .as_ref()
            .ok_or_eyre("Swapchain is unavailable after a failed rebuild")
    }

    fn swapchain_mut(&mut self) -> Result<&mut D::Swapchain> {
        self.swapchain
            .as_mut()
            .ok_or_eyre("Swapchain is unavailable after a failed rebuild")
    }
}

impl<D: RenderDeviceExt> Drop for Renderer<D> {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            log::error!("Failed to wait for device idle on renderer drop: {:?}", e);
        }
        self.free_command_buffers();
    }
}

//! Scripted stand-ins for the window and the GPU, used to exercise `Renderer` without a device.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use crate::renderer::backend::{
    Acquire, Extent, PresentationSurface, RenderDeviceExt, SwapchainExt, SwapchainStatus,
};
use crate::renderer::config::RenderConfig;
use crate::renderer::contexts::frame_ctx::FrameSlots;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockCommandBuffer(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockRenderPass(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedAcquire {
    Suboptimal,
    Stale,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedSubmit {
    Suboptimal,
    Stale,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockCommand {
    BeginPass {
        command_buffer: MockCommandBuffer,
        image_index: u32,
        clear_color: [f32; 4],
    },
    SetViewportAndScissor {
        command_buffer: MockCommandBuffer,
        extent: Extent,
    },
    EndPass {
        command_buffer: MockCommandBuffer,
    },
}

/// Outcomes queued for the swapchain plus a record of what it was asked to do.
/// Unscripted acquires and submits succeed.
#[derive(Default)]
pub struct MockScript {
    acquires: RefCell<VecDeque<ScriptedAcquire>>,
    submits: RefCell<VecDeque<ScriptedSubmit>>,
    acquire_calls: Cell<usize>,
    submitted: RefCell<Vec<(MockCommandBuffer, u32)>>,
    commands: RefCell<Vec<MockCommand>>,
    dropped_generations: RefCell<Vec<u32>>,
    // Submitted and not yet known to be finished, i.e. no fence covering it was waited on
    pending: RefCell<Vec<MockCommandBuffer>>,
    max_pending: Cell<usize>,
}

impl MockScript {
    pub fn push_acquire(&self, outcome: ScriptedAcquire) {
        self.acquires.borrow_mut().push_back(outcome);
    }

    pub fn push_submit(&self, outcome: ScriptedSubmit) {
        self.submits.borrow_mut().push_back(outcome);
    }

    pub fn acquire_calls(&self) -> usize {
        self.acquire_calls.get()
    }

    pub fn submitted(&self) -> Vec<(MockCommandBuffer, u32)> {
        self.submitted.borrow().clone()
    }

    pub fn commands(&self) -> Vec<MockCommand> {
        self.commands.borrow().clone()
    }

    pub fn pending(&self) -> Vec<MockCommandBuffer> {
        self.pending.borrow().clone()
    }

    /// Most command buffers that were ever pending at once
    pub fn max_pending(&self) -> usize {
        self.max_pending.get()
    }

    fn is_pending(&self, command_buffer: MockCommandBuffer) -> bool {
        self.pending.borrow().contains(&command_buffer)
    }

    fn mark_pending(&self, command_buffer: MockCommandBuffer) {
        let mut pending = self.pending.borrow_mut();
        pending.push(command_buffer);
        self.max_pending.set(self.max_pending.get().max(pending.len()));
    }

    fn retire(&self, finished: &[MockCommandBuffer]) {
        self.pending.borrow_mut().retain(|cb| !finished.contains(cb));
    }
}

pub struct MockSwapchain {
    pub generation: u32,
    extent: Extent,
    image_count: usize,
    render_pass: MockRenderPass,
    next_image: u32,
    slots: FrameSlots,
    // What each slot's fence still guards
    slot_submissions: Vec<Vec<MockCommandBuffer>>,
    // Slot whose fence last guarded each image
    images_in_flight: Vec<Option<usize>>,
    script: Rc<MockScript>,
}

impl MockSwapchain {
    /// Waiting on a slot's fence means everything submitted behind it has finished
    fn wait_for_slot(&mut self, slot: usize) {
        let finished = std::mem::take(&mut self.slot_submissions[slot]);
        self.script.retire(&finished);
    }
}

impl SwapchainExt for MockSwapchain {
    type CommandBuffer = MockCommandBuffer;
    type RenderPass = MockRenderPass;

    fn image_count(&self) -> usize {
        self.image_count
    }

    fn extent(&self) -> Extent {
        self.extent
    }

    fn render_pass(&self) -> MockRenderPass {
        self.render_pass
    }

    fn acquire_next_image(&mut self) -> Result<Acquire> {
        self.script.acquire_calls.set(self.script.acquire_calls.get() + 1);
        self.wait_for_slot(self.slots.current());

        let scripted = self.script.acquires.borrow_mut().pop_front();
        let suboptimal = match scripted {
            None => false,
            Some(ScriptedAcquire::Suboptimal) => true,
            Some(ScriptedAcquire::Stale) => return Ok(Acquire::SurfaceStale),
            Some(ScriptedAcquire::Fail) => return Err(eyre!("device lost")),
        };
        let index = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count as u32;
        if let Some(slot) = self.images_in_flight[index as usize] {
            self.wait_for_slot(slot);
        }
        Ok(Acquire::Image { index, suboptimal })
    }

    fn submit_command_buffers(
        &mut self,
        command_buffer: MockCommandBuffer,
        image_index: u32,
    ) -> Result<SwapchainStatus> {
        self.script.submitted.borrow_mut().push((command_buffer, image_index));
        let slot = self.slots.current();
        self.images_in_flight[image_index as usize] = Some(slot);
        self.slot_submissions[slot].push(command_buffer);
        self.script.mark_pending(command_buffer);
        self.slots.advance();
        match self.script.submits.borrow_mut().pop_front() {
            None => Ok(SwapchainStatus::Success),
            Some(ScriptedSubmit::Suboptimal) => Ok(SwapchainStatus::Suboptimal),
            Some(ScriptedSubmit::Stale) => Ok(SwapchainStatus::SurfaceStale),
            Some(ScriptedSubmit::Fail) => Err(eyre!("device lost")),
        }
    }

    fn cmd_begin_render_pass(
        &self,
        command_buffer: MockCommandBuffer,
        image_index: u32,
        clear_color: [f32; 4],
    ) {
        self.script.commands.borrow_mut().push(MockCommand::BeginPass {
            command_buffer,
            image_index,
            clear_color,
        });
    }

    fn cmd_set_viewport_and_scissor(&self, command_buffer: MockCommandBuffer) {
        self.script.commands.borrow_mut().push(MockCommand::SetViewportAndScissor {
            command_buffer,
            extent: self.extent,
        });
    }

    fn cmd_end_render_pass(&self, command_buffer: MockCommandBuffer) {
        self.script
            .commands
            .borrow_mut()
            .push(MockCommand::EndPass { command_buffer });
    }
}

impl Drop for MockSwapchain {
    fn drop(&mut self) {
        self.script.dropped_generations.borrow_mut().push(self.generation);
    }
}

pub struct MockDevice {
    image_count: Cell<usize>,
    next_generation: Cell<u32>,
    next_render_pass: Cell<u32>,
    next_command_buffer: Cell<u32>,
    created: RefCell<Vec<(Extent, Option<u32>)>>,
    live_command_buffers: RefCell<Vec<MockCommandBuffer>>,
    allocations: Cell<usize>,
    begun: RefCell<Vec<MockCommandBuffer>>,
    ended: RefCell<Vec<MockCommandBuffer>>,
    wait_idle_calls: Cell<usize>,
    script: Rc<MockScript>,
}

impl MockDevice {
    /// Swapchains get `image_count` images until changed with [`MockDevice::set_image_count`]
    pub fn new(image_count: usize) -> Self {
        Self {
            image_count: Cell::new(image_count),
            next_generation: Cell::new(0),
            next_render_pass: Cell::new(0),
            next_command_buffer: Cell::new(0),
            created: RefCell::new(Vec::new()),
            live_command_buffers: RefCell::new(Vec::new()),
            allocations: Cell::new(0),
            begun: RefCell::new(Vec::new()),
            ended: RefCell::new(Vec::new()),
            wait_idle_calls: Cell::new(0),
            script: Rc::new(MockScript::default()),
        }
    }

    pub fn set_image_count(&self, image_count: usize) {
        self.image_count.set(image_count);
    }

    pub fn script(&self) -> &MockScript {
        &self.script
    }

    /// Extent and previous generation of every swapchain created so far
    pub fn created_swapchains(&self) -> Vec<(Extent, Option<u32>)> {
        self.created.borrow().clone()
    }

    pub fn dropped_generations(&self) -> Vec<u32> {
        self.script.dropped_generations.borrow().clone()
    }

    pub fn live_command_buffers(&self) -> Vec<MockCommandBuffer> {
        self.live_command_buffers.borrow().clone()
    }

    pub fn allocations(&self) -> usize {
        self.allocations.get()
    }

    pub fn begun(&self) -> Vec<MockCommandBuffer> {
        self.begun.borrow().clone()
    }

    pub fn ended(&self) -> Vec<MockCommandBuffer> {
        self.ended.borrow().clone()
    }

    pub fn wait_idle_calls(&self) -> usize {
        self.wait_idle_calls.get()
    }
}

impl RenderDeviceExt for MockDevice {
    type CommandBuffer = MockCommandBuffer;
    type Swapchain = MockSwapchain;

    fn wait_idle(&self) -> Result<()> {
        self.wait_idle_calls.set(self.wait_idle_calls.get() + 1);
        self.script.pending.borrow_mut().clear();
        Ok(())
    }

    fn create_swapchain(
        &self,
        extent: Extent,
        mut previous: Option<MockSwapchain>,
        config: &RenderConfig,
    ) -> Result<MockSwapchain> {
        assert!(!extent.is_degenerate(), "swapchain requested for {:?}", extent);

        let generation = self.next_generation.get();
        self.next_generation.set(generation + 1);
        self.created
            .borrow_mut()
            .push((extent, previous.as_ref().map(|p| p.generation)));

        // Same surface format, so the previous render pass and in-flight slots carry over
        let (render_pass, slots, slot_submissions) = match previous.as_mut() {
            Some(previous) => (
                previous.render_pass,
                previous.slots,
                std::mem::take(&mut previous.slot_submissions),
            ),
            None => {
                let id = self.next_render_pass.get();
                self.next_render_pass.set(id + 1);
                (
                    MockRenderPass(id),
                    FrameSlots::new(config.max_frames_in_flight),
                    vec![Vec::new(); config.max_frames_in_flight],
                )
            }
        };
        let image_count = self.image_count.get();

        Ok(MockSwapchain {
            generation,
            extent,
            image_count,
            render_pass,
            next_image: 0,
            slots,
            slot_submissions,
            images_in_flight: vec![None; image_count],
            script: self.script.clone(),
        })
    }

    fn allocate_command_buffers(&self, count: usize) -> Result<Vec<MockCommandBuffer>> {
        self.allocations.set(self.allocations.get() + 1);
        let command_buffers = (0..count)
            .map(|_| {
                let id = self.next_command_buffer.get();
                self.next_command_buffer.set(id + 1);
                MockCommandBuffer(id)
            })
            .collect::<Vec<_>>();
        self.live_command_buffers
            .borrow_mut()
            .extend_from_slice(&command_buffers);
        Ok(command_buffers)
    }

    fn free_command_buffers(&self, command_buffers: &[MockCommandBuffer]) {
        for command_buffer in command_buffers {
            assert!(
                !self.script.is_pending(*command_buffer),
                "freeing pending command buffer {:?}",
                command_buffer,
            );
        }
        self.live_command_buffers
            .borrow_mut()
            .retain(|cb| !command_buffers.contains(cb));
    }

    fn begin_command_buffer(&self, command_buffer: MockCommandBuffer) -> Result<()> {
        assert!(
            self.live_command_buffers.borrow().contains(&command_buffer),
            "recording into freed command buffer {:?}",
            command_buffer,
        );
        assert!(
            !self.script.is_pending(command_buffer),
            "re-recording pending command buffer {:?}",
            command_buffer,
        );
        self.begun.borrow_mut().push(command_buffer);
        Ok(())
    }

    fn end_command_buffer(&self, command_buffer: MockCommandBuffer) -> Result<()> {
        self.ended.borrow_mut().push(command_buffer);
        Ok(())
    }
}

/// Window whose size changes only when told to, or when an event is "processed"
pub struct MockSurface {
    extent: Extent,
    resized: bool,
    event_extents: VecDeque<Extent>,
    wait_calls: usize,
}

impl MockSurface {
    pub fn new(extent: Extent) -> Self {
        Self {
            extent,
            resized: false,
            event_extents: VecDeque::new(),
            wait_calls: 0,
        }
    }

    pub fn resize(&mut self, extent: Extent) {
        self.extent = extent;
        self.resized = true;
    }

    /// Queue the extent the window will report after the next processed event
    pub fn push_event_extent(&mut self, extent: Extent) {
        self.event_extents.push_back(extent);
    }

    pub fn wait_calls(&self) -> usize {
        self.wait_calls
    }
}

impl PresentationSurface for MockSurface {
    fn drawable_extent(&self) -> Extent {
        self.extent
    }

    fn was_resized(&self) -> bool {
        self.resized
    }

    fn reset_resized_flag(&mut self) {
        self.resized = false;
    }

    fn wait_events(&mut self) -> Result<()> {
        self.wait_calls += 1;
        let extent = self
            .event_extents
            .pop_front()
            .ok_or_else(|| eyre!("window closed while waiting for events"))?;
        self.extent = extent;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "re-recording pending command buffer")]
    fn beginning_a_submitted_buffer_before_its_fence_panics() {
        let device = MockDevice::new(2);
        let mut swapchain = device
            .create_swapchain(Extent::new(800, 600), None, &RenderConfig::default())
            .unwrap();
        let command_buffers = device.allocate_command_buffers(2).unwrap();

        swapchain.acquire_next_image().unwrap();
        device.begin_command_buffer(command_buffers[0]).unwrap();
        swapchain.submit_command_buffers(command_buffers[0], 0).unwrap();

        device.begin_command_buffer(command_buffers[0]).unwrap();
    }

    #[test]
    fn waiting_on_the_slot_fence_retires_its_submissions() {
        let device = MockDevice::new(3);
        let config = RenderConfig {
            max_frames_in_flight: 1,
            ..Default::default()
        };
        let mut swapchain = device
            .create_swapchain(Extent::new(800, 600), None, &config)
            .unwrap();
        let command_buffers = device.allocate_command_buffers(3).unwrap();

        swapchain.acquire_next_image().unwrap();
        swapchain.submit_command_buffers(command_buffers[0], 0).unwrap();
        assert_eq!(device.script().pending(), vec![command_buffers[0]]);

        swapchain.acquire_next_image().unwrap();
        assert!(device.script().pending().is_empty());
    }
}

pub mod simple;

use ash::vk;
use crate::scene::GameObject;

/// Records draws for a list of objects into a command buffer whose swapchain render pass is open.
/// The command buffer is only borrowed for the call.
pub trait RenderSystem {
    fn render(&self, command_buffer: vk::CommandBuffer, objects: &[GameObject]);
}

/// "Internals" refers to low-level objects that are used to implement the renderer
/// and are never handed out to render systems.

pub mod render_pass;
pub mod swapchain;

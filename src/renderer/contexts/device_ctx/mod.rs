//! Responsibilities:
//! - Manage the Vulkan instance, window surface, device, and queues
//! - Allocate and record the frame loop's command buffers

pub mod device;
pub mod instance;
pub mod queue;
pub mod surface;

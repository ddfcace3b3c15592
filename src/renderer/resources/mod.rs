/// "Resources" are GPU objects created from the device and owned by whoever draws with them.

pub mod buffer;
pub mod image;
pub mod model;
pub mod pipeline;
pub mod shader;
pub mod vertex;

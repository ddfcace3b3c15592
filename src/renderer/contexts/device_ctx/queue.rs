use ash::vk;

pub struct Queue {
    pub family: QueueFamily,
    pub handle: vk::Queue,
}

impl Queue {
    pub fn new(
        family: QueueFamily,
        handle: vk::Queue,
    ) -> Self {
        Self {
            family,
            handle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamily {
    pub index: u32,
}

impl QueueFamily {
    pub fn new(index: u32) -> Self {
        Self { index }
    }
}

/// Graphics and present queue family indices for a physical device.
/// Prefers one family that can do both.
pub fn find_queue_families(
    families: &[vk::QueueFamilyProperties],
    supports_present: impl Fn(u32) -> bool,
) -> Option<(u32, u32)> {
    let graphics = |q: &vk::QueueFamilyProperties| {
        q.queue_count > 0 && q.queue_flags.contains(vk::QueueFlags::GRAPHICS)
    };

    let shared = families
        .iter()
        .enumerate()
        .position(|(i, q)| graphics(q) && supports_present(i as u32));
    if let Some(index) = shared {
        return Some((index as u32, index as u32));
    }

    let graphics_index = families.iter().position(graphics)?;
    let present_index = (0..families.len() as u32).find(|i| supports_present(*i))?;
    Some((graphics_index as u32, present_index))
}

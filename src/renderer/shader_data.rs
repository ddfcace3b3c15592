use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Data unique to each draw call passed as a push constant.
/// `color` sits on a 16-byte boundary after the matrix, matching the GLSL push block.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, Pod, Zeroable)]
pub struct SimplePushConstantData {
    pub transform: Mat4,
    pub color: Vec3,
    _padding: f32,
}

impl SimplePushConstantData {
    pub fn new(transform: Mat4, color: Vec3) -> Self {
        Self {
            transform,
            color,
            _padding: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn layout_matches_push_block() {
        assert_eq!(size_of::<SimplePushConstantData>(), 80);
        assert_eq!(offset_of!(SimplePushConstantData, color), 64);
    }

    #[test]
    fn bytes_start_with_the_transform() {
        let data = SimplePushConstantData::new(Mat4::IDENTITY, Vec3::new(1.0, 0.5, 0.25));
        let floats: &[f32] = bytemuck::cast_slice(bytemuck::bytes_of(&data));
        assert_eq!(floats[0], 1.0);
        assert_eq!(floats[5], 1.0);
        assert_eq!(&floats[16..19], &[1.0, 0.5, 0.25]);
    }
}

use std::mem::size_of_val;
use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::{eyre, Result};
use glam::Vec3;
use gpu_allocator::MemoryLocation;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::resources::buffer::Buffer;
use crate::renderer::resources::vertex::Vertex;

/// Non-indexed geometry living in a host-visible vertex buffer
pub struct Model {
    vertex_buffer: Buffer,
    vertex_count: u32,
    device: Arc<ash::Device>,
}

impl Model {
    pub fn new(device: &RenderDevice, vertices: &[Vertex]) -> Result<Self> {
        let vertex_count = checked_vertex_count(vertices.len())?;

        let mut vertex_buffer = Buffer::new(
            size_of_val(vertices) as u64,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            "Model Vertex Buffer",
            MemoryLocation::CpuToGpu,
            device.memory_allocator(),
            device.logical.clone(),
        )?;
        vertex_buffer.write(vertices, 0)?;

        Ok(Self {
            vertex_buffer,
            vertex_count,
            device: device.logical.clone(),
        })
    }

    pub fn bind(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            self.device.cmd_bind_vertex_buffers(
                command_buffer,
                0,
                &[self.vertex_buffer.buffer],
                &[0],
            );
        }
    }

    pub fn draw(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            self.device.cmd_draw(command_buffer, self.vertex_count, 1, 0, 0);
        }
    }
}

fn checked_vertex_count(len: usize) -> Result<u32> {
    if len < 3 {
        return Err(eyre!("Model needs at least 3 vertices, got {}", len));
    }
    u32::try_from(len).map_err(|_| eyre!("Too many vertices for one draw: {}", len))
}

/// Unit cube centered on `offset`, two triangles per face, each face a flat color
pub fn cube_vertices(offset: Vec3) -> Vec<Vertex> {
    const FACES: [([f32; 3], [[f32; 3]; 6]); 6] = [
        // Left
        ([0.9, 0.9, 0.9], [
            [-0.5, -0.5, -0.5], [-0.5, 0.5, 0.5], [-0.5, -0.5, 0.5],
            [-0.5, -0.5, -0.5], [-0.5, 0.5, -0.5], [-0.5, 0.5, 0.5],
        ]),
        // Right
        ([0.8, 0.8, 0.1], [
            [0.5, -0.5, -0.5], [0.5, 0.5, 0.5], [0.5, -0.5, 0.5],
            [0.5, -0.5, -0.5], [0.5, 0.5, -0.5], [0.5, 0.5, 0.5],
        ]),
        // Top (y points down)
        ([0.9, 0.6, 0.1], [
            [-0.5, -0.5, -0.5], [0.5, -0.5, 0.5], [-0.5, -0.5, 0.5],
            [-0.5, -0.5, -0.5], [0.5, -0.5, -0.5], [0.5, -0.5, 0.5],
        ]),
        // Bottom
        ([0.8, 0.1, 0.1], [
            [-0.5, 0.5, -0.5], [0.5, 0.5, 0.5], [-0.5, 0.5, 0.5],
            [-0.5, 0.5, -0.5], [0.5, 0.5, -0.5], [0.5, 0.5, 0.5],
        ]),
        // Front
        ([0.1, 0.1, 0.8], [
            [-0.5, -0.5, 0.5], [0.5, 0.5, 0.5], [-0.5, 0.5, 0.5],
            [-0.5, -0.5, 0.5], [0.5, -0.5, 0.5], [0.5, 0.5, 0.5],
        ]),
        // Back
        ([0.1, 0.8, 0.1], [
            [-0.5, -0.5, -0.5], [0.5, 0.5, -0.5], [-0.5, 0.5, -0.5],
            [-0.5, -0.5, -0.5], [0.5, -0.5, -0.5], [0.5, 0.5, -0.5],
        ]),
    ];

    FACES
        .iter()
        .flat_map(|(color, positions)| {
            positions.iter().map(move |position| {
                Vertex::new(Vec3::from(*position) + offset, Vec3::from(*color))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fewer_than_three_vertices_is_rejected() {
        assert!(checked_vertex_count(0).is_err());
        assert!(checked_vertex_count(2).is_err());
        assert_eq!(checked_vertex_count(3).unwrap(), 3);
    }

    #[test]
    fn cube_has_two_triangles_per_face() {
        let vertices = cube_vertices(Vec3::ZERO);
        assert_eq!(vertices.len(), 36);
        for face in vertices.chunks(6) {
            assert!(face.iter().all(|v| v.color == face[0].color));
        }
    }

    #[test]
    fn cube_is_offset_and_unit_sized() {
        let offset = Vec3::new(1.0, -2.0, 0.5);
        let vertices = cube_vertices(offset);
        for v in &vertices {
            let local = v.position - offset;
            assert!(local.abs().cmple(Vec3::splat(0.5 + f32::EPSILON)).all());
        }
        let min = vertices.iter().fold(Vec3::splat(f32::MAX), |acc, v| acc.min(v.position));
        let max = vertices.iter().fold(Vec3::splat(f32::MIN), |acc, v| acc.max(v.position));
        assert_eq!(min, offset - Vec3::splat(0.5));
        assert_eq!(max, offset + Vec3::splat(0.5));
    }
}

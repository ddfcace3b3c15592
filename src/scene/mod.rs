use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use glam::{Mat4, Quat, Vec3};
use crate::renderer::resources::model::Model;

static GAME_OBJECT_ID_COUNTER: AtomicU32 = AtomicU32::new(0);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub scale: Vec3,
    /// Euler angles in radians, applied in Y, X, Z order
    pub rotation: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            scale: Vec3::ONE,
            rotation: Vec3::ZERO,
        }
    }
}

impl Transform {
    /// translate * Ry * Rx * Rz * scale
    pub fn mat4(&self) -> Mat4 {
        let rotation = Quat::from_rotation_y(self.rotation.y)
            * Quat::from_rotation_x(self.rotation.x)
            * Quat::from_rotation_z(self.rotation.z);
        Mat4::from_scale_rotation_translation(self.scale, rotation, self.translation)
    }
}

/// Something the render systems can draw. Ids are unique for the lifetime of the process.
pub struct GameObject {
    pub model: Option<Arc<Model>>,
    pub color: Vec3,
    pub transform: Transform,
    id: u32,
}

impl GameObject {
    pub fn new() -> Self {
        let id = GAME_OBJECT_ID_COUNTER.fetch_add(1, Ordering::Relaxed);

        Self {
            model: None,
            color: Vec3::ONE,
            transform: Transform::default(),
            id,
        }
    }

    pub fn with_model(mut self, model: Arc<Model>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn id(&self) -> u32 {
        self.id
    }
}

impl Default for GameObject {
    fn default() -> Self {
        Self::new()
    }
}

//! Position, rotation and scale with lazily cached world matrices

use std::cell::Cell;

use glam::{EulerRot, Mat4, Quat, Vec3};

/// World-space placement of an entity or camera.
///
/// Every mutation marks the transform dirty. The world matrix and its inverse
/// transpose are rebuilt on the next read and cached until the next mutation.
#[derive(Debug, Clone)]
pub struct Transform {
    position: Vec3,
    scale: Vec3,
    rotation: Quat,
    world: Cell<Mat4>,
    world_inverse_transpose: Cell<Mat4>,
    dirty: Cell<bool>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            scale: Vec3::ONE,
            rotation: Quat::IDENTITY,
            world: Cell::new(Mat4::IDENTITY),
            world_inverse_transpose: Cell::new(Mat4::IDENTITY),
            dirty: Cell::new(false),
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_position(position: Vec3) -> Self {
        let mut transform = Self::default();
        transform.set_position(position);
        transform
    }

    pub fn from_position_scale(position: Vec3, scale: Vec3) -> Self {
        let mut transform = Self::from_position(position);
        transform.set_scale(scale);
        transform
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.dirty.set(true);
    }

    /// Offset the position in world space
    pub fn add_position(&mut self, offset: Vec3) {
        self.position += offset;
        self.dirty.set(true);
    }

    /// Offset the position along the transform's own axes
    pub fn move_relative(&mut self, offset: Vec3) {
        self.position += self.rotation * offset;
        self.dirty.set(true);
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
        self.dirty.set(true);
    }

    pub fn add_scale(&mut self, scale: Vec3) {
        self.scale += scale;
        self.dirty.set(true);
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
        self.dirty.set(true);
    }

    /// Roll about Z, then pitch about X, then yaw about Y
    pub fn set_rotation_pitch_yaw_roll(&mut self, pitch: f32, yaw: f32, roll: f32) {
        self.set_rotation(Quat::from_euler(EulerRot::YXZ, yaw, pitch, roll));
    }

    /// Apply `rotation` after the current rotation
    pub fn add_rotation(&mut self, rotation: Quat) {
        self.rotation = (rotation * self.rotation).normalize();
        self.dirty.set(true);
    }

    pub fn add_rotation_pitch_yaw_roll(&mut self, pitch: f32, yaw: f32, roll: f32) {
        self.add_rotation(Quat::from_euler(EulerRot::YXZ, yaw, pitch, roll));
    }

    /// Local +Z in world space
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::Z
    }

    /// Local +X in world space
    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    /// Local +Y in world space
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    /// Scale, then rotate, then translate
    pub fn world_matrix(&self) -> Mat4 {
        self.update_matrices();
        self.world.get()
    }

    /// Inverse transpose of the world matrix, for transforming normals
    pub fn world_inverse_transpose(&self) -> Mat4 {
        self.update_matrices();
        self.world_inverse_transpose.get()
    }

    fn update_matrices(&self) {
        if !self.dirty.get() {
            return;
        }
        let world = Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position);
        self.world.set(world);
        self.world_inverse_transpose.set(world.inverse().transpose());
        self.dirty.set(false);
    }
}

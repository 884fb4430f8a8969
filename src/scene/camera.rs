//! Left-handed free-look camera

use std::cell::Cell;
use std::f32::consts::{FRAC_PI_2, PI};

use glam::{EulerRot, Mat4, Quat, Vec2, Vec3};

use super::{CameraInput, Transform};
use crate::error::{RendererError, RendererResult};

/// Pitch stays this far inside +-90 degrees
const PITCH_LIMIT_MARGIN: f32 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProjectionKind {
    #[default]
    Perspective,
    /// View volume of `width` x `height` world units
    Orthographic,
}

/// How the view direction is derived
#[derive(Debug, Clone, Copy, PartialEq)]
enum Orientation {
    /// Pitch (x) and yaw (y) applied to world forward, with world up
    PitchYaw(Vec2),
    /// Explicit basis, used for cube face captures
    Basis { forward: Vec3, up: Vec3 },
}

/// Camera with a cached view matrix and an eagerly rebuilt projection.
///
/// The view is rebuilt on read when the transform or the look rotation changed. The
/// projection only changes inside the projection setters.
#[derive(Debug, Clone)]
pub struct Camera {
    transform: Transform,
    orientation: Orientation,
    projection_kind: ProjectionKind,
    field_of_view: f32,
    aspect_ratio: (u32, u32),
    near: f32,
    far: f32,
    movement_speed: f32,
    look_speed: f32,
    view: Cell<Mat4>,
    view_dirty: Cell<bool>,
    projection: Mat4,
}

impl Camera {
    pub const DEFAULT_FIELD_OF_VIEW: f32 = PI / 3.0;
    pub const DEFAULT_NEAR: f32 = 0.01;
    pub const DEFAULT_FAR: f32 = 1000.0;

    /// Perspective camera for a `width` x `height` target
    pub fn new(transform: Transform, width: u32, height: u32) -> RendererResult<Self> {
        validate_aspect(width, height)?;
        let mut camera = Self {
            transform,
            orientation: Orientation::PitchYaw(Vec2::ZERO),
            projection_kind: ProjectionKind::Perspective,
            field_of_view: Self::DEFAULT_FIELD_OF_VIEW,
            aspect_ratio: (width, height),
            near: Self::DEFAULT_NEAR,
            far: Self::DEFAULT_FAR,
            movement_speed: 2.0,
            look_speed: 2.0,
            view: Cell::new(Mat4::IDENTITY),
            view_dirty: Cell::new(true),
            projection: Mat4::IDENTITY,
        };
        camera.projection = camera.calculate_projection();
        Ok(camera)
    }

    /// Square 90 degree camera looking down one axis, as used for cube map faces
    pub fn cube_face(position: Vec3, forward: Vec3, up: Vec3, size: u32) -> RendererResult<Self> {
        let mut camera = Self::new(Transform::from_position(position), size, size)?;
        camera.look_to(forward, up);
        camera.set_field_of_view(FRAC_PI_2);
        Ok(camera)
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Mutable access to the transform. Marks the view for rebuilding.
    pub fn transform_mut(&mut self) -> &mut Transform {
        self.view_dirty.set(true);
        &mut self.transform
    }

    pub fn position(&self) -> Vec3 {
        self.transform.position()
    }

    pub fn forward(&self) -> Vec3 {
        match self.orientation {
            Orientation::PitchYaw(angles) => look_rotation(angles) * Vec3::Z,
            Orientation::Basis { forward, .. } => forward,
        }
    }

    fn up(&self) -> Vec3 {
        match self.orientation {
            Orientation::PitchYaw(_) => Vec3::Y,
            Orientation::Basis { up, .. } => up,
        }
    }

    /// Current pitch and yaw, in radians
    pub fn pitch_yaw(&self) -> Vec2 {
        match self.orientation {
            Orientation::PitchYaw(angles) => angles,
            Orientation::Basis { forward, .. } => {
                Vec2::new((-forward.y).clamp(-1.0, 1.0).asin(), forward.x.atan2(forward.z))
            }
        }
    }

    /// Look along `forward` with an explicit `up`, replacing the pitch/yaw rotation
    pub fn look_to(&mut self, forward: Vec3, up: Vec3) {
        self.orientation = Orientation::Basis {
            forward: forward.normalize(),
            up: up.normalize(),
        };
        self.view_dirty.set(true);
    }

    /// Add pitch (x) and yaw (y). Pitch is clamped just short of straight up or down.
    pub fn add_rotation(&mut self, pitch: f32, yaw: f32) {
        let mut angles = self.pitch_yaw();
        let limit = FRAC_PI_2 - PITCH_LIMIT_MARGIN;
        angles.x = (angles.x + pitch).clamp(-limit, limit);
        angles.y += yaw;
        self.orientation = Orientation::PitchYaw(angles);
        self.view_dirty.set(true);
    }

    /// Free-look update: movement along the look orientation, and mouse look
    /// while the look button is held
    pub fn update(&mut self, dt: f32, input: &CameraInput) {
        let movement = input.movement().normalize_or_zero() * self.movement_speed * dt;
        if movement != Vec3::ZERO {
            let rotation = look_rotation(self.pitch_yaw());
            self.transform_mut().add_position(rotation * movement);
        }

        if input.look_active && input.mouse_delta != Vec2::ZERO {
            let look = input.mouse_delta.normalize_or_zero() * self.look_speed * dt;
            self.add_rotation(look.y, look.x);
        }
    }

    /// World-to-view matrix, rebuilt if the camera moved since the last read
    pub fn view_matrix(&self) -> Mat4 {
        if self.view_dirty.get() {
            self.view.set(Mat4::look_to_lh(self.position(), self.forward(), self.up()));
            self.view_dirty.set(false);
        }
        self.view.get()
    }

    /// Whether the next [`view_matrix`](Self::view_matrix) read rebuilds the view
    pub fn view_is_stale(&self) -> bool {
        self.view_dirty.get()
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    pub fn projection_kind(&self) -> ProjectionKind {
        self.projection_kind
    }

    pub fn field_of_view(&self) -> f32 {
        self.field_of_view
    }

    pub fn aspect_ratio(&self) -> (u32, u32) {
        self.aspect_ratio
    }

    pub fn near_clip(&self) -> f32 {
        self.near
    }

    pub fn far_clip(&self) -> f32 {
        self.far
    }

    pub fn movement_speed(&self) -> f32 {
        self.movement_speed
    }

    pub fn look_speed(&self) -> f32 {
        self.look_speed
    }

    pub fn set_movement_speed(&mut self, speed: f32) {
        self.movement_speed = speed;
    }

    pub fn set_look_speed(&mut self, speed: f32) {
        self.look_speed = speed;
    }

    /// Replace every projection parameter at once
    pub fn update_projection(
        &mut self,
        field_of_view: f32,
        width: u32,
        height: u32,
        near: f32,
        far: f32,
    ) -> RendererResult<()> {
        validate_aspect(width, height)?;
        self.field_of_view = field_of_view;
        self.aspect_ratio = (width, height);
        self.near = near;
        self.far = far;
        self.projection = self.calculate_projection();
        Ok(())
    }

    pub fn set_field_of_view(&mut self, field_of_view: f32) {
        self.field_of_view = field_of_view;
        self.projection = self.calculate_projection();
    }

    pub fn set_aspect_ratio(&mut self, width: u32, height: u32) -> RendererResult<()> {
        validate_aspect(width, height)?;
        self.aspect_ratio = (width, height);
        self.projection = self.calculate_projection();
        Ok(())
    }

    pub fn set_near_clip(&mut self, near: f32) {
        self.near = near;
        self.projection = self.calculate_projection();
    }

    pub fn set_far_clip(&mut self, far: f32) {
        self.far = far;
        self.projection = self.calculate_projection();
    }

    pub fn set_projection_kind(&mut self, kind: ProjectionKind) {
        self.projection_kind = kind;
        self.projection = self.calculate_projection();
    }

    fn calculate_projection(&self) -> Mat4 {
        let (width, height) = (self.aspect_ratio.0 as f32, self.aspect_ratio.1 as f32);
        match self.projection_kind {
            ProjectionKind::Perspective => {
                Mat4::perspective_lh(self.field_of_view, width / height, self.near, self.far)
            }
            ProjectionKind::Orthographic => Mat4::orthographic_lh(
                -width / 2.0,
                width / 2.0,
                -height / 2.0,
                height / 2.0,
                self.near,
                self.far,
            ),
        }
    }
}

fn look_rotation(angles: Vec2) -> Quat {
    Quat::from_euler(EulerRot::YXZ, angles.y, angles.x, 0.0)
}

fn validate_aspect(width: u32, height: u32) -> RendererResult<()> {
    if width == 0 || height == 0 {
        return Err(RendererError::InvalidParameter(format!(
            "aspect ratio {}:{} must be non-zero",
            width, height
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Camera {
        Camera::new(Transform::new(), 1280, 720).unwrap()
    }

    #[test]
    fn test_projection_matches_field_of_view() {
        let mut camera = camera();
        let cot = 1.0 / (camera.field_of_view() / 2.0).tan();
        assert!((camera.projection_matrix().col(1).y - cot).abs() < 1e-5);

        camera.set_field_of_view(1.0);
        let cot = 1.0 / 0.5f32.tan();
        assert!((camera.projection_matrix().col(1).y - cot).abs() < 1e-5);
    }

    #[test]
    fn test_projection_unchanged_by_movement() {
        let mut camera = camera();
        let before = camera.projection_matrix();
        camera.transform_mut().add_position(Vec3::new(3.0, 1.0, -2.0));
        camera.add_rotation(0.2, 0.4);
        let input = CameraInput {
            forward: true,
            ..Default::default()
        };
        camera.update(0.5, &input);
        assert_eq!(camera.projection_matrix(), before);
    }

    #[test]
    fn test_zero_aspect_rejected() {
        assert!(Camera::new(Transform::new(), 0, 720).is_err());
        let mut camera = camera();
        assert!(camera.set_aspect_ratio(640, 0).is_err());
        assert_eq!(camera.aspect_ratio(), (1280, 720));
    }

    #[test]
    fn test_pitch_is_clamped() {
        let mut camera = camera();
        camera.add_rotation(10.0, 0.0);
        assert!((camera.pitch_yaw().x - (FRAC_PI_2 - PITCH_LIMIT_MARGIN)).abs() < 1e-6);
        camera.add_rotation(-20.0, 0.0);
        assert!((camera.pitch_yaw().x + (FRAC_PI_2 - PITCH_LIMIT_MARGIN)).abs() < 1e-6);
    }

    #[test]
    fn test_movement_is_normalized_and_scaled() {
        let mut camera = camera();
        let input = CameraInput {
            forward: true,
            right: true,
            ..Default::default()
        };
        camera.update(0.5, &input);
        let travelled = camera.position().length();
        assert!((travelled - camera.movement_speed() * 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_view_rebuilt_after_move() {
        let mut camera = camera();
        let before = camera.view_matrix();
        camera.transform_mut().set_position(Vec3::new(0.0, 0.0, -5.0));
        let after = camera.view_matrix();
        assert_ne!(before, after);
        assert!(after.transform_point3(Vec3::ZERO).abs_diff_eq(Vec3::new(0.0, 0.0, 5.0), 1e-5));
    }

    #[test]
    fn test_view_cached_between_moves() {
        let mut camera = camera();
        camera.transform_mut().add_position(Vec3::new(1.0, 0.0, 0.0));
        assert!(camera.view_is_stale());

        let first = camera.view_matrix();
        // The transform's own world cache is never read by the camera
        assert!(camera.transform().is_dirty());
        assert!(!camera.view_is_stale());
        assert_eq!(camera.view_matrix(), first);
        assert!(!camera.view_is_stale());

        camera.add_rotation(0.1, 0.0);
        assert!(camera.view_is_stale());
        assert_ne!(camera.view_matrix(), first);
    }

    #[test]
    fn test_mouse_look_requires_button() {
        let mut camera = camera();
        let mut input = CameraInput {
            mouse_delta: Vec2::new(10.0, 0.0),
            ..Default::default()
        };
        camera.update(0.1, &input);
        assert_eq!(camera.pitch_yaw(), Vec2::ZERO);

        input.look_active = true;
        camera.update(0.1, &input);
        assert!((camera.pitch_yaw().y - camera.look_speed() * 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_orthographic_uses_aspect_as_volume() {
        let mut camera = Camera::new(Transform::new(), 20, 10).unwrap();
        camera.set_projection_kind(ProjectionKind::Orthographic);
        let projection = camera.projection_matrix();
        assert!((projection.col(0).x - 2.0 / 20.0).abs() < 1e-6);
        assert!((projection.col(1).y - 2.0 / 10.0).abs() < 1e-6);
    }
}

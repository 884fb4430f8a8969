//! Drawable entities: a shared mesh and material placed by an owned transform

use std::sync::Arc;

use super::{Camera, Transform};
use crate::backend::GraphicsBackend;
use crate::context::RenderContext;
use crate::error::RendererResult;
use crate::resources::{Material, Mesh};
use crate::shader::ShaderParameters;

#[derive(Debug, Clone)]
pub struct Entity {
    mesh: Arc<Mesh>,
    material: Arc<Material>,
    transform: Transform,
    time: f32,
}

impl Entity {
    pub fn new(mesh: Arc<Mesh>, material: Arc<Material>) -> Self {
        Self {
            mesh,
            material,
            transform: Transform::default(),
            time: 0.0,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }

    pub fn material(&self) -> &Arc<Material> {
        &self.material
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn transform_mut(&mut self) -> &mut Transform {
        &mut self.transform
    }

    /// Seconds accumulated through [`update`](Self::update)
    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn update(&mut self, dt: f32) {
        self.time += dt;
    }

    /// Stage per-object constants, prepare the material and draw the mesh.
    ///
    /// Any extra pixel shader inputs (lights, IBL maps) must already be staged on the
    /// material's pixel shader.
    pub fn draw<B: GraphicsBackend>(
        &self,
        ctx: &mut RenderContext<B>,
        camera: &Camera,
    ) -> RendererResult<()> {
        let vs = self.material.vertex_shader();
        let ps = self.material.pixel_shader();

        vs.set_matrix4x4("c_worldTransform", self.transform.world_matrix());
        vs.set_matrix4x4("c_worldInvTranspose", self.transform.world_inverse_transpose());
        vs.set_matrix4x4("c_viewMatrix", camera.view_matrix());
        vs.set_matrix4x4("c_projectionMatrix", camera.projection_matrix());

        ps.set_float3("c_cameraPosition", camera.position());
        ps.set_float("c_time", self.time);

        self.material.prepare();

        vs.copy_all_buffer_data(ctx)?;
        ps.copy_all_buffer_data(ctx)?;

        log::trace!("Drawing {} with {}", self.mesh.name(), self.material.name);
        self.mesh.draw(ctx, vs, ps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DummyBackend, TextureDescriptor, TextureUsage, TextureViewDescriptor};
    use crate::resources::MeshData;
    use crate::shader::library::{PBR_PIXEL_SHADER, PBR_VERTEX_SHADER};
    use crate::shader::Shader;
    use glam::{Mat4, Vec3};

    fn entity(ctx: &mut RenderContext<DummyBackend>) -> Entity {
        let mesh = Mesh::new(ctx, "Cube", &MeshData::cube()).unwrap();
        let material = Material::new(
            "Plain",
            Shader::vertex("PBR VS", PBR_VERTEX_SHADER).unwrap(),
            Shader::pixel("PBR PS", PBR_PIXEL_SHADER).unwrap(),
        );
        Entity::new(Arc::new(mesh), Arc::new(material))
    }

    #[test]
    fn test_update_accumulates_time() {
        let mut ctx = RenderContext::new(DummyBackend::new(8, 8));
        let mut entity = entity(&mut ctx);
        entity.update(0.25);
        entity.update(0.5);
        assert!((entity.time() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_draw_stages_transform_and_camera() {
        let mut ctx = RenderContext::new(DummyBackend::new(8, 8));
        let mut entity = entity(&mut ctx);
        entity.transform_mut().set_position(Vec3::new(1.0, 2.0, 3.0));
        let camera = Camera::new(Transform::from_position(Vec3::new(0.0, 0.0, -5.0)), 8, 8).unwrap();

        let color = ctx
            .create_texture(&TextureDescriptor {
                width: 8,
                height: 8,
                usage: TextureUsage::RENDER_TARGET,
                ..Default::default()
            })
            .unwrap();
        let view = ctx
            .create_texture_view(color, &TextureViewDescriptor::d2())
            .unwrap();
        ctx.set_render_targets(&[view], None).unwrap();
        entity.draw(&mut ctx, &camera).unwrap();

        let vs = entity.material().vertex_shader();
        let world = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(
            vs.staged_data("c_worldTransform").unwrap(),
            bytemuck::bytes_of(&world).to_vec()
        );
        let ps = entity.material().pixel_shader();
        assert_eq!(
            ps.staged_data("c_cameraPosition").unwrap(),
            bytemuck::bytes_of(&Vec3::new(0.0, 0.0, -5.0)).to_vec()
        );
        assert_eq!(ctx.draw_calls(), 1);
    }
}

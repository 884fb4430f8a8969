//! Materials: a shader pair plus the named resources and scalars it is drawn with

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::{Vec2, Vec4};

use crate::backend::{SamplerHandle, TextureViewHandle};
use crate::shader::{Shader, ShaderParameters};

/// Surface description shared by any number of entities
#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    vertex_shader: Arc<Shader>,
    pixel_shader: Arc<Shader>,
    textures: BTreeMap<String, TextureViewHandle>,
    samplers: BTreeMap<String, SamplerHandle>,
    pub color_tint: Vec4,
    /// Multiplier on the roughness texture
    pub roughness: f32,
    pub uv_offset: Vec2,
    pub uv_scale: Vec2,
}

impl Material {
    pub fn new(name: &str, vertex_shader: Arc<Shader>, pixel_shader: Arc<Shader>) -> Self {
        Self {
            name: name.to_string(),
            vertex_shader,
            pixel_shader,
            textures: BTreeMap::new(),
            samplers: BTreeMap::new(),
            color_tint: Vec4::ONE,
            roughness: 1.0,
            uv_offset: Vec2::ZERO,
            uv_scale: Vec2::ONE,
        }
    }

    pub fn with_color_tint(mut self, tint: Vec4) -> Self {
        self.color_tint = tint;
        self
    }

    pub fn with_roughness(mut self, roughness: f32) -> Self {
        self.roughness = roughness;
        self
    }

    pub fn with_uv_transform(mut self, offset: Vec2, scale: Vec2) -> Self {
        self.uv_offset = offset;
        self.uv_scale = scale;
        self
    }

    pub fn with_texture(mut self, name: &str, view: TextureViewHandle) -> Self {
        self.add_texture_srv(name, view);
        self
    }

    pub fn with_sampler(mut self, name: &str, sampler: SamplerHandle) -> Self {
        self.add_sampler(name, sampler);
        self
    }

    /// Register a texture under the shader variable name it binds to
    pub fn add_texture_srv(&mut self, name: &str, view: TextureViewHandle) {
        self.textures.insert(name.to_string(), view);
    }

    /// Register a sampler under the shader variable name it binds to
    pub fn add_sampler(&mut self, name: &str, sampler: SamplerHandle) {
        self.samplers.insert(name.to_string(), sampler);
    }

    pub fn vertex_shader(&self) -> &Arc<Shader> {
        &self.vertex_shader
    }

    pub fn pixel_shader(&self) -> &Arc<Shader> {
        &self.pixel_shader
    }

    pub fn texture(&self, name: &str) -> Option<TextureViewHandle> {
        self.textures.get(name).copied()
    }

    pub fn sampler(&self, name: &str) -> Option<SamplerHandle> {
        self.samplers.get(name).copied()
    }

    /// Stage scalars, textures and samplers on the pixel shader.
    ///
    /// Only names the pixel shader declares are written. Nothing is uploaded here;
    /// the caller copies buffer data once every value is staged.
    pub fn prepare(&self) {
        let ps = &self.pixel_shader;
        ps.set_float4("c_colorTint", self.color_tint);
        ps.set_float("c_roughness", self.roughness);
        ps.set_float2("c_uvOffset", self.uv_offset);
        ps.set_float2("c_uvScale", self.uv_scale);

        for (name, view) in &self.textures {
            ps.set_shader_resource_view(name, *view);
        }
        for (name, sampler) in &self.samplers {
            ps.set_sampler_state(name, *sampler);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::library::{PBR_PIXEL_SHADER, PBR_VERTEX_SHADER};

    fn pbr_material() -> Material {
        Material::new(
            "test",
            Shader::vertex("PBR VS", PBR_VERTEX_SHADER).unwrap(),
            Shader::pixel("PBR PS", PBR_PIXEL_SHADER).unwrap(),
        )
    }

    #[test]
    fn test_prepare_stages_declared_values() {
        let material = pbr_material()
            .with_color_tint(Vec4::new(0.5, 0.25, 1.0, 1.0))
            .with_roughness(0.3);
        material.prepare();

        let ps = material.pixel_shader();
        assert_eq!(
            ps.staged_data("c_roughness").unwrap(),
            0.3f32.to_ne_bytes().to_vec()
        );
        assert_eq!(
            ps.staged_data("c_colorTint").unwrap(),
            bytemuck::bytes_of(&Vec4::new(0.5, 0.25, 1.0, 1.0)).to_vec()
        );
    }

    #[test]
    fn test_undeclared_textures_are_skipped() {
        let albedo = TextureViewHandle(40);
        let material = pbr_material()
            .with_texture("AlbedoTexture", albedo)
            .with_texture("EmissiveTexture", TextureViewHandle(41));
        material.prepare();

        let ps = material.pixel_shader();
        assert_eq!(ps.bound_texture("AlbedoTexture"), Some(albedo));
        assert_eq!(ps.bound_texture("EmissiveTexture"), None);
    }
}

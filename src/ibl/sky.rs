//! Sky box and the image-based lighting maps derived from it

use std::sync::Arc;

use crate::backend::*;
use crate::context::{RasterState, RenderContext};
use crate::error::{RendererError, RendererResult};
use crate::ibl::cubemap::{self, CubeTarget};
use crate::resources::{GpuTexture, Mesh, MeshData};
use crate::scene::Camera;
use crate::shader::{Shader, ShaderParameters};
use crate::IblConfig;

/// Cube drawn around the camera at the far plane, sampling the cube map by object-space direction
pub const SKY_VERTEX_SHADER: &str = r#"
struct SkyConstants {
    c_viewMatrix: mat4x4<f32>,
    c_projectionMatrix: mat4x4<f32>,
}

@group(0) @binding(0) var<uniform> constants: SkyConstants;

struct VertexInput {
    @location(0) position: vec3<f32>,
}

struct VertexToPixel {
    @builtin(position) position: vec4<f32>,
    @location(0) sample_direction: vec3<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexToPixel {
    var output: VertexToPixel;

    var view = constants.c_viewMatrix;
    view[3] = vec4<f32>(0.0, 0.0, 0.0, 1.0);

    let clip = constants.c_projectionMatrix * view * vec4<f32>(input.position, 1.0);
    output.position = clip.xyww;
    output.sample_direction = input.position;

    return output;
}
"#;

pub const SKY_PIXEL_SHADER: &str = r#"
@group(1) @binding(0) var CubeMap: texture_cube<f32>;
@group(1) @binding(1) var SkySampler: sampler;

struct VertexToPixel {
    @builtin(position) position: vec4<f32>,
    @location(0) sample_direction: vec3<f32>,
}

@fragment
fn fs_main(input: VertexToPixel) -> @location(0) vec4<f32> {
    return textureSample(CubeMap, SkySampler, input.sample_direction);
}
"#;

const DERIVED_FORMAT: TextureFormat = TextureFormat::Rgba16Float;

/// Environment cube map with its sky pass and precomputed lighting
#[derive(Debug)]
pub struct Sky {
    cube_map: GpuTexture,
    mesh: Arc<Mesh>,
    sampler: SamplerHandle,
    vertex_shader: Arc<Shader>,
    pixel_shader: Arc<Shader>,
    raster: RasterState,
    environment_map: Option<CubeTarget>,
    reflectance_map: Option<CubeTarget>,
}

impl Sky {
    /// Wrap a cube texture. The IBL maps are built separately.
    pub fn new<B: GraphicsBackend>(
        ctx: &mut RenderContext<B>,
        cube_map: GpuTexture,
        vertex_shader: Arc<Shader>,
        pixel_shader: Arc<Shader>,
    ) -> RendererResult<Self> {
        match ctx.view_info(cube_map.view) {
            Some(info) if info.dimension == ViewDimension::Cube => {}
            _ => {
                return Err(RendererError::InvalidParameter(format!(
                    "sky texture {} is not a cube map",
                    cube_map.name
                )))
            }
        }
        let mesh = Mesh::new(ctx, "Sky Cube", &MeshData::cube())?;
        let sampler = ctx.create_sampler(&SamplerDescriptor::linear_point_mip(
            AddressMode::Repeat,
            "Sky Sampler",
        ))?;

        Ok(Self {
            cube_map,
            mesh: Arc::new(mesh),
            sampler,
            vertex_shader,
            pixel_shader,
            raster: RasterState::SKY,
            environment_map: None,
            reflectance_map: None,
        })
    }

    /// Draw the sky behind everything already in the bound depth target
    pub fn draw<B: GraphicsBackend>(
        &self,
        ctx: &mut RenderContext<B>,
        camera: &Camera,
    ) -> RendererResult<()> {
        ctx.set_raster_state(self.raster);

        let vs = &self.vertex_shader;
        let ps = &self.pixel_shader;
        vs.set_matrix4x4("c_viewMatrix", camera.view_matrix());
        vs.set_matrix4x4("c_projectionMatrix", camera.projection_matrix());
        ps.set_sampler_state("SkySampler", self.sampler);
        ps.set_shader_resource_view("CubeMap", self.cube_map.view);
        vs.copy_all_buffer_data(ctx)?;
        ps.copy_all_buffer_data(ctx)?;

        let result = self.mesh.draw(ctx, vs, ps);
        ctx.reset_raster_state();
        result
    }

    /// Convolve the sky into a diffuse irradiance cube, 1/16th of the source size
    pub fn create_environment_map<B: GraphicsBackend>(
        &mut self,
        ctx: &mut RenderContext<B>,
        vs: &Shader,
        ps: &Shader,
        config: &IblConfig,
    ) -> RendererResult<TextureViewHandle> {
        let size = (self.cube_map.width / config.irradiance_divisor.max(1)).max(1);
        log::info!("Baking irradiance map ({}x{} per face)", size, size);

        let target = CubeTarget::new(ctx, "Irradiance Map", size, 1, DERIVED_FORMAT)?;
        cubemap::convolve_irradiance(
            ctx,
            &target,
            vs,
            ps,
            self.cube_map.view,
            self.sampler,
            config.phi_step,
            config.theta_step,
        )?;

        let view = target.view();
        if let Some(old) = self.environment_map.replace(target) {
            old.destroy(ctx);
        }
        log::info!("Irradiance map ready");
        Ok(view)
    }

    /// Prefilter the sky for glossy reflections, one roughness per mip
    pub fn create_specular_reflectance_map<B: GraphicsBackend>(
        &mut self,
        ctx: &mut RenderContext<B>,
        vs: &Shader,
        ps: &Shader,
        config: &IblConfig,
    ) -> RendererResult<TextureViewHandle> {
        let size = (self.cube_map.width / config.specular_divisor.max(1)).max(1);
        let mips = cubemap::mip_count(size, config.ignored_small_mips);
        log::info!("Baking specular map ({}x{} per face, {} mips)", size, size, mips);

        let target = CubeTarget::new(ctx, "Specular Reflectance Map", size, mips, DERIVED_FORMAT)?;
        cubemap::prefilter_cubemap(ctx, &target, vs, ps, self.cube_map.view, self.sampler)?;

        let view = target.view();
        if let Some(old) = self.reflectance_map.replace(target) {
            old.destroy(ctx);
        }
        log::info!("Specular map ready");
        Ok(view)
    }

    /// Diffuse irradiance cube, once baked
    pub fn environment_map(&self) -> Option<TextureViewHandle> {
        self.environment_map.as_ref().map(CubeTarget::view)
    }

    /// Prefiltered specular cube, once baked
    pub fn reflectance_map(&self) -> Option<TextureViewHandle> {
        self.reflectance_map.as_ref().map(CubeTarget::view)
    }

    pub fn reflectance_mip_levels(&self) -> u32 {
        self.reflectance_map.as_ref().map_or(0, CubeTarget::mip_levels)
    }

    /// Source cube map
    pub fn cube_map(&self) -> TextureViewHandle {
        self.cube_map.view
    }

    pub fn size(&self) -> u32 {
        self.cube_map.width
    }

    pub fn sampler(&self) -> SamplerHandle {
        self.sampler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DummyBackend, RecordedCommand};
    use crate::resources::gradient_sky_faces;
    use crate::shader::library::ShaderLibrary;
    use crate::scene::Transform;
    use glam::Vec3;

    fn sky(ctx: &mut RenderContext<DummyBackend>, library: &ShaderLibrary, size: u32) -> Sky {
        let faces = gradient_sky_faces(size, Vec3::Y);
        let cube = GpuTexture::create_cube(ctx, "Sky", &faces).unwrap();
        Sky::new(ctx, cube, library.sky_vs.clone(), library.sky_ps.clone()).unwrap()
    }

    #[test]
    fn test_derived_map_sizes() {
        let library = ShaderLibrary::load().unwrap();
        let mut ctx = RenderContext::new(DummyBackend::new(16, 16));
        let mut sky = sky(&mut ctx, &library, 256);
        let config = IblConfig::default();

        let irradiance = sky
            .create_environment_map(&mut ctx, &library.fullscreen_vs, &library.irradiance_ps, &config)
            .unwrap();
        let specular = sky
            .create_specular_reflectance_map(&mut ctx, &library.fullscreen_vs, &library.prefilter_ps, &config)
            .unwrap();

        assert_eq!(ctx.view_info(irradiance).unwrap().width, 16);
        assert_eq!(ctx.view_info(specular).unwrap().width, 32);
        assert_eq!(sky.reflectance_mip_levels(), 3);
        assert_eq!(sky.environment_map(), Some(irradiance));
    }

    #[test]
    fn test_specular_bake_restores_bound_targets() {
        let library = ShaderLibrary::load().unwrap();
        let mut ctx = RenderContext::new(DummyBackend::new(16, 16));
        let mut sky = sky(&mut ctx, &library, 64);
        let back_buffer = ctx.swapchain_view();
        ctx.set_render_targets(&[back_buffer], None).unwrap();
        ctx.set_viewport(Viewport::new(16, 16));

        sky.create_specular_reflectance_map(
            &mut ctx,
            &library.fullscreen_vs,
            &library.prefilter_ps,
            &IblConfig::default(),
        )
        .unwrap();

        assert_eq!(ctx.state().color_targets, vec![back_buffer]);
        assert_eq!(ctx.viewport(), Viewport::new(16, 16));
    }

    #[test]
    fn test_draw_resets_raster_state() {
        let library = ShaderLibrary::load().unwrap();
        let mut ctx = RenderContext::new(DummyBackend::new(16, 16));
        let sky = sky(&mut ctx, &library, 8);
        let camera = Camera::new(Transform::default(), 16, 16).unwrap();
        let back_buffer = ctx.swapchain_view();
        ctx.set_render_targets(&[back_buffer], None).unwrap();

        sky.draw(&mut ctx, &camera).unwrap();

        assert_eq!(ctx.raster_state(), RasterState::default());
        let pipeline = ctx
            .backend()
            .commands()
            .iter()
            .find_map(|c| match c {
                RecordedCommand::SetPipeline(pipeline) => Some(*pipeline),
                _ => None,
            })
            .unwrap();
        let desc = ctx.backend().pipeline_descriptor(pipeline).unwrap();
        assert_eq!(desc.cull_mode, CullMode::Front);
    }
}

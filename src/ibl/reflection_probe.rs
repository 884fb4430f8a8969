//! Local reflection probes: capture the scene into a cube and prefilter it

use std::sync::Arc;

use glam::Vec3;

use super::cubemap::{self, CubeFace, CubeTarget};
use super::{BrdfLut, Sky};
use crate::backend::*;
use crate::context::RenderContext;
use crate::error::RendererResult;
use crate::renderer::stage_scene_inputs;
use crate::scene::{Camera, Entity, Light, LightSet};
use crate::shader::Shader;
use crate::ProbeConfig;

const PROBE_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

/// Scene capture at a point, refreshed when [`draw`](ReflectionProbe::draw) is called
#[derive(Debug)]
pub struct ReflectionProbe {
    position: Vec3,
    radius: f32,
    config: ProbeConfig,
    reflection: CubeTarget,
    capture: CubeTarget,
    depth_texture: TextureHandle,
    depth_view: TextureViewHandle,
    sampler: SamplerHandle,
    convolve_vs: Arc<Shader>,
    convolve_ps: Arc<Shader>,
}

impl ReflectionProbe {
    pub fn new<B: GraphicsBackend>(
        ctx: &mut RenderContext<B>,
        position: Vec3,
        radius: f32,
        config: &ProbeConfig,
        convolve_vs: Arc<Shader>,
        convolve_ps: Arc<Shader>,
    ) -> RendererResult<Self> {
        let (reflection, capture, depth_texture, depth_view) = Self::build_resources(ctx, config)?;
        let sampler = ctx.create_sampler(&SamplerDescriptor::linear_point_mip(
            AddressMode::ClampToEdge,
            "Probe Sampler",
        ))?;

        Ok(Self {
            position,
            radius,
            config: config.clone(),
            reflection,
            capture,
            depth_texture,
            depth_view,
            sampler,
            convolve_vs,
            convolve_ps,
        })
    }

    fn build_resources<B: GraphicsBackend>(
        ctx: &mut RenderContext<B>,
        config: &ProbeConfig,
    ) -> RendererResult<(CubeTarget, CubeTarget, TextureHandle, TextureViewHandle)> {
        let mips = cubemap::mip_count(config.reflection_size, config.ignored_small_mips);
        let reflection = CubeTarget::new(ctx, "Probe Reflection", config.reflection_size, mips, PROBE_FORMAT)?;
        let capture = CubeTarget::new(ctx, "Probe Capture", config.capture_size, 1, PROBE_FORMAT)?;

        let depth_texture = ctx.create_texture(&TextureDescriptor {
            label: Some("Probe Depth".to_string()),
            width: config.capture_size,
            height: config.capture_size,
            kind: TextureKind::D2,
            mip_levels: 1,
            format: TextureFormat::Depth32Float,
            usage: TextureUsage::RENDER_ATTACHMENT,
        })?;
        let depth_view = ctx.create_texture_view(depth_texture, &TextureViewDescriptor::d2())?;
        log::debug!(
            "Probe resources: {} capture, {} reflection with {} mips",
            config.capture_size,
            config.reflection_size,
            mips
        );

        Ok((reflection, capture, depth_texture, depth_view))
    }

    /// Capture the scene around the probe and rebuild its reflection cube
    pub fn draw<B: GraphicsBackend>(
        &self,
        ctx: &mut RenderContext<B>,
        entities: &[Entity],
        lights: &[Light],
        sky: &Sky,
        brdf_lut: &BrdfLut,
    ) -> RendererResult<()> {
        let lights = LightSet::partition(lights);
        {
            let mut guard = ctx.save_state();
            let ctx = &mut *guard;
            ctx.clear_input_assembler();

            let size = self.config.capture_size;
            for face in CubeFace::ALL {
                let camera = self.face_camera(face)?;
                let target = self.capture.face_view(face, 0);
                ctx.clear_color(target, [0.0, 0.0, 0.0, 1.0])?;
                ctx.clear_depth(self.depth_view, 1.0)?;
                ctx.set_render_targets(&[target], Some(self.depth_view))?;
                ctx.set_viewport(Viewport::new(size, size));

                for entity in entities {
                    stage_scene_inputs(entity.material().pixel_shader(), &lights, sky, brdf_lut.view(), true);
                    entity.draw(ctx, &camera)?;
                }
                sky.draw(ctx, &camera)?;
            }
        }

        cubemap::prefilter_cubemap(
            ctx,
            &self.reflection,
            &self.convolve_vs,
            &self.convolve_ps,
            self.capture.view(),
            self.sampler,
        )
    }

    /// 90 degree camera at the probe looking down `face`
    pub fn face_camera(&self, face: CubeFace) -> RendererResult<Camera> {
        Camera::cube_face(self.position, face.forward(), face.up(), self.config.capture_size)
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn set_radius(&mut self, radius: f32) {
        self.radius = radius;
    }

    /// Prefiltered reflection cube, every mip
    pub fn reflection_map(&self) -> TextureViewHandle {
        self.reflection.view()
    }

    pub fn reflection_mip_levels(&self) -> u32 {
        self.reflection.mip_levels()
    }

    /// Unfiltered scene capture
    pub fn capture_map(&self) -> TextureViewHandle {
        self.capture.view()
    }

    pub fn destroy<B: GraphicsBackend>(self, ctx: &mut RenderContext<B>) {
        self.reflection.destroy(ctx);
        self.capture.destroy(ctx);
        ctx.destroy_texture(self.depth_texture);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::resources::{gradient_sky_faces, GpuTexture};
    use crate::shader::library::ShaderLibrary;

    fn probe(ctx: &mut RenderContext<DummyBackend>, library: &ShaderLibrary) -> ReflectionProbe {
        ReflectionProbe::new(
            ctx,
            Vec3::new(1.0, 2.0, 3.0),
            5.0,
            &ProbeConfig::default(),
            library.fullscreen_vs.clone(),
            library.prefilter_ps.clone(),
        )
        .unwrap()
    }

    #[test]
    fn test_resource_sizes() {
        let library = ShaderLibrary::load().unwrap();
        let mut ctx = RenderContext::new(DummyBackend::new(8, 8));
        let probe = probe(&mut ctx, &library);

        assert_eq!(probe.reflection_mip_levels(), 5);
        let reflection = ctx.view_info(probe.reflection_map()).unwrap();
        assert_eq!((reflection.width, reflection.format), (128, TextureFormat::Rgba8Unorm));
        let capture = ctx.view_info(probe.capture_map()).unwrap();
        assert_eq!(capture.width, 512);
    }

    #[test]
    fn test_face_cameras_are_distinct_axes() {
        let library = ShaderLibrary::load().unwrap();
        let mut ctx = RenderContext::new(DummyBackend::new(8, 8));
        let probe = probe(&mut ctx, &library);

        let forwards: Vec<Vec3> = CubeFace::ALL
            .iter()
            .map(|face| probe.face_camera(*face).unwrap().forward())
            .collect();
        for (i, a) in forwards.iter().enumerate() {
            assert_eq!(a.abs().max_element(), 1.0);
            for b in &forwards[i + 1..] {
                assert!(a.dot(*b) < 0.5);
            }
        }
        let camera = probe.face_camera(CubeFace::PositiveX).unwrap();
        assert_eq!(camera.position(), Vec3::new(1.0, 2.0, 3.0));
        assert!((camera.field_of_view() - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn test_draw_restores_state() {
        let library = ShaderLibrary::load().unwrap();
        let mut ctx = RenderContext::new(DummyBackend::new(8, 8));
        let probe = probe(&mut ctx, &library);
        let cube = GpuTexture::create_cube(&mut ctx, "Sky", &gradient_sky_faces(16, Vec3::Y)).unwrap();
        let sky = Sky::new(&mut ctx, cube, library.sky_vs.clone(), library.sky_ps.clone()).unwrap();
        let lut = BrdfLut::generate(&mut ctx, &library.fullscreen_vs, &library.brdf_lut_ps, 16).unwrap();

        let back_buffer = ctx.swapchain_view();
        ctx.set_render_targets(&[back_buffer], None).unwrap();
        ctx.set_viewport(Viewport::new(8, 8));
        let before = ctx.draw_calls();
        probe.draw(&mut ctx, &[], &[], &sky, &lut).unwrap();

        assert_eq!(ctx.state().color_targets, vec![back_buffer]);
        assert_eq!(ctx.viewport(), Viewport::new(8, 8));
        // Six sky draws plus six faces for each of five mips
        assert_eq!(ctx.draw_calls() - before, 6 + 6 * 5);
    }
}

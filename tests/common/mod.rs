//! Shared setup for the headless renderer tests.
//!
//! Everything runs on the recording [`DummyBackend`], so tests assert on the command
//! log instead of pixels.

#![allow(dead_code)]

use std::sync::Arc;

use glam::Vec3;
use ibl_renderer::backend::{DummyBackend, RecordedCommand, RecordedPass, TextureViewHandle};
use ibl_renderer::renderer::DepthBuffer;
use ibl_renderer::resources::{gradient_sky_faces, GpuTexture, Material, Mesh, MeshData};
use ibl_renderer::scene::{Camera, Entity, Light, Transform};
use ibl_renderer::shader::library::ShaderLibrary;
use ibl_renderer::{BrdfLut, IblConfig, RenderContext, Renderer, RendererConfig, RendererResult, Sky};

pub const WIDTH: u32 = 64;
pub const HEIGHT: u32 = 48;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A renderer with a baked sky on a recording backend
pub struct Harness {
    pub ctx: RenderContext<DummyBackend>,
    pub library: ShaderLibrary,
    pub sky: Sky,
    pub brdf_lut: BrdfLut,
    pub depth: DepthBuffer,
    pub renderer: Renderer,
    pub camera: Camera,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(&small_config())
    }

    pub fn with_config(config: &RendererConfig) -> Self {
        init_logging();
        let mut ctx = RenderContext::new(DummyBackend::new(WIDTH, HEIGHT));
        let library = ShaderLibrary::load().unwrap();

        let cube = GpuTexture::create_cube(&mut ctx, "Sky", &gradient_sky_faces(64, Vec3::Y)).unwrap();
        let mut sky = Sky::new(&mut ctx, cube, library.sky_vs.clone(), library.sky_ps.clone()).unwrap();
        let brdf_lut = BrdfLut::generate(
            &mut ctx,
            &library.fullscreen_vs,
            &library.brdf_lut_ps,
            config.ibl.brdf_lut_size,
        )
        .unwrap();
        sky.create_environment_map(&mut ctx, &library.fullscreen_vs, &library.irradiance_ps, &config.ibl)
            .unwrap();
        sky.create_specular_reflectance_map(&mut ctx, &library.fullscreen_vs, &library.prefilter_ps, &config.ibl)
            .unwrap();
        ctx.submit();

        let depth = DepthBuffer::create(&mut ctx, WIDTH, HEIGHT).unwrap();
        let back_buffer = ctx.swapchain_view();
        let renderer = Renderer::new(
            &mut ctx,
            config,
            WIDTH,
            HEIGHT,
            back_buffer,
            depth.view,
            brdf_lut.view(),
            library.fullscreen_vs.clone(),
        )
        .unwrap();
        let camera = Camera::new(Transform::from_position(Vec3::new(0.0, 0.0, -5.0)), WIDTH, HEIGHT).unwrap();

        Self {
            ctx,
            library,
            sky,
            brdf_lut,
            depth,
            renderer,
            camera,
        }
    }

    pub fn back_buffer(&self) -> TextureViewHandle {
        self.ctx.swapchain_view()
    }

    /// One sphere with the built-in PBR material
    pub fn sphere(&mut self) -> Entity {
        let mut data = MeshData::sphere(8, 4);
        data.generate_tangents();
        let mesh = Mesh::new(&mut self.ctx, "Sphere", &data).unwrap();
        let material = Material::new("PBR", self.library.pbr_vs.clone(), self.library.pbr_ps.clone());
        Entity::new(Arc::new(mesh), Arc::new(material))
    }

    /// Run a whole frame, returning the first error
    pub fn run_frame(&mut self, entities: &[Entity], lights: &[Light]) -> RendererResult<()> {
        self.renderer.frame_start(&mut self.ctx)?;
        self.renderer
            .render(&mut self.ctx, entities, lights, &self.camera, &self.sky)?;
        self.renderer.post_process(&mut self.ctx, &self.camera)?;
        self.renderer.frame_end(&mut self.ctx, true)
    }

    /// Release, reallocate the depth buffer and rebuild at a new size
    pub fn resize(&mut self, width: u32, height: u32) -> RendererResult<()> {
        self.renderer.pre_resize(&mut self.ctx)?;
        self.depth.release(&mut self.ctx);
        self.ctx.resize_surface(width, height);
        self.depth = DepthBuffer::create(&mut self.ctx, width, height)?;
        let back_buffer = self.ctx.swapchain_view();
        self.renderer
            .post_resize(&mut self.ctx, width, height, back_buffer, self.depth.view)
    }

    /// Passes that drew something, in order
    pub fn drawing_passes(&self) -> Vec<RecordedPass> {
        self.ctx
            .backend()
            .passes()
            .into_iter()
            .filter(|pass| pass.draws > 0)
            .collect()
    }

    pub fn commands(&self) -> &[RecordedCommand] {
        self.ctx.backend().commands()
    }
}

/// Default settings with small bake sizes to keep the command log short
pub fn small_config() -> RendererConfig {
    RendererConfig {
        ibl: IblConfig {
            brdf_lut_size: 16,
            ..IblConfig::default()
        },
        ..RendererConfig::default()
    }
}

/// Bytes of an `i32` as staged on a shader
pub fn int_bytes(value: i32) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

//! # PBR Scene Demo
//!
//! Demonstrates:
//! - Multi-render-target PBR rendering with image-based lighting
//! - GPU irradiance convolution and specular prefiltering of the sky
//! - BRDF lookup table for the split-sum approximation
//! - SSAO → blur → combine post-processing
//! - An optional reflection probe feeding one mirror sphere
//! - Free-look camera (WASD + Space/Shift, hold right mouse to look)
//! - egui overlay with render target thumbnails
//!
//! Run with `cargo run --example pbr_scene -- --help` for options.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use glam::{Vec2, Vec3, Vec4};
use winit::event::{DeviceEvent, ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};

use ibl_renderer::backend::{AddressMode, BackendError, SamplerDescriptor};
use ibl_renderer::debug_ui::OverlayStats;
use ibl_renderer::renderer::DepthBuffer;
use ibl_renderer::resources::{gradient_sky_faces, load_cube_faces, GpuTexture, Material, Mesh, MeshData, TextureData};
use ibl_renderer::scene::{Camera, CameraInput, Entity, Light, Transform};
use ibl_renderer::shader::library::ShaderLibrary;
use ibl_renderer::{
    BrdfLut, DebugOverlay, ReflectionProbe, RenderContext, Renderer, RendererConfig, RendererError,
    RendererResult, Sky, SsaoConfig, WgpuBackend, Window,
};

#[derive(Parser, Debug)]
#[command(name = "pbr_scene", about = "PBR spheres lit by a baked sky, with SSAO")]
struct Args {
    /// Window width in pixels
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Window height in pixels
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Present without waiting for vertical blank
    #[arg(long)]
    no_vsync: bool,

    /// Six cube face images in +X -X +Y -Y +Z -Z order. A gradient sky is used otherwise.
    #[arg(long, num_args = 6, value_names = ["POS_X", "NEG_X", "POS_Y", "NEG_Y", "POS_Z", "NEG_Z"])]
    sky: Option<Vec<PathBuf>>,

    /// Face size of the generated gradient sky
    #[arg(long, default_value_t = 256)]
    sky_size: u32,

    /// SSAO kernel samples (at most 64)
    #[arg(long, default_value_t = 64)]
    ssao_samples: u32,

    /// SSAO view-space radius
    #[arg(long, default_value_t = 1.0)]
    ssao_radius: f32,

    /// Capture a reflection probe at the origin for the mirror sphere
    #[arg(long)]
    probe: bool,
}

impl Args {
    fn config(&self) -> RendererConfig {
        RendererConfig {
            title: "IBL Renderer - PBR Scene".to_string(),
            width: self.width,
            height: self.height,
            vsync: !self.no_vsync,
            ssao: SsaoConfig {
                sample_count: self.ssao_samples,
                radius: self.ssao_radius,
                ..SsaoConfig::default()
            },
            ..RendererConfig::default()
        }
    }

    fn sky_faces(&self) -> RendererResult<[TextureData; 6]> {
        match &self.sky {
            Some(paths) => {
                let paths: [PathBuf; 6] = paths.clone().try_into().map_err(|_| {
                    RendererError::InvalidParameter("--sky takes exactly six images".to_string())
                })?;
                load_cube_faces(&paths)
            }
            None => Ok(gradient_sky_faces(
                self.sky_size,
                Vec3::new(0.4, 0.6, 0.5).normalize(),
            )),
        }
    }
}

struct Demo {
    ctx: RenderContext<WgpuBackend>,
    renderer: Renderer,
    overlay: DebugOverlay,
    sky: Sky,
    _brdf_lut: BrdfLut,
    _probe: Option<ReflectionProbe>,
    depth: DepthBuffer,
    entities: Vec<Entity>,
    lights: Vec<Light>,
    camera: Camera,
    input: CameraInput,
    vsync: bool,
    last_frame: Instant,
}

impl Demo {
    fn new(
        backend: WgpuBackend,
        window: &Window,
        args: &Args,
        config: &RendererConfig,
    ) -> RendererResult<Self> {
        let overlay = DebugOverlay::new(&backend, window.window());
        let mut ctx = RenderContext::new(backend);
        let library = ShaderLibrary::load()?;
        let (width, height) = ctx.surface_size();

        // Image-based lighting bakes
        let cube = GpuTexture::create_cube(&mut ctx, "Sky", &args.sky_faces()?)?;
        let mut sky = Sky::new(&mut ctx, cube, library.sky_vs.clone(), library.sky_ps.clone())?;
        let brdf_lut = BrdfLut::generate(
            &mut ctx,
            &library.fullscreen_vs,
            &library.brdf_lut_ps,
            config.ibl.brdf_lut_size,
        )?;
        sky.create_environment_map(&mut ctx, &library.fullscreen_vs, &library.irradiance_ps, &config.ibl)?;
        sky.create_specular_reflectance_map(&mut ctx, &library.fullscreen_vs, &library.prefilter_ps, &config.ibl)?;
        ctx.submit();

        let mut entities = build_spheres(&mut ctx, &library)?;
        let lights = vec![
            Light::directional(Vec3::new(-0.5, -1.0, 0.8), Vec3::ONE, 1.5),
            Light::point(Vec3::new(0.0, 3.0, -2.0), 8.0, Vec3::new(1.0, 0.6, 0.3), 3.0),
            Light::point(Vec3::new(-4.0, 1.0, -1.0), 6.0, Vec3::new(0.3, 0.5, 1.0), 2.0),
        ];

        let probe = if args.probe {
            let probe = ReflectionProbe::new(
                &mut ctx,
                Vec3::new(0.0, 0.0, -3.0),
                10.0,
                &config.probe,
                library.fullscreen_vs.clone(),
                library.prefilter_ps.clone(),
            )?;
            probe.draw(&mut ctx, &entities, &lights, &sky, &brdf_lut)?;
            ctx.submit();
            entities.push(mirror_sphere(&mut ctx, &library, &probe)?);
            Some(probe)
        } else {
            None
        };

        let depth = DepthBuffer::create(&mut ctx, width, height)?;
        let back_buffer = ctx.swapchain_view();
        let renderer = Renderer::new(
            &mut ctx,
            config,
            width,
            height,
            back_buffer,
            depth.view,
            brdf_lut.view(),
            library.fullscreen_vs.clone(),
        )?;

        let camera = Camera::new(Transform::from_position(Vec3::new(0.0, 1.0, -9.0)), width, height)?;

        let mut demo = Self {
            ctx,
            renderer,
            overlay,
            sky,
            _brdf_lut: brdf_lut,
            _probe: probe,
            depth,
            entities,
            lights,
            camera,
            input: CameraInput::new(),
            vsync: config.vsync,
            last_frame: Instant::now(),
        };
        demo.overlay
            .register_targets(demo.ctx.backend(), &demo.renderer.debug_targets());
        Ok(demo)
    }

    fn resize(&mut self, width: u32, height: u32) -> RendererResult<()> {
        self.overlay.release_targets();
        self.renderer.pre_resize(&mut self.ctx)?;
        self.depth.release(&mut self.ctx);

        self.ctx.resize_surface(width, height);
        let (width, height) = self.ctx.surface_size();
        self.depth = DepthBuffer::create(&mut self.ctx, width, height)?;
        let back_buffer = self.ctx.swapchain_view();
        self.renderer
            .post_resize(&mut self.ctx, width, height, back_buffer, self.depth.view)?;

        self.camera.set_aspect_ratio(width, height)?;
        self.overlay
            .register_targets(self.ctx.backend(), &self.renderer.debug_targets());
        Ok(())
    }

    fn frame(&mut self, window: &mut Window) -> RendererResult<()> {
        if window.is_minimized() {
            return Ok(());
        }
        if window.take_resized() {
            let (width, height) = window.dimensions();
            self.resize(width, height)?;
        }

        let now = Instant::now();
        let dt = (now - self.last_frame).as_secs_f32();
        self.last_frame = now;

        self.camera.update(dt, &self.input);
        self.input.reset_deltas();
        for entity in &mut self.entities {
            entity.update(dt);
        }

        match self.renderer.frame_start(&mut self.ctx) {
            Err(RendererError::Backend(BackendError::SurfaceLost)) => {
                log::warn!("Surface lost, reconfiguring");
                let (width, height) = window.dimensions();
                return self.resize(width, height);
            }
            result => result?,
        }
        self.renderer
            .render(&mut self.ctx, &self.entities, &self.lights, &self.camera, &self.sky)?;
        self.renderer.post_process(&mut self.ctx, &self.camera)?;

        let (width, height) = self.renderer.size();
        let stats = OverlayStats {
            frame_time: dt,
            width,
            height,
        };
        self.overlay.run(
            window.window(),
            &stats,
            &mut self.camera,
            self.renderer.ssao_config_mut(),
        );
        self.ctx.end_pass();
        self.overlay.render(self.ctx.backend_mut(), width, height);

        self.renderer.frame_end(&mut self.ctx, self.vsync)
    }
}

fn pbr_material(
    ctx: &mut RenderContext<WgpuBackend>,
    library: &ShaderLibrary,
    name: &str,
    albedo: [u8; 4],
    metalness: u8,
) -> RendererResult<Material> {
    let albedo = GpuTexture::create(ctx, &TextureData::solid_color(albedo, "Albedo"))?;
    let normal = GpuTexture::create(ctx, &TextureData::default_normal())?;
    let roughness = GpuTexture::create(ctx, &TextureData::white())?;
    let metalness = GpuTexture::create(
        ctx,
        &TextureData::solid_color([metalness, metalness, metalness, 255], "Metalness"),
    )?;
    let basic = ctx.create_sampler(&SamplerDescriptor::linear_point_mip(AddressMode::Repeat, "Basic Sampler"))?;
    let clamp = ctx.create_sampler(&SamplerDescriptor::linear_point_mip(AddressMode::ClampToEdge, "Clamp Sampler"))?;

    Ok(Material::new(name, library.pbr_vs.clone(), library.pbr_ps.clone())
        .with_texture("AlbedoTexture", albedo.view)
        .with_texture("NormalTexture", normal.view)
        .with_texture("RoughnessTexture", roughness.view)
        .with_texture("MetalnessTexture", metalness.view)
        .with_sampler("BasicSampler", basic)
        .with_sampler("ClampSampler", clamp))
}

/// Two rows of spheres, dielectric and metal, with roughness rising left to right
fn build_spheres(ctx: &mut RenderContext<WgpuBackend>, library: &ShaderLibrary) -> RendererResult<Vec<Entity>> {
    let mut data = MeshData::sphere(32, 16);
    data.generate_tangents();
    let sphere = Arc::new(Mesh::new(ctx, "Sphere", &data)?);
    let floor_mesh = Arc::new(Mesh::new(ctx, "Floor", &MeshData::cube())?);

    let dielectric = pbr_material(ctx, library, "Dielectric", [200, 40, 40, 255], 0)?;
    let metal = pbr_material(ctx, library, "Metal", [230, 190, 120, 255], 255)?;

    let columns = 6;
    let mut entities = Vec::new();
    for (row, base) in [dielectric, metal].into_iter().enumerate() {
        for column in 0..columns {
            let roughness = column as f32 / (columns - 1) as f32;
            let material = base.clone().with_roughness(roughness.max(0.05));
            let position = Vec3::new(column as f32 * 1.5 - 3.75, row as f32 * 1.5, 0.0);
            entities.push(
                Entity::new(sphere.clone(), Arc::new(material))
                    .with_transform(Transform::from_position(position)),
            );
        }
    }

    let floor = pbr_material(ctx, library, "Floor", [180, 180, 180, 255], 0)?
        .with_roughness(0.8)
        .with_uv_transform(Vec2::ZERO, Vec2::splat(8.0));
    entities.push(
        Entity::new(floor_mesh, Arc::new(floor)).with_transform(Transform::from_position_scale(
            Vec3::new(0.0, -1.0, 0.0),
            Vec3::new(20.0, 0.1, 20.0),
        )),
    );
    Ok(entities)
}

/// A smooth metal sphere whose reflections come from the probe instead of the sky
fn mirror_sphere(
    ctx: &mut RenderContext<WgpuBackend>,
    library: &ShaderLibrary,
    probe: &ReflectionProbe,
) -> RendererResult<Entity> {
    let mut data = MeshData::sphere(48, 24);
    data.generate_tangents();
    let mesh = Arc::new(Mesh::new(ctx, "Mirror Sphere", &data)?);
    let material = pbr_material(ctx, library, "Mirror", [255, 255, 255, 255], 255)?
        .with_roughness(0.05)
        .with_color_tint(Vec4::new(0.95, 0.95, 1.0, 1.0))
        .with_texture("ReflectionMap", probe.reflection_map());

    Ok(Entity::new(mesh, Arc::new(material))
        .with_transform(Transform::from_position(probe.position())))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.config();
    log::info!("Starting {} at {}x{}", config.title, config.width, config.height);

    let event_loop = EventLoop::new()?;
    let mut window = Window::new(&event_loop, &config)?;
    let backend = WgpuBackend::new(window.window_arc(), config.vsync)?;
    log::info!("Surface format: {:?}", backend.wgpu_surface_format());
    let mut demo = Demo::new(backend, &window, &args, &config)?;

    event_loop.run(move |event, elwt| {
        elwt.set_control_flow(ControlFlow::Poll);

        match event {
            Event::WindowEvent { event, .. } => {
                let consumed = demo.overlay.on_window_event(window.window(), &event);
                window.handle_event(&event);

                match event {
                    WindowEvent::CloseRequested => elwt.exit(),
                    WindowEvent::KeyboardInput {
                        event:
                            KeyEvent {
                                physical_key: PhysicalKey::Code(code),
                                state,
                                ..
                            },
                        ..
                    } => {
                        if code == KeyCode::Escape && state == ElementState::Pressed {
                            elwt.exit();
                        } else if !consumed || state == ElementState::Released {
                            demo.input.handle_key(code, state);
                        }
                    }
                    WindowEvent::MouseInput { button, state, .. } => {
                        if !consumed || state == ElementState::Released {
                            demo.input.handle_mouse_button(button, state);
                        }
                    }
                    WindowEvent::RedrawRequested => {
                        if let Err(e) = demo.frame(&mut window) {
                            log::error!("Frame failed: {}", e);
                            elwt.exit();
                        }
                    }
                    _ => {}
                }
            }
            Event::DeviceEvent {
                event: DeviceEvent::MouseMotion { delta },
                ..
            } => {
                demo.input
                    .add_mouse_delta(Vec2::new(delta.0 as f32, delta.1 as f32));
            }
            Event::AboutToWait => window.request_redraw(),
            _ => {}
        }

        if window.should_close() {
            elwt.exit();
        }
    })?;

    Ok(())
}

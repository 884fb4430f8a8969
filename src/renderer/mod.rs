//! Multi-target scene renderer with an SSAO post-process chain
//!
//! A frame runs `frame_start` → `render` → `post_process` → `frame_end`. The scene
//! pass writes color, ambient, normals and depth into four targets at once. The
//! post-process chain turns normals and depth into ambient occlusion, blurs it, and
//! combines everything into the back buffer.
//!
//! Size-dependent targets are rebuilt through `pre_resize` / `post_resize`; no frame
//! call is accepted in between.

pub mod frame;
pub mod ssao;
pub mod targets;

use std::sync::Arc;

use glam::{Vec2, Vec4};

use crate::backend::*;
use crate::context::RenderContext;
use crate::error::{RendererError, RendererResult};
use crate::ibl::Sky;
use crate::scene::{Camera, Entity, Light, LightSet};
use crate::shader::{Shader, ShaderParameters};
use crate::{RendererConfig, SsaoConfig};

pub use frame::{FramePhase, FrameStep, ResizeState};
pub use ssao::SsaoResources;
pub use targets::{DepthBuffer, RenderTarget, RenderTargetSlot, RenderTargets};

/// Stage lights and image-based lighting inputs on a scene pixel shader.
///
/// Names the shader does not declare are skipped. Light arrays are only written when
/// non-empty; the counts are always written. Spot lights are never uploaded.
/// `fold_ambient` asks the shader to add its diffuse ambient to the color output, for
/// passes that bind only a color target.
pub fn stage_scene_inputs(
    ps: &Shader,
    lights: &LightSet,
    sky: &Sky,
    brdf_lut: TextureViewHandle,
    fold_ambient: bool,
) {
    ps.set_int("c_foldAmbient", fold_ambient as i32);
    if lights.directional_count() > 0 {
        ps.set_data("c_directionalLights", bytemuck::cast_slice(&lights.directional));
    }
    ps.set_int("c_directionalLightCount", lights.directional_count());
    if lights.point_count() > 0 {
        ps.set_data("c_pointLights", bytemuck::cast_slice(&lights.point));
    }
    ps.set_int("c_pointLightCount", lights.point_count());

    if let Some(irradiance) = sky.environment_map() {
        ps.set_shader_resource_view("IrradianceMap", irradiance);
    }
    if let Some(reflection) = sky.reflectance_map() {
        ps.set_shader_resource_view("ReflectionMap", reflection);
    }
    ps.set_shader_resource_view("BRDFIntegrationMap", brdf_lut);
}

/// Owns the render targets and SSAO resources, and drives the frame state machine
#[derive(Debug)]
pub struct Renderer {
    clear_color: [f32; 4],
    ssao_config: SsaoConfig,
    width: u32,
    height: u32,
    targets: Option<RenderTargets>,
    back_buffer: Option<TextureViewHandle>,
    depth: Option<TextureViewHandle>,
    brdf_lut: TextureViewHandle,
    fullscreen_vs: Arc<Shader>,
    ssao: SsaoResources,
    phase: FramePhase,
    resize: ResizeState,
}

impl Renderer {
    #[allow(clippy::too_many_arguments)]
    pub fn new<B: GraphicsBackend>(
        ctx: &mut RenderContext<B>,
        config: &RendererConfig,
        width: u32,
        height: u32,
        back_buffer: TextureViewHandle,
        depth: TextureViewHandle,
        brdf_lut: TextureViewHandle,
        fullscreen_vs: Arc<Shader>,
    ) -> RendererResult<Self> {
        validate_size(width, height)?;
        let targets = RenderTargets::create(ctx, width, height)?;
        let ssao = SsaoResources::new(ctx, &config.ssao, &mut rand::thread_rng())?;
        log::info!("Renderer ready at {}x{}", width, height);

        Ok(Self {
            clear_color: config.clear_color,
            ssao_config: config.ssao.clone(),
            width,
            height,
            targets: Some(targets),
            back_buffer: Some(back_buffer),
            depth: Some(depth),
            brdf_lut,
            fullscreen_vs,
            ssao,
            phase: FramePhase::Idle,
            resize: ResizeState::Ready,
        })
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn resize_state(&self) -> ResizeState {
        self.resize
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn ssao_offsets(&self) -> &[Vec4] {
        &self.ssao.offsets
    }

    pub fn ssao_resources(&self) -> &SsaoResources {
        &self.ssao
    }

    pub fn ssao_config(&self) -> &SsaoConfig {
        &self.ssao_config
    }

    pub fn ssao_config_mut(&mut self) -> &mut SsaoConfig {
        &mut self.ssao_config
    }

    pub fn back_buffer(&self) -> Option<TextureViewHandle> {
        self.back_buffer
    }

    pub fn depth_buffer(&self) -> Option<TextureViewHandle> {
        self.depth
    }

    /// A target, or `None` while released for a resize
    pub fn render_target(&self, slot: RenderTargetSlot) -> Option<RenderTarget> {
        self.targets.as_ref().map(|targets| *targets.get(slot))
    }

    /// Name and view of every filterable target, for debug display
    pub fn debug_targets(&self) -> Vec<(&'static str, TextureViewHandle)> {
        match &self.targets {
            Some(targets) => RenderTargetSlot::ALL
                .iter()
                .filter(|slot| slot.format() != TextureFormat::R32Float)
                .map(|slot| (slot.name(), targets.view(*slot)))
                .collect(),
            None => Vec::new(),
        }
    }

    fn bound(&self, operation: &'static str) -> RendererResult<(&RenderTargets, TextureViewHandle, TextureViewHandle)> {
        match (&self.targets, self.back_buffer, self.depth) {
            (Some(targets), Some(back_buffer), Some(depth)) => Ok((targets, back_buffer, depth)),
            _ => Err(RendererError::ResizeOrder { operation }),
        }
    }

    /// Acquire the frame, clear every target and bind the scene targets
    pub fn frame_start<B: GraphicsBackend>(&mut self, ctx: &mut RenderContext<B>) -> RendererResult<()> {
        let step = FrameStep::FrameStart;
        self.resize.require_ready(step.name())?;
        self.phase.check(step)?;
        let (targets, back_buffer, depth) = self.bound(step.name())?;

        ctx.begin_frame()?;
        ctx.clear_color(back_buffer, self.clear_color)?;
        ctx.clear_depth(depth, 1.0)?;
        for slot in RenderTargetSlot::ALL {
            ctx.clear_color(targets.view(slot), slot.clear_value())?;
        }

        ctx.set_render_targets(&targets.scene_views(), Some(depth))?;
        ctx.set_viewport(Viewport::new(self.width, self.height));

        self.phase = self.phase.advance(step);
        Ok(())
    }

    /// Draw every entity with the scene lighting, then the sky, into the scene targets
    pub fn render<B: GraphicsBackend>(
        &mut self,
        ctx: &mut RenderContext<B>,
        entities: &[Entity],
        lights: &[Light],
        camera: &Camera,
        sky: &Sky,
    ) -> RendererResult<()> {
        let step = FrameStep::Render;
        self.resize.require_ready(step.name())?;
        self.phase.check(step)?;

        let lights = LightSet::partition(lights);
        for entity in entities {
            stage_scene_inputs(entity.material().pixel_shader(), &lights, sky, self.brdf_lut, false);
            entity.draw(ctx, camera)?;
        }
        sky.draw(ctx, camera)?;
        ctx.unbind_render_targets();

        self.phase = self.phase.advance(step);
        Ok(())
    }

    /// Occlusion, blur and the final combine into the back buffer
    pub fn post_process<B: GraphicsBackend>(
        &mut self,
        ctx: &mut RenderContext<B>,
        camera: &Camera,
    ) -> RendererResult<()> {
        let step = FrameStep::PostProcess;
        self.resize.require_ready(step.name())?;
        self.phase.check(step)?;

        let result = self.run_post_process(ctx, camera);
        for ps in [&self.ssao.ssao_ps, &self.ssao.blur_ps, &self.ssao.combine_ps] {
            ps.unbind_resources();
        }
        result?;

        self.phase = self.phase.advance(step);
        Ok(())
    }

    fn run_post_process<B: GraphicsBackend>(
        &self,
        ctx: &mut RenderContext<B>,
        camera: &Camera,
    ) -> RendererResult<()> {
        let (targets, back_buffer, _) = self.bound(FrameStep::PostProcess.name())?;
        let vs = &self.fullscreen_vs;
        let (width, height) = (self.width as f32, self.height as f32);
        ctx.clear_input_assembler();
        ctx.set_viewport(Viewport::new(self.width, self.height));

        // Occlusion
        let ssao_ps = &self.ssao.ssao_ps;
        ctx.set_render_targets(&[targets.view(RenderTargetSlot::PostProcessZero)], None)?;
        let projection = camera.projection_matrix();
        ssao_ps.set_matrix4x4("c_viewMatrix", camera.view_matrix());
        ssao_ps.set_matrix4x4("c_projectionMatrix", projection);
        ssao_ps.set_matrix4x4("c_inverseProjMatrix", projection.inverse());
        ssao_ps.set_data("c_offsets", bytemuck::cast_slice(&self.ssao.offsets));
        ssao_ps.set_float("c_radius", self.ssao_config.radius);
        ssao_ps.set_int(
            "c_samples",
            self.ssao_config.sample_count.min(ssao::MAX_SAMPLES as u32) as i32,
        );
        let noise = self.ssao.noise_size as f32;
        ssao_ps.set_float2("c_randomSampleScreenScale", Vec2::new(width / noise, height / noise));
        ssao_ps.set_sampler_state("ClampSampler", self.ssao.clamp_sampler);
        ssao_ps.set_shader_resource_view("Random", self.ssao.random_view);
        ssao_ps.set_shader_resource_view("SceneNormals", targets.view(RenderTargetSlot::SceneNormal));
        ssao_ps.set_shader_resource_view("SceneDepths", targets.view(RenderTargetSlot::SceneDepth));
        vs.copy_all_buffer_data(ctx)?;
        ssao_ps.copy_all_buffer_data(ctx)?;
        ctx.draw_fullscreen(vs, ssao_ps)?;

        // Blur
        let blur_ps = &self.ssao.blur_ps;
        ctx.set_render_targets(&[targets.view(RenderTargetSlot::PostProcessOne)], None)?;
        blur_ps.set_float2("c_pixelSize", Vec2::new(1.0 / width, 1.0 / height));
        blur_ps.set_sampler_state("ClampSampler", self.ssao.clamp_sampler);
        blur_ps.set_shader_resource_view("BlurTarget", targets.view(RenderTargetSlot::PostProcessZero));
        blur_ps.copy_all_buffer_data(ctx)?;
        ctx.draw_fullscreen(vs, blur_ps)?;

        // Combine
        let combine_ps = &self.ssao.combine_ps;
        ctx.set_render_targets(&[back_buffer], None)?;
        combine_ps.set_int("c_ssaoEnabled", self.ssao_config.enabled as i32);
        combine_ps.set_int("c_ssaoOutputOnly", self.ssao_config.output_only as i32);
        combine_ps.set_shader_resource_view("SceneColors", targets.view(RenderTargetSlot::SceneColor));
        combine_ps.set_shader_resource_view("SceneAmbient", targets.view(RenderTargetSlot::SceneAmbient));
        combine_ps.set_shader_resource_view("SceneDepths", targets.view(RenderTargetSlot::SceneDepth));
        combine_ps.set_shader_resource_view("SSAO", targets.view(RenderTargetSlot::PostProcessOne));
        combine_ps.set_sampler_state("ClampSampler", self.ssao.clamp_sampler);
        combine_ps.copy_all_buffer_data(ctx)?;
        ctx.draw_fullscreen(vs, combine_ps)
    }

    /// Present, then leave the back buffer and depth bound
    pub fn frame_end<B: GraphicsBackend>(
        &mut self,
        ctx: &mut RenderContext<B>,
        vsync: bool,
    ) -> RendererResult<()> {
        let step = FrameStep::FrameEnd;
        self.resize.require_ready(step.name())?;
        self.phase.check(step)?;
        let (_, back_buffer, depth) = self.bound(step.name())?;

        let presented = ctx.present(vsync);
        self.phase = self.phase.advance(step);

        // Rebound even when present fails
        ctx.set_render_targets(&[back_buffer], Some(depth))?;
        ctx.set_viewport(Viewport::new(self.width, self.height));
        presented
    }

    /// Release every size-dependent resource before the swapchain is resized.
    ///
    /// Only legal between frames. Calling it again before `post_resize` does nothing.
    pub fn pre_resize<B: GraphicsBackend>(&mut self, ctx: &mut RenderContext<B>) -> RendererResult<()> {
        if self.phase != FramePhase::Idle {
            return Err(RendererError::FrameOrder {
                operation: "pre_resize",
                phase: self.phase.name(),
            });
        }
        if self.resize == ResizeState::Released {
            return Ok(());
        }

        ctx.unbind_render_targets();
        if let Some(targets) = self.targets.take() {
            targets.release(ctx);
        }
        self.back_buffer = None;
        self.depth = None;
        self.resize = ResizeState::Released;
        log::debug!("Render targets released for resize");
        Ok(())
    }

    /// Rebuild every target at the new size around the new back buffer and depth views
    pub fn post_resize<B: GraphicsBackend>(
        &mut self,
        ctx: &mut RenderContext<B>,
        width: u32,
        height: u32,
        back_buffer: TextureViewHandle,
        depth: TextureViewHandle,
    ) -> RendererResult<()> {
        self.resize.require_released("post_resize")?;
        validate_size(width, height)?;

        self.targets = Some(RenderTargets::create(ctx, width, height)?);
        self.back_buffer = Some(back_buffer);
        self.depth = Some(depth);
        self.width = width;
        self.height = height;
        self.resize = ResizeState::Ready;

        ctx.set_render_targets(&[back_buffer], Some(depth))?;
        ctx.set_viewport(Viewport::new(width, height));
        log::info!("Renderer resized to {}x{}", width, height);
        Ok(())
    }
}

fn validate_size(width: u32, height: u32) -> RendererResult<()> {
    if width == 0 || height == 0 {
        return Err(RendererError::InvalidParameter(format!(
            "render target size {}x{}",
            width, height
        )));
    }
    Ok(())
}

//! Render context: the backend plus the explicit state every draw is recorded against.
//!
//! Draws are immediate in style. Targets, viewport, input buffers and raster state are
//! bound on the context, and each draw lazily opens a render pass over whatever targets
//! are bound. Rebinding targets or clearing closes the open pass.

pub mod state;
pub mod uniforms;

use std::collections::HashMap;

use crate::backend::*;
use crate::error::{RendererError, RendererResult};
use crate::shader::{ResolvedBindings, Shader};

pub use state::{BoundState, RasterState, SavedState, StateGuard};
pub use uniforms::{UniformArena, UniformSlice, UNIFORM_ALIGNMENT};

/// Metadata recorded for every texture created through the context
#[derive(Debug, Clone)]
pub struct TextureInfo {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub kind: TextureKind,
    pub mip_levels: u32,
    pub format: TextureFormat,
}

/// Metadata recorded for every view created through the context
#[derive(Debug, Clone, Copy)]
pub struct ViewInfo {
    /// `None` for the swapchain image
    pub texture: Option<TextureHandle>,
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    pub dimension: ViewDimension,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    vertex_shader: u64,
    pixel_shader: u64,
    color_formats: Vec<TextureFormat>,
    depth_format: Option<TextureFormat>,
    raster: RasterState,
    indexed: bool,
}

#[derive(Debug, Clone, Copy)]
enum DrawKind {
    Fullscreen,
    Indexed(u32),
}

/// The backend plus bound state, caches and the uniform arena
pub struct RenderContext<B: GraphicsBackend> {
    backend: B,
    state: BoundState,
    textures: HashMap<TextureHandle, TextureInfo>,
    views: HashMap<TextureViewHandle, ViewInfo>,
    pipelines: HashMap<PipelineKey, RenderPipelineHandle>,
    layouts: HashMap<u64, BindGroupLayoutHandle>,
    uniforms: UniformArena,
    pass_open: bool,
    pending_bind_groups: Vec<BindGroupHandle>,
    fallback_2d: Option<TextureViewHandle>,
    fallback_cube: Option<TextureViewHandle>,
    fallback_sampler: Option<SamplerHandle>,
    draw_calls: u64,
}

impl<B: GraphicsBackend> RenderContext<B> {
    pub fn new(backend: B) -> Self {
        let (width, height) = backend.surface_size();
        let mut views = HashMap::new();
        views.insert(
            backend.swapchain_view(),
            ViewInfo {
                texture: None,
                format: backend.swapchain_format(),
                width,
                height,
                dimension: ViewDimension::D2,
            },
        );

        Self {
            backend,
            state: BoundState {
                viewport: Viewport::new(width, height),
                ..Default::default()
            },
            textures: HashMap::new(),
            views,
            pipelines: HashMap::new(),
            layouts: HashMap::new(),
            uniforms: UniformArena::new(),
            pass_open: false,
            pending_bind_groups: Vec::new(),
            fallback_2d: None,
            fallback_cube: None,
            fallback_sampler: None,
            draw_calls: 0,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        self.close_pass();
        &mut self.backend
    }

    pub fn state(&self) -> &BoundState {
        &self.state
    }

    pub fn draw_calls(&self) -> u64 {
        self.draw_calls
    }

    pub fn swapchain_view(&self) -> TextureViewHandle {
        self.backend.swapchain_view()
    }

    pub fn surface_size(&self) -> (u32, u32) {
        self.backend.surface_size()
    }

    // Frame plumbing

    /// Acquire the next swapchain image
    pub fn begin_frame(&mut self) -> RendererResult<FrameContext> {
        let frame = self.backend.begin_frame()?;
        self.register_swapchain(frame.width, frame.height);
        Ok(frame)
    }

    /// Submit recorded work, e.g. after an off-frame precompute
    pub fn submit(&mut self) {
        self.close_pass();
        self.release_bind_groups();
        self.backend.submit();
        self.uniforms.reset();
    }

    /// Close the open pass so the backend can record its own work, e.g. an overlay
    pub fn end_pass(&mut self) {
        self.close_pass();
    }

    /// Submit and present, without waiting for vblank when `vsync` is false
    pub fn present(&mut self, vsync: bool) -> RendererResult<()> {
        self.close_pass();
        self.release_bind_groups();
        let result = self.backend.present(vsync);
        self.uniforms.reset();
        result.map_err(RendererError::from)
    }

    /// Resize the swapchain
    pub fn resize_surface(&mut self, width: u32, height: u32) {
        self.close_pass();
        self.backend.resize(width, height);
        let (width, height) = self.backend.surface_size();
        self.register_swapchain(width, height);
    }

    fn register_swapchain(&mut self, width: u32, height: u32) {
        let format = self.backend.swapchain_format();
        self.views.insert(
            self.backend.swapchain_view(),
            ViewInfo {
                texture: None,
                format,
                width,
                height,
                dimension: ViewDimension::D2,
            },
        );
    }

    fn release_bind_groups(&mut self) {
        for group in self.pending_bind_groups.drain(..) {
            self.backend.destroy_bind_group(group);
        }
    }

    // Resources

    /// Create a texture, recording its metadata for target and hazard tracking
    pub fn create_texture(&mut self, desc: &TextureDescriptor) -> RendererResult<TextureHandle> {
        let label = desc.label.clone().unwrap_or_else(|| "unnamed".to_string());
        let texture = self.backend.create_texture(desc).map_err(|e| {
            RendererError::creation(
                "texture",
                format!(
                    "{}: {}x{} {:?} {:?} with {} mips ({})",
                    label, desc.width, desc.height, desc.kind, desc.format, desc.mip_levels, e
                ),
            )
        })?;
        log::debug!(
            "Created texture {} ({}x{} {:?}, {} mips)",
            label,
            desc.width,
            desc.height,
            desc.format,
            desc.mip_levels
        );
        self.textures.insert(
            texture,
            TextureInfo {
                label,
                width: desc.width,
                height: desc.height,
                kind: desc.kind,
                mip_levels: desc.mip_levels,
                format: desc.format,
            },
        );
        Ok(texture)
    }

    /// Create a view over part of a texture
    pub fn create_texture_view(
        &mut self,
        texture: TextureHandle,
        desc: &TextureViewDescriptor,
    ) -> RendererResult<TextureViewHandle> {
        let info = self.textures.get(&texture).cloned().ok_or_else(|| {
            RendererError::InvalidParameter(format!("unknown texture {:?}", texture))
        })?;
        let view = self.backend.create_texture_view(texture, desc).map_err(|e| {
            RendererError::creation("texture view", format!("{} {:?}: {}", info.label, desc, e))
        })?;
        self.views.insert(
            view,
            ViewInfo {
                texture: Some(texture),
                format: info.format,
                width: (info.width >> desc.base_mip_level).max(1),
                height: (info.height >> desc.base_mip_level).max(1),
                dimension: desc.dimension,
            },
        );
        Ok(view)
    }

    pub fn write_texture(
        &mut self,
        texture: TextureHandle,
        mip_level: u32,
        array_layer: u32,
        data: &[u8],
        width: u32,
        height: u32,
    ) {
        self.backend
            .write_texture(texture, mip_level, array_layer, data, width, height);
    }

    pub fn create_sampler(&mut self, desc: &SamplerDescriptor) -> RendererResult<SamplerHandle> {
        self.backend
            .create_sampler(desc)
            .map_err(|e| RendererError::creation("sampler", format!("{:?}: {}", desc.label, e)))
    }

    pub fn create_buffer_init(
        &mut self,
        label: &str,
        usage: BufferUsage,
        data: &[u8],
    ) -> RendererResult<BufferHandle> {
        self.backend
            .create_buffer_init(
                &BufferDescriptor {
                    label: Some(label.to_string()),
                    size: data.len() as u64,
                    usage,
                },
                data,
            )
            .map_err(|e| {
                RendererError::creation("buffer", format!("{} ({} bytes): {}", label, data.len(), e))
            })
    }

    pub fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.close_pass();
        self.backend.destroy_buffer(buffer);
    }

    pub fn destroy_texture_view(&mut self, view: TextureViewHandle) {
        self.close_pass();
        self.views.remove(&view);
        self.backend.destroy_texture_view(view);
    }

    /// Destroy a texture together with every view created from it
    pub fn destroy_texture(&mut self, texture: TextureHandle) {
        self.close_pass();
        let views: Vec<TextureViewHandle> = self
            .views
            .iter()
            .filter(|(_, info)| info.texture == Some(texture))
            .map(|(view, _)| *view)
            .collect();
        for view in views {
            self.views.remove(&view);
            self.backend.destroy_texture_view(view);
        }
        self.textures.remove(&texture);
        self.backend.destroy_texture(texture);
    }

    pub fn texture_info(&self, texture: TextureHandle) -> Option<&TextureInfo> {
        self.textures.get(&texture)
    }

    pub fn view_info(&self, view: TextureViewHandle) -> Option<&ViewInfo> {
        self.views.get(&view)
    }

    // Bound state

    /// Bind color targets and an optional depth target.
    ///
    /// Binding the targets that are already bound keeps the open pass.
    pub fn set_render_targets(
        &mut self,
        colors: &[TextureViewHandle],
        depth: Option<TextureViewHandle>,
    ) -> RendererResult<()> {
        for view in colors {
            let info = self.views.get(view).ok_or_else(|| {
                RendererError::InvalidParameter(format!("unknown render target view {:?}", view))
            })?;
            if info.format.is_depth() {
                return Err(RendererError::InvalidParameter(format!(
                    "depth view {:?} bound as a color target",
                    view
                )));
            }
        }
        if let Some(view) = depth {
            let info = self.views.get(&view).ok_or_else(|| {
                RendererError::InvalidParameter(format!("unknown depth view {:?}", view))
            })?;
            if !info.format.is_depth() {
                return Err(RendererError::InvalidParameter(format!(
                    "color view {:?} bound as the depth target",
                    view
                )));
            }
        }

        if self.state.color_targets.as_slice() != colors || self.state.depth_target != depth {
            self.close_pass();
            self.state.color_targets = colors.to_vec();
            self.state.depth_target = depth;
        }
        Ok(())
    }

    /// Unbind every color and depth target
    pub fn unbind_render_targets(&mut self) {
        if !self.state.color_targets.is_empty() || self.state.depth_target.is_some() {
            self.close_pass();
            self.state.color_targets.clear();
            self.state.depth_target = None;
        }
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.state.viewport = viewport;
        if self.pass_open {
            let clamped = self.clamped_viewport();
            self.backend.set_viewport(&clamped);
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.state.viewport
    }

    pub fn set_vertex_buffer(&mut self, buffer: BufferHandle) {
        self.state.vertex_buffer = Some(buffer);
    }

    pub fn set_index_buffer(&mut self, buffer: BufferHandle, format: IndexFormat) {
        self.state.index_buffer = Some((buffer, format));
    }

    /// Unbind vertex and index buffers, as required before buffer-less draws
    pub fn clear_input_assembler(&mut self) {
        self.state.vertex_buffer = None;
        self.state.index_buffer = None;
    }

    pub fn set_raster_state(&mut self, raster: RasterState) {
        self.state.raster = raster;
    }

    pub fn reset_raster_state(&mut self) {
        self.state.raster = RasterState::default();
    }

    pub fn raster_state(&self) -> RasterState {
        self.state.raster
    }

    /// Snapshot targets and viewport, restoring them when the guard drops
    pub fn save_state(&mut self) -> StateGuard<'_, B> {
        StateGuard::new(self)
    }

    pub(crate) fn snapshot(&self) -> SavedState {
        SavedState {
            color_targets: self.state.color_targets.clone(),
            depth_target: self.state.depth_target,
            viewport: self.state.viewport,
        }
    }

    pub(crate) fn restore(&mut self, saved: SavedState) {
        if self.state.color_targets != saved.color_targets
            || self.state.depth_target != saved.depth_target
        {
            self.close_pass();
            self.state.color_targets = saved.color_targets;
            self.state.depth_target = saved.depth_target;
        }
        self.set_viewport(saved.viewport);
    }

    // Clears

    /// Clear a color view, independent of what is bound
    pub fn clear_color(&mut self, view: TextureViewHandle, color: [f32; 4]) -> RendererResult<()> {
        if !self.views.contains_key(&view) {
            return Err(RendererError::InvalidParameter(format!(
                "clear of unknown view {:?}",
                view
            )));
        }
        self.close_pass();
        self.backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("Clear Color".to_string()),
            color_attachments: vec![ColorAttachment {
                view,
                load_op: LoadOp::Clear(color),
                store_op: StoreOp::Store,
            }],
            depth_stencil_attachment: None,
        });
        self.backend.end_render_pass();
        Ok(())
    }

    /// Clear a depth view, independent of what is bound
    pub fn clear_depth(&mut self, view: TextureViewHandle, depth: f32) -> RendererResult<()> {
        if !self.views.contains_key(&view) {
            return Err(RendererError::InvalidParameter(format!(
                "clear of unknown view {:?}",
                view
            )));
        }
        self.close_pass();
        self.backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("Clear Depth".to_string()),
            color_attachments: Vec::new(),
            depth_stencil_attachment: Some(DepthStencilAttachment {
                view,
                depth_load_op: LoadOp::Clear([depth, 0.0, 0.0, 0.0]),
                depth_store_op: StoreOp::Store,
                depth_clear_value: depth,
            }),
        });
        self.backend.end_render_pass();
        Ok(())
    }

    // Draws

    /// Draw a single full-screen triangle generated from vertex indices
    pub fn draw_fullscreen(&mut self, vs: &Shader, ps: &Shader) -> RendererResult<()> {
        self.draw(vs, ps, DrawKind::Fullscreen)
    }

    /// Draw `index_count` indices from the bound vertex and index buffers
    pub fn draw_indexed(&mut self, vs: &Shader, ps: &Shader, index_count: u32) -> RendererResult<()> {
        self.draw(vs, ps, DrawKind::Indexed(index_count))
    }

    fn draw(&mut self, vs: &Shader, ps: &Shader, kind: DrawKind) -> RendererResult<()> {
        if vs.stage() != ShaderStage::Vertex || ps.stage() != ShaderStage::Fragment {
            return Err(RendererError::Shader {
                name: format!("{} + {}", vs.name(), ps.name()),
                message: "expected a vertex shader and a pixel shader".to_string(),
            });
        }
        if self.state.color_targets.is_empty() && self.state.depth_target.is_none() {
            return Err(RendererError::InvalidParameter(
                "draw issued with no render target bound".to_string(),
            ));
        }
        let buffers = match kind {
            DrawKind::Fullscreen => None,
            DrawKind::Indexed(_) => match (self.state.vertex_buffer, self.state.index_buffer) {
                (Some(vertices), Some(indices)) => Some((vertices, indices)),
                _ => {
                    return Err(RendererError::InvalidParameter(
                        "indexed draw without bound vertex and index buffers".to_string(),
                    ))
                }
            },
        };

        let vs_bindings = vs.resolve_bindings(self)?;
        let ps_bindings = ps.resolve_bindings(self)?;
        self.check_hazards(&vs_bindings)?;
        self.check_hazards(&ps_bindings)?;

        let pipeline = self.pipeline_for(vs, ps, matches!(kind, DrawKind::Indexed(_)))?;
        let vs_layout = self.layout_for(vs)?;
        let ps_layout = self.layout_for(ps)?;
        let vs_group = self.backend.create_bind_group(vs_layout, &vs_bindings.entries)?;
        self.pending_bind_groups.push(vs_group);
        let ps_group = self.backend.create_bind_group(ps_layout, &ps_bindings.entries)?;
        self.pending_bind_groups.push(ps_group);

        self.ensure_pass();
        self.backend.set_render_pipeline(pipeline);
        self.backend.set_bind_group(0, vs_group);
        self.backend.set_bind_group(1, ps_group);
        match (kind, buffers) {
            (DrawKind::Indexed(count), Some((vertices, (indices, format)))) => {
                self.backend.set_vertex_buffer(0, vertices, 0);
                self.backend.set_index_buffer(indices, 0, format);
                self.backend.draw_indexed(0..count, 0, 0..1);
            }
            _ => self.backend.draw(0..3, 0..1),
        }
        self.draw_calls += 1;
        log::trace!("Draw {} + {}", vs.name(), ps.name());
        Ok(())
    }

    /// Reject draws that sample a texture which is also a bound target
    fn check_hazards(&self, bindings: &ResolvedBindings) -> RendererResult<()> {
        let bound: Vec<TextureHandle> = self
            .state
            .color_targets
            .iter()
            .chain(self.state.depth_target.iter())
            .filter_map(|view| self.views.get(view).and_then(|info| info.texture))
            .collect();
        for view in &bindings.read_views {
            let Some(texture) = self.views.get(view).and_then(|info| info.texture) else {
                continue;
            };
            if bound.contains(&texture) {
                let label = self
                    .textures
                    .get(&texture)
                    .map(|info| info.label.clone())
                    .unwrap_or_else(|| format!("{:?}", texture));
                return Err(RendererError::TargetHazard { texture: label });
            }
        }
        Ok(())
    }

    fn ensure_pass(&mut self) {
        if self.pass_open {
            return;
        }
        let desc = RenderPassDescriptor {
            label: Some("Draw Pass".to_string()),
            color_attachments: self
                .state
                .color_targets
                .iter()
                .map(|view| ColorAttachment {
                    view: *view,
                    load_op: LoadOp::Load,
                    store_op: StoreOp::Store,
                })
                .collect(),
            depth_stencil_attachment: self.state.depth_target.map(|view| DepthStencilAttachment {
                view,
                depth_load_op: LoadOp::Load,
                depth_store_op: StoreOp::Store,
                depth_clear_value: 1.0,
            }),
        };
        self.backend.begin_render_pass(&desc);
        let viewport = self.clamped_viewport();
        self.backend.set_viewport(&viewport);
        self.pass_open = true;
    }

    fn close_pass(&mut self) {
        if self.pass_open {
            self.backend.end_render_pass();
            self.pass_open = false;
        }
    }

    /// The bound viewport intersected with the smallest bound target
    fn clamped_viewport(&self) -> Viewport {
        let (width, height) = self
            .state
            .color_targets
            .iter()
            .chain(self.state.depth_target.iter())
            .filter_map(|view| self.views.get(view))
            .fold((u32::MAX, u32::MAX), |(w, h), info| {
                (w.min(info.width), h.min(info.height))
            });
        let mut viewport = self.state.viewport;
        if width == u32::MAX {
            return viewport;
        }
        viewport.x = viewport.x.clamp(0.0, width as f32);
        viewport.y = viewport.y.clamp(0.0, height as f32);
        viewport.width = viewport.width.clamp(0.0, width as f32 - viewport.x);
        viewport.height = viewport.height.clamp(0.0, height as f32 - viewport.y);
        if viewport != self.state.viewport {
            log::trace!("Viewport {:?} clamped to {}x{} target", self.state.viewport, width, height);
        }
        viewport
    }

    fn layout_for(&mut self, shader: &Shader) -> RendererResult<BindGroupLayoutHandle> {
        if let Some(layout) = self.layouts.get(&shader.id()) {
            return Ok(*layout);
        }
        let layout = self
            .backend
            .create_bind_group_layout(&shader.layout_entries())
            .map_err(|e| RendererError::Shader {
                name: shader.name().to_string(),
                message: e.to_string(),
            })?;
        self.layouts.insert(shader.id(), layout);
        Ok(layout)
    }

    fn pipeline_for(
        &mut self,
        vs: &Shader,
        ps: &Shader,
        indexed: bool,
    ) -> RendererResult<RenderPipelineHandle> {
        let color_formats: Vec<TextureFormat> = self
            .state
            .color_targets
            .iter()
            .filter_map(|view| self.views.get(view).map(|info| info.format))
            .collect();
        let depth_format = self
            .state
            .depth_target
            .and_then(|view| self.views.get(&view).map(|info| info.format));
        let key = PipelineKey {
            vertex_shader: vs.id(),
            pixel_shader: ps.id(),
            color_formats,
            depth_format,
            raster: self.state.raster,
            indexed,
        };
        if let Some(pipeline) = self.pipelines.get(&key) {
            return Ok(*pipeline);
        }

        log::debug!(
            "Pipeline cache miss: {} + {} -> {:?} / {:?}",
            vs.name(),
            ps.name(),
            key.color_formats,
            key.depth_format
        );
        let vs_layout = self.layout_for(vs)?;
        let ps_layout = self.layout_for(ps)?;
        let desc = RenderPipelineDescriptor {
            label: Some(format!("{} + {}", vs.name(), ps.name())),
            vertex_shader: vs.source().to_string(),
            vertex_entry: vs.entry_point().to_string(),
            fragment_shader: ps.source().to_string(),
            fragment_entry: ps.entry_point().to_string(),
            vertex_layouts: if indexed { vec![Vertex::layout()] } else { Vec::new() },
            bind_group_layouts: vec![vs_layout, ps_layout],
            front_face: FrontFace::Cw,
            cull_mode: key.raster.cull_mode,
            depth_stencil: key.depth_format.map(|format| DepthStencilState {
                format,
                depth_write_enabled: key.raster.depth_write,
                depth_compare: key.raster.depth_compare,
            }),
            color_targets: key
                .color_formats
                .iter()
                .enumerate()
                .map(|(location, format)| ColorTargetState {
                    format: *format,
                    write_mask: if ps.reflection().writes_location(location as u32) {
                        ColorWrites::ALL
                    } else {
                        ColorWrites::NONE
                    },
                })
                .collect(),
        };
        let pipeline = self.backend.create_render_pipeline(&desc).map_err(|e| {
            RendererError::creation("render pipeline", format!("{:?}: {}", desc.label, e))
        })?;
        self.pipelines.insert(key, pipeline);
        Ok(pipeline)
    }

    // Support for shader binding resolution

    pub(crate) fn upload_uniforms(&mut self, data: &[u8]) -> RendererResult<UniformSlice> {
        self.uniforms.upload(&mut self.backend, data)
    }

    pub(crate) fn uniform_epoch(&self) -> u64 {
        self.uniforms.epoch()
    }

    /// Black texture bound to texture slots a shader declares but nobody set
    pub(crate) fn fallback_view(&mut self, dimension: ViewDimension) -> RendererResult<TextureViewHandle> {
        let cached = match dimension {
            ViewDimension::D2 => self.fallback_2d,
            ViewDimension::Cube => self.fallback_cube,
        };
        if let Some(view) = cached {
            return Ok(view);
        }

        let kind = match dimension {
            ViewDimension::D2 => TextureKind::D2,
            ViewDimension::Cube => TextureKind::Cube,
        };
        let texture = self.create_texture(&TextureDescriptor {
            label: Some(format!("Fallback {:?}", dimension)),
            width: 1,
            height: 1,
            kind,
            mip_levels: 1,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        })?;
        for layer in 0..kind.array_layers() {
            self.write_texture(texture, 0, layer, &[0, 0, 0, 0], 1, 1);
        }
        let view_desc = match dimension {
            ViewDimension::D2 => TextureViewDescriptor::d2(),
            ViewDimension::Cube => TextureViewDescriptor::cube(),
        };
        let view = self.create_texture_view(texture, &view_desc)?;
        match dimension {
            ViewDimension::D2 => self.fallback_2d = Some(view),
            ViewDimension::Cube => self.fallback_cube = Some(view),
        }
        Ok(view)
    }

    pub(crate) fn fallback_sampler(&mut self) -> RendererResult<SamplerHandle> {
        if let Some(sampler) = self.fallback_sampler {
            return Ok(sampler);
        }
        let sampler = self.create_sampler(&SamplerDescriptor {
            label: Some("Fallback Sampler".to_string()),
            ..Default::default()
        })?;
        self.fallback_sampler = Some(sampler);
        Ok(sampler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DummyBackend, RecordedCommand};

    fn color_target(ctx: &mut RenderContext<DummyBackend>, size: u32, label: &str) -> TextureViewHandle {
        let texture = ctx
            .create_texture(&TextureDescriptor {
                label: Some(label.to_string()),
                width: size,
                height: size,
                usage: TextureUsage::RENDER_TARGET,
                ..Default::default()
            })
            .unwrap();
        ctx.create_texture_view(texture, &TextureViewDescriptor::d2()).unwrap()
    }

    #[test]
    fn test_rebinding_same_targets_keeps_pass() {
        let mut ctx = RenderContext::new(DummyBackend::new(64, 64));
        let view = color_target(&mut ctx, 64, "a");
        ctx.set_render_targets(&[view], None).unwrap();
        ctx.ensure_pass();
        ctx.set_render_targets(&[view], None).unwrap();
        assert!(ctx.pass_open);

        ctx.unbind_render_targets();
        assert!(!ctx.pass_open);
    }

    #[test]
    fn test_clear_closes_open_pass() {
        let mut ctx = RenderContext::new(DummyBackend::new(64, 64));
        let view = color_target(&mut ctx, 64, "a");
        ctx.set_render_targets(&[view], None).unwrap();
        ctx.ensure_pass();
        ctx.clear_color(view, [0.0; 4]).unwrap();

        let commands = ctx.backend().commands();
        let ends = commands
            .iter()
            .filter(|c| matches!(c, RecordedCommand::EndRenderPass))
            .count();
        assert_eq!(ends, 2);
        assert!(!ctx.pass_open);
    }

    #[test]
    fn test_depth_view_rejected_as_color_target() {
        let mut ctx = RenderContext::new(DummyBackend::new(64, 64));
        let depth = ctx
            .create_texture(&TextureDescriptor {
                label: Some("depth".to_string()),
                width: 64,
                height: 64,
                format: TextureFormat::Depth32Float,
                usage: TextureUsage::RENDER_ATTACHMENT,
                ..Default::default()
            })
            .unwrap();
        let view = ctx.create_texture_view(depth, &TextureViewDescriptor::d2()).unwrap();
        assert!(ctx.set_render_targets(&[view], None).is_err());
        assert!(ctx.set_render_targets(&[], Some(view)).is_ok());
    }

    #[test]
    fn test_viewport_clamped_to_smallest_target() {
        let mut ctx = RenderContext::new(DummyBackend::new(64, 64));
        let small = color_target(&mut ctx, 16, "small");
        ctx.set_render_targets(&[small], None).unwrap();
        ctx.set_viewport(Viewport::new(64, 64));
        let clamped = ctx.clamped_viewport();
        assert_eq!(clamped.width, 16.0);
        assert_eq!(clamped.height, 16.0);
    }

    #[test]
    fn test_mip_view_extent() {
        let mut ctx = RenderContext::new(DummyBackend::new(64, 64));
        let texture = ctx
            .create_texture(&TextureDescriptor {
                label: Some("cube".to_string()),
                width: 64,
                height: 64,
                kind: TextureKind::Cube,
                mip_levels: 4,
                usage: TextureUsage::RENDER_TARGET,
                ..Default::default()
            })
            .unwrap();
        let view = ctx
            .create_texture_view(texture, &TextureViewDescriptor::face(3, 2))
            .unwrap();
        let info = ctx.view_info(view).unwrap();
        assert_eq!((info.width, info.height), (16, 16));
    }

    #[test]
    fn test_destroy_texture_drops_its_views() {
        let mut ctx = RenderContext::new(DummyBackend::new(64, 64));
        let view = color_target(&mut ctx, 8, "a");
        let texture = ctx.view_info(view).unwrap().texture.unwrap();
        ctx.destroy_texture(texture);
        assert!(ctx.view_info(view).is_none());
        assert!(ctx.texture_info(texture).is_none());
    }
}

//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't perform GPU work. It records every command it receives so
//! tests can assert pass ordering, attachments and bound resources without
//! requiring GPU hardware.

use std::collections::HashMap;

use crate::backend::traits::*;
use crate::backend::types::*;

/// A command observed by the dummy backend, in submission order
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    BeginFrame,
    BeginRenderPass(RenderPassDescriptor),
    EndRenderPass,
    SetPipeline(RenderPipelineHandle),
    SetBindGroup { index: u32, bind_group: BindGroupHandle },
    SetVertexBuffer { slot: u32, buffer: BufferHandle },
    SetIndexBuffer { buffer: BufferHandle },
    SetViewport(Viewport),
    Draw { vertex_count: u32 },
    DrawIndexed { index_count: u32 },
    WriteBuffer { buffer: BufferHandle, offset: u64, data: Vec<u8> },
    WriteTexture { texture: TextureHandle, mip_level: u32, array_layer: u32, bytes: usize },
    Submit,
    Present { vsync: bool },
}

/// Dummy GPU backend.
#[derive(Debug)]
pub struct DummyBackend {
    width: u32,
    height: u32,
    next_id: u64,
    swapchain_view: TextureViewHandle,
    in_pass: bool,
    commands: Vec<RecordedCommand>,
    textures: HashMap<TextureHandle, TextureDescriptor>,
    views: HashMap<TextureViewHandle, (TextureHandle, TextureViewDescriptor)>,
    buffers: HashMap<BufferHandle, BufferDescriptor>,
    bind_groups: HashMap<BindGroupHandle, Vec<(u32, BindGroupEntry)>>,
    pipelines: HashMap<RenderPipelineHandle, RenderPipelineDescriptor>,
    destroyed_bind_groups: usize,
    fail_next_present: bool,
    texture_limit: Option<usize>,
}

impl DummyBackend {
    /// Create a new dummy backend with a virtual surface of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            next_id: 2,
            swapchain_view: TextureViewHandle(1),
            in_pass: false,
            commands: Vec::new(),
            textures: HashMap::new(),
            views: HashMap::new(),
            buffers: HashMap::new(),
            bind_groups: HashMap::new(),
            pipelines: HashMap::new(),
            destroyed_bind_groups: 0,
            fail_next_present: false,
            texture_limit: None,
        }
    }

    /// Get the backend name.
    pub fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn next(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Every command recorded so far
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    /// Forget recorded commands, keeping resources alive
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Descriptor a texture was created with
    pub fn texture_descriptor(&self, texture: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(&texture)
    }

    /// Texture and subresource range behind a view
    pub fn view_info(&self, view: TextureViewHandle) -> Option<&(TextureHandle, TextureViewDescriptor)> {
        self.views.get(&view)
    }

    /// Entries of a live bind group
    pub fn bind_group_entries(&self, bind_group: BindGroupHandle) -> Option<&[(u32, BindGroupEntry)]> {
        self.bind_groups.get(&bind_group).map(Vec::as_slice)
    }

    /// Descriptor a pipeline was created with
    pub fn pipeline_descriptor(&self, pipeline: RenderPipelineHandle) -> Option<&RenderPipelineDescriptor> {
        self.pipelines.get(&pipeline)
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn destroyed_bind_group_count(&self) -> usize {
        self.destroyed_bind_groups
    }

    /// Make the next `present` fail with `PresentFailed`
    pub fn fail_next_present(&mut self) {
        self.fail_next_present = true;
    }

    /// Refuse texture creation once this many textures are alive
    pub fn set_texture_limit(&mut self, limit: Option<usize>) {
        self.texture_limit = limit;
    }

    /// Render passes in recording order, each with the draws issued inside it
    pub fn passes(&self) -> Vec<RecordedPass> {
        let mut passes = Vec::new();
        let mut current: Option<RecordedPass> = None;
        for command in &self.commands {
            match command {
                RecordedCommand::BeginRenderPass(desc) => {
                    current = Some(RecordedPass {
                        descriptor: desc.clone(),
                        draws: 0,
                        bind_groups: Vec::new(),
                        viewports: Vec::new(),
                    });
                }
                RecordedCommand::EndRenderPass => {
                    if let Some(pass) = current.take() {
                        passes.push(pass);
                    }
                }
                RecordedCommand::Draw { .. } | RecordedCommand::DrawIndexed { .. } => {
                    if let Some(pass) = current.as_mut() {
                        pass.draws += 1;
                    }
                }
                RecordedCommand::SetBindGroup { bind_group, .. } => {
                    if let Some(pass) = current.as_mut() {
                        pass.bind_groups.push(*bind_group);
                    }
                }
                RecordedCommand::SetViewport(viewport) => {
                    if let Some(pass) = current.as_mut() {
                        pass.viewports.push(*viewport);
                    }
                }
                _ => {}
            }
        }
        passes
    }
}

/// A render pass reconstructed from the command log
#[derive(Debug, Clone)]
pub struct RecordedPass {
    pub descriptor: RenderPassDescriptor,
    pub draws: usize,
    pub bind_groups: Vec<BindGroupHandle>,
    pub viewports: Vec<Viewport>,
}

impl RecordedPass {
    pub fn color_views(&self) -> Vec<TextureViewHandle> {
        self.descriptor.color_attachments.iter().map(|a| a.view).collect()
    }

    pub fn is_clear(&self) -> bool {
        self.draws == 0
            && (self
                .descriptor
                .color_attachments
                .iter()
                .any(|a| matches!(a.load_op, LoadOp::Clear(_)))
                || self
                    .descriptor
                    .depth_stencil_attachment
                    .as_ref()
                    .is_some_and(|d| matches!(d.depth_load_op, LoadOp::Clear(_))))
    }
}

impl GraphicsBackend for DummyBackend {
    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            log::trace!("DummyBackend: resize {}x{}", width, height);
            self.width = width;
            self.height = height;
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn begin_frame(&mut self) -> BackendResult<FrameContext> {
        self.commands.push(RecordedCommand::BeginFrame);
        Ok(FrameContext {
            swapchain_view: self.swapchain_view,
            width: self.width,
            height: self.height,
        })
    }

    fn present(&mut self, vsync: bool) -> BackendResult<()> {
        self.submit();
        if std::mem::take(&mut self.fail_next_present) {
            return Err(BackendError::PresentFailed("surface outdated".to_string()));
        }
        self.commands.push(RecordedCommand::Present { vsync });
        Ok(())
    }

    fn submit(&mut self) {
        self.commands.push(RecordedCommand::Submit);
    }

    fn swapchain_format(&self) -> TextureFormat {
        TextureFormat::Bgra8UnormSrgb
    }

    fn swapchain_view(&self) -> TextureViewHandle {
        self.swapchain_view
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        log::trace!("DummyBackend: creating buffer {:?} (size: {})", desc.label, desc.size);
        let handle = BufferHandle(self.next());
        self.buffers.insert(handle, desc.clone());
        Ok(handle)
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        let handle = self.create_buffer(&BufferDescriptor {
            size: data.len() as u64,
            ..desc.clone()
        })?;
        Ok(handle)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        self.commands.push(RecordedCommand::WriteBuffer {
            buffer,
            offset,
            data: data.to_vec(),
        });
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{}, {} mips, {:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.mip_levels,
            desc.kind
        );
        if desc.width == 0 || desc.height == 0 || desc.mip_levels == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?}: zero-sized texture {}x{} with {} mips",
                desc.label, desc.width, desc.height, desc.mip_levels
            )));
        }
        if self.texture_limit.is_some_and(|limit| self.textures.len() >= limit) {
            return Err(BackendError::OutOfMemory);
        }
        let handle = TextureHandle(self.next());
        self.textures.insert(handle, desc.clone());
        Ok(handle)
    }

    fn create_texture_view(
        &mut self,
        texture: TextureHandle,
        desc: &TextureViewDescriptor,
    ) -> BackendResult<TextureViewHandle> {
        let tex = self
            .textures
            .get(&texture)
            .ok_or_else(|| BackendError::UnknownHandle(format!("{:?}", texture)))?;
        if desc.base_mip_level >= tex.mip_levels || desc.base_array_layer >= tex.kind.array_layers() {
            return Err(BackendError::TextureCreationFailed(format!(
                "view {:?} out of range for {:?}",
                desc, tex.label
            )));
        }
        let handle = TextureViewHandle(self.next());
        self.views.insert(handle, (texture, *desc));
        Ok(handle)
    }

    fn write_texture(
        &mut self,
        texture: TextureHandle,
        mip_level: u32,
        array_layer: u32,
        data: &[u8],
        _width: u32,
        _height: u32,
    ) {
        self.commands.push(RecordedCommand::WriteTexture {
            texture,
            mip_level,
            array_layer,
            bytes: data.len(),
        });
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        log::trace!("DummyBackend: creating sampler {:?}", desc.label);
        Ok(SamplerHandle(self.next()))
    }

    fn create_bind_group_layout(
        &mut self,
        _entries: &[BindGroupLayoutEntry],
    ) -> BackendResult<BindGroupLayoutHandle> {
        Ok(BindGroupLayoutHandle(self.next()))
    }

    fn create_bind_group(
        &mut self,
        _layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle> {
        let handle = BindGroupHandle(self.next());
        self.bind_groups.insert(handle, entries.to_vec());
        Ok(handle)
    }

    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> BackendResult<RenderPipelineHandle> {
        log::trace!("DummyBackend: creating pipeline {:?}", desc.label);
        let handle = RenderPipelineHandle(self.next());
        self.pipelines.insert(handle, desc.clone());
        Ok(handle)
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        debug_assert!(!self.in_pass, "render pass already open");
        self.in_pass = true;
        self.commands.push(RecordedCommand::BeginRenderPass(desc.clone()));
    }

    fn end_render_pass(&mut self) {
        if self.in_pass {
            self.in_pass = false;
            self.commands.push(RecordedCommand::EndRenderPass);
        }
    }

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        self.commands.push(RecordedCommand::SetPipeline(pipeline));
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle) {
        self.commands.push(RecordedCommand::SetBindGroup { index, bind_group });
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, _offset: u64) {
        self.commands.push(RecordedCommand::SetVertexBuffer { slot, buffer });
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, _offset: u64, _format: IndexFormat) {
        self.commands.push(RecordedCommand::SetIndexBuffer { buffer });
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.commands.push(RecordedCommand::SetViewport(*viewport));
    }

    fn draw(&mut self, vertices: std::ops::Range<u32>, _instances: std::ops::Range<u32>) {
        self.commands.push(RecordedCommand::Draw {
            vertex_count: vertices.len() as u32,
        });
    }

    fn draw_indexed(
        &mut self,
        indices: std::ops::Range<u32>,
        _base_vertex: i32,
        _instances: std::ops::Range<u32>,
    ) {
        self.commands.push(RecordedCommand::DrawIndexed {
            index_count: indices.len() as u32,
        });
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer);
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
    }

    fn destroy_texture_view(&mut self, view: TextureViewHandle) {
        self.views.remove(&view);
    }

    fn destroy_bind_group(&mut self, bind_group: BindGroupHandle) {
        if self.bind_groups.remove(&bind_group).is_some() {
            self.destroyed_bind_groups += 1;
        }
    }
}

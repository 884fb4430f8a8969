//! Shader stages with name-addressed parameters.
//!
//! A [`Shader`] is one WGSL stage. Its constant blocks, textures and samplers are
//! discovered by reflection and addressed by name. Values are staged on the CPU and
//! uploaded by [`ShaderParameters::copy_all_buffer_data`]. Setting a name the shader
//! does not declare is not an error; it is ignored so callers can bind optional
//! inputs without knowing which ones a given shader uses.

pub mod library;
pub mod reflection;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use glam::{Mat4, Vec2, Vec3, Vec4};
use parking_lot::Mutex;

use crate::backend::*;
use crate::context::{RenderContext, UniformSlice};
use crate::error::{RendererError, RendererResult};

pub use reflection::{ShaderReflection, TextureSlot, UniformBlock, UniformVariable};

static NEXT_SHADER_ID: AtomicU64 = AtomicU64::new(1);

/// Bind group entries of one stage plus the textures the draw will read
#[derive(Debug, Clone, Default)]
pub struct ResolvedBindings {
    pub entries: Vec<(u32, BindGroupEntry)>,
    pub read_views: Vec<TextureViewHandle>,
}

#[derive(Debug, Default)]
struct StagedState {
    blocks: Vec<Vec<u8>>,
    uploads: Vec<Option<UniformSlice>>,
    textures: BTreeMap<String, TextureViewHandle>,
    samplers: BTreeMap<String, SamplerHandle>,
}

/// A reflected WGSL shader stage
pub struct Shader {
    id: u64,
    name: String,
    stage: ShaderStage,
    source: String,
    reflection: ShaderReflection,
    state: Mutex<StagedState>,
}

impl std::fmt::Debug for Shader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shader")
            .field("name", &self.name)
            .field("stage", &self.stage)
            .finish()
    }
}

impl Shader {
    /// Entry point and bind group used by vertex shaders
    pub const VERTEX_ENTRY: &'static str = "vs_main";
    pub const VERTEX_GROUP: u32 = 0;
    /// Entry point and bind group used by pixel shaders
    pub const PIXEL_ENTRY: &'static str = "fs_main";
    pub const PIXEL_GROUP: u32 = 1;

    /// Reflect a WGSL stage
    pub fn from_wgsl(name: &str, stage: ShaderStage, source: &str) -> RendererResult<Arc<Self>> {
        let (entry, group) = match stage {
            ShaderStage::Vertex => (Self::VERTEX_ENTRY, Self::VERTEX_GROUP),
            ShaderStage::Fragment => (Self::PIXEL_ENTRY, Self::PIXEL_GROUP),
        };
        let reflection =
            reflection::reflect(source, stage, entry, group).map_err(|message| RendererError::Shader {
                name: name.to_string(),
                message,
            })?;

        let state = StagedState {
            blocks: reflection
                .blocks
                .iter()
                .map(|block| vec![0u8; block.size as usize])
                .collect(),
            uploads: vec![None; reflection.blocks.len()],
            ..Default::default()
        };

        log::debug!(
            "Loaded shader {} ({:?}): {} constants, {} textures, {} samplers",
            name,
            stage,
            reflection.variables.len(),
            reflection.textures.len(),
            reflection.samplers.len()
        );

        Ok(Arc::new(Self {
            id: NEXT_SHADER_ID.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            stage,
            source: source.to_string(),
            reflection,
            state: Mutex::new(state),
        }))
    }

    pub fn vertex(name: &str, source: &str) -> RendererResult<Arc<Self>> {
        Self::from_wgsl(name, ShaderStage::Vertex, source)
    }

    pub fn pixel(name: &str, source: &str) -> RendererResult<Arc<Self>> {
        Self::from_wgsl(name, ShaderStage::Fragment, source)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn entry_point(&self) -> &'static str {
        match self.stage {
            ShaderStage::Vertex => Self::VERTEX_ENTRY,
            ShaderStage::Fragment => Self::PIXEL_ENTRY,
        }
    }

    pub fn reflection(&self) -> &ShaderReflection {
        &self.reflection
    }

    /// Staged bytes of a constant, as they will be uploaded by the next copy
    pub fn staged_data(&self, name: &str) -> Option<Vec<u8>> {
        let variable = self.reflection.variables.get(name)?;
        let state = self.state.lock();
        let start = variable.offset as usize;
        state.blocks[variable.block]
            .get(start..start + variable.size as usize)
            .map(<[u8]>::to_vec)
    }

    pub fn bound_texture(&self, name: &str) -> Option<TextureViewHandle> {
        self.state.lock().textures.get(name).copied()
    }

    pub fn bound_sampler(&self, name: &str) -> Option<SamplerHandle> {
        self.state.lock().samplers.get(name).copied()
    }

    pub(crate) fn layout_entries(&self) -> Vec<BindGroupLayoutEntry> {
        let visibility = ShaderStageFlags::from(self.stage);
        let blocks = self.reflection.blocks.iter().map(|block| BindGroupLayoutEntry {
            binding: block.binding,
            visibility,
            ty: BindingType::UniformBuffer {
                min_size: block.size as u64,
            },
        });
        let textures = self.reflection.textures.values().map(|slot| BindGroupLayoutEntry {
            binding: slot.binding,
            visibility,
            ty: BindingType::Texture {
                sample_type: TextureSampleType::Float {
                    filterable: slot.filterable,
                },
                view_dimension: slot.dimension,
            },
        });
        let samplers = self.reflection.samplers.values().map(|slot| BindGroupLayoutEntry {
            binding: slot.binding,
            visibility,
            ty: BindingType::Sampler,
        });
        blocks.chain(textures).chain(samplers).collect()
    }

    /// Bind group entries for a draw.
    ///
    /// Blocks whose last upload predates the current submission are uploaded again,
    /// and unset slots fall back to a black texture or a default sampler.
    pub(crate) fn resolve_bindings<B: GraphicsBackend>(
        &self,
        ctx: &mut RenderContext<B>,
    ) -> RendererResult<ResolvedBindings> {
        let mut state = self.state.lock();
        let epoch = ctx.uniform_epoch();
        let mut resolved = ResolvedBindings::default();

        for (index, block) in self.reflection.blocks.iter().enumerate() {
            let cached = state.uploads[index];
            let slice = match cached {
                Some(slice) if slice.epoch == epoch => slice,
                _ => {
                    let slice = ctx.upload_uniforms(&state.blocks[index])?;
                    state.uploads[index] = Some(slice);
                    slice
                }
            };
            resolved.entries.push((
                block.binding,
                BindGroupEntry::Buffer {
                    buffer: slice.buffer,
                    offset: slice.offset,
                    size: Some(block.size as u64),
                },
            ));
        }

        for (name, slot) in &self.reflection.textures {
            let view = match state.textures.get(name) {
                Some(view) => {
                    resolved.read_views.push(*view);
                    *view
                }
                None => ctx.fallback_view(slot.dimension)?,
            };
            resolved.entries.push((slot.binding, BindGroupEntry::Texture(view)));
        }

        for (name, slot) in &self.reflection.samplers {
            let sampler = match state.samplers.get(name) {
                Some(sampler) => *sampler,
                None => ctx.fallback_sampler()?,
            };
            resolved.entries.push((slot.binding, BindGroupEntry::Sampler(sampler)));
        }

        Ok(resolved)
    }
}

/// Name-addressed access to a shader's constants and resource slots
pub trait ShaderParameters {
    fn declares_variable(&self, name: &str) -> bool;
    fn declares_texture(&self, name: &str) -> bool;
    fn declares_sampler(&self, name: &str) -> bool;

    /// Stage raw bytes for a constant. Returns false when the name is not declared.
    fn set_data(&self, name: &str, data: &[u8]) -> bool;

    fn set_matrix4x4(&self, name: &str, value: Mat4) -> bool {
        self.set_data(name, bytemuck::bytes_of(&value))
    }

    fn set_float(&self, name: &str, value: f32) -> bool {
        self.set_data(name, bytemuck::bytes_of(&value))
    }

    fn set_float2(&self, name: &str, value: Vec2) -> bool {
        self.set_data(name, bytemuck::bytes_of(&value))
    }

    fn set_float3(&self, name: &str, value: Vec3) -> bool {
        self.set_data(name, bytemuck::bytes_of(&value))
    }

    fn set_float4(&self, name: &str, value: Vec4) -> bool {
        self.set_data(name, bytemuck::bytes_of(&value))
    }

    fn set_int(&self, name: &str, value: i32) -> bool {
        self.set_data(name, bytemuck::bytes_of(&value))
    }

    fn set_shader_resource_view(&self, name: &str, view: TextureViewHandle) -> bool;
    fn set_sampler_state(&self, name: &str, sampler: SamplerHandle) -> bool;

    /// Upload every staged constant block into fresh uniform memory
    fn copy_all_buffer_data<B: GraphicsBackend>(&self, ctx: &mut RenderContext<B>) -> RendererResult<()>;

    /// Clear every texture and sampler slot
    fn unbind_resources(&self);
}

impl ShaderParameters for Shader {
    fn declares_variable(&self, name: &str) -> bool {
        self.reflection.variables.contains_key(name)
    }

    fn declares_texture(&self, name: &str) -> bool {
        self.reflection.textures.contains_key(name)
    }

    fn declares_sampler(&self, name: &str) -> bool {
        self.reflection.samplers.contains_key(name)
    }

    fn set_data(&self, name: &str, data: &[u8]) -> bool {
        let Some(variable) = self.reflection.variables.get(name) else {
            log::trace!("{}: no constant named {}", self.name, name);
            return false;
        };
        let size = variable.size as usize;
        if data.len() > size {
            log::warn!(
                "{}: {} bytes written to {} ({} bytes), truncating",
                self.name,
                data.len(),
                name,
                size
            );
        }
        let count = data.len().min(size);
        let start = variable.offset as usize;
        let mut state = self.state.lock();
        state.blocks[variable.block][start..start + count].copy_from_slice(&data[..count]);
        true
    }

    fn set_shader_resource_view(&self, name: &str, view: TextureViewHandle) -> bool {
        if !self.declares_texture(name) {
            log::trace!("{}: no texture named {}", self.name, name);
            return false;
        }
        self.state.lock().textures.insert(name.to_string(), view);
        true
    }

    fn set_sampler_state(&self, name: &str, sampler: SamplerHandle) -> bool {
        if !self.declares_sampler(name) {
            log::trace!("{}: no sampler named {}", self.name, name);
            return false;
        }
        self.state.lock().samplers.insert(name.to_string(), sampler);
        true
    }

    fn copy_all_buffer_data<B: GraphicsBackend>(&self, ctx: &mut RenderContext<B>) -> RendererResult<()> {
        let mut state = self.state.lock();
        for index in 0..state.blocks.len() {
            let slice = ctx.upload_uniforms(&state.blocks[index])?;
            state.uploads[index] = Some(slice);
        }
        Ok(())
    }

    fn unbind_resources(&self) {
        let mut state = self.state.lock();
        state.textures.clear();
        state.samplers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DummyBackend, RecordedCommand};

    const VS: &str = r#"
struct VsConstants {
    c_worldTransform: mat4x4<f32>,
    c_scale: f32,
}
@group(0) @binding(0) var<uniform> constants: VsConstants;

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {
    return constants.c_worldTransform * vec4<f32>(f32(index) * constants.c_scale, 0.0, 0.0, 1.0);
}
"#;

    #[test]
    fn test_undeclared_names_are_ignored() {
        let shader = Shader::vertex("test", VS).unwrap();
        assert!(!shader.set_float("c_missing", 1.0));
        assert!(!shader.set_shader_resource_view("Missing", TextureViewHandle(5)));
        assert!(shader.set_float("c_scale", 2.0));
        assert_eq!(shader.staged_data("c_scale").unwrap(), 2.0f32.to_ne_bytes().to_vec());
    }

    #[test]
    fn test_oversized_data_is_truncated() {
        let shader = Shader::vertex("test", VS).unwrap();
        assert!(shader.set_data("c_scale", &[1u8; 16]));
        assert_eq!(shader.staged_data("c_scale").unwrap(), vec![1u8; 4]);
    }

    #[test]
    fn test_copy_uploads_each_block_once() {
        let shader = Shader::vertex("test", VS).unwrap();
        let mut ctx = RenderContext::new(DummyBackend::new(8, 8));
        shader.set_matrix4x4("c_worldTransform", Mat4::IDENTITY);
        shader.copy_all_buffer_data(&mut ctx).unwrap();

        let writes = ctx
            .backend()
            .commands()
            .iter()
            .filter(|c| matches!(c, RecordedCommand::WriteBuffer { .. }))
            .count();
        assert_eq!(writes, 1);
    }

    #[test]
    fn test_stale_upload_is_refreshed_after_submit() {
        let shader = Shader::vertex("test", VS).unwrap();
        let mut ctx = RenderContext::new(DummyBackend::new(8, 8));
        shader.copy_all_buffer_data(&mut ctx).unwrap();
        let first = shader.resolve_bindings(&mut ctx).unwrap();
        ctx.submit();
        let second = shader.resolve_bindings(&mut ctx).unwrap();

        // Same offset in a new submission means the block was written again
        assert_eq!(first.entries, second.entries);
        let writes = ctx
            .backend()
            .commands()
            .iter()
            .filter(|c| matches!(c, RecordedCommand::WriteBuffer { .. }))
            .count();
        assert_eq!(writes, 2);
    }
}

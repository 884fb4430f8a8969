//! Explicit pipeline state tracked by the render context

use std::ops::{Deref, DerefMut};

use crate::backend::{
    BufferHandle, CompareFunction, CullMode, GraphicsBackend, IndexFormat, TextureViewHandle,
    Viewport,
};

use super::RenderContext;

/// Rasterizer and depth state applied to subsequent draws
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterState {
    pub cull_mode: CullMode,
    pub depth_compare: CompareFunction,
    pub depth_write: bool,
}

impl RasterState {
    /// Front-face culling with a LessEqual read-only depth test, used to draw a
    /// sky cube from the inside at the far plane
    pub const SKY: Self = Self {
        cull_mode: CullMode::Front,
        depth_compare: CompareFunction::LessEqual,
        depth_write: false,
    };
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            cull_mode: CullMode::Back,
            depth_compare: CompareFunction::Less,
            depth_write: true,
        }
    }
}

/// Everything bound on the context between draws
#[derive(Debug, Clone, Default)]
pub struct BoundState {
    pub color_targets: Vec<TextureViewHandle>,
    pub depth_target: Option<TextureViewHandle>,
    pub viewport: Viewport,
    pub vertex_buffer: Option<BufferHandle>,
    pub index_buffer: Option<(BufferHandle, IndexFormat)>,
    pub raster: RasterState,
}

/// Targets and viewport captured by [`RenderContext::save_state`]
#[derive(Debug, Clone, PartialEq)]
pub struct SavedState {
    pub color_targets: Vec<TextureViewHandle>,
    pub depth_target: Option<TextureViewHandle>,
    pub viewport: Viewport,
}

/// Restores the saved targets and viewport when dropped.
///
/// Dereferences to the context, so work inside the scope goes through the guard.
pub struct StateGuard<'a, B: GraphicsBackend> {
    ctx: &'a mut RenderContext<B>,
    saved: Option<SavedState>,
}

impl<'a, B: GraphicsBackend> StateGuard<'a, B> {
    pub(crate) fn new(ctx: &'a mut RenderContext<B>) -> Self {
        let saved = ctx.snapshot();
        Self {
            ctx,
            saved: Some(saved),
        }
    }

    pub fn saved(&self) -> Option<&SavedState> {
        self.saved.as_ref()
    }
}

impl<B: GraphicsBackend> Deref for StateGuard<'_, B> {
    type Target = RenderContext<B>;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl<B: GraphicsBackend> DerefMut for StateGuard<'_, B> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl<B: GraphicsBackend> Drop for StateGuard<'_, B> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.ctx.restore(saved);
        }
    }
}

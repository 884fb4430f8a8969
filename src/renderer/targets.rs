//! Multiple render targets shared by the scene pass and the post-process chain

use crate::backend::*;
use crate::context::RenderContext;
use crate::error::RendererResult;

/// Fixed slots of the render target array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTargetSlot {
    SceneColor = 0,
    SceneAmbient = 1,
    SceneNormal = 2,
    SceneDepth = 3,
    PostProcessZero = 4,
    PostProcessOne = 5,
}

impl RenderTargetSlot {
    pub const COUNT: usize = 6;

    pub const ALL: [RenderTargetSlot; Self::COUNT] = [
        RenderTargetSlot::SceneColor,
        RenderTargetSlot::SceneAmbient,
        RenderTargetSlot::SceneNormal,
        RenderTargetSlot::SceneDepth,
        RenderTargetSlot::PostProcessZero,
        RenderTargetSlot::PostProcessOne,
    ];

    /// Slots written by the scene pass, in output location order
    pub const SCENE: [RenderTargetSlot; 4] = [
        RenderTargetSlot::SceneColor,
        RenderTargetSlot::SceneAmbient,
        RenderTargetSlot::SceneNormal,
        RenderTargetSlot::SceneDepth,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn format(self) -> TextureFormat {
        match self {
            RenderTargetSlot::SceneDepth => TextureFormat::R32Float,
            _ => TextureFormat::Rgba8Unorm,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RenderTargetSlot::SceneColor => "Scene Color",
            RenderTargetSlot::SceneAmbient => "Scene Ambient",
            RenderTargetSlot::SceneNormal => "Scene Normals",
            RenderTargetSlot::SceneDepth => "Scene Depths",
            RenderTargetSlot::PostProcessZero => "Post Process 0",
            RenderTargetSlot::PostProcessOne => "Post Process 1",
        }
    }

    /// Value the slot is cleared to at frame start
    pub fn clear_value(self) -> [f32; 4] {
        match self {
            RenderTargetSlot::SceneDepth => [1.0, 0.0, 0.0, 0.0],
            _ => [0.0; 4],
        }
    }
}

/// One allocated render target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    pub texture: TextureHandle,
    pub view: TextureViewHandle,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

/// Every slot, allocated together at one size
#[derive(Debug, Clone)]
pub struct RenderTargets {
    targets: Vec<RenderTarget>,
    width: u32,
    height: u32,
}

impl RenderTargets {
    pub fn create<B: GraphicsBackend>(
        ctx: &mut RenderContext<B>,
        width: u32,
        height: u32,
    ) -> RendererResult<Self> {
        let mut targets = Vec::with_capacity(RenderTargetSlot::COUNT);
        for slot in RenderTargetSlot::ALL {
            match Self::create_slot(ctx, slot, width, height) {
                Ok(target) => targets.push(target),
                Err(err) => {
                    for target in targets {
                        ctx.destroy_texture(target.texture);
                    }
                    return Err(err);
                }
            }
        }
        log::debug!("Created {} render targets at {}x{}", targets.len(), width, height);

        Ok(Self {
            targets,
            width,
            height,
        })
    }

    fn create_slot<B: GraphicsBackend>(
        ctx: &mut RenderContext<B>,
        slot: RenderTargetSlot,
        width: u32,
        height: u32,
    ) -> RendererResult<RenderTarget> {
        let texture = ctx.create_texture(&TextureDescriptor {
            label: Some(slot.name().to_string()),
            width,
            height,
            kind: TextureKind::D2,
            mip_levels: 1,
            format: slot.format(),
            usage: TextureUsage::RENDER_TARGET,
        })?;
        let view = match ctx.create_texture_view(texture, &TextureViewDescriptor::d2()) {
            Ok(view) => view,
            Err(err) => {
                ctx.destroy_texture(texture);
                return Err(err);
            }
        };
        Ok(RenderTarget {
            texture,
            view,
            width,
            height,
            format: slot.format(),
        })
    }

    pub fn get(&self, slot: RenderTargetSlot) -> &RenderTarget {
        &self.targets[slot.index()]
    }

    pub fn view(&self, slot: RenderTargetSlot) -> TextureViewHandle {
        self.get(slot).view
    }

    pub fn scene_views(&self) -> [TextureViewHandle; 4] {
        RenderTargetSlot::SCENE.map(|slot| self.view(slot))
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn release<B: GraphicsBackend>(self, ctx: &mut RenderContext<B>) {
        for target in self.targets {
            ctx.destroy_texture(target.texture);
        }
    }
}

/// Depth-stencil buffer sized with the swapchain, owned by the caller of the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthBuffer {
    pub texture: TextureHandle,
    pub view: TextureViewHandle,
    pub width: u32,
    pub height: u32,
}

impl DepthBuffer {
    pub const FORMAT: TextureFormat = TextureFormat::Depth32Float;

    pub fn create<B: GraphicsBackend>(
        ctx: &mut RenderContext<B>,
        width: u32,
        height: u32,
    ) -> RendererResult<Self> {
        let texture = ctx.create_texture(&TextureDescriptor {
            label: Some("Depth Buffer".to_string()),
            width,
            height,
            kind: TextureKind::D2,
            mip_levels: 1,
            format: Self::FORMAT,
            usage: TextureUsage::RENDER_ATTACHMENT,
        })?;
        let view = ctx.create_texture_view(texture, &TextureViewDescriptor::d2())?;
        Ok(Self {
            texture,
            view,
            width,
            height,
        })
    }

    pub fn release<B: GraphicsBackend>(self, ctx: &mut RenderContext<B>) {
        ctx.destroy_texture(self.texture);
    }
}

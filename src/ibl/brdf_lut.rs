//! Split-sum BRDF integration lookup table

use crate::backend::*;
use crate::context::RenderContext;
use crate::error::{RendererError, RendererResult};
use crate::shader::{Shader, ShaderParameters};

/// Integrates the GGX specular BRDF into a scale (r) and bias (g) on F0.
///
/// `uv.x` is N·V and `uv.y` is roughness.
pub const BRDF_LUT_PIXEL_SHADER: &str = r#"
const PI: f32 = 3.14159265359;
const SAMPLE_COUNT: u32 = 512u;

struct VertexToPixel {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

fn hammersley(i: u32, count: u32) -> vec2<f32> {
    return vec2<f32>(f32(i) / f32(count), f32(reverseBits(i)) * 2.3283064365386963e-10);
}

fn importance_sample_ggx(xi: vec2<f32>, roughness: f32) -> vec3<f32> {
    let a = roughness * roughness;
    let phi = 2.0 * PI * xi.x;
    let cos_theta = sqrt((1.0 - xi.y) / (1.0 + (a * a - 1.0) * xi.y));
    let sin_theta = sqrt(1.0 - cos_theta * cos_theta);
    return vec3<f32>(sin_theta * cos(phi), sin_theta * sin(phi), cos_theta);
}

// IBL remapping of k
fn geometry_schlick_ggx(n_dot_v: f32, roughness: f32) -> f32 {
    let k = (roughness * roughness) / 2.0;
    return n_dot_v / (n_dot_v * (1.0 - k) + k);
}

@fragment
fn fs_main(input: VertexToPixel) -> @location(0) vec2<f32> {
    let n_dot_v = max(input.uv.x, 0.001);
    let roughness = input.uv.y;
    let v = vec3<f32>(sqrt(1.0 - n_dot_v * n_dot_v), 0.0, n_dot_v);

    var scale = 0.0;
    var bias = 0.0;
    for (var i = 0u; i < SAMPLE_COUNT; i = i + 1u) {
        let h = importance_sample_ggx(hammersley(i, SAMPLE_COUNT), roughness);
        let l = normalize(2.0 * dot(v, h) * h - v);

        let n_dot_l = max(l.z, 0.0);
        let n_dot_h = max(h.z, 0.0);
        let v_dot_h = max(dot(v, h), 0.0);

        if n_dot_l > 0.0 {
            let g = geometry_schlick_ggx(n_dot_v, roughness) * geometry_schlick_ggx(n_dot_l, roughness);
            let g_vis = (g * v_dot_h) / max(n_dot_h * n_dot_v, 0.0001);
            let fc = pow(1.0 - v_dot_h, 5.0);
            scale += (1.0 - fc) * g_vis;
            bias += fc * g_vis;
        }
    }

    return vec2<f32>(scale, bias) / f32(SAMPLE_COUNT);
}
"#;

/// Two-channel lookup texture consumed as `BRDFIntegrationMap`
#[derive(Debug, Clone)]
pub struct BrdfLut {
    texture: TextureHandle,
    view: TextureViewHandle,
    size: u32,
}

impl BrdfLut {
    pub const FORMAT: TextureFormat = TextureFormat::Rg16Float;

    /// Render the table with one full-screen draw
    pub fn generate<B: GraphicsBackend>(
        ctx: &mut RenderContext<B>,
        vs: &Shader,
        ps: &Shader,
        size: u32,
    ) -> RendererResult<Self> {
        if size == 0 {
            return Err(RendererError::InvalidParameter(
                "BRDF lookup table size must be non-zero".to_string(),
            ));
        }
        log::info!("Baking BRDF lookup table ({}x{})", size, size);

        let texture = ctx.create_texture(&TextureDescriptor {
            label: Some("BRDF Lookup Table".to_string()),
            width: size,
            height: size,
            kind: TextureKind::D2,
            mip_levels: 1,
            format: Self::FORMAT,
            usage: TextureUsage::RENDER_TARGET,
        })?;
        let view = ctx.create_texture_view(texture, &TextureViewDescriptor::d2())?;

        {
            let mut guard = ctx.save_state();
            let ctx = &mut *guard;
            ctx.clear_input_assembler();
            ctx.set_render_targets(&[view], None)?;
            ctx.set_viewport(Viewport::new(size, size));
            vs.copy_all_buffer_data(ctx)?;
            ps.copy_all_buffer_data(ctx)?;
            ctx.draw_fullscreen(vs, ps)?;
        }

        Ok(Self { texture, view, size })
    }

    pub fn texture(&self) -> TextureHandle {
        self.texture
    }

    pub fn view(&self) -> TextureViewHandle {
        self.view
    }

    pub fn size(&self) -> u32 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DummyBackend, RecordedCommand};
    use crate::shader::library::ShaderLibrary;

    #[test]
    fn test_generate_single_draw_into_table() {
        let library = ShaderLibrary::load().unwrap();
        let mut ctx = RenderContext::new(DummyBackend::new(8, 8));
        let lut = BrdfLut::generate(&mut ctx, &library.fullscreen_vs, &library.brdf_lut_ps, 64).unwrap();

        let info = ctx.view_info(lut.view()).unwrap();
        assert_eq!((info.width, info.height, info.format), (64, 64, TextureFormat::Rg16Float));

        let passes = ctx.backend().passes();
        let drawing: Vec<_> = passes.iter().filter(|pass| pass.draws > 0).collect();
        assert_eq!(drawing.len(), 1);
        assert_eq!(drawing[0].descriptor.color_attachments[0].view, lut.view());
        assert!(drawing[0].viewports.contains(&Viewport::new(64, 64)));
        assert!(ctx
            .backend()
            .commands()
            .iter()
            .any(|c| matches!(c, RecordedCommand::Draw { vertex_count: 3 })));
    }

    #[test]
    fn test_zero_size_rejected() {
        let library = ShaderLibrary::load().unwrap();
        let mut ctx = RenderContext::new(DummyBackend::new(8, 8));
        assert!(BrdfLut::generate(&mut ctx, &library.fullscreen_vs, &library.brdf_lut_ps, 0).is_err());
    }
}

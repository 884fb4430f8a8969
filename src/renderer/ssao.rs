//! Screen-space ambient occlusion: sample kernel, noise texture and the three passes

use std::sync::Arc;

use glam::{Vec2, Vec3, Vec4};
use rand::Rng;

use crate::backend::*;
use crate::context::RenderContext;
use crate::error::RendererResult;
use crate::shader::Shader;
use crate::SsaoConfig;

/// Size of the offset array in the SSAO constants
pub const MAX_SAMPLES: usize = 64;

/// Hemisphere occlusion from scene depth and normals, one value per pixel
pub const SSAO_PIXEL_SHADER: &str = r#"
const MAX_SAMPLES: i32 = 64;
const DEPTH_BIAS: f32 = 0.01;

struct SsaoConstants {
    c_viewMatrix: mat4x4<f32>,
    c_projectionMatrix: mat4x4<f32>,
    c_inverseProjMatrix: mat4x4<f32>,
    c_offsets: array<vec4<f32>, 64>,
    c_radius: f32,
    c_samples: i32,
    c_randomSampleScreenScale: vec2<f32>,
}

@group(1) @binding(0) var<uniform> constants: SsaoConstants;
@group(1) @binding(1) var SceneNormals: texture_2d<f32>;
@group(1) @binding(2) var SceneDepths: texture_2d<f32>;
@group(1) @binding(3) var Random: texture_2d<f32>;
@group(1) @binding(4) var ClampSampler: sampler;

struct VertexToPixel {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

fn view_position(uv: vec2<f32>, depth: f32) -> vec3<f32> {
    let clip = vec4<f32>(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, depth, 1.0);
    let view = constants.c_inverseProjMatrix * clip;
    return view.xyz / view.w;
}

fn screen_uv(position: vec3<f32>) -> vec2<f32> {
    let clip = constants.c_projectionMatrix * vec4<f32>(position, 1.0);
    let ndc = clip.xy / clip.w;
    return vec2<f32>(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
}

@fragment
fn fs_main(input: VertexToPixel) -> @location(0) vec4<f32> {
    let dims = vec2<i32>(textureDimensions(SceneDepths));
    let pixel = clamp(vec2<i32>(input.position.xy), vec2<i32>(0), dims - 1);
    let depth = textureLoad(SceneDepths, pixel, 0).r;
    let packed_normal = textureSampleLevel(SceneNormals, ClampSampler, input.uv, 0.0).xyz;
    if depth >= 1.0 {
        return vec4<f32>(1.0);
    }

    let position = view_position(input.uv, depth);
    let normal = normalize((constants.c_viewMatrix * vec4<f32>(packed_normal * 2.0 - 1.0, 0.0)).xyz);

    // Tile the noise texture across the screen
    let noise_dims = vec2<i32>(textureDimensions(Random));
    let noise_uv = fract(input.uv * constants.c_randomSampleScreenScale);
    let noise_pixel = clamp(vec2<i32>(noise_uv * vec2<f32>(noise_dims)), vec2<i32>(0), noise_dims - 1);
    let random = textureLoad(Random, noise_pixel, 0).xyz;

    let tangent = normalize(random - normal * dot(random, normal));
    let bitangent = cross(normal, tangent);
    let tbn = mat3x3<f32>(tangent, bitangent, normal);

    let count = clamp(constants.c_samples, 1, MAX_SAMPLES);
    var occlusion = 0.0;
    for (var i = 0; i < count; i = i + 1) {
        let sample_position = position + tbn * constants.c_offsets[i].xyz * constants.c_radius;
        let sample_uv = screen_uv(sample_position);
        let sample_pixel = clamp(vec2<i32>(sample_uv * vec2<f32>(dims)), vec2<i32>(0), dims - 1);
        let scene_position = view_position(sample_uv, textureLoad(SceneDepths, sample_pixel, 0).r);

        let range = smoothstep(0.0, 1.0, constants.c_radius / max(abs(position.z - scene_position.z), 0.0001));
        if scene_position.z <= sample_position.z - DEPTH_BIAS {
            occlusion += range;
        }
    }

    return vec4<f32>(vec3<f32>(1.0 - occlusion / f32(count)), 1.0);
}
"#;

/// 4x4 box blur over the raw occlusion
pub const BLUR_PIXEL_SHADER: &str = r#"
struct BlurConstants {
    c_pixelSize: vec2<f32>,
}

@group(1) @binding(0) var<uniform> constants: BlurConstants;
@group(1) @binding(1) var BlurTarget: texture_2d<f32>;
@group(1) @binding(2) var ClampSampler: sampler;

struct VertexToPixel {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@fragment
fn fs_main(input: VertexToPixel) -> @location(0) vec4<f32> {
    var sum = 0.0;
    for (var x = -2; x < 2; x = x + 1) {
        for (var y = -2; y < 2; y = y + 1) {
            let offset = vec2<f32>(f32(x), f32(y)) * constants.c_pixelSize;
            sum += textureSampleLevel(BlurTarget, ClampSampler, input.uv + offset, 0.0).r;
        }
    }
    return vec4<f32>(vec3<f32>(sum / 16.0), 1.0);
}
"#;

/// Final composite: scene color plus occluded ambient, sky pixels untouched
pub const COMBINE_PIXEL_SHADER: &str = r#"
struct CombineConstants {
    c_ssaoEnabled: i32,
    c_ssaoOutputOnly: i32,
}

@group(1) @binding(0) var<uniform> constants: CombineConstants;
@group(1) @binding(1) var SceneColors: texture_2d<f32>;
@group(1) @binding(2) var SceneAmbient: texture_2d<f32>;
@group(1) @binding(3) var SceneDepths: texture_2d<f32>;
@group(1) @binding(4) var SSAO: texture_2d<f32>;
@group(1) @binding(5) var ClampSampler: sampler;

struct VertexToPixel {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@fragment
fn fs_main(input: VertexToPixel) -> @location(0) vec4<f32> {
    let color = textureSampleLevel(SceneColors, ClampSampler, input.uv, 0.0).rgb;
    let ambient = textureSampleLevel(SceneAmbient, ClampSampler, input.uv, 0.0).rgb;
    var ao = textureSampleLevel(SSAO, ClampSampler, input.uv, 0.0).r;

    let dims = vec2<i32>(textureDimensions(SceneDepths));
    let pixel = clamp(vec2<i32>(input.position.xy), vec2<i32>(0), dims - 1);
    let depth = textureLoad(SceneDepths, pixel, 0).r;

    if constants.c_ssaoEnabled == 0 {
        ao = 1.0;
    }
    if constants.c_ssaoOutputOnly != 0 {
        return vec4<f32>(vec3<f32>(ao), 1.0);
    }
    if depth >= 1.0 {
        return vec4<f32>(color, 1.0);
    }
    return vec4<f32>(color + ambient * ao, 1.0);
}
"#;

/// Offsets in the +Z hemisphere, denser near the origin
pub fn hemisphere_offsets<R: Rng>(rng: &mut R, count: usize) -> Vec<Vec4> {
    (0..count)
        .map(|i| {
            let direction = Vec3::new(
                rng.gen_range(-1.0..=1.0),
                rng.gen_range(-1.0..=1.0),
                rng.gen_range(0.0..=1.0),
            )
            .try_normalize()
            .unwrap_or(Vec3::Z);
            let t = i as f32 / count as f32;
            let scale = 0.1 + (1.0 - 0.1) * t * t;
            (direction * scale).extend(0.0)
        })
        .collect()
}

/// Unit rotation vectors in the XY plane, stored as RGBA texels with z = w = 0
pub fn noise_texels<R: Rng>(rng: &mut R, size: u32) -> Vec<[f32; 4]> {
    (0..size * size)
        .map(|_| {
            let v = Vec2::new(rng.gen_range(-1.0..=1.0), rng.gen_range(-1.0..=1.0))
                .try_normalize()
                .unwrap_or(Vec2::X);
            [v.x, v.y, 0.0, 0.0]
        })
        .collect()
}

/// Everything the occlusion passes need besides the render targets
#[derive(Debug)]
pub struct SsaoResources {
    pub random_texture: TextureHandle,
    pub random_view: TextureViewHandle,
    pub noise_size: u32,
    pub offsets: Vec<Vec4>,
    pub clamp_sampler: SamplerHandle,
    pub ssao_ps: Arc<Shader>,
    pub blur_ps: Arc<Shader>,
    pub combine_ps: Arc<Shader>,
}

impl SsaoResources {
    pub fn new<B: GraphicsBackend, R: Rng>(
        ctx: &mut RenderContext<B>,
        config: &SsaoConfig,
        rng: &mut R,
    ) -> RendererResult<Self> {
        let noise_size = config.noise_size.max(1);
        let random_texture = ctx.create_texture(&TextureDescriptor {
            label: Some("SSAO Random".to_string()),
            width: noise_size,
            height: noise_size,
            kind: TextureKind::D2,
            mip_levels: 1,
            format: TextureFormat::Rgba32Float,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        })?;
        let texels = noise_texels(rng, noise_size);
        ctx.write_texture(
            random_texture,
            0,
            0,
            bytemuck::cast_slice(&texels),
            noise_size,
            noise_size,
        );
        let random_view = ctx.create_texture_view(random_texture, &TextureViewDescriptor::d2())?;

        let clamp_sampler = ctx.create_sampler(&SamplerDescriptor::linear_point_mip(
            AddressMode::ClampToEdge,
            "SSAO Clamp Sampler",
        ))?;

        Ok(Self {
            random_texture,
            random_view,
            noise_size,
            offsets: hemisphere_offsets(rng, MAX_SAMPLES),
            clamp_sampler,
            ssao_ps: Shader::pixel("SSAO PS", SSAO_PIXEL_SHADER)?,
            blur_ps: Shader::pixel("SSAO Blur PS", BLUR_PIXEL_SHADER)?,
            combine_ps: Shader::pixel("SSAO Combine PS", COMBINE_PIXEL_SHADER)?,
        })
    }
}

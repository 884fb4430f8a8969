//! Cube map faces, render-target cubes and the face-by-face convolution passes

use std::f32::consts::PI;

use glam::{Vec2, Vec3};

use crate::backend::*;
use crate::context::RenderContext;
use crate::error::{RendererError, RendererResult};
use crate::shader::{Shader, ShaderParameters};

/// Face order of a cube texture's array layers
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX = 0,
    NegativeX = 1,
    PositiveY = 2,
    NegativeY = 3,
    PositiveZ = 4,
    NegativeZ = 5,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    pub fn index(self) -> u32 {
        self as u32
    }

    /// Unnormalized direction through texel coordinate `(u, v)` of this face,
    /// with `(0, 0)` at the top-left of the face image
    pub fn direction(self, u: f32, v: f32) -> Vec3 {
        let u = u * 2.0 - 1.0;
        let v = v * 2.0 - 1.0;
        let direction = match self {
            CubeFace::PositiveX => Vec3::new(1.0, -v, -u),
            CubeFace::NegativeX => Vec3::new(-1.0, -v, u),
            CubeFace::PositiveY => Vec3::new(u, 1.0, v),
            CubeFace::NegativeY => Vec3::new(u, -1.0, -v),
            CubeFace::PositiveZ => Vec3::new(u, -v, 1.0),
            CubeFace::NegativeZ => Vec3::new(-u, -v, -1.0),
        };
        direction.normalize()
    }

    /// Axis a capture camera looks down for this face
    pub fn forward(self) -> Vec3 {
        self.direction(0.5, 0.5)
    }

    /// Up vector of a capture camera for this face
    pub fn up(self) -> Vec3 {
        match self {
            CubeFace::PositiveY => Vec3::NEG_Z,
            CubeFace::NegativeY => Vec3::Z,
            _ => Vec3::Y,
        }
    }
}

/// Mips kept for a prefiltered cube of `size`, dropping the `ignored` smallest
pub fn mip_count(size: u32, ignored: u32) -> u32 {
    let full = size.max(1).ilog2();
    full.saturating_sub(ignored).max(1)
}

/// Roughness a prefiltered mip is convolved for: 0 at mip 0 rising to 1 at the last mip
pub fn roughness_for_mip(mip: u32, mip_count: u32) -> f32 {
    if mip_count <= 1 {
        0.0
    } else {
        mip as f32 / (mip_count - 1) as f32
    }
}

/// Samples taken per texel by the specular prefilter
pub const PREFILTER_SAMPLE_COUNT: u32 = 512;

/// Low-discrepancy point `i` of `count`, matching the prefilter shader's `hammersley`
pub fn hammersley(i: u32, count: u32) -> Vec2 {
    Vec2::new(
        i as f32 / count as f32,
        i.reverse_bits() as f32 * 2.328_306_4e-10,
    )
}

/// GGX half vector around `n` for sample point `xi`, as evaluated by the prefilter shader
pub fn importance_sample_ggx(xi: Vec2, n: Vec3, roughness: f32) -> Vec3 {
    let a = roughness * roughness;
    let phi = 2.0 * PI * xi.x;
    let cos_theta = ((1.0 - xi.y) / (1.0 + (a * a - 1.0) * xi.y)).sqrt();
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let h = Vec3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta);

    let up = if n.z.abs() < 0.999 { Vec3::Z } else { Vec3::X };
    let tangent = up.cross(n).normalize();
    let bitangent = n.cross(tangent);
    (tangent * h.x + bitangent * h.y + n * h.z).normalize()
}

/// A renderable, sampleable cube texture with one target view per face and mip
#[derive(Debug, Clone)]
pub struct CubeTarget {
    texture: TextureHandle,
    view: TextureViewHandle,
    face_views: Vec<TextureViewHandle>,
    size: u32,
    mip_levels: u32,
    format: TextureFormat,
}

impl CubeTarget {
    pub fn new<B: GraphicsBackend>(
        ctx: &mut RenderContext<B>,
        label: &str,
        size: u32,
        mip_levels: u32,
        format: TextureFormat,
    ) -> RendererResult<Self> {
        if size == 0 || mip_levels == 0 {
            return Err(RendererError::InvalidParameter(format!(
                "{}: cube of size {} with {} mips",
                label, size, mip_levels
            )));
        }
        let texture = ctx.create_texture(&TextureDescriptor {
            label: Some(label.to_string()),
            width: size,
            height: size,
            kind: TextureKind::Cube,
            mip_levels,
            format,
            usage: TextureUsage::RENDER_TARGET,
        })?;
        let view = ctx.create_texture_view(texture, &TextureViewDescriptor::cube())?;

        let mut face_views = Vec::with_capacity((mip_levels * 6) as usize);
        for mip in 0..mip_levels {
            for face in CubeFace::ALL {
                face_views.push(
                    ctx.create_texture_view(texture, &TextureViewDescriptor::face(face.index(), mip))?,
                );
            }
        }

        Ok(Self {
            texture,
            view,
            face_views,
            size,
            mip_levels,
            format,
        })
    }

    pub fn texture(&self) -> TextureHandle {
        self.texture
    }

    /// Whole cube, every mip
    pub fn view(&self) -> TextureViewHandle {
        self.view
    }

    pub fn face_view(&self, face: CubeFace, mip: u32) -> TextureViewHandle {
        self.face_views[(mip * 6 + face.index()) as usize]
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn destroy<B: GraphicsBackend>(self, ctx: &mut RenderContext<B>) {
        ctx.destroy_texture(self.texture);
    }
}

/// Run one full-screen draw for every face of every mip of `target`.
///
/// `stage` sets the per-face constants on the pixel shader before the upload. Targets
/// and viewport are restored afterwards, including on error.
pub fn render_cube_faces<B, F>(
    ctx: &mut RenderContext<B>,
    target: &CubeTarget,
    vs: &Shader,
    ps: &Shader,
    mut stage: F,
) -> RendererResult<()>
where
    B: GraphicsBackend,
    F: FnMut(&Shader, CubeFace, u32),
{
    let mut guard = ctx.save_state();
    let ctx = &mut *guard;
    ctx.clear_input_assembler();

    for mip in 0..target.mip_levels() {
        ctx.set_viewport(Viewport::for_mip(target.size(), mip));
        for face in CubeFace::ALL {
            ctx.set_render_targets(&[target.face_view(face, mip)], None)?;
            ps.set_int("c_face", face.index() as i32);
            stage(ps, face, mip);
            vs.copy_all_buffer_data(ctx)?;
            ps.copy_all_buffer_data(ctx)?;
            ctx.draw_fullscreen(vs, ps)?;
        }
    }
    Ok(())
}

/// Convolve `source` into every mip of `target` along the roughness ladder
pub fn prefilter_cubemap<B: GraphicsBackend>(
    ctx: &mut RenderContext<B>,
    target: &CubeTarget,
    vs: &Shader,
    ps: &Shader,
    source: TextureViewHandle,
    sampler: SamplerHandle,
) -> RendererResult<()> {
    ps.set_shader_resource_view("EnvMap", source);
    ps.set_sampler_state("Sampler", sampler);

    let mips = target.mip_levels();
    let result = render_cube_faces(ctx, target, vs, ps, |ps, _face, mip| {
        ps.set_float("c_roughness", roughness_for_mip(mip, mips));
    });
    ps.unbind_resources();
    result
}

/// Cosine-weighted hemisphere convolution of `source` into mip 0 of `target`
pub fn convolve_irradiance<B: GraphicsBackend>(
    ctx: &mut RenderContext<B>,
    target: &CubeTarget,
    vs: &Shader,
    ps: &Shader,
    source: TextureViewHandle,
    sampler: SamplerHandle,
    phi_step: f32,
    theta_step: f32,
) -> RendererResult<()> {
    ps.set_shader_resource_view("EnvMap", source);
    ps.set_sampler_state("Sampler", sampler);
    ps.set_float("c_phiStep", phi_step);
    ps.set_float("c_thetaStep", theta_step);

    let result = render_cube_faces(ctx, target, vs, ps, |_, _, _| {});
    ps.unbind_resources();
    result
}

/// Direction through a face texel, shared by the cube convolution shaders
macro_rules! cube_direction_wgsl {
    () => {
        r#"
fn cube_direction(face: i32, uv: vec2<f32>) -> vec3<f32> {
    let u = uv.x * 2.0 - 1.0;
    let v = uv.y * 2.0 - 1.0;
    var direction = vec3<f32>(-u, -v, -1.0);
    if face == 0 {
        direction = vec3<f32>(1.0, -v, -u);
    } else if face == 1 {
        direction = vec3<f32>(-1.0, -v, u);
    } else if face == 2 {
        direction = vec3<f32>(u, 1.0, v);
    } else if face == 3 {
        direction = vec3<f32>(u, -1.0, -v);
    } else if face == 4 {
        direction = vec3<f32>(u, -v, 1.0);
    }
    return normalize(direction);
}

struct VertexToPixel {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}
"#
    };
}

/// Diffuse irradiance: integrates the environment over the hemisphere around each texel
pub const IRRADIANCE_PIXEL_SHADER: &str = concat!(
    cube_direction_wgsl!(),
    r#"
const PI: f32 = 3.14159265359;

struct IrradianceConstants {
    c_face: i32,
    c_phiStep: f32,
    c_thetaStep: f32,
}

@group(1) @binding(0) var<uniform> constants: IrradianceConstants;
@group(1) @binding(1) var EnvMap: texture_cube<f32>;
@group(1) @binding(2) var Sampler: sampler;

@fragment
fn fs_main(input: VertexToPixel) -> @location(0) vec4<f32> {
    let normal = cube_direction(constants.c_face, input.uv);
    var up = vec3<f32>(0.0, 1.0, 0.0);
    if abs(normal.y) > 0.999 {
        up = vec3<f32>(0.0, 0.0, 1.0);
    }
    let right = normalize(cross(up, normal));
    up = cross(normal, right);

    let phi_step = max(constants.c_phiStep, 0.001);
    let theta_step = max(constants.c_thetaStep, 0.001);

    var sum = vec3<f32>(0.0);
    var count = 0.0;
    for (var phi = 0.0; phi < 2.0 * PI; phi += phi_step) {
        let sin_phi = sin(phi);
        let cos_phi = cos(phi);
        for (var theta = 0.0; theta < 0.5 * PI; theta += theta_step) {
            let sin_theta = sin(theta);
            let cos_theta = cos(theta);

            let tangent_sample = vec3<f32>(sin_theta * cos_phi, sin_theta * sin_phi, cos_theta);
            let sample_direction = tangent_sample.x * right + tangent_sample.y * up + tangent_sample.z * normal;

            sum += textureSampleLevel(EnvMap, Sampler, sample_direction, 0.0).rgb * cos_theta * sin_theta;
            count += 1.0;
        }
    }

    return vec4<f32>(PI * sum / max(count, 1.0), 1.0);
}
"#
);

/// Specular prefilter: GGX importance sampled convolution for one roughness
pub const PREFILTER_PIXEL_SHADER: &str = concat!(
    cube_direction_wgsl!(),
    r#"
const PI: f32 = 3.14159265359;
const SAMPLE_COUNT: u32 = 512u;

struct PrefilterConstants {
    c_face: i32,
    c_roughness: f32,
}

@group(1) @binding(0) var<uniform> constants: PrefilterConstants;
@group(1) @binding(1) var EnvMap: texture_cube<f32>;
@group(1) @binding(2) var Sampler: sampler;

fn hammersley(i: u32, count: u32) -> vec2<f32> {
    return vec2<f32>(f32(i) / f32(count), f32(reverseBits(i)) * 2.3283064365386963e-10);
}

fn importance_sample_ggx(xi: vec2<f32>, n: vec3<f32>, roughness: f32) -> vec3<f32> {
    let a = roughness * roughness;
    let phi = 2.0 * PI * xi.x;
    let cos_theta = sqrt((1.0 - xi.y) / (1.0 + (a * a - 1.0) * xi.y));
    let sin_theta = sqrt(max(1.0 - cos_theta * cos_theta, 0.0));
    let h = vec3<f32>(sin_theta * cos(phi), sin_theta * sin(phi), cos_theta);

    var up = vec3<f32>(1.0, 0.0, 0.0);
    if abs(n.z) < 0.999 {
        up = vec3<f32>(0.0, 0.0, 1.0);
    }
    let tangent = normalize(cross(up, n));
    let bitangent = cross(n, tangent);
    return normalize(tangent * h.x + bitangent * h.y + n * h.z);
}

@fragment
fn fs_main(input: VertexToPixel) -> @location(0) vec4<f32> {
    let n = cube_direction(constants.c_face, input.uv);
    let v = n;

    var color = vec3<f32>(0.0);
    var weight = 0.0;
    for (var i = 0u; i < SAMPLE_COUNT; i = i + 1u) {
        let h = importance_sample_ggx(hammersley(i, SAMPLE_COUNT), n, constants.c_roughness);
        let l = normalize(2.0 * dot(v, h) * h - v);
        let n_dot_l = dot(n, l);
        if n_dot_l > 0.0 {
            color += textureSampleLevel(EnvMap, Sampler, l, 0.0).rgb * n_dot_l;
            weight += n_dot_l;
        }
    }

    return vec4<f32>(color / max(weight, 0.0001), 1.0);
}
"#
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DummyBackend, RecordedCommand};

    #[test]
    fn test_mip_count() {
        assert_eq!(mip_count(128, 2), 5);
        assert_eq!(mip_count(64, 2), 4);
        assert_eq!(mip_count(4, 2), 1);
        assert_eq!(mip_count(1, 2), 1);
    }

    #[test]
    fn test_roughness_ladder_is_monotonic() {
        let mips = mip_count(256, 2);
        assert_eq!(roughness_for_mip(0, mips), 0.0);
        assert_eq!(roughness_for_mip(mips - 1, mips), 1.0);
        for mip in 1..mips {
            assert!(roughness_for_mip(mip, mips) > roughness_for_mip(mip - 1, mips));
        }
        assert_eq!(roughness_for_mip(0, 1), 0.0);
    }

    fn sample_normals() -> Vec<Vec3> {
        let mut normals: Vec<Vec3> = CubeFace::ALL.iter().map(|face| face.forward()).collect();
        normals.push(Vec3::new(1.0, 1.0, 1.0).normalize());
        normals.push(CubeFace::PositiveZ.direction(0.1, 0.8));
        normals
    }

    #[test]
    fn test_zero_roughness_samples_the_normal() {
        for n in sample_normals() {
            for i in 0..PREFILTER_SAMPLE_COUNT {
                let h = importance_sample_ggx(hammersley(i, PREFILTER_SAMPLE_COUNT), n, 0.0);
                assert!(h.abs_diff_eq(n, 1e-5), "sample {i} around {n}: {h}");
                // Reflecting the view about H returns the view direction itself
                let l = (2.0 * n.dot(h) * h - n).normalize();
                assert!(l.abs_diff_eq(n, 1e-4));
            }
        }
    }

    #[test]
    fn test_rough_samples_spread_over_the_hemisphere() {
        let n = Vec3::Y;
        let samples: Vec<Vec3> = (0..PREFILTER_SAMPLE_COUNT)
            .map(|i| importance_sample_ggx(hammersley(i, PREFILTER_SAMPLE_COUNT), n, 1.0))
            .collect();
        assert!(samples.iter().all(|h| h.dot(n) >= -1e-5 && (h.length() - 1.0).abs() < 1e-4));
        assert!(samples.iter().any(|h| h.dot(n) < 0.5));

        let mean = |roughness: f32| {
            (0..PREFILTER_SAMPLE_COUNT)
                .map(|i| importance_sample_ggx(hammersley(i, PREFILTER_SAMPLE_COUNT), n, roughness).dot(n))
                .sum::<f32>()
                / PREFILTER_SAMPLE_COUNT as f32
        };
        assert!(mean(0.25) > mean(0.5) && mean(0.5) > mean(1.0));
    }

    #[test]
    fn test_hammersley_matches_shader_sequence() {
        assert_eq!(hammersley(0, 4), Vec2::ZERO);
        assert_eq!(hammersley(1, 4), Vec2::new(0.25, 0.5));
        assert_eq!(hammersley(2, 4), Vec2::new(0.5, 0.25));
        assert!(PREFILTER_PIXEL_SHADER.contains(&format!("SAMPLE_COUNT: u32 = {}u;", PREFILTER_SAMPLE_COUNT)));
    }

    #[test]
    fn test_faces_form_a_basis() {
        for face in CubeFace::ALL {
            let forward = face.forward();
            assert!((forward.length() - 1.0).abs() < 1e-5);
            assert!(forward.dot(face.up()).abs() < 1e-5);
            assert_eq!(forward.abs().max_element(), 1.0);
        }
        assert_eq!(CubeFace::PositiveX.forward(), Vec3::X);
        assert_eq!(CubeFace::NegativeZ.forward(), Vec3::NEG_Z);
    }

    #[test]
    fn test_top_of_face_points_up() {
        for face in [CubeFace::PositiveX, CubeFace::NegativeX, CubeFace::PositiveZ, CubeFace::NegativeZ] {
            assert!(face.direction(0.5, 0.0).y > 0.0);
        }
        assert!(CubeFace::PositiveY.direction(0.5, 0.0).z < 0.0);
        assert!(CubeFace::NegativeY.direction(0.5, 0.0).z > 0.0);
    }

    #[test]
    fn test_prefilter_draws_every_face_and_mip() {
        let mut ctx = RenderContext::new(DummyBackend::new(8, 8));
        let vs = Shader::vertex("Fullscreen", crate::shader::library::FULLSCREEN_VERTEX_SHADER).unwrap();
        let ps = Shader::pixel("Prefilter", PREFILTER_PIXEL_SHADER).unwrap();
        let source = CubeTarget::new(&mut ctx, "Source", 32, 1, TextureFormat::Rgba16Float).unwrap();
        let target = CubeTarget::new(&mut ctx, "Target", 32, mip_count(32, 2), TextureFormat::Rgba16Float).unwrap();
        let sampler = ctx.create_sampler(&SamplerDescriptor::default()).unwrap();

        prefilter_cubemap(&mut ctx, &target, &vs, &ps, source.view(), sampler).unwrap();

        let draws = ctx
            .backend()
            .commands()
            .iter()
            .filter(|c| matches!(c, RecordedCommand::Draw { .. }))
            .count();
        assert_eq!(draws, 6 * 3);
        assert_eq!(ps.bound_texture("EnvMap"), None);
        assert!(ctx.state().color_targets.is_empty());
    }
}

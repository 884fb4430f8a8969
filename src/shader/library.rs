//! Built-in shader stages
//!
//! Every pass of the renderer has its WGSL here or beside the code that drives it.
//! [`ShaderLibrary`] reflects the whole set once so the stages can be shared.

use std::sync::Arc;

use super::Shader;
use crate::error::RendererResult;
use crate::ibl::{brdf_lut, cubemap, sky};

/// Full-screen triangle from vertex indices, with a top-left UV origin
pub const FULLSCREEN_VERTEX_SHADER: &str = r#"
struct VertexToPixel {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexToPixel {
    var output: VertexToPixel;

    let uv = vec2<f32>(f32((vertex_index << 1u) & 2u), f32(vertex_index & 2u));
    output.uv = uv;
    output.position = vec4<f32>(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, 0.0, 1.0);

    return output;
}
"#;

/// Standard mesh vertex shader feeding the PBR pixel shader
pub const PBR_VERTEX_SHADER: &str = r#"
struct VsConstants {
    c_worldTransform: mat4x4<f32>,
    c_worldInvTranspose: mat4x4<f32>,
    c_viewMatrix: mat4x4<f32>,
    c_projectionMatrix: mat4x4<f32>,
}

@group(0) @binding(0) var<uniform> constants: VsConstants;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
    @location(3) tangent: vec4<f32>,
}

struct VertexToPixel {
    @builtin(position) position: vec4<f32>,
    @location(0) world_position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) tangent: vec4<f32>,
    @location(3) uv: vec2<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexToPixel {
    var output: VertexToPixel;

    let world_position = constants.c_worldTransform * vec4<f32>(input.position, 1.0);
    output.world_position = world_position.xyz;
    output.position = constants.c_projectionMatrix * constants.c_viewMatrix * world_position;
    output.normal = normalize((constants.c_worldInvTranspose * vec4<f32>(input.normal, 0.0)).xyz);
    output.tangent = vec4<f32>(
        normalize((constants.c_worldTransform * vec4<f32>(input.tangent.xyz, 0.0)).xyz),
        input.tangent.w,
    );
    output.uv = input.uv;

    return output;
}
"#;

/// Cook-Torrance PBR with image-based lighting, writing the four scene targets:
/// direct + specular color, diffuse ambient, packed normal and depth.
/// With `c_foldAmbient` set the diffuse ambient is also added to the color target.
pub const PBR_PIXEL_SHADER: &str = r#"
const PI: f32 = 3.14159265359;
const MAX_LIGHTS: i32 = 32;
const MIN_ROUGHNESS: f32 = 0.0000001;
const F0_NON_METAL: f32 = 0.04;

const LIGHT_TYPE_SPOT: u32 = 2u;

struct Light {
    position: vec3<f32>,
    range: f32,
    direction: vec3<f32>,
    intensity: f32,
    color: vec3<f32>,
    spot_angle: f32,
    kind: u32,
    pad0: u32,
    pad1: u32,
    pad2: u32,
}

struct PsConstants {
    c_directionalLights: array<Light, 32>,
    c_pointLights: array<Light, 32>,
    c_directionalLightCount: i32,
    c_pointLightCount: i32,
    c_time: f32,
    c_roughness: f32,
    c_cameraPosition: vec3<f32>,
    c_colorTint: vec4<f32>,
    c_uvOffset: vec2<f32>,
    c_uvScale: vec2<f32>,
    c_foldAmbient: i32,
}

@group(1) @binding(0) var<uniform> constants: PsConstants;
@group(1) @binding(1) var AlbedoTexture: texture_2d<f32>;
@group(1) @binding(2) var NormalTexture: texture_2d<f32>;
@group(1) @binding(3) var RoughnessTexture: texture_2d<f32>;
@group(1) @binding(4) var MetalnessTexture: texture_2d<f32>;
@group(1) @binding(5) var IrradianceMap: texture_cube<f32>;
@group(1) @binding(6) var ReflectionMap: texture_cube<f32>;
@group(1) @binding(7) var BRDFIntegrationMap: texture_2d<f32>;
@group(1) @binding(8) var BasicSampler: sampler;
@group(1) @binding(9) var ClampSampler: sampler;

struct VertexToPixel {
    @builtin(position) position: vec4<f32>,
    @location(0) world_position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) tangent: vec4<f32>,
    @location(3) uv: vec2<f32>,
}

struct SceneOutput {
    @location(0) color: vec4<f32>,
    @location(1) ambient: vec4<f32>,
    @location(2) normal: vec4<f32>,
    @location(3) depth: vec4<f32>,
}

fn distribution_ggx(n_dot_h: f32, roughness: f32) -> f32 {
    let a = roughness * roughness;
    let a2 = max(a * a, MIN_ROUGHNESS);
    let d = n_dot_h * n_dot_h * (a2 - 1.0) + 1.0;
    return a2 / (PI * d * d);
}

fn geometry_schlick_ggx(n_dot_v: f32, roughness: f32) -> f32 {
    let r = roughness + 1.0;
    let k = (r * r) / 8.0;
    return n_dot_v / (n_dot_v * (1.0 - k) + k);
}

fn fresnel_schlick(cos_theta: f32, f0: vec3<f32>) -> vec3<f32> {
    return f0 + (1.0 - f0) * pow(1.0 - cos_theta, 5.0);
}

fn fresnel_schlick_roughness(cos_theta: f32, f0: vec3<f32>, roughness: f32) -> vec3<f32> {
    return f0 + (max(vec3<f32>(1.0 - roughness), f0) - f0) * pow(1.0 - cos_theta, 5.0);
}

fn attenuate(light: Light, world_position: vec3<f32>) -> f32 {
    let dist = distance(light.position, world_position);
    let falloff = saturate(1.0 - (dist * dist) / (light.range * light.range));
    return falloff * falloff;
}

fn direct_light(
    n: vec3<f32>,
    v: vec3<f32>,
    l: vec3<f32>,
    radiance: vec3<f32>,
    albedo: vec3<f32>,
    roughness: f32,
    metalness: f32,
    f0: vec3<f32>,
) -> vec3<f32> {
    let h = normalize(v + l);
    let n_dot_l = max(dot(n, l), 0.0);
    let n_dot_v = max(dot(n, v), 0.0001);

    let d = distribution_ggx(max(dot(n, h), 0.0), roughness);
    let g = geometry_schlick_ggx(n_dot_v, roughness) * geometry_schlick_ggx(n_dot_l, roughness);
    let f = fresnel_schlick(max(dot(h, v), 0.0), f0);

    let specular = d * g * f / (4.0 * n_dot_v * n_dot_l + 0.0001);
    let kd = (vec3<f32>(1.0) - f) * (1.0 - metalness);
    return (kd * albedo / PI + specular) * radiance * n_dot_l;
}

@fragment
fn fs_main(input: VertexToPixel) -> SceneOutput {
    var output: SceneOutput;

    let uv = input.uv * constants.c_uvScale + constants.c_uvOffset;
    let albedo = pow(textureSample(AlbedoTexture, BasicSampler, uv).rgb, vec3<f32>(2.2))
        * constants.c_colorTint.rgb;
    let roughness = clamp(
        textureSample(RoughnessTexture, BasicSampler, uv).r * constants.c_roughness,
        MIN_ROUGHNESS,
        1.0,
    );
    let metalness = textureSample(MetalnessTexture, BasicSampler, uv).r;

    // Tangent-space normal mapping
    let unpacked = textureSample(NormalTexture, BasicSampler, uv).rgb * 2.0 - 1.0;
    let geometric = normalize(input.normal);
    let tangent = normalize(input.tangent.xyz - geometric * dot(input.tangent.xyz, geometric));
    let bitangent = cross(tangent, geometric) * input.tangent.w;
    let n = normalize(mat3x3<f32>(tangent, bitangent, geometric) * unpacked);

    let v = normalize(constants.c_cameraPosition - input.world_position);
    let f0 = mix(vec3<f32>(F0_NON_METAL), albedo, metalness);

    var color = vec3<f32>(0.0);
    let directional_count = min(constants.c_directionalLightCount, MAX_LIGHTS);
    for (var i = 0; i < directional_count; i = i + 1) {
        let light = constants.c_directionalLights[i];
        let radiance = light.color * light.intensity;
        color += direct_light(n, v, normalize(-light.direction), radiance, albedo, roughness, metalness, f0);
    }
    let point_count = min(constants.c_pointLightCount, MAX_LIGHTS);
    for (var i = 0; i < point_count; i = i + 1) {
        let light = constants.c_pointLights[i];
        var radiance = light.color * light.intensity * attenuate(light, input.world_position);
        let l = normalize(light.position - input.world_position);
        if light.kind == LIGHT_TYPE_SPOT {
            radiance *= pow(max(dot(-l, normalize(light.direction)), 0.0), light.spot_angle);
        }
        color += direct_light(n, v, l, radiance, albedo, roughness, metalness, f0);
    }

    // Image-based lighting
    let n_dot_v = max(dot(n, v), 0.0);
    let f = fresnel_schlick_roughness(n_dot_v, f0, roughness);
    let kd = (vec3<f32>(1.0) - f) * (1.0 - metalness);
    let irradiance = textureSample(IrradianceMap, BasicSampler, n).rgb;

    let max_mip = f32(textureNumLevels(ReflectionMap) - 1u);
    let prefiltered = textureSampleLevel(ReflectionMap, BasicSampler, reflect(-v, n), roughness * max_mip).rgb;
    let brdf = textureSample(BRDFIntegrationMap, ClampSampler, vec2<f32>(n_dot_v, roughness)).rg;
    let specular = prefiltered * (f * brdf.x + brdf.y);

    let ambient = kd * irradiance * albedo;
    if constants.c_foldAmbient != 0 {
        output.color = vec4<f32>(color + specular + ambient, 1.0);
    } else {
        output.color = vec4<f32>(color + specular, 1.0);
    }
    output.ambient = vec4<f32>(ambient, 1.0);
    output.normal = vec4<f32>(n * 0.5 + 0.5, 1.0);
    output.depth = vec4<f32>(input.position.z, 0.0, 0.0, 1.0);

    return output;
}
"#;

/// Every built-in stage, reflected once and shared
#[derive(Debug, Clone)]
pub struct ShaderLibrary {
    pub fullscreen_vs: Arc<Shader>,
    pub pbr_vs: Arc<Shader>,
    pub pbr_ps: Arc<Shader>,
    pub sky_vs: Arc<Shader>,
    pub sky_ps: Arc<Shader>,
    pub irradiance_ps: Arc<Shader>,
    pub prefilter_ps: Arc<Shader>,
    pub brdf_lut_ps: Arc<Shader>,
}

impl ShaderLibrary {
    pub fn load() -> RendererResult<Self> {
        let library = Self {
            fullscreen_vs: Shader::vertex("Fullscreen VS", FULLSCREEN_VERTEX_SHADER)?,
            pbr_vs: Shader::vertex("PBR VS", PBR_VERTEX_SHADER)?,
            pbr_ps: Shader::pixel("PBR PS", PBR_PIXEL_SHADER)?,
            sky_vs: Shader::vertex("Sky VS", sky::SKY_VERTEX_SHADER)?,
            sky_ps: Shader::pixel("Sky PS", sky::SKY_PIXEL_SHADER)?,
            irradiance_ps: Shader::pixel("Irradiance PS", cubemap::IRRADIANCE_PIXEL_SHADER)?,
            prefilter_ps: Shader::pixel("Specular Prefilter PS", cubemap::PREFILTER_PIXEL_SHADER)?,
            brdf_lut_ps: Shader::pixel("BRDF LUT PS", brdf_lut::BRDF_LUT_PIXEL_SHADER)?,
        };
        log::info!("Loaded built-in shader library");
        Ok(library)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::ShaderParameters;

    #[test]
    fn test_library_reflects_every_stage() {
        let library = ShaderLibrary::load().unwrap();
        assert!(library.fullscreen_vs.reflection().blocks.is_empty());
        assert!(library.sky_ps.declares_texture("CubeMap"));
        assert!(library.irradiance_ps.declares_variable("c_phiStep"));
        assert!(library.prefilter_ps.declares_variable("c_roughness"));
    }

    #[test]
    fn test_pbr_pixel_shader_interface() {
        let library = ShaderLibrary::load().unwrap();
        let ps = &library.pbr_ps;
        for name in ["c_directionalLights", "c_pointLights", "c_pointLightCount", "c_cameraPosition", "c_foldAmbient"] {
            assert!(ps.declares_variable(name), "{name}");
        }
        for name in ["IrradianceMap", "ReflectionMap", "BRDFIntegrationMap", "AlbedoTexture"] {
            assert!(ps.declares_texture(name), "{name}");
        }
        let lights = ps.reflection().variables["c_directionalLights"];
        assert_eq!(lights.size, 64 * 32);
        assert!((0..4).all(|location| ps.reflection().writes_location(location)));
    }

    #[test]
    fn test_pbr_vertex_shader_matrices() {
        let library = ShaderLibrary::load().unwrap();
        for name in ["c_worldTransform", "c_worldInvTranspose", "c_viewMatrix", "c_projectionMatrix"] {
            assert!(library.pbr_vs.declares_variable(name), "{name}");
        }
    }
}

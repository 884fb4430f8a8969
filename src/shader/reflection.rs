//! WGSL reflection through naga
//!
//! Extracts the named constants, texture slots and sampler slots of one shader stage,
//! plus the color locations its entry point writes.

use std::collections::{BTreeMap, HashSet};

use naga::{AddressSpace, Binding, Expression, ImageClass, ImageDimension, ScalarKind, TypeInner};

use crate::backend::{ShaderStage, ViewDimension};

/// One member of a uniform block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformVariable {
    pub block: usize,
    pub offset: u32,
    pub size: u32,
}

/// A `var<uniform>` declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformBlock {
    pub name: String,
    pub binding: u32,
    pub size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureSlot {
    pub binding: u32,
    pub dimension: ViewDimension,
    /// False when the texture is only read with `textureLoad`
    pub filterable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerSlot {
    pub binding: u32,
}

/// Reflected interface of a single-stage WGSL module
#[derive(Debug, Clone, Default)]
pub struct ShaderReflection {
    pub blocks: Vec<UniformBlock>,
    pub variables: BTreeMap<String, UniformVariable>,
    pub textures: BTreeMap<String, TextureSlot>,
    pub samplers: BTreeMap<String, SamplerSlot>,
    pub color_outputs: Vec<u32>,
}

impl ShaderReflection {
    pub fn writes_location(&self, location: u32) -> bool {
        self.color_outputs.contains(&location)
    }
}

/// Parse and validate `source`, then reflect the resources of `group` used by the
/// entry point named `entry_point`.
pub fn reflect(
    source: &str,
    stage: ShaderStage,
    entry_point: &str,
    group: u32,
) -> Result<ShaderReflection, String> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| format!("WGSL parse error: {e}"))?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator
        .validate(&module)
        .map_err(|e| format!("Validation error: {e}"))?;

    let naga_stage = match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    };
    let entry = module
        .entry_points
        .iter()
        .find(|ep| ep.name == entry_point && ep.stage == naga_stage)
        .ok_or_else(|| format!("Entry point '{}' not found for stage {:?}", entry_point, stage))?;

    let sampled = sampled_images(&module);
    let mut reflection = ShaderReflection::default();

    for (handle, var) in module.global_variables.iter() {
        let Some(binding) = var.binding.as_ref() else {
            continue;
        };
        let name = var.name.clone().unwrap_or_default();
        if binding.group != group {
            return Err(format!(
                "'{}' is bound to group {} but {:?} resources live in group {}",
                name, binding.group, stage, group
            ));
        }

        match (var.space, &module.types[var.ty].inner) {
            (AddressSpace::Uniform, TypeInner::Struct { members, span }) => {
                let block = reflection.blocks.len();
                for member in members {
                    let Some(member_name) = member.name.clone() else {
                        continue;
                    };
                    let size = module.types[member.ty].inner.size(module.to_ctx());
                    reflection.variables.insert(
                        member_name,
                        UniformVariable {
                            block,
                            offset: member.offset,
                            size,
                        },
                    );
                }
                reflection.blocks.push(UniformBlock {
                    name,
                    binding: binding.binding,
                    size: *span,
                });
            }
            (AddressSpace::Uniform, inner) => {
                // A bare uniform is addressable by its own name
                let block = reflection.blocks.len();
                let size = inner.size(module.to_ctx());
                reflection.variables.insert(
                    name.clone(),
                    UniformVariable {
                        block,
                        offset: 0,
                        size,
                    },
                );
                reflection.blocks.push(UniformBlock {
                    name,
                    binding: binding.binding,
                    size,
                });
            }
            (AddressSpace::Handle, TypeInner::Image { dim, arrayed, class }) => {
                let dimension = match (dim, arrayed) {
                    (ImageDimension::D2, false) => ViewDimension::D2,
                    (ImageDimension::Cube, false) => ViewDimension::Cube,
                    _ => return Err(format!("'{}': unsupported texture dimension {:?}", name, dim)),
                };
                match class {
                    ImageClass::Sampled {
                        kind: ScalarKind::Float,
                        multi: false,
                    } => {}
                    _ => return Err(format!("'{}': only float textures are supported", name)),
                }
                reflection.textures.insert(
                    name,
                    TextureSlot {
                        binding: binding.binding,
                        dimension,
                        filterable: sampled.contains(&handle),
                    },
                );
            }
            (AddressSpace::Handle, TypeInner::Sampler { comparison }) => {
                if *comparison {
                    return Err(format!("'{}': comparison samplers are not supported", name));
                }
                reflection.samplers.insert(
                    name,
                    SamplerSlot {
                        binding: binding.binding,
                    },
                );
            }
            (space, _) => {
                return Err(format!("'{}': unsupported resource in {:?} space", name, space));
            }
        }
    }

    if stage == ShaderStage::Fragment {
        reflection.color_outputs = color_outputs(&module, &entry.function);
    }

    Ok(reflection)
}

/// Globals used as the image operand of a filtered sample anywhere in the module
fn sampled_images(module: &naga::Module) -> HashSet<naga::Handle<naga::GlobalVariable>> {
    let mut sampled = HashSet::new();
    let functions = module
        .functions
        .iter()
        .map(|(_, f)| f)
        .chain(module.entry_points.iter().map(|ep| &ep.function));
    for function in functions {
        for (_, expression) in function.expressions.iter() {
            if let Expression::ImageSample { image, .. } = expression {
                if let Expression::GlobalVariable(global) = function.expressions[*image] {
                    sampled.insert(global);
                }
            }
        }
    }
    sampled
}

fn color_outputs(module: &naga::Module, function: &naga::Function) -> Vec<u32> {
    let Some(result) = function.result.as_ref() else {
        return Vec::new();
    };
    if let Some(Binding::Location { location, .. }) = result.binding {
        return vec![location];
    }
    match &module.types[result.ty].inner {
        TypeInner::Struct { members, .. } => members
            .iter()
            .filter_map(|member| match member.binding {
                Some(Binding::Location { location, .. }) => Some(location),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIXEL: &str = r#"
struct PsConstants {
    c_colorTint: vec4<f32>,
    c_roughness: f32,
    c_uvScale: vec2<f32>,
}

@group(1) @binding(0) var<uniform> constants: PsConstants;
@group(1) @binding(1) var AlbedoTexture: texture_2d<f32>;
@group(1) @binding(2) var Depths: texture_2d<f32>;
@group(1) @binding(3) var BasicSampler: sampler;

struct Output {
    @location(0) color: vec4<f32>,
    @location(2) normal: vec4<f32>,
}

@fragment
fn fs_main(@builtin(position) position: vec4<f32>) -> Output {
    var out: Output;
    let depth = textureLoad(Depths, vec2<i32>(position.xy), 0).r;
    out.color = textureSample(AlbedoTexture, BasicSampler, position.xy) * constants.c_colorTint * depth;
    out.normal = vec4<f32>(constants.c_roughness);
    return out;
}
"#;

    #[test]
    fn test_reflects_uniform_members() {
        let reflection = reflect(PIXEL, ShaderStage::Fragment, "fs_main", 1).unwrap();
        assert_eq!(reflection.blocks.len(), 1);
        assert_eq!(reflection.blocks[0].size, 32);

        let tint = reflection.variables["c_colorTint"];
        assert_eq!((tint.offset, tint.size), (0, 16));
        let roughness = reflection.variables["c_roughness"];
        assert_eq!((roughness.offset, roughness.size), (16, 4));
        let scale = reflection.variables["c_uvScale"];
        assert_eq!((scale.offset, scale.size), (24, 8));
    }

    #[test]
    fn test_only_sampled_textures_are_filterable() {
        let reflection = reflect(PIXEL, ShaderStage::Fragment, "fs_main", 1).unwrap();
        assert!(reflection.textures["AlbedoTexture"].filterable);
        assert!(!reflection.textures["Depths"].filterable);
        assert_eq!(reflection.samplers["BasicSampler"].binding, 3);
    }

    #[test]
    fn test_color_outputs_from_struct() {
        let reflection = reflect(PIXEL, ShaderStage::Fragment, "fs_main", 1).unwrap();
        assert!(reflection.writes_location(0));
        assert!(!reflection.writes_location(1));
        assert!(reflection.writes_location(2));
    }

    #[test]
    fn test_wrong_group_rejected() {
        let err = reflect(PIXEL, ShaderStage::Fragment, "fs_main", 0).unwrap_err();
        assert!(err.contains("group"));
    }

    #[test]
    fn test_missing_entry_point_rejected() {
        assert!(reflect(PIXEL, ShaderStage::Vertex, "vs_main", 1).is_err());
    }
}

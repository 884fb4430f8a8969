//! Image-based lighting: the sky, its derived irradiance and specular cubes, the BRDF
//! lookup table and local reflection probes
//!
//! All of it is precomputed on the GPU with full-screen draws into cube faces.

pub mod brdf_lut;
pub mod cubemap;
pub mod reflection_probe;
pub mod sky;

pub use brdf_lut::BrdfLut;
pub use cubemap::{
    hammersley, importance_sample_ggx, mip_count, prefilter_cubemap, roughness_for_mip, CubeFace,
    CubeTarget, PREFILTER_SAMPLE_COUNT,
};
pub use reflection_probe::ReflectionProbe;
pub use sky::Sky;

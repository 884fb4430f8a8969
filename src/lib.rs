//! IBL Renderer - a multi-render-target renderer with SSAO and GPU image-based lighting
//!
//! The renderer draws physically based entities into four scene targets (color,
//! ambient, normals, depth), then runs an SSAO → blur → combine chain into the back
//! buffer. The sky cubemap is convolved on the GPU into an irradiance map and a
//! mip-chained specular map, and a BRDF integration table is baked once.
//!
//! # Backends
//! - **wgpu**: window surface rendering
//! - **Dummy**: records every command without a GPU, used by the tests
//!
//! # Layout
//! - [`context`]: bound state, scoped state guards and pipeline caching over a backend
//! - [`shader`]: WGSL stages reflected with naga and addressed by name
//! - [`scene`]: transforms, cameras, entities and lights
//! - [`ibl`]: sky, irradiance and specular precompute, BRDF LUT, reflection probes
//! - [`renderer`]: render targets, the frame state machine and the post-process chain

pub mod backend;
pub mod context;
pub mod debug_ui;
pub mod error;
pub mod ibl;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod shader;
pub mod window;

pub use backend::dummy::DummyBackend;
pub use backend::wgpu_backend::WgpuBackend;
pub use context::RenderContext;
pub use debug_ui::DebugOverlay;
pub use error::{RendererError, RendererResult};
pub use ibl::{BrdfLut, ReflectionProbe, Sky};
pub use renderer::{FramePhase, RenderTargetSlot, Renderer};
pub use window::Window;

/// Settings for the occlusion passes
#[derive(Debug, Clone)]
pub struct SsaoConfig {
    /// Kernel samples per pixel, at most 64
    pub sample_count: u32,
    /// View-space sample radius
    pub radius: f32,
    /// Side of the tiled rotation texture
    pub noise_size: u32,
    /// When false the combine pass ignores occlusion
    pub enabled: bool,
    /// When true the combine pass outputs the blurred occlusion alone
    pub output_only: bool,
}

impl Default for SsaoConfig {
    fn default() -> Self {
        Self {
            sample_count: 64,
            radius: 1.0,
            noise_size: 4,
            enabled: true,
            output_only: false,
        }
    }
}

/// Sizes and step lengths for the sky precompute
#[derive(Debug, Clone)]
pub struct IblConfig {
    /// Irradiance face size is the sky face size divided by this
    pub irradiance_divisor: u32,
    /// Specular face size is the sky face size divided by this
    pub specular_divisor: u32,
    /// Smallest mips dropped from the specular chain
    pub ignored_small_mips: u32,
    /// Azimuth step of the irradiance integral, radians
    pub phi_step: f32,
    /// Elevation step of the irradiance integral, radians
    pub theta_step: f32,
    pub brdf_lut_size: u32,
}

impl Default for IblConfig {
    fn default() -> Self {
        Self {
            irradiance_divisor: 16,
            specular_divisor: 8,
            ignored_small_mips: 2,
            phi_step: 0.05,
            theta_step: 0.05,
            brdf_lut_size: 512,
        }
    }
}

/// Cube sizes for reflection probes
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub reflection_size: u32,
    pub capture_size: u32,
    pub ignored_small_mips: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            reflection_size: 128,
            capture_size: 512,
            ignored_small_mips: 2,
        }
    }
}

/// Configuration for the renderer and its precompute passes
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Window title
    pub title: String,
    /// Initial window width
    pub width: u32,
    /// Initial window height
    pub height: u32,
    /// Enable vsync
    pub vsync: bool,
    /// Back buffer clear color
    pub clear_color: [f32; 4],
    pub ssao: SsaoConfig,
    pub ibl: IblConfig,
    pub probe: ProbeConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            title: "IBL Renderer".to_string(),
            width: 1280,
            height: 720,
            vsync: true,
            clear_color: [0.4, 0.6, 0.75, 1.0],
            ssao: SsaoConfig::default(),
            ibl: IblConfig::default(),
            probe: ProbeConfig::default(),
        }
    }
}

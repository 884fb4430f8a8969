//! GPU resources owned by the scene
//!
//! Meshes, textures and the materials that bind them to shaders.

mod material;
mod mesh;
mod texture;

pub use material::*;
pub use mesh::*;
pub use texture::*;

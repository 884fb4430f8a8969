//! Backend abstraction layer
//!
//! Provides the handle-based [`GraphicsBackend`] trait, the wgpu implementation used
//! on a window surface and a recording dummy used by tests.

pub mod dummy;
pub mod traits;
pub mod types;
pub mod wgpu_backend;

pub use dummy::{DummyBackend, RecordedCommand, RecordedPass};
pub use traits::*;
pub use types::*;
pub use wgpu_backend::WgpuBackend;

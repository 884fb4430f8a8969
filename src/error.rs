//! Renderer error type

use thiserror::Error;

use crate::backend::BackendError;

/// Errors raised by the renderer and its resources
#[derive(Error, Debug)]
pub enum RendererError {
    #[error("{operation} called out of order (frame phase: {phase})")]
    FrameOrder {
        operation: &'static str,
        phase: &'static str,
    },
    #[error("{operation} violates the resize protocol")]
    ResizeOrder { operation: &'static str },
    #[error("Failed to create {operation}: {detail}")]
    ResourceCreation {
        operation: &'static str,
        detail: String,
    },
    #[error("Shader '{name}': {message}")]
    Shader { name: String, message: String },
    #[error("Texture {texture} is bound as a render target and read by the same draw")]
    TargetHazard { texture: String },
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Texture error: {0}")]
    Texture(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type RendererResult<T> = Result<T, RendererError>;

impl RendererError {
    pub(crate) fn creation(operation: &'static str, detail: impl Into<String>) -> Self {
        Self::ResourceCreation {
            operation,
            detail: detail.into(),
        }
    }
}

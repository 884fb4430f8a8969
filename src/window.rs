//! Window management using winit

use std::sync::Arc;
use winit::{
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::EventLoop,
    window::{Window as WinitWindow, WindowBuilder},
};

use crate::error::{RendererError, RendererResult};
use crate::RendererConfig;

/// Wrapper around winit window with additional state
pub struct Window {
    window: Arc<WinitWindow>,
    width: u32,
    height: u32,
    resized: bool,
    close_requested: bool,
}

impl Window {
    /// Create a window sized and titled from the config
    pub fn new(event_loop: &EventLoop<()>, config: &RendererConfig) -> RendererResult<Self> {
        let window = WindowBuilder::new()
            .with_title(config.title.as_str())
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .build(event_loop)
            .map_err(|e| RendererError::creation("window", e.to_string()))?;
        let size = window.inner_size();

        Ok(Self {
            window: Arc::new(window),
            width: size.width,
            height: size.height,
            resized: false,
            close_requested: false,
        })
    }

    pub fn window(&self) -> &WinitWindow {
        &self.window
    }

    /// Shared handle for surface creation
    pub fn window_arc(&self) -> Arc<WinitWindow> {
        Arc::clone(&self.window)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Minimized windows report a zero extent and are not rendered
    pub fn is_minimized(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether a resize arrived since the last call, clearing the flag
    pub fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }

    pub fn should_close(&self) -> bool {
        self.close_requested
    }

    pub fn handle_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::Resized(size) => {
                if (size.width, size.height) != (self.width, self.height) {
                    self.width = size.width;
                    self.height = size.height;
                    self.resized = true;
                }
            }
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            _ => {}
        }
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }
}

//! egui debug overlay for the wgpu backend
//!
//! Shows the renderer's targets as thumbnails, frame timing, the camera and the
//! SSAO toggles. Target views are registered with egui-wgpu as native textures and
//! must be registered again after every resize.

use egui::ViewportId;
use egui_wgpu::ScreenDescriptor;
use winit::event::WindowEvent;
use winit::window::Window;

use crate::backend::{TextureViewHandle, WgpuBackend};
use crate::scene::Camera;
use crate::SsaoConfig;

/// Per-frame numbers shown by the overlay
#[derive(Debug, Clone, Copy, Default)]
pub struct OverlayStats {
    /// Seconds spent on the previous frame
    pub frame_time: f32,
    pub width: u32,
    pub height: u32,
}

pub struct DebugOverlay {
    ctx: egui::Context,
    winit_state: egui_winit::State,
    renderer: egui_wgpu::Renderer,
    paint_jobs: Vec<egui::ClippedPrimitive>,
    textures_delta: egui::TexturesDelta,
    targets: Vec<(&'static str, egui::TextureId)>,
}

impl DebugOverlay {
    pub fn new(backend: &WgpuBackend, window: &Window) -> Self {
        let ctx = egui::Context::default();
        let winit_state = egui_winit::State::new(
            ctx.clone(),
            ViewportId::ROOT,
            window,
            Some(window.scale_factor() as f32),
            None,
        );
        let renderer = egui_wgpu::Renderer::new(
            backend.device(),
            backend.wgpu_surface_format(),
            None,
            1,
        );

        Self {
            ctx,
            winit_state,
            renderer,
            paint_jobs: Vec::new(),
            textures_delta: egui::TexturesDelta::default(),
            targets: Vec::new(),
        }
    }

    /// Replace the displayed targets, freeing the previous registrations
    pub fn register_targets(
        &mut self,
        backend: &WgpuBackend,
        targets: &[(&'static str, TextureViewHandle)],
    ) {
        for (_, id) in self.targets.drain(..) {
            self.renderer.free_texture(&id);
        }
        for (name, view) in targets {
            let Some(wgpu_view) = backend.wgpu_texture_view(*view) else {
                log::warn!("Debug overlay: no view for {}", name);
                continue;
            };
            let id = self
                .renderer
                .register_native_texture(backend.device(), wgpu_view, wgpu::FilterMode::Linear);
            self.targets.push((name, id));
        }
        log::debug!("Debug overlay showing {} targets", self.targets.len());
    }

    /// Drop every registration, before the views are released for a resize
    pub fn release_targets(&mut self) {
        for (_, id) in self.targets.drain(..) {
            self.renderer.free_texture(&id);
        }
    }

    /// Feed a window event to egui. Returns true when egui consumed it.
    pub fn on_window_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        self.winit_state.on_window_event(window, event).consumed
    }

    pub fn wants_pointer_input(&self) -> bool {
        self.ctx.wants_pointer_input()
    }

    pub fn wants_keyboard_input(&self) -> bool {
        self.ctx.wants_keyboard_input()
    }

    /// Build the overlay for this frame
    pub fn run(
        &mut self,
        window: &Window,
        stats: &OverlayStats,
        camera: &mut Camera,
        ssao: &mut SsaoConfig,
    ) {
        let raw_input = self.winit_state.take_egui_input(window);
        self.ctx.begin_frame(raw_input);

        self.stats_window(stats, camera, ssao);
        self.targets_window(stats);

        let full_output = self.ctx.end_frame();
        self.winit_state
            .handle_platform_output(window, full_output.platform_output);
        self.paint_jobs = self
            .ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);
        self.textures_delta = full_output.textures_delta;
    }

    fn stats_window(&self, stats: &OverlayStats, camera: &mut Camera, ssao: &mut SsaoConfig) {
        egui::Window::new("Stats").show(&self.ctx, |ui| {
            let fps = if stats.frame_time > 0.0 {
                1.0 / stats.frame_time
            } else {
                0.0
            };
            ui.label(format!("Frame time: {:.2} ms ({:.0} fps)", stats.frame_time * 1000.0, fps));
            ui.label(format!("Resolution: {}x{}", stats.width, stats.height));

            ui.separator();
            let position = camera.position();
            ui.label(format!(
                "Camera: ({:.2}, {:.2}, {:.2})",
                position.x, position.y, position.z
            ));
            let mut movement = camera.movement_speed();
            if ui
                .add(egui::Slider::new(&mut movement, 0.1..=20.0).text("Movement speed"))
                .changed()
            {
                camera.set_movement_speed(movement);
            }
            let mut look = camera.look_speed();
            if ui
                .add(egui::Slider::new(&mut look, 0.1..=10.0).text("Look speed"))
                .changed()
            {
                camera.set_look_speed(look);
            }

            ui.separator();
            ui.checkbox(&mut ssao.enabled, "SSAO");
            ui.checkbox(&mut ssao.output_only, "SSAO output only");
            ui.add(egui::Slider::new(&mut ssao.radius, 0.05..=5.0).text("SSAO radius"));
        });
    }

    fn targets_window(&self, stats: &OverlayStats) {
        if self.targets.is_empty() {
            return;
        }
        let scale = self.ctx.pixels_per_point();
        let size = egui::vec2(
            stats.width as f32 / 4.0 / scale,
            stats.height as f32 / 4.0 / scale,
        );
        egui::Window::new("Render Targets")
            .default_open(false)
            .show(&self.ctx, |ui| {
                for (name, id) in &self.targets {
                    ui.label(*name);
                    ui.add(egui::Image::new(egui::load::SizedTexture::new(*id, size)));
                }
            });
    }

    /// Draw the overlay on top of the back buffer
    pub fn render(&mut self, backend: &mut WgpuBackend, width: u32, height: u32) {
        let screen_descriptor = ScreenDescriptor {
            size_in_pixels: [width, height],
            pixels_per_point: self.ctx.pixels_per_point(),
        };

        {
            let (device, queue, encoder) = backend.device_queue_encoder();
            for (id, image_delta) in &self.textures_delta.set {
                self.renderer.update_texture(device, queue, *id, image_delta);
            }
            self.renderer
                .update_buffers(device, queue, encoder, &self.paint_jobs, &screen_descriptor);
        }

        backend.render_egui(&self.renderer, &self.paint_jobs, &screen_descriptor);

        for id in &self.textures_delta.free {
            self.renderer.free_texture(id);
        }
        self.textures_delta = egui::TexturesDelta::default();
    }
}

//! The draw cycle. Owns the GPU context, the point pipeline, the frame buffers
//! and the camera, and is driven from outside through `on_resize`/`on_draw`.

pub mod context;
pub mod frame_buffers;
pub mod pipelines;
pub mod targets;

use self::{
    context::GfxContext,
    frame_buffers::{FrameBufferManager, WgpuBackend},
    pipelines::points::PointPipeline,
    targets::DepthTarget,
};
use crate::{
    camera::{CameraConfig, CameraController, GestureEvent},
    data::{FrameUniforms, VertexRecord},
};
use crossbeam_channel::Receiver;
use std::sync::Arc;
use winit::window::Window;

/// Fatal construction-time failures. The caller falls back to a non-3D mode.
#[derive(Debug, thiserror::Error)]
pub enum RenderInitError {
    #[error("failed to create a window surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    #[error("no GPU adapter compatible with the window surface")]
    NoAdapter,
    #[error("failed to acquire a GPU device and queue: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("window surface reports no supported formats")]
    NoSurfaceFormat,
    #[error("point pipeline failed validation: {0}")]
    Pipeline(String),
}

/// Viewer lifecycle. A live [`Renderer`] is only ever `Ready` or `Drawing`;
/// the other two describe the slot before and after a failed construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    Uninitialized,
    Ready,
    Drawing,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoPoints,
    /// Timed out, outdated or lost; expected while minimised or backgrounded.
    SurfaceUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    Presented { points: u32 },
    Skipped(SkipReason),
}

/// Decides, before a surface texture is acquired, whether a frame is skipped.
/// Without points the frame still runs when there is an overlay to show.
pub fn skip_reason(point_count: u32, has_overlay: bool) -> Option<SkipReason> {
    (point_count == 0 && !has_overlay).then_some(SkipReason::NoPoints)
}

/// Tessellated egui output to paint over the points.
pub struct OverlayFrame {
    pub shapes: Vec<egui::ClippedPrimitive>,
    pub textures_delta: egui::TexturesDelta,
    pub pixels_per_point: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct RenderConfig {
    pub point_size_px: f32,
    pub camera: CameraConfig,
    pub clear_color: wgpu::Color,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            point_size_px: 4.0,
            camera: CameraConfig::default(),
            clear_color: wgpu::Color { r: 0.06, g: 0.07, b: 0.09, a: 1.0 },
        }
    }
}

pub struct Renderer {
    pub gfx: GfxContext,
    depth: DepthTarget,
    points: PointPipeline,
    frame_bind: wgpu::BindGroup,
    frame_buffers: Arc<FrameBufferManager<WgpuBackend>>,
    camera: CameraController,
    gestures: Receiver<GestureEvent>,
    egui_renderer: egui_wgpu::Renderer,
    config: RenderConfig,
    aspect: f32,
    phase: RenderPhase,
}

impl Renderer {
    pub async fn new(
        window: Arc<Window>,
        config: RenderConfig,
        gestures: Receiver<GestureEvent>,
    ) -> Result<Self, RenderInitError> {
        let gfx = GfxContext::new(window).await?;
        let size = gfx.size;
        let depth = DepthTarget::new(&gfx.device, size);

        // Shader compilation errors surface through the error scope, not a panic.
        gfx.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let points = PointPipeline::new(&gfx.device, gfx.config.format, depth.format);
        if let Some(err) = gfx.device.pop_error_scope().await {
            return Err(RenderInitError::Pipeline(err.to_string()));
        }

        let frame_buffers = Arc::new(FrameBufferManager::new(WgpuBackend::new(
            gfx.device.clone(),
            gfx.queue.clone(),
        )));
        let frame_bind = points.create_frame_bind_group(&gfx.device, frame_buffers.uniform_buffer());

        let egui_renderer = egui_wgpu::Renderer::new(&gfx.device, gfx.config.format, None, 1);

        Ok(Self {
            aspect: size.width.max(1) as f32 / size.height.max(1) as f32,
            gfx,
            depth,
            points,
            frame_bind,
            frame_buffers,
            camera: CameraController::new(config.camera),
            gestures,
            egui_renderer,
            config,
            phase: RenderPhase::Ready,
        })
    }

    pub fn phase(&self) -> RenderPhase {
        self.phase
    }

    /// Shared handle for replacing the point set, from any thread.
    pub fn frame_buffers(&self) -> &Arc<FrameBufferManager<WgpuBackend>> {
        &self.frame_buffers
    }

    pub fn camera(&self) -> &CameraController {
        &self.camera
    }

    /// Replaces the points and re-frames the camera around them.
    pub fn show_points(&mut self, records: &[VertexRecord]) {
        self.frame_buffers.replace_vertices(records);
        if let Some(b) = scanply::bounds(records) {
            self.camera.frame(b.center(), b.radius());
        }
    }

    pub fn reset_camera(&mut self) {
        self.camera.reset();
    }

    /// Takes effect on the next draw. Zero sizes (minimised windows) are ignored.
    pub fn on_resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        let size = winit::dpi::PhysicalSize::new(width, height);
        self.aspect = width as f32 / height as f32;
        self.gfx.resize(size);
        self.depth.resize(&self.gfx.device, size);
    }

    /// Paints one frame. Transient conditions skip the frame; only
    /// out-of-memory is reported as an error.
    pub fn on_draw(
        &mut self,
        overlay: Option<OverlayFrame>,
    ) -> Result<DrawOutcome, wgpu::SurfaceError> {
        self.camera.drain(&self.gestures);

        // Texture uploads are applied even for skipped frames; egui sends each only once.
        if let Some(o) = &overlay {
            for (id, delta) in &o.textures_delta.set {
                self.egui_renderer
                    .update_texture(&self.gfx.device, &self.gfx.queue, *id, delta);
            }
        }

        let outcome = self.paint(overlay.as_ref());

        if let Some(o) = &overlay {
            for id in &o.textures_delta.free {
                self.egui_renderer.free_texture(id);
            }
        }
        self.phase = RenderPhase::Ready;
        outcome
    }

    fn paint(&mut self, overlay: Option<&OverlayFrame>) -> Result<DrawOutcome, wgpu::SurfaceError> {
        if let Some(reason) = skip_reason(self.frame_buffers.current_point_count(), overlay.is_some()) {
            return Ok(DrawOutcome::Skipped(reason));
        }

        let frame = match self.gfx.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Timeout) => {
                return Ok(DrawOutcome::Skipped(SkipReason::SurfaceUnavailable));
            }
            Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                self.gfx.reconfigure();
                return Ok(DrawOutcome::Skipped(SkipReason::SurfaceUnavailable));
            }
            Err(e) => return Err(e),
        };
        self.phase = RenderPhase::Drawing;

        let swap_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let viewport_size = [self.gfx.config.width as f32, self.gfx.config.height as f32];
        let uniforms = FrameUniforms::new(
            self.camera.compute_matrix(self.aspect),
            viewport_size,
            self.config.point_size_px,
        );
        self.frame_buffers.write_uniforms(&uniforms);

        let frame_buffers = self.frame_buffers.clone();
        let points = frame_buffers.with_current(|current| {
            let mut encoder = self
                .gfx
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Frame Encoder"),
                });

            {
                let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Scan Points Pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &swap_view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(self.config.clear_color),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                        view: &self.depth.view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(1.0),
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }),
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });

                if let Some((vtx, count)) = current {
                    self.points.draw(&mut pass, &self.frame_bind, vtx, count);
                }
            }

            if let Some(overlay) = overlay {
                self.paint_overlay(&mut encoder, &swap_view, overlay);
            }

            // Submitted under the lock: a concurrent replacement lands after this frame.
            self.gfx.queue.submit(std::iter::once(encoder.finish()));
            current.map_or(0, |(_, count)| count)
        });

        frame.present();
        Ok(DrawOutcome::Presented { points })
    }

    fn paint_overlay(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        swap_view: &wgpu::TextureView,
        overlay: &OverlayFrame,
    ) {
        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [self.gfx.config.width, self.gfx.config.height],
            pixels_per_point: overlay.pixels_per_point,
        };

        self.egui_renderer.update_buffers(
            &self.gfx.device,
            &self.gfx.queue,
            encoder,
            &overlay.shapes,
            &screen_descriptor,
        );

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("EGUI Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: swap_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        self.egui_renderer
            .render(&mut render_pass, &overlay.shapes, &screen_descriptor);
    }
}

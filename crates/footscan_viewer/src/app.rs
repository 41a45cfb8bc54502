use crate::{
    camera::GestureInput,
    data::VertexRecord,
    net::TransferEvent,
    renderer::{DrawOutcome, OverlayFrame, RenderConfig, RenderInitError, Renderer},
    ui::{self, Hud, TransferStatus},
};
use crossbeam_channel::Receiver;
use std::sync::Arc;
use winit::{
    event::{ElementState, WindowEvent},
    keyboard::{KeyCode, PhysicalKey},
    window::Window,
};

pub struct App {
    pub renderer: Renderer,
    pub hud: Hud,
    gestures: GestureInput,
    transfers: Receiver<TransferEvent>,
    egui_ctx: egui::Context,
    egui_state: egui_winit::State,
}

impl App {
    pub async fn new(
        window: Arc<Window>,
        config: RenderConfig,
        transfers: Receiver<TransferEvent>,
    ) -> Result<Self, RenderInitError> {
        let (gesture_tx, gesture_rx) = crossbeam_channel::unbounded();
        let renderer = Renderer::new(window.clone(), config, gesture_rx).await?;

        let egui_ctx = egui::Context::default();
        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui_ctx.viewport_id(),
            &*window,
            None,
            None,
        );

        Ok(Self {
            renderer,
            hud: Hud::default(),
            gestures: GestureInput::new(gesture_tx),
            transfers,
            egui_ctx,
            egui_state,
        })
    }

    pub fn show_points(&mut self, records: &[VertexRecord]) {
        self.renderer.show_points(records);
        log::info!("Displaying {} points", records.len());
    }

    /// Returns true when the event was consumed by the overlay or the camera.
    pub fn handle_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        let response = self.egui_state.on_window_event(window, event);
        if response.consumed {
            return true;
        }

        self.gestures.handle_event(event);

        match event {
            WindowEvent::Resized(size) => {
                self.renderer.on_resize(size.width, size.height);
            }
            WindowEvent::KeyboardInput { event, .. }
                if event.state == ElementState::Pressed
                    && event.physical_key == PhysicalKey::Code(KeyCode::KeyR) =>
            {
                self.renderer.reset_camera();
                return true;
            }
            _ => {}
        }

        false
    }

    /// Applies finished transfers. Called once per frame before drawing.
    pub fn poll_transfers(&mut self) {
        while let Ok(event) = self.transfers.try_recv() {
            match event {
                TransferEvent::Completed { result, points } => {
                    self.show_points(&points);
                    self.hud.decode_error = None;
                    self.hud.status = TransferStatus::Done(result);
                }
                TransferEvent::Undecodable { result, error } => {
                    self.hud.decode_error = Some(format!(
                        "{} could not be decoded: {}",
                        result.saved_file_path.display(),
                        error
                    ));
                    self.hud.status = TransferStatus::Done(result);
                }
                TransferEvent::Failed(e) => {
                    self.hud.status = TransferStatus::Failed(format!("{e:#}"));
                }
            }
        }
    }

    pub fn render(&mut self, window: &Window) -> Result<DrawOutcome, wgpu::SurfaceError> {
        self.poll_transfers();
        self.hud.rendered_points = self.renderer.frame_buffers().current_point_count();

        let egui_input = self.egui_state.take_egui_input(window);
        self.egui_ctx.begin_frame(egui_input);
        ui::draw_hud(&self.egui_ctx, &self.hud);
        let egui_output = self.egui_ctx.end_frame();
        self.egui_state
            .handle_platform_output(window, egui_output.platform_output);

        let pixels_per_point = self.egui_ctx.pixels_per_point();
        let shapes = self.egui_ctx.tessellate(egui_output.shapes, pixels_per_point);

        self.renderer.on_draw(Some(OverlayFrame {
            shapes,
            textures_delta: egui_output.textures_delta,
            pixels_per_point,
        }))
    }
}

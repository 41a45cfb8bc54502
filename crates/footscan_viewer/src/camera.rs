use crossbeam_channel::{Receiver, Sender};
use glam::{Mat4, Vec3};
use std::f32::consts::FRAC_PI_2;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};

/// Discrete camera input. Produced by whatever input source is attached and
/// consumed by [`CameraController`] on the render thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureEvent {
    /// Drag delta in pixels.
    Pan { dx: f32, dy: f32 },
    /// Pinch/scroll factor; > 1 zooms in.
    Zoom { scale: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraConfig {
    /// Radians of rotation per pixel of drag.
    pub sensitivity: f32,
    /// Maximum |pitch|; must stay below π/2 so the view never flips.
    pub pitch_limit: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub initial_distance: f32,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        // Scene units are metres; a foot is about a quarter of one.
        Self {
            sensitivity: 0.01,
            pitch_limit: FRAC_PI_2 - 0.01,
            min_distance: 0.05,
            max_distance: 10.0,
            initial_distance: 0.6,
            fov_y: 60f32.to_radians(),
            near: 0.01,
            far: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    pub yaw: f32,
    pub pitch: f32,
    pub distance: f32,
}

/// Orbit camera: the scene turns about its focus point while the eye sits back
/// along -Z at `distance`.
#[derive(Debug, Clone)]
pub struct CameraController {
    config: CameraConfig,
    state: CameraState,
    /// Point of the scene placed at the rotation pivot.
    focus: Vec3,
}

impl CameraController {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            state: CameraState {
                yaw: 0.0,
                pitch: 0.0,
                distance: config.initial_distance.clamp(config.min_distance, config.max_distance),
            },
            config,
            focus: Vec3::ZERO,
        }
    }

    pub fn state(&self) -> CameraState {
        self.state
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn apply_pan(&mut self, dx: f32, dy: f32) {
        self.state.yaw += dx * self.config.sensitivity;
        self.state.pitch = (self.state.pitch + dy * self.config.sensitivity)
            .clamp(-self.config.pitch_limit, self.config.pitch_limit);
    }

    pub fn apply_zoom(&mut self, scale: f32) {
        if !scale.is_finite() || scale <= 0.0 {
            return;
        }
        self.state.distance = (self.state.distance / scale)
            .clamp(self.config.min_distance, self.config.max_distance);
    }

    pub fn apply(&mut self, event: GestureEvent) {
        match event {
            GestureEvent::Pan { dx, dy } => self.apply_pan(dx, dy),
            GestureEvent::Zoom { scale } => self.apply_zoom(scale),
        }
    }

    /// Applies every queued gesture; returns how many there were.
    pub fn drain(&mut self, gestures: &Receiver<GestureEvent>) -> usize {
        let mut n = 0;
        for event in gestures.try_iter() {
            self.apply(event);
            n += 1;
        }
        n
    }

    /// Back to the initial orientation and distance; the focus is kept.
    pub fn reset(&mut self) {
        let focus = self.focus;
        *self = Self::new(self.config);
        self.focus = focus;
    }

    /// Re-initialises the camera around a new point set.
    pub fn frame(&mut self, center: [f32; 3], radius: f32) {
        self.reset();
        self.focus = Vec3::from(center);
        // Fit the bounding sphere into the vertical field of view, with margin.
        let fit = radius / (self.config.fov_y * 0.5).sin() * 1.2;
        if fit.is_finite() && fit > 0.0 {
            self.state.distance = fit.clamp(self.config.min_distance, self.config.max_distance);
        }
    }

    /// projection × translate(0, 0, -distance) × rotate_y(yaw) × rotate_x(pitch),
    /// applied after moving the focus to the origin.
    pub fn compute_matrix(&self, aspect_ratio: f32) -> Mat4 {
        let aspect = if aspect_ratio.is_finite() && aspect_ratio > 0.0 {
            aspect_ratio
        } else {
            1.0
        };
        let proj = Mat4::perspective_rh(self.config.fov_y, aspect, self.config.near, self.config.far);

        proj * Mat4::from_translation(Vec3::new(0.0, 0.0, -self.state.distance))
            * Mat4::from_rotation_y(self.state.yaw)
            * Mat4::from_rotation_x(self.state.pitch)
            * Mat4::from_translation(-self.focus)
    }
}

/// Turns winit pointer events into [`GestureEvent`]s.
pub struct GestureInput {
    tx: Sender<GestureEvent>,
    mouse_down: bool,
    last_mouse: Option<(f64, f64)>,
}

impl GestureInput {
    pub fn new(tx: Sender<GestureEvent>) -> Self {
        Self {
            tx,
            mouse_down: false,
            last_mouse: None,
        }
    }

    pub fn handle_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::MouseInput { button, state, .. } => {
                if *button == MouseButton::Left {
                    self.mouse_down = *state == ElementState::Pressed;
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                let xy = (position.x, position.y);
                if let (Some(last), true) = (self.last_mouse, self.mouse_down) {
                    self.send(GestureEvent::Pan {
                        dx: (xy.0 - last.0) as f32,
                        dy: (xy.1 - last.1) as f32,
                    });
                }
                self.last_mouse = Some(xy);
            }
            WindowEvent::CursorLeft { .. } => {
                self.last_mouse = None;
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 120.0,
                };
                // Scroll up = zoom in.
                self.send(GestureEvent::Zoom {
                    scale: 1.1f32.powf(lines),
                });
            }
            WindowEvent::TouchpadMagnify { delta, .. } => {
                self.send(GestureEvent::Zoom {
                    scale: 1.0 + *delta as f32,
                });
            }
            _ => {}
        }
    }

    fn send(&self, event: GestureEvent) {
        if self.tx.send(event).is_err() {
            log::debug!("Gesture dropped: camera is gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> CameraController {
        CameraController::new(CameraConfig {
            initial_distance: 0.6,
            min_distance: 0.2,
            ..CameraConfig::default()
        })
    }

    #[test]
    fn pitch_is_clamped_below_vertical() {
        let mut cam = controller();
        let limit = cam.config().pitch_limit;
        cam.apply_pan(0.0, 10_000.0);
        assert_eq!(cam.state().pitch, limit);
        assert!(cam.state().pitch < FRAC_PI_2);

        cam.apply_pan(0.0, -50_000.0);
        assert_eq!(cam.state().pitch, -limit);
    }

    #[test]
    fn pan_scales_by_sensitivity() {
        let mut cam = controller();
        cam.apply_pan(10.0, -5.0);
        let s = cam.config().sensitivity;
        assert_eq!(cam.state().yaw, 10.0 * s);
        assert_eq!(cam.state().pitch, -5.0 * s);
    }

    #[test]
    fn pinch_halves_distance_then_clamps() {
        let mut cam = controller();
        cam.apply_zoom(2.0);
        assert!((cam.state().distance - 0.3).abs() < 1e-6);
        cam.apply_zoom(2.0);
        // 0.15 would be below the configured minimum.
        assert_eq!(cam.state().distance, 0.2);

        cam.apply_zoom(0.0);
        cam.apply_zoom(f32::NAN);
        assert_eq!(cam.state().distance, 0.2);

        cam.apply_zoom(1e-6);
        assert_eq!(cam.state().distance, cam.config().max_distance);
    }

    #[test]
    fn matrix_is_a_pure_function_of_state() {
        let mut cam = controller();
        cam.apply_pan(37.0, 12.0);
        let a = cam.compute_matrix(16.0 / 9.0);
        let b = cam.compute_matrix(16.0 / 9.0);
        assert_eq!(a.to_cols_array(), b.to_cols_array());
        assert_eq!(cam.compute_matrix(0.0), cam.compute_matrix(1.0));
    }

    #[test]
    fn scene_rotates_about_its_own_origin() {
        let mut cam = controller();
        let before = cam.compute_matrix(1.0).project_point3(Vec3::ZERO);
        cam.apply_pan(123.0, 45.0);
        let after = cam.compute_matrix(1.0).project_point3(Vec3::ZERO);
        // The pivot stays centred on screen at the same depth.
        assert!(after.abs_diff_eq(before, 1e-6));
        assert!(before.x.abs() < 1e-6 && before.y.abs() < 1e-6);

        // An off-pivot point does move.
        let p = Vec3::new(0.1, 0.0, 0.0);
        let moved = cam.compute_matrix(1.0).project_point3(p);
        cam.reset();
        assert!(!moved.abs_diff_eq(cam.compute_matrix(1.0).project_point3(p), 1e-4));
    }

    #[test]
    fn framing_centres_the_focus() {
        let mut cam = controller();
        cam.frame([1.0, 2.0, 3.0], 0.15);
        let c = cam.compute_matrix(1.0).project_point3(Vec3::new(1.0, 2.0, 3.0));
        assert!(c.x.abs() < 1e-5 && c.y.abs() < 1e-5);
        let d = cam.state().distance;
        assert!(d >= cam.config().min_distance && d <= cam.config().max_distance);
    }

    #[test]
    fn queued_gestures_are_applied_in_order() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut cam = controller();
        tx.send(GestureEvent::Zoom { scale: 2.0 }).unwrap();
        tx.send(GestureEvent::Pan { dx: 1.0, dy: 0.0 }).unwrap();
        assert_eq!(cam.drain(&rx), 2);
        assert!((cam.state().distance - 0.3).abs() < 1e-6);
        assert_eq!(cam.state().yaw, cam.config().sensitivity);
        assert_eq!(cam.drain(&rx), 0);
    }
}

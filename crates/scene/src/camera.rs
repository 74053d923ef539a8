//! First-person camera.
//!
//! Orientation is stored as pitch and yaw in degrees; roll is always zero.
//! At zero pitch and yaw the camera looks down -Z with +Y up.

use glam::{Mat4, Vec3};
use vbparts_platform::{InputState, KeyCode};

/// Movement speed in units per second.
pub const CAMERA_SPEED: f32 = 5.0;
/// Mouse-look sensitivity in degrees per pixel.
pub const CAMERA_ANGULAR_SPEED: f32 = 45.0 * 0.01;

/// Perspective projection parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            fov_y: 45.0_f32.to_radians(),
            aspect: 1024.0 / 768.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

impl Projection {
    /// Projection matrix with Vulkan Y-flip.
    pub fn matrix(&self) -> Mat4 {
        let mut proj = Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far);
        // Flip Y for Vulkan coordinate system
        proj.y_axis.y *= -1.0;
        proj
    }
}

#[derive(Clone, Debug)]
pub struct Camera {
    /// Camera position in world space
    pub position: Vec3,
    pitch: f32,
    yaw: f32,
    pub projection: Projection,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 2.0),
            pitch: 0.0,
            yaw: 0.0,
            projection: Projection::default(),
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets orientation in degrees. Both angles wrap at 360.
    pub fn set_euler(&mut self, pitch: f32, yaw: f32) {
        self.pitch = pitch % 360.0;
        self.yaw = yaw % 360.0;
    }

    #[inline]
    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    #[inline]
    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.projection.aspect = aspect;
    }

    pub fn forward(&self) -> Vec3 {
        let (sin_p, cos_p) = self.pitch.to_radians().sin_cos();
        let (sin_y, cos_y) = self.yaw.to_radians().sin_cos();
        Vec3::new(sin_y * cos_p, sin_p, -cos_p * cos_y).normalize()
    }

    pub fn up(&self) -> Vec3 {
        let (sin_p, cos_p) = self.pitch.to_radians().sin_cos();
        let (sin_y, cos_y) = self.yaw.to_radians().sin_cos();
        Vec3::new(-sin_y * sin_p, cos_p, sin_p * cos_y).normalize()
    }

    pub fn right(&self) -> Vec3 {
        self.forward().cross(self.up()).normalize()
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.forward(), self.up())
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection.matrix()
    }
}

/// WASD fly controller with toggleable mouse-look.
///
/// W/S move along the view direction, A/D strafe, Q/E move along the
/// camera's up vector. Space toggles FPS mode, in which cursor motion
/// turns the camera.
#[derive(Clone, Debug)]
pub struct FpsController {
    pub speed: f32,
    pub angular_speed: f32,
    fps_mode: bool,
}

impl Default for FpsController {
    fn default() -> Self {
        Self {
            speed: CAMERA_SPEED,
            angular_speed: CAMERA_ANGULAR_SPEED,
            fps_mode: false,
        }
    }
}

impl FpsController {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn fps_mode(&self) -> bool {
        self.fps_mode
    }

    /// Applies this frame's input to `camera`.
    ///
    /// Returns `Some(enabled)` when FPS mode was toggled, so the caller can
    /// capture or release the cursor.
    pub fn update(&mut self, camera: &mut Camera, input: &InputState, dt: f32) -> Option<bool> {
        let step = dt * self.speed;
        let axes = [
            (KeyCode::KeyW, camera.forward()),
            (KeyCode::KeyS, -camera.forward()),
            (KeyCode::KeyD, camera.right()),
            (KeyCode::KeyA, -camera.right()),
            (KeyCode::KeyE, camera.up()),
            (KeyCode::KeyQ, -camera.up()),
        ];
        for (key, direction) in axes {
            if input.is_key_down(key) {
                camera.position += direction * step;
            }
        }

        let toggled = input.is_key_just_pressed(KeyCode::Space).then(|| {
            self.fps_mode = !self.fps_mode;
            self.fps_mode
        });

        if self.fps_mode && toggled.is_none() {
            let (dx, dy) = input.cursor_delta();
            camera.set_euler(
                camera.pitch() - dy * self.angular_speed,
                camera.yaw() + dx * self.angular_speed,
            );
        }

        toggled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn test_default_orientation() {
        let camera = Camera::new();
        assert_eq!(camera.position, Vec3::new(0.0, 0.0, 2.0));
        assert!(approx(camera.forward(), Vec3::NEG_Z));
        assert!(approx(camera.up(), Vec3::Y));
        assert!(approx(camera.right(), Vec3::X));
    }

    #[test]
    fn test_yaw_turns_right() {
        let mut camera = Camera::new();
        camera.set_euler(0.0, 90.0);
        assert!(approx(camera.forward(), Vec3::X));
        assert!(approx(camera.right(), Vec3::Z));
    }

    #[test]
    fn test_euler_wraps() {
        let mut camera = Camera::new();
        camera.set_euler(370.0, -450.0);
        assert!((camera.pitch() - 10.0).abs() < 1e-4);
        assert!((camera.yaw() + 90.0).abs() < 1e-4);
    }

    #[test]
    fn test_projection_flips_y() {
        let proj = Projection::default().matrix();
        assert!(proj.y_axis.y < 0.0);
    }

    #[test]
    fn test_move_forward() {
        let mut camera = Camera::new();
        let mut controller = FpsController::new();
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyW);

        assert_eq!(controller.update(&mut camera, &input, 0.5), None);
        assert!(approx(camera.position, Vec3::new(0.0, 0.0, -0.5)));
    }

    #[test]
    fn test_mouse_look_only_in_fps_mode() {
        let mut camera = Camera::new();
        let mut controller = FpsController::new();
        let mut input = InputState::new();

        input.on_mouse_motion(10.0, 0.0);
        controller.update(&mut camera, &input, 0.016);
        assert_eq!(camera.yaw(), 0.0);
        input.end_frame();

        input.on_key_pressed(KeyCode::Space);
        assert_eq!(controller.update(&mut camera, &input, 0.016), Some(true));
        input.end_frame();

        input.on_mouse_motion(10.0, 20.0);
        controller.update(&mut camera, &input, 0.016);
        assert!((camera.yaw() - 4.5).abs() < 1e-4);
        assert!((camera.pitch() + 9.0).abs() < 1e-4);
    }
}

//! Free-flying camera: the streamer only ever sees its world position and
//! view-projection matrix.

use glam::{Mat4, Vec3};

use crate::constants::{
    CAMERA_BASE_SPEED, CAMERA_FAR, CAMERA_FOV_Y, CAMERA_NEAR, CAMERA_SPRINT_SPEED,
    MOUSE_SENSITIVITY,
};
use crate::player::input::InputState;

pub struct Camera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
}

impl Camera {
    pub fn new(spawn: Vec3) -> Self {
        Camera {
            position: spawn,
            yaw: -std::f32::consts::FRAC_PI_2,
            pitch: -0.3,
        }
    }

    pub fn forward(&self) -> Vec3 {
        Vec3::new(self.yaw.cos(), 0.0, self.yaw.sin()).normalize()
    }

    pub fn right(&self) -> Vec3 {
        Vec3::new(-self.yaw.sin(), 0.0, self.yaw.cos()).normalize()
    }

    pub fn look_direction(&self) -> Vec3 {
        Vec3::new(
            self.yaw.cos() * self.pitch.cos(),
            self.pitch.sin(),
            self.yaw.sin() * self.pitch.cos(),
        )
        .normalize()
    }

    pub fn handle_mouse(&mut self, dx: f32, dy: f32) {
        self.yaw += dx * MOUSE_SENSITIVITY;
        self.pitch = (self.pitch - dy * MOUSE_SENSITIVITY).clamp(-1.54, 1.54);
    }

    pub fn update(&mut self, input: &InputState, dt: f32) {
        let speed = if input.sprint {
            CAMERA_SPRINT_SPEED
        } else {
            CAMERA_BASE_SPEED
        };
        let mut wish = Vec3::ZERO;
        if input.forward {
            wish += self.forward();
        }
        if input.backward {
            wish -= self.forward();
        }
        if input.right {
            wish += self.right();
        }
        if input.left {
            wish -= self.right();
        }
        if input.up {
            wish += Vec3::Y;
        }
        if input.down {
            wish -= Vec3::Y;
        }
        if wish != Vec3::ZERO {
            self.position += wish.normalize() * speed * dt;
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.look_direction(), Vec3::Y)
    }

    /// wgpu-convention ([0, 1] depth) view-projection matrix.
    pub fn view_proj(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(CAMERA_FOV_Y, aspect, CAMERA_NEAR, CAMERA_FAR) * self.view_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn look_direction_is_unit_length() {
        let mut cam = Camera::new(Vec3::ZERO);
        cam.yaw = 1.2;
        cam.pitch = -0.7;
        assert!((cam.look_direction().length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn pitch_is_clamped() {
        let mut cam = Camera::new(Vec3::ZERO);
        cam.handle_mouse(0.0, -100000.0);
        assert!(cam.pitch <= 1.54);
        cam.handle_mouse(0.0, 100000.0);
        assert!(cam.pitch >= -1.54);
    }
}

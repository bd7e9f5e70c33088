//! Frustum plane extraction and the CPU mirror of the cull test.
//!
//! The GPU cull kernel applies the same positive-vertex test; this mirror
//! backs the unit tests and the streamer's debug statistics.

use glam::{Mat4, Vec3, Vec4};

#[derive(Clone, Copy, Debug)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Aabb { min, max }
    }

    /// Positive-vertex test: for each plane pick the corner most aligned
    /// with the plane normal; if that corner is behind the plane the box is
    /// fully outside.
    pub fn is_visible(&self, frustum_planes: &[Vec4; 6]) -> bool {
        for plane in frustum_planes {
            let p = Vec3::new(
                if plane.x > 0.0 { self.max.x } else { self.min.x },
                if plane.y > 0.0 { self.max.y } else { self.min.y },
                if plane.z > 0.0 { self.max.z } else { self.min.z },
            );
            if plane.x * p.x + plane.y * p.y + plane.z * p.z + plane.w < 0.0 {
                return false;
            }
        }
        true
    }
}

/// Gribb-Hartmann extraction from a column-major view-projection matrix,
/// with wgpu's [0, 1] depth range for the near plane. Planes are normalized
/// so distances are in world units. Recomputed every frame, never updated
/// incrementally.
pub fn extract_frustum_planes(view_proj: &Mat4) -> [Vec4; 6] {
    let m = view_proj.to_cols_array_2d();
    let mut planes = [
        // Left
        Vec4::new(
            m[0][3] + m[0][0],
            m[1][3] + m[1][0],
            m[2][3] + m[2][0],
            m[3][3] + m[3][0],
        ),
        // Right
        Vec4::new(
            m[0][3] - m[0][0],
            m[1][3] - m[1][0],
            m[2][3] - m[2][0],
            m[3][3] - m[3][0],
        ),
        // Bottom
        Vec4::new(
            m[0][3] + m[0][1],
            m[1][3] + m[1][1],
            m[2][3] + m[2][1],
            m[3][3] + m[3][1],
        ),
        // Top
        Vec4::new(
            m[0][3] - m[0][1],
            m[1][3] - m[1][1],
            m[2][3] - m[2][1],
            m[3][3] - m[3][1],
        ),
        // Near (wgpu depth is [0, 1])
        Vec4::new(m[0][2], m[1][2], m[2][2], m[3][2]),
        // Far
        Vec4::new(
            m[0][3] - m[0][2],
            m[1][3] - m[1][2],
            m[2][3] - m[2][2],
            m[3][3] - m[3][2],
        ),
    ];

    for plane in &mut planes {
        let length = (plane.x * plane.x + plane.y * plane.y + plane.z * plane.z).sqrt();
        *plane /= length;
    }

    planes
}

pub fn planes_to_array(planes: &[Vec4; 6]) -> [[f32; 4]; 6] {
    [
        planes[0].to_array(),
        planes[1].to_array(),
        planes[2].to_array(),
        planes[3].to_array(),
        planes[4].to_array(),
        planes[5].to_array(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn look_down_z() -> [Vec4; 6] {
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0), Vec3::Y);
        extract_frustum_planes(&(proj * view))
    }

    #[test]
    fn box_ahead_is_visible() {
        let planes = look_down_z();
        let aabb = Aabb::new(Vec3::new(-1.0, -1.0, -11.0), Vec3::new(1.0, 1.0, -9.0));
        assert!(aabb.is_visible(&planes));
    }

    #[test]
    fn box_behind_camera_is_culled() {
        let planes = look_down_z();
        let aabb = Aabb::new(Vec3::new(-1.0, -1.0, 9.0), Vec3::new(1.0, 1.0, 11.0));
        assert!(!aabb.is_visible(&planes));
    }

    #[test]
    fn box_far_to_the_side_is_culled() {
        let planes = look_down_z();
        let aabb = Aabb::new(Vec3::new(500.0, -1.0, -11.0), Vec3::new(502.0, 1.0, -9.0));
        assert!(!aabb.is_visible(&planes));
    }

    #[test]
    fn box_straddling_a_plane_is_kept() {
        let planes = look_down_z();
        // Straddles the near plane; conservatively visible.
        let aabb = Aabb::new(Vec3::new(-0.5, -0.5, -1.0), Vec3::new(0.5, 0.5, 1.0));
        assert!(aabb.is_visible(&planes));
    }

    #[test]
    fn planes_are_normalized() {
        for plane in look_down_z() {
            let n = (plane.x * plane.x + plane.y * plane.y + plane.z * plane.z).sqrt();
            assert!((n - 1.0).abs() < 1e-5);
        }
    }
}

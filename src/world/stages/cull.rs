//! Cull stage: per-meshlet frustum culling with atomic compaction.
//!
//! One thread per meshlet derives the meshlet AABB from its index and the
//! chunk origin, applies the positive-vertex test against the frame's six
//! planes, and appends survivors (draw command + meshlet index) through an
//! atomically incremented counter. The CPU only ever reads the results
//! through the async readback pool; rendering consumes them directly on the
//! GPU in the same frame.

use glam::Vec4;

use crate::constants::MESHLETS_PER_CHUNK;
use crate::core::chunk::Chunk;
use crate::core::uniforms::CullUniforms;
use crate::render::context::GpuContext;
use crate::render::frustum::planes_to_array;
use crate::render::kernels::KernelLibrary;
use crate::world::binds::ChunkBinds;

pub struct CullStage {
    /// Frame-shared culling uniforms (frustum planes + meshlet count).
    pub uniforms: wgpu::Buffer,
}

impl CullStage {
    pub fn new(device: &wgpu::Device) -> Self {
        CullStage {
            uniforms: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Cull Uniforms"),
                size: std::mem::size_of::<CullUniforms>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
        }
    }

    /// Upload this frame's frustum planes. Once per frame, before any
    /// per-chunk record call.
    pub fn begin_frame(&self, ctx: &GpuContext, planes: &[Vec4; 6]) {
        ctx.queue.write_buffer(
            &self.uniforms,
            0,
            bytemuck::bytes_of(&CullUniforms {
                frustum_planes: planes_to_array(planes),
                meshlet_count: MESHLETS_PER_CHUNK,
                _pad: [0; 3],
            }),
        );
    }

    /// Record the cull dispatch for one chunk: zero the compacted outputs,
    /// then test all meshlets.
    pub fn record(
        &self,
        kernels: &KernelLibrary,
        encoder: &mut wgpu::CommandEncoder,
        chunk: &Chunk,
        binds: &ChunkBinds,
    ) {
        // Zeroed commands draw nothing, so stale survivors can never ghost.
        encoder.clear_buffer(&chunk.buffers.visible_commands, 0, None);
        encoder.clear_buffer(&chunk.buffers.visible_count, 0, None);

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Cull Pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&kernels.cull);
        pass.set_bind_group(0, &binds.cull, &[]);
        pass.dispatch_workgroups(MESHLETS_PER_CHUNK.div_ceil(64), 1, 1);
    }
}

#[cfg(test)]
mod tests {
    //! CPU reference of the kernel's compaction, pinning the index-range
    //! guarantees the renderer relies on.

    use glam::{Mat4, Vec3};

    use crate::constants::{MESHLET_SIZE, MESHLET_VERTEX_CAPACITY, MESHLETS_PER_AXIS};
    use crate::core::uniforms::DrawCommand;
    use crate::render::frustum::{Aabb, extract_frustum_planes};

    use super::*;

    fn meshlet_aabb(origin: Vec3, mi: u32) -> Aabb {
        let mpa = MESHLETS_PER_AXIS;
        let m = Vec3::new(
            (mi % mpa) as f32,
            ((mi / mpa) % mpa) as f32,
            (mi / (mpa * mpa)) as f32,
        );
        let min = origin + m * MESHLET_SIZE as f32;
        Aabb::new(min, min + Vec3::splat(MESHLET_SIZE as f32))
    }

    fn compact(
        origin: Vec3,
        commands: &[DrawCommand],
        occupancy: &[u32],
        planes: &[glam::Vec4; 6],
    ) -> Vec<(u32, DrawCommand)> {
        let mut out = Vec::new();
        for (mi, cmd) in commands.iter().enumerate() {
            if cmd.vertex_count == 0 || occupancy[mi] == 0 {
                continue;
            }
            if meshlet_aabb(origin, mi as u32).is_visible(planes) {
                out.push((mi as u32, *cmd));
            }
        }
        out
    }

    fn test_commands() -> (Vec<DrawCommand>, Vec<u32>) {
        let mut commands = Vec::new();
        let mut occupancy = Vec::new();
        for mi in 0..MESHLETS_PER_CHUNK {
            let filled = mi % 3 != 0;
            commands.push(DrawCommand {
                vertex_count: if filled { 3 * (mi % 40 + 1) } else { 0 },
                instance_count: 1,
                first_vertex: mi * MESHLET_VERTEX_CAPACITY,
                first_instance: 0,
            });
            occupancy.push(if filled { mi % 7 + 1 } else { 0 });
        }
        (commands, occupancy)
    }

    #[test]
    fn survivors_stay_in_range() {
        let (commands, occupancy) = test_commands();
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 200.0);
        let view = Mat4::look_at_rh(Vec3::new(16.0, 16.0, 60.0), Vec3::splat(16.0), Vec3::Y);
        let planes = extract_frustum_planes(&(proj * view));

        let visible = compact(Vec3::ZERO, &commands, &occupancy, &planes);
        assert!(!visible.is_empty());
        for (mi, cmd) in &visible {
            // No compacted index escapes the chunk's meshlet range, and no
            // command addresses vertices past its meshlet's slot.
            assert!(*mi < MESHLETS_PER_CHUNK);
            assert!(cmd.vertex_count <= MESHLET_VERTEX_CAPACITY);
            assert_eq!(cmd.first_vertex, mi * MESHLET_VERTEX_CAPACITY);
            assert!(
                cmd.first_vertex + cmd.vertex_count
                    <= MESHLETS_PER_CHUNK * MESHLET_VERTEX_CAPACITY
            );
        }
    }

    #[test]
    fn empty_meshlets_never_survive() {
        let (commands, occupancy) = test_commands();
        // A frustum containing the whole chunk.
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 500.0);
        let view = Mat4::look_at_rh(Vec3::new(16.0, 16.0, 120.0), Vec3::splat(16.0), Vec3::Y);
        let planes = extract_frustum_planes(&(proj * view));

        let visible = compact(Vec3::ZERO, &commands, &occupancy, &planes);
        for (mi, _) in &visible {
            assert_ne!(mi % 3, 0, "meshlet {mi} has no geometry but survived");
        }
        // Everything with geometry is inside this frustum.
        let filled = (0..MESHLETS_PER_CHUNK).filter(|mi| mi % 3 != 0).count();
        assert_eq!(visible.len(), filled);
    }

    #[test]
    fn chunk_behind_camera_is_fully_culled() {
        let (commands, occupancy) = test_commands();
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 200.0);
        let view = Mat4::look_at_rh(Vec3::new(16.0, 16.0, 60.0), Vec3::splat(16.0), Vec3::Y);
        let planes = extract_frustum_planes(&(proj * view));

        // A chunk far behind the camera.
        let visible = compact(Vec3::new(0.0, 0.0, 500.0), &commands, &occupancy, &planes);
        assert!(visible.is_empty());
    }
}

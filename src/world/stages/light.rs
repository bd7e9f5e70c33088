//! Light stage: iterative flood-fill propagation through the chunk's
//! density grid, double-buffered.
//!
//! State machine per chunk: Stable -> (edit or neighbor edit) ->
//! Invalidated -> (N propagation iterations) -> Stable. The renderer may
//! read the stable slot in any state; it simply sees stale light until
//! propagation completes. A dispatch reads the stable slot and writes the
//! other, then the roles swap; the two are never the same buffer.

use wgpu::util::DeviceExt;

use crate::constants::CHUNK_SIZE;
use crate::core::chunk::Chunk;
use crate::core::uniforms::LightParams;
use crate::render::kernels::KernelLibrary;
use crate::world::binds::ChunkBinds;

pub struct LightStage {
    /// Shared propagation parameters, uploaded once.
    pub params: wgpu::Buffer,
}

/// Per-step attenuation applied to the neighbor maximum; light fades to
/// nothing over roughly one chunk of open space.
const ATTENUATION: f32 = 0.82;

impl LightStage {
    pub fn new(device: &wgpu::Device) -> Self {
        LightStage {
            params: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Light Params"),
                contents: bytemuck::bytes_of(&LightParams {
                    attenuation: ATTENUATION,
                    _pad: [0.0; 3],
                }),
                usage: wgpu::BufferUsages::UNIFORM,
            }),
        }
    }

    /// Record `iterations` propagation steps for `chunk` into the shared
    /// encoder, swapping the buffer roles after each.
    pub fn record_propagation(
        &self,
        kernels: &KernelLibrary,
        encoder: &mut wgpu::CommandEncoder,
        chunk: &mut Chunk,
        binds: &ChunkBinds,
        iterations: u32,
    ) {
        let groups = CHUNK_SIZE.div_ceil(4);
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Light Pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&kernels.light);
        for _ in 0..iterations {
            pass.set_bind_group(0, &binds.light[chunk.light_rotation.stable()], &[]);
            pass.dispatch_workgroups(groups, groups, groups);
            chunk.light_rotation.swap();
        }
    }
}

#[cfg(test)]
mod tests {
    //! CPU reference model of the propagation rule, used to pin down the
    //! kernel's convergence behavior.

    use super::ATTENUATION;

    const N: usize = 8;

    fn idx(x: usize, y: usize, z: usize) -> usize {
        (z * N + y) * N + x
    }

    /// One flood step: solid cells hold zero; empty cells take the max of
    /// the sky seed (top boundary) and the attenuated 6-neighbor maximum.
    fn step(solid: &[bool], src: &[f32]) -> Vec<f32> {
        let mut dst = vec![0.0f32; N * N * N];
        for z in 0..N {
            for y in 0..N {
                for x in 0..N {
                    let i = idx(x, y, z);
                    if solid[i] {
                        continue;
                    }
                    let mut best = if y == N - 1 { 1.0f32 } else { 0.0 };
                    let mut consider = |xi: isize, yi: isize, zi: isize| {
                        if xi < 0 || yi < 0 || zi < 0 {
                            return;
                        }
                        let (xi, yi, zi) = (xi as usize, yi as usize, zi as usize);
                        if xi >= N || yi >= N || zi >= N {
                            return;
                        }
                        best = best.max(src[idx(xi, yi, zi)] * ATTENUATION);
                    };
                    let (xi, yi, zi) = (x as isize, y as isize, z as isize);
                    consider(xi + 1, yi, zi);
                    consider(xi - 1, yi, zi);
                    consider(xi, yi + 1, zi);
                    consider(xi, yi - 1, zi);
                    consider(xi, yi, zi + 1);
                    consider(xi, yi, zi - 1);
                    dst[i] = best;
                }
            }
        }
        dst
    }

    #[test]
    fn propagation_is_idempotent_after_convergence() {
        // A slab of solid cells in the middle with a gap.
        let mut solid = vec![false; N * N * N];
        for z in 0..N {
            for x in 0..N {
                if !(x == 3 && z == 3) {
                    solid[idx(x, 4, z)] = true;
                }
            }
        }
        let mut light = vec![0.0f32; N * N * N];
        for _ in 0..3 * N {
            light = step(&solid, &light);
        }
        let converged = light.clone();
        let once_more = step(&solid, &light);
        assert_eq!(converged, once_more);
    }

    #[test]
    fn light_reaches_under_the_gap() {
        let mut solid = vec![false; N * N * N];
        for z in 0..N {
            for x in 0..N {
                if !(x == 3 && z == 3) {
                    solid[idx(x, 4, z)] = true;
                }
            }
        }
        let mut light = vec![0.0f32; N * N * N];
        for _ in 0..3 * N {
            light = step(&solid, &light);
        }
        // Open sky above the slab is fully lit.
        assert!(light[idx(0, 7, 0)] >= 1.0 - 1e-6);
        // The cell right under the gap is lit but attenuated.
        let under_gap = light[idx(3, 3, 3)];
        assert!(under_gap > 0.0 && under_gap < 1.0);
        // A far corner below the slab is darker than the gap column.
        assert!(light[idx(0, 0, 0)] < under_gap);
        // Solid cells stay dark.
        assert_eq!(light[idx(1, 4, 1)], 0.0);
    }
}

//! Noise stage: fills a chunk's density/color field from the procedural
//! terrain function on the GPU.

use crate::constants::SAMPLE_GRID;
use crate::core::chunk::Chunk;
use crate::core::uniforms::NoiseParams;
use crate::render::context::GpuContext;
use crate::render::kernels::KernelLibrary;
use crate::world::binds::ChunkBinds;

pub struct NoiseStage {
    pub seed: u32,
    pub frequency: f32,
    pub floor_height: f32,
}

impl NoiseStage {
    pub fn new(seed: u32) -> Self {
        NoiseStage {
            seed,
            frequency: 0.035,
            floor_height: -8.0,
        }
    }

    /// Record a full-field fill for `chunk` into the shared encoder.
    pub fn record(
        &self,
        ctx: &GpuContext,
        kernels: &KernelLibrary,
        encoder: &mut wgpu::CommandEncoder,
        chunk: &Chunk,
        binds: &ChunkBinds,
    ) {
        ctx.queue.write_buffer(
            &chunk.buffers.noise_params,
            0,
            bytemuck::bytes_of(&NoiseParams {
                offset: chunk.origin().to_array(),
                seed: self.seed,
                frequency: self.frequency,
                floor_height: self.floor_height,
                _pad: [0.0; 2],
            }),
        );

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Noise Pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&kernels.noise);
        pass.set_bind_group(0, &binds.noise, &[]);
        let groups = SAMPLE_GRID.div_ceil(4);
        pass.dispatch_workgroups(groups, groups, groups);
    }
}

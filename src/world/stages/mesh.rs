//! Mesh stage: marching-cubes surface extraction, full-chunk or restricted
//! to an edited cell region.
//!
//! Two kernel entries run back to back in the shared encoder: `reset` zeroes
//! the vertex counts and occupancy of every meshlet intersecting the region
//! and re-stamps the fixed `first_vertex` of its draw command; `extract`
//! then rebuilds those cells. Cells are independent and unordered; a meshlet
//! that fills its vertex capacity silently drops further triangles.

use crate::constants::MESHLET_SIZE;
use crate::core::bounds::CellRange;
use crate::core::chunk::Chunk;
use crate::core::uniforms::MeshRegion;
use crate::render::context::GpuContext;
use crate::render::kernels::KernelLibrary;
use crate::world::binds::ChunkBinds;

pub struct MeshStage;

impl MeshStage {
    /// Record surface extraction for `chunk`. `None` processes the full
    /// grid; `Some(range)` restricts work to the inclusive cell range
    /// (post-edit partial remesh).
    pub fn record(
        &self,
        ctx: &GpuContext,
        kernels: &KernelLibrary,
        encoder: &mut wgpu::CommandEncoder,
        chunk: &Chunk,
        binds: &ChunkBinds,
        region: Option<CellRange>,
    ) {
        let range = region.unwrap_or_else(CellRange::full_chunk);

        ctx.queue.write_buffer(
            &chunk.buffers.mesh_region,
            0,
            bytemuck::bytes_of(&MeshRegion {
                cell_min: range.min,
                _pad0: 0,
                cell_max: range.max,
                _pad1: 0,
            }),
        );

        let (meshlet_lo, meshlet_hi) = range.meshlet_range(MESHLET_SIZE);
        let meshlet_extent = meshlet_hi - meshlet_lo + glam::UVec3::ONE;

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Mesh Pass"),
            timestamp_writes: None,
        });

        pass.set_pipeline(&kernels.mesh_reset);
        pass.set_bind_group(0, &binds.mesh, &[]);
        pass.dispatch_workgroups(meshlet_extent.x, meshlet_extent.y, meshlet_extent.z);

        // Extraction covers every cell of every meshlet the reset touched:
        // the reset zeroed those meshlets whole, so their out-of-region
        // cells must be rebuilt too.
        pass.set_pipeline(&kernels.mesh_extract);
        pass.set_bind_group(0, &binds.mesh, &[]);
        let cells = meshlet_extent * MESHLET_SIZE;
        pass.dispatch_workgroups(
            cells.x.div_ceil(4),
            cells.y.div_ceil(4),
            cells.z.div_ceil(4),
        );
    }
}

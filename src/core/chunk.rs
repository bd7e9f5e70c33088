//! Per-chunk state: grid identity, generation flags, and the GPU resource
//! suite owned by one cubical world region.

use glam::Vec3;

use crate::constants::*;
use crate::core::bounds::ChangeBounds;
use crate::core::grid::ChunkCoord;
use crate::core::uniforms::{ChunkParams, DrawCommand};
use crate::render::context::GpuContext;
use crate::render::frustum::Aabb;

/// Which of the two light slots currently holds the stable (renderable)
/// data. Kept as an explicit index so the swap can never half-apply.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LightRotation {
    parity: usize,
}

impl LightRotation {
    /// Slot read by the renderer and by the next propagation step.
    pub fn stable(&self) -> usize {
        self.parity
    }

    /// Slot the next propagation step writes. Never equals `stable`.
    pub fn writable(&self) -> usize {
        self.parity ^ 1
    }

    /// Role swap after one propagation dispatch.
    pub fn swap(&mut self) {
        self.parity ^= 1;
    }
}

/// GPU buffers owned by a chunk. Allocated once at chunk creation with fixed
/// capacities; the mesh stage rewrites contents in place.
pub struct ChunkBuffers {
    /// `(N+1)^3` density/color samples, 8 bytes each.
    pub density: wgpu::Buffer,
    /// Triangle soup, fixed stride of `MESHLET_VERTEX_CAPACITY` per meshlet.
    pub vertices: wgpu::Buffer,
    pub normals: wgpu::Buffer,
    pub colors: wgpu::Buffer,
    /// One DrawCommand per meshlet, written by the mesh stage.
    pub commands: wgpu::Buffer,
    /// Cull-compacted commands actually consumed by the draw.
    pub visible_commands: wgpu::Buffer,
    /// Occupied-cell count per meshlet.
    pub occupancy: wgpu::Buffer,
    /// Atomic counter of surviving meshlets.
    pub visible_count: wgpu::Buffer,
    /// Compacted surviving meshlet indices (observability readback).
    pub visible_indices: wgpu::Buffer,
    /// Double-buffered light grid.
    pub light: [wgpu::Buffer; 2],
    pub chunk_params: wgpu::Buffer,
    pub noise_params: wgpu::Buffer,
    pub mesh_region: wgpu::Buffer,
}

impl ChunkBuffers {
    pub fn new(ctx: &GpuContext, coord: ChunkCoord, lod: u8) -> Self {
        let device = &ctx.device;
        let tag = format!("{},{},{}", coord.x, coord.y, coord.z);

        let storage = |label: String, size: u64, extra: wgpu::BufferUsages| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&label),
                size,
                usage: wgpu::BufferUsages::STORAGE | extra,
                mapped_at_creation: false,
            })
        };

        let vertex_bytes =
            (MESHLETS_PER_CHUNK * MESHLET_VERTEX_CAPACITY) as u64 * 16;
        let command_bytes =
            MESHLETS_PER_CHUNK as u64 * std::mem::size_of::<DrawCommand>() as u64;

        let density = storage(
            format!("Density Buffer {tag}"),
            SAMPLES_PER_CHUNK as u64 * 8,
            wgpu::BufferUsages::COPY_DST,
        );
        let vertices = storage(
            format!("Mesh Vertex Buffer {tag}"),
            vertex_bytes,
            wgpu::BufferUsages::VERTEX,
        );
        let normals = storage(
            format!("Mesh Normal Buffer {tag}"),
            vertex_bytes,
            wgpu::BufferUsages::VERTEX,
        );
        let colors = storage(
            format!("Mesh Color Buffer {tag}"),
            (MESHLETS_PER_CHUNK * MESHLET_VERTEX_CAPACITY) as u64 * 4,
            wgpu::BufferUsages::VERTEX,
        );
        let commands = storage(
            format!("Draw Commands {tag}"),
            command_bytes,
            wgpu::BufferUsages::COPY_DST,
        );
        let visible_commands = storage(
            format!("Visible Draw Commands {tag}"),
            command_bytes,
            wgpu::BufferUsages::INDIRECT | wgpu::BufferUsages::COPY_DST,
        );
        let occupancy = storage(
            format!("Occupancy Buffer {tag}"),
            MESHLETS_PER_CHUNK as u64 * 4,
            wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
        );
        let visible_count = storage(
            format!("Visible Count {tag}"),
            4,
            wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
        );
        let visible_indices = storage(
            format!("Visible Indices {tag}"),
            MESHLETS_PER_CHUNK as u64 * 4,
            wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
        );
        let light = [0, 1].map(|slot| {
            storage(
                format!("Light Buffer {slot} {tag}"),
                CELLS_PER_CHUNK as u64 * 4,
                wgpu::BufferUsages::COPY_DST,
            )
        });

        let uniform = |label: String, size: u64| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&label),
                size,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let chunk_params = uniform(format!("Chunk Params {tag}"), 32);
        let noise_params = uniform(format!("Noise Params {tag}"), 32);
        let mesh_region = uniform(format!("Mesh Region {tag}"), 32);

        let origin = coord.origin(CHUNK_SIZE);
        ctx.queue.write_buffer(
            &chunk_params,
            0,
            bytemuck::bytes_of(&ChunkParams {
                origin: origin.to_array(),
                chunk_size: CHUNK_SIZE,
                lod: lod as u32,
                _pad: [0; 3],
            }),
        );

        ChunkBuffers {
            density,
            vertices,
            normals,
            colors,
            commands,
            visible_commands,
            occupancy,
            visible_count,
            visible_indices,
            light,
            chunk_params,
            noise_params,
            mesh_region,
        }
    }
}

pub struct Chunk {
    pub coord: ChunkCoord,
    pub key: u64,
    pub lod: u8,
    /// Stable arena handle for this chunk's bind groups.
    pub slot: usize,
    pub aabb: Aabb,
    pub buffers: ChunkBuffers,
    pub light_rotation: LightRotation,
    /// True from creation until noise/mesh/light generation has been
    /// recorded; mesh buffers must not be drawn while set.
    pub generating: bool,
    /// At least one successful mesh pass has been recorded.
    pub meshed: bool,
    pub light_invalidated: bool,
    /// Accumulated edit bounds awaiting a bounds-limited remesh; `Some` with
    /// an empty accumulator means full-chunk fallback.
    pub pending_remesh: Option<ChangeBounds>,
    /// Last cull readback observed for this chunk (stale by design).
    pub last_visible_count: u32,
}

impl Chunk {
    pub fn new(ctx: &GpuContext, coord: ChunkCoord, lod: u8, slot: usize) -> Self {
        let origin = coord.origin(CHUNK_SIZE);
        let size = CHUNK_SIZE as f32;
        Chunk {
            coord,
            key: coord.key(),
            lod,
            slot,
            aabb: Aabb::new(origin, origin + Vec3::splat(size)),
            buffers: ChunkBuffers::new(ctx, coord, lod),
            light_rotation: LightRotation::default(),
            generating: true,
            meshed: false,
            light_invalidated: false,
            pending_remesh: None,
            last_visible_count: 0,
        }
    }

    /// Valid to draw: generation finished and at least one mesh pass ran.
    pub fn renderable(&self) -> bool {
        !self.generating && self.meshed
    }

    pub fn origin(&self) -> Vec3 {
        self.coord.origin(CHUNK_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn light_rotation_never_aliases() {
        let mut rot = LightRotation::default();
        for _ in 0..10 {
            assert_ne!(rot.stable(), rot.writable());
            rot.swap();
        }
    }

    #[test]
    fn parity_after_n_swaps() {
        // After N propagation calls the stable slot equals the original
        // writable slot iff N is odd.
        let original = LightRotation::default();
        let mut rot = original;
        for n in 1..=8 {
            rot.swap();
            if n % 2 == 1 {
                assert_eq!(rot.stable(), original.writable());
            } else {
                assert_eq!(rot.stable(), original.stable());
            }
        }
    }
}

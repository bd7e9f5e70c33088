//! Arena-style storage for per-chunk bind groups.
//!
//! Chunks own a stable integer slot handle; every stage looks its bind
//! groups up by that handle instead of by object identity. Bind groups are
//! rebuilt only when a chunk is (re)allocated, since chunk buffers are
//! created once and rewritten in place.

use crate::core::chunk::Chunk;
use crate::render::gbuffer::GBuffer;
use crate::render::kernels::KernelLibrary;
use crate::world::tables::LookupTables;

pub struct ChunkBinds {
    pub noise: wgpu::BindGroup,
    pub mesh: wgpu::BindGroup,
    /// Indexed by the chunk's light parity: `light[p]` reads slot `p` and
    /// writes slot `p ^ 1`, so a dispatch never reads and writes one slot.
    pub light: [wgpu::BindGroup; 2],
    pub cull: wgpu::BindGroup,
    pub edit: wgpu::BindGroup,
    /// Deferred composition inputs, indexed by light parity (stable slot).
    pub compose: [wgpu::BindGroup; 2],
}

fn entry(binding: u32, buffer: &wgpu::Buffer) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry {
        binding,
        resource: buffer.as_entire_binding(),
    }
}

impl ChunkBinds {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: &wgpu::Device,
        kernels: &KernelLibrary,
        gbuffer: &GBuffer,
        tables: &LookupTables,
        light_params: &wgpu::Buffer,
        cull_uniforms: &wgpu::Buffer,
        edits: &wgpu::Buffer,
        chunk: &Chunk,
    ) -> Self {
        let b = &chunk.buffers;

        let noise = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("noise binds"),
            layout: &kernels.noise_layout,
            entries: &[
                entry(0, &b.chunk_params),
                entry(1, &b.noise_params),
                entry(2, &b.density),
            ],
        });

        let mesh = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("mesh binds"),
            layout: &kernels.mesh_layout,
            entries: &[
                entry(0, &b.chunk_params),
                entry(1, &b.mesh_region),
                entry(2, &b.density),
                entry(3, &tables.edges),
                entry(4, &tables.triangles),
                entry(5, &b.vertices),
                entry(6, &b.normals),
                entry(7, &b.colors),
                entry(8, &b.commands),
                entry(9, &b.occupancy),
            ],
        });

        let light = [0usize, 1].map(|p| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("light binds"),
                layout: &kernels.light_layout,
                entries: &[
                    entry(0, &b.chunk_params),
                    entry(1, light_params),
                    entry(2, &b.density),
                    entry(3, &b.light[p]),
                    entry(4, &b.light[p ^ 1]),
                ],
            })
        });

        let cull = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("cull binds"),
            layout: &kernels.cull_layout,
            entries: &[
                entry(0, cull_uniforms),
                entry(1, &b.chunk_params),
                entry(2, &b.commands),
                entry(3, &b.occupancy),
                entry(4, &b.visible_commands),
                entry(5, &b.visible_count),
                entry(6, &b.visible_indices),
            ],
        });

        let edit = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("edit binds"),
            layout: &kernels.edit_layout,
            entries: &[
                entry(0, &b.chunk_params),
                entry(1, edits),
                entry(2, &b.density),
            ],
        });

        let compose = [0usize, 1].map(|p| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("compose binds"),
                layout: &gbuffer.chunk_compose_layout,
                entries: &[entry(0, &b.chunk_params), entry(1, &b.light[p])],
            })
        });

        ChunkBinds {
            noise,
            mesh,
            light,
            cull,
            edit,
            compose,
        }
    }
}

#[derive(Default)]
pub struct BindGroupArena {
    slots: Vec<Option<ChunkBinds>>,
    free: Vec<usize>,
}

impl BindGroupArena {
    /// Reserve a stable slot handle for a new chunk.
    pub fn reserve(&mut self) -> usize {
        if let Some(slot) = self.free.pop() {
            slot
        } else {
            self.slots.push(None);
            self.slots.len() - 1
        }
    }

    pub fn install(&mut self, slot: usize, binds: ChunkBinds) {
        self.slots[slot] = Some(binds);
    }

    pub fn get(&self, slot: usize) -> &ChunkBinds {
        self.slots[slot]
            .as_ref()
            .expect("bind groups missing for reserved slot")
    }

    /// Release a slot when its chunk is retired. The bind groups are
    /// returned so the caller can keep them alive until the retire fence
    /// clears.
    pub fn release(&mut self, slot: usize) -> Option<ChunkBinds> {
        let binds = self.slots[slot].take();
        self.free.push(slot);
        binds
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_recycles_slots() {
        let mut arena = BindGroupArena::default();
        let a = arena.reserve();
        let b = arena.reserve();
        assert_ne!(a, b);
        assert!(arena.release(a).is_none()); // nothing installed yet
        let c = arena.reserve();
        assert_eq!(c, a); // released handle is reused
        assert_eq!(arena.live_count(), 0);
    }
}

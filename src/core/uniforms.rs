//! CPU-side mirrors of the GPU uniform and command layouts.
//!
//! Field order and padding must match the WGSL structs in `src/shaders/`
//! exactly; WGSL vec3 members are 16-byte aligned, hence the explicit pads.

use bytemuck::{Pod, Zeroable};

/// Per-frame camera context shared by the block and deferred pipelines.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct FrameUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub inv_view_proj: [[f32; 4]; 4],
    pub camera_pos: [f32; 3],
    pub time: f32,
    pub screen_size: [f32; 2],
    pub sun_dir: [f32; 2],
}

/// Static per-chunk context: world origin, size, LOD tag.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct ChunkParams {
    pub origin: [f32; 3],
    pub chunk_size: u32,
    pub lod: u32,
    pub _pad: [u32; 3],
}

/// Noise kernel context: world-space chunk offset plus shaping parameters.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct NoiseParams {
    pub offset: [f32; 3],
    pub seed: u32,
    pub frequency: f32,
    pub floor_height: f32,
    pub _pad: [f32; 2],
}

/// Inclusive cell region for the mesh kernel's reset and extract entries.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct MeshRegion {
    pub cell_min: [u32; 3],
    pub _pad0: u32,
    pub cell_max: [u32; 3],
    pub _pad1: u32,
}

/// One queued sphere edit as the voxel_edit kernel sees it.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct EditParams {
    pub center: [f32; 3],
    pub radius: f32,
    /// 0 = add material, 1 = remove material.
    pub op: u32,
    pub color: u32,
    pub _pad: [u32; 2],
}

/// Header ahead of the EditParams array in the edit storage buffer.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct EditBatchHeader {
    pub count: u32,
    pub _pad: [u32; 3],
}

/// Light kernel context.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct LightParams {
    /// Per-step attenuation applied to the neighbor maximum.
    pub attenuation: f32,
    pub _pad: [f32; 3],
}

/// Culling context: frustum planes plus meshlet count.
/// Must match cull.wgsl's CullUniforms layout exactly (planes are vec4:
/// xyz = normal, w = distance; already normalized on the CPU).
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct CullUniforms {
    pub frustum_planes: [[f32; 4]; 6],
    pub meshlet_count: u32,
    pub _pad: [u32; 3],
}

/// wgpu DrawIndirect command layout (non-indexed; the mesh stage emits a
/// triangle soup with per-meshlet fixed first_vertex).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct DrawCommand {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_match_wgsl_strides() {
        // These sizes are load-bearing: the WGSL structs are laid out to the
        // same byte counts.
        assert_eq!(std::mem::size_of::<FrameUniforms>(), 160);
        assert_eq!(std::mem::size_of::<ChunkParams>(), 32);
        assert_eq!(std::mem::size_of::<NoiseParams>(), 32);
        assert_eq!(std::mem::size_of::<MeshRegion>(), 32);
        assert_eq!(std::mem::size_of::<EditParams>(), 32);
        assert_eq!(std::mem::size_of::<LightParams>(), 16);
        assert_eq!(std::mem::size_of::<CullUniforms>(), 112);
        assert_eq!(std::mem::size_of::<DrawCommand>(), 16);
    }
}

// Core types: chunks, grid keys, bounds, GPU layouts
pub mod core;

// Hosting shell: window, device, event loop
pub mod app;

// Camera and input
pub mod player;

// Render plumbing: context, kernels, G-buffer, frustum, readbacks
pub mod render;

// Streaming engine: stages, queue, orchestrator, editor
pub mod world;

pub mod constants;

// Re-exports
pub use crate::constants::*;
pub use crate::core::{CellRange, ChangeBounds, Chunk, ChunkCoord, DrawCommand, LightRotation};
pub use crate::player::{Camera, InputState};
pub use crate::render::{
    Aabb, CullReadbackPool, CullStats, GBuffer, GpuContext, GpuInitError, KernelLibrary,
    extract_frustum_planes, planes_to_array,
};
pub use crate::world::{
    ChunkStreamer, EditCommand, EditOp, GenerationQueue, GenerationTask, LookupTables,
    PositionSample, StreamConfig, VoxelEditor,
};

pub mod bounds;
pub mod chunk;
pub mod grid;
pub mod uniforms;

pub use bounds::{CellRange, ChangeBounds};
pub use chunk::{Chunk, ChunkBuffers, LightRotation};
pub use grid::ChunkCoord;
pub use uniforms::{
    ChunkParams, CullUniforms, DrawCommand, EditBatchHeader, EditParams, FrameUniforms,
    LightParams, MeshRegion, NoiseParams,
};

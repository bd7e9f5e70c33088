pub mod binds;
pub mod edit;
pub mod queue;
pub mod stages;
pub mod streamer;
pub mod tables;

pub use binds::{BindGroupArena, ChunkBinds};
pub use edit::{EditCommand, EditOp, PositionSample, VoxelEditor};
pub use queue::{GenerationQueue, GenerationTask};
pub use streamer::{ChunkStreamer, StreamConfig};
pub use tables::LookupTables;

// World constants
pub const CHUNK_SIZE: u32 = 32;
/// Density samples per axis: one extra border sample so cells on the positive
/// faces interpolate against real data instead of a clamp value.
pub const SAMPLE_GRID: u32 = CHUNK_SIZE + 1;
pub const SAMPLES_PER_CHUNK: u32 = SAMPLE_GRID * SAMPLE_GRID * SAMPLE_GRID;
pub const CELLS_PER_CHUNK: u32 = CHUNK_SIZE * CHUNK_SIZE * CHUNK_SIZE;

// Meshlet layout: marching-cubes output is grouped per 8x8x8 block of cells,
// each block with its own indirect draw command.
pub const MESHLET_SIZE: u32 = 8;
pub const MESHLETS_PER_AXIS: u32 = CHUNK_SIZE / MESHLET_SIZE;
pub const MESHLETS_PER_CHUNK: u32 = MESHLETS_PER_AXIS * MESHLETS_PER_AXIS * MESHLETS_PER_AXIS;
/// Vertex slots reserved per meshlet in the chunk mesh buffers. Cells that
/// would push a meshlet past this cap have their triangles dropped; that is an
/// accepted visual approximation, not an error.
pub const MESHLET_VERTEX_CAPACITY: u32 = 1024;
/// Worst case a single marching-cubes cell can emit (5 triangles).
pub const CELL_VERTEX_CAPACITY: u32 = 15;

// Streaming constants
pub const STREAM_RADIUS: i32 = 2;
pub const MAX_GENERATIONS_PER_FRAME: usize = 2;
pub const LIGHT_ITERATIONS_PER_INVALIDATION: u32 = 16;
pub const CULL_READBACK_INTERVAL: u64 = 2;
pub const READBACK_POOL_SIZE: usize = 16;
pub const MAX_EDITS_PER_BATCH: u32 = 64;

// Camera constants
pub const CAMERA_FOV_Y: f32 = std::f32::consts::FRAC_PI_2;
pub const CAMERA_NEAR: f32 = 0.1;
pub const CAMERA_FAR: f32 = 600.0;
pub const CAMERA_BASE_SPEED: f32 = 18.0;
pub const CAMERA_SPRINT_SPEED: f32 = 60.0;
pub const MOUSE_SENSITIVITY: f32 = 0.0025;

// Procedural background texture consumed by the deferred composition pass
pub const BACKGROUND_SIZE: u32 = 512;

/// How often (in frames) the streamer logs occupancy statistics.
pub const STATS_LOG_INTERVAL: u64 = 240;

//! The streaming orchestrator.
//!
//! Owns the chunk set and drives every chunk through its per-frame stage
//! sequence: membership update, budgeted generation (noise -> mesh ->
//! light), light re-propagation, culling, the G-buffer pass, per-chunk
//! deferred composition, readback scheduling, and fenced retirement. All
//! GPU work for a frame is recorded into one shared command encoder that
//! the caller submits exactly once; `update` itself never submits.

use std::collections::VecDeque;

use crossbeam_channel::{Receiver, Sender, unbounded};
use glam::{Mat4, Vec3};
use rustc_hash::FxHashMap;

use crate::constants::*;
use crate::core::bounds::ChangeBounds;
use crate::core::chunk::Chunk;
use crate::core::grid::ChunkCoord;
use crate::core::uniforms::{EditBatchHeader, EditParams};
use crate::render::context::GpuContext;
use crate::render::frustum::extract_frustum_planes;
use crate::render::gbuffer::GBuffer;
use crate::render::kernels::KernelLibrary;
use crate::render::readback::CullReadbackPool;
use crate::world::binds::{BindGroupArena, ChunkBinds};
use crate::world::queue::GenerationQueue;
use crate::world::stages::{CullStage, LightStage, MeshStage, NoiseStage};
use crate::world::tables::LookupTables;

#[derive(Clone, Debug)]
pub struct StreamConfig {
    pub radius: i32,
    pub generation_budget: usize,
    pub light_iterations: u32,
    pub readback_interval: u64,
    pub seed: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            radius: STREAM_RADIUS,
            generation_budget: MAX_GENERATIONS_PER_FRAME,
            light_iterations: LIGHT_ITERATIONS_PER_INVALIDATION,
            readback_interval: CULL_READBACK_INTERVAL,
            seed: 1337,
        }
    }
}

/// Chunks waiting for the GPU to finish the last submission that may still
/// reference their resources.
struct RetireBatch {
    fence_id: u64,
    #[allow(dead_code)]
    chunks: Vec<(Chunk, Option<ChunkBinds>)>,
}

pub struct ChunkStreamer {
    pub config: StreamConfig,

    chunks: FxHashMap<u64, Chunk>,
    arena: BindGroupArena,
    queue: GenerationQueue,

    tables: LookupTables,
    noise_stage: NoiseStage,
    mesh_stage: MeshStage,
    light_stage: LightStage,
    cull_stage: CullStage,

    readbacks: CullReadbackPool,
    readback_cursor: usize,

    /// Edit-parameter storage shared by every chunk's edit bind group; the
    /// editor writes it between its out-of-band submissions.
    edit_buffer: wgpu::Buffer,

    /// Evicted this frame, waiting to join a retire batch at submit time.
    pending_retire: Vec<(Chunk, Option<ChunkBinds>)>,
    retiring: VecDeque<RetireBatch>,
    fence_tx: Sender<u64>,
    fence_rx: Receiver<u64>,
    next_fence_id: u64,

    frame: u64,
}

impl ChunkStreamer {
    pub fn new(ctx: &GpuContext, config: StreamConfig) -> Self {
        let (fence_tx, fence_rx) = unbounded();
        let edit_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Edit Batch Buffer"),
            size: (std::mem::size_of::<EditBatchHeader>()
                + MAX_EDITS_PER_BATCH as usize * std::mem::size_of::<EditParams>())
                as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        ChunkStreamer {
            noise_stage: NoiseStage::new(config.seed),
            config,
            chunks: FxHashMap::default(),
            arena: BindGroupArena::default(),
            queue: GenerationQueue::default(),
            tables: LookupTables::upload(&ctx.device),
            mesh_stage: MeshStage,
            light_stage: LightStage::new(&ctx.device),
            cull_stage: CullStage::new(&ctx.device),
            readbacks: CullReadbackPool::new(&ctx.device),
            readback_cursor: 0,
            edit_buffer,
            pending_retire: Vec::new(),
            retiring: VecDeque::new(),
            fence_tx,
            fence_rx,
            next_fence_id: 0,
            frame: 0,
        }
    }

    /// One-time generation of the origin chunk, waiting for GPU completion
    /// so the first rendered frame has valid data. The only blocking wait
    /// outside of shutdown.
    pub fn init(&mut self, ctx: &GpuContext, kernels: &KernelLibrary, gbuffer: &GBuffer) {
        let origin = ChunkCoord::new(0, 0, 0);
        let key = self.create_chunk(ctx, kernels, gbuffer, origin, 0);

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Init Encoder"),
            });
        self.record_generation(ctx, kernels, &mut encoder, key);
        ctx.queue.submit(std::iter::once(encoder.finish()));
        ctx.wait_idle();
        tracing::info!("initial chunk generated at {:?}", origin);
    }

    fn create_chunk(
        &mut self,
        ctx: &GpuContext,
        kernels: &KernelLibrary,
        gbuffer: &GBuffer,
        coord: ChunkCoord,
        lod: u8,
    ) -> u64 {
        let slot = self.arena.reserve();
        let chunk = Chunk::new(ctx, coord, lod, slot);
        let binds = ChunkBinds::new(
            &ctx.device,
            kernels,
            gbuffer,
            &self.tables,
            &self.light_stage.params,
            &self.cull_stage.uniforms,
            &self.edit_buffer,
            &chunk,
        );
        self.arena.install(slot, binds);
        let key = chunk.key;
        self.chunks.insert(key, chunk);
        key
    }

    /// Record the full noise -> mesh -> light sequence for a freshly
    /// reserved chunk into the shared encoder.
    fn record_generation(
        &mut self,
        ctx: &GpuContext,
        kernels: &KernelLibrary,
        encoder: &mut wgpu::CommandEncoder,
        key: u64,
    ) {
        let Some(chunk) = self.chunks.get_mut(&key) else {
            return;
        };
        let binds = self.arena.get(chunk.slot);

        self.noise_stage.record(ctx, kernels, encoder, chunk, binds);
        self.mesh_stage
            .record(ctx, kernels, encoder, chunk, binds, None);
        self.light_stage.record_propagation(
            kernels,
            encoder,
            chunk,
            binds,
            self.config.light_iterations,
        );

        chunk.generating = false;
        chunk.meshed = true;
        chunk.light_invalidated = false;
    }

    /// The per-frame stage sequence. Called exactly once per rendered frame;
    /// records into `encoder` and never submits it.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        ctx: &GpuContext,
        kernels: &KernelLibrary,
        gbuffer: &GBuffer,
        encoder: &mut wgpu::CommandEncoder,
        surface_view: &wgpu::TextureView,
        camera_pos: Vec3,
        view_proj: &Mat4,
    ) {
        self.frame += 1;
        let center = ChunkCoord::containing(camera_pos, CHUNK_SIZE);
        let radius = self.config.radius;

        // 1-2. Membership: enqueue newly-in-range coordinates closest-first;
        // cancel queued tasks that drifted out of range.
        for coord in center.in_radius(radius) {
            let key = coord.key();
            if !self.chunks.contains_key(&key) && !self.queue.contains(key) {
                self.queue
                    .push(coord, 0, center.distance_sq(&coord), self.frame);
            }
        }
        self.queue.retain(|c| center.chebyshev(c) <= radius);

        // 8 (first half). Chunks that exited range leave the active set now;
        // their GPU resources are released only after the retire fence.
        let evicted: Vec<u64> = self
            .chunks
            .values()
            .filter(|c| center.chebyshev(&c.coord) > radius)
            .map(|c| c.key)
            .collect();
        for key in evicted {
            if let Some(chunk) = self.chunks.remove(&key) {
                let binds = self.arena.release(chunk.slot);
                self.pending_retire.push((chunk, binds));
            }
        }

        // 3. Budgeted generation drain.
        let mut generated = 0;
        while generated < self.config.generation_budget {
            let Some(task) = self.queue.pop() else {
                break;
            };
            // A task can be stale if its chunk somehow re-entered the map.
            if self.chunks.contains_key(&task.key) {
                continue;
            }
            if center.chebyshev(&task.coord) > radius {
                continue; // raced out of range; dropped without error
            }
            let key = self.create_chunk(ctx, kernels, gbuffer, task.coord, task.lod);
            self.record_generation(ctx, kernels, encoder, key);
            generated += 1;
        }

        // 4. Bounded light re-propagation for invalidated chunks.
        let invalidated: Vec<u64> = self
            .chunks
            .values()
            .filter(|c| c.light_invalidated && !c.generating)
            .map(|c| c.key)
            .collect();
        for key in invalidated {
            if let Some(chunk) = self.chunks.get_mut(&key) {
                let binds = self.arena.get(chunk.slot);
                self.light_stage.record_propagation(
                    kernels,
                    encoder,
                    chunk,
                    binds,
                    self.config.light_iterations,
                );
                chunk.light_invalidated = false;
            }
        }

        // Bounds-limited remeshes scheduled by the editor.
        let dirty: Vec<u64> = self
            .chunks
            .values()
            .filter(|c| c.pending_remesh.is_some() && !c.generating)
            .map(|c| c.key)
            .collect();
        for key in dirty {
            if let Some(chunk) = self.chunks.get_mut(&key) {
                let bounds = chunk.pending_remesh.take().unwrap_or_else(ChangeBounds::empty);
                // Degenerate bounds fall back to a full-chunk remesh.
                let region = bounds.to_cell_range(chunk.coord);
                let binds = self.arena.get(chunk.slot);
                self.mesh_stage
                    .record(ctx, kernels, encoder, chunk, binds, region);
            }
        }

        // 5. Cull pass per active chunk. Chunks whose whole AABB fails the
        // CPU frustum test skip the dispatch; their compacted commands are
        // still cleared so stale survivors cannot ghost.
        let planes = extract_frustum_planes(view_proj);
        self.cull_stage.begin_frame(ctx, &planes);
        for chunk in self.chunks.values().filter(|c| c.renderable()) {
            if chunk.aabb.is_visible(&planes) {
                let binds = self.arena.get(chunk.slot);
                self.cull_stage.record(kernels, encoder, chunk, binds);
            } else {
                encoder.clear_buffer(&chunk.buffers.visible_commands, 0, None);
                encoder.clear_buffer(&chunk.buffers.visible_count, 0, None);
            }
        }

        // 6. One G-buffer pass over all chunks, then one deferred-lighting
        // pass per chunk (after the background fill).
        {
            let mut pass = gbuffer.begin_geometry_pass(encoder);
            for chunk in self.chunks.values().filter(|c| c.renderable()) {
                pass.set_vertex_buffer(0, chunk.buffers.vertices.slice(..));
                pass.set_vertex_buffer(1, chunk.buffers.normals.slice(..));
                pass.set_vertex_buffer(2, chunk.buffers.colors.slice(..));
                pass.multi_draw_indirect(&chunk.buffers.visible_commands, 0, MESHLETS_PER_CHUNK);
            }
        }
        gbuffer.record_background(encoder, surface_view);
        for chunk in self.chunks.values().filter(|c| c.renderable()) {
            // An offscreen chunk owns no pixels; its lighting pass can wait.
            if !chunk.aabb.is_visible(&planes) {
                continue;
            }
            let binds = self.arena.get(chunk.slot);
            gbuffer.record_chunk_compose(
                encoder,
                surface_view,
                &binds.compose[chunk.light_rotation.stable()],
            );
        }

        // 7. Cull readback cadence: copy a few chunks' counters into staging
        // without ever blocking the frame.
        if self.config.readback_interval > 0 && self.frame % self.config.readback_interval == 0 {
            self.schedule_cull_readbacks(encoder);
        }
        for stats in self.readbacks.drain() {
            // Results for chunks evicted in the meantime are simply stale.
            if let Some(chunk) = self.chunks.get_mut(&stats.key) {
                chunk.last_visible_count = stats.visible;
            }
        }

        if self.frame % STATS_LOG_INTERVAL == 0 {
            let visible: u32 = self.chunks.values().map(|c| c.last_visible_count).sum();
            tracing::info!(
                frame = self.frame,
                active = self.chunks.len(),
                queued = self.queue.len(),
                retiring = self.retiring.len(),
                visible_meshlets = visible,
                "streaming stats"
            );
        }
    }

    fn schedule_cull_readbacks(&mut self, encoder: &mut wgpu::CommandEncoder) {
        let mut keys: Vec<u64> = self
            .chunks
            .values()
            .filter(|c| c.renderable())
            .map(|c| c.key)
            .collect();
        if keys.is_empty() {
            return;
        }
        keys.sort_unstable();
        for _ in 0..4 {
            self.readback_cursor = (self.readback_cursor + 1) % keys.len();
            let key = keys[self.readback_cursor];
            if let Some(chunk) = self.chunks.get(&key) {
                if !self.readbacks.schedule_copy(encoder, chunk) {
                    break; // pool exhausted; try again next interval
                }
            }
        }
    }

    /// Called right after the caller's single `queue.submit` for the frame.
    /// Turns scheduled readback copies into live maps, fences this frame's
    /// retirements, and frees batches whose fence has signalled.
    pub fn after_submit(&mut self, ctx: &GpuContext) {
        self.readbacks.begin_maps();

        if !self.pending_retire.is_empty() {
            let fence_id = self.next_fence_id;
            self.next_fence_id += 1;
            let batch = RetireBatch {
                fence_id,
                chunks: std::mem::take(&mut self.pending_retire),
            };
            let tx = self.fence_tx.clone();
            ctx.queue.on_submitted_work_done(move || {
                let _ = tx.send(fence_id);
            });
            self.retiring.push_back(batch);
        }

        // Fences signal in submission order; drop every batch at or below
        // the newest signalled id. Dropping releases the GPU resources.
        let mut signalled = None;
        while let Ok(id) = self.fence_rx.try_recv() {
            signalled = Some(signalled.map_or(id, |s: u64| s.max(id)));
        }
        if let Some(max_id) = signalled {
            while let Some(front) = self.retiring.front() {
                if front.fence_id <= max_id {
                    self.retiring.pop_front();
                } else {
                    break;
                }
            }
        }

        ctx.pump();
    }

    // ---- editor access ----

    pub fn has_chunks(&self) -> bool {
        !self.chunks.is_empty()
    }

    /// Chunk containing a world-space point, if it is resident.
    pub fn chunk_at(&self, pos: Vec3) -> Option<u64> {
        let key = ChunkCoord::containing(pos, CHUNK_SIZE).key();
        self.chunks.contains_key(&key).then_some(key)
    }

    pub fn chunk(&self, key: u64) -> Option<&Chunk> {
        self.chunks.get(&key)
    }

    pub fn binds_for(&self, key: u64) -> Option<&ChunkBinds> {
        self.chunks.get(&key).map(|c| self.arena.get(c.slot))
    }

    pub fn edit_buffer(&self) -> &wgpu::Buffer {
        &self.edit_buffer
    }

    /// Fold a batch's change bounds into the chunk's pending remesh region.
    pub fn schedule_remesh(&mut self, key: u64, bounds: ChangeBounds) {
        if let Some(chunk) = self.chunks.get_mut(&key) {
            match &mut chunk.pending_remesh {
                Some(pending) => pending.union(&bounds),
                None => chunk.pending_remesh = Some(bounds),
            }
        }
    }

    /// Invalidate lighting for a chunk and its grid-adjacent neighbors, so
    /// re-propagation cannot leave seams across boundaries.
    pub fn invalidate_light_around(&mut self, key: u64) {
        let coord = ChunkCoord::from_key(key);
        if let Some(chunk) = self.chunks.get_mut(&key) {
            chunk.light_invalidated = true;
        }
        for neighbor in coord.neighbors26() {
            if let Some(chunk) = self.chunks.get_mut(&neighbor.key()) {
                chunk.light_invalidated = true;
            }
        }
    }

    pub fn active_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }
}

//! Voxel editor: queued sphere edits, batched per chunk, applied on the GPU
//! out-of-band from the frame submission.
//!
//! Edits accumulate in a CPU queue; `drain` groups them by target chunk and
//! submits one `voxel_edit` dispatch batch per chunk in its own command
//! buffer. Each batch folds its spheres into a change-bounds accumulator,
//! schedules exactly one bounds-limited remesh for the chunk, and
//! invalidates lighting on the chunk and all grid-adjacent neighbors.
//! Multi-chunk batches are split per chunk rather than skipped; a command
//! whose chunk is not resident is skipped with a warning.
//!
//! Density deltas use a smoothstep falloff from the sphere center to its
//! radius (soft-edged brush): `Add` pushes density toward solid (negative),
//! `Remove` toward empty, clamped to [-1, 1].

use crossbeam_channel::{Receiver, Sender, bounded};
use glam::Vec3;

use crate::constants::{MAX_EDITS_PER_BATCH, SAMPLE_GRID};
use crate::core::bounds::ChangeBounds;
use crate::core::uniforms::{EditBatchHeader, EditParams};
use crate::render::context::GpuContext;
use crate::render::gbuffer::GBuffer;
use crate::render::kernels::KernelLibrary;
use crate::world::streamer::ChunkStreamer;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EditOp {
    Add,
    Remove,
}

#[derive(Clone, Debug)]
pub struct EditCommand {
    pub seq: u64,
    pub center: Vec3,
    pub radius: f32,
    pub op: EditOp,
    /// Dense key of the chunk this edit applies to.
    pub target: u64,
    pub queued_at: u64,
}

/// Result of a center-of-view position readback.
#[derive(Copy, Clone, Debug)]
pub struct PositionSample {
    pub position: Vec3,
    /// False when the center pixel held background (no geometry).
    pub hit: bool,
}

pub struct VoxelEditor {
    queue: Vec<EditCommand>,
    next_seq: u64,
    /// Material color stamped by Add edits.
    pub brush_color: u32,

    position_staging: wgpu::Buffer,
    position_in_flight: bool,
    position_tx: Sender<bool>,
    position_rx: Receiver<bool>,
}

impl VoxelEditor {
    pub fn new(device: &wgpu::Device) -> Self {
        let (position_tx, position_rx) = bounded(1);
        VoxelEditor {
            queue: Vec::new(),
            next_seq: 0,
            brush_color: 0xFF60_A0D0, // packed ABGR, warm sandstone
            position_staging: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Center Position Staging"),
                size: 16,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            position_in_flight: false,
            position_tx,
            position_rx,
        }
    }

    /// Non-blocking enqueue. Returns false (with a warning) when no chunk is
    /// registered yet or the target position is not resident.
    pub fn queue_edit(
        &mut self,
        streamer: &ChunkStreamer,
        center: Vec3,
        radius: f32,
        op: EditOp,
        frame: u64,
    ) -> bool {
        if !streamer.has_chunks() {
            tracing::warn!("edit requested before any chunk is registered; ignoring");
            return false;
        }
        let Some(target) = streamer.chunk_at(center) else {
            tracing::warn!(?center, "edit targets a non-resident chunk; ignoring");
            return false;
        };
        self.queue.push(EditCommand {
            seq: self.next_seq,
            center,
            radius,
            op,
            target,
            queued_at: frame,
        });
        self.next_seq += 1;
        true
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Apply every queued edit: one out-of-band submission and one scheduled
    /// remesh per touched chunk, then light invalidation around each.
    pub fn drain(
        &mut self,
        ctx: &GpuContext,
        kernels: &KernelLibrary,
        streamer: &mut ChunkStreamer,
    ) {
        if self.queue.is_empty() {
            return;
        }
        let commands = std::mem::take(&mut self.queue);
        for (target, group) in group_by_chunk(commands) {
            let Some(binds) = streamer.binds_for(target) else {
                tracing::warn!(key = target, "edit batch for evicted chunk skipped");
                continue;
            };

            let mut batch = group;
            if batch.len() as u32 > MAX_EDITS_PER_BATCH {
                tracing::warn!(
                    dropped = batch.len() - MAX_EDITS_PER_BATCH as usize,
                    "edit batch exceeds capacity; excess commands dropped"
                );
                batch.truncate(MAX_EDITS_PER_BATCH as usize);
            }

            let params: Vec<EditParams> = batch
                .iter()
                .map(|cmd| EditParams {
                    center: cmd.center.to_array(),
                    radius: cmd.radius,
                    op: match cmd.op {
                        EditOp::Add => 0,
                        EditOp::Remove => 1,
                    },
                    color: self.brush_color,
                    _pad: [0; 2],
                })
                .collect();

            let header = EditBatchHeader {
                count: params.len() as u32,
                _pad: [0; 3],
            };
            ctx.queue
                .write_buffer(streamer.edit_buffer(), 0, bytemuck::bytes_of(&header));
            ctx.queue.write_buffer(
                streamer.edit_buffer(),
                std::mem::size_of::<EditBatchHeader>() as u64,
                bytemuck::cast_slice(&params),
            );

            let mut encoder = ctx
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Edit Encoder"),
                });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("Voxel Edit Pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&kernels.voxel_edit);
                pass.set_bind_group(0, &binds.edit, &[]);
                let groups = SAMPLE_GRID.div_ceil(4);
                pass.dispatch_workgroups(groups, groups, groups);
            }
            // Out-of-band: edits do not ride the frame's shared buffer.
            ctx.queue.submit(std::iter::once(encoder.finish()));

            let bounds = batch_bounds(&batch);
            streamer.schedule_remesh(target, bounds);
            streamer.invalidate_light_around(target);
        }
    }

    /// Kick off one G-buffer center-position readback. Returns false while a
    /// previous read is still in flight; overlapping reads are never queued.
    pub fn read_position_at_center(&mut self, ctx: &GpuContext, gbuffer: &GBuffer) -> bool {
        if self.position_in_flight {
            return false;
        }
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Center Position Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &gbuffer.position_texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: gbuffer.width / 2,
                    y: gbuffer.height / 2,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.position_staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: None,
                    rows_per_image: None,
                },
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        ctx.queue.submit(std::iter::once(encoder.finish()));

        self.position_in_flight = true;
        let tx = self.position_tx.clone();
        self.position_staging
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = tx.send(result.is_ok());
            });
        true
    }

    /// Completed center-position read, if one arrived. Non-blocking.
    pub fn poll_position(&mut self) -> Option<PositionSample> {
        let ok = self.position_rx.try_recv().ok()?;
        self.position_in_flight = false;
        if !ok {
            return None;
        }
        let sample = {
            let data = self.position_staging.slice(..).get_mapped_range();
            let texel: &[f32] = bytemuck::cast_slice(&data);
            PositionSample {
                position: Vec3::new(texel[0], texel[1], texel[2]),
                hit: texel[3] > 0.0,
            }
        };
        self.position_staging.unmap();
        Some(sample)
    }
}

/// Group a batch by target chunk, preserving command order inside each
/// group and the order in which chunks first appear.
fn group_by_chunk(commands: Vec<EditCommand>) -> Vec<(u64, Vec<EditCommand>)> {
    let mut groups: Vec<(u64, Vec<EditCommand>)> = Vec::new();
    for cmd in commands {
        match groups.iter_mut().find(|(key, _)| *key == cmd.target) {
            Some((_, group)) => group.push(cmd),
            None => groups.push((cmd.target, vec![cmd])),
        }
    }
    groups
}

/// Accumulated world-space bounds of a batch. Empty only for empty batches.
fn batch_bounds(batch: &[EditCommand]) -> ChangeBounds {
    let mut bounds = ChangeBounds::empty();
    for cmd in batch {
        bounds.include_sphere(cmd.center, cmd.radius);
    }
    bounds
}

/// CPU reference of the voxel_edit kernel's brush falloff: full strength at
/// the center, smoothstepped to zero at the radius.
#[cfg(test)]
fn falloff(dist: f32, radius: f32) -> f32 {
    if dist >= radius {
        return 0.0;
    }
    let t = (dist / radius).clamp(0.0, 1.0);
    let s = t * t * (3.0 - 2.0 * t);
    1.0 - s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(seq: u64, target: u64, center: Vec3, radius: f32, op: EditOp) -> EditCommand {
        EditCommand {
            seq,
            center,
            radius,
            op,
            target,
            queued_at: 0,
        }
    }

    #[test]
    fn batch_bounds_matches_single_add() {
        // add at (10,0,10) radius 2 -> min (8,-2,8), max (12,2,12).
        let batch = [cmd(0, 7, Vec3::new(10.0, 0.0, 10.0), 2.0, EditOp::Add)];
        let b = batch_bounds(&batch);
        assert_eq!(b.min, Vec3::new(8.0, -2.0, 8.0));
        assert_eq!(b.max, Vec3::new(12.0, 2.0, 12.0));
    }

    #[test]
    fn sequential_edits_merge_into_one_batch() {
        // add r=2 at origin then remove r=1 at (1,0,0): one group (so one
        // remesh), one merged bounds spanning both spheres.
        let batch = vec![
            cmd(0, 7, Vec3::ZERO, 2.0, EditOp::Add),
            cmd(1, 7, Vec3::new(1.0, 0.0, 0.0), 1.0, EditOp::Remove),
        ];
        let groups = group_by_chunk(batch);
        assert_eq!(groups.len(), 1);
        let b = batch_bounds(&groups[0].1);
        assert_eq!(b.min, Vec3::splat(-2.0));
        assert_eq!(b.max, Vec3::new(2.0, 2.0, 2.0));
        for (c, r) in [(Vec3::ZERO, 2.0), (Vec3::new(1.0, 0.0, 0.0), 1.0)] {
            assert!(b.contains_sphere(c, r));
        }
    }

    #[test]
    fn cross_chunk_batches_split_per_chunk() {
        let batch = vec![
            cmd(0, 1, Vec3::ZERO, 1.0, EditOp::Add),
            cmd(1, 2, Vec3::new(40.0, 0.0, 0.0), 1.0, EditOp::Add),
            cmd(2, 1, Vec3::new(2.0, 0.0, 0.0), 1.0, EditOp::Remove),
        ];
        let groups = group_by_chunk(batch);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, 1);
        assert_eq!(groups[0].1.len(), 2);
        // Order inside a group follows queue order.
        assert!(groups[0].1[0].seq < groups[0].1[1].seq);
        assert_eq!(groups[1].0, 2);
    }

    #[test]
    fn empty_batch_has_empty_bounds() {
        assert!(batch_bounds(&[]).is_empty());
    }

    #[test]
    fn falloff_is_soft_and_bounded() {
        assert_eq!(falloff(0.0, 2.0), 1.0);
        assert_eq!(falloff(2.0, 2.0), 0.0);
        assert_eq!(falloff(3.0, 2.0), 0.0);
        let mid = falloff(1.0, 2.0);
        assert!(mid > 0.0 && mid < 1.0);
        // Monotonically decreasing.
        let mut last = 1.0f32;
        for i in 0..=20 {
            let v = falloff(i as f32 * 0.1, 2.0);
            assert!(v <= last + 1e-6);
            last = v;
        }
    }
}

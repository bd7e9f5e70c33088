//! Non-blocking GPU-to-CPU readbacks.
//!
//! Copies into pooled MAP_READ staging buffers are encoded inside the frame
//! encoder; mapping is requested right after the frame submit and completion
//! arrives over a channel that the render loop drains on later frames. The
//! loop itself never awaits a readback.

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::constants::{MESHLETS_PER_CHUNK, READBACK_POOL_SIZE};
use crate::core::chunk::Chunk;

/// Cull results observed on the CPU: stale by one or more frames, used for
/// statistics only. Rendering correctness never depends on these.
#[derive(Clone, Debug)]
pub struct CullStats {
    pub key: u64,
    pub visible: u32,
    pub visible_meshlets: Vec<u32>,
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum SlotState {
    Idle,
    /// Copy encoded into the current frame's command buffer.
    Copied,
    /// map_async issued, waiting for the callback.
    InFlight,
}

struct Slot {
    staging: wgpu::Buffer,
    state: SlotState,
    key: u64,
}

pub struct CullReadbackPool {
    slots: Vec<Slot>,
    tx: Sender<(usize, bool)>,
    rx: Receiver<(usize, bool)>,
}

const SLOT_BYTES: u64 = 4 + MESHLETS_PER_CHUNK as u64 * 4;

impl CullReadbackPool {
    pub fn new(device: &wgpu::Device) -> Self {
        let slots = (0..READBACK_POOL_SIZE)
            .map(|i| Slot {
                staging: device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("Cull Readback Staging {i}")),
                    size: SLOT_BYTES,
                    usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                }),
                state: SlotState::Idle,
                key: 0,
            })
            .collect();
        let (tx, rx) = bounded(READBACK_POOL_SIZE);
        CullReadbackPool { slots, tx, rx }
    }

    /// Encode a counter + index-list copy for `chunk` into the shared frame
    /// encoder. Returns false when no staging slot is free; the chunk simply
    /// keeps its stale stats until a later interval.
    pub fn schedule_copy(&mut self, encoder: &mut wgpu::CommandEncoder, chunk: &Chunk) -> bool {
        let Some(idx) = self
            .slots
            .iter()
            .position(|s| s.state == SlotState::Idle)
        else {
            return false;
        };
        let slot = &mut self.slots[idx];
        encoder.copy_buffer_to_buffer(&chunk.buffers.visible_count, 0, &slot.staging, 0, 4);
        encoder.copy_buffer_to_buffer(
            &chunk.buffers.visible_indices,
            0,
            &slot.staging,
            4,
            MESHLETS_PER_CHUNK as u64 * 4,
        );
        slot.state = SlotState::Copied;
        slot.key = chunk.key;
        true
    }

    /// Flip every copied slot into an in-flight map. Called once per frame,
    /// immediately after the frame submit, so the map observes this frame's
    /// copy.
    pub fn begin_maps(&mut self) {
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if slot.state != SlotState::Copied {
                continue;
            }
            slot.state = SlotState::InFlight;
            let tx = self.tx.clone();
            slot.staging
                .slice(..)
                .map_async(wgpu::MapMode::Read, move |result| {
                    let _ = tx.send((idx, result.is_ok()));
                });
        }
    }

    /// Collect completed readbacks. Non-blocking; results describe a frame
    /// at least one submission in the past.
    pub fn drain(&mut self) -> Vec<CullStats> {
        let mut out = Vec::new();
        while let Ok((idx, ok)) = self.rx.try_recv() {
            let slot = &mut self.slots[idx];
            if ok {
                let data = slot.staging.slice(..).get_mapped_range();
                let words: &[u32] = bytemuck::cast_slice(&data);
                let visible = words[0].min(MESHLETS_PER_CHUNK);
                out.push(CullStats {
                    key: slot.key,
                    visible,
                    visible_meshlets: words[1..1 + visible as usize].to_vec(),
                });
                drop(data);
                slot.staging.unmap();
            }
            slot.state = SlotState::Idle;
        }
        out
    }
}

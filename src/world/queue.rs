//! Generation task queue.
//!
//! Single-threaded: tasks are drained by the streamer's per-frame budget,
//! closest-first. Cancellation is plain removal; work for a task that never
//! left the queue was never submitted to the GPU, so nothing else is needed.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rustc_hash::FxHashSet;

use crate::core::grid::ChunkCoord;

#[derive(Clone, Debug)]
pub struct GenerationTask {
    pub key: u64,
    pub coord: ChunkCoord,
    pub lod: u8,
    /// Frame on which the task was enqueued.
    pub enqueued_at: u64,
    /// Squared distance to the camera cell at enqueue time; lower drains
    /// first.
    pub priority: i64,
}

impl PartialEq for GenerationTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.key == other.key
    }
}

impl Eq for GenerationTask {}

impl PartialOrd for GenerationTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GenerationTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want lowest priority value
        // (closest chunk) on top. Key breaks ties deterministically.
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.key.cmp(&self.key))
    }
}

#[derive(Default)]
pub struct GenerationQueue {
    heap: BinaryHeap<GenerationTask>,
    /// Keys queued or cancelled-but-still-in-heap; the heap entry of a
    /// cancelled key is skipped lazily on pop.
    queued: FxHashSet<u64>,
}

impl GenerationQueue {
    /// Enqueue a coordinate unless it is already pending.
    pub fn push(&mut self, coord: ChunkCoord, lod: u8, priority: i64, frame: u64) -> bool {
        let key = coord.key();
        if !self.queued.insert(key) {
            return false;
        }
        self.heap.push(GenerationTask {
            key,
            coord,
            lod,
            enqueued_at: frame,
            priority,
        });
        true
    }

    /// Pop the closest pending task, skipping cancelled entries.
    pub fn pop(&mut self) -> Option<GenerationTask> {
        while let Some(task) = self.heap.pop() {
            if self.queued.remove(&task.key) {
                return Some(task);
            }
            // Cancelled while queued: dropped without ever issuing GPU work.
        }
        None
    }

    pub fn contains(&self, key: u64) -> bool {
        self.queued.contains(&key)
    }

    /// Cancel a pending task. Heap cleanup is lazy.
    pub fn cancel(&mut self, key: u64) -> bool {
        self.queued.remove(&key)
    }

    /// Cancel every task whose coordinate fails `keep`.
    pub fn retain<F: Fn(&ChunkCoord) -> bool>(&mut self, keep: F) {
        let cancelled: Vec<u64> = self
            .heap
            .iter()
            .filter(|t| self.queued.contains(&t.key) && !keep(&t.coord))
            .map(|t| t.key)
            .collect();
        for key in cancelled {
            self.queued.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_closest_first() {
        let mut q = GenerationQueue::default();
        let center = ChunkCoord::new(0, 0, 0);
        for coord in [
            ChunkCoord::new(3, 0, 0),
            ChunkCoord::new(1, 0, 0),
            ChunkCoord::new(2, 2, 2),
            ChunkCoord::new(0, 1, 0),
        ] {
            q.push(coord, 0, center.distance_sq(&coord), 0);
        }
        let order: Vec<i64> = std::iter::from_fn(|| q.pop()).map(|t| t.priority).collect();
        assert_eq!(order, vec![1, 1, 9, 12]);
    }

    #[test]
    fn duplicate_pushes_are_ignored() {
        let mut q = GenerationQueue::default();
        let c = ChunkCoord::new(1, 2, 3);
        assert!(q.push(c, 0, 5, 0));
        assert!(!q.push(c, 0, 1, 1));
        assert_eq!(q.len(), 1);
        assert!(q.pop().is_some());
        assert!(q.pop().is_none());
    }

    #[test]
    fn cancelled_task_never_surfaces() {
        // A task queued for (5,0,5) and superseded by the camera moving out
        // of range is removed and never drained.
        let mut q = GenerationQueue::default();
        let c = ChunkCoord::new(5, 0, 5);
        q.push(c, 0, 50, 0);
        q.push(ChunkCoord::new(1, 0, 0), 0, 1, 0);
        assert!(q.cancel(c.key()));
        assert!(!q.contains(c.key()));
        let drained: Vec<u64> = std::iter::from_fn(|| q.pop()).map(|t| t.key).collect();
        assert!(!drained.contains(&c.key()));
        assert_eq!(drained.len(), 1);
    }

    #[test]
    fn retain_cancels_out_of_range() {
        let mut q = GenerationQueue::default();
        for x in 0..6 {
            let c = ChunkCoord::new(x, 0, 0);
            q.push(c, 0, x as i64, 0);
        }
        q.retain(|c| c.x < 3);
        assert_eq!(q.len(), 3);
        let drained: Vec<i32> = std::iter::from_fn(|| q.pop()).map(|t| t.coord.x).collect();
        assert_eq!(drained, vec![0, 1, 2]);
    }

    #[test]
    fn tasks_record_enqueue_frame_and_lod() {
        let mut q = GenerationQueue::default();
        q.push(ChunkCoord::new(0, 0, 0), 1, 0, 42);
        let t = q.pop().unwrap();
        assert_eq!(t.enqueued_at, 42);
        assert_eq!(t.lod, 1);
    }
}

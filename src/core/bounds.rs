//! Change-bounds accumulation for partial remeshing.
//!
//! Every edit folds its sphere's world-space AABB into a running accumulator.
//! After a batch the accumulator is converted to an inclusive chunk-local
//! cell range for the mesh stage; a degenerate conversion falls back to a
//! full-chunk remesh.

use glam::Vec3;

use crate::constants::CHUNK_SIZE;
use crate::core::grid::ChunkCoord;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ChangeBounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl ChangeBounds {
    /// The empty accumulator (inverted extremes).
    pub fn empty() -> Self {
        ChangeBounds {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Fold a sphere's AABB into the accumulator. Monotonic: the result
    /// always contains both the previous bounds and the sphere.
    pub fn include_sphere(&mut self, center: Vec3, radius: f32) {
        self.min = self.min.min(center - Vec3::splat(radius));
        self.max = self.max.max(center + Vec3::splat(radius));
    }

    pub fn union(&mut self, other: &ChangeBounds) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn contains_sphere(&self, center: Vec3, radius: f32) -> bool {
        let lo = center - Vec3::splat(radius);
        let hi = center + Vec3::splat(radius);
        self.min.cmple(lo).all() && self.max.cmpge(hi).all()
    }

    /// Convert to an inclusive cell range local to `chunk`, clamped to the
    /// grid. `None` signals a degenerate result (empty accumulator or a box
    /// entirely outside the chunk) and the caller must fall back to a
    /// full-chunk remesh.
    pub fn to_cell_range(&self, chunk: ChunkCoord) -> Option<CellRange> {
        if self.is_empty() {
            return None;
        }
        let origin = chunk.origin(CHUNK_SIZE);
        let size = Vec3::splat(CHUNK_SIZE as f32);
        if self.max.cmplt(origin).any() || self.min.cmpgt(origin + size).any() {
            return None;
        }
        let limit = (CHUNK_SIZE - 1) as i32;
        // Widen by one cell so surface interpolation at the region border
        // sees the edited samples.
        let min = ((self.min - origin).floor() - Vec3::ONE).as_ivec3();
        let max = ((self.max - origin).ceil() + Vec3::ONE).as_ivec3();
        let min = min.clamp(glam::IVec3::ZERO, glam::IVec3::splat(limit));
        let max = max.clamp(glam::IVec3::ZERO, glam::IVec3::splat(limit));
        if min.x > max.x || min.y > max.y || min.z > max.z {
            return None;
        }
        Some(CellRange {
            min: [min.x as u32, min.y as u32, min.z as u32],
            max: [max.x as u32, max.y as u32, max.z as u32],
        })
    }
}

/// Inclusive chunk-local cell range.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CellRange {
    pub min: [u32; 3],
    pub max: [u32; 3],
}

impl CellRange {
    pub fn full_chunk() -> Self {
        CellRange {
            min: [0, 0, 0],
            max: [CHUNK_SIZE - 1; 3],
        }
    }

    /// Cells covered per axis.
    pub fn extent(&self) -> [u32; 3] {
        [
            self.max[0] - self.min[0] + 1,
            self.max[1] - self.min[1] + 1,
            self.max[2] - self.min[2] + 1,
        ]
    }

    /// Meshlet range (inclusive) touched by this cell range.
    pub fn meshlet_range(&self, meshlet_size: u32) -> (glam::UVec3, glam::UVec3) {
        (
            glam::UVec3::new(
                self.min[0] / meshlet_size,
                self.min[1] / meshlet_size,
                self.min[2] / meshlet_size,
            ),
            glam::UVec3::new(
                self.max[0] / meshlet_size,
                self.max[1] / meshlet_size,
                self.max[2] / meshlet_size,
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_until_first_sphere() {
        let mut b = ChangeBounds::empty();
        assert!(b.is_empty());
        b.include_sphere(Vec3::new(10.0, 0.0, 10.0), 2.0);
        assert!(!b.is_empty());
        assert_eq!(b.min, Vec3::new(8.0, -2.0, 8.0));
        assert_eq!(b.max, Vec3::new(12.0, 2.0, 12.0));
    }

    #[test]
    fn expansion_is_monotonic_and_contains_every_sphere() {
        let spheres = [
            (Vec3::new(0.0, 0.0, 0.0), 2.0),
            (Vec3::new(1.0, 0.0, 0.0), 1.0),
            (Vec3::new(-4.0, 7.0, 3.0), 0.5),
        ];
        let mut b = ChangeBounds::empty();
        let mut prev = b;
        for (c, r) in spheres {
            b.include_sphere(c, r);
            if !prev.is_empty() {
                assert!(b.min.cmple(prev.min).all() && b.max.cmpge(prev.max).all());
            }
            prev = b;
        }
        for (c, r) in spheres {
            assert!(b.contains_sphere(c, r));
        }
    }

    #[test]
    fn two_edit_batch_merges_bounds() {
        // add r=2 at origin, then remove r=1 at (1,0,0): one merged box.
        let mut b = ChangeBounds::empty();
        b.include_sphere(Vec3::ZERO, 2.0);
        b.include_sphere(Vec3::new(1.0, 0.0, 0.0), 1.0);
        assert_eq!(b.min, Vec3::splat(-2.0));
        assert_eq!(b.max, Vec3::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn cell_range_clamps_to_chunk() {
        let mut b = ChangeBounds::empty();
        b.include_sphere(Vec3::new(10.0, 0.0, 10.0), 2.0);
        let range = b.to_cell_range(ChunkCoord::new(0, 0, 0)).unwrap();
        assert_eq!(range.min[1], 0); // clamped at the floor
        assert!(range.max.iter().all(|&m| m < CHUNK_SIZE));
        assert!(range.min[0] <= 7 && range.max[0] >= 13);
    }

    #[test]
    fn degenerate_bounds_fall_back() {
        assert_eq!(
            ChangeBounds::empty().to_cell_range(ChunkCoord::new(0, 0, 0)),
            None
        );
        // A box entirely outside the chunk degenerates too.
        let mut b = ChangeBounds::empty();
        b.include_sphere(Vec3::new(-500.0, 0.0, 0.0), 1.0);
        assert_eq!(b.to_cell_range(ChunkCoord::new(0, 0, 0)), None);
    }

    #[test]
    fn meshlet_range_covers_cells() {
        let range = CellRange {
            min: [6, 0, 15],
            max: [9, 3, 16],
        };
        assert_eq!(range.extent(), [4, 4, 2]);
        let (lo, hi) = range.meshlet_range(8);
        assert_eq!(lo, glam::UVec3::new(0, 0, 1));
        assert_eq!(hi, glam::UVec3::new(1, 0, 2));
    }

    #[test]
    fn full_chunk_range_spans_the_grid() {
        let full = CellRange::full_chunk();
        assert_eq!(full.extent(), [CHUNK_SIZE; 3]);
        let (lo, hi) = full.meshlet_range(8);
        assert_eq!(lo, glam::UVec3::ZERO);
        assert_eq!(hi, glam::UVec3::splat(CHUNK_SIZE / 8 - 1));
    }
}

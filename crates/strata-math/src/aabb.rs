use std::fmt;

use glam::IVec3;
use serde::{Deserialize, Serialize};

use crate::tile::{TILE_MASK, TILE_SHIFT, TileCoord};

/// Axis-aligned block box with inclusive bounds on every axis.
///
/// Invariant: min.x <= max.x, min.y <= max.y, min.z <= max.z.
/// The constructor enforces this by swapping components if needed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockBox {
    pub min: IVec3,
    pub max: IVec3,
}

impl BlockBox {
    /// Create a box from two corners. Automatically sorts
    /// components so that min <= max on every axis.
    pub fn new(a: IVec3, b: IVec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// The 16×16 footprint of a tile spanning `min_y..=max_y`.
    pub fn tile_footprint(tile: TileCoord, min_y: i32, max_y: i32) -> Self {
        Self::new(
            IVec3::new(tile.block_x(), min_y, tile.block_z()),
            IVec3::new(tile.block_x() + TILE_MASK, max_y, tile.block_z() + TILE_MASK),
        )
    }

    /// Returns true if the point lies inside or on the boundary.
    pub fn contains(&self, p: IVec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    /// Returns true if the column `(x, z)` lies inside or on the horizontal boundary.
    pub fn contains_xz(&self, x: i32, z: i32) -> bool {
        x >= self.min.x && x <= self.max.x && z >= self.min.z && z <= self.max.z
    }

    /// Returns true if the column lies strictly inside the horizontal extent.
    pub fn strictly_contains_xz(&self, x: i32, z: i32) -> bool {
        x > self.min.x && x < self.max.x && z > self.min.z && z < self.max.z
    }

    /// Returns true if this box overlaps `other` (touching faces count).
    pub fn intersects(&self, other: &BlockBox) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }

    /// Horizontal-only overlap test.
    pub fn intersects_xz(&self, other: &BlockBox) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Returns true if `other` lies entirely within `self` horizontally.
    pub fn encloses_xz(&self, other: &BlockBox) -> bool {
        self.contains_xz(other.min.x, other.min.z) && self.contains_xz(other.max.x, other.max.z)
    }

    /// Grows this box in place so that it also encloses `other`.
    pub fn encompass(&mut self, other: &BlockBox) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Moves the box by `offset`.
    pub fn translate(&mut self, offset: IVec3) {
        self.min += offset;
        self.max += offset;
    }

    /// Returns a copy expanded by `margin` on the four horizontal sides.
    pub fn expand_xz(&self, margin: i32) -> BlockBox {
        BlockBox {
            min: IVec3::new(self.min.x - margin, self.min.y, self.min.z - margin),
            max: IVec3::new(self.max.x + margin, self.max.y, self.max.z + margin),
        }
    }

    /// Returns the part of this box inside `other`, or `None` if they are disjoint.
    pub fn intersection(&self, other: &BlockBox) -> Option<BlockBox> {
        if !self.intersects(other) {
            return None;
        }
        Some(BlockBox {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        })
    }

    /// Clamps this box horizontally into `limit`, keeping the vertical extent.
    pub fn clamp_xz(&mut self, limit: &BlockBox) {
        self.min.x = self.min.x.clamp(limit.min.x, limit.max.x);
        self.max.x = self.max.x.clamp(limit.min.x, limit.max.x);
        self.min.z = self.min.z.clamp(limit.min.z, limit.max.z);
        self.max.z = self.max.z.clamp(limit.min.z, limit.max.z);
    }

    /// Extent along X, `max - min` (zero for a single-column box).
    pub fn x_span(&self) -> i32 {
        self.max.x - self.min.x
    }

    /// Extent along Z, `max - min`.
    pub fn z_span(&self) -> i32 {
        self.max.z - self.min.z
    }

    /// Number of block layers covered, `max - min + 1`.
    pub fn y_size(&self) -> i32 {
        self.max.y - self.min.y + 1
    }

    /// Horizontal center as `min + size / 2`, where `size` counts blocks.
    pub fn center_xz(&self) -> (f32, f32) {
        (
            self.min.x as f32 + (self.x_span() + 1) as f32 / 2.0,
            self.min.z as f32 + (self.z_span() + 1) as f32 / 2.0,
        )
    }

    /// Number of tiles touched along X and Z.
    pub fn size_in_tiles(&self) -> (i32, i32) {
        (
            (self.max.x >> TILE_SHIFT) - (self.min.x >> TILE_SHIFT) + 1,
            (self.max.z >> TILE_SHIFT) - (self.min.z >> TILE_SHIFT) + 1,
        )
    }
}

impl fmt::Display for BlockBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (sx, sz) = self.size_in_tiles();
        write!(
            f,
            "Bounds{{min=({}, {}, {}), max=({}, {}, {}), tiles={}x{}}}",
            self.min.x, self.min.y, self.min.z, self.max.x, self.max.y, self.max.z, sx, sz
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bx(a: (i32, i32, i32), b: (i32, i32, i32)) -> BlockBox {
        BlockBox::new(IVec3::new(a.0, a.1, a.2), IVec3::new(b.0, b.1, b.2))
    }

    #[test]
    fn test_constructor_auto_sorts() {
        let b = bx((10, 10, 10), (0, 0, 0));
        assert_eq!(b.min, IVec3::ZERO);
        assert_eq!(b.max, IVec3::splat(10));
    }

    #[test]
    fn test_contains_on_edge() {
        let b = bx((0, 0, 0), (10, 10, 10));
        assert!(b.contains(IVec3::ZERO));
        assert!(b.contains(IVec3::splat(10)));
        assert!(!b.contains(IVec3::new(11, 5, 5)));
    }

    #[test]
    fn test_strict_containment_excludes_border() {
        let b = bx((0, 0, 0), (4, 4, 4));
        assert!(b.strictly_contains_xz(2, 2));
        assert!(!b.strictly_contains_xz(0, 2));
        assert!(!b.strictly_contains_xz(2, 4));
    }

    #[test]
    fn test_intersects_touching() {
        let a = bx((0, 0, 0), (10, 10, 10));
        let b = bx((10, 0, 0), (20, 10, 10));
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        let c = bx((11, 0, 0), (20, 10, 10));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_encompass_grows() {
        let mut a = bx((0, 0, 0), (5, 5, 5));
        a.encompass(&bx((3, -2, 3), (10, 4, 12)));
        assert_eq!(a.min, IVec3::new(0, -2, 0));
        assert_eq!(a.max, IVec3::new(10, 5, 12));
    }

    #[test]
    fn test_translate() {
        let mut a = bx((0, 0, 0), (5, 5, 5));
        a.translate(IVec3::new(16, -1, -16));
        assert_eq!(a.min, IVec3::new(16, -1, -16));
        assert_eq!(a.max, IVec3::new(21, 4, -11));
    }

    #[test]
    fn test_tile_footprint() {
        let b = BlockBox::tile_footprint(TileCoord::new(1, -1), 0, 255);
        assert_eq!(b.min, IVec3::new(16, 0, -16));
        assert_eq!(b.max, IVec3::new(31, 255, -1));
        assert_eq!(b.size_in_tiles(), (1, 1));
    }

    #[test]
    fn test_expand_xz_keeps_height() {
        let b = bx((0, 3, 0), (15, 9, 15)).expand_xz(5);
        assert_eq!(b.min, IVec3::new(-5, 3, -5));
        assert_eq!(b.max, IVec3::new(20, 9, 20));
    }

    #[test]
    fn test_intersection() {
        let a = bx((0, 0, 0), (10, 10, 10));
        let b = bx((5, 5, 5), (15, 15, 15));
        assert_eq!(a.intersection(&b), Some(bx((5, 5, 5), (10, 10, 10))));
        assert_eq!(a.intersection(&bx((20, 0, 0), (30, 1, 1))), None);
    }

    #[test]
    fn test_clamp_xz() {
        let limit = bx((0, 0, 0), (31, 0, 31));
        let mut b = bx((-8, 2, 4), (40, 6, 20));
        b.clamp_xz(&limit);
        assert_eq!(b, bx((0, 2, 4), (31, 6, 20)));
    }

    #[test]
    fn test_center_xz() {
        let b = bx((0, 0, 0), (6, 0, 9));
        assert_eq!(b.center_xz(), (3.5, 5.0));
    }

    #[test]
    fn test_y_size_counts_layers() {
        assert_eq!(bx((0, 4, 0), (1, 8, 1)).y_size(), 5);
    }
}

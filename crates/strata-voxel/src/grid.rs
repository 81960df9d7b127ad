//! The [`WorldGrid`] interface and its in-memory implementation.
//!
//! `WorldGrid` is deliberately narrow: block reads and writes at absolute
//! coordinates, the vertical range, and column scans. Every method takes
//! `&self` so worker threads decorating different tiles can share one grid.

use std::hash::Hasher;

use dashmap::DashMap;
use glam::IVec3;
use rustc_hash::{FxBuildHasher, FxHasher};
use strata_math::{TILE_SHIFT, TileCoord};
use thiserror::Error;
use tracing::trace;

use crate::journal::{BlockChange, ChangeJournal};
use crate::registry::MaterialId;
use crate::section::{SECTION_SIZE, SectionData};

pub const DEFAULT_MIN_Y: i32 = 0;
pub const DEFAULT_MAX_Y: i32 = 255;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridError {
    #[error("y={y} is outside the world's vertical range [{min}, {max}]")]
    OutOfRange { y: i32, min: i32, max: i32 },
}

/// Read/write block access used by placement routines and terrain integration.
pub trait WorldGrid: Send + Sync {
    /// Lowest writable y (inclusive).
    fn min_y(&self) -> i32;

    /// Highest writable y (inclusive).
    fn max_y(&self) -> i32;

    /// Material at `pos`. Positions outside the vertical range read as air.
    fn block(&self, pos: IVec3) -> MaterialId;

    /// Writes a block, returning the material it replaced.
    fn set_block(&self, pos: IVec3, material: MaterialId) -> Result<MaterialId, GridError>;

    /// Highest y in the column whose material satisfies `pred`.
    fn top_matching(&self, x: i32, z: i32, pred: &dyn Fn(MaterialId) -> bool) -> Option<i32> {
        (self.min_y()..=self.max_y())
            .rev()
            .find(|&y| pred(self.block(IVec3::new(x, y, z))))
    }

    /// Highest non-air y in the column, or `min_y - 1` for an empty column.
    fn surface_height(&self, x: i32, z: i32) -> i32 {
        self.top_matching(x, z, &|m| !m.is_air())
            .unwrap_or(self.min_y() - 1)
    }

    fn in_range(&self, y: i32) -> bool {
        y >= self.min_y() && y <= self.max_y()
    }
}

type SectionKey = (i32, i32, i32);

/// Sparse section store keyed by section coordinates.
///
/// Sections are allocated on first non-air write. The optional journal
/// records every effective change.
#[derive(Debug)]
pub struct VoxelWorld {
    sections: DashMap<SectionKey, SectionData, FxBuildHasher>,
    min_y: i32,
    max_y: i32,
    journal: Option<ChangeJournal>,
}

impl VoxelWorld {
    pub fn new(min_y: i32, max_y: i32) -> Self {
        Self {
            sections: DashMap::with_hasher(FxBuildHasher),
            min_y: min_y.min(max_y),
            max_y: max_y.max(min_y),
            journal: None,
        }
    }

    /// Enables the block-change journal.
    pub fn with_journal(mut self) -> Self {
        self.journal = Some(ChangeJournal::new());
        self
    }

    pub fn journal(&self) -> Option<&ChangeJournal> {
        self.journal.as_ref()
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Order-independent digest of every stored block.
    pub fn content_hash(&self) -> u64 {
        self.hash_sections(|_| true)
    }

    /// Digest of the blocks in one tile's column only.
    pub fn tile_hash(&self, tile: TileCoord) -> u64 {
        self.hash_sections(|&(sx, _, sz)| sx == tile.x && sz == tile.z)
    }

    fn hash_sections(&self, filter: impl Fn(&SectionKey) -> bool) -> u64 {
        let mut keys: Vec<SectionKey> = self
            .sections
            .iter()
            .filter(|e| !e.value().is_empty() && filter(e.key()))
            .map(|e| *e.key())
            .collect();
        keys.sort_unstable();

        let mut hasher = FxHasher::default();
        for key in keys {
            let Some(section) = self.sections.get(&key) else {
                continue;
            };
            hasher.write_i32(key.0);
            hasher.write_i32(key.1);
            hasher.write_i32(key.2);
            for y in 0..SECTION_SIZE {
                for z in 0..SECTION_SIZE {
                    for x in 0..SECTION_SIZE {
                        hasher.write_u16(section.get(x, y, z).0);
                    }
                }
            }
        }
        hasher.finish()
    }

    fn split(pos: IVec3) -> (SectionKey, (usize, usize, usize)) {
        let key = (pos.x >> TILE_SHIFT, pos.y >> TILE_SHIFT, pos.z >> TILE_SHIFT);
        let mask = SECTION_SIZE as i32 - 1;
        let local = (
            (pos.x & mask) as usize,
            (pos.y & mask) as usize,
            (pos.z & mask) as usize,
        );
        (key, local)
    }
}

impl Default for VoxelWorld {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_Y, DEFAULT_MAX_Y)
    }
}

impl WorldGrid for VoxelWorld {
    fn min_y(&self) -> i32 {
        self.min_y
    }

    fn max_y(&self) -> i32 {
        self.max_y
    }

    fn block(&self, pos: IVec3) -> MaterialId {
        if !self.in_range(pos.y) {
            return MaterialId::AIR;
        }
        let (key, (x, y, z)) = Self::split(pos);
        self.sections
            .get(&key)
            .map_or(MaterialId::AIR, |s| s.get(x, y, z))
    }

    fn set_block(&self, pos: IVec3, material: MaterialId) -> Result<MaterialId, GridError> {
        if !self.in_range(pos.y) {
            return Err(GridError::OutOfRange {
                y: pos.y,
                min: self.min_y,
                max: self.max_y,
            });
        }
        let (key, (x, y, z)) = Self::split(pos);
        let old = if material.is_air() {
            match self.sections.get_mut(&key) {
                Some(mut section) => section.set(x, y, z, material),
                None => MaterialId::AIR,
            }
        } else {
            self.sections
                .entry(key)
                .or_insert_with(|| {
                    trace!(?key, "allocating section");
                    SectionData::default()
                })
                .set(x, y, z, material)
        };
        if old != material {
            if let Some(journal) = &self.journal {
                journal.record(BlockChange {
                    pos,
                    old,
                    new: material,
                });
            }
        }
        Ok(old)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STONE: MaterialId = MaterialId(1);
    const GRASS: MaterialId = MaterialId(2);

    #[test]
    fn test_unwritten_blocks_are_air() {
        let world = VoxelWorld::default();
        assert_eq!(world.block(IVec3::new(5, 64, -3)), MaterialId::AIR);
        assert_eq!(world.section_count(), 0);
    }

    #[test]
    fn test_negative_coordinates_round_trip() {
        let world = VoxelWorld::default();
        let pos = IVec3::new(-1, 10, -17);
        world.set_block(pos, STONE).unwrap();
        assert_eq!(world.block(pos), STONE);
        assert_eq!(world.block(IVec3::new(-2, 10, -17)), MaterialId::AIR);
    }

    #[test]
    fn test_out_of_range_write_rejected() {
        let world = VoxelWorld::new(0, 127);
        let err = world.set_block(IVec3::new(0, 128, 0), STONE).unwrap_err();
        assert_eq!(err, GridError::OutOfRange { y: 128, min: 0, max: 127 });
        assert_eq!(world.block(IVec3::new(0, -1, 0)), MaterialId::AIR);
    }

    #[test]
    fn test_air_write_does_not_allocate() {
        let world = VoxelWorld::default();
        world.set_block(IVec3::new(0, 0, 0), MaterialId::AIR).unwrap();
        assert_eq!(world.section_count(), 0);
    }

    #[test]
    fn test_surface_height_scans_down() {
        let world = VoxelWorld::default();
        assert_eq!(world.surface_height(0, 0), -1);
        for y in 0..=62 {
            world.set_block(IVec3::new(0, y, 0), STONE).unwrap();
        }
        world.set_block(IVec3::new(0, 63, 0), GRASS).unwrap();
        assert_eq!(world.surface_height(0, 0), 63);
        assert_eq!(world.top_matching(0, 0, &|m| m == STONE), Some(62));
    }

    #[test]
    fn test_journal_records_effective_changes_only() {
        let world = VoxelWorld::default().with_journal();
        let pos = IVec3::new(1, 2, 3);
        world.set_block(pos, STONE).unwrap();
        world.set_block(pos, STONE).unwrap();
        world.set_block(pos, MaterialId::AIR).unwrap();
        let changes = world.journal().unwrap().snapshot();
        assert_eq!(changes.len(), 2, "repeat write should not be journaled");
        assert_eq!(changes[1].old, STONE);
    }

    #[test]
    fn test_content_hash_independent_of_write_order() {
        let a = VoxelWorld::default();
        let b = VoxelWorld::default();
        let positions = [IVec3::new(0, 0, 0), IVec3::new(40, 70, -20), IVec3::new(-5, 3, 9)];
        for p in positions {
            a.set_block(p, STONE).unwrap();
        }
        for p in positions.iter().rev() {
            b.set_block(*p, STONE).unwrap();
        }
        assert_eq!(a.content_hash(), b.content_hash());
        b.set_block(IVec3::new(1, 1, 1), GRASS).unwrap();
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn test_tile_hash_ignores_other_tiles() {
        let a = VoxelWorld::default();
        let b = VoxelWorld::default();
        a.set_block(IVec3::new(3, 3, 3), STONE).unwrap();
        b.set_block(IVec3::new(3, 3, 3), STONE).unwrap();
        b.set_block(IVec3::new(20, 3, 3), STONE).unwrap();
        let tile = TileCoord::new(0, 0);
        assert_eq!(a.tile_hash(tile), b.tile_hash(tile));
    }
}

//! Finding structure starts and the pieces near a tile.
//!
//! Starts are pure functions of the world seed and their cell, so they are
//! computed on demand and cached per `(identity, seed, cell)`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use strata_math::{BlockBox, TILE_SIZE, TileCoord};
use tracing::{debug, warn};

use crate::biome::BiomeClassifier;
use crate::content::{ContentRegistry, StructurePiece, StructureStart, StructureType};
use crate::heightmap::HeightmapProvider;

type StartKey = (String, u64, i32, i32);

/// Cached starts kept before the cache is flushed.
pub const START_CACHE_LIMIT: usize = 1 << 14;

pub struct StructureLocator {
    search_radius: i32,
    registry: Arc<ContentRegistry>,
    classifier: Arc<dyn BiomeClassifier>,
    heights: Arc<dyn HeightmapProvider>,
    cache: DashMap<StartKey, Option<Arc<StructureStart>>>,
    cache_limit: usize,
}

impl StructureLocator {
    /// `search_radius` is how many tiles around a tile are searched for
    /// starts whose pieces may reach it.
    pub fn new(
        search_radius: i32,
        registry: Arc<ContentRegistry>,
        classifier: Arc<dyn BiomeClassifier>,
        heights: Arc<dyn HeightmapProvider>,
    ) -> Self {
        Self {
            search_radius: search_radius.max(0),
            registry,
            classifier,
            heights,
            cache: DashMap::new(),
            cache_limit: START_CACHE_LIMIT,
        }
    }

    pub fn with_cache_limit(mut self, limit: usize) -> Self {
        self.cache_limit = limit.max(1);
        self
    }

    pub fn search_radius(&self) -> i32 {
        self.search_radius
    }

    /// The start in spacing cell `(cell_x, cell_z)`, if the start tile's
    /// biome lists the structure and the layout is non-empty.
    pub fn start_in_cell(
        &self,
        structure: &dyn StructureType,
        world_seed: u64,
        cell_x: i32,
        cell_z: i32,
    ) -> Option<Arc<StructureStart>> {
        let key = (structure.identity().to_string(), world_seed, cell_x, cell_z);
        if let Some(hit) = self.cache.get(&key) {
            return hit.clone();
        }
        let start = self.compute_start(structure, world_seed, cell_x, cell_z);
        if self.cache.len() >= self.cache_limit {
            debug!(entries = self.cache.len(), "flushing structure start cache");
            self.cache.clear();
        }
        self.cache.insert(key, start.clone());
        start
    }

    fn compute_start(
        &self,
        structure: &dyn StructureType,
        world_seed: u64,
        cell_x: i32,
        cell_z: i32,
    ) -> Option<Arc<StructureStart>> {
        let tile = structure.spacing().start_in_cell(world_seed, cell_x, cell_z);
        let biome = self.classifier.classify(tile, TILE_SIZE / 2, TILE_SIZE / 2);
        if !self.registry.allows_structure(biome, structure.identity()) {
            return None;
        }
        let pieces = structure.layout(world_seed, tile, self.heights.as_ref());
        StructureStart::new(structure.identity(), tile, pieces).map(Arc::new)
    }

    /// Starts anchored within `radius` tiles of `tile`, in cell order.
    pub fn starts_near(
        &self,
        structure: &dyn StructureType,
        world_seed: u64,
        tile: TileCoord,
        radius: i32,
    ) -> Vec<Arc<StructureStart>> {
        let spacing = structure.spacing();
        let (min_cx, min_cz) = spacing.cell_of(tile.offset(-radius, -radius));
        let (max_cx, max_cz) = spacing.cell_of(tile.offset(radius, radius));
        let mut starts = Vec::new();
        for cz in min_cz..=max_cz {
            for cx in min_cx..=max_cx {
                if let Some(start) = self.start_in_cell(structure, world_seed, cx, cz) {
                    if start.tile.chebyshev_distance(tile) <= radius {
                        starts.push(start);
                    }
                }
            }
        }
        starts
    }

    /// Starts within the search radius whose bounds overlap `tile`.
    pub fn starts_intersecting(
        &self,
        structure: &dyn StructureType,
        world_seed: u64,
        tile: TileCoord,
    ) -> Vec<Arc<StructureStart>> {
        let footprint = BlockBox::tile_footprint(tile, 0, 0);
        self.starts_near(structure, world_seed, tile, self.search_radius)
            .into_iter()
            .filter(|start| start.bounds.intersects_xz(&footprint))
            .collect()
    }

    /// Spirals outward over spacing cells from `center`, ring by ring, and
    /// returns the closest start in the first ring that has one. Gives up
    /// after `max_rings` rings or once `timeout` elapses.
    pub fn find_nearest(
        &self,
        structure: &dyn StructureType,
        world_seed: u64,
        center: TileCoord,
        max_rings: i32,
        timeout: Duration,
    ) -> Option<Arc<StructureStart>> {
        let started = Instant::now();
        let (ccx, ccz) = structure.spacing().cell_of(center);
        for ring in 0..=max_rings.max(0) {
            if started.elapsed() > timeout {
                warn!(
                    structure = structure.identity(),
                    %center,
                    ring,
                    "structure search timed out after {}ms",
                    timeout.as_millis()
                );
                return None;
            }
            let best = ring_cells(ring)
                .filter_map(|(dx, dz)| self.start_in_cell(structure, world_seed, ccx + dx, ccz + dz))
                .min_by_key(|start| {
                    let (dx, dz) = (start.tile.x - center.x, start.tile.z - center.z);
                    (i64::from(dx) * i64::from(dx) + i64::from(dz) * i64::from(dz), start.tile.x, start.tile.z)
                });
            if let Some(best) = best {
                debug!(structure = structure.identity(), %center, found = %best.tile, ring, "located structure");
                return Some(best);
            }
        }
        None
    }

    /// Pieces of every registered structure that come within `blocks` of
    /// `tile` horizontally.
    pub fn pieces_near(&self, world_seed: u64, tile: TileCoord, blocks: i32) -> Vec<StructurePiece> {
        self.pieces_near_where(world_seed, tile, blocks, |_| true)
    }

    /// [`Self::pieces_near`] restricted to structures whose identity passes `keep`.
    pub fn pieces_near_where(
        &self,
        world_seed: u64,
        tile: TileCoord,
        blocks: i32,
        keep: impl Fn(&str) -> bool,
    ) -> Vec<StructurePiece> {
        let reach = BlockBox::tile_footprint(tile, 0, 0).expand_xz(blocks.max(0));
        let radius = self.search_radius + (blocks.max(0) + TILE_SIZE - 1) / TILE_SIZE;
        let mut pieces = Vec::new();
        for structure in self.registry.structures() {
            if !keep(structure.identity()) {
                continue;
            }
            for start in self.starts_near(structure.as_ref(), world_seed, tile, radius) {
                pieces.extend(
                    start
                        .pieces
                        .iter()
                        .filter(|p| p.bounds.intersects_xz(&reach))
                        .cloned(),
                );
            }
        }
        pieces
    }

    pub fn cached_starts(&self) -> usize {
        self.cache.len()
    }
}

/// Cell offsets on the square ring at Chebyshev distance `ring`.
fn ring_cells(ring: i32) -> impl Iterator<Item = (i32, i32)> {
    (-ring..=ring).flat_map(move |dz| {
        (-ring..=ring).filter_map(move |dx| (dx.abs() == ring || dz.abs() == ring).then_some((dx, dz)))
    })
}

#[cfg(test)]
mod tests {
    use strata_voxel::MaterialRegistry;

    use super::*;
    use crate::biome::{BiomeId, UniformBiome};
    use crate::content::StagedContent;
    use crate::heightmap::FlatHeightmap;
    use crate::stage::GenerationStage;
    use crate::structures::{StructureSpacing, SurfaceKind, SurfaceStructure};

    const SEED: u64 = 9;

    fn igloo() -> Arc<dyn StructureType> {
        Arc::new(
            SurfaceStructure::new(SurfaceKind::Igloo, &MaterialRegistry::with_defaults(), StructureSpacing::new(4, 1, 77)).unwrap(),
        )
    }

    fn locator(structure: &Arc<dyn StructureType>, biome_allows: bool) -> StructureLocator {
        let mut registry = ContentRegistry::default();
        let content = if biome_allows {
            StagedContent::new().with_structure(GenerationStage::SurfaceStructures, Arc::clone(structure))
        } else {
            StagedContent::new()
        };
        registry.insert(BiomeId(0), content);
        StructureLocator::new(
            1,
            Arc::new(registry),
            Arc::new(UniformBiome(BiomeId(0))),
            Arc::new(FlatHeightmap::new(64)),
        )
    }

    #[test]
    fn test_ring_cells() {
        assert_eq!(ring_cells(0).collect::<Vec<_>>(), vec![(0, 0)]);
        assert_eq!(ring_cells(1).count(), 8);
        assert_eq!(ring_cells(3).count(), 24);
    }

    #[test]
    fn test_start_is_cached_and_stable() {
        let s = igloo();
        let loc = locator(&s, true);
        let a = loc.start_in_cell(s.as_ref(), SEED, 2, -3).unwrap();
        let b = loc.start_in_cell(s.as_ref(), SEED, 2, -3).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(loc.cached_starts(), 1);
        assert_eq!(a.tile, s.spacing().start_in_cell(SEED, 2, -3));
    }

    #[test]
    fn test_start_cache_is_bounded() {
        let s = igloo();
        let loc = locator(&s, true).with_cache_limit(4);
        for cx in 0..10 {
            loc.start_in_cell(s.as_ref(), SEED, cx, 0);
            assert!(loc.cached_starts() <= 4, "cache grew to {}", loc.cached_starts());
        }
        // a flushed start is recomputed identically
        let again = loc.start_in_cell(s.as_ref(), SEED, 0, 0).unwrap();
        assert_eq!(again.tile, s.spacing().start_in_cell(SEED, 0, 0));
    }

    #[test]
    fn test_biome_gate_blocks_starts() {
        let s = igloo();
        let loc = locator(&s, false);
        assert!(loc.start_in_cell(s.as_ref(), SEED, 0, 0).is_none());
        assert!(loc.find_nearest(s.as_ref(), SEED, TileCoord::new(0, 0), 4, Duration::from_secs(5)).is_none());
    }

    #[test]
    fn test_start_tile_intersects_itself() {
        let s = igloo();
        let loc = locator(&s, true);
        let start = loc.start_in_cell(s.as_ref(), SEED, 1, 1).unwrap();
        let hits = loc.starts_intersecting(s.as_ref(), SEED, start.tile);
        assert!(hits.iter().any(|h| Arc::ptr_eq(h, &start)));
        // an igloo fits inside its start tile
        assert!(loc.starts_intersecting(s.as_ref(), SEED, start.tile.offset(1, 0)).iter().all(|h| h.tile != start.tile));
    }

    #[test]
    fn test_find_nearest_prefers_closest() {
        let s = igloo();
        let loc = locator(&s, true);
        let center = TileCoord::new(50, -20);
        let found = loc.find_nearest(s.as_ref(), SEED, center, 3, Duration::from_secs(5)).unwrap();
        let (ccx, ccz) = s.spacing().cell_of(center);
        let (fcx, fcz) = s.spacing().cell_of(found.tile);
        assert_eq!((fcx, fcz), (ccx, ccz), "every cell has a start, so the center cell wins");
    }

    #[test]
    fn test_find_nearest_times_out() {
        let s = igloo();
        let loc = locator(&s, false);
        assert!(loc.find_nearest(s.as_ref(), SEED, TileCoord::new(0, 0), 1_000, Duration::ZERO).is_none());
    }

    #[test]
    fn test_pieces_near_collects_within_reach() {
        let s = igloo();
        let loc = locator(&s, true);
        let start = loc.start_in_cell(s.as_ref(), SEED, 0, 0).unwrap();
        let near = loc.pieces_near(SEED, start.tile, 12);
        assert_eq!(near.len(), 1);
        let far = loc.pieces_near(SEED, start.tile.offset(6, 6), 0);
        assert!(far.iter().all(|p| !start.pieces.contains(p)));
    }

    #[test]
    fn test_pieces_near_where_skips_filtered_structures() {
        let s = igloo();
        let loc = locator(&s, true);
        let start = loc.start_in_cell(s.as_ref(), SEED, 0, 0).unwrap();
        let kept = loc.pieces_near_where(SEED, start.tile, 12, |id| id != s.identity());
        assert!(kept.is_empty(), "the only structure was filtered out");
    }
}

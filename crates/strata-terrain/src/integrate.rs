//! Terrain blending around placed structure pieces.
//!
//! Runs once per tile after decoration. Ground is raised toward the base of
//! every nearby piece with an eased falloff out to a per-piece border radius,
//! and columns inside the highest covering piece are cleared, with an
//! overhang cut that tapers away from the piece center and with depth.
//!
//! Pieces are searched around the tile but every write stays inside the
//! tile's own columns.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use glam::IVec3;
use rustc_hash::FxHashSet;
use strata_config::TerrainConfig;
use strata_math::{BlockBox, TileCoord};
use strata_voxel::{MaterialId, MaterialRegistry, MaterialRegistryError, WorldGrid};
use tracing::debug;

use crate::content::StructurePiece;
use crate::error::PlacementError;

pub const MIN_BORDER_RADIUS: i32 = 5;
pub const MAX_BORDER_RADIUS: i32 = 15;

/// Resolved [`TerrainConfig`].
#[derive(Clone, Debug)]
pub struct TerrainSettings {
    pub enabled: bool,
    /// Border radius as a fraction of a piece's shorter side.
    pub base_scale: f32,
    /// Maximum height of the overhang cut, in blocks.
    pub overhang: f32,
    /// How far outside the tile pieces are collected.
    pub piece_search_blocks: i32,
    pub fill: MaterialId,
    /// Natural terrain. Also what the surface scan looks for.
    pub carvable: FxHashSet<MaterialId>,
}

impl TerrainSettings {
    pub fn from_config(config: &TerrainConfig, materials: &MaterialRegistry) -> Result<Self, MaterialRegistryError> {
        let carvable = config
            .carvable
            .iter()
            .map(|name| materials.require(name))
            .collect::<Result<FxHashSet<_>, _>>()?;
        Ok(Self {
            enabled: config.enabled,
            base_scale: config.base_scale.max(0.0),
            overhang: config.overhang.max(0.0),
            piece_search_blocks: config.piece_search_blocks.max(0),
            fill: materials.require(&config.fill_material)?,
            carvable,
        })
    }
}

/// What one integration pass changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IntegrationStats {
    pub pieces_considered: usize,
    pub columns_raised: usize,
    pub blocks_filled: usize,
    pub columns_carved: usize,
    pub blocks_carved: usize,
}

/// `floor(v + 0.5)`.
fn round(v: f32) -> i32 {
    libm::floorf(v + 0.5) as i32
}

/// Blend radius around a piece: its shorter horizontal side scaled by
/// `base_scale`, clamped to `[5, 15]`.
pub fn border_radius(bounds: &BlockBox, base_scale: f32) -> i32 {
    let length = bounds.x_span().min(bounds.z_span());
    round(length as f32 * base_scale).clamp(MIN_BORDER_RADIUS, MAX_BORDER_RADIUS)
}

/// Squared distance from column `(x, z)` to the box's horizontal border over
/// the squared border radius: 0 on or inside the box, 1 at or past the
/// radius.
pub fn edge_distance_alpha(x: i32, z: i32, bounds: &BlockBox, border_radius: i32) -> f32 {
    let dx = if x < bounds.min.x {
        bounds.min.x - x
    } else if x > bounds.max.x {
        x - bounds.max.x
    } else {
        0
    };
    let dz = if z < bounds.min.z {
        bounds.min.z - z
    } else if z > bounds.max.z {
        z - bounds.max.z
    } else {
        0
    };
    let d2 = (dx * dx + dz * dz) as f32;
    let radius2 = ((border_radius * border_radius) as f32).max(1.0);
    if d2 == 0.0 {
        0.0
    } else if d2 > radius2 {
        1.0
    } else {
        d2 / radius2
    }
}

/// Surface pulled from `surface` toward `level`. The weight is
/// `d^(2 - d)` with `d = 1 - dist_alpha`, so it is 1 on the piece and eases
/// out to 0 at the border radius.
pub fn raise_level(surface: f32, level: f32, dist_alpha: f32) -> f32 {
    let d = 1.0 - dist_alpha.clamp(0.0, 1.0);
    let alpha = libm::powf(d, 2.0 - d);
    surface + (level - surface) * alpha
}

/// Squared horizontal distance from column `(x, z)` to the box center.
pub fn center_distance2(x: i32, z: i32, bounds: &BlockBox) -> f32 {
    let (cx, cz) = bounds.center_xz();
    let (dx, dz) = (cx - x as f32, cz - z as f32);
    dx * dx + dz * dz
}

/// Extra blocks cut above a buried piece. Shrinks with distance from the
/// piece center and with the depth of material overhead; never negative.
pub fn overhang_extension(center_dist2: f32, depth: f32, overhang: f32) -> i32 {
    if overhang <= 0.0 {
        return 0;
    }
    let dist_alpha = 1.0 - (center_dist2 / (overhang * overhang)).clamp(0.0, 1.0);
    let depth_alpha = 1.0 - (depth / overhang).clamp(0.0, 1.0);
    round(depth_alpha * dist_alpha * overhang)
}

struct Candidate<'p> {
    piece: &'p StructurePiece,
    border_radius: i32,
    level: i32,
}

pub struct TerrainIntegrator {
    settings: TerrainSettings,
    materials: Arc<MaterialRegistry>,
}

impl TerrainIntegrator {
    pub fn new(settings: TerrainSettings, materials: Arc<MaterialRegistry>) -> Self {
        Self { settings, materials }
    }

    pub fn from_config(config: &TerrainConfig, materials: Arc<MaterialRegistry>) -> Result<Self, MaterialRegistryError> {
        Ok(Self::new(TerrainSettings::from_config(config, &materials)?, materials))
    }

    pub fn settings(&self) -> &TerrainSettings {
        &self.settings
    }

    /// Blends the terrain of `tile` around `pieces`.
    ///
    /// Only pieces whose kind integrates with terrain and whose bounds,
    /// grown by their border radius, reach the tile are used. `abort` is
    /// polled once per column.
    pub fn integrate(
        &self,
        grid: &dyn WorldGrid,
        tile: TileCoord,
        pieces: &[StructurePiece],
        abort: Option<&AtomicBool>,
    ) -> Result<IntegrationStats, PlacementError> {
        let mut stats = IntegrationStats::default();
        if !self.settings.enabled {
            return Ok(stats);
        }
        let footprint = BlockBox::tile_footprint(tile, grid.min_y(), grid.max_y());
        let candidates = self.candidates(&footprint, pieces);
        stats.pieces_considered = candidates.len();
        if candidates.is_empty() {
            return Ok(stats);
        }

        for z in footprint.min.z..=footprint.max.z {
            for x in footprint.min.x..=footprint.max.x {
                if abort.is_some_and(|flag| flag.load(Ordering::Acquire)) {
                    return Err(PlacementError::Aborted);
                }
                self.integrate_column(grid, x, z, &candidates, &mut stats)?;
            }
        }

        debug!(
            %tile,
            pieces = stats.pieces_considered,
            filled = stats.blocks_filled,
            carved = stats.blocks_carved,
            "terrain integrated"
        );
        Ok(stats)
    }

    fn candidates<'p>(&self, footprint: &BlockBox, pieces: &'p [StructurePiece]) -> Vec<Candidate<'p>> {
        pieces
            .iter()
            .filter(|piece| piece.kind.integrates_with_terrain())
            .filter_map(|piece| {
                let border_radius = border_radius(&piece.bounds, self.settings.base_scale);
                piece.bounds.expand_xz(border_radius).intersects_xz(footprint).then(|| Candidate {
                    piece,
                    border_radius,
                    level: piece.bounds.min.y + piece.ground_level_delta,
                })
            })
            .collect()
    }

    fn integrate_column(
        &self,
        grid: &dyn WorldGrid,
        x: i32,
        z: i32,
        candidates: &[Candidate<'_>],
        stats: &mut IntegrationStats,
    ) -> Result<(), PlacementError> {
        let carvable = &self.settings.carvable;
        let Some(surface) = grid.top_matching(x, z, &|m| carvable.contains(&m)) else {
            return Ok(());
        };

        let mut y = surface as f32;
        let mut highest: Option<&Candidate<'_>> = None;
        for candidate in candidates {
            let bounds = &candidate.piece.bounds;
            if candidate.level as f32 > y {
                let dist_alpha = edge_distance_alpha(x, z, bounds, candidate.border_radius);
                y = raise_level(y, candidate.level as f32, dist_alpha);
            }
            if bounds.strictly_contains_xz(x, z) && highest.is_none_or(|h| bounds.min.y > h.piece.bounds.min.y) {
                highest = Some(candidate);
            }
        }

        let top = (libm::floorf(y) as i32).min(grid.max_y());
        if top > surface {
            let mut filled = 0;
            for fy in surface + 1..=top {
                let pos = IVec3::new(x, fy, z);
                if !self.materials.is_solid(grid.block(pos)) {
                    grid.set_block(pos, self.settings.fill)?;
                    filled += 1;
                }
            }
            stats.columns_raised += 1;
            stats.blocks_filled += filled;
        }

        if let Some(highest) = highest {
            let bounds = &highest.piece.bounds;
            let min_y = bounds.min.y + highest.piece.ground_level_delta;
            let mut max_y = min_y + bounds.y_size();
            if max_y <= surface {
                let depth = (surface - max_y) as f32;
                max_y += overhang_extension(center_distance2(x, z, bounds), depth, self.settings.overhang);
            }
            let mut carved = 0;
            for cy in min_y.max(grid.min_y())..=max_y.min(grid.max_y()) {
                let pos = IVec3::new(x, cy, z);
                if self.is_removable(grid.block(pos)) {
                    grid.set_block(pos, MaterialId::AIR)?;
                    carved += 1;
                }
            }
            if carved > 0 {
                stats.columns_carved += 1;
                stats.blocks_carved += carved;
            }
        }
        Ok(())
    }

    /// Carvable terrain, or loose non-fluid blocks such as plants.
    fn is_removable(&self, material: MaterialId) -> bool {
        if material.is_air() {
            return false;
        }
        self.settings.carvable.contains(&material)
            || self.materials.get(material).is_some_and(|def| !def.solid && !def.fluid)
    }
}

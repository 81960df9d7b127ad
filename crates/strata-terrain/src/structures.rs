//! Built-in structures and the spacing grid that anchors them.

use glam::IVec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use strata_math::{BlockBox, TILE_MASK, TILE_SIZE, TileCoord};
use strata_voxel::{MaterialId, MaterialRegistry, MaterialRegistryError};

use crate::bounds::RegionBoundsGuard;
use crate::content::{PieceKind, PlacementContext, Projection, StructurePiece, StructureStart, StructureType};
use crate::error::PlacementError;
use crate::heightmap::HeightmapProvider;
use crate::seed::derive_cell_seed;

const LAYOUT_SALT: u64 = 0x4C41_594F_5554;

/// Grid of `spacing × spacing` tile cells with at most one start per cell.
/// The start sits in the first `spacing - separation` tiles of its cell on
/// each axis, so starts in adjacent cells are at least `separation` apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StructureSpacing {
    pub spacing: i32,
    pub separation: i32,
    pub salt: u64,
}

impl StructureSpacing {
    pub fn new(spacing: i32, separation: i32, salt: u64) -> Self {
        let spacing = spacing.max(1);
        Self {
            spacing,
            separation: separation.clamp(0, spacing - 1),
            salt,
        }
    }

    pub fn cell_of(&self, tile: TileCoord) -> (i32, i32) {
        (tile.x.div_euclid(self.spacing), tile.z.div_euclid(self.spacing))
    }

    /// The start tile of a cell. Pure in `(world_seed, cell, salt)`.
    pub fn start_in_cell(&self, world_seed: u64, cell_x: i32, cell_z: i32) -> TileCoord {
        let mut rng = ChaCha8Rng::seed_from_u64(derive_cell_seed(world_seed, cell_x, cell_z, self.salt));
        let range = self.spacing - self.separation;
        TileCoord::new(
            cell_x * self.spacing + rng.random_range(0..range),
            cell_z * self.spacing + rng.random_range(0..range),
        )
    }

    pub fn is_start(&self, world_seed: u64, tile: TileCoord) -> bool {
        let (cx, cz) = self.cell_of(tile);
        self.start_in_cell(world_seed, cx, cz) == tile
    }
}

/// Single-piece surface structures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SurfaceKind {
    DesertPyramid,
    Igloo,
    JungleTemple,
    WitchHut,
}

impl SurfaceKind {
    pub fn identity(self) -> &'static str {
        match self {
            Self::DesertPyramid => "desert_pyramid",
            Self::Igloo => "igloo",
            Self::JungleTemple => "jungle_temple",
            Self::WitchHut => "witch_hut",
        }
    }

    /// Witch huts stand on stilts and are left alone.
    pub fn integrates_with_terrain(self) -> bool {
        !matches!(self, Self::WitchHut)
    }

    /// Width, height, depth in blocks.
    fn size(self) -> IVec3 {
        match self {
            Self::DesertPyramid => IVec3::new(21, 12, 21),
            Self::Igloo => IVec3::new(7, 5, 7),
            Self::JungleTemple => IVec3::new(12, 10, 15),
            Self::WitchHut => IVec3::new(7, 7, 9),
        }
    }

    /// How far the piece is sunk below the surface.
    fn sink(self) -> i32 {
        match self {
            Self::DesertPyramid => 3,
            Self::JungleTemple => 1,
            Self::Igloo | Self::WitchHut => 0,
        }
    }

    /// Floor, wall, roof material names.
    fn palette(self) -> [&'static str; 3] {
        match self {
            Self::DesertPyramid => ["cut_sandstone", "cut_sandstone", "cut_sandstone"],
            Self::Igloo => ["packed_snow", "packed_snow", "packed_ice"],
            Self::JungleTemple => ["cobblestone", "cobblestone", "cobblestone"],
            Self::WitchHut => ["oak_planks", "oak_planks", "oak_log"],
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct BoxPalette {
    floor: MaterialId,
    wall: MaterialId,
    roof: MaterialId,
}

impl BoxPalette {
    fn resolve(materials: &MaterialRegistry, [floor, wall, roof]: [&str; 3]) -> Result<Self, MaterialRegistryError> {
        Ok(Self {
            floor: materials.require(floor)?,
            wall: materials.require(wall)?,
            roof: materials.require(roof)?,
        })
    }
}

/// Writes a hollow box for `piece`, limited to the guard's current region.
fn build_box(
    ctx: &PlacementContext<'_>,
    guard: &RegionBoundsGuard,
    piece: &BlockBox,
    palette: BoxPalette,
) -> Result<(), PlacementError> {
    let Some(clip) = piece.intersection(guard.current()) else {
        return Ok(());
    };
    for y in clip.min.y..=clip.max.y {
        ctx.checkpoint()?;
        for z in clip.min.z..=clip.max.z {
            for x in clip.min.x..=clip.max.x {
                let pos = IVec3::new(x, y, z);
                let material = if y == piece.min.y {
                    palette.floor
                } else if y == piece.max.y {
                    palette.roof
                } else if x == piece.min.x || x == piece.max.x || z == piece.min.z || z == piece.max.z {
                    palette.wall
                } else {
                    MaterialId::AIR
                };
                if guard.permits(pos) {
                    ctx.set_block(pos, material)?;
                }
            }
        }
    }
    Ok(())
}

/// Hut, igloo, pyramid or temple: one box centered in the start tile.
#[derive(Clone, Debug)]
pub struct SurfaceStructure {
    kind: SurfaceKind,
    spacing: StructureSpacing,
    palette: BoxPalette,
}

impl SurfaceStructure {
    pub fn new(kind: SurfaceKind, materials: &MaterialRegistry, spacing: StructureSpacing) -> Result<Self, MaterialRegistryError> {
        Ok(Self {
            kind,
            spacing,
            palette: BoxPalette::resolve(materials, kind.palette())?,
        })
    }

    pub fn kind(&self) -> SurfaceKind {
        self.kind
    }
}

impl StructureType for SurfaceStructure {
    fn identity(&self) -> &str {
        self.kind.identity()
    }

    fn spacing(&self) -> StructureSpacing {
        self.spacing
    }

    fn layout(&self, _world_seed: u64, start: TileCoord, heights: &dyn HeightmapProvider) -> Vec<StructurePiece> {
        let size = self.kind.size();
        let surface = heights.surface_height(start, TILE_SIZE / 2, TILE_SIZE / 2);
        let min = IVec3::new(
            start.block_x() + (TILE_SIZE - size.x) / 2,
            surface + 1 - self.kind.sink(),
            start.block_z() + (TILE_SIZE - size.z) / 2,
        );
        vec![StructurePiece {
            kind: PieceKind::Surface(self.kind),
            bounds: BlockBox::new(min, min + size - IVec3::ONE),
            ground_level_delta: 0,
        }]
    }

    fn place(
        &self,
        ctx: &PlacementContext<'_>,
        start: &StructureStart,
        bounds: &mut RegionBoundsGuard,
        _rng: &mut ChaCha8Rng,
    ) -> Result<(), PlacementError> {
        for piece in &start.pieces {
            build_box(ctx, bounds, &piece.bounds, self.palette)?;
        }
        Ok(())
    }
}

/// A plaza of gravel with a handful of rigid houses around it.
#[derive(Clone, Debug)]
pub struct VillageStructure {
    spacing: StructureSpacing,
    house: BoxPalette,
    path: MaterialId,
}

impl VillageStructure {
    pub fn plains(materials: &MaterialRegistry) -> Result<Self, MaterialRegistryError> {
        Ok(Self {
            spacing: StructureSpacing::new(10, 3, 10_387_312),
            house: BoxPalette::resolve(materials, ["cobblestone", "oak_planks", "oak_log"])?,
            path: materials.require("gravel")?,
        })
    }

    fn surface_at(heights: &dyn HeightmapProvider, x: i32, z: i32) -> i32 {
        heights.surface_height(TileCoord::from_block(x, z), x & TILE_MASK, z & TILE_MASK)
    }

    fn place_path(&self, ctx: &PlacementContext<'_>, guard: &RegionBoundsGuard, piece: &BlockBox) -> Result<(), PlacementError> {
        let Some(clip) = piece.intersection(guard.current()) else {
            return Ok(());
        };
        for z in clip.min.z..=clip.max.z {
            for x in clip.min.x..=clip.max.x {
                let top = IVec3::new(x, ctx.surface_height(x, z), z);
                if guard.permits(top) && ctx.materials.is_solid(ctx.block(top)) {
                    ctx.set_block(top, self.path)?;
                }
            }
        }
        Ok(())
    }
}

impl StructureType for VillageStructure {
    fn identity(&self) -> &str {
        "village"
    }

    fn spacing(&self) -> StructureSpacing {
        self.spacing
    }

    /// Pieces stay within ten blocks (plus half a house) of the start
    /// tile's center, inside the start tile and its direct neighbours.
    fn layout(&self, world_seed: u64, start: TileCoord, heights: &dyn HeightmapProvider) -> Vec<StructurePiece> {
        let mut rng = ChaCha8Rng::seed_from_u64(derive_cell_seed(world_seed, start.x, start.z, self.spacing.salt ^ LAYOUT_SALT));
        let (cx, cz) = (start.block_x() + TILE_SIZE / 2, start.block_z() + TILE_SIZE / 2);

        let plaza_y = Self::surface_at(heights, cx, cz);
        let mut pieces = vec![StructurePiece {
            kind: PieceKind::Jigsaw {
                projection: Projection::TerrainMatching,
            },
            bounds: BlockBox::new(IVec3::new(cx - 2, plaza_y, cz - 2), IVec3::new(cx + 2, plaza_y, cz + 2)),
            ground_level_delta: 0,
        }];

        let houses = rng.random_range(3..=5);
        let mut attempts = 0;
        while pieces.len() <= houses && attempts < 16 {
            attempts += 1;
            let (dx, dz) = (rng.random_range(-10..=10), rng.random_range(-10..=10));
            let size = IVec3::new(rng.random_range(5..=7), rng.random_range(5..=6), rng.random_range(5..=7));
            let (hx, hz) = (cx + dx, cz + dz);
            let y = Self::surface_at(heights, hx, hz);
            let min = IVec3::new(hx - size.x / 2, y, hz - size.z / 2);
            let bounds = BlockBox::new(min, min + size - IVec3::ONE);
            if pieces.iter().any(|p| p.bounds.expand_xz(1).intersects_xz(&bounds)) {
                continue;
            }
            pieces.push(StructurePiece {
                kind: PieceKind::Jigsaw {
                    projection: Projection::Rigid,
                },
                bounds,
                ground_level_delta: 1,
            });
        }
        pieces
    }

    fn place(
        &self,
        ctx: &PlacementContext<'_>,
        start: &StructureStart,
        bounds: &mut RegionBoundsGuard,
        _rng: &mut ChaCha8Rng,
    ) -> Result<(), PlacementError> {
        for piece in &start.pieces {
            match piece.kind {
                PieceKind::Jigsaw {
                    projection: Projection::TerrainMatching,
                } => self.place_path(ctx, bounds, &piece.bounds)?,
                _ => build_box(ctx, bounds, &piece.bounds, self.house)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use strata_config::BoundsPolicy;
    use strata_voxel::{VoxelWorld, WorldGrid};

    use super::*;
    use crate::biome::BiomeId;
    use crate::heightmap::{FlatHeightmap, HeightmapParams, NoiseHeightmap};

    #[test]
    fn test_start_lies_in_cell_range() {
        let spacing = StructureSpacing::new(10, 3, 99);
        for cx in -5..5 {
            for cz in -5..5 {
                let start = spacing.start_in_cell(42, cx, cz);
                assert_eq!(spacing.cell_of(start), (cx, cz));
                assert!(start.x - cx * 10 < 7, "start {start} too deep in its cell");
                assert!(spacing.is_start(42, start));
            }
        }
    }

    #[test]
    fn test_start_is_seed_dependent() {
        let spacing = StructureSpacing::new(32, 8, 1);
        let a: Vec<_> = (0..16).map(|c| spacing.start_in_cell(1, c, 0)).collect();
        let b: Vec<_> = (0..16).map(|c| spacing.start_in_cell(2, c, 0)).collect();
        assert_ne!(a, b);
    }

    #[test]
    fn test_separation_is_clamped() {
        let spacing = StructureSpacing::new(4, 9, 0);
        assert_eq!(spacing.separation, 3);
        assert_eq!(StructureSpacing::new(0, 0, 0).spacing, 1);
    }

    #[test]
    fn test_village_layout_is_pure_and_local() {
        let materials = MaterialRegistry::with_defaults();
        let village = VillageStructure::plains(&materials).unwrap();
        let heights = NoiseHeightmap::new(HeightmapParams {
            seed: 5,
            ..HeightmapParams::default()
        });
        for seed in 0..20u64 {
            let start = TileCoord::new(seed as i32 - 10, 3);
            let a = village.layout(seed, start, &heights);
            let b = village.layout(seed, start, &heights);
            assert_eq!(a, b, "layout must be reproducible");
            assert!(a.len() >= 2, "plaza plus at least one house");
            let reach = BlockBox::new(
                start.offset(-1, -1).origin(0),
                start.offset(1, 1).origin(255) + IVec3::new(TILE_MASK, 0, TILE_MASK),
            );
            for piece in &a {
                assert!(reach.encloses_xz(&piece.bounds), "piece {} leaves the start neighbourhood", piece.bounds);
            }
        }
    }

    #[test]
    fn test_surface_structure_writes_only_inside_guard() {
        let materials = MaterialRegistry::with_defaults();
        let pyramid = SurfaceStructure::new(SurfaceKind::DesertPyramid, &materials, StructureSpacing::new(12, 4, 1)).unwrap();
        let heights = FlatHeightmap::new(64);
        let start_tile = TileCoord::new(0, 0);
        let start = StructureStart::new("desert_pyramid", start_tile, pyramid.layout(0, start_tile, &heights)).unwrap();
        assert!(start.bounds.min.x < 0, "a 21 wide pyramid overhangs its tile");

        let world = VoxelWorld::new(0, 255).with_journal();
        let ctx = PlacementContext::new(start_tile, 0, BiomeId(0), &world, &materials, &heights, 62);
        let mut guard = RegionBoundsGuard::new(start_tile, 1, 0, 255, BoundsPolicy::Log);
        guard.reset("desert_pyramid");
        pyramid
            .place(&ctx, &start, &mut guard, &mut ChaCha8Rng::seed_from_u64(0))
            .unwrap();

        let changes = world.journal().unwrap().snapshot();
        assert!(!changes.is_empty());
        let footprint = BlockBox::tile_footprint(start_tile, 0, 255);
        assert!(changes.iter().all(|c| footprint.contains(c.pos)));
        assert_eq!(world.block(IVec3::new(8, 62, 8)), materials.lookup("cut_sandstone").unwrap());
    }
}

//! Deterministic seed derivation for tile decoration.
//!
//! Every random stream used during decoration is a pure function of the world
//! seed, the tile coordinate, the stage ordinal and the item's position in
//! that stage. The mixing is splitmix64, written out here so results never
//! depend on the std hasher or the platform.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use strata_math::TileCoord;

use crate::stage::GenerationStage;

const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;
const MIX_A: u64 = 0xBF58_476D_1CE4_E5B9;
const MIX_B: u64 = 0x94D0_49BB_1331_11EB;

/// One splitmix64 step: advances by the golden gamma and finalizes.
#[inline]
pub fn mix64(mut z: u64) -> u64 {
    z = z.wrapping_add(GOLDEN_GAMMA);
    z = (z ^ (z >> 30)).wrapping_mul(MIX_A);
    z = (z ^ (z >> 27)).wrapping_mul(MIX_B);
    z ^ (z >> 31)
}

/// Base seed for a tile. Adjacent tiles land far apart in seed space.
pub fn derive_stage_seed(world_seed: u64, tile_x: i32, tile_z: i32) -> u64 {
    let mut h = mix64(world_seed);
    h = mix64(h ^ (tile_x as i64 as u64).wrapping_mul(MIX_A));
    mix64(h ^ (tile_z as i64 as u64).wrapping_mul(MIX_B))
}

/// Per-item seed within a stage.
pub fn derive_item_seed(base_seed: u64, item_index: u32, stage_ordinal: u32) -> u64 {
    let key = (u64::from(stage_ordinal) << 32) | u64::from(item_index);
    mix64(base_seed ^ mix64(key))
}

/// Seed for one cell of a structure spacing grid.
pub fn derive_cell_seed(world_seed: u64, cell_x: i32, cell_z: i32, salt: u64) -> u64 {
    mix64(derive_stage_seed(world_seed, cell_x, cell_z) ^ mix64(salt))
}

/// The random source for one tile's decoration pass.
///
/// Cheap to construct; holds only the tile's base seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeededStageRandom {
    base_seed: u64,
}

impl SeededStageRandom {
    pub fn new(world_seed: u64, tile: TileCoord) -> Self {
        Self {
            base_seed: derive_stage_seed(world_seed, tile.x, tile.z),
        }
    }

    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }

    pub fn item_seed(&self, item_index: u32, stage: GenerationStage) -> u64 {
        derive_item_seed(self.base_seed, item_index, stage.ordinal() as u32)
    }

    /// Fresh ChaCha8 stream for one item.
    pub fn item_rng(&self, item_index: u32, stage: GenerationStage) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.item_seed(item_index, stage))
    }
}

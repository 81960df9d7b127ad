//! Built-in features: surface patches and ore veins.

use glam::IVec3;
use noise::{NoiseFn, Simplex};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use strata_math::TILE_SIZE;
use strata_voxel::{MaterialId, MaterialRegistry, MaterialRegistryError};

use crate::content::{Feature, PlacementContext};
use crate::error::PlacementError;

/// Scatters a plant-like material on top of matching ground.
///
/// Columns are drawn from the tile only, so a patch never writes into a
/// neighbouring tile.
#[derive(Clone, Debug)]
pub struct PatchFeature {
    material: MaterialId,
    ground: Vec<MaterialId>,
    attempts: u32,
}

impl PatchFeature {
    pub fn new(material: MaterialId, ground: Vec<MaterialId>, attempts: u32) -> Self {
        Self {
            material,
            ground,
            attempts,
        }
    }

    pub fn material(&self) -> MaterialId {
        self.material
    }

    /// Local `(x, z)` columns tried, in order. Consumes `rng` exactly as
    /// [`Feature::place`] does.
    pub fn sample_columns(&self, rng: &mut ChaCha8Rng) -> Vec<(i32, i32)> {
        (0..self.attempts)
            .map(|_| (rng.random_range(0..TILE_SIZE), rng.random_range(0..TILE_SIZE)))
            .collect()
    }
}

impl Feature for PatchFeature {
    fn place(&self, ctx: &PlacementContext<'_>, origin: IVec3, rng: &mut ChaCha8Rng) -> Result<(), PlacementError> {
        for (lx, lz) in self.sample_columns(rng) {
            ctx.checkpoint()?;
            let (x, z) = (origin.x + lx, origin.z + lz);
            let y = ctx.surface_height(x, z);
            if y < ctx.grid.min_y() || y >= ctx.grid.max_y() {
                continue;
            }
            let ground = ctx.block(IVec3::new(x, y, z));
            if self.ground.contains(&ground) {
                ctx.set_block(IVec3::new(x, y + 1, z), self.material)?;
            }
        }
        Ok(())
    }
}

/// Configuration for a single ore type's underground distribution.
#[derive(Clone, Debug)]
pub struct OreDistribution {
    pub ore: MaterialId,
    /// Human-readable name for logging/debugging.
    pub name: String,
    /// Minimum depth below the column surface.
    pub min_depth: i32,
    /// Maximum depth below the column surface.
    pub max_depth: i32,
    /// Voxels where normalized noise exceeds this become ore. Higher is
    /// rarer. Range: \[0.0, 1.0\].
    pub noise_threshold: f64,
    /// Noise frequency. Smaller values give larger veins.
    pub vein_scale: f64,
    /// Decorrelates this ore's noise from the others.
    pub seed_offset: u64,
}

/// Coal, iron, gold and diamond, common and shallow to rare and deep.
pub fn default_ore_distributions(materials: &MaterialRegistry) -> Result<Vec<OreDistribution>, MaterialRegistryError> {
    let ore = |name: &str,
               min_depth: i32,
               max_depth: i32,
               noise_threshold: f64,
               vein_scale: f64,
               seed_offset: u64|
     -> Result<OreDistribution, MaterialRegistryError> {
        Ok(OreDistribution {
            ore: materials.require(&format!("{name}_ore"))?,
            name: name.to_string(),
            min_depth,
            max_depth,
            noise_threshold,
            vein_scale,
            seed_offset,
        })
    };
    Ok(vec![
        ore("coal", 3, 80, 0.75, 0.08, 0x0001)?,
        ore("iron", 5, 64, 0.80, 0.10, 0x0002)?,
        ore("gold", 30, 100, 0.90, 0.15, 0x0004)?,
        ore("diamond", 48, 120, 0.95, 0.20, 0x0005)?,
    ])
}

/// Replaces host rock with ore where per-ore 3D noise is high enough.
///
/// The noise is seeded from the world seed, so veins line up across tile
/// borders regardless of generation order.
#[derive(Clone, Debug)]
pub struct OreVeinFeature {
    ores: Vec<OreDistribution>,
    hosts: Vec<MaterialId>,
}

impl OreVeinFeature {
    pub fn new(ores: Vec<OreDistribution>, hosts: Vec<MaterialId>) -> Self {
        Self { ores, hosts }
    }

    pub fn ore_count(&self) -> usize {
        self.ores.len()
    }

    /// Which ore (if any) belongs at `pos`, `depth` blocks under the surface.
    /// First match wins.
    pub fn sample_ore(&self, noises: &[Simplex], pos: IVec3, depth: i32) -> Option<MaterialId> {
        let p = pos.as_dvec3();
        for (cfg, noise) in self.ores.iter().zip(noises) {
            if depth < cfg.min_depth || depth > cfg.max_depth {
                continue;
            }
            let value = noise.get((p * cfg.vein_scale).to_array());
            if (value + 1.0) * 0.5 > cfg.noise_threshold {
                return Some(cfg.ore);
            }
        }
        None
    }

    fn noises(&self, world_seed: u64) -> Vec<Simplex> {
        self.ores
            .iter()
            .map(|cfg| Simplex::new(world_seed.wrapping_add(cfg.seed_offset) as u32))
            .collect()
    }
}

impl Feature for OreVeinFeature {
    fn place(&self, ctx: &PlacementContext<'_>, origin: IVec3, _rng: &mut ChaCha8Rng) -> Result<(), PlacementError> {
        let noises = self.noises(ctx.world_seed);
        let deepest = self.ores.iter().map(|o| o.max_depth).max().unwrap_or(0);
        let min_y = ctx.grid.min_y();
        for lz in 0..TILE_SIZE {
            for lx in 0..TILE_SIZE {
                ctx.checkpoint()?;
                let (x, z) = (origin.x + lx, origin.z + lz);
                let surface = ctx.surface_height(x, z);
                let bottom = (surface - deepest).max(min_y);
                for y in bottom..surface {
                    let pos = IVec3::new(x, y, z);
                    if !self.hosts.contains(&ctx.block(pos)) {
                        continue;
                    }
                    if let Some(ore) = self.sample_ore(&noises, pos, surface - y) {
                        ctx.set_block(pos, ore)?;
                    }
                }
            }
        }
        Ok(())
    }
}

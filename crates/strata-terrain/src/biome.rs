//! Biomes: registry, Whittaker lookup, and the classifier interface the
//! decoration engine uses to pick a tile's content list.

use hashbrown::HashMap;
use noise::{NoiseFn, Simplex};
use serde::{Deserialize, Serialize};
use strata_math::TileCoord;
use strata_voxel::{MaterialId, MaterialRegistry};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BiomeId(pub u16);

/// Surface materials and climate for one biome.
#[derive(Clone, Debug)]
pub struct BiomeDef {
    pub name: String,
    /// Top block of each column.
    pub surface: MaterialId,
    /// The few blocks beneath the surface.
    pub subsurface: MaterialId,
}

#[derive(Debug, thiserror::Error)]
pub enum BiomeRegistryError {
    #[error("duplicate biome name: {0}")]
    DuplicateName(String),
}

pub struct BiomeRegistry {
    biomes: Vec<BiomeDef>,
    name_to_id: HashMap<String, BiomeId>,
}

impl BiomeRegistry {
    pub fn new() -> Self {
        Self {
            biomes: Vec::new(),
            name_to_id: HashMap::new(),
        }
    }

    /// The five biomes the built-in content is written against.
    pub fn overworld(materials: &MaterialRegistry) -> Self {
        let m = |name: &str| materials.lookup(name).unwrap_or(MaterialId::AIR);
        let mut registry = Self::new();
        let defs = [
            ("plains", "grass_block", "dirt"),
            ("forest", "grass_block", "dirt"),
            ("desert", "sand", "sandstone"),
            ("snowy_tundra", "snow_block", "dirt"),
            ("jungle", "grass_block", "dirt"),
        ];
        for (name, surface, subsurface) in defs {
            // names above are distinct
            let _ = registry.register(BiomeDef {
                name: name.to_string(),
                surface: m(surface),
                subsurface: m(subsurface),
            });
        }
        registry
    }

    pub fn register(&mut self, def: BiomeDef) -> Result<BiomeId, BiomeRegistryError> {
        if self.name_to_id.contains_key(&def.name) {
            return Err(BiomeRegistryError::DuplicateName(def.name.clone()));
        }
        let id = BiomeId(self.biomes.len() as u16);
        self.name_to_id.insert(def.name.clone(), id);
        self.biomes.push(def);
        Ok(id)
    }

    pub fn get(&self, id: BiomeId) -> Option<&BiomeDef> {
        self.biomes.get(id.0 as usize)
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<BiomeId> {
        self.name_to_id.get(name).copied()
    }

    pub fn name(&self, id: BiomeId) -> &str {
        self.get(id).map_or("unknown", |b| b.name.as_str())
    }

    pub fn ids(&self) -> impl Iterator<Item = BiomeId> + '_ {
        (0..self.biomes.len()).map(|i| BiomeId(i as u16))
    }

    pub fn len(&self) -> usize {
        self.biomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.biomes.is_empty()
    }
}

impl Default for BiomeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A rectangle in temperature/moisture space mapped to a biome.
#[derive(Clone, Debug)]
pub struct WhittakerRegion {
    pub temp_min: f64,
    pub temp_max: f64,
    pub moisture_min: f64,
    pub moisture_max: f64,
    pub biome_id: BiomeId,
}

/// Temperature/moisture lookup. First matching region wins.
#[derive(Clone, Debug)]
pub struct WhittakerDiagram {
    pub regions: Vec<WhittakerRegion>,
    pub fallback: BiomeId,
}

impl WhittakerDiagram {
    pub fn lookup(&self, temperature: f64, moisture: f64) -> BiomeId {
        self.regions
            .iter()
            .find(|r| {
                temperature >= r.temp_min
                    && temperature < r.temp_max
                    && moisture >= r.moisture_min
                    && moisture < r.moisture_max
            })
            .map_or(self.fallback, |r| r.biome_id)
    }

    /// Diagram over [`BiomeRegistry::overworld`] names. Missing names fall
    /// back to biome 0.
    pub fn overworld(biomes: &BiomeRegistry) -> Self {
        let id = |name: &str| biomes.lookup_by_name(name).unwrap_or_default();
        let region = |t0, t1, m0, m1, name| WhittakerRegion {
            temp_min: t0,
            temp_max: t1,
            moisture_min: m0,
            moisture_max: m1,
            biome_id: id(name),
        };
        Self {
            regions: vec![
                region(0.0, 0.3, 0.0, 1.01, "snowy_tundra"),
                region(0.7, 1.01, 0.0, 0.4, "desert"),
                region(0.7, 1.01, 0.4, 1.01, "jungle"),
                region(0.3, 0.7, 0.55, 1.01, "forest"),
            ],
            fallback: id("plains"),
        }
    }
}

/// Maps a block column to the biome that governs it.
pub trait BiomeClassifier: Send + Sync {
    fn classify(&self, tile: TileCoord, local_x: i32, local_z: i32) -> BiomeId;
}

/// Every column is the same biome.
#[derive(Clone, Copy, Debug)]
pub struct UniformBiome(pub BiomeId);

impl BiomeClassifier for UniformBiome {
    fn classify(&self, _tile: TileCoord, _local_x: i32, _local_z: i32) -> BiomeId {
        self.0
    }
}

/// Noise-driven temperature and moisture fed through a [`WhittakerDiagram`].
pub struct BiomeSampler {
    temp_noise: Simplex,
    moisture_noise: Simplex,
    diagram: WhittakerDiagram,
    pub temp_frequency: f64,
    pub moisture_frequency: f64,
}

impl BiomeSampler {
    pub fn new(seed: u64, diagram: WhittakerDiagram) -> Self {
        Self {
            temp_noise: Simplex::new(seed as u32),
            moisture_noise: Simplex::new(seed.wrapping_add(0xDEAD_BEEF) as u32),
            diagram,
            temp_frequency: 0.002,
            moisture_frequency: 0.0027,
        }
    }

    /// Temperature and moisture at a block column, each in `[0, 1]`.
    pub fn climate(&self, x: i32, z: i32) -> (f64, f64) {
        let (x, z) = (f64::from(x), f64::from(z));
        let t = self
            .temp_noise
            .get([x * self.temp_frequency, z * self.temp_frequency]);
        let m = self
            .moisture_noise
            .get([x * self.moisture_frequency, z * self.moisture_frequency]);
        (((t + 1.0) * 0.5).clamp(0.0, 1.0), ((m + 1.0) * 0.5).clamp(0.0, 1.0))
    }
}

impl BiomeClassifier for BiomeSampler {
    fn classify(&self, tile: TileCoord, local_x: i32, local_z: i32) -> BiomeId {
        let (t, m) = self.climate(tile.block_x() + local_x, tile.block_z() + local_z);
        self.diagram.lookup(t, m)
    }
}

//! Material registry: maps compact [`MaterialId`] values to [`MaterialDef`] metadata.
//!
//! Air is always id 0 so that freshly allocated sections read as empty.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Compact material identifier stored per block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MaterialId(pub u16);

impl MaterialId {
    pub const AIR: MaterialId = MaterialId(0);

    pub fn is_air(self) -> bool {
        self.0 == 0
    }
}

/// Descriptor for one material.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaterialDef {
    /// Registry name, e.g. `"stone"` or `"grass_block"`.
    pub name: String,
    /// Whether the block counts toward the surface heightmap.
    pub solid: bool,
    /// Whether the block is a fluid (water, lava).
    pub fluid: bool,
}

impl MaterialDef {
    pub fn solid(name: &str) -> Self {
        Self {
            name: name.to_string(),
            solid: true,
            fluid: false,
        }
    }

    pub fn non_solid(name: &str) -> Self {
        Self {
            name: name.to_string(),
            solid: false,
            fluid: false,
        }
    }

    pub fn fluid(name: &str) -> Self {
        Self {
            name: name.to_string(),
            solid: false,
            fluid: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum MaterialRegistryError {
    #[error("duplicate material name: {0}")]
    DuplicateName(String),
    #[error("material registry is full (max 65536 materials)")]
    RegistryFull,
    #[error("unknown material: {0}")]
    Unknown(String),
}

/// Dense id → definition table with reverse lookup by name.
#[derive(Clone, Debug)]
pub struct MaterialRegistry {
    materials: Vec<MaterialDef>,
    by_name: FxHashMap<String, MaterialId>,
}

impl MaterialRegistry {
    /// Creates a registry containing only air.
    pub fn new() -> Self {
        let mut by_name = FxHashMap::default();
        by_name.insert("air".to_string(), MaterialId::AIR);
        Self {
            materials: vec![MaterialDef::non_solid("air")],
            by_name,
        }
    }

    /// Registry pre-populated with the materials the built-in content uses.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let defaults = [
            MaterialDef::solid("stone"),
            MaterialDef::solid("dirt"),
            MaterialDef::solid("grass_block"),
            MaterialDef::solid("sand"),
            MaterialDef::solid("sandstone"),
            MaterialDef::solid("gravel"),
            MaterialDef::solid("snow_block"),
            MaterialDef::solid("ice"),
            MaterialDef::fluid("water"),
            MaterialDef::non_solid("grass"),
            MaterialDef::non_solid("fern"),
            MaterialDef::non_solid("dead_bush"),
            MaterialDef::solid("coal_ore"),
            MaterialDef::solid("iron_ore"),
            MaterialDef::solid("gold_ore"),
            MaterialDef::solid("diamond_ore"),
            MaterialDef::solid("cobblestone"),
            MaterialDef::solid("oak_planks"),
            MaterialDef::solid("oak_log"),
            MaterialDef::solid("packed_snow"),
            MaterialDef::solid("packed_ice"),
            MaterialDef::solid("cut_sandstone"),
        ];
        for def in defaults {
            // names above are unique and far below the id limit
            let _ = registry.register(def);
        }
        registry
    }

    /// Registers a material and returns its id. Ids are handed out in order.
    pub fn register(&mut self, def: MaterialDef) -> Result<MaterialId, MaterialRegistryError> {
        if self.by_name.contains_key(&def.name) {
            return Err(MaterialRegistryError::DuplicateName(def.name));
        }
        let id = u16::try_from(self.materials.len())
            .map_err(|_| MaterialRegistryError::RegistryFull)?;
        let id = MaterialId(id);
        self.by_name.insert(def.name.clone(), id);
        self.materials.push(def);
        Ok(id)
    }

    pub fn get(&self, id: MaterialId) -> Option<&MaterialDef> {
        self.materials.get(id.0 as usize)
    }

    pub fn lookup(&self, name: &str) -> Option<MaterialId> {
        self.by_name.get(name).copied()
    }

    /// Like [`lookup`](Self::lookup) but reports a missing name as an error.
    pub fn require(&self, name: &str) -> Result<MaterialId, MaterialRegistryError> {
        self.lookup(name)
            .ok_or_else(|| MaterialRegistryError::Unknown(name.to_string()))
    }

    /// Name of a material, `"unknown"` for ids this registry never issued.
    pub fn name(&self, id: MaterialId) -> &str {
        self.get(id).map_or("unknown", |d| d.name.as_str())
    }

    pub fn is_solid(&self, id: MaterialId) -> bool {
        self.get(id).is_some_and(|d| d.solid)
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    /// `true` when only air is registered.
    pub fn is_empty(&self) -> bool {
        self.materials.len() <= 1
    }
}

impl Default for MaterialRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_air_is_id_zero() {
        let registry = MaterialRegistry::new();
        assert_eq!(registry.lookup("air"), Some(MaterialId::AIR));
        assert!(!registry.is_solid(MaterialId::AIR));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_sequential_ids() {
        let mut registry = MaterialRegistry::new();
        let a = registry.register(MaterialDef::solid("basalt")).unwrap();
        let b = registry.register(MaterialDef::solid("tuff")).unwrap();
        assert_eq!(a, MaterialId(1));
        assert_eq!(b, MaterialId(2));
        assert_eq!(registry.name(b), "tuff");
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = MaterialRegistry::with_defaults();
        let result = registry.register(MaterialDef::solid("stone"));
        assert!(matches!(result, Err(MaterialRegistryError::DuplicateName(_))));
    }

    #[test]
    fn test_defaults_cover_builtin_content() {
        let registry = MaterialRegistry::with_defaults();
        for name in ["stone", "dirt", "grass_block", "grass", "water", "iron_ore", "cobblestone"] {
            assert!(registry.lookup(name).is_some(), "missing default material {name}");
        }
        assert!(registry.is_solid(registry.lookup("stone").unwrap()));
        assert!(!registry.is_solid(registry.lookup("grass").unwrap()));
    }

    #[test]
    fn test_require_unknown() {
        let registry = MaterialRegistry::with_defaults();
        assert!(matches!(
            registry.require("unobtainium"),
            Err(MaterialRegistryError::Unknown(_))
        ));
        assert_eq!(registry.name(MaterialId(9999)), "unknown");
    }
}

//! Palette-compressed storage for one 16×16×16 section of a tile column.
//!
//! A section keeps a local palette of distinct [`MaterialId`]s plus packed
//! indices into it. Uniform sections (all stone, all air) carry no index
//! storage at all.

use serde::{Deserialize, Serialize};

use crate::bit_packed::PackedIndices;
use crate::registry::MaterialId;

/// Side length of a section in blocks. Matches the tile width.
pub const SECTION_SIZE: usize = 16;

/// Blocks per section (16³).
pub const SECTION_VOLUME: usize = SECTION_SIZE * SECTION_SIZE * SECTION_SIZE;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionData {
    palette: Vec<MaterialId>,
    indices: PackedIndices,
}

impl SectionData {
    /// A section filled with one material.
    pub fn uniform(material: MaterialId) -> Self {
        Self {
            palette: vec![material],
            indices: PackedIndices::new(0, SECTION_VOLUME),
        }
    }

    pub fn air() -> Self {
        Self::uniform(MaterialId::AIR)
    }

    pub fn get(&self, x: usize, y: usize, z: usize) -> MaterialId {
        let slot = self.indices.get(Self::index(x, y, z)) as usize;
        self.palette[slot]
    }

    /// Writes a block and returns the material it replaced.
    pub fn set(&mut self, x: usize, y: usize, z: usize, material: MaterialId) -> MaterialId {
        let index = Self::index(x, y, z);
        let previous = self.palette[self.indices.get(index) as usize];
        if previous == material {
            return previous;
        }
        let slot = self.slot_for(material);
        self.indices.set(index, slot);
        previous
    }

    /// `true` when every block holds the same material.
    pub fn is_uniform(&self) -> bool {
        self.indices.bits() == 0
    }

    pub fn is_empty(&self) -> bool {
        self.is_uniform() && self.palette[0].is_air()
    }

    pub fn palette(&self) -> &[MaterialId] {
        &self.palette
    }

    pub fn bits_per_block(&self) -> u8 {
        self.indices.bits()
    }

    pub fn storage_bytes(&self) -> usize {
        self.indices.storage_bytes()
    }

    /// Drops palette entries no block references and narrows the index
    /// width to match. Scans the whole section.
    pub fn compact(&mut self) {
        if self.is_uniform() {
            return;
        }
        let mut used = vec![false; self.palette.len()];
        for i in 0..SECTION_VOLUME {
            used[self.indices.get(i) as usize] = true;
        }

        let mut remap = vec![0u16; self.palette.len()];
        let mut palette = Vec::new();
        for (old, in_use) in used.iter().enumerate() {
            if *in_use {
                remap[old] = palette.len() as u16;
                palette.push(self.palette[old]);
            }
        }
        if palette.len() == self.palette.len() {
            return;
        }

        let bits = PackedIndices::width_for(palette.len());
        self.indices = self.indices.repacked(bits, |old| remap[old as usize]);
        self.palette = palette;
    }

    fn slot_for(&mut self, material: MaterialId) -> u16 {
        if let Some(slot) = self.palette.iter().position(|&m| m == material) {
            return slot as u16;
        }
        let bits = PackedIndices::width_for(self.palette.len() + 1);
        if bits != self.indices.bits() {
            self.indices = self.indices.repacked(bits, |old| old);
        }
        self.palette.push(material);
        (self.palette.len() - 1) as u16
    }

    /// Linear index with x fastest, then z, then y.
    fn index(x: usize, y: usize, z: usize) -> usize {
        debug_assert!(x < SECTION_SIZE && y < SECTION_SIZE && z < SECTION_SIZE);
        x + z * SECTION_SIZE + y * SECTION_SIZE * SECTION_SIZE
    }
}

impl Default for SectionData {
    fn default() -> Self {
        Self::air()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STONE: MaterialId = MaterialId(1);
    const DIRT: MaterialId = MaterialId(2);

    #[test]
    fn test_air_section_is_uniform() {
        let section = SectionData::air();
        assert!(section.is_empty());
        assert_eq!(section.storage_bytes(), 0);
        assert_eq!(section.get(15, 15, 15), MaterialId::AIR);
    }

    #[test]
    fn test_set_returns_previous() {
        let mut section = SectionData::uniform(STONE);
        assert_eq!(section.set(3, 4, 5, DIRT), STONE);
        assert_eq!(section.set(3, 4, 5, MaterialId::AIR), DIRT);
        assert_eq!(section.get(3, 4, 5), MaterialId::AIR);
        assert_eq!(section.get(3, 4, 6), STONE);
    }

    #[test]
    fn test_same_material_write_keeps_uniform() {
        let mut section = SectionData::uniform(STONE);
        section.set(0, 0, 0, STONE);
        assert!(section.is_uniform());
        assert_eq!(section.palette().len(), 1);
    }

    #[test]
    fn test_width_grows_with_palette() {
        let mut section = SectionData::air();
        section.set(0, 0, 0, STONE);
        assert_eq!(section.bits_per_block(), 1);
        section.set(1, 0, 0, DIRT);
        assert_eq!(section.bits_per_block(), 2);
        for i in 3..=17u16 {
            section.set(i as usize % 16, 1, 0, MaterialId(i));
        }
        assert_eq!(section.bits_per_block(), 8);
        assert_eq!(section.get(0, 0, 0), STONE);
        assert_eq!(section.get(1, 0, 0), DIRT);
    }

    #[test]
    fn test_compact_collapses_to_uniform() {
        let mut section = SectionData::air();
        section.set(5, 5, 5, STONE);
        section.set(5, 5, 5, MaterialId::AIR);
        section.compact();
        assert!(section.is_empty(), "unused stone entry should be dropped");
    }

    #[test]
    fn test_every_block_addressable() {
        let mut section = SectionData::air();
        let materials = [MaterialId::AIR, STONE, DIRT];
        for y in 0..SECTION_SIZE {
            for z in 0..SECTION_SIZE {
                for x in 0..SECTION_SIZE {
                    section.set(x, y, z, materials[(x + y + z) % 3]);
                }
            }
        }
        for y in 0..SECTION_SIZE {
            for z in 0..SECTION_SIZE {
                for x in 0..SECTION_SIZE {
                    assert_eq!(section.get(x, y, z), materials[(x + y + z) % 3], "at ({x}, {y}, {z})");
                }
            }
        }
    }
}

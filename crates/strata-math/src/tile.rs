//! Tile coordinates: the 16×16 column grid that generation operates on.

use std::fmt;

use glam::IVec3;
use serde::{Deserialize, Serialize};

/// Side length of a tile in blocks.
pub const TILE_SIZE: i32 = 16;

/// `log2(TILE_SIZE)`, used to convert block coordinates to tile coordinates.
pub const TILE_SHIFT: i32 = 4;

/// Mask extracting the tile-local part of a block coordinate.
pub const TILE_MASK: i32 = TILE_SIZE - 1;

/// Identifies a tile in the world grid.
///
/// Tiles cover the full vertical extent of the world; only `x` and `z` are
/// needed to address one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    /// Tile-grid X coordinate.
    pub x: i32,
    /// Tile-grid Z coordinate.
    pub z: i32,
}

impl TileCoord {
    /// Creates a new tile coordinate.
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Returns the tile containing the given block column.
    pub const fn from_block(x: i32, z: i32) -> Self {
        Self {
            x: x >> TILE_SHIFT,
            z: z >> TILE_SHIFT,
        }
    }

    /// Block X of the tile's minimum corner.
    pub const fn block_x(self) -> i32 {
        self.x << TILE_SHIFT
    }

    /// Block Z of the tile's minimum corner.
    pub const fn block_z(self) -> i32 {
        self.z << TILE_SHIFT
    }

    /// Block-space origin of the tile at the given height.
    pub fn origin(self, y: i32) -> IVec3 {
        IVec3::new(self.block_x(), y, self.block_z())
    }

    /// Absolute block position of a tile-local column.
    pub fn block_pos(self, local_x: i32, y: i32, local_z: i32) -> IVec3 {
        IVec3::new(self.block_x() + local_x, y, self.block_z() + local_z)
    }

    /// Returns the tile offset by `(dx, dz)` tiles.
    pub const fn offset(self, dx: i32, dz: i32) -> Self {
        Self {
            x: self.x + dx,
            z: self.z + dz,
        }
    }

    /// Chebyshev distance in tiles.
    pub fn chebyshev_distance(self, other: Self) -> i32 {
        (self.x - other.x).abs().max((self.z - other.z).abs())
    }

    /// Iterates every tile within `radius` tiles of `self` (a square), row by row.
    pub fn neighborhood(self, radius: i32) -> impl Iterator<Item = TileCoord> {
        let radius = radius.max(0);
        (-radius..=radius)
            .flat_map(move |dz| (-radius..=radius).map(move |dx| self.offset(dx, dz)))
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.x, self.z)
    }
}

//! Integer block-space math for tile generation: tile coordinates and inclusive bounding boxes.

mod aabb;
mod tile;

pub use aabb::BlockBox;
pub use tile::{TILE_MASK, TILE_SHIFT, TILE_SIZE, TileCoord};

//! Error kinds for placement, decoration and content setup.
//!
//! Item-level failures ([`PlacementError`], collected as [`ItemFailure`]) are
//! recoverable and never stop the rest of a stage. A hang is a different kind
//! of thing and gets its own [`DecorationError::GenerationHang`] variant.

use std::fmt;

use strata_math::TileCoord;
use strata_voxel::{GridError, MaterialRegistryError};
use thiserror::Error;

use crate::stage::{GenerationStage, Phase};

/// Failure inside one structure or feature placement routine.
#[derive(Debug, Error)]
pub enum PlacementError {
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error("placement aborted by the generation watchdog")]
    Aborted,
    #[error("placement panicked: {0}")]
    Panicked(String),
    #[error("{0}")]
    Invalid(String),
}

impl PlacementError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

/// A failed item, tagged with where it ran.
#[derive(Debug)]
pub struct ItemFailure {
    pub stage: GenerationStage,
    pub phase: Phase,
    pub identity: String,
    pub error: PlacementError,
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} '{}' failed during {}: {}",
            self.phase, self.identity, self.stage, self.error
        )
    }
}

/// Tile-level decoration outcome when something went wrong.
#[derive(Debug, Error)]
pub enum DecorationError {
    /// One or more items failed; every other item in their stage still ran.
    #[error("decoration of tile {tile} failed in {stage}: {} item(s) failed", failures.len())]
    ItemsFailed {
        tile: TileCoord,
        stage: GenerationStage,
        failures: Vec<ItemFailure>,
    },
    /// The watchdog declared the tile hung; no further items ran.
    #[error("generation of tile {tile} hung in {phase} '{identity}' during {stage}")]
    GenerationHang {
        tile: TileCoord,
        stage: GenerationStage,
        phase: Phase,
        identity: String,
    },
}

impl DecorationError {
    pub fn tile(&self) -> TileCoord {
        match self {
            Self::ItemsFailed { tile, .. } | Self::GenerationHang { tile, .. } => *tile,
        }
    }

    pub fn is_hang(&self) -> bool {
        matches!(self, Self::GenerationHang { .. })
    }
}

/// Problems building the content registry from config.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error(transparent)]
    Material(#[from] MaterialRegistryError),
    #[error("unknown biome: {0}")]
    UnknownBiome(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_failure_display() {
        let failure = ItemFailure {
            stage: GenerationStage::VegetalDecoration,
            phase: Phase::Feature,
            identity: "patch_grass".into(),
            error: PlacementError::invalid("no ground"),
        };
        assert_eq!(
            failure.to_string(),
            "feature 'patch_grass' failed during vegetal_decoration: no ground"
        );
    }

    #[test]
    fn test_decoration_error_messages() {
        let err = DecorationError::ItemsFailed {
            tile: TileCoord::new(1, 2),
            stage: GenerationStage::Lakes,
            failures: Vec::new(),
        };
        assert!(err.to_string().contains("0 item(s) failed"));
        assert!(!err.is_hang());

        let hang = DecorationError::GenerationHang {
            tile: TileCoord::new(0, 0),
            stage: GenerationStage::SurfaceStructures,
            phase: Phase::Structure,
            identity: "village".into(),
        };
        assert!(hang.is_hang());
        assert!(hang.to_string().contains("structure 'village'"));
    }
}

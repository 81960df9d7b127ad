//! Staged tile decoration: seeded per-item randomness, a hang watchdog,
//! region-confined structure placement, and terrain blending around placed
//! structures.

mod bounds;
mod content;
mod crash;
mod decorate;
mod error;
mod features;
mod generation;
mod heightmap;
mod integrate;
mod locate;
mod seed;
mod stage;
mod structures;

pub mod biome;
pub mod watchdog;

pub use biome::{
    BiomeClassifier, BiomeDef, BiomeId, BiomeRegistry, BiomeRegistryError, BiomeSampler, UniformBiome,
    WhittakerDiagram, WhittakerRegion,
};
pub use bounds::{BoundsViolation, RegionBoundsGuard};
pub use content::{
    ContentIssue, ContentRegistry, Feature, FeatureDescriptor, PieceKind, PlacementContext, Precondition, Projection,
    StagedContent, StructurePiece, StructureStart, StructureType,
};
pub use crash::{
    CollectingCrashReporter, CrashCause, CrashReport, CrashReportError, CrashReporter, DiagnosticContext,
    FanoutCrashReporter, FileCrashReporter, LogCrashReporter,
};
pub use decorate::{DecorationEngine, DecorationReport, DecorationSettings, ItemOutcome, ItemRecord};
pub use error::{ContentError, DecorationError, ItemFailure, PlacementError};
pub use features::{OreDistribution, OreVeinFeature, PatchFeature, default_ore_distributions};
pub use generation::{BaseTerrain, GeneratedTile, GenerationTask, TileGenerator, TilePipeline, TileStatus};
pub use heightmap::{FlatHeightmap, HeightmapParams, HeightmapProvider, NoiseHeightmap, TerrainSample};
pub use integrate::{
    IntegrationStats, MAX_BORDER_RADIUS, MIN_BORDER_RADIUS, TerrainIntegrator, TerrainSettings, border_radius,
    center_distance2, edge_distance_alpha, overhang_extension, raise_level,
};
pub use locate::StructureLocator;
pub use seed::{SeededStageRandom, derive_cell_seed, derive_item_seed, derive_stage_seed, mix64};
pub use stage::{GenerationStage, Phase};
pub use structures::{StructureSpacing, SurfaceKind, SurfaceStructure, VillageStructure};
pub use watchdog::{DeadlineTimer, HANG_NOTICE_CAPACITY, HangNotice, SlowItem, TERRAIN_IDENTITY, Watchdog, WatchdogContext};

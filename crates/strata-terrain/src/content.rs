//! Decoration content: structure types, feature descriptors and the
//! per-biome registry that assigns them to stages.
//!
//! Content is built once and shared read-only (`Arc`) by every worker.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use glam::IVec3;
use hashbrown::{HashMap, HashSet};
use rand_chacha::ChaCha8Rng;
use strata_math::{BlockBox, TileCoord};
use strata_voxel::{MaterialId, MaterialRegistry, WorldGrid};
use tracing::warn;

use crate::biome::{BiomeId, BiomeRegistry};
use crate::bounds::RegionBoundsGuard;
use crate::error::{ContentError, PlacementError};
use crate::features::{OreVeinFeature, PatchFeature, default_ore_distributions};
use crate::heightmap::HeightmapProvider;
use crate::stage::{GenerationStage, Phase};
use crate::structures::{StructureSpacing, SurfaceKind, SurfaceStructure, VillageStructure};

/// Everything a placement routine may touch for one tile.
pub struct PlacementContext<'a> {
    pub tile: TileCoord,
    pub world_seed: u64,
    pub biome: BiomeId,
    pub grid: &'a dyn WorldGrid,
    pub materials: &'a MaterialRegistry,
    pub heights: &'a dyn HeightmapProvider,
    pub sea_level: i32,
    abort: Option<&'a AtomicBool>,
}

impl<'a> PlacementContext<'a> {
    pub fn new(
        tile: TileCoord,
        world_seed: u64,
        biome: BiomeId,
        grid: &'a dyn WorldGrid,
        materials: &'a MaterialRegistry,
        heights: &'a dyn HeightmapProvider,
        sea_level: i32,
    ) -> Self {
        Self {
            tile,
            world_seed,
            biome,
            grid,
            materials,
            heights,
            sea_level,
            abort: None,
        }
    }

    /// Attaches the watchdog's abort flag so [`checkpoint`](Self::checkpoint)
    /// can observe a hang.
    pub fn with_abort(mut self, flag: &'a AtomicBool) -> Self {
        self.abort = Some(flag);
        self
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_some_and(|f| f.load(Ordering::Acquire))
    }

    /// Long-running routines call this between units of work. Returns
    /// [`PlacementError::Aborted`] once the tile has been declared hung.
    pub fn checkpoint(&self) -> Result<(), PlacementError> {
        if self.is_aborted() {
            return Err(PlacementError::Aborted);
        }
        Ok(())
    }

    /// The tile's own columns over the grid's full height.
    pub fn footprint(&self) -> BlockBox {
        BlockBox::tile_footprint(self.tile, self.grid.min_y(), self.grid.max_y())
    }

    pub fn block(&self, pos: IVec3) -> MaterialId {
        self.grid.block(pos)
    }

    pub fn set_block(&self, pos: IVec3, material: MaterialId) -> Result<MaterialId, PlacementError> {
        Ok(self.grid.set_block(pos, material)?)
    }

    /// Highest non-air block in the column, or `min_y - 1`.
    pub fn surface_height(&self, x: i32, z: i32) -> i32 {
        self.grid.surface_height(x, z)
    }
}

/// Whether a piece is blended into the terrain after decoration, and how.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PieceKind {
    /// Piece of a jigsaw-assembled structure.
    Jigsaw { projection: Projection },
    /// Single-piece surface structure.
    Surface(SurfaceKind),
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Projection {
    /// Keeps its shape; terrain is built up around it.
    Rigid,
    /// Follows the terrain (paths, fields).
    TerrainMatching,
}

impl PieceKind {
    /// Rigid jigsaw pieces and the integrated surface kinds.
    pub fn integrates_with_terrain(self) -> bool {
        match self {
            Self::Jigsaw { projection } => projection == Projection::Rigid,
            Self::Surface(kind) => kind.integrates_with_terrain(),
            Self::Other => false,
        }
    }
}

/// One placed fragment of a structure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructurePiece {
    pub kind: PieceKind,
    pub bounds: BlockBox,
    /// Offset from `bounds.min.y` to the level the surrounding ground
    /// should reach.
    pub ground_level_delta: i32,
}

/// A structure instance anchored at one tile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructureStart {
    pub identity: String,
    pub tile: TileCoord,
    pub pieces: Vec<StructurePiece>,
    pub bounds: BlockBox,
}

impl StructureStart {
    /// Builds a start whose bounds enclose all `pieces`. `None` if empty.
    pub fn new(identity: &str, tile: TileCoord, pieces: Vec<StructurePiece>) -> Option<Self> {
        let first = pieces.first()?.bounds;
        let bounds = pieces.iter().fold(first, |mut acc, p| {
            acc.encompass(&p.bounds);
            acc
        });
        Some(Self {
            identity: identity.to_string(),
            tile,
            pieces,
            bounds,
        })
    }
}

pub trait StructureType: Send + Sync {
    fn identity(&self) -> &str;

    fn spacing(&self) -> StructureSpacing;

    /// Pieces for a start at `start`. Must be a pure function of its
    /// arguments so every worker agrees on the layout. An empty result
    /// means the start is not viable.
    fn layout(&self, world_seed: u64, start: TileCoord, heights: &dyn HeightmapProvider) -> Vec<StructurePiece>;

    /// Writes the part of `start` that falls inside `bounds`.
    fn place(
        &self,
        ctx: &PlacementContext<'_>,
        start: &StructureStart,
        bounds: &mut RegionBoundsGuard,
        rng: &mut ChaCha8Rng,
    ) -> Result<(), PlacementError>;
}

pub trait Feature: Send + Sync {
    /// Places the feature for the tile whose origin is `origin`.
    fn place(&self, ctx: &PlacementContext<'_>, origin: IVec3, rng: &mut ChaCha8Rng) -> Result<(), PlacementError>;
}

struct FnFeature<F>(F);

impl<F> Feature for FnFeature<F>
where
    F: Fn(&PlacementContext<'_>, IVec3, &mut ChaCha8Rng) -> Result<(), PlacementError> + Send + Sync,
{
    fn place(&self, ctx: &PlacementContext<'_>, origin: IVec3, rng: &mut ChaCha8Rng) -> Result<(), PlacementError> {
        (self.0)(ctx, origin, rng)
    }
}

type PredicateFn = dyn Fn(&PlacementContext<'_>) -> bool + Send + Sync;

/// Gate evaluated before a feature runs.
#[derive(Clone)]
pub struct Precondition(Arc<PredicateFn>);

impl Precondition {
    pub fn new(f: impl Fn(&PlacementContext<'_>) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn test(&self, ctx: &PlacementContext<'_>) -> bool {
        (self.0)(ctx)
    }

    /// Passes when the tile's biome is one of `biomes`.
    pub fn biome_in(biomes: impl IntoIterator<Item = BiomeId>) -> Self {
        let set: HashSet<BiomeId> = biomes.into_iter().collect();
        Self::new(move |ctx| set.contains(&ctx.biome))
    }

    /// Passes when the tile's center column is above sea level.
    pub fn above_sea_level() -> Self {
        Self::new(|ctx| ctx.heights.surface_height(ctx.tile, 8, 8) > ctx.sea_level)
    }
}

impl fmt::Debug for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Precondition(..)")
    }
}

/// A feature with its identity and optional gate.
#[derive(Clone)]
pub struct FeatureDescriptor {
    identity: String,
    feature: Arc<dyn Feature>,
    precondition: Option<Precondition>,
}

impl FeatureDescriptor {
    pub fn new(identity: impl Into<String>, feature: Arc<dyn Feature>) -> Self {
        Self {
            identity: identity.into(),
            feature,
            precondition: None,
        }
    }

    pub fn from_fn<F>(identity: impl Into<String>, f: F) -> Self
    where
        F: Fn(&PlacementContext<'_>, IVec3, &mut ChaCha8Rng) -> Result<(), PlacementError>
            + Send
            + Sync
            + 'static,
    {
        Self::new(identity, Arc::new(FnFeature(f)))
    }

    pub fn with_precondition(mut self, precondition: Precondition) -> Self {
        self.precondition = Some(precondition);
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn feature(&self) -> &dyn Feature {
        self.feature.as_ref()
    }

    /// `true` when there is no precondition or it passes.
    pub fn should_place(&self, ctx: &PlacementContext<'_>) -> bool {
        self.precondition.as_ref().is_none_or(|p| p.test(ctx))
    }
}

impl fmt::Debug for FeatureDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureDescriptor")
            .field("identity", &self.identity)
            .field("precondition", &self.precondition.is_some())
            .finish()
    }
}

/// Structures and features for each stage, in placement order.
#[derive(Clone, Default)]
pub struct StagedContent {
    structures: [Vec<Arc<dyn StructureType>>; GenerationStage::COUNT],
    features: [Vec<FeatureDescriptor>; GenerationStage::COUNT],
}

impl StagedContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_structure(&mut self, stage: GenerationStage, structure: Arc<dyn StructureType>) -> &mut Self {
        self.structures[stage.ordinal()].push(structure);
        self
    }

    pub fn add_feature(&mut self, stage: GenerationStage, feature: FeatureDescriptor) -> &mut Self {
        self.features[stage.ordinal()].push(feature);
        self
    }

    pub fn with_structure(mut self, stage: GenerationStage, structure: Arc<dyn StructureType>) -> Self {
        self.add_structure(stage, structure);
        self
    }

    pub fn with_feature(mut self, stage: GenerationStage, feature: FeatureDescriptor) -> Self {
        self.add_feature(stage, feature);
        self
    }

    pub fn structures(&self, stage: GenerationStage) -> &[Arc<dyn StructureType>] {
        &self.structures[stage.ordinal()]
    }

    pub fn features(&self, stage: GenerationStage) -> &[FeatureDescriptor] {
        &self.features[stage.ordinal()]
    }

    pub fn item_count(&self) -> usize {
        self.structures.iter().map(Vec::len).sum::<usize>() + self.features.iter().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.item_count() == 0
    }

    /// Every item as `(stage, phase, identity)` in execution order.
    pub fn items(&self) -> impl Iterator<Item = (GenerationStage, Phase, &str)> + '_ {
        GenerationStage::ALL.into_iter().flat_map(move |stage| {
            let structures = self
                .structures(stage)
                .iter()
                .map(move |s| (stage, Phase::Structure, s.identity()));
            let features = self
                .features(stage)
                .iter()
                .map(move |f| (stage, Phase::Feature, f.identity()));
            structures.chain(features)
        })
    }

    /// This content with every stage's structure list replaced by `lists`.
    fn with_structure_lists(&self, lists: &[Vec<Arc<dyn StructureType>>; GenerationStage::COUNT]) -> Self {
        Self {
            structures: lists.clone(),
            features: self.features.clone(),
        }
    }

    pub fn contains_structure(&self, identity: &str) -> bool {
        self.structures.iter().flatten().any(|s| s.identity() == identity)
    }
}

impl fmt::Debug for StagedContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items()).finish()
    }
}

/// A problem found by [`ContentRegistry::validate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentIssue {
    /// The same identity appears twice in one biome's stage list.
    DuplicateIdentity {
        biome: Option<BiomeId>,
        stage: GenerationStage,
        identity: String,
    },
    /// A disabled identity that no biome uses.
    UnknownDisabled(String),
}

impl fmt::Display for ContentIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateIdentity {
                biome: Some(biome),
                stage,
                identity,
            } => write!(f, "'{identity}' listed more than once in {stage} for biome {}", biome.0),
            Self::DuplicateIdentity {
                biome: None,
                stage,
                identity,
            } => write!(f, "'{identity}' listed more than once in {stage} for the fallback content"),
            Self::UnknownDisabled(identity) => write!(f, "disabled item '{identity}' is not used by any biome"),
        }
    }
}

/// Per-biome staged content with a fallback for unlisted biomes.
#[derive(Clone, Debug, Default)]
pub struct ContentRegistry {
    by_biome: HashMap<BiomeId, Arc<StagedContent>>,
    fallback: Arc<StagedContent>,
}

impl ContentRegistry {
    pub fn new(fallback: StagedContent) -> Self {
        Self {
            by_biome: HashMap::new(),
            fallback: Arc::new(fallback),
        }
    }

    pub fn insert(&mut self, biome: BiomeId, content: StagedContent) -> &mut Self {
        self.by_biome.insert(biome, Arc::new(content));
        self
    }

    pub fn get_staged_content(&self, biome: BiomeId) -> Arc<StagedContent> {
        self.by_biome
            .get(&biome)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    /// Whether a start of `identity` may be anchored in `biome`.
    pub fn allows_structure(&self, biome: BiomeId, identity: &str) -> bool {
        self.get_staged_content(biome).contains_structure(identity)
    }

    /// Biome content lists in a stable order, fallback first.
    fn all_content(&self) -> Vec<(Option<BiomeId>, &Arc<StagedContent>)> {
        let mut biomes: Vec<_> = self.by_biome.iter().map(|(id, c)| (Some(*id), c)).collect();
        biomes.sort_by_key(|(id, _)| *id);
        std::iter::once((None, &self.fallback)).chain(biomes).collect()
    }

    /// Every registered structure type once, by identity.
    pub fn structures(&self) -> Vec<Arc<dyn StructureType>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (_, content) in self.all_content() {
            for stage in GenerationStage::ALL {
                for structure in content.structures(stage) {
                    if seen.insert(structure.identity().to_string()) {
                        out.push(Arc::clone(structure));
                    }
                }
            }
        }
        out
    }

    /// Structures any biome assigns to `stage`, once each by identity,
    /// fallback content first and then biomes in id order.
    pub fn stage_structures(&self, stage: GenerationStage) -> Vec<Arc<dyn StructureType>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (_, content) in self.all_content() {
            for structure in content.structures(stage) {
                if seen.insert(structure.identity()) {
                    out.push(Arc::clone(structure));
                }
            }
        }
        out
    }

    /// The lists tiles are decorated with: each biome keeps its features,
    /// but every biome runs the registry-wide structure list of each stage.
    /// A structure still only anchors starts in biomes that list it (see
    /// [`Self::allows_structure`]), so its pieces are placed in every tile
    /// they reach whatever that tile's biome.
    pub fn with_global_structures(&self) -> Self {
        let lists: [Vec<Arc<dyn StructureType>>; GenerationStage::COUNT] =
            std::array::from_fn(|i| self.stage_structures(GenerationStage::ALL[i]));
        Self {
            by_biome: self
                .by_biome
                .iter()
                .map(|(id, content)| (*id, Arc::new(content.with_structure_lists(&lists))))
                .collect(),
            fallback: Arc::new(self.fallback.with_structure_lists(&lists)),
        }
    }

    /// Reports duplicate identities within a stage and disabled identities
    /// that nothing uses. Each issue is also logged as a warning.
    pub fn validate(&self, disabled: &[String]) -> Vec<ContentIssue> {
        let mut issues = Vec::new();
        let mut known = HashSet::new();
        for (biome, content) in self.all_content() {
            for stage in GenerationStage::ALL {
                let mut in_stage = HashSet::new();
                let identities = content
                    .structures(stage)
                    .iter()
                    .map(|s| s.identity())
                    .chain(content.features(stage).iter().map(|f| f.identity()));
                for identity in identities {
                    known.insert(identity.to_string());
                    if !in_stage.insert(identity) {
                        issues.push(ContentIssue::DuplicateIdentity {
                            biome,
                            stage,
                            identity: identity.to_string(),
                        });
                    }
                }
            }
        }
        for identity in disabled {
            if !known.contains(identity) {
                issues.push(ContentIssue::UnknownDisabled(identity.clone()));
            }
        }
        for issue in &issues {
            warn!("content validation: {issue}");
        }
        issues
    }

    /// Demo content for the overworld biome set.
    pub fn default_overworld(materials: &MaterialRegistry, biomes: &BiomeRegistry) -> Result<Self, ContentError> {
        let biome = |name: &str| {
            biomes
                .lookup_by_name(name)
                .ok_or_else(|| ContentError::UnknownBiome(name.to_string()))
        };
        let m = |name: &str| materials.require(name);

        let ores: Arc<dyn Feature> = Arc::new(OreVeinFeature::new(default_ore_distributions(materials)?, vec![m("stone")?]));
        let ore_veins = FeatureDescriptor::new("ore_veins", ores);

        let grass_ground = vec![m("grass_block")?];
        let patch_grass = FeatureDescriptor::new(
            "patch_grass",
            Arc::new(PatchFeature::new(m("grass")?, grass_ground.clone(), 24)),
        )
        .with_precondition(Precondition::above_sea_level());
        let patch_fern = FeatureDescriptor::new("patch_fern", Arc::new(PatchFeature::new(m("fern")?, grass_ground, 10)));
        let patch_dead_bush = FeatureDescriptor::new(
            "patch_dead_bush",
            Arc::new(PatchFeature::new(m("dead_bush")?, vec![m("sand")?], 4)),
        );

        let village: Arc<dyn StructureType> = Arc::new(VillageStructure::plains(materials)?);
        let desert_pyramid: Arc<dyn StructureType> =
            Arc::new(SurfaceStructure::new(SurfaceKind::DesertPyramid, materials, StructureSpacing::new(12, 4, 14_357_617))?);
        let igloo: Arc<dyn StructureType> =
            Arc::new(SurfaceStructure::new(SurfaceKind::Igloo, materials, StructureSpacing::new(12, 4, 14_357_618))?);
        let jungle_temple: Arc<dyn StructureType> =
            Arc::new(SurfaceStructure::new(SurfaceKind::JungleTemple, materials, StructureSpacing::new(12, 4, 14_357_619))?);

        let base = StagedContent::new().with_feature(GenerationStage::UndergroundOres, ore_veins);

        let plains = base
            .clone()
            .with_structure(GenerationStage::SurfaceStructures, Arc::clone(&village))
            .with_feature(GenerationStage::VegetalDecoration, patch_grass.clone());
        let forest = base
            .clone()
            .with_feature(GenerationStage::VegetalDecoration, patch_grass.clone())
            .with_feature(GenerationStage::VegetalDecoration, patch_fern.clone());
        let desert = base
            .clone()
            .with_structure(GenerationStage::SurfaceStructures, desert_pyramid)
            .with_feature(GenerationStage::VegetalDecoration, patch_dead_bush);
        let tundra = base
            .clone()
            .with_structure(GenerationStage::SurfaceStructures, igloo);
        let jungle = base
            .clone()
            .with_structure(GenerationStage::SurfaceStructures, jungle_temple)
            .with_feature(GenerationStage::VegetalDecoration, patch_grass)
            .with_feature(GenerationStage::VegetalDecoration, patch_fern);

        let mut registry = Self::new(base);
        registry
            .insert(biome("plains")?, plains)
            .insert(biome("forest")?, forest)
            .insert(biome("desert")?, desert)
            .insert(biome("snowy_tundra")?, tundra)
            .insert(biome("jungle")?, jungle);
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(identity: &str) -> FeatureDescriptor {
        FeatureDescriptor::from_fn(identity, |_, _, _| Ok(()))
    }

    #[test]
    fn test_items_follow_stage_then_phase_order() {
        let village: Arc<dyn StructureType> =
            Arc::new(VillageStructure::plains(&MaterialRegistry::with_defaults()).unwrap());
        let content = StagedContent::new()
            .with_feature(GenerationStage::VegetalDecoration, noop("late"))
            .with_feature(GenerationStage::Lakes, noop("lake"))
            .with_structure(GenerationStage::Lakes, village);
        let items: Vec<_> = content.items().collect();
        assert_eq!(
            items,
            vec![
                (GenerationStage::Lakes, Phase::Structure, "village"),
                (GenerationStage::Lakes, Phase::Feature, "lake"),
                (GenerationStage::VegetalDecoration, Phase::Feature, "late"),
            ]
        );
        assert_eq!(content.item_count(), 3);
    }

    #[test]
    fn test_unlisted_biome_uses_fallback() {
        let mut registry = ContentRegistry::new(StagedContent::new().with_feature(GenerationStage::Lakes, noop("fallback")));
        registry.insert(BiomeId(1), StagedContent::new());
        assert!(registry.get_staged_content(BiomeId(1)).is_empty());
        assert_eq!(registry.get_staged_content(BiomeId(9)).item_count(), 1);
    }

    #[test]
    fn test_validate_reports_duplicates_and_unknown_disabled() {
        let mut registry = ContentRegistry::default();
        registry.insert(
            BiomeId(2),
            StagedContent::new()
                .with_feature(GenerationStage::Lakes, noop("dup"))
                .with_feature(GenerationStage::Lakes, noop("dup"))
                .with_feature(GenerationStage::LocalModifications, noop("dup")),
        );
        let issues = registry.validate(&["dup".to_string(), "missing".to_string()]);
        assert_eq!(issues.len(), 2, "got {issues:?}");
        assert!(issues.contains(&ContentIssue::DuplicateIdentity {
            biome: Some(BiomeId(2)),
            stage: GenerationStage::Lakes,
            identity: "dup".into(),
        }));
        assert!(issues.contains(&ContentIssue::UnknownDisabled("missing".into())));
    }

    #[test]
    fn test_default_overworld_builds() {
        let materials = MaterialRegistry::with_defaults();
        let biomes = BiomeRegistry::overworld(&materials);
        let registry = ContentRegistry::default_overworld(&materials, &biomes).unwrap();
        assert!(registry.validate(&[]).is_empty());

        let plains = biomes.lookup_by_name("plains").unwrap();
        assert!(registry.allows_structure(plains, "village"));
        assert!(!registry.allows_structure(plains, "igloo"));

        let identities: Vec<String> = registry.structures().iter().map(|s| s.identity().to_string()).collect();
        assert_eq!(identities.len(), 4, "each structure listed once: {identities:?}");
    }

    #[test]
    fn test_global_structures_reach_every_biome() {
        let materials = MaterialRegistry::with_defaults();
        let village: Arc<dyn StructureType> = Arc::new(VillageStructure::plains(&materials).unwrap());
        let mut registry = ContentRegistry::default();
        registry.insert(
            BiomeId(1),
            StagedContent::new().with_structure(GenerationStage::SurfaceStructures, Arc::clone(&village)),
        );
        registry.insert(
            BiomeId(2),
            StagedContent::new()
                .with_structure(GenerationStage::SurfaceStructures, village)
                .with_feature(GenerationStage::Lakes, noop("forest_only")),
        );
        registry.insert(BiomeId(3), StagedContent::new());

        let stage = registry.stage_structures(GenerationStage::SurfaceStructures);
        assert_eq!(stage.len(), 1, "listed by two biomes, run once");

        let global = registry.with_global_structures();
        for biome in [BiomeId(1), BiomeId(3), BiomeId(7)] {
            let content = global.get_staged_content(biome);
            assert_eq!(content.structures(GenerationStage::SurfaceStructures).len(), 1, "biome {}", biome.0);
        }
        assert_eq!(global.get_staged_content(BiomeId(2)).features(GenerationStage::Lakes).len(), 1);
        assert!(global.get_staged_content(BiomeId(3)).features(GenerationStage::Lakes).is_empty());
        assert!(!registry.allows_structure(BiomeId(3), "village"), "anchoring stays biome-gated");
    }

    #[test]
    fn test_piece_kind_allow_list() {
        assert!(PieceKind::Jigsaw { projection: Projection::Rigid }.integrates_with_terrain());
        assert!(!PieceKind::Jigsaw { projection: Projection::TerrainMatching }.integrates_with_terrain());
        assert!(PieceKind::Surface(SurfaceKind::Igloo).integrates_with_terrain());
        assert!(!PieceKind::Surface(SurfaceKind::WitchHut).integrates_with_terrain());
        assert!(!PieceKind::Other.integrates_with_terrain());
    }

    #[test]
    fn test_start_bounds_enclose_pieces() {
        let piece = |x: i32| StructurePiece {
            kind: PieceKind::Other,
            bounds: BlockBox::new(IVec3::new(x, 60, 0), IVec3::new(x + 4, 66, 4)),
            ground_level_delta: 0,
        };
        let start = StructureStart::new("s", TileCoord::new(0, 0), vec![piece(0), piece(20)]).unwrap();
        assert_eq!(start.bounds.min.x, 0);
        assert_eq!(start.bounds.max.x, 24);
        assert!(StructureStart::new("s", TileCoord::new(0, 0), Vec::new()).is_none());
    }
}
